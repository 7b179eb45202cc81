//! Named callbacks, serializers and assign actions
//!
//! Subscriptions and transformations refer to behaviour by name. The
//! [`CallbackRegistry`] resolves those names at dispatch time.

use crate::model::{DEFAULT_ASSIGN_ACTION, Delivery, Transformation};
use crate::{Result, WebhookError};
use async_trait::async_trait;
use handlebars::Handlebars;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

/// Pre-callback status meaning "use my data".
pub const CALLBACK_CREATED: u16 = 201;

/// Outcome of a pre-callback.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallbackResult {
    pub status_code: u16,
    pub data: Value,
}

impl CallbackResult {
    /// Result whose data replaces the base payload.
    pub fn created(data: Value) -> Self {
        Self {
            status_code: CALLBACK_CREATED,
            data,
        }
    }

    pub fn is_created(&self) -> bool {
        self.status_code == CALLBACK_CREATED
    }
}

/// Enriches the base payload before any webhook sees it.
#[async_trait]
pub trait PreCallback: Send + Sync {
    async fn call(&self, payload: &Value) -> Result<CallbackResult>;
}

/// Runs on a transformation's output.
#[async_trait]
pub trait PostCallback: Send + Sync {
    async fn call(&self, payload: Value) -> Result<Value>;
}

/// Transformation logic.
#[async_trait]
pub trait Serializer: Send + Sync {
    async fn serialize(&self, transformation: &Transformation, payload: &Value) -> Result<Value>;
}

/// Merges a transformed delivery into the shared result list.
pub trait AssignAction: Send + Sync {
    fn assign(&self, results: &mut Vec<Delivery>, delivery: Delivery);
}

#[async_trait]
impl<F, Fut> PreCallback for F
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<CallbackResult>> + Send + 'static,
{
    async fn call(&self, payload: &Value) -> Result<CallbackResult> {
        (self)(payload.clone()).await
    }
}

/// Adapts an async closure into a [`PostCallback`].
pub struct FnPostCallback<F>(pub F);

impl<F, Fut> FnPostCallback<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F, Fut> PostCallback for FnPostCallback<F>
where
    F: Fn(Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn call(&self, payload: Value) -> Result<Value> {
        (self.0)(payload).await
    }
}

/// Adapts a plain function into a [`Serializer`].
pub struct FnSerializer<F>(pub F);

impl<F> FnSerializer<F>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    pub fn new(f: F) -> Self {
        Self(f)
    }
}

#[async_trait]
impl<F> Serializer for FnSerializer<F>
where
    F: Fn(&Value) -> Result<Value> + Send + Sync,
{
    async fn serialize(&self, _transformation: &Transformation, payload: &Value) -> Result<Value> {
        (self.0)(payload)
    }
}

/// Renders the serialization logic as a handlebars template producing JSON.
///
/// Used for transformations whose logic names no registered serializer.
#[derive(Debug)]
pub struct TemplateSerializer {
    handlebars: Handlebars<'static>,
}

impl TemplateSerializer {
    pub fn new() -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.register_escape_fn(handlebars::no_escape);
        Self { handlebars }
    }
}

impl Default for TemplateSerializer {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Serializer for TemplateSerializer {
    async fn serialize(&self, transformation: &Transformation, payload: &Value) -> Result<Value> {
        let rendered = self
            .handlebars
            .render_template(&transformation.serialization_logic, payload)?;
        Ok(serde_json::from_str(&rendered)?)
    }
}

/// Adds the delivery at the end.
#[derive(Debug, Clone, Copy, Default)]
pub struct Append;

impl AssignAction for Append {
    fn assign(&self, results: &mut Vec<Delivery>, delivery: Delivery) {
        results.push(delivery);
    }
}

/// Adds the delivery at the front.
#[derive(Debug, Clone, Copy, Default)]
pub struct Prepend;

impl AssignAction for Prepend {
    fn assign(&self, results: &mut Vec<Delivery>, delivery: Delivery) {
        results.insert(0, delivery);
    }
}

/// Replaces the entry for the same webhook, appending when there is none.
#[derive(Debug, Clone, Copy, Default)]
pub struct Replace;

impl AssignAction for Replace {
    fn assign(&self, results: &mut Vec<Delivery>, delivery: Delivery) {
        match results
            .iter_mut()
            .find(|existing| existing.webhook.id == delivery.webhook.id)
        {
            Some(existing) => *existing = delivery,
            None => results.push(delivery),
        }
    }
}

/// Name-to-behaviour lookup for everything a subscription can reference.
#[derive(Clone)]
pub struct CallbackRegistry {
    pre: HashMap<String, Arc<dyn PreCallback>>,
    post: HashMap<String, Arc<dyn PostCallback>>,
    serializers: HashMap<String, Arc<dyn Serializer>>,
    assign: HashMap<String, Arc<dyn AssignAction>>,
    fallback: Arc<dyn Serializer>,
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl CallbackRegistry {
    /// Registry with the built-in assign actions `append`, `prepend` and
    /// `replace`.
    pub fn new() -> Self {
        let mut assign: HashMap<String, Arc<dyn AssignAction>> = HashMap::new();
        assign.insert(DEFAULT_ASSIGN_ACTION.to_string(), Arc::new(Append));
        assign.insert("prepend".to_string(), Arc::new(Prepend));
        assign.insert("replace".to_string(), Arc::new(Replace));

        Self {
            pre: HashMap::new(),
            post: HashMap::new(),
            serializers: HashMap::new(),
            assign,
            fallback: Arc::new(TemplateSerializer::new()),
        }
    }

    pub fn with_pre_callback(mut self, name: impl Into<String>, callback: impl PreCallback + 'static) -> Self {
        self.pre.insert(name.into(), Arc::new(callback));
        self
    }

    pub fn with_post_callback(mut self, name: impl Into<String>, callback: impl PostCallback + 'static) -> Self {
        self.post.insert(name.into(), Arc::new(callback));
        self
    }

    pub fn with_serializer(mut self, name: impl Into<String>, serializer: impl Serializer + 'static) -> Self {
        self.serializers.insert(name.into(), Arc::new(serializer));
        self
    }

    pub fn with_assign_action(mut self, name: impl Into<String>, action: impl AssignAction + 'static) -> Self {
        self.assign.insert(name.into(), Arc::new(action));
        self
    }

    pub fn pre_callback(&self, name: &str) -> Option<Arc<dyn PreCallback>> {
        self.pre.get(name).cloned()
    }

    pub fn post_callback(&self, name: &str) -> Option<Arc<dyn PostCallback>> {
        self.post.get(name).cloned()
    }

    /// Serializer registered under the transformation's logic, or the template fallback.
    pub fn serializer(&self, transformation: &Transformation) -> Arc<dyn Serializer> {
        self.serializers
            .get(&transformation.serialization_logic)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }

    pub fn assign_action(&self, name: &str) -> Result<Arc<dyn AssignAction>> {
        self.assign
            .get(name)
            .cloned()
            .ok_or_else(|| WebhookError::callback(name, "unknown assign action"))
    }

    /// Run `transformation` on `payload`, then its post-callback if registered.
    pub async fn transform(&self, transformation: &Transformation, payload: &Value) -> Result<Value> {
        let serialized = self
            .serializer(transformation)
            .serialize(transformation, payload)
            .await?;

        match transformation
            .post_callback
            .as_deref()
            .and_then(|name| self.post_callback(name))
        {
            Some(post) => post.call(serialized).await,
            None => Ok(serialized),
        }
    }
}

impl fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fn names<T: ?Sized>(map: &HashMap<String, Arc<T>>) -> Vec<&str> {
            let mut names: Vec<&str> = map.keys().map(String::as_str).collect();
            names.sort_unstable();
            names
        }

        f.debug_struct("CallbackRegistry")
            .field("pre", &names(&self.pre))
            .field("post", &names(&self.post))
            .field("serializers", &names(&self.serializers))
            .field("assign", &names(&self.assign))
            .finish()
    }
}
