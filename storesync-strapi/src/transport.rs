//! REST and admin API transport.
//!
//! [`StrapiClient::send`] is the single entry point for content-API calls:
//! it resolves a token, waits for health, builds the URL, translates the
//! payload and classifies the answer. A 401 triggers one forced token
//! refresh and one retry. A 404 on GET is returned as a soft result.
//!
//! When a service-account gate is set, content calls first wait for
//! bootstrap to register the account and fail with
//! [`StrapiError::Unavailable`] if it never appears.

use crate::error::{Result, StrapiError};
use crate::health::HealthGate;
use crate::http::{CmsHttp, CmsRequest, CmsResponse};
use crate::session::{Credentials, SessionManager};
use crate::state::SessionState;
use crate::translate::to_external;
use reqwest::Method;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use storesync_log::redacted_string;
use tracing::{debug, error, warn};

/// Query used to look an entity up by its commerce id before creating it.
pub const DEFAULT_LOOKUP_QUERY: &str = "fields[0]=id&fields[1]=medusa_id&populate=*";

/// Outcome of a CMS call.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct StrapiResult {
    /// CMS id of the record
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub medusa_id: Option<Value>,
    pub status: u16,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<String>,
}

impl StrapiResult {
    /// A bare status.
    pub fn with_status(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// The no-op answer for suppressed echoes and rejected input.
    pub fn skipped() -> Self {
        Self::with_status(400)
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    fn from_body(status: u16, body: Value, query: Option<String>) -> Self {
        let nested = body.get("data").filter(|d| !d.is_null());
        let pick = |key: &str| {
            body.get(key)
                .or_else(|| nested.and_then(|d| d.get(key)))
                .filter(|v| !v.is_null())
                .cloned()
        };

        Self {
            id: pick("id"),
            medusa_id: pick("medusa_id"),
            status,
            meta: body.get("meta").cloned(),
            data: Some(nested.cloned().unwrap_or(body)),
            query,
        }
    }
}

/// A content-API request.
#[derive(Debug, Clone)]
pub struct SendRequest {
    pub method: Method,
    /// Resource type, e.g. `products`
    pub resource: String,
    pub id: Option<String>,
    pub data: Option<Value>,
    /// Pre-encoded query string without the leading `?`
    pub query: Option<String>,
}

impl SendRequest {
    pub fn new(method: Method, resource: impl Into<String>) -> Self {
        Self {
            method,
            resource: resource.into(),
            id: None,
            data: None,
            query: None,
        }
    }

    pub fn get(resource: impl Into<String>) -> Self {
        Self::new(Method::GET, resource)
    }

    pub fn post(resource: impl Into<String>) -> Self {
        Self::new(Method::POST, resource)
    }

    pub fn put(resource: impl Into<String>) -> Self {
        Self::new(Method::PUT, resource)
    }

    pub fn delete(resource: impl Into<String>) -> Self {
        Self::new(Method::DELETE, resource)
    }

    pub fn id(mut self, id: impl Into<String>) -> Self {
        self.id = Some(id.into());
        self
    }

    pub fn data(mut self, data: Value) -> Self {
        self.data = Some(data);
        self
    }

    pub fn query(mut self, query: impl Into<String>) -> Self {
        self.query = Some(query.into());
        self
    }
}

/// String form of an id field, accepting numbers.
pub fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.is_empty() => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

/// Add `filters[medusa_id]={id}` to an encoded query.
///
/// Fails when `id` is given and the query already filters by `id` or
/// `medusa_id`. Without `id`, an existing filter value is reused.
pub fn append_id_to_filter(query: &str, id: Option<&str>) -> Result<String> {
    let mut pairs: Vec<(String, String)> = serde_urlencoded::from_str(query)
        .map_err(|e| StrapiError::InvalidRequest(format!("bad query `{query}`: {e}")))?;

    let existing = |name: &str| {
        pairs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.clone())
    };
    let from_id = existing("filters[id]");
    let from_medusa_id = existing("filters[medusa_id]");

    if id.is_some() && (from_id.is_some() || from_medusa_id.is_some()) {
        return Err(StrapiError::InvalidRequest(
            "multiple ids in the request".to_string(),
        ));
    }

    let Some(id) = id.map(str::to_string).or(from_medusa_id).or(from_id) else {
        return Ok(query.to_string());
    };

    pairs.retain(|(key, _)| key != "filters[medusa_id]");
    pairs.push(("filters[medusa_id]".to_string(), id));
    serde_urlencoded::to_string(&pairs)
        .map_err(|e| StrapiError::InvalidRequest(format!("cannot encode query: {e}")))
}

/// Client for the CMS content and admin APIs.
#[derive(Debug, Clone)]
pub struct StrapiClient {
    http: CmsHttp,
    sessions: SessionManager,
    health: HealthGate,
    base_url: String,
    account_gate: Option<(Arc<SessionState>, Duration)>,
}

impl StrapiClient {
    pub fn new(
        http: CmsHttp,
        sessions: SessionManager,
        health: HealthGate,
        base_url: impl Into<String>,
    ) -> Self {
        Self {
            http,
            sessions,
            health,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            account_gate: None,
        }
    }

    /// Make content calls wait up to `limit` for the service account.
    pub fn with_service_account_gate(mut self, state: Arc<SessionState>, limit: Duration) -> Self {
        self.account_gate = Some((state, limit));
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn sessions(&self) -> &SessionManager {
        &self.sessions
    }

    pub fn health(&self) -> &HealthGate {
        &self.health
    }

    pub fn http(&self) -> &CmsHttp {
        &self.http
    }

    /// Target URL of a content-API request.
    ///
    /// POST never gets a tail. A GET with both an id and a query filters
    /// by `medusa_id` (except for `users` and the `me` alias); otherwise an
    /// id becomes a path segment and a lone query is appended as-is.
    pub fn entry_url(&self, request: &SendRequest) -> Result<String> {
        let mut tail = String::new();

        if request.method != Method::POST {
            let id = request.id.as_deref().filter(|id| !id.is_empty());
            match (id, request.query.as_deref()) {
                (Some(id), Some(query))
                    if request.method == Method::GET
                        && !id.trim().eq_ignore_ascii_case("me")
                        && !request.resource.eq_ignore_ascii_case("users") =>
                {
                    tail = format!("?{}", append_id_to_filter(query, Some(id))?);
                }
                (Some(id), _) => tail = format!("/{id}"),
                _ => {}
            }

            if tail.is_empty()
                && let Some(query) = request.query.as_deref().filter(|q| !q.is_empty())
            {
                tail = format!("?{query}");
            }
        }

        Ok(format!("{}/api/{}{}", self.base_url, request.resource, tail))
    }

    /// Send a content-API request as `creds`.
    pub async fn send(&self, request: &SendRequest, creds: &Credentials) -> Result<StrapiResult> {
        let url = self.entry_url(request)?;
        let body = request.data.as_ref().map(|data| {
            if data.get("id").is_some() {
                to_external(data)
            } else {
                data.clone()
            }
        });

        if let Some((state, limit)) = &self.account_gate
            && !state.wait_for_service_account(*limit).await
        {
            warn!(url = %url, waited_ms = limit.as_millis() as u64, "Service account not registered");
            return Err(StrapiError::Unavailable(
                "service account is not registered".to_string(),
            ));
        }

        let mut force_refresh = false;
        loop {
            let token = self.sessions.get_token(creds, force_refresh).await?;
            self.health.wait_until_healthy().await?;

            let mut call = CmsRequest::new(request.method.clone(), &url).bearer(token);
            if let Some(body) = &body {
                call = call.json(body.clone());
            }

            debug!(method = %request.method, url = %url, "Sending CMS request");
            let response = self.http.execute(&call).await?;

            match response.status {
                200..=299 => {
                    return Ok(StrapiResult::from_body(
                        response.status,
                        response.body,
                        request.query.clone(),
                    ));
                }
                401 if !force_refresh => {
                    warn!(email = %creds.email, url = %url, "CMS token rejected, refreshing");
                    force_refresh = true;
                }
                404 if request.method == Method::GET => {
                    warn!(
                        resource = %request.resource,
                        id = request.id.as_deref().unwrap_or("-"),
                        query = request.query.as_deref().unwrap_or("-"),
                        "CMS entry not found"
                    );
                    return Ok(StrapiResult {
                        status: 404,
                        query: request.query.clone(),
                        ..StrapiResult::default()
                    });
                }
                _ => return Err(self.failure(&request.method, &url, body.as_ref(), response)),
            }
        }
    }

    /// [`send`](Self::send), turning any failure into a logged `400` result.
    pub async fn process_entry(&self, request: &SendRequest, creds: &Credentials) -> StrapiResult {
        match self.send(request, creds).await {
            Ok(result) => result,
            Err(e) => {
                error!(
                    method = %request.method,
                    resource = %request.resource,
                    id = request.id.as_deref().unwrap_or("-"),
                    error = %e,
                    "Unable to process CMS entry"
                );
                StrapiResult::skipped()
            }
        }
    }

    /// GET entries, normalizing `data` to an array.
    pub async fn get_entries(&self, request: &SendRequest, creds: &Credentials) -> StrapiResult {
        let get = SendRequest {
            method: Method::GET,
            ..request.clone()
        };
        let mut result = self.process_entry(&get, creds).await;
        result.data = Some(match result.data.take() {
            Some(Value::Array(items)) => Value::Array(items),
            Some(Value::Null) | None => Value::Array(Vec::new()),
            Some(single) => Value::Array(vec![single]),
        });
        result
    }

    /// Create an entry unless one with the same commerce id exists.
    ///
    /// An existing entry is answered with status `302` and the stored record
    /// instead of a duplicate.
    pub async fn create_entry(
        &self,
        resource: &str,
        data: &Value,
        creds: &Credentials,
    ) -> StrapiResult {
        if let Some(id) = data.get("id").and_then(id_string) {
            let lookup = SendRequest::get(resource).id(&id).query(DEFAULT_LOOKUP_QUERY);
            let found = self.get_entries(&lookup, creds).await;
            let first = found
                .data
                .as_ref()
                .and_then(Value::as_array)
                .and_then(|items| items.first())
                .filter(|item| !item.is_null());

            if found.status == 200
                && let Some(existing) = first
            {
                debug!(resource, id = %id, "Entry already exists in CMS");
                return StrapiResult {
                    status: 302,
                    data: Some(existing.clone()),
                    ..StrapiResult::default()
                };
            }
        }

        let request = SendRequest::post(resource).data(data.clone());
        self.process_entry(&request, creds).await
    }

    /// Update the entry identified by `data.id`.
    pub async fn update_entry(&self, resource: &str, data: &Value, creds: &Credentials) -> StrapiResult {
        let mut request = SendRequest::put(resource).data(data.clone());
        request.id = data.get("id").and_then(id_string);
        self.process_entry(&request, creds).await
    }

    pub async fn delete_entry(&self, resource: &str, id: &str, creds: &Credentials) -> StrapiResult {
        self.process_entry(&SendRequest::delete(resource).id(id), creds).await
    }

    /// Call `{base}/admin/{resource}[/{action}][/{id}][?{query}]` as the
    /// super admin.
    pub async fn admin_send(
        &self,
        method: Method,
        resource: &str,
        action: Option<&str>,
        id: Option<&str>,
        data: Option<&Value>,
        query: Option<&str>,
    ) -> Result<CmsResponse> {
        let path = [Some(resource), action, id]
            .into_iter()
            .flatten()
            .filter(|segment| !segment.is_empty())
            .collect::<Vec<_>>()
            .join("/");
        let url = match query.filter(|q| !q.is_empty()) {
            Some(query) => format!("{}/admin/{path}?{query}", self.base_url),
            None => format!("{}/admin/{path}", self.base_url),
        };

        let mut force_refresh = false;
        loop {
            let token = self.sessions.admin_token(force_refresh).await?;
            let mut call = CmsRequest::new(method.clone(), &url).bearer(token);
            if let Some(data) = data {
                call = call.json(data.clone());
            }

            debug!(method = %method, url = %url, "Sending CMS admin request");
            let response = self.http.execute(&call).await?;
            match response.status {
                200..=299 => return Ok(response),
                401 if !force_refresh => force_refresh = true,
                _ => return Err(self.failure(&method, &url, data, response)),
            }
        }
    }

    fn failure(
        &self,
        method: &Method,
        url: &str,
        request_body: Option<&Value>,
        response: CmsResponse,
    ) -> StrapiError {
        let response_body = redacted_string(&response.body);
        error!(
            method = %method,
            url = %url,
            status = response.status,
            request = %request_body.map(redacted_string).unwrap_or_default(),
            response = %response_body,
            "CMS request failed"
        );
        StrapiError::Status {
            status: response.status,
            method: method.to_string(),
            url: url.to_string(),
            body: response_body,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::health::HealthConfig;
    use crate::retry::RateLimitPolicy;
    use crate::state::SessionState;
    use serde_json::json;
    use std::sync::Arc;
    use std::time::Duration;
    use wiremock::matchers::{body_json, header, method, path, query_param};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn client(base: &str) -> StrapiClient {
        let state = Arc::new(SessionState::default());
        let http = CmsHttp::new(Duration::from_secs(5), RateLimitPolicy::default(), state.clone())
            .unwrap();
        let health = HealthGate::new(
            http.client().clone(),
            base,
            HealthConfig::self_test(),
            state.clone(),
        );
        let sessions = SessionManager::new(
            http.clone(),
            health.clone(),
            base,
            Credentials::new("admin@example.com", "pw"),
            state,
        );
        StrapiClient::new(http, sessions, health, base)
    }

    fn creds() -> Credentials {
        Credentials::new("svc@example.com", "pw")
    }

    async fn mount_login(server: &MockServer, tokens: &[&str]) {
        for (i, token) in tokens.iter().enumerate() {
            let mock = Mock::given(method("POST"))
                .and(path("/api/auth/local"))
                .respond_with(ResponseTemplate::new(200).set_body_json(json!({"jwt": token})));
            if i + 1 < tokens.len() {
                mock.up_to_n_times(1).mount(server).await;
            } else {
                mock.mount(server).await;
            }
        }
    }

    #[test]
    fn test_entry_url_rules() {
        let client = client("http://cms");

        let url = |r: SendRequest| client.entry_url(&r).unwrap();

        assert_eq!(url(SendRequest::post("products").id("p1")), "http://cms/api/products");
        assert_eq!(url(SendRequest::put("products").id("p1")), "http://cms/api/products/p1");
        assert_eq!(url(SendRequest::get("products")), "http://cms/api/products");
        assert_eq!(
            url(SendRequest::get("products").query("populate=*")),
            "http://cms/api/products?populate=*"
        );
        assert_eq!(
            url(SendRequest::get("products").id("p1").query("populate=x")),
            "http://cms/api/products?populate=x&filters%5Bmedusa_id%5D=p1"
        );
        assert_eq!(
            url(SendRequest::get("users").id("me").query("populate=x")),
            "http://cms/api/users/me"
        );
    }

    #[test]
    fn test_append_id_to_filter() {
        assert_eq!(
            append_id_to_filter("filters%5Bmedusa_id%5D=p1", None).unwrap(),
            "filters%5Bmedusa_id%5D=p1"
        );
        assert_eq!(append_id_to_filter("a=1", None).unwrap(), "a=1");
        assert!(append_id_to_filter("filters%5Bid%5D=3", Some("p1")).is_err());
    }

    #[test]
    fn test_result_shape() {
        let result = StrapiResult::from_body(
            200,
            json!({"data": {"id": 5, "medusa_id": "p1"}, "meta": {"page": 1}}),
            None,
        );
        assert_eq!(result.id, Some(json!(5)));
        assert_eq!(result.medusa_id, Some(json!("p1")));
        assert_eq!(result.data, Some(json!({"id": 5, "medusa_id": "p1"})));
        assert_eq!(result.meta, Some(json!({"page": 1})));

        let flat = StrapiResult::from_body(200, json!({"id": 9}), None);
        assert_eq!(flat.data, Some(json!({"id": 9})));
    }

    #[tokio::test]
    async fn test_send_translates_outbound_data() {
        let server = MockServer::start().await;
        mount_login(&server, &["tok"]).await;
        Mock::given(method("PUT"))
            .and(path("/api/products/p1"))
            .and(header("authorization", "Bearer tok"))
            .and(body_json(json!({"medusa_id": "p1", "title": "New"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 3}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client
            .update_entry("products", &json!({"id": "p1", "title": "New"}), &creds())
            .await;
        assert_eq!(result.status, 200);
        assert_eq!(result.id, Some(json!(3)));
    }

    #[tokio::test]
    async fn test_unauthorized_refreshes_once() {
        let server = MockServer::start().await;
        mount_login(&server, &["old", "new"]).await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .and(header("authorization", "Bearer old"))
            .respond_with(ResponseTemplate::new(401))
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .and(header("authorization", "Bearer new"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": []})))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client.send(&SendRequest::get("products"), &creds()).await.unwrap();
        assert_eq!(result.status, 200);
    }

    #[tokio::test]
    async fn test_persistent_unauthorized_fails() {
        let server = MockServer::start().await;
        mount_login(&server, &["tok"]).await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .respond_with(ResponseTemplate::new(401))
            .expect(2)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let err = client
            .send(&SendRequest::get("products"), &creds())
            .await
            .unwrap_err();
        assert!(err.is_unauthorized());
    }

    #[tokio::test]
    async fn test_get_not_found_is_soft() {
        let server = MockServer::start().await;
        mount_login(&server, &["tok"]).await;
        Mock::given(method("GET"))
            .and(path("/api/products/p9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        Mock::given(method("DELETE"))
            .and(path("/api/products/p9"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client
            .send(&SendRequest::get("products").id("p9"), &creds())
            .await
            .unwrap();
        assert_eq!(result.status, 404);

        let err = client
            .send(&SendRequest::delete("products").id("p9"), &creds())
            .await
            .unwrap_err();
        assert_eq!(err.status_code(), Some(404));

        assert_eq!(client.delete_entry("products", "p9", &creds()).await.status, 400);
    }

    #[tokio::test]
    async fn test_create_entry_existing_returns_302() {
        let server = MockServer::start().await;
        mount_login(&server, &["tok"]).await;
        Mock::given(method("GET"))
            .and(path("/api/products"))
            .and(query_param("filters[medusa_id]", "p1"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "data": [{"id": 4, "medusa_id": "p1"}]
            })))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/products"))
            .respond_with(ResponseTemplate::new(200))
            .expect(0)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let result = client
            .create_entry("products", &json!({"id": "p1", "title": "Shirt"}), &creds())
            .await;
        assert_eq!(result.status, 302);
        assert_eq!(result.data, Some(json!({"id": 4, "medusa_id": "p1"})));
    }

    #[tokio::test]
    async fn test_admin_send_url() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/admin/login"))
            .respond_with(
                ResponseTemplate::new(200).set_body_json(json!({"data": {"token": "adm"}})),
            )
            .mount(&server)
            .await;
        Mock::given(method("GET"))
            .and(path("/admin/users/7"))
            .and(header("authorization", "Bearer adm"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({"data": {"id": 7}})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client(&server.uri());
        let response = client
            .admin_send(Method::GET, "users", None, Some("7"), None, None)
            .await
            .unwrap();
        assert_eq!(response.body["data"]["id"], 7);
    }
}
