//! Configuration for storesync.
//!
//! Settings come from the process environment (after an optional `.env`
//! file) or from a TOML/JSON file. Both paths produce the same
//! [`Settings`] value and run the same validation.
//!
//! # Example
//!
//! ```no_run
//! use storesync_config::Settings;
//!
//! let settings = Settings::from_env()?;
//! println!("CMS at {}", settings.strapi.base_url());
//! # Ok::<(), storesync_config::ConfigError>(())
//! ```

pub mod env;
pub mod error;
pub mod loader;
pub mod settings;
pub mod validation;

pub use env::EnvLoader;
pub use error::{ConfigError, Result};
pub use loader::{ConfigLoader, FileFormat};
pub use settings::{AdminCredentials, Settings, StrapiSettings, UserCredentials, WebhookSettings};
pub use validation::{ConfigValidator, Validate};
