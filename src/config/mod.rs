//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → ProxyConfig (validated, immutable)
//!     → each UpstreamConfig becomes a RouteOptions registration
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; registrations happen before traffic
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks
//! - Options that need code (hooks, resolvers) are attached programmatically

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config};
pub use schema::{
    ConstraintsConfig, HttpForwardConfig, ListenerConfig, ObservabilityConfig, ProxyConfig,
    ReconnectConfig, ShutdownConfig, UpstreamConfig, WsClientConfig, WsServerConfig,
    DEFAULT_LISTENER,
};
pub use validation::{validate_config, ValidationError};

/// Configuration error, raised synchronously at load or registration time.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Parse error: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation failed: {}", join_errors(.0))]
    Validation(Vec<ValidationError>),

    #[error("upstream must be specified for registration `{0}`")]
    MissingUpstream(String),

    #[error("{field} {reason}")]
    InvalidPolicy {
        field: &'static str,
        reason: &'static str,
    },

    #[error("invalid {field}: {reason}")]
    InvalidUrl { field: &'static str, reason: String },

    #[error("unknown listener `{0}`")]
    UnknownListener(String),

    #[error("invalid route option: {0}")]
    InvalidRoute(String),
}

fn join_errors(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}
