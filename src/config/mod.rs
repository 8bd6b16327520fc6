//! Configuration management subsystem.
//!
//! # Data Flow
//! ```text
//! config file (TOML)
//!     → loader.rs (parse & deserialize)
//!     → validation.rs (semantic checks)
//!     → EngineConfig (validated, immutable)
//!     → FetchEngine::builder(config) hands each section to its subsystem
//! ```
//!
//! # Design Decisions
//! - Config is immutable once loaded; an engine is built from one snapshot
//! - All fields have defaults to allow minimal configs
//! - Validation separates syntactic (serde) from semantic checks

pub mod loader;
pub mod schema;
pub mod validation;

pub use loader::{load_config, parse_config, ConfigError};
pub use schema::{
    CacheConfig, CircuitBreakerConfig, ConcurrencyConfig, EngineConfig, LogFormat,
    ObservabilityConfig, RateLimitConfig, RetryConfig, SizeBy, TimeoutConfig, TransportConfig,
};
pub use validation::{validate_config, ValidationError};
