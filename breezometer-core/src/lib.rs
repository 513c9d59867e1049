//! Client library for the Breezometer air quality, pollen and fire APIs.
//!
//! This crate defines:
//! - Per-endpoint request schemas and validation
//! - Normalisation of validated requests into query parameters
//! - A retrying transport with exponential backoff and response classification
//! - Configuration & credentials handling
//!
//! It is used by `breezometer-cli`, but can also be reused by other binaries or services.

pub mod callback;
pub mod client;
pub mod config;
pub mod endpoint;
pub mod error;
pub mod logger;
pub mod model;
pub mod normalize;
pub mod retry;
pub mod transport;
pub mod validate;

pub use callback::{spawn_with_callback, with_callback};
pub use client::{BreezometerClient, ClientBuilder};
pub use config::Config;
pub use endpoint::Endpoint;
pub use error::{AttemptFailure, BreezometerError, TransportError, ValidationError, Violation};
pub use logger::{LogCrateLogger, LogLevel, Logger, NoopLogger};
pub use model::{OneOrMany, Report, Snapshot};
pub use retry::RetryPolicy;
pub use transport::{HttpReply, ReqwestTransport, Transport};
