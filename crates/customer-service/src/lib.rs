//! Customer service: request handlers over an event-sourced customer directory,
//! its lifecycle, configuration and HTTP gateway.

pub mod config;
pub mod gateway;
pub mod lifecycle;
pub mod service;

pub use config::{ConfigError, ServiceConfig};
pub use lifecycle::{CustomerServiceController, LifecycleState, ServiceError};
pub use service::{CustomerDirectory, CustomerService};
