//! Payment gateway adapters.
//!
//! - `HttpPaymentGateway` - REST client used in production
//! - `MockPaymentGateway` - in-memory gateway for tests and local runs

mod gateway_types;
mod http_gateway;
mod mock_gateway;

pub use http_gateway::HttpPaymentGateway;
pub use mock_gateway::{MethodCall, MockPaymentGateway};
