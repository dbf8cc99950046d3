// Core library for the Trellis framework
// Dependency injection, route matching, middleware and request dispatch

pub mod application;
pub mod binding;
pub mod config;
pub mod container;
pub mod dispatcher;
pub mod error;
pub mod handler;
pub mod http;
pub mod kernel;
pub mod logging;
pub mod middleware;
pub mod route_pattern;
pub mod routing;
pub mod traits;

// Re-export commonly used types
pub use self::http::*;
pub use ::http::{Method, StatusCode};
pub use application::*;
pub use binding::*;
pub use config::*;
pub use container::*;
pub use dispatcher::*;
pub use error::*;
pub use handler::*;
pub use kernel::*;
pub use middleware::*;
pub use route_pattern::*;
pub use routing::*;
pub use traits::*;
