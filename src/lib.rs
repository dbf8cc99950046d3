// Trellis - a small web-application substrate for Rust
//
// Dependency injection with declared constructors, template routing with
// OPTIONS synthesis, and a middleware-aware dispatcher.

// Re-export core functionality
pub use trellis_core::*;

#[cfg(feature = "config")]
pub use trellis_config;

// Prelude for common imports
pub mod prelude {
    pub use crate::{
        Action, AppConfig, Application, Arguments, Constructor, Container, Controller, Error,
        HandlerRef, HttpError, Injectable, Kernel, Method, Middleware, MiddlewareRef, Request,
        Response, ResponseBody, RouteArg, Router, StatusCode, Verdict,
    };
}
