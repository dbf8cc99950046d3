// Error types for the Trellis framework

use http::StatusCode;
use serde_json::{Value, json};
use thiserror::Error;

/// A failure that carries the HTTP status it should be answered with.
///
/// Handlers return it (through `Error::Http`) to refuse a request; the kernel
/// turns it into a JSON error body.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{message}")]
pub struct HttpError {
    status: StatusCode,
    message: String,
}

impl HttpError {
    pub fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, message)
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::new(StatusCode::UNAUTHORIZED, message)
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::new(StatusCode::FORBIDDEN, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(StatusCode::NOT_FOUND, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(StatusCode::INTERNAL_SERVER_ERROR, message)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// The structured body sent to the client: `{"error", "message", "code"}`.
    pub fn to_json(&self) -> Value {
        json!({
            "error": true,
            "message": self.message,
            "code": self.status.as_u16(),
        })
    }
}

#[derive(Error, Debug)]
pub enum Error {
    // Container registration
    #[error("`{type_name}` has no constructor and no factory was supplied")]
    NoConstructor { type_name: &'static str },

    #[error("constructor parameter `{param}` of `{type_name}` is optional; injected parameters must be required")]
    OptionalParameter {
        type_name: &'static str,
        param: &'static str,
    },

    #[error("constructor parameter `{param}` of `{type_name}` is nullable; injected parameters cannot be null")]
    NullableParameter {
        type_name: &'static str,
        param: &'static str,
    },

    #[error("constructor parameter `{param}` of `{type_name}` has no type")]
    MissingType {
        type_name: &'static str,
        param: &'static str,
    },

    #[error("constructor parameter `{param}` of `{type_name}` has builtin type `{builtin}`, which cannot be injected")]
    BuiltinType {
        type_name: &'static str,
        param: &'static str,
        builtin: &'static str,
    },

    #[error("constructor parameter `{param}` of `{type_name}` references unknown type `{referenced}`")]
    UnknownType {
        type_name: &'static str,
        param: &'static str,
        referenced: String,
    },

    #[error("constructor parameter `{param}` of `{type_name}` references `{referenced}`, which matches several bindings: {}", candidates.join(", "))]
    AmbiguousType {
        type_name: &'static str,
        param: &'static str,
        referenced: String,
        candidates: Vec<&'static str>,
    },

    #[error("constructor parameter `{param}` of `{type_name}` depends on `{type_name}` itself")]
    SelfDependency {
        type_name: &'static str,
        param: &'static str,
    },

    #[error("cyclic dependency between `{type_name}` and `{dependency}`")]
    CyclicDependency {
        type_name: &'static str,
        dependency: &'static str,
    },

    // Container resolution
    #[error("no binding registered for `{type_name}`")]
    UnknownBinding { type_name: &'static str },

    #[error("circular dependency while resolving: {}", path.join(" -> "))]
    CircularResolution { path: Vec<&'static str> },

    #[error("expected an instance of `{expected}` but the binding produced `{found}`")]
    TypeMismatch {
        expected: &'static str,
        found: &'static str,
    },

    #[error("`{type_name}` asked for more dependencies than it declared")]
    MissingDependency { type_name: &'static str },

    // Route registration
    #[error("parameter in path '{path}' for method {method} is never closed")]
    UnterminatedParameter { path: String, method: String },

    #[error("path '{path}' cannot be compiled: {reason}")]
    InvalidPattern { path: String, reason: String },

    #[error("the handler for '{method}' '{path}' must be a controller action reference")]
    InvalidHandler { path: String, method: String },

    #[error("invalid middleware for '{method}' '{path}'")]
    InvalidMiddleware { path: String, method: String },

    #[error("invalid header `{name}`")]
    InvalidHeader { name: String },

    // Dispatch
    #[error("the handler for endpoint '{method}' '{path}' should reference an action declared by its controller")]
    InvalidHandlerShape { path: String, method: String },

    #[error("middleware `{middleware}` cannot be resolved")]
    InvalidMiddlewareType { middleware: &'static str },

    #[error("{}", rejection_message(middleware, message))]
    MiddlewareRejected {
        middleware: &'static str,
        status: StatusCode,
        message: Option<String>,
    },

    #[error(transparent)]
    Http(#[from] HttpError),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    /// Status code for the HTTP-carrying family, `None` for everything else.
    ///
    /// Only errors with a status are translated into client responses; the
    /// rest propagate out of the kernel untouched.
    pub fn http_status(&self) -> Option<StatusCode> {
        match self {
            Error::InvalidHandlerShape { .. } | Error::InvalidMiddlewareType { .. } => {
                Some(StatusCode::INTERNAL_SERVER_ERROR)
            }
            Error::MiddlewareRejected { status, .. } => Some(*status),
            Error::Http(err) => Some(err.status()),
            _ => None,
        }
    }

    /// Convert into an `HttpError` if this error carries a status.
    pub fn into_http_error(self) -> Result<HttpError, Error> {
        match self.http_status() {
            Some(status) => match self {
                Error::Http(err) => Ok(err),
                other => Ok(HttpError::new(status, other.to_string())),
            },
            None => Err(self),
        }
    }

    pub fn is_http(&self) -> bool {
        self.http_status().is_some()
    }
}

fn rejection_message(middleware: &str, message: &Option<String>) -> String {
    match message {
        Some(message) => message.clone(),
        None => format!("middleware `{middleware}` rejected the request"),
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
