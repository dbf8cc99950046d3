// Middleware contract and references

use crate::{Container, Error, Request, TypeKey};
use http::StatusCode;
use std::fmt;
use std::sync::Arc;

/// A middleware's decision about a request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// Continue with the next middleware or the handler.
    Proceed,
    /// Stop the chain and answer with `status`.
    Reject {
        status: StatusCode,
        message: Option<String>,
    },
}

impl Verdict {
    /// Reject with the default status, 500.
    pub fn deny() -> Self {
        Verdict::Reject {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            message: None,
        }
    }

    pub fn deny_with(status: StatusCode, message: impl Into<String>) -> Self {
        Verdict::Reject {
            status,
            message: Some(message.into()),
        }
    }

    pub fn is_proceed(&self) -> bool {
        matches!(self, Verdict::Proceed)
    }
}

/// Middleware inspects a request before it reaches the handler.
///
/// Implementations are resolved from the container on every request, so a
/// middleware can declare its own dependencies like any other binding.
pub trait Middleware: Send + Sync + 'static {
    fn handle(&self, request: &Request) -> Verdict;
}

type ResolveFn = fn(&Container) -> Result<Arc<dyn Middleware>, Error>;

/// Reference to a middleware type, resolved through the container at dispatch.
#[derive(Clone, Copy)]
pub struct MiddlewareRef {
    key: TypeKey,
    resolve: ResolveFn,
}

impl MiddlewareRef {
    pub fn of<M: Middleware>() -> Self {
        Self {
            key: TypeKey::of::<M>(),
            resolve: |container| {
                let middleware: Arc<dyn Middleware> = container.get::<M>()?;
                Ok(middleware)
            },
        }
    }

    pub fn key(&self) -> TypeKey {
        self.key
    }

    pub fn name(&self) -> &'static str {
        self.key.name()
    }

    pub(crate) fn resolve(&self, container: &Container) -> Result<Arc<dyn Middleware>, Error> {
        (self.resolve)(container)
    }
}

impl PartialEq for MiddlewareRef {
    fn eq(&self, other: &Self) -> bool {
        self.key == other.key
    }
}

impl Eq for MiddlewareRef {}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "MiddlewareRef({})", self.key.short_name())
    }
}
