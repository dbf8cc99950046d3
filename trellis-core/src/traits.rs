// Core traits for the Trellis framework

use crate::{Action, Constructor, MiddlewareRef};

/// Trait for types the container can build.
///
/// `constructor()` is the declared constructor signature; returning `None`
/// means the type can only be registered together with a factory.
pub trait Injectable: Send + Sync + Sized + 'static {
    fn constructor() -> Option<Constructor<Self>>;
}

/// Trait for HTTP controllers.
///
/// Replaces class and method annotations: the base path, controller-wide
/// middleware, and the action table are declared in code.
pub trait Controller: Injectable {
    /// Path prefix shared by every action of this controller.
    fn base_path() -> Option<&'static str> {
        None
    }

    /// Middleware run before every action of this controller.
    fn middleware() -> Vec<MiddlewareRef> {
        Vec::new()
    }

    /// The actions exposed by this controller.
    fn actions() -> Vec<Action<Self>>;
}
