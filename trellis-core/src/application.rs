// Application builder

use crate::logging::info;
use crate::{AppConfig, Container, Controller, Dispatcher, Error, Injectable, Kernel, MiddlewareRef, Router};
use std::sync::Arc;

/// Wires a container, a router and configuration together.
///
/// Register services, controllers and global middleware, then call
/// [`into_kernel`](Application::into_kernel) to start serving requests.
#[derive(Debug)]
pub struct Application {
    container: Container,
    router: Router,
    config: Arc<AppConfig>,
    global_middleware: Vec<MiddlewareRef>,
}

impl Application {
    /// The configuration is registered in the container as a shared instance.
    pub fn new(config: AppConfig) -> Result<Self, Error> {
        config.validate()?;

        let config = Arc::new(config);
        let container = Container::new();
        container.register_instance(config.clone())?;

        let mut router = Router::new();
        router.set_base_url(&config.base_url);

        Ok(Self {
            container,
            router,
            config,
            global_middleware: Vec::new(),
        })
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    /// Direct access for routes added with [`Router::add_route`].
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    /// Register `C` as a dedicated binding and add its routes.
    pub fn register_controller<C: Controller>(&mut self) -> Result<&mut Self, Error> {
        self.container.register_dedicated::<C>()?;
        self.router.register_controller::<C>()?;
        Ok(self)
    }

    /// Register a dedicated service.
    pub fn register_service<T: Injectable>(&mut self) -> Result<&mut Self, Error> {
        self.container.register_dedicated::<T>()?;
        Ok(self)
    }

    pub fn register_service_with<T, F>(&mut self, factory: F) -> Result<&mut Self, Error>
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.container.register_dedicated_with(factory)?;
        Ok(self)
    }

    /// Register a shared service, built once on first use.
    pub fn register_shared_service<T: Injectable>(&mut self) -> Result<&mut Self, Error> {
        self.container.register_shared::<T>()?;
        Ok(self)
    }

    pub fn register_shared_service_with<T, F>(&mut self, factory: F) -> Result<&mut Self, Error>
    where
        T: Injectable,
        F: Fn(&Container) -> Result<T, Error> + Send + Sync + 'static,
    {
        self.container.register_shared_with(factory)?;
        Ok(self)
    }

    /// Run `middleware` before every routed request.
    pub fn use_middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.global_middleware.push(middleware);
        self
    }

    /// Finish registration.
    pub fn into_kernel(self) -> Result<Kernel, Error> {
        info!(
            routes = self.router.len(),
            bindings = self.container.len(),
            global_middleware = self.global_middleware.len(),
            "Application ready"
        );
        self.router.log_routes();

        let dispatcher = Dispatcher::new(self.container);
        let mut kernel = Kernel::new(self.router, dispatcher, self.config)?;
        kernel.set_global_middleware(self.global_middleware);
        Ok(kernel)
    }
}
