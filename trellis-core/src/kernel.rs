// Request handling entry point

use crate::logging::{debug, trace};
use crate::{AppConfig, Dispatcher, Error, MiddlewareRef, Request, Response, RouteEntry, Router};
use http::header::{ALLOW, HeaderMap, HeaderValue};
use http::{Method, StatusCode};
use std::sync::Arc;

/// Turns requests into responses.
///
/// Built once registration is finished; the router is read-only from then
/// on and a kernel can be shared between threads.
#[derive(Debug, Clone)]
pub struct Kernel {
    router: Arc<Router>,
    dispatcher: Dispatcher,
    config: Arc<AppConfig>,
    default_headers: HeaderMap,
    cors_headers: HeaderMap,
    global_middleware: Vec<MiddlewareRef>,
}

impl Kernel {
    /// Header values from `config` are validated here.
    pub fn new(router: Router, dispatcher: Dispatcher, config: Arc<AppConfig>) -> Result<Self, Error> {
        let default_headers = config.default_header_map()?;
        let cors_headers = config.cors.header_map()?;
        Ok(Self {
            router: Arc::new(router),
            dispatcher,
            config,
            default_headers,
            cors_headers,
            global_middleware: Vec::new(),
        })
    }

    pub fn router(&self) -> &Router {
        &self.router
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn set_global_middleware(&mut self, middleware: Vec<MiddlewareRef>) -> &mut Self {
        self.global_middleware = middleware;
        self
    }

    pub fn add_global_middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.global_middleware.push(middleware);
        self
    }

    pub fn remove_global_middleware(&mut self, middleware: MiddlewareRef) -> &mut Self {
        self.global_middleware.retain(|existing| *existing != middleware);
        self
    }

    pub fn global_middleware(&self) -> &[MiddlewareRef] {
        &self.global_middleware
    }

    /// Handle one request.
    ///
    /// Errors carrying an HTTP status become a JSON error response; any
    /// other error is returned to the caller.
    pub fn handle(&self, request: &Request) -> Result<Response, Error> {
        let mut response = Response::new();

        let is_head = request.method() == Method::HEAD;
        let lookup_method = if is_head { Method::GET } else { request.method().clone() };

        let Some(found) = self.router.match_route(request.path(), &lookup_method) else {
            debug!(method = %request.method(), path = request.path(), "No route matched");
            response.set_status(StatusCode::NOT_FOUND);
            return Ok(response);
        };
        let route = found.route;
        trace!(method = %route.method(), path = route.path(), "Route matched");

        if route.is_synthesized() {
            response.set_headers(&self.default_headers);
            self.dispatcher
                .dispatch_options(route, &self.cors_headers, &mut response)?;
            return Ok(response);
        }

        self.apply_headers(route, &mut response)?;

        let outcome = if is_head {
            self.run(route, &request.with_method(Method::GET), &mut response)
        } else {
            self.run(route, request, &mut response)
        };

        if let Err(err) = outcome {
            let failure = err.into_http_error()?;
            debug!(status = %failure.status(), message = failure.message(), "Request failed");
            response.set_status(failure.status());
            response.set_body(failure.to_json());
        }

        if is_head {
            response.clear_body();
            if response.status().as_u16() >= 299 {
                response.set_status(StatusCode::NO_CONTENT);
            }
        }

        Ok(response)
    }

    fn run(&self, route: &RouteEntry, request: &Request, response: &mut Response) -> Result<(), Error> {
        self.dispatcher.run_middleware(&self.global_middleware, request)?;
        self.dispatcher.dispatch(route, request, response)
    }

    fn apply_headers(&self, route: &RouteEntry, response: &mut Response) -> Result<(), Error> {
        response.set_headers(&self.default_headers);
        response.set_headers(&self.cors_headers);
        let allow = HeaderValue::from_str(&route.allow_header()).map_err(|_| Error::InvalidHeader {
            name: ALLOW.to_string(),
        })?;
        response.insert_header(ALLOW, allow);
        Ok(())
    }
}
