// Dispatching matched routes to controller actions

use crate::handler::{Argument, Arguments, ParamSource};
use crate::logging::{debug, trace, warn};
use crate::{Container, Error, MiddlewareRef, Request, Response, RouteEntry, Verdict};
use http::StatusCode;
use http::header::{ALLOW, HeaderMap, HeaderValue};

/// Runs a matched route: middleware, argument binding, handler invocation.
#[derive(Debug, Clone)]
pub struct Dispatcher {
    container: Container,
}

impl Dispatcher {
    pub fn new(container: Container) -> Self {
        Self { container }
    }

    pub fn container(&self) -> &Container {
        &self.container
    }

    /// Dispatch `request` to the handler of `route`, storing its return value
    /// as the response body.
    pub fn dispatch(&self, route: &RouteEntry, request: &Request, response: &mut Response) -> Result<(), Error> {
        let invalid_shape = || Error::InvalidHandlerShape {
            path: route.path().to_string(),
            method: route.method().to_string(),
        };
        let handler = route.handler().ok_or_else(invalid_shape)?;
        let params = handler.params().ok_or_else(invalid_shape)?;

        let controller = handler.instantiate(&self.container)?;

        self.run_middleware(route.middleware(), request)?;

        let captured = route.matcher().captures(request.path()).unwrap_or_default();
        let bound = params
            .iter()
            .map(|param| {
                let argument = match &param.source {
                    ParamSource::Request => Argument::Request(request),
                    ParamSource::Query(name) => Argument::Value(request.query(name)),
                    ParamSource::Header(name) => Argument::Value(request.header(name)),
                    ParamSource::Body => Argument::Body(request.body()),
                    ParamSource::Params(name) => Argument::Value(captured.get(name)),
                };
                (param.name, argument)
            })
            .collect();

        trace!(handler = ?handler, "Invoking handler");
        let body = handler.invoke(&controller, Arguments::new(bound))?;
        response.set_body(body);
        Ok(())
    }

    /// Run `chain` in order, stopping at the first rejection.
    pub fn run_middleware(&self, chain: &[MiddlewareRef], request: &Request) -> Result<(), Error> {
        debug!(middleware_count = chain.len(), path = request.path(), "Executing middleware chain");

        for middleware in chain {
            if !self.container.has_key(middleware.key()) {
                warn!(middleware = middleware.name(), "Middleware not registered in container");
                return Err(Error::InvalidMiddlewareType {
                    middleware: middleware.name(),
                });
            }

            match middleware.resolve(&self.container)?.handle(request) {
                Verdict::Proceed => {
                    trace!(middleware = middleware.name(), "Middleware passed");
                }
                Verdict::Reject { status, message } => {
                    debug!(middleware = middleware.name(), %status, "Middleware rejected request");
                    return Err(Error::MiddlewareRejected {
                        middleware: middleware.name(),
                        status,
                        message,
                    });
                }
            }
        }
        Ok(())
    }

    /// Answer a synthesized OPTIONS route: CORS headers, `Allow`, 204.
    ///
    /// `cors_headers` is the map prepared once from `CorsConfig::header_map`.
    pub fn dispatch_options(
        &self,
        route: &RouteEntry,
        cors_headers: &HeaderMap,
        response: &mut Response,
    ) -> Result<(), Error> {
        response.set_headers(cors_headers);
        let allow = HeaderValue::from_str(&route.allow_header()).map_err(|_| Error::InvalidHeader {
            name: ALLOW.to_string(),
        })?;
        response.insert_header(ALLOW, allow);
        response.set_status(StatusCode::NO_CONTENT);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        Action, Constructor, Controller, CorsConfig, HandlerRef, Injectable, Middleware, ResponseBody, Router,
    };
    use http::Method;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Hits(AtomicUsize);

    impl Injectable for Hits {
        fn constructor() -> Option<Constructor<Self>> {
            Some(Constructor::new(|_| Ok(Hits::default())))
        }
    }

    struct Counting {
        hits: Arc<Hits>,
    }

    impl Middleware for Counting {
        fn handle(&self, _request: &Request) -> Verdict {
            self.hits.0.fetch_add(1, Ordering::SeqCst);
            Verdict::Proceed
        }
    }

    impl Injectable for Counting {
        fn constructor() -> Option<Constructor<Self>> {
            Some(Constructor::new(|deps| Ok(Counting { hits: deps.next()? })).inject::<Hits>("hits"))
        }
    }

    struct Refuse;

    impl Middleware for Refuse {
        fn handle(&self, _request: &Request) -> Verdict {
            Verdict::deny_with(StatusCode::FORBIDDEN, "nope")
        }
    }

    impl Injectable for Refuse {
        fn constructor() -> Option<Constructor<Self>> {
            Some(Constructor::new(|_| Ok(Refuse)))
        }
    }

    struct Users;

    impl Users {
        fn show(&self, args: Arguments<'_>) -> Result<String, Error> {
            Ok(format!("{}:{}", args.require("id")?, args.value("fields").unwrap_or("all")))
        }
    }

    impl Injectable for Users {
        fn constructor() -> Option<Constructor<Self>> {
            Some(Constructor::new(|_| Ok(Users)))
        }
    }

    impl Controller for Users {
        fn actions() -> Vec<Action<Self>> {
            vec![
                Action::new("show", Users::show)
                    .get("/users/{id}")
                    .path_param("id")
                    .query("fields"),
            ]
        }
    }

    fn setup() -> (Container, Router) {
        let container = Container::new();
        container.register_shared::<Hits>().unwrap();
        container.register_shared::<Counting>().unwrap();
        container.register_shared::<Refuse>().unwrap();
        container.register_dedicated::<Users>().unwrap();
        (container, Router::new())
    }

    #[test]
    fn test_dispatch_binds_params_and_query() {
        let (container, mut router) = setup();
        router.register_controller::<Users>().unwrap();
        let dispatcher = Dispatcher::new(container);

        let request = Request::builder(Method::GET, "/users/42?fields=name").build().unwrap();
        let route = router.match_route(request.path(), &Method::GET).unwrap().route;
        let mut response = Response::new();
        dispatcher.dispatch(route, &request, &mut response).unwrap();

        assert_eq!(response.body(), &ResponseBody::Text("42:name".to_string()));
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn test_rejection_stops_chain() {
        let (container, _) = setup();
        let dispatcher = Dispatcher::new(container.clone());
        let request = Request::builder(Method::GET, "/").build().unwrap();

        let chain = [
            MiddlewareRef::of::<Counting>(),
            MiddlewareRef::of::<Refuse>(),
            MiddlewareRef::of::<Counting>(),
        ];
        let err = dispatcher.run_middleware(&chain, &request).unwrap_err();
        assert!(matches!(
            err,
            Error::MiddlewareRejected { status, .. } if status == StatusCode::FORBIDDEN
        ));
        assert_eq!(container.get::<Hits>().unwrap().0.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unregistered_middleware_is_500() {
        let dispatcher = Dispatcher::new(Container::new());
        let request = Request::builder(Method::GET, "/").build().unwrap();
        let err = dispatcher
            .run_middleware(&[MiddlewareRef::of::<Refuse>()], &request)
            .unwrap_err();
        assert!(matches!(err, Error::InvalidMiddlewareType { .. }));
        assert_eq!(err.http_status(), Some(StatusCode::INTERNAL_SERVER_ERROR));
    }

    #[test]
    fn test_undeclared_action_is_invalid_shape() {
        let (container, mut router) = setup();
        router
            .get("/ghost", [HandlerRef::to::<Users>("ghost").into()])
            .unwrap();
        let dispatcher = Dispatcher::new(container);

        let request = Request::builder(Method::GET, "/ghost").build().unwrap();
        let route = router.match_route("/ghost", &Method::GET).unwrap().route;
        let err = dispatcher.dispatch(route, &request, &mut Response::new()).unwrap_err();
        assert!(matches!(err, Error::InvalidHandlerShape { .. }));
    }

    #[test]
    fn test_dispatch_options() {
        let (container, mut router) = setup();
        router.register_controller::<Users>().unwrap();
        let dispatcher = Dispatcher::new(container);

        let route = router.match_route("/users/1", &Method::OPTIONS).unwrap().route;
        let cors_headers = CorsConfig::default().header_map().unwrap();
        let mut response = Response::new();
        dispatcher
            .dispatch_options(route, &cors_headers, &mut response)
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert_eq!(response.header("allow"), Some("GET"));
        assert_eq!(response.header("access-control-allow-origin"), Some("*"));
    }

    #[test]
    fn test_dispatch_options_uses_prepared_headers() {
        let (container, mut router) = setup();
        router.register_controller::<Users>().unwrap();
        let dispatcher = Dispatcher::new(container);

        let mut cors_headers = HeaderMap::new();
        cors_headers.insert(
            "access-control-allow-origin",
            HeaderValue::from_static("https://app.example"),
        );

        let route = router.match_route("/users/1", &Method::OPTIONS).unwrap().route;
        let mut response = Response::new();
        dispatcher
            .dispatch_options(route, &cors_headers, &mut response)
            .unwrap();
        assert_eq!(
            response.header("access-control-allow-origin"),
            Some("https://app.example")
        );
        assert_eq!(response.header("access-control-allow-methods"), None);
    }
}
