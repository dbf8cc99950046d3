use serde_json::json;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use trellis_core::{
    Action, AppConfig, Application, Arguments, Constructor, Controller, Error, HttpError, Injectable,
    Method, Middleware, MiddlewareRef, Request, ResponseBody, StatusCode, Verdict,
};

#[derive(Default)]
struct Calls {
    first: AtomicUsize,
    third: AtomicUsize,
}

impl Injectable for Calls {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_| Ok(Calls::default())))
    }
}

struct First {
    calls: Arc<Calls>,
}

impl Middleware for First {
    fn handle(&self, _request: &Request) -> Verdict {
        self.calls.first.fetch_add(1, Ordering::SeqCst);
        Verdict::Proceed
    }
}

impl Injectable for First {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|deps| Ok(First { calls: deps.next()? })).inject::<Calls>("calls"))
    }
}

struct RequireToken;

impl Middleware for RequireToken {
    fn handle(&self, request: &Request) -> Verdict {
        match request.header("x-token") {
            Some("secret") => Verdict::Proceed,
            _ => Verdict::deny_with(StatusCode::UNAUTHORIZED, "missing token"),
        }
    }
}

impl Injectable for RequireToken {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_| Ok(RequireToken)))
    }
}

struct Third {
    calls: Arc<Calls>,
}

impl Middleware for Third {
    fn handle(&self, _request: &Request) -> Verdict {
        self.calls.third.fetch_add(1, Ordering::SeqCst);
        Verdict::Proceed
    }
}

impl Injectable for Third {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|deps| Ok(Third { calls: deps.next()? })).inject::<Calls>("calls"))
    }
}

struct NeverRegistered;

impl Middleware for NeverRegistered {
    fn handle(&self, _request: &Request) -> Verdict {
        Verdict::Proceed
    }
}

struct Users;

impl Users {
    fn show(&self, args: Arguments<'_>) -> Result<serde_json::Value, Error> {
        let id = args.require("id")?;
        if id == "0" {
            return Err(HttpError::not_found("no such user").into());
        }
        Ok(json!({ "id": id }))
    }

    fn create(&self, args: Arguments<'_>) -> Result<serde_json::Value, Error> {
        let name = args
            .body()
            .and_then(|body| body.get("name"))
            .cloned()
            .unwrap_or_default();
        Ok(json!({ "created": name }))
    }

    fn secret(&self, _args: Arguments<'_>) -> Result<&'static str, Error> {
        Ok("classified")
    }

    fn broken(&self, _args: Arguments<'_>) -> Result<(), Error> {
        Err(Error::UnknownBinding { type_name: "Database" })
    }
}

impl Injectable for Users {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_| Ok(Users)))
    }
}

impl Controller for Users {
    fn base_path() -> Option<&'static str> {
        Some("/users")
    }

    fn actions() -> Vec<Action<Self>> {
        vec![
            Action::new("show", Users::show).get("/{id}").path_param("id"),
            Action::new("create", Users::create).post("/").body("payload"),
            Action::new("secret", Users::secret)
                .get("/{id}/secret")
                .middleware(MiddlewareRef::of::<First>())
                .middleware(MiddlewareRef::of::<RequireToken>())
                .middleware(MiddlewareRef::of::<Third>()),
            Action::new("broken", Users::broken).delete("/{id}"),
        ]
    }
}

struct Orphan;

impl Orphan {
    fn ping(&self, _args: Arguments<'_>) -> Result<&'static str, Error> {
        Ok("pong")
    }
}

impl Injectable for Orphan {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_| Ok(Orphan)))
    }
}

impl Controller for Orphan {
    fn middleware() -> Vec<MiddlewareRef> {
        vec![MiddlewareRef::of::<NeverRegistered>()]
    }

    fn actions() -> Vec<Action<Self>> {
        vec![Action::new("ping", Orphan::ping).get("/ping")]
    }
}

struct Reports;

impl Reports {
    fn preflight(&self, _args: Arguments<'_>) -> Result<&'static str, Error> {
        Ok("custom preflight")
    }

    fn list(&self, _args: Arguments<'_>) -> Result<&'static str, Error> {
        Ok("reports")
    }
}

impl Injectable for Reports {
    fn constructor() -> Option<Constructor<Self>> {
        Some(Constructor::new(|_| Ok(Reports)))
    }
}

impl Controller for Reports {
    fn base_path() -> Option<&'static str> {
        Some("/reports")
    }

    fn actions() -> Vec<Action<Self>> {
        vec![
            Action::new("preflight", Reports::preflight).options("/"),
            Action::new("list", Reports::list).get("/"),
            Action::new("create", Reports::list).post("/"),
        ]
    }
}

fn application() -> Application {
    let mut app = Application::new(AppConfig::default()).unwrap();
    app.register_shared_service::<Calls>()
        .unwrap()
        .register_shared_service::<First>()
        .unwrap()
        .register_shared_service::<RequireToken>()
        .unwrap()
        .register_shared_service::<Third>()
        .unwrap()
        .register_controller::<Users>()
        .unwrap()
        .register_controller::<Orphan>()
        .unwrap();
    app
}

fn get(uri: &str) -> Request {
    Request::builder(Method::GET, uri).build().unwrap()
}

#[test]
fn test_path_parameter_reaches_handler() {
    let kernel = application().into_kernel().unwrap();
    let response = kernel.handle(&get("/api/users/42")).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), &ResponseBody::Json(json!({"id": "42"})));
    assert_eq!(response.header("content-type"), Some("application/json"));
    assert_eq!(response.header("allow"), Some("GET"));
    assert_eq!(response.header("access-control-allow-origin"), Some("*"));
}

#[test]
fn test_unmatched_route_is_bare_404() {
    let kernel = application().into_kernel().unwrap();

    for uri in ["/api/users/", "/nope", "/users/42"] {
        let response = kernel.handle(&get(uri)).unwrap();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
        assert!(response.body().is_empty());
        assert!(response.headers().is_empty());
    }
}

#[test]
fn test_options_answers_allowed_methods() {
    let kernel = application().into_kernel().unwrap();
    let request = Request::builder(Method::OPTIONS, "/api/users/42").build().unwrap();
    let response = kernel.handle(&request).unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(response.header("allow"), Some("GET,DELETE"));
    assert!(response.body().is_empty());
}

#[test]
fn test_head_runs_get_without_body() {
    let kernel = application().into_kernel().unwrap();
    let request = Request::builder(Method::HEAD, "/api/users/42").build().unwrap();
    let response = kernel.handle(&request).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.body().is_empty());
}

#[test]
fn test_head_failure_maps_to_no_content() {
    let kernel = application().into_kernel().unwrap();
    let request = Request::builder(Method::HEAD, "/api/users/0").build().unwrap();
    let response = kernel.handle(&request).unwrap();

    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert!(response.body().is_empty());
}

#[test]
fn test_handler_http_error_becomes_json_body() {
    let kernel = application().into_kernel().unwrap();
    let response = kernel.handle(&get("/api/users/0")).unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(
        response.body(),
        &ResponseBody::Json(json!({"error": true, "message": "no such user", "code": 404}))
    );
}

#[test]
fn test_rejection_short_circuits_chain() {
    let app = application();
    let container = app.container().clone();
    let kernel = app.into_kernel().unwrap();

    let response = kernel.handle(&get("/api/users/1/secret")).unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.body(),
        &ResponseBody::Json(json!({"error": true, "message": "missing token", "code": 401}))
    );

    let calls = container.get::<Calls>().unwrap();
    assert_eq!(calls.first.load(Ordering::SeqCst), 1);
    assert_eq!(calls.third.load(Ordering::SeqCst), 0);

    let request = Request::builder(Method::GET, "/api/users/1/secret")
        .header("X-Token", "secret")
        .build()
        .unwrap();
    let response = kernel.handle(&request).unwrap();
    assert_eq!(response.body(), &ResponseBody::Text("classified".to_string()));
    assert_eq!(calls.third.load(Ordering::SeqCst), 1);
}

#[test]
fn test_unregistered_middleware_is_500() {
    let kernel = application().into_kernel().unwrap();
    let response = kernel.handle(&get("/api/ping")).unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert!(matches!(response.body(), ResponseBody::Json(body) if body["code"] == 500));
}

#[test]
fn test_untyped_errors_propagate() {
    let kernel = application().into_kernel().unwrap();
    let request = Request::builder(Method::DELETE, "/api/users/1").build().unwrap();

    assert!(matches!(
        kernel.handle(&request),
        Err(Error::UnknownBinding { type_name: "Database" })
    ));
}

#[test]
fn test_body_binding() {
    let kernel = application().into_kernel().unwrap();
    let request = Request::builder(Method::POST, "/api/users")
        .body(json!({"name": "Ada"}))
        .build()
        .unwrap();
    let response = kernel.handle(&request).unwrap();

    assert_eq!(response.body(), &ResponseBody::Json(json!({"created": "Ada"})));
}

#[test]
fn test_global_middleware_runs_first() {
    let mut app = application();
    app.use_middleware(MiddlewareRef::of::<RequireToken>());
    let mut kernel = app.into_kernel().unwrap();

    let response = kernel.handle(&get("/api/users/42")).unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);

    kernel.remove_global_middleware(MiddlewareRef::of::<RequireToken>());
    assert!(kernel.global_middleware().is_empty());
    let response = kernel.handle(&get("/api/users/42")).unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[test]
fn test_config_is_registered() {
    let app = Application::new(AppConfig::default().with_base_url("/v1")).unwrap();
    let config = app.container().get::<AppConfig>().unwrap();
    assert_eq!(config.base_url, "/v1");
    assert_eq!(app.router().base_url(), "/v1");
}

#[test]
fn test_user_options_route_is_dispatched() {
    let mut app = application();
    app.register_controller::<Reports>().unwrap();
    let kernel = app.into_kernel().unwrap();

    let request = Request::builder(Method::OPTIONS, "/api/reports").build().unwrap();
    let response = kernel.handle(&request).unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.body(), &ResponseBody::Text("custom preflight".to_string()));
    assert_eq!(response.header("allow"), Some("OPTIONS"));

    let response = kernel.handle(&get("/api/reports")).unwrap();
    assert_eq!(response.body(), &ResponseBody::Text("reports".to_string()));
}
