// Routing table: registration, OPTIONS synthesis and matching

use crate::handler::{ActionTable, ControllerActions};
use crate::logging::{debug, info, trace, warn};
use crate::{CompiledPath, Controller, Error, HandlerRef, MiddlewareRef, PathParams};
use http::Method;
use std::collections::HashMap;
use std::sync::Arc;

/// One registered route.
#[derive(Debug, Clone)]
pub struct RouteEntry {
    method: Method,
    matcher: CompiledPath,
    handler: Option<HandlerRef>,
    middleware: Vec<MiddlewareRef>,
    allowed_methods: Vec<Method>,
}

impl RouteEntry {
    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The full route template, base URL included.
    pub fn path(&self) -> &str {
        self.matcher.template()
    }

    pub fn matcher(&self) -> &CompiledPath {
        &self.matcher
    }

    /// `None` only for synthesized OPTIONS routes.
    pub fn handler(&self) -> Option<&HandlerRef> {
        self.handler.as_ref()
    }

    pub fn middleware(&self) -> &[MiddlewareRef] {
        &self.middleware
    }

    /// Whether this OPTIONS route was generated from the routes sharing its path.
    pub fn is_synthesized(&self) -> bool {
        self.handler.is_none()
    }

    /// Methods advertised in `Allow`: the accumulated list for synthesized
    /// OPTIONS routes, otherwise the route's own method.
    pub fn allowed_methods(&self) -> Vec<Method> {
        if self.is_synthesized() {
            self.allowed_methods.clone()
        } else {
            vec![self.method.clone()]
        }
    }

    /// `Allow` header value.
    pub fn allow_header(&self) -> String {
        self.allowed_methods()
            .iter()
            .map(Method::as_str)
            .collect::<Vec<_>>()
            .join(",")
    }
}

/// A matched route plus the parameters captured from the request path.
#[derive(Debug, Clone)]
pub struct RouteMatch<'a> {
    pub route: &'a RouteEntry,
    pub params: PathParams,
}

/// One argument of [`Router::add_route`].
#[derive(Debug, Clone)]
pub enum RouteArg {
    Middleware(MiddlewareRef),
    Handler(HandlerRef),
}

impl From<MiddlewareRef> for RouteArg {
    fn from(middleware: MiddlewareRef) -> Self {
        RouteArg::Middleware(middleware)
    }
}

impl From<HandlerRef> for RouteArg {
    fn from(handler: HandlerRef) -> Self {
        RouteArg::Handler(handler)
    }
}

#[derive(Debug, Clone, Copy)]
struct OptionsSlot {
    position: usize,
    user_defined: bool,
}

/// Routing table.
///
/// Routes are kept per method in registration order and the first match
/// wins. Every non-OPTIONS route gets an OPTIONS counterpart for its path
/// that accumulates the methods registered there, until a user-declared
/// OPTIONS route takes the path over.
#[derive(Debug, Default)]
pub struct Router {
    base_url: String,
    routes: Vec<(Method, Vec<RouteEntry>)>,
    options: HashMap<String, OptionsSlot>,
}

impl Router {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prefix every route registered from now on with `base_url`.
    ///
    /// A leading `/` is added and a trailing `/` removed, so `"/"` clears it.
    pub fn set_base_url(&mut self, base_url: &str) {
        let sanitized = sanitize_path(base_url);
        self.base_url = sanitized.trim_end_matches('/').to_string();
        debug!(base_url = %self.base_url, "Router base URL set");
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Register every routed action of `C`.
    pub fn register_controller<C: Controller>(&mut self) -> Result<(), Error> {
        let table = Arc::new(ControllerActions::<C>::new(C::actions()));
        let controller = table.controller().short_name();

        let prefix = match C::base_path() {
            Some(base_path) => join_paths(&self.base_url, base_path),
            None => self.base_url.clone(),
        };
        let controller_middleware = C::middleware();

        for action in table.actions() {
            let (Some(method), Some(path)) = (action.method(), action.path()) else {
                warn!(controller, action = action.name(), "Action has no route, skipping");
                continue;
            };

            let full_path = join_paths(&prefix, path);
            if !is_identifier(action.name()) {
                return Err(Error::InvalidHandler {
                    path: full_path,
                    method: method.to_string(),
                });
            }

            let mut middleware = controller_middleware.clone();
            middleware.extend_from_slice(action.middleware_refs());

            let erased: Arc<dyn ActionTable> = table.clone();
            let handler = HandlerRef::from_table(erased, action.name());
            self.create_route(&full_path, method.clone(), handler, middleware)?;
        }

        debug!(controller, "Controller registered");
        Ok(())
    }

    /// Add a single route.
    ///
    /// `args` lists middleware followed by exactly one handler, last.
    pub fn add_route(
        &mut self,
        path: &str,
        method: Method,
        args: impl IntoIterator<Item = RouteArg>,
    ) -> Result<(), Error> {
        let mut args: Vec<RouteArg> = args.into_iter().collect();
        let full_path = join_paths(&self.base_url, path);

        let handler = match args.pop() {
            Some(RouteArg::Handler(handler)) if is_identifier(handler.action()) => handler,
            _ => {
                return Err(Error::InvalidHandler {
                    path: full_path,
                    method: method.to_string(),
                });
            }
        };

        let middleware = args
            .into_iter()
            .map(|arg| match arg {
                RouteArg::Middleware(middleware) => Ok(middleware),
                RouteArg::Handler(_) => Err(Error::InvalidMiddleware {
                    path: full_path.clone(),
                    method: method.to_string(),
                }),
            })
            .collect::<Result<Vec<_>, _>>()?;

        self.create_route(&full_path, method, handler, middleware)
    }

    pub fn get(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::GET, args)
    }

    pub fn post(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::POST, args)
    }

    pub fn put(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::PUT, args)
    }

    pub fn patch(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::PATCH, args)
    }

    pub fn delete(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::DELETE, args)
    }

    pub fn options(&mut self, path: &str, args: impl IntoIterator<Item = RouteArg>) -> Result<(), Error> {
        self.add_route(path, Method::OPTIONS, args)
    }

    fn create_route(
        &mut self,
        path: &str,
        method: Method,
        handler: HandlerRef,
        middleware: Vec<MiddlewareRef>,
    ) -> Result<(), Error> {
        let matcher = CompiledPath::compile(path, &method)?;
        let entry = RouteEntry {
            method: method.clone(),
            matcher,
            handler: Some(handler),
            middleware,
            allowed_methods: Vec::new(),
        };

        debug!(method = %method, path, handler = ?entry.handler, "Route registered");

        if method == Method::OPTIONS {
            self.add_user_options(entry);
        } else {
            self.synthesize_options(&entry);
            self.table_mut(&method).push(entry);
        }
        Ok(())
    }

    /// A user-declared OPTIONS route replaces the synthesized one for its path.
    fn add_user_options(&mut self, entry: RouteEntry) {
        let path = entry.path().to_string();
        match self.options.get(&path).copied() {
            Some(slot) if !slot.user_defined => {
                self.table_mut(&Method::OPTIONS)[slot.position] = entry;
                self.options.insert(
                    path,
                    OptionsSlot {
                        position: slot.position,
                        user_defined: true,
                    },
                );
            }
            Some(_) => self.table_mut(&Method::OPTIONS).push(entry),
            None => {
                let table = self.table_mut(&Method::OPTIONS);
                let position = table.len();
                table.push(entry);
                self.options.insert(
                    path,
                    OptionsSlot {
                        position,
                        user_defined: true,
                    },
                );
            }
        }
    }

    fn synthesize_options(&mut self, route: &RouteEntry) {
        let path = route.path().to_string();
        match self.options.get(&path).copied() {
            Some(slot) if slot.user_defined => {
                trace!(path = %path, "OPTIONS route is user-defined, not accumulating");
            }
            Some(slot) => {
                let entry = &mut self.table_mut(&Method::OPTIONS)[slot.position];
                if !entry.allowed_methods.contains(&route.method) {
                    entry.allowed_methods.push(route.method.clone());
                }
            }
            None => {
                let synthesized = RouteEntry {
                    method: Method::OPTIONS,
                    matcher: route.matcher.clone(),
                    handler: None,
                    middleware: route.middleware.clone(),
                    allowed_methods: vec![route.method.clone()],
                };
                let table = self.table_mut(&Method::OPTIONS);
                let position = table.len();
                table.push(synthesized);
                self.options.insert(
                    path,
                    OptionsSlot {
                        position,
                        user_defined: false,
                    },
                );
            }
        }
    }

    fn table_mut(&mut self, method: &Method) -> &mut Vec<RouteEntry> {
        let index = match self.routes.iter().position(|(m, _)| m == method) {
            Some(index) => index,
            None => {
                self.routes.push((method.clone(), Vec::new()));
                self.routes.len() - 1
            }
        };
        &mut self.routes[index].1
    }

    fn table(&self, method: &Method) -> Option<&[RouteEntry]> {
        self.routes
            .iter()
            .find(|(m, _)| m == method)
            .map(|(_, entries)| entries.as_slice())
    }

    /// First route registered for `method` whose template matches `path`.
    pub fn match_route(&self, path: &str, method: &Method) -> Option<RouteMatch<'_>> {
        let entries = self.table(method)?;
        entries.iter().find_map(|route| {
            route
                .matcher
                .captures(path)
                .map(|params| RouteMatch { route, params })
        })
    }

    /// All routes, grouped by method in first-registration order.
    pub fn routes(&self) -> impl Iterator<Item = &RouteEntry> {
        self.routes.iter().flat_map(|(_, entries)| entries.iter())
    }

    pub fn len(&self) -> usize {
        self.routes().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Dump the routing table at `info` level.
    pub fn log_routes(&self) {
        for route in self.routes() {
            let handler = route
                .handler()
                .map(|handler| format!("{handler:?}"))
                .unwrap_or_else(|| "<synthesized>".to_string());
            let middleware: Vec<&str> = route
                .middleware()
                .iter()
                .map(|middleware| middleware.key().short_name())
                .collect();
            info!(
                method = %route.method(),
                path = route.path(),
                handler = %handler,
                middleware = ?middleware,
                parameters = ?route.matcher().param_names(),
                allow = %route.allow_header(),
                "Route"
            );
        }
    }
}

fn sanitize_path(path: &str) -> String {
    if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    }
}

fn join_paths(prefix: &str, path: &str) -> String {
    let path = sanitize_path(path);
    if path == "/" && !prefix.is_empty() {
        return prefix.to_string();
    }
    format!("{prefix}{path}")
}

fn is_identifier(name: &str) -> bool {
    let mut chars = name.chars();
    matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_')
}
