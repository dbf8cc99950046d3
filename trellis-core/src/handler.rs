// Controller actions, handler references and argument binding

use crate::binding::Instance;
use crate::{Body, Container, Controller, Error, HttpError, MiddlewareRef, Request, ResponseBody, TypeKey};
use http::Method;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Where a handler parameter takes its value from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParamSource {
    /// The request itself.
    Request,
    /// A query-string value.
    Query(String),
    /// A header value, matched case-insensitively.
    Header(String),
    /// The whole decoded body.
    Body,
    /// A path capture.
    Params(String),
}

/// A declared handler parameter.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Param {
    pub name: &'static str,
    pub source: ParamSource,
}

/// A bound handler argument.
#[derive(Debug, Clone, Copy)]
pub enum Argument<'r> {
    Request(&'r Request),
    /// A query, header or path value; `None` when absent.
    Value(Option<&'r str>),
    Body(&'r Body),
}

/// Arguments bound for one handler invocation, in declaration order.
#[derive(Debug)]
pub struct Arguments<'r> {
    bound: Vec<(&'static str, Argument<'r>)>,
}

impl<'r> Arguments<'r> {
    pub(crate) fn new(bound: Vec<(&'static str, Argument<'r>)>) -> Self {
        Self { bound }
    }

    pub fn get(&self, name: &str) -> Option<Argument<'r>> {
        self.bound
            .iter()
            .find(|(param, _)| *param == name)
            .map(|(_, argument)| *argument)
    }

    /// A string value by parameter name. `None` if the value is absent or
    /// no such parameter was declared.
    pub fn value(&self, name: &str) -> Option<&'r str> {
        match self.get(name) {
            Some(Argument::Value(value)) => value,
            _ => None,
        }
    }

    /// Like [`value`](Self::value), but a missing value is a 400.
    pub fn require(&self, name: &str) -> Result<&'r str, Error> {
        self.value(name)
            .ok_or_else(|| HttpError::bad_request(format!("Missing required parameter '{name}'")).into())
    }

    /// Parse a required value, answering 400 when it does not parse.
    pub fn parse<T: FromStr>(&self, name: &str) -> Result<T, Error> {
        self.require(name)?
            .parse()
            .map_err(|_| HttpError::bad_request(format!("Invalid value for parameter '{name}'")).into())
    }

    /// The request, if a `ParamSource::Request` parameter was declared.
    pub fn request(&self) -> Option<&'r Request> {
        self.bound.iter().find_map(|(_, argument)| match argument {
            Argument::Request(request) => Some(*request),
            _ => None,
        })
    }

    /// The body, if a `ParamSource::Body` parameter was declared.
    pub fn body(&self) -> Option<&'r Body> {
        self.bound.iter().find_map(|(_, argument)| match argument {
            Argument::Body(body) => Some(*body),
            _ => None,
        })
    }

    pub fn len(&self) -> usize {
        self.bound.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bound.is_empty()
    }
}

type ActionFn<C> = Arc<dyn for<'r> Fn(&C, Arguments<'r>) -> Result<ResponseBody, Error> + Send + Sync>;

/// A controller method exposed as an endpoint.
///
/// ```
/// use trellis_core::{Action, Arguments, Error};
/// use http::Method;
///
/// struct Users;
///
/// impl Users {
///     fn show(&self, args: Arguments<'_>) -> Result<String, Error> {
///         Ok(format!("user {}", args.require("id")?))
///     }
/// }
///
/// let action = Action::new("show", Users::show).get("/{id}").path_param("id");
/// assert_eq!(action.method(), Some(&Method::GET));
/// ```
pub struct Action<C> {
    name: &'static str,
    route: Option<(Method, String)>,
    middleware: Vec<MiddlewareRef>,
    params: Vec<Param>,
    call: ActionFn<C>,
}

impl<C: 'static> Action<C> {
    pub fn new<F, R>(name: &'static str, call: F) -> Self
    where
        F: for<'r> Fn(&C, Arguments<'r>) -> Result<R, Error> + Send + Sync + 'static,
        R: Into<ResponseBody>,
    {
        Self {
            name,
            route: None,
            middleware: Vec::new(),
            params: Vec::new(),
            call: Arc::new(move |controller: &C, args: Arguments<'_>| {
                call(controller, args).map(Into::into)
            }),
        }
    }

    pub fn route(mut self, method: Method, path: impl Into<String>) -> Self {
        self.route = Some((method, path.into()));
        self
    }

    pub fn get(self, path: impl Into<String>) -> Self {
        self.route(Method::GET, path)
    }

    pub fn post(self, path: impl Into<String>) -> Self {
        self.route(Method::POST, path)
    }

    pub fn put(self, path: impl Into<String>) -> Self {
        self.route(Method::PUT, path)
    }

    pub fn patch(self, path: impl Into<String>) -> Self {
        self.route(Method::PATCH, path)
    }

    pub fn delete(self, path: impl Into<String>) -> Self {
        self.route(Method::DELETE, path)
    }

    pub fn options(self, path: impl Into<String>) -> Self {
        self.route(Method::OPTIONS, path)
    }

    /// Run `M` before this action, after the controller-wide middleware.
    pub fn middleware(mut self, middleware: MiddlewareRef) -> Self {
        self.middleware.push(middleware);
        self
    }

    pub fn param(mut self, name: &'static str, source: ParamSource) -> Self {
        self.params.push(Param { name, source });
        self
    }

    pub fn request(self, name: &'static str) -> Self {
        self.param(name, ParamSource::Request)
    }

    pub fn query(self, name: &'static str) -> Self {
        self.param(name, ParamSource::Query(name.to_string()))
    }

    pub fn header(self, name: &'static str) -> Self {
        self.param(name, ParamSource::Header(name.to_string()))
    }

    pub fn body(self, name: &'static str) -> Self {
        self.param(name, ParamSource::Body)
    }

    pub fn path_param(self, name: &'static str) -> Self {
        self.param(name, ParamSource::Params(name.to_string()))
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn method(&self) -> Option<&Method> {
        self.route.as_ref().map(|(method, _)| method)
    }

    pub fn path(&self) -> Option<&str> {
        self.route.as_ref().map(|(_, path)| path.as_str())
    }

    pub fn middleware_refs(&self) -> &[MiddlewareRef] {
        &self.middleware
    }

    pub fn params(&self) -> &[Param] {
        &self.params
    }
}

impl<C> fmt::Debug for Action<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Action")
            .field("name", &self.name)
            .field("route", &self.route)
            .field("middleware", &self.middleware)
            .field("params", &self.params)
            .finish()
    }
}

/// Type-erased view of one controller's actions.
pub(crate) trait ActionTable: Send + Sync {
    fn controller(&self) -> TypeKey;

    fn params(&self, action: &str) -> Option<&[Param]>;

    fn instantiate(&self, container: &Container) -> Result<Instance, Error>;

    fn invoke(&self, instance: &Instance, action: &str, args: Arguments<'_>) -> Result<ResponseBody, Error>;
}

pub(crate) struct ControllerActions<C> {
    actions: Vec<Action<C>>,
}

impl<C: Controller> ControllerActions<C> {
    pub(crate) fn new(actions: Vec<Action<C>>) -> Self {
        Self { actions }
    }

    pub(crate) fn actions(&self) -> &[Action<C>] {
        &self.actions
    }

    fn find(&self, action: &str) -> Option<&Action<C>> {
        self.actions.iter().find(|candidate| candidate.name == action)
    }
}

impl<C: Controller> ActionTable for ControllerActions<C> {
    fn controller(&self) -> TypeKey {
        TypeKey::of::<C>()
    }

    fn params(&self, action: &str) -> Option<&[Param]> {
        self.find(action).map(|action| action.params.as_slice())
    }

    fn instantiate(&self, container: &Container) -> Result<Instance, Error> {
        container.resolve(TypeKey::of::<C>())
    }

    fn invoke(&self, instance: &Instance, action: &str, args: Arguments<'_>) -> Result<ResponseBody, Error> {
        let controller = instance.downcast_ref::<C>().ok_or(Error::TypeMismatch {
            expected: std::any::type_name::<C>(),
            found: "<erased instance>",
        })?;
        let action = self.find(action).ok_or_else(|| Error::InvalidHandlerShape {
            path: String::new(),
            method: action.to_string(),
        })?;
        (action.call)(controller, args)
    }
}

/// Reference from a route to a controller action.
#[derive(Clone)]
pub struct HandlerRef {
    action: String,
    table: Arc<dyn ActionTable>,
}

impl HandlerRef {
    /// Point at `action` on controller `C`.
    pub fn to<C: Controller>(action: impl Into<String>) -> Self {
        Self::from_table(Arc::new(ControllerActions::new(C::actions())), action)
    }

    pub(crate) fn from_table(table: Arc<dyn ActionTable>, action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            table,
        }
    }

    pub fn controller(&self) -> TypeKey {
        self.table.controller()
    }

    pub fn action(&self) -> &str {
        &self.action
    }

    /// Whether the controller declares the referenced action.
    pub fn is_declared(&self) -> bool {
        self.table.params(&self.action).is_some()
    }

    pub(crate) fn params(&self) -> Option<&[Param]> {
        self.table.params(&self.action)
    }

    pub(crate) fn instantiate(&self, container: &Container) -> Result<Instance, Error> {
        self.table.instantiate(container)
    }

    pub(crate) fn invoke(&self, instance: &Instance, args: Arguments<'_>) -> Result<ResponseBody, Error> {
        self.table.invoke(instance, &self.action, args)
    }
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}::{}", self.controller().short_name(), self.action)
    }
}
