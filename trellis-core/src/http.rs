// HTTP request and response types

use crate::logging::debug;
use crate::{Error, HttpError};
use http::header::{CONTENT_TYPE, COOKIE, HOST, HeaderMap, HeaderName, HeaderValue};
use http::uri::Authority;
use http::{Method, StatusCode, Version};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};

/// Read-only view of an inbound request.
///
/// Built once per request, either with [`Request::builder`] or from an
/// `http::Request` via [`Request::from_http`].
#[derive(Debug, Clone)]
pub struct Request {
    method: Method,
    path: String,
    version: Version,
    headers: HeaderMap,
    cookies: HashMap<String, String>,
    query: HashMap<String, String>,
    body: Body,
    secure: bool,
    authority: Option<Authority>,
    client_addr: Option<SocketAddr>,
    server_addr: Option<SocketAddr>,
}

impl Request {
    /// Start building a request. `uri` may carry a query string.
    pub fn builder(method: Method, uri: &str) -> RequestBuilder {
        let (path, query) = split_uri(uri);
        RequestBuilder {
            request: Request {
                method,
                path: path.to_string(),
                version: Version::HTTP_11,
                headers: HeaderMap::new(),
                cookies: HashMap::new(),
                query: parse_query(query),
                body: Body::default(),
                secure: false,
                authority: None,
                client_addr: None,
                server_addr: None,
            },
            error: None,
        }
    }

    /// Snapshot an `http::Request`.
    ///
    /// Cookies come from every `Cookie` header; JSON and form-encoded bodies
    /// are decoded into named fields, anything else is kept as text.
    pub fn from_http(request: http::Request<Vec<u8>>) -> Result<Self, Error> {
        let (parts, bytes) = request.into_parts();

        let cookies = parts
            .headers
            .get_all(COOKIE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .flat_map(parse_cookies)
            .collect();

        let content_type = parts
            .headers
            .get(CONTENT_TYPE)
            .and_then(|value| value.to_str().ok())
            .unwrap_or_default();
        let body = Body::decode(content_type, &bytes)?;

        Ok(Self {
            method: parts.method,
            path: parts.uri.path().to_string(),
            version: parts.version,
            secure: parts.uri.scheme_str() == Some("https"),
            authority: parts.uri.authority().cloned(),
            client_addr: None,
            server_addr: None,
            cookies,
            query: parse_query(parts.uri.query()),
            headers: parts.headers,
            body,
        })
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    /// The raw path, without the query string.
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Header value by case-insensitive name.
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    pub fn cookie(&self, name: &str) -> Option<&str> {
        self.cookies.get(name).map(String::as_str)
    }

    pub fn cookies(&self) -> &HashMap<String, String> {
        &self.cookies
    }

    pub fn has_cookie(&self, name: &str) -> bool {
        self.cookies.contains_key(name)
    }

    pub fn query(&self, name: &str) -> Option<&str> {
        self.query.get(name).map(String::as_str)
    }

    pub fn queries(&self) -> &HashMap<String, String> {
        &self.query
    }

    pub fn body(&self) -> &Body {
        &self.body
    }

    pub fn is_secure(&self) -> bool {
        self.secure
    }

    /// Host name from an absolute request URI, else from the `Host` header.
    pub fn host(&self) -> Option<&str> {
        match &self.authority {
            Some(authority) => Some(authority.host()),
            None => self
                .header(HOST.as_str())
                .map(host_part)
                .filter(|host| !host.is_empty()),
        }
    }

    /// Explicit port of the URI or `Host` header, then the local socket's
    /// port, then the scheme default.
    pub fn port(&self) -> u16 {
        let explicit = match &self.authority {
            Some(authority) => authority.port_u16(),
            None => self
                .header(HOST.as_str())
                .and_then(|value| value.parse::<Authority>().ok())
                .and_then(|authority| authority.port_u16()),
        };
        explicit
            .or_else(|| self.server_addr.map(|addr| addr.port()))
            .unwrap_or(if self.secure { 443 } else { 80 })
    }

    pub fn client_ip(&self) -> Option<IpAddr> {
        self.client_addr.map(|addr| addr.ip())
    }

    pub fn server_ip(&self) -> Option<IpAddr> {
        self.server_addr.map(|addr| addr.ip())
    }

    /// Attach the peer address known to the server adapter.
    pub fn with_client_addr(mut self, addr: SocketAddr) -> Self {
        self.client_addr = Some(addr);
        self
    }

    /// Attach the local address the request was accepted on.
    pub fn with_server_addr(mut self, addr: SocketAddr) -> Self {
        self.server_addr = Some(addr);
        self
    }

    /// Same request under another method. Used to serve HEAD through GET routes.
    pub(crate) fn with_method(&self, method: Method) -> Self {
        let mut request = self.clone();
        request.method = method;
        request
    }
}

/// Builder returned by [`Request::builder`].
#[derive(Debug)]
pub struct RequestBuilder {
    request: Request,
    error: Option<Error>,
}

impl RequestBuilder {
    pub fn header(mut self, name: &str, value: &str) -> Self {
        match (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            (Ok(name), Ok(value)) => {
                self.request.headers.append(name, value);
            }
            _ => {
                self.error.get_or_insert(Error::InvalidHeader {
                    name: name.to_string(),
                });
            }
        }
        self
    }

    pub fn cookie(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.cookies.insert(name.into(), value.into());
        self
    }

    pub fn query(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.request.query.insert(name.into(), value.into());
        self
    }

    pub fn body(mut self, body: impl Into<Body>) -> Self {
        self.request.body = body.into();
        self
    }

    pub fn version(mut self, version: Version) -> Self {
        self.request.version = version;
        self
    }

    pub fn secure(mut self, secure: bool) -> Self {
        self.request.secure = secure;
        self
    }

    pub fn client_addr(mut self, addr: SocketAddr) -> Self {
        self.request.client_addr = Some(addr);
        self
    }

    pub fn server_addr(mut self, addr: SocketAddr) -> Self {
        self.request.server_addr = Some(addr);
        self
    }

    /// Finish the request; fails on the first malformed header.
    pub fn build(self) -> Result<Request, Error> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.request),
        }
    }
}

/// Decoded request body.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Body(Value);

impl Body {
    fn decode(content_type: &str, bytes: &[u8]) -> Result<Self, Error> {
        if bytes.is_empty() {
            return Ok(Self::default());
        }

        let mime = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        match mime.as_str() {
            "application/json" => serde_json::from_slice(bytes)
                .map(Self)
                .map_err(|err| HttpError::bad_request(format!("Malformed JSON body: {err}")).into()),
            "application/x-www-form-urlencoded" => {
                let pairs: Vec<(String, String)> = serde_urlencoded::from_bytes(bytes)
                    .map_err(|err| HttpError::bad_request(format!("Malformed form body: {err}")))?;
                let fields: Map<String, Value> = pairs
                    .into_iter()
                    .map(|(key, value)| (key, Value::String(value)))
                    .collect();
                Ok(Self(Value::Object(fields)))
            }
            _ => {
                debug!(content_type = %mime, "Keeping request body as text");
                Ok(Self(Value::String(String::from_utf8_lossy(bytes).into_owned())))
            }
        }
    }

    /// A named body field.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    pub fn value(&self) -> &Value {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_null()
    }

    /// Deserialize the whole body into `T`.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, Error> {
        Ok(serde_json::from_value(self.0.clone())?)
    }
}

impl From<Value> for Body {
    fn from(value: Value) -> Self {
        Self(value)
    }
}

/// Response body: nothing, a literal string, or a structured value.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum ResponseBody {
    #[default]
    Empty,
    Text(String),
    Json(Value),
}

impl ResponseBody {
    /// Serialize `value` into a structured body.
    pub fn json<T: Serialize>(value: &T) -> Result<Self, Error> {
        Ok(Self::Json(serde_json::to_value(value)?))
    }

    pub fn is_empty(&self) -> bool {
        matches!(self, ResponseBody::Empty)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, Error> {
        match self {
            ResponseBody::Empty => Ok(Vec::new()),
            ResponseBody::Text(text) => Ok(text.as_bytes().to_vec()),
            ResponseBody::Json(value) => Ok(serde_json::to_vec(value)?),
        }
    }
}

impl From<()> for ResponseBody {
    fn from(_: ()) -> Self {
        ResponseBody::Empty
    }
}

impl From<String> for ResponseBody {
    fn from(text: String) -> Self {
        ResponseBody::Text(text)
    }
}

impl From<&str> for ResponseBody {
    fn from(text: &str) -> Self {
        ResponseBody::Text(text.to_string())
    }
}

impl From<Value> for ResponseBody {
    fn from(value: Value) -> Self {
        ResponseBody::Json(value)
    }
}

/// Mutable response built up during dispatch.
#[derive(Debug, Clone, Default)]
pub struct Response {
    status: StatusCode,
    headers: HeaderMap,
    body: ResponseBody,
}

impl Response {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn set_status(&mut self, status: StatusCode) {
        self.status = status;
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|value| value.to_str().ok())
    }

    /// Set a header, replacing any previous value.
    pub fn set_header(&mut self, name: &str, value: &str) -> Result<(), Error> {
        let invalid = || Error::InvalidHeader {
            name: name.to_string(),
        };
        let header_name = HeaderName::from_bytes(name.as_bytes()).map_err(|_| invalid())?;
        let header_value = HeaderValue::from_str(value).map_err(|_| invalid())?;
        self.headers.insert(header_name, header_value);
        Ok(())
    }

    pub fn insert_header(&mut self, name: HeaderName, value: HeaderValue) {
        self.headers.insert(name, value);
    }

    /// Merge a prepared header map, later values replacing earlier ones.
    pub fn set_headers(&mut self, headers: &HeaderMap) {
        for (name, value) in headers {
            self.headers.insert(name.clone(), value.clone());
        }
    }

    pub fn body(&self) -> &ResponseBody {
        &self.body
    }

    pub fn set_body(&mut self, body: impl Into<ResponseBody>) {
        self.body = body.into();
    }

    pub fn clear_body(&mut self) {
        self.body = ResponseBody::Empty;
    }

    /// Convert into an `http::Response` with the body serialized.
    pub fn into_http(self) -> Result<http::Response<Vec<u8>>, Error> {
        let bytes = self.body.to_bytes()?;
        let mut response = http::Response::new(bytes);
        *response.status_mut() = self.status;
        *response.headers_mut() = self.headers;
        Ok(response)
    }
}

fn split_uri(uri: &str) -> (&str, Option<&str>) {
    match uri.split_once('?') {
        Some((path, query)) => (path, Some(query)),
        None => (uri, None),
    }
}

fn parse_query(query: Option<&str>) -> HashMap<String, String> {
    let Some(query) = query else {
        return HashMap::new();
    };
    serde_urlencoded::from_str::<Vec<(String, String)>>(query)
        .map(|pairs| pairs.into_iter().collect())
        .unwrap_or_else(|err| {
            debug!(error = %err, "Ignoring malformed query string");
            HashMap::new()
        })
}

/// `host[:port]` or `[v6]:port` without the port.
fn host_part(value: &str) -> &str {
    match value.find(']') {
        Some(end) if value.starts_with('[') => &value[..=end],
        _ => value.split(':').next().unwrap_or(value),
    }
}

fn parse_cookies(header: &str) -> impl Iterator<Item = (String, String)> + '_ {
    header.split(';').filter_map(|pair| {
        let (name, value) = pair.split_once('=')?;
        let name = name.trim();
        if name.is_empty() {
            return None;
        }
        Some((name.to_string(), value.trim().trim_matches('"').to_string()))
    })
}
