use std::collections::HashMap;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::Error;
use crate::settings::JsonpDescriptor;

/// HTTP method for requests, plus the JSONP pseudo-method.
///
/// Serialized lowercase; parsed case-insensitively, so `"POST"` and `"post"`
/// both deserialize.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq, Hash, Default)]
#[serde(rename_all = "lowercase")]
pub enum Method {
    #[default]
    GET,
    HEAD,
    POST,
    PUT,
    DELETE,
    PATCH,
    OPTIONS,
    /// GET performed through a callback-wrapped script load.
    JSONP,
}

impl Method {
    pub fn as_str(&self) -> &'static str {
        match self {
            Method::GET => "get",
            Method::HEAD => "head",
            Method::POST => "post",
            Method::PUT => "put",
            Method::DELETE => "delete",
            Method::PATCH => "patch",
            Method::OPTIONS => "options",
            Method::JSONP => "jsonp",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "get" => Ok(Method::GET),
            "head" => Ok(Method::HEAD),
            "post" => Ok(Method::POST),
            "put" => Ok(Method::PUT),
            "delete" => Ok(Method::DELETE),
            "patch" => Ok(Method::PATCH),
            "options" => Ok(Method::OPTIONS),
            "jsonp" => Ok(Method::JSONP),
            _ => Err(Error::InvalidMethod {
                method: s.to_string(),
            }),
        }
    }
}

impl<'de> Deserialize<'de> for Method {
    fn deserialize<D: serde::Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

impl From<Method> for http::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::GET | Method::JSONP => http::Method::GET,
            Method::POST => http::Method::POST,
            Method::PUT => http::Method::PUT,
            Method::DELETE => http::Method::DELETE,
            Method::PATCH => http::Method::PATCH,
            Method::HEAD => http::Method::HEAD,
            Method::OPTIONS => http::Method::OPTIONS,
        }
    }
}

impl TryFrom<http::Method> for Method {
    type Error = Error;

    fn try_from(method: http::Method) -> Result<Self, Self::Error> {
        method.as_str().parse()
    }
}

/// Request payload.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(untagged)]
pub enum Body {
    Text(String),
    Json(serde_json::Value),
    Bytes(Vec<u8>),
}

impl Body {
    pub fn json(value: impl Serialize) -> Result<Self, serde_json::Error> {
        Ok(Body::Json(serde_json::to_value(value)?))
    }

    /// Payloads that count as "nothing to send": empty text or bytes, and
    /// JSON `null`, `false`, `0` or `""`.
    pub fn is_empty(&self) -> bool {
        match self {
            Body::Text(text) => text.is_empty(),
            Body::Bytes(bytes) => bytes.is_empty(),
            Body::Json(serde_json::Value::Null) => true,
            Body::Json(serde_json::Value::Bool(flag)) => !flag,
            Body::Json(serde_json::Value::Number(n)) => n.as_f64() == Some(0.0),
            Body::Json(serde_json::Value::String(s)) => s.is_empty(),
            Body::Json(_) => false,
        }
    }
}

impl From<&str> for Body {
    fn from(text: &str) -> Self {
        Body::Text(text.to_string())
    }
}

impl From<String> for Body {
    fn from(text: String) -> Self {
        Body::Text(text)
    }
}

impl From<serde_json::Value> for Body {
    fn from(value: serde_json::Value) -> Self {
        Body::Json(value)
    }
}

impl From<Vec<u8>> for Body {
    fn from(bytes: Vec<u8>) -> Self {
        Body::Bytes(bytes)
    }
}

/// Request mode. Only meaningful to browser fetch implementations.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum RequestMode {
    Cors,
    NoCors,
    SameOrigin,
    Navigate,
}

/// Cache mode.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum CacheMode {
    Default,
    NoStore,
    Reload,
    NoCache,
    ForceCache,
    OnlyIfCached,
}

impl CacheMode {
    /// The `Cache-Control` request directive this mode maps to, if any.
    pub fn cache_control(&self) -> Option<&'static str> {
        match self {
            CacheMode::NoStore => Some("no-store"),
            CacheMode::Reload | CacheMode::NoCache => Some("no-cache"),
            CacheMode::Default | CacheMode::ForceCache | CacheMode::OnlyIfCached => None,
        }
    }
}

/// Transport init options handed to the fetch primitive along with the URL.
///
/// Fields not modelled here are kept in `extra` and passed through untouched.
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct RequestInit {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<Body>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mode: Option<RequestMode>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache: Option<CacheMode>,

    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl RequestInit {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Body>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn with_mode(mut self, mode: RequestMode) -> Self {
        self.mode = Some(mode);
        self
    }

    pub fn with_cache(mut self, cache: CacheMode) -> Self {
        self.cache = Some(cache);
        self
    }

    /// The method to use on the wire; GET when none was set.
    pub fn method_or_default(&self) -> Method {
        self.method.unwrap_or_default()
    }
}

/// The descriptor produced by finalizing a chain.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FinalRequest {
    pub url: String,
    pub init: RequestInit,
    pub jsonp: JsonpDescriptor,
}

/// What the fetch primitive resolved with. Any status, 4xx and 5xx
/// included, arrives here rather than as an error.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpResponse {
    pub status: u16,
    /// Canonical reason phrase, e.g. `Not Found`.
    pub status_text: String,
    /// Header names are lowercase; values that are not valid text are left
    /// out.
    pub headers: HashMap<String, String>,
    /// The body decoded as JSON, `null` when it is empty or not JSON.
    pub body: serde_json::Value,
    /// The body as received. JSONP scripts are read from here.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_text: Option<String>,
}

impl HttpResponse {
    /// 2xx. A JSONP script is only evaluated from such a response.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.body.clone())
    }
}

/// What a finalized request resolves to.
#[derive(Debug, Clone)]
pub enum Reply {
    /// Response from the fetch primitive, whatever its status.
    Response(HttpResponse),
    /// Payload handed to a JSONP callback.
    Jsonp(serde_json::Value),
}

impl Reply {
    pub fn response(&self) -> Option<&HttpResponse> {
        match self {
            Reply::Response(response) => Some(response),
            Reply::Jsonp(_) => None,
        }
    }

    /// The decoded payload: the parsed response body or the JSONP argument.
    pub fn payload(&self) -> &serde_json::Value {
        match self {
            Reply::Response(response) => &response.body,
            Reply::Jsonp(value) => value,
        }
    }

    pub fn json<T: for<'de> Deserialize<'de>>(&self) -> Result<T, serde_json::Error> {
        serde_json::from_value(self.payload().clone())
    }
}
