//! Transport invoker.
//!
//! A [`Transport`] takes a finalized request and either hands it to the
//! [`Fetch`] primitive or, for the JSONP pseudo-method, to a
//! [`JsonpBridge`]. Responses and failures from the fetch primitive are
//! returned unchanged: a 404 is a successful fetch.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CACHE_CONTROL};
use reqwest::Client;
use url::Url;

use crate::error::Error;
use crate::jsonp::JsonpBridge;
use crate::types::{Body, FinalRequest, HttpResponse, Method, Reply, RequestInit};

/// The asynchronous fetch primitive.
///
/// Implementations can use real HTTP clients or mock responses for testing.
#[async_trait]
pub trait Fetch: Send + Sync {
    /// Perform a request for `url` with the given init options.
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<HttpResponse, Error>;
}

/// Fetch primitive backed by an async reqwest client.
pub struct ReqwestFetch {
    client: Client,
    origin: Option<Url>,
}

impl ReqwestFetch {
    /// Create a new fetch primitive with the given timeout.
    pub fn new(timeout: Duration) -> Result<Self, Error> {
        let client = Client::builder().timeout(timeout).build()?;

        Ok(Self {
            client,
            origin: None,
        })
    }

    /// Create with default timeout of 30 seconds.
    pub fn with_default_timeout() -> Result<Self, Error> {
        Self::new(Duration::from_secs(30))
    }

    /// Resolve relative URLs such as `/users/1` against `origin`.
    ///
    /// Without an origin only absolute URLs can be fetched.
    pub fn with_origin(mut self, origin: &str) -> Result<Self, Error> {
        self.origin = Some(Url::parse(origin)?);
        Ok(self)
    }

    fn resolve(&self, url: &str) -> Result<Url, Error> {
        match Url::parse(url) {
            Ok(url) => Ok(url),
            Err(url::ParseError::RelativeUrlWithoutBase) => match &self.origin {
                Some(origin) => Ok(origin.join(url)?),
                None => Err(Error::InvalidUrl {
                    message: format!("relative URL '{}' without an origin", url),
                }),
            },
            Err(e) => Err(e.into()),
        }
    }

    fn headers(init: &RequestInit) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        for (name, value) in &init.headers {
            let header_name = HeaderName::try_from(name.as_str())?;
            let header_value = HeaderValue::try_from(value.as_str())?;
            headers.insert(header_name, header_value);
        }

        if let Some(directive) = init.cache.and_then(|cache| cache.cache_control()) {
            headers
                .entry(CACHE_CONTROL)
                .or_insert(HeaderValue::from_static(directive));
        }

        Ok(headers)
    }
}

#[async_trait]
impl Fetch for ReqwestFetch {
    async fn fetch(&self, url: &str, init: &RequestInit) -> Result<HttpResponse, Error> {
        let url = self.resolve(url)?;
        let method: http::Method = init.method_or_default().into();
        let headers = Self::headers(init)?;

        if let Some(mode) = init.mode {
            log::trace!("request mode {:?} has no effect outside a browser", mode);
        }
        if !init.extra.is_empty() {
            log::trace!(
                "passing over init fields {:?}",
                init.extra.keys().collect::<Vec<_>>()
            );
        }

        let mut req_builder = self.client.request(method, url).headers(headers);

        req_builder = match &init.body {
            Some(Body::Text(text)) => req_builder.body(text.clone()),
            Some(Body::Bytes(bytes)) => req_builder.body(bytes.clone()),
            Some(Body::Json(value)) => req_builder.json(value),
            None => req_builder,
        };

        let response = req_builder.send().await?;

        let status = response.status().as_u16();
        let status_text = response
            .status()
            .canonical_reason()
            .unwrap_or("Unknown")
            .to_string();

        let mut resp_headers = HashMap::new();
        for (name, value) in response.headers() {
            if let Ok(v) = value.to_str() {
                resp_headers.insert(name.to_string(), v.to_string());
            }
        }

        let body_text = response.text().await?;
        let body = serde_json::from_str(&body_text).unwrap_or(serde_json::Value::Null);

        Ok(HttpResponse {
            status,
            status_text,
            headers: resp_headers,
            body,
            body_text: Some(body_text),
        })
    }
}

/// Dispatches finalized requests to the fetch primitive or the JSONP bridge.
#[derive(Clone)]
pub struct Transport {
    fetch: Arc<dyn Fetch>,
    jsonp: Option<JsonpBridge>,
}

impl Transport {
    pub fn new(fetch: impl Fetch + 'static) -> Self {
        Self::from_arc(Arc::new(fetch))
    }

    pub fn from_arc(fetch: Arc<dyn Fetch>) -> Self {
        Self { fetch, jsonp: None }
    }

    /// Reqwest-backed transport resolving relative URLs against `origin`.
    pub fn reqwest(origin: &str) -> Result<Self, Error> {
        Ok(Self::new(
            ReqwestFetch::with_default_timeout()?.with_origin(origin)?,
        ))
    }

    /// Enable JSONP, loading scripts through this transport's fetch
    /// primitive.
    pub fn with_jsonp(mut self) -> Self {
        self.jsonp = Some(JsonpBridge::new(Arc::clone(&self.fetch)));
        self
    }

    pub fn with_jsonp_bridge(mut self, bridge: JsonpBridge) -> Self {
        self.jsonp = Some(bridge);
        self
    }

    pub fn jsonp_bridge(&self) -> Option<&JsonpBridge> {
        self.jsonp.as_ref()
    }

    pub async fn request(&self, request: FinalRequest) -> Result<Reply, Error> {
        let FinalRequest { url, init, jsonp } = request;

        if init.method == Some(Method::JSONP) {
            let bridge = self.jsonp.as_ref().ok_or(Error::JsonpUnavailable)?;
            log::debug!("jsonp {} via {}", url, jsonp.function);
            return bridge.fetch(&url, &jsonp).await.map(Reply::Jsonp);
        }

        log::debug!("fetch {} {}", init.method_or_default(), url);
        self.fetch.fetch(&url, &init).await.map(Reply::Response)
    }
}


#[cfg(test)]
mod tests {
    use super::mock::MockFetch;
    use super::*;
    use crate::settings::JsonpDescriptor;
    use crate::types::CacheMode;

    fn final_request(url: &str, init: RequestInit) -> FinalRequest {
        FinalRequest {
            url: url.to_string(),
            init,
            jsonp: JsonpDescriptor::new("callback", "cb"),
        }
    }

    #[tokio::test]
    async fn plain_methods_go_to_fetch() {
        let fetch = MockFetch::new().with_response("/a", MockFetch::text_response(201, r#"{"ok":true}"#));
        let transport = Transport::new(fetch.clone());

        let reply = transport
            .request(final_request("/a", RequestInit::new().with_method(Method::POST)))
            .await
            .unwrap();

        assert_eq!(reply.response().unwrap().status, 201);
        assert_eq!(reply.payload()["ok"], true);
        assert_eq!(
            fetch.last(),
            Some(("/a".to_string(), RequestInit::new().with_method(Method::POST)))
        );
    }

    #[tokio::test]
    async fn fetch_errors_propagate_unchanged() {
        let transport = Transport::new(MockFetch::new().fail_with("unreachable"));

        let result = transport
            .request(final_request("/a", RequestInit::new()))
            .await;

        assert!(matches!(result, Err(Error::InvalidUrl { message }) if message == "unreachable"));
    }

    #[tokio::test]
    async fn jsonp_without_bridge_is_unavailable() {
        let fetch = MockFetch::new();
        let transport = Transport::new(fetch.clone());

        let result = transport
            .request(final_request("/a", RequestInit::new().with_method(Method::JSONP)))
            .await;

        assert!(matches!(result, Err(Error::JsonpUnavailable)));
        assert!(fetch.recorded().is_empty());
    }

    #[test]
    fn reqwest_fetch_resolves_relative_urls_against_origin() {
        let fetch = ReqwestFetch::with_default_timeout()
            .unwrap()
            .with_origin("http://localhost:8080")
            .unwrap();

        assert_eq!(
            fetch.resolve("/users/1?x=1").unwrap().as_str(),
            "http://localhost:8080/users/1?x=1"
        );
        assert_eq!(
            fetch.resolve("https://example.com/a").unwrap().as_str(),
            "https://example.com/a"
        );
    }

    #[test]
    fn reqwest_fetch_needs_origin_for_relative_urls() {
        let fetch = ReqwestFetch::new(Duration::from_secs(5)).unwrap();
        assert!(matches!(
            fetch.resolve("/users"),
            Err(Error::InvalidUrl { .. })
        ));
    }

    #[test]
    fn headers_include_cache_directive() {
        let init = RequestInit::new()
            .with_header("Accept", "application/json")
            .with_cache(CacheMode::NoStore);
        let headers = ReqwestFetch::headers(&init).unwrap();

        assert_eq!(headers.get("accept").unwrap(), "application/json");
        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "no-store");
    }

    #[test]
    fn explicit_cache_control_header_wins() {
        let init = RequestInit::new()
            .with_header("Cache-Control", "max-age=0")
            .with_cache(CacheMode::NoCache);
        let headers = ReqwestFetch::headers(&init).unwrap();

        assert_eq!(headers.get(CACHE_CONTROL).unwrap(), "max-age=0");
    }

    #[test]
    fn invalid_header_name_is_an_error() {
        let init = RequestInit::new().with_header("bad header", "x");
        assert!(matches!(
            ReqwestFetch::headers(&init),
            Err(Error::InvalidHeaderName(_))
        ));
    }
}
