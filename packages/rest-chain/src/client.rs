//! The chaining facade.
//!
//! [`RestClient::chain`] starts a [`Chain`]. Each [`Chain::path`] appends a
//! route segment; a terminal call finalizes the chain and returns a
//! [`ResponseFuture`]. Finalization happens before the future is created, so
//! the chain's state is already consumed by the time anything is awaited.

use std::future::Future;
use std::pin::Pin;

use crate::accumulator::{Accumulator, Argument, Operation};
use crate::error::Error;
use crate::query::QueryParams;
use crate::settings::{Settings, SettingsOverride, SharedSettings};
use crate::transport::Transport;
use crate::types::{Body, FinalRequest, Reply, RequestInit};

/// Future returned by every terminal call.
pub type ResponseFuture = Pin<Box<dyn Future<Output = Result<Reply, Error>> + Send>>;

/// Entry point: a transport plus the settings persisted across chains.
#[derive(Clone)]
pub struct RestClient {
    transport: Transport,
    defaults: SharedSettings,
}

impl RestClient {
    pub fn new(transport: Transport) -> Self {
        Self {
            transport,
            defaults: SharedSettings::new(),
        }
    }

    /// Reqwest-backed client resolving relative URLs against `origin`, with
    /// JSONP enabled.
    pub fn reqwest(origin: &str) -> Result<Self, Error> {
        Ok(Self::new(Transport::reqwest(origin)?.with_jsonp()))
    }

    pub fn transport(&self) -> &Transport {
        &self.transport
    }

    /// Start a new chain with empty pending state.
    pub fn chain(&self) -> Chain {
        Chain {
            accumulator: Accumulator::new(self.defaults.clone()),
            transport: self.transport.clone(),
        }
    }

    /// Shorthand for `self.chain().path(segment)`.
    pub fn path(&self, segment: impl Into<String>) -> Chain {
        self.chain().path(segment)
    }

    /// Persist `overrides` for every later chain.
    pub fn settings(&self, overrides: SettingsOverride) -> &Self {
        self.defaults.merge(overrides);
        self
    }

    /// Drop persisted settings when `full`. Pending state lives on chains, so
    /// there is nothing else to clear here.
    pub fn reset(&self, full: bool) -> &Self {
        if full {
            self.defaults.clear();
        }
        self
    }

    pub fn effective_settings(&self) -> Settings {
        self.defaults.effective()
    }

    /// Bare call on the client: GET the base URI.
    pub fn send(&self) -> ResponseFuture {
        self.chain().send()
    }
}

/// What [`Chain::call`] produced.
pub enum Outcome {
    /// An HTTP verb ran and the chain was finalized.
    Request(ResponseFuture),
    /// A bookkeeping operation ran; the chain is handed back.
    Chain(Chain),
}

impl Outcome {
    pub fn into_request(self) -> Option<ResponseFuture> {
        match self {
            Outcome::Request(future) => Some(future),
            Outcome::Chain(_) => None,
        }
    }

    pub fn into_chain(self) -> Option<Chain> {
        match self {
            Outcome::Request(_) => None,
            Outcome::Chain(chain) => Some(chain),
        }
    }
}

/// A request under construction.
///
/// Any string is a valid segment; a mistyped name simply becomes part of the
/// route.
pub struct Chain {
    accumulator: Accumulator,
    transport: Transport,
}

impl Chain {
    pub fn path(mut self, segment: impl Into<String>) -> Self {
        self.accumulator.push_segment(segment);
        self
    }

    /// Alias of [`Chain::path`].
    pub fn segment(self, segment: impl Into<String>) -> Self {
        self.path(segment)
    }

    pub fn segments(&self) -> &[String] {
        self.accumulator.segments()
    }

    /// Invoke the chain.
    ///
    /// If the last segment names an [`Operation`] it is popped and applied
    /// with `argument`; otherwise GET is applied. Verbs finalize the chain,
    /// bookkeeping operations hand it back.
    pub fn call(mut self, argument: impl Into<Argument>) -> Outcome {
        let operation = self.accumulator.pop_operation().unwrap_or(Operation::Get);
        if self.accumulator.apply(operation, argument.into()) {
            Outcome::Request(self.dispatch())
        } else {
            Outcome::Chain(self)
        }
    }

    /// Persist `overrides` on the client.
    pub fn settings(mut self, overrides: SettingsOverride) -> Self {
        self.accumulator.override_defaults(overrides);
        self
    }

    /// Replace this request's init options.
    pub fn init(mut self, init: RequestInit) -> Self {
        self.accumulator.set_init_overrides(init);
        self
    }

    /// Clear pending segments, params and init; with `full`, also the
    /// client's persisted settings.
    pub fn reset(mut self, full: bool) -> Self {
        self.accumulator.reset(full);
        self
    }

    pub fn get(mut self, params: impl Into<Option<QueryParams>>) -> ResponseFuture {
        self.accumulator.get(params.into());
        self.dispatch()
    }

    pub fn head(mut self, params: impl Into<Option<QueryParams>>) -> ResponseFuture {
        self.accumulator.head(params.into());
        self.dispatch()
    }

    pub fn jsonp(mut self, params: impl Into<Option<QueryParams>>) -> ResponseFuture {
        self.accumulator.jsonp(params.into());
        self.dispatch()
    }

    pub fn post(mut self, body: Option<Body>) -> ResponseFuture {
        self.accumulator.post(body);
        self.dispatch()
    }

    pub fn put(mut self, body: Option<Body>) -> ResponseFuture {
        self.accumulator.put(body);
        self.dispatch()
    }

    pub fn delete(mut self, body: Option<Body>) -> ResponseFuture {
        self.accumulator.delete(body);
        self.dispatch()
    }

    pub fn patch(mut self, body: Option<Body>) -> ResponseFuture {
        self.accumulator.patch(body);
        self.dispatch()
    }

    pub fn options(mut self, body: Option<Body>) -> ResponseFuture {
        self.accumulator.options(body);
        self.dispatch()
    }

    /// GET without inspecting the trailing segment.
    pub fn send(self) -> ResponseFuture {
        self.get(None::<QueryParams>)
    }

    /// Finalize without sending.
    pub fn build(mut self) -> FinalRequest {
        self.accumulator.finalize()
    }

    fn dispatch(mut self) -> ResponseFuture {
        let request = self.accumulator.finalize();
        let transport = self.transport;
        Box::pin(async move { transport.request(request).await })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryValue;
    use crate::settings::JsonpCallback;
    use crate::transport::mock::MockFetch;
    use crate::types::{Method, RequestMode};
    use serde_json::json;

    fn client() -> (RestClient, MockFetch) {
        let fetch = MockFetch::new();
        (RestClient::new(Transport::new(fetch.clone())), fetch)
    }

    fn get_init() -> RequestInit {
        RequestInit::new().with_method(Method::GET)
    }

    async fn call(chain: Chain, argument: impl Into<Argument>) -> Reply {
        chain
            .call(argument)
            .into_request()
            .expect("verb call")
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn path_segments_join_onto_base() {
        let (client, fetch) = client();

        call(client.path("users").path("123").path("comments"), Argument::None).await;

        assert_eq!(fetch.last(), Some(("/users/123/comments".to_string(), get_init())));
    }

    #[tokio::test]
    async fn trailing_verb_is_consumed() {
        let (client, fetch) = client();

        call(
            client.path("a").path("b").path("c").path("post"),
            Body::from("payload"),
        )
        .await;

        let (url, init) = fetch.last().unwrap();
        assert_eq!(url, "/a/b/c");
        assert_eq!(init.method, Some(Method::POST));
        assert_eq!(init.body, Some(Body::from("payload")));
    }

    #[tokio::test]
    async fn every_verb_sets_its_method() {
        let (client, fetch) = client();

        for (verb, method) in [
            ("get", Method::GET),
            ("head", Method::HEAD),
            ("post", Method::POST),
            ("put", Method::PUT),
            ("delete", Method::DELETE),
            ("patch", Method::PATCH),
            ("options", Method::OPTIONS),
        ] {
            let marker = format!("__{}__", verb.to_uppercase());
            call(
                client
                    .path(marker.clone())
                    .path("routeFragment1")
                    .path("routeFragment2")
                    .path(verb),
                Argument::None,
            )
            .await;

            assert_eq!(
                fetch.last(),
                Some((
                    format!("/{}/routeFragment1/routeFragment2", marker),
                    RequestInit::new().with_method(method)
                ))
            );
        }
    }

    #[tokio::test]
    async fn falsy_body_is_omitted() {
        let (client, fetch) = client();

        client.path("items").post(Some(Body::from(""))).await.unwrap();
        assert_eq!(fetch.last().unwrap().1, RequestInit::new().with_method(Method::POST));

        client.path("items").post(None).await.unwrap();
        assert_eq!(fetch.last().unwrap().1.body, None);

        client
            .path("items")
            .post(Some(Body::Json(json!({"name": "x"}))))
            .await
            .unwrap();
        assert_eq!(fetch.last().unwrap().1.body, Some(Body::Json(json!({"name": "x"}))));
    }

    #[tokio::test]
    async fn bare_call_defaults_to_get() {
        let (client, fetch) = client();

        client.send().await.unwrap();
        assert_eq!(fetch.last(), Some(("/".to_string(), get_init())));

        call(client.chain(), Argument::None).await;
        assert_eq!(fetch.last(), Some(("/".to_string(), get_init())));

        call(client.path("routeFragment1"), Argument::None).await;
        assert_eq!(fetch.last(), Some(("/routeFragment1".to_string(), get_init())));
    }

    #[tokio::test]
    async fn settings_persist_across_chains_until_full_reset() {
        let (client, fetch) = client();
        client.settings(
            SettingsOverride::new()
                .with_base_uri("http://www.example.com/")
                .with_params(
                    QueryParams::new()
                        .with("x", "1")
                        .with("y", QueryValue::deferred(|| 2_i32.pow(3).to_string())),
                ),
        );

        call(client.path("routeFragment1"), Argument::None).await;
        assert_eq!(
            fetch.last(),
            Some((
                "http://www.example.com/routeFragment1?x=1&y=8".to_string(),
                get_init()
            ))
        );

        call(client.path("routeFragment2").path("routeFragment3"), Argument::None).await;
        assert_eq!(
            fetch.last().unwrap().0,
            "http://www.example.com/routeFragment2/routeFragment3?x=1&y=8"
        );

        client.reset(true);
        call(client.path("routeFragment1"), Argument::None).await;
        assert_eq!(fetch.last().unwrap().0, "/routeFragment1");
    }

    #[tokio::test]
    async fn reset_on_chain_keeps_persisted_settings() {
        let (client, fetch) = client();
        let init = RequestInit::new()
            .with_method(Method::POST)
            .with_header("Content-Type", "application/json")
            .with_body(r#"{"testKey":"testValue"}"#)
            .with_mode(RequestMode::Cors);

        let chain = client
            .chain()
            .settings(
                SettingsOverride::new()
                    .with_base_uri("http://www.example.com/")
                    .with_params(QueryParams::new().with("x", "1")),
            )
            .init(init)
            .path("routeFragment1")
            .path("routeFragment2")
            .reset(false);
        call(chain, Argument::None).await;

        assert_eq!(
            fetch.last(),
            Some(("http://www.example.com/?x=1".to_string(), get_init()))
        );
    }

    #[tokio::test]
    async fn full_reset_on_chain_restores_baseline() {
        let (client, fetch) = client();

        let chain = client
            .chain()
            .settings(SettingsOverride::new().with_base_uri("http://www.example.com/"))
            .init(RequestInit::new().with_method(Method::PUT))
            .path("routeFragment1")
            .reset(true);
        call(chain, Argument::None).await;

        assert_eq!(fetch.last(), Some(("/".to_string(), get_init())));
        assert_eq!(client.effective_settings(), Settings::baseline());
    }

    #[tokio::test]
    async fn bookkeeping_by_name_returns_the_chain() {
        let (client, fetch) = client();

        let chain = client
            .path("settings")
            .call(SettingsOverride::new().with_base_uri("http://h/"))
            .into_chain()
            .expect("settings is bookkeeping");
        let chain = chain
            .path("init")
            .call(RequestInit::new().with_header("X-Trace", "1"))
            .into_chain()
            .expect("init is bookkeeping");
        assert!(chain.segments().is_empty());

        call(chain.path("a"), Argument::None).await;

        let (url, init) = fetch.last().unwrap();
        assert_eq!(url, "http://h/a");
        assert_eq!(init.headers.get("X-Trace").map(String::as_str), Some("1"));
        assert_eq!(init.method, Some(Method::GET));
    }

    #[tokio::test]
    async fn reset_by_name_clears_pending_path() {
        let (client, fetch) = client();

        let chain = client
            .path("a")
            .path("b")
            .path("reset")
            .call(false)
            .into_chain()
            .unwrap();
        assert!(chain.segments().is_empty());

        call(chain.path("c"), Argument::None).await;
        assert_eq!(fetch.last().unwrap().0, "/c");
    }

    #[tokio::test]
    async fn scenario_settings_base_and_params() {
        let (client, fetch) = client();
        client.settings(
            SettingsOverride::new()
                .with_base_uri("http://h/")
                .with_params(QueryParams::new().with("x", "1")),
        );

        call(client.path("a").path("b"), Argument::None).await;

        assert_eq!(fetch.last(), Some(("http://h/a/b?x=1".to_string(), get_init())));
    }

    #[tokio::test]
    async fn scenario_init_overrides_win_for_default_get() {
        let (client, fetch) = client();

        call(
            client
                .chain()
                .init(RequestInit::new().with_method(Method::POST).with_body("{}"))
                .path("route"),
            Argument::None,
        )
        .await;

        assert_eq!(
            fetch.last(),
            Some((
                "/route".to_string(),
                RequestInit::new().with_method(Method::POST).with_body("{}")
            ))
        );
    }

    #[tokio::test]
    async fn get_params_are_serialized() {
        let (client, fetch) = client();

        client
            .path("search")
            .get(
                QueryParams::new()
                    .with("q", "rust lang")
                    .with("empty", "")
                    .with("none", QueryValue::Null),
            )
            .await
            .unwrap();

        assert_eq!(fetch.last().unwrap().0, "/search?q=rust%20lang");
    }

    #[tokio::test]
    async fn chains_do_not_share_pending_state() {
        let (client, fetch) = client();

        let first = client.path("first").path("chain");
        let second = client.path("second");

        call(second, Argument::None).await;
        assert_eq!(fetch.last().unwrap().0, "/second");

        call(first, Argument::None).await;
        assert_eq!(fetch.last().unwrap().0, "/first/chain");
    }

    #[tokio::test]
    async fn finalization_happens_before_await() {
        let (client, fetch) = client();

        let pending = client.path("a").send();
        let next = client.path("b").build();
        assert_eq!(next.url, "/b");
        assert!(fetch.recorded().is_empty());

        pending.await.unwrap();
        assert_eq!(fetch.recorded().len(), 1);
    }

    #[test]
    fn build_carries_jsonp_descriptor() {
        let (client, _fetch) = client();
        client.settings(SettingsOverride::new().with_jsonp(JsonpCallback::named("cb", "handle")));

        let mut chain = client.path("data");
        chain.accumulator.jsonp(None);
        let request = chain.build();

        assert_eq!(request.init.method, Some(Method::JSONP));
        assert_eq!(request.jsonp.function, "handle");
    }

    #[tokio::test]
    async fn jsonp_goes_through_bridge() {
        let fetch = MockFetch::new().with_response(
            "/data?x=1&cb=handle",
            MockFetch::text_response(200, "handle([1, 2, 3])"),
        );
        let client = RestClient::new(Transport::new(fetch.clone()).with_jsonp());
        client.settings(SettingsOverride::new().with_jsonp(JsonpCallback::named("cb", "handle")));

        let reply = client
            .path("data")
            .jsonp(QueryParams::new().with("x", "1"))
            .await
            .unwrap();

        assert_eq!(reply.payload(), &json!([1, 2, 3]));
        assert!(reply.response().is_none());
    }
}
