//! # rest-chain
//!
//! A fluent HTTP request builder: route segments are chained one by one and
//! a terminal verb turns the chain into a request.
//!
//! ## Chaining
//!
//! ```ignore
//! use rest_chain::{Body, QueryParams, RestClient, SettingsOverride};
//!
//! let client = RestClient::reqwest("https://api.example.com")?;
//!
//! // GET /users/123/comments?page=2
//! let reply = client
//!     .path("users")
//!     .path("123")
//!     .path("comments")
//!     .get(QueryParams::new().with("page", "2"))
//!     .await?;
//!
//! // POST /users with a JSON body
//! client.path("users").post(Some(Body::json(&new_user)?)).await?;
//! ```
//!
//! ## Name-based dispatch
//!
//! [`Chain::call`] looks at the last segment. If it names an operation
//! (`get`, `post`, `settings`, `reset`, ...) that operation runs with the
//! argument; otherwise the call is a GET of the whole route.
//!
//! ```ignore
//! // POST /a/b with a text body
//! client.path("a").path("b").path("post").call(Body::from("{}"));
//!
//! // GET /a/b
//! client.path("a").path("b").call(Argument::None);
//! ```
//!
//! ## Persisted settings
//!
//! Settings (`baseURI`, default `method`, default `params`, `jsonp`
//! callback) are shared by every chain of a client until a full reset:
//!
//! ```ignore
//! client.settings(
//!     SettingsOverride::new()
//!         .with_base_uri("http://h/")
//!         .with_params(QueryParams::new().with("x", "1")),
//! );
//! client.path("a").path("b").send().await?; // GET http://h/a/b?x=1
//! client.reset(true);
//! ```
//!
//! ## JSONP
//!
//! With a [`JsonpBridge`] on the transport, `jsonp()` loads the endpoint as
//! a callback-wrapped script and resolves with the payload passed to the
//! callback. See the [`jsonp`] module for its limitations.

pub mod accumulator;
pub mod client;
pub mod error;
pub mod jsonp;
pub mod query;
pub mod settings;
pub mod transport;
pub mod types;

// Re-export main types
pub use accumulator::{Accumulator, Argument, Operation};
pub use client::{Chain, Outcome, ResponseFuture, RestClient};
pub use error::Error;
pub use jsonp::{CallbackRegistry, JsonpBridge};
pub use query::{QueryParams, QueryValue};
pub use settings::{JsonpCallback, JsonpDescriptor, Settings, SettingsOverride};
pub use transport::{Fetch, ReqwestFetch, Transport};
pub use types::{
    Body, CacheMode, FinalRequest, HttpResponse, Method, Reply, RequestInit, RequestMode,
};
