//! Pending request state and its finalization.
//!
//! An [`Accumulator`] collects path segments, query parameters and init
//! overrides for a single request. [`Accumulator::finalize`] turns that state
//! into a [`FinalRequest`] and clears it, leaving the persisted settings
//! untouched.

use std::fmt;
use std::str::FromStr;

use crate::query::{append_query_string, QueryParams};
use crate::settings::{SettingsOverride, SharedSettings};
use crate::types::{Body, FinalRequest, Method, RequestInit};

/// The closed set of names a chain dispatches on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    Settings,
    Init,
    Reset,
    Get,
    Head,
    Jsonp,
    Post,
    Put,
    Delete,
    Patch,
    Options,
}

impl Operation {
    pub const ALL: [Operation; 11] = [
        Operation::Settings,
        Operation::Init,
        Operation::Reset,
        Operation::Get,
        Operation::Head,
        Operation::Jsonp,
        Operation::Post,
        Operation::Put,
        Operation::Delete,
        Operation::Patch,
        Operation::Options,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Operation::Settings => "settings",
            Operation::Init => "init",
            Operation::Reset => "reset",
            Operation::Get => "get",
            Operation::Head => "head",
            Operation::Jsonp => "jsonp",
            Operation::Post => "post",
            Operation::Put => "put",
            Operation::Delete => "delete",
            Operation::Patch => "patch",
            Operation::Options => "options",
        }
    }

    /// Verbs are HTTP-related; `settings`, `init` and `reset` are
    /// bookkeeping.
    pub fn is_http(&self) -> bool {
        self.method().is_some()
    }

    pub fn method(&self) -> Option<Method> {
        match self {
            Operation::Settings | Operation::Init | Operation::Reset => None,
            Operation::Get => Some(Method::GET),
            Operation::Head => Some(Method::HEAD),
            Operation::Jsonp => Some(Method::JSONP),
            Operation::Post => Some(Method::POST),
            Operation::Put => Some(Method::PUT),
            Operation::Delete => Some(Method::DELETE),
            Operation::Patch => Some(Method::PATCH),
            Operation::Options => Some(Method::OPTIONS),
        }
    }
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Operation {
    type Err = ();

    /// Exact, case-sensitive match against [`Operation::name`].
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Operation::ALL
            .into_iter()
            .find(|operation| operation.name() == s)
            .ok_or(())
    }
}

/// The argument passed to a dispatched operation.
///
/// Each operation reads the variant it understands and ignores the rest.
#[derive(Debug, Clone, Default, PartialEq)]
pub enum Argument {
    #[default]
    None,
    Params(QueryParams),
    Body(Body),
    Settings(SettingsOverride),
    Init(RequestInit),
    Flag(bool),
}

impl Argument {
    fn kind(&self) -> &'static str {
        match self {
            Argument::None => "none",
            Argument::Params(_) => "params",
            Argument::Body(_) => "body",
            Argument::Settings(_) => "settings",
            Argument::Init(_) => "init",
            Argument::Flag(_) => "flag",
        }
    }
}

impl From<QueryParams> for Argument {
    fn from(params: QueryParams) -> Self {
        Argument::Params(params)
    }
}

impl From<Body> for Argument {
    fn from(body: Body) -> Self {
        Argument::Body(body)
    }
}

impl From<SettingsOverride> for Argument {
    fn from(overrides: SettingsOverride) -> Self {
        Argument::Settings(overrides)
    }
}

impl From<RequestInit> for Argument {
    fn from(init: RequestInit) -> Self {
        Argument::Init(init)
    }
}

impl From<bool> for Argument {
    fn from(flag: bool) -> Self {
        Argument::Flag(flag)
    }
}

/// Pending state for one request, plus a handle on the client's persisted
/// settings.
#[derive(Debug, Clone)]
pub struct Accumulator {
    segments: Vec<String>,
    query: QueryParams,
    init: RequestInit,
    defaults: SharedSettings,
}

impl Accumulator {
    pub fn new(defaults: SharedSettings) -> Self {
        Self {
            segments: Vec::new(),
            query: QueryParams::new(),
            init: RequestInit::default(),
            defaults,
        }
    }

    pub fn segments(&self) -> &[String] {
        &self.segments
    }

    pub fn query(&self) -> &QueryParams {
        &self.query
    }

    pub fn init(&self) -> &RequestInit {
        &self.init
    }

    pub fn push_segment(&mut self, segment: impl Into<String>) {
        let segment = segment.into();
        log::trace!("segment '{}'", segment);
        self.segments.push(segment);
    }

    /// Pop the trailing segment if it names an [`Operation`].
    pub fn pop_operation(&mut self) -> Option<Operation> {
        let operation = self.segments.last()?.parse::<Operation>().ok()?;
        self.segments.pop();
        Some(operation)
    }

    /// Merge `overrides` into the persisted settings.
    pub fn override_defaults(&mut self, overrides: SettingsOverride) {
        self.defaults.merge(overrides);
    }

    /// Replace the pending init options wholesale.
    pub fn set_init_overrides(&mut self, init: RequestInit) {
        self.init = init;
    }

    /// Clear pending segments, query and init. With `full`, also drop the
    /// persisted settings.
    pub fn reset(&mut self, full: bool) {
        self.segments.clear();
        self.query.clear();
        self.init = RequestInit::default();
        if full {
            self.defaults.clear();
        }
    }

    pub fn get(&mut self, params: Option<QueryParams>) {
        self.query_verb(Method::GET, params);
    }

    pub fn head(&mut self, params: Option<QueryParams>) {
        self.query_verb(Method::HEAD, params);
    }

    pub fn jsonp(&mut self, params: Option<QueryParams>) {
        self.query_verb(Method::JSONP, params);
    }

    pub fn post(&mut self, body: Option<Body>) {
        self.body_verb(Method::POST, body);
    }

    pub fn put(&mut self, body: Option<Body>) {
        self.body_verb(Method::PUT, body);
    }

    pub fn delete(&mut self, body: Option<Body>) {
        self.body_verb(Method::DELETE, body);
    }

    pub fn patch(&mut self, body: Option<Body>) {
        self.body_verb(Method::PATCH, body);
    }

    pub fn options(&mut self, body: Option<Body>) {
        self.body_verb(Method::OPTIONS, body);
    }

    // A method already present in the init options wins over a query verb.
    fn query_verb(&mut self, method: Method, params: Option<QueryParams>) {
        self.init.method.get_or_insert(method);
        if let Some(params) = params {
            self.query.merge(&params);
        }
    }

    // An absent or empty payload also clears any body carried by the init.
    fn body_verb(&mut self, method: Method, body: Option<Body>) {
        self.init.method = Some(method);
        self.init.body = body.filter(|body| !body.is_empty());
    }

    /// Apply `operation` with `argument`. Returns whether the operation was
    /// HTTP-related, i.e. whether the chain should now be finalized.
    pub fn apply(&mut self, operation: Operation, argument: Argument) -> bool {
        match (operation, argument) {
            (Operation::Settings, Argument::Settings(overrides)) => {
                self.override_defaults(overrides)
            }
            (Operation::Settings, Argument::None) => {}
            (Operation::Init, Argument::Init(init)) => self.set_init_overrides(init),
            (Operation::Init, Argument::None) => self.set_init_overrides(RequestInit::default()),
            (Operation::Reset, Argument::Flag(full)) => self.reset(full),
            (Operation::Reset, Argument::None) => self.reset(false),
            (Operation::Get, argument) => self.get(params_of(operation, argument)),
            (Operation::Head, argument) => self.head(params_of(operation, argument)),
            (Operation::Jsonp, argument) => self.jsonp(params_of(operation, argument)),
            (Operation::Post, argument) => self.post(body_of(operation, argument)),
            (Operation::Put, argument) => self.put(body_of(operation, argument)),
            (Operation::Delete, argument) => self.delete(body_of(operation, argument)),
            (Operation::Patch, argument) => self.patch(body_of(operation, argument)),
            (Operation::Options, argument) => self.options(body_of(operation, argument)),
            (operation, argument) => ignored(operation, &argument),
        }
        operation.is_http()
    }

    /// Build the final request from the pending state and the effective
    /// settings, then clear the pending state.
    pub fn finalize(&mut self) -> FinalRequest {
        let settings = self.defaults.effective();

        let mut init = std::mem::take(&mut self.init);
        init.method.get_or_insert(settings.method);

        let mut query = std::mem::take(&mut self.query);
        query.merge(&settings.params);

        let route = format!("{}{}", settings.base_uri, self.segments.join("/"));
        let url = append_query_string(&route, &query.to_query_string());
        let jsonp = settings.jsonp.resolve();

        self.reset(false);

        log::debug!("finalized {} {}", init.method_or_default(), url);

        FinalRequest { url, init, jsonp }
    }
}

fn params_of(operation: Operation, argument: Argument) -> Option<QueryParams> {
    match argument {
        Argument::Params(params) => Some(params),
        Argument::None => None,
        other => {
            ignored(operation, &other);
            None
        }
    }
}

fn body_of(operation: Operation, argument: Argument) -> Option<Body> {
    match argument {
        Argument::Body(body) => Some(body),
        Argument::None => None,
        other => {
            ignored(operation, &other);
            None
        }
    }
}

fn ignored(operation: Operation, argument: &Argument) {
    log::warn!(
        "'{}' ignores its {} argument",
        operation,
        argument.kind()
    );
}
