//! Client settings.
//!
//! [`Settings`] is the effective configuration used when a chain is
//! finalized: the baseline defaults overlaid with the persisted
//! [`SettingsOverride`] shared by every chain of a client.

use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use serde::de::{MapAccess, Visitor};
use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::query::{prefixed_timestamp, QueryParams};
use crate::types::Method;

/// Query parameter the baseline JSONP callback name is sent under.
pub const DEFAULT_CALLBACK_PARAM: &str = "callback";

/// How the JSONP callback function is named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CallbackName {
    /// A fresh prefixed timestamp, drawn when the chain is finalized.
    Generated,
    Named(String),
}

/// JSONP callback configuration: the query parameter the remote endpoint
/// reads the callback name from, and how that name is chosen.
///
/// Serialized as a one-entry map, `{"callback": "handleData"}`. A `null`
/// value means a generated name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonpCallback {
    pub param: String,
    pub name: CallbackName,
}

impl JsonpCallback {
    pub fn named(param: impl Into<String>, name: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            name: CallbackName::Named(name.into()),
        }
    }

    pub fn generated(param: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            name: CallbackName::Generated,
        }
    }

    /// Fix the callback name for one request.
    pub fn resolve(&self) -> JsonpDescriptor {
        let function = match &self.name {
            CallbackName::Generated => prefixed_timestamp(),
            CallbackName::Named(name) => name.clone(),
        };
        JsonpDescriptor {
            param: self.param.clone(),
            function,
        }
    }
}

impl Default for JsonpCallback {
    fn default() -> Self {
        Self::generated(DEFAULT_CALLBACK_PARAM)
    }
}

impl Serialize for JsonpCallback {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        match &self.name {
            CallbackName::Generated => map.serialize_entry(&self.param, &None::<String>)?,
            CallbackName::Named(name) => map.serialize_entry(&self.param, name)?,
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for JsonpCallback {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let (param, name) = deserializer.deserialize_map(SingleEntry)?;
        Ok(match name {
            Some(name) => JsonpCallback::named(param, name),
            None => JsonpCallback::generated(param),
        })
    }
}

/// A JSONP callback with its function name fixed for one request.
///
/// Serialized as `{param: function}`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JsonpDescriptor {
    pub param: String,
    pub function: String,
}

impl JsonpDescriptor {
    pub fn new(param: impl Into<String>, function: impl Into<String>) -> Self {
        Self {
            param: param.into(),
            function: function.into(),
        }
    }

    pub fn to_query_params(&self) -> QueryParams {
        QueryParams::new().with(self.param.clone(), self.function.clone())
    }
}

impl Serialize for JsonpDescriptor {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.param, &self.function)?;
        map.end()
    }
}

impl<'de> Deserialize<'de> for JsonpDescriptor {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match deserializer.deserialize_map(SingleEntry)? {
            (param, Some(function)) => Ok(JsonpDescriptor { param, function }),
            (param, None) => Err(serde::de::Error::custom(format!(
                "JSONP descriptor '{}' has no function name",
                param
            ))),
        }
    }
}

struct SingleEntry;

impl<'de> Visitor<'de> for SingleEntry {
    type Value = (String, Option<String>);

    fn expecting(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "a map with exactly one entry")
    }

    fn visit_map<A: MapAccess<'de>>(self, mut map: A) -> Result<Self::Value, A::Error> {
        let entry = map
            .next_entry::<String, Option<String>>()?
            .ok_or_else(|| serde::de::Error::invalid_length(0, &self))?;
        if map.next_key::<String>()?.is_some() {
            return Err(serde::de::Error::invalid_length(2, &self));
        }
        Ok(entry)
    }
}

/// Effective client settings.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settings {
    pub method: Method,
    #[serde(rename = "baseURI")]
    pub base_uri: String,
    pub params: QueryParams,
    pub jsonp: JsonpCallback,
}

impl Settings {
    /// `method: get`, `baseURI: "/"`, no params, generated callback name
    /// under `callback`.
    pub fn baseline() -> Self {
        Self {
            method: Method::GET,
            base_uri: "/".to_string(),
            params: QueryParams::new(),
            jsonp: JsonpCallback::default(),
        }
    }

    /// Overlay the fields present in `overrides`.
    pub fn with_overrides(mut self, overrides: &SettingsOverride) -> Self {
        if let Some(method) = overrides.method {
            self.method = method;
        }
        if let Some(base_uri) = &overrides.base_uri {
            self.base_uri = base_uri.clone();
        }
        if let Some(params) = &overrides.params {
            self.params = params.clone();
        }
        if let Some(jsonp) = &overrides.jsonp {
            self.jsonp = jsonp.clone();
        }
        self
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self::baseline()
    }
}

/// User overrides of the baseline settings. Every field is optional; an
/// absent field leaves the baseline value in place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SettingsOverride {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub method: Option<Method>,

    #[serde(
        default,
        rename = "baseURI",
        alias = "base_uri",
        skip_serializing_if = "Option::is_none"
    )]
    pub base_uri: Option<String>,

    /// Replaces the baseline params as a whole, it is not merged key by key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<QueryParams>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jsonp: Option<JsonpCallback>,
}

impl SettingsOverride {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_method(mut self, method: Method) -> Self {
        self.method = Some(method);
        self
    }

    pub fn with_base_uri(mut self, base_uri: impl Into<String>) -> Self {
        self.base_uri = Some(base_uri.into());
        self
    }

    pub fn with_params(mut self, params: QueryParams) -> Self {
        self.params = Some(params);
        self
    }

    pub fn with_jsonp(mut self, jsonp: JsonpCallback) -> Self {
        self.jsonp = Some(jsonp);
        self
    }

    /// Union `other` into `self`, field by field. Fields present in `other`
    /// win.
    pub fn merge(&mut self, other: SettingsOverride) {
        if other.method.is_some() {
            self.method = other.method;
        }
        if other.base_uri.is_some() {
            self.base_uri = other.base_uri;
        }
        if other.params.is_some() {
            self.params = other.params;
        }
        if other.jsonp.is_some() {
            self.jsonp = other.jsonp;
        }
    }

    pub fn is_empty(&self) -> bool {
        self == &SettingsOverride::default()
    }
}

/// Persisted settings shared by every chain of one client.
#[derive(Debug, Clone, Default)]
pub struct SharedSettings {
    inner: Arc<Mutex<SettingsOverride>>,
}

impl SharedSettings {
    pub fn new() -> Self {
        Self::default()
    }

    // The guarded value is replaced or merged whole, so a poisoned lock
    // never exposes a half-written state.
    fn lock(&self) -> MutexGuard<'_, SettingsOverride> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn merge(&self, overrides: SettingsOverride) {
        self.lock().merge(overrides);
    }

    /// Drop every override, restoring the baseline.
    pub fn clear(&self) {
        *self.lock() = SettingsOverride::default();
    }

    pub fn overrides(&self) -> SettingsOverride {
        self.lock().clone()
    }

    pub fn effective(&self) -> Settings {
        Settings::baseline().with_overrides(&self.lock())
    }
}
