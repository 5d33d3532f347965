//! JSONP over a plain fetch.
//!
//! A browser loads a JSONP endpoint as a script element, and the script then
//! calls a global function named in the query string. Here the script is
//! fetched as text and its `name(<json>)` calls are dispatched to a
//! [`CallbackRegistry`], which plays the part of the global namespace and of
//! the document's mounted script elements.
//!
//! Callback names are global to a registry. Registering a name that is
//! already pending displaces the earlier callback, whose request then fails
//! with [`Error::CallbackDisplaced`]. Callers issuing concurrent JSONP
//! requests must give each one its own name.
//!
//! A script that loads but never calls its callback leaves the request
//! pending. There is no timeout here; wrap the future in one if needed.
//! Dropping the future unregisters its callback and unmounts its script.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::oneshot;

use crate::error::Error;
use crate::query::{append_query_string, prefixed_timestamp};
use crate::settings::JsonpDescriptor;
use crate::transport::Fetch;
use crate::types::{Method, RequestInit};

struct PendingCallback {
    script_id: String,
    sender: oneshot::Sender<serde_json::Value>,
}

#[derive(Default)]
struct RegistryState {
    callbacks: HashMap<String, PendingCallback>,
    scripts: HashSet<String>,
    next_script: u64,
}

/// Pending JSONP callbacks and the ids of the scripts awaiting them.
#[derive(Clone, Default)]
pub struct CallbackRegistry {
    state: Arc<Mutex<RegistryState>>,
}

impl CallbackRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, RegistryState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// A prefixed timestamp with a per-registry sequence number, so scripts
    /// loaded within the same millisecond stay distinct.
    fn next_script_id(&self) -> String {
        let mut state = self.lock();
        state.next_script += 1;
        format!("{}-{}", prefixed_timestamp(), state.next_script)
    }

    /// Register `name` for the script `script_id` and mount the script.
    fn register(&self, name: &str, script_id: &str) -> oneshot::Receiver<serde_json::Value> {
        let (sender, receiver) = oneshot::channel();
        let mut state = self.lock();
        state.scripts.insert(script_id.to_string());
        let previous = state.callbacks.insert(
            name.to_string(),
            PendingCallback {
                script_id: script_id.to_string(),
                sender,
            },
        );
        if let Some(previous) = previous {
            log::warn!(
                "JSONP callback '{}' displaces the one registered for {}",
                name,
                previous.script_id
            );
        }
        receiver
    }

    /// Call the callback registered under `name`: it removes itself,
    /// unmounts its script and delivers `payload`. Returns `false` when no
    /// such callback is pending.
    pub fn invoke(&self, name: &str, payload: serde_json::Value) -> bool {
        let mut state = self.lock();
        let Some(pending) = state.callbacks.remove(name) else {
            return false;
        };
        state.scripts.remove(&pending.script_id);
        // The receiver is gone if the request future was dropped.
        let _ = pending.sender.send(payload);
        true
    }

    /// Drop the registration for `name` if it still belongs to `script_id`,
    /// and unmount that script.
    fn discard(&self, name: &str, script_id: &str) {
        let mut state = self.lock();
        if state
            .callbacks
            .get(name)
            .is_some_and(|pending| pending.script_id == script_id)
        {
            state.callbacks.remove(name);
        }
        state.scripts.remove(script_id);
    }

    pub fn is_registered(&self, name: &str) -> bool {
        self.lock().callbacks.contains_key(name)
    }

    /// Ids of scripts still waiting for their callback.
    pub fn mounted_scripts(&self) -> Vec<String> {
        self.lock().scripts.iter().cloned().collect()
    }

    /// Run a loaded script: dispatch every `name(<json>)` call whose name is
    /// registered. Calls to unknown names are skipped. Returns how many
    /// callbacks were invoked.
    pub fn evaluate(&self, script: &str) -> Result<usize, Error> {
        let mut invoked = 0;
        let mut offset = 0;

        while let Some(open) = next_call(script, offset) {
            offset = open + 1;

            let name = callee(&script[..open]);
            if name.is_empty() || !self.is_registered(name) {
                continue;
            }

            let Some(close) = argument_end(&script[offset..]) else {
                continue;
            };
            let argument = script[offset..offset + close].trim();
            let payload = if argument.is_empty() {
                serde_json::Value::Null
            } else {
                serde_json::from_str(argument)?
            };
            let end = offset + close + 1;

            log::trace!("dispatching JSONP payload to '{}'", name);
            if self.invoke(name, payload) {
                invoked += 1;
            }
            offset = end;
        }

        Ok(invoked)
    }
}

/// Byte offset of the next `(` at or after `from` that lies outside string
/// literals and comments.
fn next_call(script: &str, from: usize) -> Option<usize> {
    let mut chars = script[from..].char_indices().peekable();
    let mut quote = None;
    let mut escaped = false;

    while let Some((index, c)) = chars.next() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' => return Some(from + index),
            '/' => match chars.peek() {
                Some((_, '/')) => {
                    for (_, c) in chars.by_ref() {
                        if c == '\n' {
                            break;
                        }
                    }
                }
                Some((_, '*')) => {
                    chars.next();
                    let mut star = false;
                    for (_, c) in chars.by_ref() {
                        if star && c == '/' {
                            break;
                        }
                        star = c == '*';
                    }
                }
                _ => {}
            },
            _ => {}
        }
    }
    None
}

/// Byte offset of the parenthesis closing a call whose arguments start at
/// the beginning of `arguments`. String literals and nested brackets are
/// skipped.
fn argument_end(arguments: &str) -> Option<usize> {
    let mut depth = 0usize;
    let mut quote = None;
    let mut escaped = false;

    for (index, c) in arguments.char_indices() {
        if let Some(open) = quote {
            if escaped {
                escaped = false;
            } else if c == '\\' {
                escaped = true;
            } else if c == open {
                quote = None;
            }
            continue;
        }
        match c {
            '"' | '\'' | '`' => quote = Some(c),
            '(' | '[' | '{' => depth += 1,
            ')' if depth == 0 => return Some(index),
            ')' | ']' | '}' => depth = depth.saturating_sub(1),
            _ => {}
        }
    }
    None
}

/// The identifier immediately before a call's opening parenthesis.
fn callee(prefix: &str) -> &str {
    let prefix = prefix.trim_end();
    let start = prefix
        .char_indices()
        .rev()
        .take_while(|(_, c)| c.is_alphanumeric() || *c == '_' || *c == '$')
        .last()
        .map(|(index, _)| index)
        .unwrap_or(prefix.len());
    &prefix[start..]
}

/// One request's hold on a registry: dropping it discards the callback, if
/// still its own, and unmounts the script.
struct Registration<'a> {
    registry: &'a CallbackRegistry,
    name: &'a str,
    script_id: String,
}

impl Drop for Registration<'_> {
    fn drop(&mut self) {
        self.registry.discard(self.name, &self.script_id);
    }
}

/// Loads JSONP scripts through a [`Fetch`] primitive.
#[derive(Clone)]
pub struct JsonpBridge {
    fetch: Arc<dyn Fetch>,
    registry: CallbackRegistry,
}

impl JsonpBridge {
    pub fn new(fetch: Arc<dyn Fetch>) -> Self {
        Self::with_registry(fetch, CallbackRegistry::new())
    }

    /// Share `registry` with other bridges, like scripts sharing one window.
    pub fn with_registry(fetch: Arc<dyn Fetch>, registry: CallbackRegistry) -> Self {
        Self { fetch, registry }
    }

    pub fn registry(&self) -> &CallbackRegistry {
        &self.registry
    }

    /// Fetch `url` as JSONP and resolve with the payload handed to the
    /// callback named in `descriptor`.
    pub async fn fetch(
        &self,
        url: &str,
        descriptor: &JsonpDescriptor,
    ) -> Result<serde_json::Value, Error> {
        let script_url =
            append_query_string(url, &descriptor.to_query_params().to_query_string());
        let script_id = self.registry.next_script_id();
        let name = descriptor.function.as_str();

        let receiver = self.registry.register(name, &script_id);
        let _registration = Registration {
            registry: &self.registry,
            name,
            script_id,
        };

        self.load(&script_url).await?;

        receiver.await.map_err(|_| Error::CallbackDisplaced {
            name: name.to_string(),
        })
    }

    async fn load(&self, script_url: &str) -> Result<(), Error> {
        let init = RequestInit::new().with_method(Method::GET);
        let response = self
            .fetch
            .fetch(script_url, &init)
            .await
            .map_err(|e| Error::ScriptLoad {
                url: script_url.to_string(),
                message: e.to_string(),
            })?;

        if !response.is_success() {
            return Err(Error::ScriptLoad {
                url: script_url.to_string(),
                message: format!("HTTP {} {}", response.status, response.status_text),
            });
        }

        let script = response.body_text.unwrap_or_default();
        let invoked = self.registry.evaluate(&script)?;
        log::debug!("loaded {} ({} callbacks invoked)", script_url, invoked);
        Ok(())
    }
}
