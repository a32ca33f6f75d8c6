use std::{collections::HashMap, fmt, sync::Arc};

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, warn};

/// Fired once the namespace connection is acknowledged.
pub const CONNECT: &str = "connect";
/// Fired once when the session ends; the payload is the reason string.
pub const DISCONNECT: &str = "disconnect";
/// Fired when the server refuses the namespace connection.
pub const CONNECT_ERROR: &str = "connect_error";

pub type Handler = Arc<dyn Fn(Value) + Send + Sync>;

/// Event name to callback map, installed on a session before it connects.
#[derive(Clone, Default)]
pub struct Handlers {
    handlers: HashMap<String, Handler>,
}

impl Handlers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers `handler` for `event`, replacing any earlier registration.
    pub fn on<F>(mut self, event: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Value) + Send + Sync + 'static,
    {
        self.handlers.insert(event.into(), Arc::new(handler));
        self
    }

    /// Like [`Handlers::on`], but deserializes the payload first. Payloads
    /// that do not fit `T` are logged and dropped.
    pub fn on_payload<T, F>(self, event: impl Into<String>, handler: F) -> Self
    where
        T: DeserializeOwned,
        F: Fn(T) + Send + Sync + 'static,
    {
        let event = event.into();
        let name = event.clone();
        self.on(event, move |payload: Value| {
            match serde_json::from_value::<T>(payload) {
                Ok(typed) => handler(typed),
                Err(error) => warn!(event = %name, %error, "dropping event with unexpected payload"),
            }
        })
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, event: &str) -> bool {
        self.handlers.contains_key(event)
    }

    /// Invokes the handler registered for `event`. Returns `false` when
    /// nothing is registered.
    pub fn dispatch(&self, event: &str, payload: Value) -> bool {
        match self.handlers.get(event) {
            Some(handler) => {
                handler(payload);
                true
            }
            None => {
                debug!(event, "no handler registered");
                false
            }
        }
    }
}

impl fmt::Debug for Handlers {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut events: Vec<&str> = self.handlers.keys().map(String::as_str).collect();
        events.sort_unstable();
        f.debug_struct("Handlers").field("events", &events).finish()
    }
}
