//! Endpoint addressing for the device API.
//!
//! The API is a tree of components (`/recorder`, `/recordings/<uuid>`, ...).
//! Each component exposes three kinds of endpoints, told apart by the
//! separator between the component URI and the endpoint name:
//!
//! | Kind     | Separator | Example                         | Verb |
//! |----------|-----------|---------------------------------|------|
//! | Property | `.`       | `/recorder.folder`              | GET to read, POST to write |
//! | Action   | `!`       | `/recorder!start`               | POST with an argument array |
//! | Signal   | `:`       | `/recordings:child-added`       | subscribe |
//!
//! [`ApiComponent`] wraps a [`Connection`] and a component URI and forwards
//! to the generic request/subscribe operations. It does not interpret any
//! payload.

use serde_json::Value;

use crate::connection::{Connection, SignalReceiver, UnsubscribeHandle};
use crate::error::Result;

/// Kind of endpoint on an API component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndpointKind {
    /// Readable (and possibly writable) value.
    Property,
    /// Invokable operation.
    Action,
    /// Subscribable event stream.
    Signal,
}

impl EndpointKind {
    /// Separator placed between the component URI and the endpoint name.
    #[must_use]
    pub const fn separator(self) -> char {
        match self {
            Self::Property => '.',
            Self::Action => '!',
            Self::Signal => ':',
        }
    }
}

/// Build the URI of endpoint `name` of kind `kind` on component `base`.
#[must_use]
pub fn endpoint_uri(base: &str, kind: EndpointKind, name: &str) -> String {
    format!("{base}{}{name}", kind.separator())
}

/// One API component on a connection.
#[derive(Debug, Clone)]
pub struct ApiComponent {
    connection: Connection,
    uri: String,
}

impl ApiComponent {
    /// Component rooted at `uri` (e.g. `/recorder`).
    pub fn new(connection: Connection, uri: impl Into<String>) -> Self {
        Self {
            connection,
            uri: uri.into(),
        }
    }

    /// Component URI.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Child component `{uri}/{name}`, e.g. one recording under `/recordings`.
    #[must_use]
    pub fn child(&self, name: &str) -> Self {
        Self::new(self.connection.clone(), format!("{}/{name}", self.uri))
    }

    /// URI of one of this component's endpoints.
    pub fn endpoint(&self, kind: EndpointKind, name: &str) -> String {
        endpoint_uri(&self.uri, kind, name)
    }

    /// `GET` the component itself (its description, including children).
    pub async fn describe(&self) -> Result<Value> {
        self.connection.get(&self.uri, None).await
    }

    /// Read a property.
    pub async fn get_property(&self, name: &str) -> Result<Value> {
        self.connection
            .get(&self.endpoint(EndpointKind::Property, name), None)
            .await
    }

    /// Write a property. Returns the device's answer (normally a success flag).
    pub async fn set_property(&self, name: &str, value: Value) -> Result<Value> {
        self.connection
            .post(&self.endpoint(EndpointKind::Property, name), Some(value))
            .await
    }

    /// Invoke an action with positional arguments.
    pub async fn call_action(&self, name: &str, args: Vec<Value>) -> Result<Value> {
        self.connection
            .post(&self.endpoint(EndpointKind::Action, name), Some(Value::Array(args)))
            .await
    }

    /// Subscribe to one of this component's signals.
    pub async fn subscribe_to_signal(
        &self,
        name: &str,
    ) -> Result<(SignalReceiver, UnsubscribeHandle)> {
        self.connection
            .subscribe(&self.endpoint(EndpointKind::Signal, name))
            .await
    }
}
