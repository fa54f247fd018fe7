//! Transferable-error codec.
//!
//! Worker-side failures cross the broker as a JSON carrier that keeps
//! the concrete error type name, display message, and source chain.
//! Errors that serialize also embed their own fields, so the submitting
//! side can reconstruct the typed value. The guaranteed minimum across
//! the process boundary is `type_name: message`.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

/// Distinguishes a carrier from arbitrary failure payloads.
const CARRIER_MARKER: &str = "transferable-error/v1";

fn default_marker() -> String {
    CARRIER_MARKER.to_string()
}

/// Wire form of an error crossing the worker/manager boundary.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransferableError {
    marker: String,
    /// Concrete type name on the worker side.
    pub type_name: String,
    /// Display message.
    pub message: String,
    /// The error's own serde fields, when it serializes.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub fields: Option<Value>,
    /// Display messages of the source chain, outermost first.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub chain: Vec<String>,
}

impl TransferableError {
    /// Capture any error: type name, message, and source chain.
    pub fn from_error<E: std::error::Error>(err: &E) -> Self {
        Self {
            marker: default_marker(),
            type_name: std::any::type_name::<E>().to_string(),
            message: err.to_string(),
            fields: None,
            chain: source_chain(err),
        }
    }

    /// Capture a serializable error, embedding its fields so the
    /// receiving side can reconstruct the typed value.
    pub fn from_serializable<E: std::error::Error + Serialize>(err: &E) -> Self {
        let fields: Option<Value> = match serde_json::to_value(err) {
            Ok(value) => Some(value),
            Err(ser_err) => {
                tracing::warn!(
                    type_name = std::any::type_name::<E>(),
                    error = %ser_err,
                    "error fields did not serialize; carrying message only"
                );
                None
            }
        };
        Self {
            fields,
            ..Self::from_error(err)
        }
    }

    /// Serialize into the wire payload.
    pub fn encode(&self) -> Value {
        match serde_json::to_value(self) {
            Ok(value) => value,
            // A struct of strings cannot fail to serialize; degrade
            // to the minimum-fidelity shape if it somehow does.
            Err(err) => {
                tracing::error!(error = %err, "carrier serialization failed");
                serde_json::json!({
                    "marker": CARRIER_MARKER,
                    "type_name": self.type_name,
                    "message": self.message,
                })
            }
        }
    }

    /// Defensive decode: anything that is not a valid carrier yields
    /// `None` with a logged warning, never a panic or an error.
    pub fn decode(value: &Value) -> Option<Self> {
        match serde_json::from_value::<Self>(value.clone()) {
            Ok(carrier) if carrier.marker == CARRIER_MARKER => Some(carrier),
            Ok(carrier) => {
                tracing::warn!(marker = %carrier.marker, "unrecognized carrier marker");
                None
            }
            Err(err) => {
                tracing::warn!(error = %err, "failure payload is not an error carrier");
                None
            }
        }
    }

    /// Rebuild the typed error from the embedded fields, when present
    /// and compatible with `E`.
    pub fn reconstruct<E: DeserializeOwned>(&self) -> Option<E> {
        let fields: &Value = self.fields.as_ref()?;
        serde_json::from_value(fields.clone()).ok()
    }

    /// The opaque cross-boundary error view.
    pub fn into_transferred(self) -> TransferredError {
        TransferredError {
            type_name: self.type_name,
            message: self.message,
        }
    }
}

/// An error received from the other side of the broker.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("{type_name}: {message}")]
pub struct TransferredError {
    pub type_name: String,
    pub message: String,
}

/// Display messages of `source()` links, outermost first.
fn source_chain(err: &dyn std::error::Error) -> Vec<String> {
    let mut chain: Vec<String> = Vec::new();
    let mut current: Option<&dyn std::error::Error> = err.source();
    while let Some(cause) = current {
        chain.push(cause.to_string());
        current = cause.source();
    }
    chain
}
