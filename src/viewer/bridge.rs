use futures_util::future::{BoxFuture, FutureExt};
use serde::de::Error as _;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;
use tokio::task::JoinHandle;

use crate::templates;

// ── Messages ────────────────────────────────────────────────────────────────

/// Runtime error or unhandled rejection reported by the isolated content.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct FaultReport {
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub col: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
}

impl FaultReport {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            line: None,
            col: None,
            stack: None,
        }
    }

    /// Reads a report out of untyped fault data. Only `message` is required;
    /// optional fields of the wrong shape are dropped instead of the whole report.
    pub fn from_value(error: &Value) -> Option<Self> {
        let message = error.get("message")?.as_str()?.to_string();
        let position = |key: &str| {
            error
                .get(key)
                .and_then(Value::as_u64)
                .and_then(|n| u32::try_from(n).ok())
        };
        Some(Self {
            message,
            line: position("line"),
            col: position("col"),
            stack: error.get("stack").and_then(Value::as_str).map(str::to_string),
        })
    }
}

fn lenient_fault<'de, D>(deserializer: D) -> Result<FaultReport, D::Error>
where
    D: Deserializer<'de>,
{
    let error = Value::deserialize(deserializer)?;
    FaultReport::from_value(&error).ok_or_else(|| D::Error::custom("fault without a message"))
}

/// Messages the isolated content may post to the host.
#[derive(Clone, Debug, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "camelCase")]
pub enum BridgeMessage {
    /// Share data is sanitized field by field, so it stays untyped until then.
    Share {
        #[serde(default)]
        data: Value,
    },
    Copy { text: String },
    Fault {
        #[serde(deserialize_with = "lenient_fault")]
        error: FaultReport,
    },
}

impl BridgeMessage {
    /// Parse an inbound message. Anything malformed or unknown yields `None`.
    pub fn parse(raw: &Value) -> Option<Self> {
        match BridgeMessage::deserialize(raw) {
            Ok(message) => Some(message),
            Err(e) => {
                log::debug!("ignoring bridge message: {e}");
                None
            }
        }
    }

    pub fn parse_str(raw: &str) -> Option<Self> {
        match serde_json::from_str::<Value>(raw) {
            Ok(value) => Self::parse(&value),
            Err(e) => {
                log::debug!("ignoring non-JSON bridge message: {e}");
                None
            }
        }
    }
}

/// Share payload after sanitization. Never empty.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SharePayload {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

impl SharePayload {
    /// Keeps non-empty string `title`/`text` and absolute `url` values;
    /// substitutes `fallback_text` when nothing survives.
    pub fn sanitize(data: &Value, fallback_text: &str) -> Self {
        let string_field = |key: &str| {
            data.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
        };

        let url = string_field("url").filter(|u| url::Url::parse(u).is_ok());
        let mut payload = SharePayload {
            title: string_field("title"),
            text: string_field("text"),
            url,
        };

        if payload.title.is_none() && payload.text.is_none() && payload.url.is_none() {
            payload.text = Some(fallback_text.to_string());
        }
        payload
    }

    /// What to put on the clipboard when sharing isn't possible.
    pub fn clipboard_text(&self) -> Option<&str> {
        [&self.url, &self.text, &self.title]
            .into_iter()
            .filter_map(|field| field.as_deref())
            .find(|s| !s.is_empty())
    }
}

// ── Host capabilities ───────────────────────────────────────────────────────

#[derive(Debug, thiserror::Error)]
pub enum CapabilityError {
    #[error("cancelled by the user")]
    Cancelled,

    #[error("capability unavailable")]
    Unavailable,

    #[error("{0}")]
    Failed(String),
}

/// Share and clipboard access owned by the host. The isolated content only ever
/// reaches these through the bridge.
pub trait HostCapabilities: Send + Sync {
    /// Whether a native share sheet exists at all.
    fn can_share(&self) -> bool;

    fn share(&self, payload: SharePayload) -> BoxFuture<'static, Result<(), CapabilityError>>;

    fn write_clipboard(&self, text: String) -> BoxFuture<'static, Result<(), CapabilityError>>;
}

/// Capabilities for hosts without share or clipboard access. Every request is
/// dropped.
pub struct NoCapabilities;

impl HostCapabilities for NoCapabilities {
    fn can_share(&self) -> bool {
        false
    }

    fn share(&self, _payload: SharePayload) -> BoxFuture<'static, Result<(), CapabilityError>> {
        Box::pin(async { Err(CapabilityError::Unavailable) })
    }

    fn write_clipboard(&self, _text: String) -> BoxFuture<'static, Result<(), CapabilityError>> {
        Box::pin(async { Err(CapabilityError::Unavailable) })
    }
}

// ── Dispatch ────────────────────────────────────────────────────────────────

/// Result of handing one message to the bridge.
#[derive(Debug)]
pub enum Dispatch {
    Ignored,
    /// A fault the viewer must forward to its caller.
    Fault(FaultReport),
    /// A capability call running on its own task.
    Spawned(JoinHandle<()>),
}

pub struct Bridge {
    capabilities: Arc<dyn HostCapabilities>,
    share_fallback_text: String,
}

impl Bridge {
    pub fn new(capabilities: Arc<dyn HostCapabilities>) -> Self {
        Self {
            capabilities,
            share_fallback_text: templates::SHARE_FALLBACK_TEXT.to_string(),
        }
    }

    pub fn with_fallback_text(mut self, text: &str) -> Self {
        self.share_fallback_text = text.to_string();
        self
    }

    /// Handle one inbound message. Never fails: malformed input is ignored and
    /// capability calls run detached so the next message can be taken right away.
    ///
    /// Capability calls need a tokio runtime to run on. Outside one they are
    /// dropped; faults are still returned.
    pub fn dispatch(&self, raw: &Value) -> Dispatch {
        let Some(message) = BridgeMessage::parse(raw) else {
            return Dispatch::Ignored;
        };

        let task = match message {
            BridgeMessage::Fault { error } => return Dispatch::Fault(error),
            BridgeMessage::Share { data } => {
                let payload = SharePayload::sanitize(&data, &self.share_fallback_text);
                share_or_copy(self.capabilities.clone(), payload).boxed()
            }
            BridgeMessage::Copy { text } => {
                let capabilities = self.capabilities.clone();
                async move { copy_best_effort(capabilities.as_ref(), text).await }.boxed()
            }
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => Dispatch::Spawned(handle.spawn(task)),
            Err(e) => {
                log::debug!("dropping capability request, no runtime: {e}");
                Dispatch::Ignored
            }
        }
    }
}

async fn share_or_copy(capabilities: Arc<dyn HostCapabilities>, payload: SharePayload) {
    if capabilities.can_share() {
        match capabilities.share(payload.clone()).await {
            Ok(()) => return,
            Err(CapabilityError::Cancelled) => {
                log::debug!("share cancelled, copying instead");
            }
            Err(e) => {
                log::debug!("share failed ({e}), copying instead");
            }
        }
    }

    if let Some(text) = payload.clipboard_text() {
        copy_best_effort(capabilities.as_ref(), text.to_string()).await;
    }
}

async fn copy_best_effort(capabilities: &dyn HostCapabilities, text: String) {
    if let Err(e) = capabilities.write_clipboard(text).await {
        log::debug!("clipboard write failed: {e}");
    }
}
