use futures_util::future::BoxFuture;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use tauri::ipc::Channel;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

use crate::config::ViewerConfig;
use crate::error::{Result, ViewerError};
use crate::viewer::{
    CapabilityError, FaultReport, FullscreenRequest, HostCapabilities, Measurements,
    MemoryResourceStore, RecomputeTrigger, SharePayload, ShellView, Viewer, ViewerCallbacks,
    ViewerDeps, ViewerProps,
};

// ── Events ──────────────────────────────────────────────────────────────────

/// Events streamed from the viewer to the frontend via Channel.
#[derive(Clone, Serialize)]
#[serde(rename_all = "camelCase", tag = "event", content = "data")]
pub enum ViewerEvent {
    Loaded,
    LoadError { message: String },
    Fault(FaultReport),
    Back,
    /// The webview owns the real clipboard; the frontend performs the write.
    CopyToClipboard { text: String },
    /// A fullscreen transition settled; measure again.
    Remeasure,
}

// ── Capabilities ────────────────────────────────────────────────────────────

/// Desktop webviews have no share sheet, so sharing always degrades to a
/// clipboard write, which is relayed to the frontend.
struct ChannelCapabilities {
    channel: Channel<ViewerEvent>,
}

impl HostCapabilities for ChannelCapabilities {
    fn can_share(&self) -> bool {
        false
    }

    fn share(&self, _payload: SharePayload) -> BoxFuture<'static, std::result::Result<(), CapabilityError>> {
        Box::pin(async { Err(CapabilityError::Unavailable) })
    }

    fn write_clipboard(&self, text: String) -> BoxFuture<'static, std::result::Result<(), CapabilityError>> {
        let result = self
            .channel
            .send(ViewerEvent::CopyToClipboard { text })
            .map_err(|e| CapabilityError::Failed(e.to_string()));
        Box::pin(async move { result })
    }
}

// ── State ───────────────────────────────────────────────────────────────────

/// Managed state holding the open viewer (if any).
pub struct ViewerHostState {
    viewer: Arc<Mutex<Option<Viewer>>>,
    channel: Arc<Mutex<Option<Channel<ViewerEvent>>>>,
    settle_handle: Arc<Mutex<Option<JoinHandle<()>>>>,
    store: Arc<MemoryResourceStore>,
    config: ViewerConfig,
}

impl ViewerHostState {
    pub fn new(store: Arc<MemoryResourceStore>, config: ViewerConfig) -> Self {
        Self {
            viewer: Arc::new(Mutex::new(None)),
            channel: Arc::new(Mutex::new(None)),
            settle_handle: Arc::new(Mutex::new(None)),
            store,
            config,
        }
    }

    /// Tear down synchronously (for the exit handler).
    pub fn kill_sync(&self) {
        if let Ok(mut guard) = self.settle_handle.try_lock() {
            if let Some(handle) = guard.take() {
                handle.abort();
            }
        }
        // Dropping the viewer releases its packaged document.
        if let Ok(mut guard) = self.viewer.try_lock() {
            *guard = None;
        }
    }

    async fn with_viewer<T>(&self, f: impl FnOnce(&mut Viewer) -> T) -> Result<T> {
        let mut guard = self.viewer.lock().await;
        let viewer = guard
            .as_mut()
            .ok_or_else(|| ViewerError::Custom("No viewer is open".into()))?;
        Ok(f(viewer))
    }
}

fn callbacks_for(channel: &Channel<ViewerEvent>) -> ViewerCallbacks {
    let loaded = channel.clone();
    let load_error = channel.clone();
    let fault = channel.clone();
    let back = channel.clone();
    ViewerCallbacks::default()
        .on_load(move || {
            let _ = loaded.send(ViewerEvent::Loaded);
        })
        .on_load_error(move |message| {
            let _ = load_error.send(ViewerEvent::LoadError { message });
        })
        .on_fault(move |report| {
            let _ = fault.send(ViewerEvent::Fault(report));
        })
        .on_back(move || {
            let _ = back.send(ViewerEvent::Back);
        })
}

// ── Commands ────────────────────────────────────────────────────────────────

/// Open (or replace) the viewer with new content and stream its events.
#[tauri::command]
pub async fn open_viewer(
    content: Option<String>,
    title: String,
    show_back_button: Option<bool>,
    style_hint: Option<String>,
    on_event: Channel<ViewerEvent>,
    state: tauri::State<'_, ViewerHostState>,
) -> Result<ShellView> {
    let props = ViewerProps {
        content,
        title,
        show_back_button: show_back_button.unwrap_or(false),
        style_hint,
    };
    let deps = ViewerDeps {
        store: state.store.clone(),
        capabilities: Arc::new(ChannelCapabilities {
            channel: on_event.clone(),
        }),
        config: state.config.clone(),
    };

    // Drop the previous viewer first so only one document is ever published.
    let mut guard = state.viewer.lock().await;
    *guard = None;
    let viewer = guard.insert(Viewer::new(props, callbacks_for(&on_event), deps));
    let view = viewer.view();
    drop(guard);

    *state.channel.lock().await = Some(on_event);
    Ok(view)
}

#[tauri::command]
pub async fn close_viewer(state: tauri::State<'_, ViewerHostState>) -> Result<()> {
    if let Some(handle) = state.settle_handle.lock().await.take() {
        handle.abort();
    }
    *state.viewer.lock().await = None;
    *state.channel.lock().await = None;
    Ok(())
}

#[tauri::command]
pub async fn set_viewer_content(
    content: Option<String>,
    state: tauri::State<'_, ViewerHostState>,
) -> Result<ShellView> {
    state
        .with_viewer(|v| {
            v.set_content(content);
            v.view()
        })
        .await
}

/// The frame's `load` event fired for the document of `epoch`.
#[tauri::command]
pub async fn frame_loaded(epoch: u64, state: tauri::State<'_, ViewerHostState>) -> Result<ShellView> {
    state
        .with_viewer(|v| {
            v.frame_loaded(epoch);
            v.view()
        })
        .await
}

/// The frame's `error` event fired for the document of `epoch`.
#[tauri::command]
pub async fn frame_failed(
    epoch: u64,
    message: Option<String>,
    state: tauri::State<'_, ViewerHostState>,
) -> Result<ShellView> {
    state
        .with_viewer(|v| {
            v.frame_failed(epoch, message.as_deref().unwrap_or("unknown error"));
            v.view()
        })
        .await
}

/// Relay a `message` event posted by the frame. The shim tags every message with
/// its document's epoch, so traffic from a replaced document is dropped.
#[tauri::command]
pub async fn frame_message(message: Value, state: tauri::State<'_, ViewerHostState>) -> Result<()> {
    state
        .with_viewer(|v| {
            v.receive_message(&message);
        })
        .await
}

#[tauri::command]
pub async fn measure_viewport(
    trigger: RecomputeTrigger,
    measurements: Measurements,
    state: tauri::State<'_, ViewerHostState>,
) -> Result<ShellView> {
    state
        .with_viewer(|v| {
            v.measure(trigger, measurements);
            v.view()
        })
        .await
}

#[tauri::command]
pub async fn reload_viewer(state: tauri::State<'_, ViewerHostState>) -> Result<ShellView> {
    state
        .with_viewer(|v| {
            v.reload();
            v.view()
        })
        .await
}

#[tauri::command]
pub async fn toggle_fullscreen(
    state: tauri::State<'_, ViewerHostState>,
) -> Result<FullscreenRequest> {
    state.with_viewer(|v| v.toggle_fullscreen()).await
}

/// The document's fullscreen state changed. Once the transition settles the
/// frontend is asked to measure again.
#[tauri::command]
pub async fn fullscreen_changed(
    active: bool,
    state: tauri::State<'_, ViewerHostState>,
) -> Result<ShellView> {
    let (delay, view) = state
        .with_viewer(|v| {
            let delay = v.fullscreen_changed(active);
            (delay, v.view())
        })
        .await?;

    let channel = state.channel.lock().await.clone();
    if let Some(channel) = channel {
        let handle = tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let _ = channel.send(ViewerEvent::Remeasure);
        });
        // A newer transition supersedes the pending one.
        if let Some(previous) = state.settle_handle.lock().await.replace(handle) {
            previous.abort();
        }
    }

    Ok(view)
}

#[tauri::command]
pub async fn viewer_back(state: tauri::State<'_, ViewerHostState>) -> Result<bool> {
    state.with_viewer(|v| v.back()).await
}

#[tauri::command]
pub async fn viewer_view(state: tauri::State<'_, ViewerHostState>) -> Result<ShellView> {
    state.with_viewer(|v| v.view()).await
}
