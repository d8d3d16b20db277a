//! Tauri host for the viewer: managed state, IPC commands, and the custom scheme
//! that serves packaged documents to the sandboxed frame.

pub mod viewer;

use std::sync::Arc;
use tauri::plugin::{Builder, TauriPlugin};
use tauri::{Manager, Runtime};

use crate::config::{load_config, ViewerConfig};
use crate::viewer::MemoryResourceStore;
use viewer::ViewerHostState;

/// Scheme the packaged documents are served from.
pub const FRAME_SCHEME: &str = "isoview";

// Windows and Android expose custom schemes through an http origin.
#[cfg(any(windows, target_os = "android"))]
const FRAME_BASE_URL: &str = "http://isoview.localhost/";
#[cfg(not(any(windows, target_os = "android")))]
const FRAME_BASE_URL: &str = "isoview://localhost/";

fn serve_document(
    store: &MemoryResourceStore,
    csp: &str,
    path: &str,
) -> tauri::http::Response<Vec<u8>> {
    let id = path.trim_start_matches('/');
    let response = match store.get(id) {
        Some(document) => tauri::http::Response::builder()
            .status(200)
            .header("Content-Type", "text/html; charset=utf-8")
            // Enforced even if the document is opened outside the sandboxed frame.
            .header("Content-Security-Policy", csp)
            .header("Cache-Control", "no-store")
            .body(document.as_bytes().to_vec()),
        None => tauri::http::Response::builder()
            .status(404)
            .body(b"released".to_vec()),
    };
    response.unwrap_or_else(|e| {
        log::warn!("failed to build {FRAME_SCHEME} response: {e}");
        tauri::http::Response::new(Vec::new())
    })
}

/// Build the `isoview` plugin. Register it with `tauri::Builder::plugin`.
pub fn plugin<R: Runtime>() -> TauriPlugin<R> {
    let config = load_config().unwrap_or_else(|e| {
        log::warn!("using default viewer config: {e}");
        ViewerConfig::default()
    });
    let csp = config.content_security_policy();
    let store = Arc::new(MemoryResourceStore::with_base(FRAME_BASE_URL));
    let protocol_store = store.clone();

    Builder::new("isoview")
        .register_uri_scheme_protocol(FRAME_SCHEME, move |_ctx, request| {
            serve_document(&protocol_store, &csp, request.uri().path())
        })
        .invoke_handler(tauri::generate_handler![
            viewer::open_viewer,
            viewer::close_viewer,
            viewer::set_viewer_content,
            viewer::frame_loaded,
            viewer::frame_failed,
            viewer::frame_message,
            viewer::measure_viewport,
            viewer::reload_viewer,
            viewer::toggle_fullscreen,
            viewer::fullscreen_changed,
            viewer::viewer_back,
            viewer::viewer_view,
        ])
        .setup(move |app, _api| {
            app.manage(ViewerHostState::new(store, config));
            Ok(())
        })
        .on_event(|app, event| {
            if let tauri::RunEvent::Exit = event {
                if let Some(state) = app.try_state::<ViewerHostState>() {
                    state.inner().kill_sync();
                }
            }
        })
        .build()
}
