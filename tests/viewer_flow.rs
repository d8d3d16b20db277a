use futures_util::future::BoxFuture;
use serde_json::json;
use std::sync::{Arc, Mutex};

use isoview_lib::viewer::{CapabilityError, Dispatch, SharePayload};
use isoview_lib::{
    FaultReport, HostCapabilities, LifecycleStatus, Measurements, MemoryResourceStore,
    RecomputeTrigger, Viewer, ViewerCallbacks, ViewerConfig, ViewerDeps, ViewerProps,
};

#[derive(Default)]
struct Clipboard {
    writes: Mutex<Vec<String>>,
}

impl HostCapabilities for Clipboard {
    fn can_share(&self) -> bool {
        false
    }

    fn share(&self, _payload: SharePayload) -> BoxFuture<'static, Result<(), CapabilityError>> {
        Box::pin(async { Err(CapabilityError::Unavailable) })
    }

    fn write_clipboard(&self, text: String) -> BoxFuture<'static, Result<(), CapabilityError>> {
        self.writes.lock().unwrap().push(text);
        Box::pin(async { Ok(()) })
    }
}

fn viewer_with(
    content: &str,
    store: Arc<MemoryResourceStore>,
    clipboard: Arc<Clipboard>,
    faults: Arc<Mutex<Vec<FaultReport>>>,
) -> Viewer {
    Viewer::new(
        ViewerProps::new(content, "Demo"),
        ViewerCallbacks::default().on_fault(move |f| faults.lock().unwrap().push(f)),
        ViewerDeps {
            store,
            capabilities: clipboard,
            config: ViewerConfig::default(),
        },
    )
}

#[tokio::test]
async fn load_resize_and_bridge_end_to_end() {
    let store = Arc::new(MemoryResourceStore::default());
    let clipboard = Arc::new(Clipboard::default());
    let faults = Arc::new(Mutex::new(Vec::new()));
    let mut viewer = viewer_with(
        "<html><body>hi</body></html>",
        store.clone(),
        clipboard.clone(),
        faults.clone(),
    );

    // The published document carries the shim inside a synthesized head.
    let src = viewer.frame_src().unwrap().to_string();
    let document = store.get_by_url(&src).unwrap();
    assert!(document.starts_with("<html><head><script>"));
    assert!(document.ends_with("</head><body>hi</body></html>"));

    assert!(viewer.frame_loaded(viewer.epoch()));
    assert_eq!(viewer.status(), &LifecycleStatus::Ready);

    viewer.measure(
        RecomputeTrigger::ContainerResize,
        Measurements::container(320.0, 600.0).with_safe_area("0", "0"),
    );
    // Width is floored at 280px before dividing by the 1080px logical width.
    let expected = (280.0_f64 / 1080.0).min(480.0 / 1350.0).min(1.0).max(0.25);
    assert!((viewer.viewport().scale - expected).abs() < 1e-12);
    assert!(!viewer.viewport().is_landscape_warning);

    let share = viewer.receive_message(&json!({
        "type": "share",
        "data": { "title": "T", "text": "X", "url": "https://a.b/c" }
    }));
    match share {
        Dispatch::Spawned(handle) => handle.await.unwrap(),
        other => panic!("share should spawn a task, got {other:?}"),
    }
    assert_eq!(*clipboard.writes.lock().unwrap(), vec!["https://a.b/c".to_string()]);

    viewer.receive_message(&json!({ "type": "fault", "error": { "message": "Boom" } }));
    assert_eq!(*faults.lock().unwrap(), vec![FaultReport::new("Boom")]);
    assert_eq!(viewer.status(), &LifecycleStatus::Ready);

    drop(viewer);
    assert_eq!(store.live_count(), 0);
}

#[tokio::test]
async fn viewers_do_not_share_resources() {
    let store = Arc::new(MemoryResourceStore::default());
    let faults = Arc::new(Mutex::new(Vec::new()));
    let mut a = viewer_with("<p>a</p>", store.clone(), Arc::default(), faults.clone());
    let b = viewer_with("<p>b</p>", store.clone(), Arc::default(), faults.clone());
    assert_eq!(store.live_count(), 2);

    a.reload();
    a.reload();
    assert_eq!(store.live_count(), 2);
    assert_ne!(a.frame_src(), b.frame_src());

    drop(a);
    assert_eq!(store.live_count(), 1);
    assert!(b.frame_src().is_some());
}
