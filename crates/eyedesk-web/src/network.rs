//! Channel sockets to the daemon
//!
//! Each scene channel gets its own WebSocket. Socket callbacks only queue
//! `(channel, event)` pairs; a Bevy system drains the queue once per frame
//! and hands each event to the synchronizer, so decoding and mutation
//! always run to completion on the main schedule.

use bevy::prelude::*;
use chrono::Utc;
use eyedesk_core::{ChannelKind, TransportEvent};
use std::sync::{Arc, Mutex};

use crate::app::{LiveScene, SceneSet};

pub struct NetworkPlugin;

/// Which page this instance renders
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewMode {
    /// Robot, tracked objects and camera
    #[default]
    Scene,
    /// Full-screen projector overlay
    Projector,
}

/// Resource storing the daemon connection configuration
#[derive(Resource, Clone, Debug, Default)]
pub struct DaemonConfig {
    /// HTTP(S) base URL for REST and assets (e.g., "http://192.168.1.100:8000")
    pub http_url: String,
    /// WebSocket base URL without a path (e.g., "ws://192.168.1.100:8000")
    pub ws_url: String,
    pub mode: ViewMode,
}

impl DaemonConfig {
    /// Create config from URL query parameters or same-origin fallback
    #[cfg(target_arch = "wasm32")]
    pub fn from_browser() -> Self {
        let Some(window) = web_sys::window() else {
            return Self::default();
        };
        let location = window.location();
        let search = location.search().unwrap_or_default();
        let mode = match Self::parse_query_param(&search, "view").as_deref() {
            Some("projector") => ViewMode::Projector,
            _ => ViewMode::Scene,
        };

        // Check for ?daemon= query parameter
        if let Some(daemon_param) = Self::parse_query_param(&search, "daemon") {
            tracing::info!("Using daemon from URL parameter: {}", daemon_param);
            return Self {
                mode,
                ..Self::from_daemon_address(&daemon_param)
            };
        }

        // Fall back to same-origin
        let host = location.host().unwrap_or_else(|_| "localhost:8000".to_string());
        let is_https = location.protocol().unwrap_or_default() == "https:";

        Self {
            http_url: format!("{}://{}", if is_https { "https" } else { "http" }, host),
            ws_url: format!("{}://{}", if is_https { "wss" } else { "ws" }, host),
            mode,
        }
    }

    #[cfg(not(target_arch = "wasm32"))]
    pub fn from_browser() -> Self {
        Self::default()
    }

    /// Create config from a daemon address (host:port or full URL)
    pub fn from_daemon_address(addr: &str) -> Self {
        let addr = addr.trim_end_matches('/');
        let (http_url, ws_url) = if addr.starts_with("https://") || addr.starts_with("http://") {
            let ws = addr.replace("https://", "wss://").replace("http://", "ws://");
            (addr.to_string(), ws)
        } else {
            (format!("http://{}", addr), format!("ws://{}", addr))
        };

        Self {
            http_url,
            ws_url,
            mode: ViewMode::Scene,
        }
    }

    /// Parse a query parameter from a search string
    fn parse_query_param(search: &str, param: &str) -> Option<String> {
        let search = search.trim_start_matches('?');
        for pair in search.split('&') {
            let mut parts = pair.splitn(2, '=');
            if let (Some(key), Some(value)) = (parts.next(), parts.next()) {
                if key == param {
                    return Some(value.replace("%3A", ":").replace("%2F", "/"));
                }
            }
        }
        None
    }

    pub fn channel_url(&self, kind: ChannelKind) -> String {
        format!("{}{}", self.ws_url, kind.endpoint())
    }

    pub fn asset_url(&self, path: &str) -> String {
        format!("{}/{}", self.http_url, path.trim_start_matches('/'))
    }
}

/// Transport events queued by socket callbacks, in arrival order.
///
/// Joint frames and object snapshots each replace the whole state, so only
/// the newest queued payload of those channels is kept. Link events and
/// control deltas are kept in full.
#[derive(Resource, Default, Clone)]
pub struct PendingEvents(pub Arc<Mutex<Vec<(ChannelKind, TransportEvent)>>>);

fn is_snapshot(kind: ChannelKind, event: &TransportEvent) -> bool {
    kind != ChannelKind::Control
        && matches!(event, TransportEvent::Binary(_) | TransportEvent::Text(_))
}

impl PendingEvents {
    pub fn push(&self, kind: ChannelKind, event: TransportEvent) {
        if let Ok(mut queue) = self.0.lock() {
            if is_snapshot(kind, &event) {
                queue.retain(|(k, e)| *k != kind || !is_snapshot(*k, e));
            }
            queue.push((kind, event));
        }
    }

    fn take(&self) -> Vec<(ChannelKind, TransportEvent)> {
        match self.0.lock() {
            Ok(mut queue) => std::mem::take(&mut *queue),
            Err(_) => Vec::new(),
        }
    }
}

/// Whether the channel sockets have been opened
#[derive(Resource, Default)]
pub struct ChannelLinks {
    pub opened: bool,
}

impl Plugin for NetworkPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<PendingEvents>()
            .init_resource::<ChannelLinks>()
            .add_systems(
                Update,
                (open_channels, drain_channel_events)
                    .chain()
                    .in_set(SceneSet::Ingest)
                    .run_if(resource_exists::<LiveScene>),
            );
    }
}

/// Open the three channels once the scene is attached
fn open_channels(
    mut links: ResMut<ChannelLinks>,
    pending: Res<PendingEvents>,
    daemon_config: Res<DaemonConfig>,
) {
    if links.opened {
        return;
    }
    links.opened = true;

    for kind in ChannelKind::ALL {
        connect_channel(&daemon_config.channel_url(kind), kind, &pending);
    }
}

#[cfg(target_arch = "wasm32")]
fn connect_channel(url: &str, kind: ChannelKind, pending: &PendingEvents) {
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, Event, MessageEvent, WebSocket};

    tracing::info!("Connecting {} channel to: {}", kind, url);

    let ws = match WebSocket::new(url) {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("Failed to create {} WebSocket: {:?}", kind, e);
            pending.push(kind, TransportEvent::Error(format!("{:?}", e)));
            return;
        }
    };
    ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

    let queue = pending.clone();
    let onopen = Closure::wrap(Box::new(move |_| {
        queue.push(kind, TransportEvent::Open);
    }) as Box<dyn FnMut(JsValue)>);
    ws.set_onopen(Some(onopen.as_ref().unchecked_ref()));
    onopen.forget();

    let queue = pending.clone();
    let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
        let data = e.data();
        if let Ok(buffer) = data.clone().dyn_into::<js_sys::ArrayBuffer>() {
            let bytes = js_sys::Uint8Array::new(&buffer).to_vec();
            queue.push(kind, TransportEvent::Binary(bytes));
        } else if let Ok(text) = data.dyn_into::<js_sys::JsString>() {
            queue.push(kind, TransportEvent::Text(text.into()));
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    let queue = pending.clone();
    let onclose = Closure::wrap(Box::new(move |_: CloseEvent| {
        queue.push(kind, TransportEvent::Closed);
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();

    let queue = pending.clone();
    // Browsers deliver a bare Event here with no detail
    let onerror = Closure::wrap(Box::new(move |e: Event| {
        queue.push(kind, TransportEvent::Error(format!("socket {}", e.type_())));
    }) as Box<dyn FnMut(Event)>);
    ws.set_onerror(Some(onerror.as_ref().unchecked_ref()));
    onerror.forget();
}

#[cfg(not(target_arch = "wasm32"))]
fn connect_channel(url: &str, kind: ChannelKind, _pending: &PendingEvents) {
    tracing::info!("WebSocket not available in native mode ({} at {})", kind, url);
}

/// Feed queued transport events to the synchronizer
fn drain_channel_events(pending: Res<PendingEvents>, mut scene: ResMut<LiveScene>) {
    for (kind, event) in pending.take() {
        if let Err(e) = scene.sync.ingest(kind, event, Utc::now()) {
            tracing::warn!("Rejected {} message: {}", kind, e);
        }
    }
}
