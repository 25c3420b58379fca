//! Projector overlay page
//!
//! A full-screen black surface showing the last batch of 2D primitives the
//! daemon sent on the draw socket. Each batch replaces the previous one.
//! Size queries are answered straight from the socket callback.

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass, EguiTextureHandle};
use eyedesk_core::overlay::{CIRCLE_STROKE, DRAW_ENDPOINT};
use eyedesk_core::DrawObject;
use std::sync::{Arc, Mutex};

use crate::network::DaemonConfig;

pub struct OverlayPlugin;

impl Plugin for OverlayPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<OverlayInbox>()
            .init_resource::<OverlayState>()
            .add_systems(Startup, (load_marker_image, open_draw_socket))
            .add_systems(Update, apply_draw_batches)
            .add_systems(EguiPrimaryContextPass, draw_overlay);
    }
}

/// Fiducial marker image, relative to the page
const MARKER_IMAGE: &str = "aruco.png";

/// Draw batches received by the socket callback, oldest first
#[derive(Resource, Default, Clone)]
pub struct OverlayInbox(pub Arc<Mutex<Vec<Vec<DrawObject>>>>);

impl OverlayInbox {
    pub fn push(&self, batch: Vec<DrawObject>) {
        if let Ok(mut queue) = self.0.lock() {
            queue.push(batch);
        }
    }

    /// The newest batch, discarding any older ones
    fn latest(&self) -> Option<Vec<DrawObject>> {
        match self.0.lock() {
            Ok(mut queue) => queue.drain(..).last(),
            Err(_) => None,
        }
    }
}

/// What is currently on the projector surface
#[derive(Resource, Default)]
pub struct OverlayState {
    pub objects: Vec<DrawObject>,
    marker: Option<Handle<Image>>,
    marker_texture: Option<egui::TextureId>,
}

fn load_marker_image(asset_server: Res<AssetServer>, mut state: ResMut<OverlayState>) {
    state.marker = Some(asset_server.load(MARKER_IMAGE));
}

fn open_draw_socket(inbox: Res<OverlayInbox>, daemon_config: Res<DaemonConfig>) {
    let url = format!("{}{}", daemon_config.ws_url, DRAW_ENDPOINT);
    connect_draw_socket(&url, &inbox);
}

#[cfg(target_arch = "wasm32")]
fn connect_draw_socket(url: &str, inbox: &OverlayInbox) {
    use eyedesk_core::{encode_drawable_size, ProjectorCommand, ProjectorMessage};
    use wasm_bindgen::prelude::*;
    use web_sys::{CloseEvent, MessageEvent, WebSocket};

    tracing::info!("Connecting projector socket to: {}", url);

    let ws = match WebSocket::new(url) {
        Ok(ws) => ws,
        Err(e) => {
            tracing::error!("Failed to create projector WebSocket: {:?}", e);
            return;
        }
    };
    ws.set_binary_type(web_sys::BinaryType::Arraybuffer);

    let queue = inbox.clone();
    let reply = ws.clone();
    let onmessage = Closure::wrap(Box::new(move |e: MessageEvent| {
        let Some(text) = e.data().as_string() else {
            return;
        };
        match ProjectorMessage::decode(&text) {
            Ok(ProjectorMessage::Command(ProjectorCommand::GetDrawableSize)) => {
                let (width, height) = surface_size();
                let mut bytes = encode_drawable_size(width, height);
                if let Err(e) = reply.send_with_u8_array(&mut bytes) {
                    tracing::warn!("Failed to send drawable size: {:?}", e);
                }
            }
            Ok(ProjectorMessage::Draw(objects)) => queue.push(objects),
            Err(e) => tracing::warn!("Ignoring projector message: {}", e),
        }
    }) as Box<dyn FnMut(MessageEvent)>);
    ws.set_onmessage(Some(onmessage.as_ref().unchecked_ref()));
    onmessage.forget();

    let onclose = Closure::wrap(Box::new(move |_: CloseEvent| {
        tracing::warn!("Projector socket closed");
    }) as Box<dyn FnMut(CloseEvent)>);
    ws.set_onclose(Some(onclose.as_ref().unchecked_ref()));
    onclose.forget();
}

/// Logical size of the page, in CSS pixels
#[cfg(target_arch = "wasm32")]
fn surface_size() -> (f64, f64) {
    let Some(window) = web_sys::window() else {
        return (0.0, 0.0);
    };
    let width = window.inner_width().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    let height = window.inner_height().ok().and_then(|v| v.as_f64()).unwrap_or(0.0);
    (width, height)
}

#[cfg(not(target_arch = "wasm32"))]
fn connect_draw_socket(url: &str, _inbox: &OverlayInbox) {
    tracing::info!("WebSocket not available in native mode (projector at {})", url);
}

fn apply_draw_batches(inbox: Res<OverlayInbox>, mut state: ResMut<OverlayState>) {
    if let Some(objects) = inbox.latest() {
        tracing::debug!("Projector batch of {} objects", objects.len());
        state.objects = objects;
    }
}

fn draw_overlay(
    mut contexts: EguiContexts,
    mut state: ResMut<OverlayState>,
    images: Res<Assets<Image>>,
) {
    // Register the marker with egui once it has loaded
    if state.marker_texture.is_none() {
        if let Some(handle) = state.marker.clone() {
            if images.contains(&handle) {
                state.marker_texture = Some(contexts.add_image(EguiTextureHandle::Strong(handle)));
            }
        }
    }

    let Ok(ctx) = contexts.ctx_mut() else { return };
    let painter = ctx.layer_painter(egui::LayerId::background());
    for object in &state.objects {
        paint(&painter, object, state.marker_texture);
    }
}

fn paint(painter: &egui::Painter, object: &DrawObject, marker: Option<egui::TextureId>) {
    let white = egui::Color32::WHITE;
    match object {
        DrawObject::Aruco { x, y, size } => {
            let rect = egui::Rect::from_min_size(egui::pos2(*x, *y), egui::vec2(*size, *size));
            match marker {
                Some(texture) => {
                    painter.image(
                        texture,
                        rect,
                        egui::Rect::from_min_max(egui::pos2(0.0, 0.0), egui::pos2(1.0, 1.0)),
                        white,
                    );
                }
                None => {
                    painter.rect_filled(rect, 0.0, white);
                }
            }
        }
        DrawObject::Text { text, x, y, size } => {
            // Anchored at the baseline start
            painter.text(
                egui::pos2(*x, *y),
                egui::Align2::LEFT_BOTTOM,
                text,
                egui::FontId::proportional(DrawObject::font_px(*size)),
                white,
            );
        }
        DrawObject::Circle { x, y, radius, fill } => {
            let center = egui::pos2(*x, *y);
            if *fill {
                painter.circle_filled(center, *radius, white);
            }
            painter.circle_stroke(center, *radius, egui::Stroke::new(CIRCLE_STROKE, white));
        }
        DrawObject::Line {
            x1,
            y1,
            x2,
            y2,
            line_width,
        } => {
            painter.line_segment(
                [egui::pos2(*x1, *y1), egui::pos2(*x2, *y2)],
                egui::Stroke::new(*line_width, white),
            );
        }
        DrawObject::Rectangle {
            x,
            y,
            width,
            height,
            fill,
            line_width,
        } => {
            let rect = egui::Rect::from_min_size(egui::pos2(*x, *y), egui::vec2(*width, *height));
            if *fill {
                painter.rect_filled(rect, 0.0, white);
            }
            painter.rect_stroke(
                rect,
                0.0,
                egui::Stroke::new(*line_width, white),
                egui::StrokeKind::Middle,
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_inbox_keeps_newest_batch() {
        let inbox = OverlayInbox::default();
        inbox.push(vec![DrawObject::Aruco {
            x: 0.0,
            y: 0.0,
            size: 100.0,
        }]);
        inbox.push(Vec::new());
        assert_eq!(inbox.latest(), Some(Vec::new()));
        assert_eq!(inbox.latest(), None);
    }
}
