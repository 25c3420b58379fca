//! Channel health panel using bevy_egui

use bevy::prelude::*;
use bevy_egui::{egui, EguiContexts, EguiPrimaryContextPass};
use chrono::Utc;
use eyedesk_core::{ChannelHealth, LinkState};

use crate::app::LiveScene;

pub struct UiPlugin;

impl Plugin for UiPlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(
            EguiPrimaryContextPass,
            health_panel.run_if(resource_exists::<LiveScene>),
        );
    }
}

fn state_color(state: LinkState) -> egui::Color32 {
    match state {
        LinkState::Connecting => egui::Color32::YELLOW,
        LinkState::Open => egui::Color32::GREEN,
        LinkState::Closed => egui::Color32::GRAY,
        LinkState::Errored => egui::Color32::RED,
    }
}

/// Human readable age of the last message
fn staleness_label(health: &ChannelHealth) -> String {
    match health.staleness(Utc::now()) {
        Some(age) if age.num_seconds() >= 1 => format!("{}s ago", age.num_seconds()),
        Some(age) => format!("{}ms ago", age.num_milliseconds()),
        None => "never".to_string(),
    }
}

fn health_panel(mut contexts: EguiContexts, scene: Res<LiveScene>) {
    let Ok(ctx) = contexts.ctx_mut() else { return };
    let state = scene.sync.state();

    egui::Window::new("Channels")
        .anchor(egui::Align2::RIGHT_TOP, egui::vec2(-8.0, 8.0))
        .resizable(false)
        .collapsible(true)
        .default_open(false)
        .show(ctx, |ui| {
            if !scene.sync.health().all_open() {
                ui.colored_label(egui::Color32::YELLOW, "Some channels are not live");
                ui.separator();
            }
            for health in scene.sync.health().iter() {
                ui.horizontal(|ui| {
                    ui.colored_label(state_color(health.state), "●");
                    ui.strong(health.kind.to_string());
                    if health.is_frozen() {
                        ui.label("(frozen)");
                    }
                });
                ui.label(format!(
                    "accepted {}  rejected {}  skipped {}  last {}",
                    health.accepted,
                    health.rejected,
                    health.skipped,
                    staleness_label(health)
                ));
                if let Some(error) = &health.last_error {
                    ui.colored_label(egui::Color32::LIGHT_RED, error);
                }
                ui.separator();
            }
            ui.label(format!(
                "Objects visible: {} / {}",
                state.registry().visible_count(),
                state.registry().len()
            ));
            ui.label(format!("Frames drawn: {}", scene.render.frames_drawn()));
        });
}
