//! Bevy application setup

use bevy::prelude::*;
use bevy_egui::EguiPlugin;
use bevy_picking::DefaultPickingPlugins;
use eyedesk_core::{RenderLoop, SceneSynchronizer, Viewport};

use crate::models::ModelsPlugin;
use crate::network::{DaemonConfig, NetworkPlugin, ViewMode};
use crate::overlay::OverlayPlugin;
use crate::scene::ScenePlugin;
use crate::ui::UiPlugin;

/// The live scene: synchronizer plus the per-frame render loop.
///
/// Inserted once bootstrap has spawned every entity; channels open only
/// after it exists.
#[derive(Resource)]
pub struct LiveScene {
    pub sync: SceneSynchronizer<Entity>,
    pub render: RenderLoop,
}

impl LiveScene {
    pub fn new(sync: SceneSynchronizer<Entity>) -> Self {
        Self {
            sync,
            render: RenderLoop::new(),
        }
    }
}

/// Current surface size and pixel ratio
#[derive(Resource, Default, Debug, Clone, Copy)]
pub struct SurfaceViewport(pub Viewport);

/// Per-frame ordering: drain channels, then local input, then draw
#[derive(SystemSet, Debug, Clone, PartialEq, Eq, Hash)]
pub enum SceneSet {
    Ingest,
    Input,
    Draw,
}

/// Run the Bevy application
pub fn run() {
    let daemon_config = DaemonConfig::from_browser();
    let mode = daemon_config.mode;

    let clear = match mode {
        ViewMode::Scene => Color::srgb_u8(0x3C, 0x3C, 0x3C),
        ViewMode::Projector => Color::BLACK,
    };

    let mut app = App::new();
    app.insert_resource(ClearColor(clear))
        .insert_resource(daemon_config)
        .add_plugins(DefaultPlugins
            .set(WindowPlugin {
                primary_window: Some(Window {
                    title: "Eyedesk".to_string(),
                    canvas: Some("#eyedesk-canvas".to_string()),
                    fit_canvas_to_parent: true,
                    prevent_default_event_handling: false,
                    ..default()
                }),
                ..default()
            })
            .set(AssetPlugin {
                // Load assets from root (daemon serves ycb/ and the frontend together)
                file_path: "".to_string(),
                // Don't look for .meta files - server doesn't have them
                meta_check: bevy::asset::AssetMetaCheck::Never,
                ..default()
            })
        )
        // Must come before EguiPlugin so it can detect PickingPlugin
        .add_plugins(DefaultPickingPlugins)
        .add_plugins(EguiPlugin::default())
        .init_resource::<SurfaceViewport>()
        .configure_sets(Update, (SceneSet::Ingest, SceneSet::Input, SceneSet::Draw).chain());

    match mode {
        ViewMode::Scene => {
            app.add_plugins(NetworkPlugin)
                .add_plugins(ModelsPlugin)
                .add_plugins(ScenePlugin)
                .add_plugins(UiPlugin);
        }
        ViewMode::Projector => {
            // Needs a camera for egui to draw into
            app.add_systems(Startup, |mut commands: Commands| {
                commands.spawn(Camera2d);
            })
            .add_plugins(OverlayPlugin);
        }
    }

    app.run();
}
