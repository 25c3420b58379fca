//! 3D scene: camera, lights, ground grid and the per-frame draw

use bevy::input::mouse::MouseWheel;
use bevy::prelude::*;
use bevy::render::alpha::AlphaMode;
use bevy::window::PrimaryWindow;
use eyedesk_core::{FrameSink, PointerEvent, SceneView, Viewport};

use crate::app::{LiveScene, SceneSet, SurfaceViewport};
use crate::models::{RobotJoint, TrackedObject};

pub struct ScenePlugin;

impl Plugin for ScenePlugin {
    fn build(&self, app: &mut App) {
        app.add_systems(Startup, setup_scene)
            .add_systems(Update, resize_viewport.before(SceneSet::Ingest))
            .add_systems(
                Update,
                camera_input
                    .in_set(SceneSet::Input)
                    .run_if(resource_exists::<LiveScene>),
            )
            .add_systems(
                Update,
                render_frame
                    .in_set(SceneSet::Draw)
                    .run_if(resource_exists::<LiveScene>),
            );
    }
}

/// Marker component for the main camera
#[derive(Component)]
pub struct MainCamera;

/// Marker for grid lines
#[derive(Component)]
pub struct GridLine;

/// Pointer id for the local mouse; remote drags use a different one
const LOCAL_POINTER: u32 = 0;

const GRID_EXTENT: f32 = 5.0;
const GRID_DIVISIONS: i32 = 100;

fn setup_scene(
    mut commands: Commands,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    // Y is up; the camera transform is rewritten every frame from the rig
    commands.spawn((
        Camera3d::default(),
        Projection::Perspective(PerspectiveProjection {
            fov: 50f32.to_radians(),
            near: 0.001,
            far: 100.0,
            ..default()
        }),
        Transform::from_xyz(0.5, 1.5, 1.5).looking_at(Vec3::new(0.5, 0.0, 0.0), Vec3::Y),
        MainCamera,
    ));

    commands.insert_resource(AmbientLight {
        color: Color::WHITE,
        brightness: 400.0,
        ..default()
    });

    commands.spawn((
        DirectionalLight {
            illuminance: 3000.0,
            shadows_enabled: false,
            ..default()
        },
        Transform::from_xyz(0.0, 1.5, 1.0).looking_at(Vec3::ZERO, Vec3::Y),
    ));

    // 10 m square on the ground plane, 0.1 m spacing
    let spacing = GRID_EXTENT * 2.0 / GRID_DIVISIONS as f32;
    let thickness = 0.002;
    let line_material = materials.add(StandardMaterial {
        base_color: Color::srgba(0.55, 0.55, 0.55, 0.6),
        unlit: true,
        alpha_mode: AlphaMode::Blend,
        ..default()
    });
    let line_x = meshes.add(Cuboid::new(GRID_EXTENT * 2.0, thickness, thickness));
    let line_z = meshes.add(Cuboid::new(thickness, thickness, GRID_EXTENT * 2.0));

    for i in -(GRID_DIVISIONS / 2)..=(GRID_DIVISIONS / 2) {
        let offset = i as f32 * spacing;
        commands.spawn((
            Mesh3d(line_x.clone()),
            MeshMaterial3d(line_material.clone()),
            Transform::from_xyz(0.0, 0.0, offset),
            GridLine,
        ));
        commands.spawn((
            Mesh3d(line_z.clone()),
            MeshMaterial3d(line_material.clone()),
            Transform::from_xyz(offset, 0.0, 0.0),
            GridLine,
        ));
    }
}

/// Keep the surface viewport and the camera aspect in step with the window
fn resize_viewport(
    windows: Query<&Window, With<PrimaryWindow>>,
    mut viewport: ResMut<SurfaceViewport>,
    scene: Option<ResMut<LiveScene>>,
) {
    let Ok(window) = windows.single() else { return };
    let current = Viewport::new(window.width(), window.height(), window.scale_factor());
    if current == viewport.0 {
        return;
    }
    viewport.0 = current;
    let (width, height) = current.backing_size();
    tracing::debug!("Surface resized to {}x{} physical pixels", width, height);
    if let Some(mut scene) = scene {
        scene.sync.state_mut().resize(&current);
    }
}

/// Local mouse orbit and zoom, fed through the same path as remote drags
fn camera_input(
    mut scene: ResMut<LiveScene>,
    windows: Query<&Window, With<PrimaryWindow>>,
    mouse_button: Res<ButtonInput<MouseButton>>,
    mut mouse_wheel: MessageReader<MouseWheel>,
    time: Res<Time>,
    mut contexts: bevy_egui::EguiContexts,
) {
    // Don't steal gestures that start on a panel
    let egui_wants_pointer = contexts
        .ctx_mut()
        .map(|ctx| ctx.wants_pointer_input())
        .unwrap_or(false);

    let cursor = windows.single().ok().and_then(|w| w.cursor_position());
    let mut control = scene.sync.state_mut().split_mut().control;

    if mouse_button.just_pressed(MouseButton::Left) && !egui_wants_pointer {
        if let Some(pos) = cursor {
            control.pointer(PointerEvent::Down {
                pointer: LOCAL_POINTER,
                x: pos.x,
                y: pos.y,
            });
        }
    } else if mouse_button.pressed(MouseButton::Left) {
        if let Some(pos) = cursor {
            control.pointer(PointerEvent::Move {
                pointer: LOCAL_POINTER,
                x: pos.x,
                y: pos.y,
            });
        }
    }
    if mouse_button.just_released(MouseButton::Left) {
        control.pointer(PointerEvent::Up {
            pointer: LOCAL_POINTER,
        });
    }

    if !egui_wants_pointer {
        for scroll in mouse_wheel.read() {
            control.zoom(scroll.y);
        }
    } else {
        // Drain the scroll events even if we're not using them
        for _ in mouse_wheel.read() {}
    }

    control.update(time.delta_secs());
}

/// Writes one scene view into the Bevy world
struct BevySink<'w, 's> {
    objects: Query<
        'w,
        's,
        (&'static mut Transform, &'static mut Visibility),
        (With<TrackedObject>, Without<RobotJoint>, Without<MainCamera>),
    >,
    joints: Query<
        'w,
        's,
        (&'static RobotJoint, &'static mut Transform),
        (Without<TrackedObject>, Without<MainCamera>),
    >,
    camera: Query<
        'w,
        's,
        (&'static mut Transform, &'static mut Projection),
        (With<MainCamera>, Without<TrackedObject>, Without<RobotJoint>),
    >,
    sync_objects: bool,
}

impl FrameSink<Entity> for BevySink<'_, '_> {
    fn draw(&mut self, view: &SceneView<'_, Entity>) {
        if self.sync_objects {
            for tracked in view.registry.iter() {
                let Ok((mut transform, mut visibility)) = self.objects.get_mut(*tracked.handle())
                else {
                    continue;
                };
                let pose = tracked.pose();
                // Poses are Z-up; the parent group converts to Y-up
                transform.translation = Vec3::new(
                    pose.position[0] as f32,
                    pose.position[1] as f32,
                    pose.position[2] as f32,
                );
                transform.rotation = Quat::from_rotation_z(pose.rot as f32);
                *visibility = if tracked.is_visible() {
                    Visibility::Inherited
                } else {
                    Visibility::Hidden
                };
            }
        }

        let joints = view.model.joints();
        for (joint, mut transform) in self.joints.iter_mut() {
            if let Some(state) = joints.get(joint.index) {
                *transform = joint.transform(state.angle as f32);
            }
        }

        if let Ok((mut transform, mut projection)) = self.camera.single_mut() {
            let (eye, target) = (view.camera.eye(), view.camera.target());
            *transform = Transform::from_xyz(eye.x, eye.y, eye.z)
                .looking_at(Vec3::new(target.x, target.y, target.z), Vec3::Y);
            if let Projection::Perspective(perspective) = &mut *projection {
                perspective.fov = view.camera.projection.fov_y_degrees.to_radians();
                perspective.near = view.camera.projection.near;
                perspective.far = view.camera.projection.far;
            }
        }
    }
}

/// Draw the current scene once per display frame, updated or not
fn render_frame(
    mut scene: ResMut<LiveScene>,
    objects: Query<
        (&'static mut Transform, &'static mut Visibility),
        (With<TrackedObject>, Without<RobotJoint>, Without<MainCamera>),
    >,
    joints: Query<
        (&'static RobotJoint, &'static mut Transform),
        (Without<TrackedObject>, Without<MainCamera>),
    >,
    camera: Query<
        (&'static mut Transform, &'static mut Projection),
        (With<MainCamera>, Without<TrackedObject>, Without<RobotJoint>),
    >,
) {
    let scene = &mut *scene;
    let sync_objects = scene.render.last_slot() != Some(scene.sync.state().slot());
    let mut sink = BevySink {
        objects,
        joints,
        camera,
        sync_objects,
    };
    scene.render.frame(scene.sync.state(), &mut sink);
}
