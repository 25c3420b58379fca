//! Bootstrap: object manifest, object geometry and the robot
//!
//! Everything renderable is created here exactly once. The manifest is
//! fetched first, then every object's OBJ geometry; when all fetches have
//! settled the objects are spawned hidden, the robot is spawned at rest and
//! the [`LiveScene`] is inserted, which lets the network plugin open the
//! channels.

use bevy::prelude::*;
use eyedesk_core::{
    manifest::MANIFEST_PATH, ArticulatedModel, AssetManifest, CameraRig, EntityId, PoseRegistry,
    SceneState, SceneSynchronizer,
};
use std::collections::HashMap;
use std::f32::consts::FRAC_PI_2;
use std::sync::{Arc, Mutex};
use thiserror::Error;

use crate::app::{LiveScene, SurfaceViewport};
use crate::network::DaemonConfig;

pub struct ModelsPlugin;

impl Plugin for ModelsPlugin {
    fn build(&self, app: &mut App) {
        app.init_resource::<Bootstrap>()
            .add_systems(Startup, fetch_manifest)
            .add_systems(Update, advance_bootstrap.run_if(not(resource_exists::<LiveScene>)));
    }
}

/// Group holding every tracked object; converts Z-up poses to the Y-up world
#[derive(Component)]
pub struct ObjectsRoot;

/// A tracked object's renderable
#[derive(Component)]
pub struct TrackedObject {
    pub id: EntityId,
}

/// One revolute joint of the robot chain
#[derive(Component)]
pub struct RobotJoint {
    /// Position in the model's joint list
    pub index: usize,
    /// Offset from the parent joint frame
    pub origin: Vec3,
    /// Fixed roll from the parent joint frame, radians
    pub roll: f32,
}

impl RobotJoint {
    /// Local transform at the given joint angle (rotation about local Z)
    pub fn transform(&self, angle: f32) -> Transform {
        Transform::from_translation(self.origin)
            .with_rotation(Quat::from_rotation_x(self.roll) * Quat::from_rotation_z(angle))
    }
}

/// (origin, roll) of each Panda joint relative to its parent, Z-up
const PANDA_CHAIN: [([f32; 3], f32); 7] = [
    ([0.0, 0.0, 0.333], 0.0),
    ([0.0, 0.0, 0.0], -FRAC_PI_2),
    ([0.0, -0.316, 0.0], FRAC_PI_2),
    ([0.0825, 0.0, 0.0], FRAC_PI_2),
    ([-0.0825, 0.384, 0.0], -FRAC_PI_2),
    ([0.0, 0.0, 0.0], FRAC_PI_2),
    ([0.088, 0.0, 0.0], FRAC_PI_2),
];

/// Flange offset from the last joint
const PANDA_FLANGE: [f32; 3] = [0.0, 0.0, 0.107];

#[derive(Error, Debug)]
pub enum GeometryError {
    #[error("OBJ parse error: {0}")]
    Parse(#[from] tobj::LoadError),
    #[error("OBJ contains no geometry")]
    Empty,
}

type Fetched<T> = Arc<Mutex<Option<T>>>;

/// Where bootstrap currently is
#[derive(Default)]
enum Phase {
    #[default]
    FetchingManifest,
    FetchingGeometry {
        manifest: AssetManifest,
        loaded: HashMap<EntityId, Result<String, String>>,
    },
}

#[derive(Resource, Default)]
pub struct Bootstrap {
    phase: Phase,
    manifest: Fetched<Result<AssetManifest, String>>,
    geometry: Arc<Mutex<Vec<(EntityId, Result<String, String>)>>>,
}

fn fetch_manifest(bootstrap: Res<Bootstrap>, daemon_config: Res<DaemonConfig>) {
    let slot = bootstrap.manifest.clone();

    #[cfg(target_arch = "wasm32")]
    {
        use wasm_bindgen_futures::spawn_local;

        let url = daemon_config.asset_url(MANIFEST_PATH);
        spawn_local(async move {
            tracing::info!("Fetching object manifest from: {}", url);
            let result = match gloo_net::http::Request::get(&url).send().await {
                Ok(response) if response.ok() => match response.text().await {
                    Ok(text) => AssetManifest::from_json(&text).map_err(|e| e.to_string()),
                    Err(e) => Err(e.to_string()),
                },
                Ok(response) => Err(format!("HTTP {}", response.status())),
                Err(e) => Err(e.to_string()),
            };
            if let Ok(mut slot) = slot.lock() {
                *slot = Some(result);
            }
        });
    }

    #[cfg(not(target_arch = "wasm32"))]
    {
        tracing::info!(
            "Manifest fetch not available in native mode ({})",
            daemon_config.asset_url(MANIFEST_PATH)
        );
        if let Ok(mut slot) = slot.lock() {
            *slot = Some(Ok(AssetManifest::default()));
        };
    }
}

#[cfg(target_arch = "wasm32")]
fn fetch_geometry(
    daemon_config: &DaemonConfig,
    manifest: &AssetManifest,
    sink: Arc<Mutex<Vec<(EntityId, Result<String, String>)>>>,
) {
    use wasm_bindgen_futures::spawn_local;

    for (id, name) in manifest.entries() {
        let url = daemon_config.asset_url(&AssetManifest::geometry_path(name));
        let sink = sink.clone();
        spawn_local(async move {
            let result = match gloo_net::http::Request::get(&url).send().await {
                Ok(response) if response.ok() => response.text().await.map_err(|e| e.to_string()),
                Ok(response) => Err(format!("HTTP {}", response.status())),
                Err(e) => Err(e.to_string()),
            };
            if let Ok(mut queue) = sink.lock() {
                queue.push((id, result));
            }
        });
    }
}

#[cfg(not(target_arch = "wasm32"))]
fn fetch_geometry(
    _daemon_config: &DaemonConfig,
    manifest: &AssetManifest,
    sink: Arc<Mutex<Vec<(EntityId, Result<String, String>)>>>,
) {
    if let Ok(mut queue) = sink.lock() {
        for (id, _) in manifest.entries() {
            queue.push((id, Err("not available in native mode".to_string())));
        }
    }
}

fn advance_bootstrap(
    mut commands: Commands,
    mut bootstrap: ResMut<Bootstrap>,
    daemon_config: Res<DaemonConfig>,
    viewport: Res<SurfaceViewport>,
    asset_server: Res<AssetServer>,
    mut meshes: ResMut<Assets<Mesh>>,
    mut materials: ResMut<Assets<StandardMaterial>>,
) {
    let bootstrap = &mut *bootstrap;
    match &mut bootstrap.phase {
        Phase::FetchingManifest => {
            let fetched = match bootstrap.manifest.lock() {
                Ok(mut slot) => slot.take(),
                Err(_) => None,
            };
            let Some(result) = fetched else { return };

            let manifest = result.unwrap_or_else(|e| {
                tracing::error!("Failed to load object manifest: {}", e);
                AssetManifest::default()
            });
            tracing::info!("Object manifest lists {} objects", manifest.len());
            fetch_geometry(&daemon_config, &manifest, bootstrap.geometry.clone());
            bootstrap.phase = Phase::FetchingGeometry {
                manifest,
                loaded: HashMap::new(),
            };
        }
        Phase::FetchingGeometry { manifest, loaded } => {
            if let Ok(mut queue) = bootstrap.geometry.lock() {
                loaded.extend(queue.drain(..));
            }
            if loaded.len() < manifest.len() {
                return;
            }

            let root = commands
                .spawn((
                    Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
                    Visibility::default(),
                    ObjectsRoot,
                ))
                .id();

            let registry = PoseRegistry::from_manifest(manifest, |id, name| {
                let text = match loaded.remove(&id) {
                    Some(Ok(text)) => text,
                    Some(Err(e)) => {
                        tracing::warn!("Object {} ({}) unavailable: {}", id, name, e);
                        return None;
                    }
                    None => return None,
                };
                let mesh = match obj_to_mesh(&text) {
                    Ok(mesh) => mesh,
                    Err(e) => {
                        tracing::warn!("Object {} ({}) unusable: {}", id, name, e);
                        return None;
                    }
                };
                let material = StandardMaterial {
                    base_color_texture: Some(
                        asset_server.load(AssetManifest::texture_path(name)),
                    ),
                    perceptual_roughness: 0.8,
                    ..default()
                };
                let entity = commands
                    .spawn((
                        Mesh3d(meshes.add(mesh)),
                        MeshMaterial3d(materials.add(material)),
                        Transform::default(),
                        Visibility::Hidden,
                        TrackedObject { id },
                    ))
                    .id();
                commands.entity(root).add_child(entity);
                Some(entity)
            });
            tracing::info!(
                "Registered {} of {} objects",
                registry.len(),
                manifest.len()
            );

            spawn_robot(&mut commands, &mut meshes, &mut materials);

            let mut state = SceneState::new(registry, ArticulatedModel::panda(), CameraRig::default());
            state.resize(&viewport.0);
            commands.insert_resource(LiveScene::new(SceneSynchronizer::new(state)));
        }
    }
}

/// Spawn the Panda as a chain of joint frames with simple link geometry
fn spawn_robot(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    materials: &mut Assets<StandardMaterial>,
) {
    let link_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.92, 0.92, 0.92),
        metallic: 0.1,
        perceptual_roughness: 0.6,
        ..default()
    });
    let joint_material = materials.add(StandardMaterial {
        base_color: Color::srgb(0.25, 0.25, 0.28),
        ..default()
    });
    let joint_mesh = meshes.add(Sphere::new(0.045));

    // URDF is Z-up
    let mut parent = commands
        .spawn((
            Transform::from_rotation(Quat::from_rotation_x(-FRAC_PI_2)),
            Visibility::default(),
            Name::new("panda_link0"),
        ))
        .id();

    let offsets: Vec<Vec3> = PANDA_CHAIN
        .iter()
        .map(|(origin, _)| Vec3::from_array(*origin))
        .chain(std::iter::once(Vec3::from_array(PANDA_FLANGE)))
        .collect();

    // Base link runs from the root to the first joint
    if let Some(link) = spawn_link(commands, meshes, &link_material, offsets[0]) {
        commands.entity(parent).add_child(link);
    }

    for (index, (origin, roll)) in PANDA_CHAIN.iter().enumerate() {
        let joint = RobotJoint {
            index,
            origin: Vec3::from_array(*origin),
            roll: *roll,
        };
        let entity = commands
            .spawn((
                joint.transform(0.0),
                Visibility::default(),
                joint,
                Name::new(format!("panda_joint{}", index + 1)),
            ))
            .id();
        commands.entity(parent).add_child(entity);

        let hub = commands
            .spawn((Mesh3d(joint_mesh.clone()), MeshMaterial3d(joint_material.clone())))
            .id();
        commands.entity(entity).add_child(hub);
        if let Some(link) = spawn_link(commands, meshes, &link_material, offsets[index + 1]) {
            commands.entity(entity).add_child(link);
        }

        parent = entity;
    }
}

/// Cylinder from the local origin to `to`; `None` for coincident frames
fn spawn_link(
    commands: &mut Commands,
    meshes: &mut Assets<Mesh>,
    material: &Handle<StandardMaterial>,
    to: Vec3,
) -> Option<Entity> {
    let length = to.length();
    if length < 1e-4 {
        return None;
    }
    let transform = Transform::from_translation(to * 0.5)
        .with_rotation(Quat::from_rotation_arc(Vec3::Y, to / length));
    Some(
        commands
            .spawn((
                Mesh3d(meshes.add(Cylinder::new(0.04, length))),
                MeshMaterial3d(material.clone()),
                transform,
            ))
            .id(),
    )
}

/// Build a triangle mesh from OBJ text; all groups are merged
pub fn obj_to_mesh(text: &str) -> Result<Mesh, GeometryError> {
    use bevy::asset::RenderAssetUsages;
    use bevy::mesh::Indices;
    use bevy::render::render_resource::PrimitiveTopology;

    let (models, _materials) = tobj::load_obj_buf(
        &mut std::io::Cursor::new(text),
        &tobj::LoadOptions {
            triangulate: true,
            single_index: true,
            ..Default::default()
        },
        // Texture maps are loaded by name, not through the .mtl file
        |_| Err(tobj::LoadError::OpenFileFailed),
    )?;

    let mut positions: Vec<[f32; 3]> = Vec::new();
    let mut normals: Vec<[f32; 3]> = Vec::new();
    let mut uvs: Vec<[f32; 2]> = Vec::new();
    let mut indices: Vec<u32> = Vec::new();

    for model in &models {
        let mesh = &model.mesh;
        let base = positions.len() as u32;
        let count = mesh.positions.len() / 3;

        positions.extend(mesh.positions.chunks_exact(3).map(|p| [p[0], p[1], p[2]]));
        if mesh.normals.len() == mesh.positions.len() {
            normals.extend(mesh.normals.chunks_exact(3).map(|n| [n[0], n[1], n[2]]));
        } else {
            normals.extend(std::iter::repeat([0.0, 0.0, 0.0]).take(count));
        }
        if mesh.texcoords.len() / 2 == count {
            // OBJ texture space is bottom-up
            uvs.extend(mesh.texcoords.chunks_exact(2).map(|t| [t[0], 1.0 - t[1]]));
        } else {
            uvs.extend(std::iter::repeat([0.0, 0.0]).take(count));
        }
        indices.extend(mesh.indices.iter().map(|i| i + base));
    }

    if positions.is_empty() || indices.is_empty() {
        return Err(GeometryError::Empty);
    }

    let missing_normals = normals.iter().all(|n| *n == [0.0, 0.0, 0.0]);
    let mut mesh = Mesh::new(PrimitiveTopology::TriangleList, RenderAssetUsages::default())
        .with_inserted_attribute(Mesh::ATTRIBUTE_POSITION, positions)
        .with_inserted_attribute(Mesh::ATTRIBUTE_NORMAL, normals)
        .with_inserted_attribute(Mesh::ATTRIBUTE_UV_0, uvs)
        .with_inserted_indices(Indices::U32(indices));
    if missing_normals {
        mesh.compute_smooth_normals();
    }
    Ok(mesh)
}
