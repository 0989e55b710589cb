//! Scene graph
//!
//! A scene is loaded from a RON descriptor: a node tree with transforms,
//! optional mesh/material references and pick extents. Nodes flatten into
//! a parent-before-child vector; world matrices compose parent world times
//! node local through the transform store each frame. Mesh payloads load
//! asynchronously; a node without a loaded mesh simply contributes no
//! geometry yet.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::foundation::math::{Aabb, Mat4, Quat, Ray, Vec3, Vec4};
use crate::handle::{Handle, INVALID_ID};
use crate::renderer::material::{acquire_named, MaterialStore};
use crate::renderer::types::GeometryRenderData;
use crate::resource::{ResourceData, ResourceKey, ResourceSystem, ResourceType};
use crate::transform::TransformStore;

/// Errors surfaced by scene loading
#[derive(Debug, Error)]
pub enum SceneError {
    /// The descriptor failed to parse
    #[error("scene descriptor parse error: {0}")]
    Parse(#[from] ron::error::SpannedError),

    /// The descriptor resource could not be read
    #[error("scene resource error: {0}")]
    Resource(#[from] crate::resource::ResourceError),

    /// The descriptor resource held a non-text payload
    #[error("scene resource '{0}' is not a text resource")]
    NotText(String),
}

/// One node in the scene descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NodeDescriptor {
    /// Node name
    pub name: String,
    /// Mesh resource name, when the node renders geometry
    #[serde(default)]
    pub mesh: Option<String>,
    /// Material name
    #[serde(default)]
    pub material: Option<String>,
    /// Whether the material's diffuse carries transparency
    #[serde(default)]
    pub transparent: bool,
    /// Local position
    #[serde(default)]
    pub position: [f32; 3],
    /// Local euler rotation in radians (pitch, yaw, roll)
    #[serde(default)]
    pub rotation: [f32; 3],
    /// Local scale
    #[serde(default = "unit_scale")]
    pub scale: [f32; 3],
    /// Half-extents of the pick bounds
    #[serde(default = "unit_scale")]
    pub extents: [f32; 3],
    /// Child nodes
    #[serde(default)]
    pub children: Vec<NodeDescriptor>,
}

fn unit_scale() -> [f32; 3] {
    [1.0, 1.0, 1.0]
}

/// Top-level scene descriptor
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SceneDescriptor {
    /// Scene name
    pub name: String,
    /// Ambient light colour
    #[serde(default = "default_ambient")]
    pub ambient_colour: [f32; 4],
    /// Root nodes
    #[serde(default)]
    pub nodes: Vec<NodeDescriptor>,
}

fn default_ambient() -> [f32; 4] {
    [0.25, 0.25, 0.25, 1.0]
}

impl SceneDescriptor {
    /// Parse a descriptor from RON text
    pub fn from_ron(text: &str) -> Result<Self, SceneError> {
        Ok(ron::from_str(text)?)
    }
}

/// A hit produced by [`Scene::raycast`]
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RaycastHit {
    /// Object id of the hit node
    pub unique_id: u32,
    /// Distance along the ray
    pub distance: f32,
}

struct MeshState {
    key: ResourceKey,
    // Filled in once the resource completes
    vertex_count: u32,
    index_count: u32,
    loaded: bool,
}

struct SceneNode {
    name: String,
    transform: Handle,
    parent: Option<usize>,
    material: Handle,
    mesh: Option<MeshState>,
    extents: Vec3,
    unique_id: u32,
}

/// A loaded scene
pub struct Scene {
    name: String,
    ambient_colour: Vec4,
    nodes: Vec<SceneNode>,
    next_unique_id: u32,
    /// Package mesh resources load from
    package: String,
}

impl Scene {
    /// Build a scene from a parsed descriptor, acquiring transforms and
    /// materials and requesting mesh resources.
    pub fn from_descriptor(
        descriptor: &SceneDescriptor,
        package: &str,
        transforms: &mut TransformStore,
        materials: &mut MaterialStore,
        resources: &mut ResourceSystem,
    ) -> Self {
        let mut scene = Self {
            name: descriptor.name.clone(),
            ambient_colour: Vec4::from(descriptor.ambient_colour),
            nodes: Vec::new(),
            next_unique_id: 1,
            package: package.to_string(),
        };
        for node in &descriptor.nodes {
            scene.add_node(node, None, transforms, materials, resources);
        }
        log::info!("scene '{}' loaded with {} nodes", scene.name, scene.nodes.len());
        scene
    }

    /// Parse a scene resource already loaded as text and build the scene
    pub fn from_resource(
        key: &ResourceKey,
        transforms: &mut TransformStore,
        materials: &mut MaterialStore,
        resources: &mut ResourceSystem,
    ) -> Result<Self, SceneError> {
        let data = resources.load_sync(key.clone(), ResourceType::Text)?;
        let ResourceData::Text(text) = data.as_ref() else {
            return Err(SceneError::NotText(key.name.clone()));
        };
        let descriptor = SceneDescriptor::from_ron(text)?;
        Ok(Self::from_descriptor(
            &descriptor,
            &key.package,
            transforms,
            materials,
            resources,
        ))
    }

    fn add_node(
        &mut self,
        descriptor: &NodeDescriptor,
        parent: Option<usize>,
        transforms: &mut TransformStore,
        materials: &mut MaterialStore,
        resources: &mut ResourceSystem,
    ) {
        let rotation = Quat::from_euler_angles(
            descriptor.rotation[0],
            descriptor.rotation[1],
            descriptor.rotation[2],
        );
        let transform = transforms.acquire_from(
            Vec3::from(descriptor.position),
            rotation,
            Vec3::from(descriptor.scale),
        );

        let material = descriptor
            .material
            .as_deref()
            .map(|name| acquire_named(materials, name, descriptor.transparent))
            .unwrap_or_else(Handle::invalid);

        let mesh = descriptor.mesh.as_deref().map(|name| {
            let key = ResourceKey::new(name, self.package.clone());
            // Completion is observed by polling in `update`; the listener
            // only logs failures.
            let request_key = key.clone();
            if let Err(err) = resources.request(
                key.clone(),
                ResourceType::StaticMesh,
                Box::new(move |_, result| {
                    if let Err(err) = result {
                        log::error!("mesh '{}' failed to load: {err}", request_key.name);
                    }
                }),
            ) {
                log::error!("mesh request '{}' rejected: {err}", key.name);
            }
            MeshState {
                key,
                vertex_count: 0,
                index_count: 0,
                loaded: false,
            }
        });

        let unique_id = self.next_unique_id;
        self.next_unique_id += 1;

        let index = self.nodes.len();
        self.nodes.push(SceneNode {
            name: descriptor.name.clone(),
            transform,
            parent,
            material,
            mesh,
            extents: Vec3::from(descriptor.extents),
            unique_id,
        });

        for child in &descriptor.children {
            self.add_node(child, Some(index), transforms, materials, resources);
        }
    }

    /// Scene name
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Ambient light colour
    pub fn ambient_colour(&self) -> Vec4 {
        self.ambient_colour
    }

    /// Number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Object id of a node by name
    pub fn find_id(&self, name: &str) -> Option<u32> {
        self.nodes
            .iter()
            .find(|node| node.name == name)
            .map(|node| node.unique_id)
    }

    /// Transform handle of the node with the given object id
    pub fn transform_of(&self, unique_id: u32) -> Option<Handle> {
        self.nodes
            .iter()
            .find(|node| node.unique_id == unique_id)
            .map(|node| node.transform)
    }

    /// Poll pending mesh resources and adopt completed payloads
    pub fn update(&mut self, resources: &ResourceSystem) {
        for node in &mut self.nodes {
            let Some(mesh) = &mut node.mesh else { continue };
            if mesh.loaded {
                continue;
            }
            if let Some(data) = resources.get(&mesh.key) {
                if let ResourceData::StaticMesh(vertices, indices) = data.as_ref() {
                    mesh.vertex_count = (vertices.len() / VERTEX_STRIDE) as u32;
                    mesh.index_count = indices.len() as u32;
                    mesh.loaded = true;
                }
            }
        }
    }

    /// Compose world matrices (parent world times node local) and append a
    /// draw submission for every node with a loaded mesh, in node order.
    pub fn frame_enumerate(
        &self,
        transforms: &mut TransformStore,
        out: &mut Vec<GeometryRenderData>,
    ) {
        for node in &self.nodes {
            let local = match transforms.local_get(node.transform) {
                Ok(local) => local,
                Err(err) => {
                    log::warn!("scene node '{}' has a stale transform: {err}", node.name);
                    continue;
                }
            };
            // Parents precede children, so the parent world is current.
            let world = match node.parent {
                Some(parent_index) => {
                    let parent = &self.nodes[parent_index];
                    transforms
                        .world_get(parent.transform)
                        .map(|parent_world| parent_world * local)
                        .unwrap_or(local)
                }
                None => local,
            };
            if let Err(err) = transforms.world_set(node.transform, world) {
                log::warn!("scene node '{}' world update failed: {err}", node.name);
                continue;
            }

            if let Some(mesh) = &node.mesh {
                if mesh.loaded {
                    let winding_inverted = world.determinant() < 0.0;
                    out.push(GeometryRenderData {
                        model: world,
                        material: node.material,
                        vertex_count: mesh.vertex_count,
                        index_count: mesh.index_count,
                        unique_id: node.unique_id,
                        winding_inverted,
                        ..GeometryRenderData::default()
                    });
                }
            }
        }
    }

    /// Intersect a ray with every node's world-space pick bounds.
    ///
    /// Hits come back sorted nearest first.
    pub fn raycast(&self, transforms: &TransformStore, ray: &Ray) -> Vec<RaycastHit> {
        let mut hits = Vec::new();
        for node in &self.nodes {
            if node.unique_id == INVALID_ID {
                continue;
            }
            let Ok(world) = transforms.world_get(node.transform) else {
                continue;
            };
            let aabb = world_bounds(&world, node.extents);
            if let Some(distance) = aabb.intersect_ray(ray) {
                hits.push(RaycastHit {
                    unique_id: node.unique_id,
                    distance,
                });
            }
        }
        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(std::cmp::Ordering::Equal)
        });
        hits
    }

    /// Release every node's transform and mesh resource
    pub fn unload(&mut self, transforms: &mut TransformStore, resources: &mut ResourceSystem) {
        for node in self.nodes.drain(..) {
            if let Err(err) = transforms.release(node.transform) {
                log::warn!("scene node '{}' transform release failed: {err}", node.name);
            }
            if let Some(mesh) = node.mesh {
                if let Err(err) = resources.release(&mesh.key) {
                    log::warn!("scene node '{}' mesh release failed: {err}", node.name);
                }
            }
        }
        log::info!("scene '{}' unloaded", self.name);
    }
}

// Vertex layout of static mesh payloads: position + normal + uv, f32
const VERTEX_STRIDE: usize = 8 * std::mem::size_of::<f32>();

/// Axis-aligned world bounds of a local box with the given half-extents:
/// the eight transformed corners, min/maxed.
fn world_bounds(world: &Mat4, extents: Vec3) -> Aabb {
    let mut min = Vec3::new(f32::INFINITY, f32::INFINITY, f32::INFINITY);
    let mut max = -min;
    for i in 0..8 {
        let corner = Vec3::new(
            if i & 1 == 0 { -extents.x } else { extents.x },
            if i & 2 == 0 { -extents.y } else { extents.y },
            if i & 4 == 0 { -extents.z } else { extents.z },
        );
        let transformed =
            world.transform_point(&crate::foundation::math::Point3::from(corner)).coords;
        min = min.inf(&transformed);
        max = max.sup(&transformed);
    }
    Aabb::new(min, max)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{ResourceError, ResourceLoader};
    use approx::assert_relative_eq;
    use std::sync::Arc;

    struct MeshLoader;

    impl ResourceLoader for MeshLoader {
        fn load(
            &self,
            key: &ResourceKey,
            resource_type: ResourceType,
        ) -> Result<ResourceData, ResourceError> {
            match resource_type {
                ResourceType::StaticMesh => Ok(ResourceData::StaticMesh(
                    vec![0u8; VERTEX_STRIDE * 3],
                    vec![0, 1, 2],
                )),
                _ => Err(ResourceError::LoadFailed {
                    name: key.name.clone(),
                    package: key.package.clone(),
                    reason: "unexpected type".into(),
                }),
            }
        }
    }

    fn pump_until_loaded(scene: &mut Scene, resources: &mut ResourceSystem) {
        for _ in 0..100 {
            resources.pump_completions();
            scene.update(resources);
            std::thread::sleep(std::time::Duration::from_millis(1));
        }
    }

    const SCENE_RON: &str = r#"(
        name: "test",
        ambient_colour: (0.1, 0.1, 0.1, 1.0),
        nodes: [
            (
                name: "parent",
                mesh: Some("cube"),
                material: Some("metal"),
                position: (1.0, 0.0, 0.0),
                children: [
                    (
                        name: "child",
                        mesh: Some("cube"),
                        position: (0.0, 2.0, 0.0),
                    ),
                ],
            ),
        ],
    )"#;

    #[test]
    fn test_descriptor_parses() {
        let descriptor = SceneDescriptor::from_ron(SCENE_RON).expect("parse");
        assert_eq!(descriptor.name, "test");
        assert_eq!(descriptor.nodes.len(), 1);
        assert_eq!(descriptor.nodes[0].children.len(), 1);
        // Defaults fill in what the descriptor omits
        assert_eq!(descriptor.nodes[0].scale, [1.0, 1.0, 1.0]);
    }

    #[test]
    fn test_unloaded_meshes_contribute_no_geometry() {
        let descriptor = SceneDescriptor::from_ron(SCENE_RON).expect("parse");
        let mut transforms = TransformStore::with_capacity(8);
        let mut materials = MaterialStore::with_capacity(8);
        let mut resources = ResourceSystem::new(Arc::new(MeshLoader));

        let scene = Scene::from_descriptor(
            &descriptor,
            "testbed",
            &mut transforms,
            &mut materials,
            &mut resources,
        );

        // No pump yet: nothing is loaded.
        let mut out = Vec::new();
        scene.frame_enumerate(&mut transforms, &mut out);
        assert!(out.is_empty());
    }

    #[test]
    fn test_world_composition_parent_times_local() {
        let descriptor = SceneDescriptor::from_ron(SCENE_RON).expect("parse");
        let mut transforms = TransformStore::with_capacity(8);
        let mut materials = MaterialStore::with_capacity(8);
        let mut resources = ResourceSystem::new(Arc::new(MeshLoader));

        let mut scene = Scene::from_descriptor(
            &descriptor,
            "testbed",
            &mut transforms,
            &mut materials,
            &mut resources,
        );
        pump_until_loaded(&mut scene, &mut resources);

        let mut out = Vec::new();
        scene.frame_enumerate(&mut transforms, &mut out);
        assert_eq!(out.len(), 2);

        // Child world translation is parent (1,0,0) plus local (0,2,0).
        let child = out
            .iter()
            .find(|g| g.unique_id == scene.find_id("child").unwrap())
            .unwrap();
        let translation = Vec3::new(
            child.model[(0, 3)],
            child.model[(1, 3)],
            child.model[(2, 3)],
        );
        assert_relative_eq!(translation, Vec3::new(1.0, 2.0, 0.0), epsilon = 1e-5);
    }

    #[test]
    fn test_raycast_sorted_nearest_first() {
        let descriptor = SceneDescriptor::from_ron(
            r#"(
                name: "ray",
                nodes: [
                    (name: "far", position: (0.0, 0.0, -10.0)),
                    (name: "near", position: (0.0, 0.0, -3.0)),
                ],
            )"#,
        )
        .expect("parse");
        let mut transforms = TransformStore::with_capacity(8);
        let mut materials = MaterialStore::with_capacity(8);
        let mut resources = ResourceSystem::new(Arc::new(MeshLoader));

        let scene = Scene::from_descriptor(
            &descriptor,
            "testbed",
            &mut transforms,
            &mut materials,
            &mut resources,
        );
        let mut out = Vec::new();
        scene.frame_enumerate(&mut transforms, &mut out);

        let ray = Ray::new(Vec3::zeros(), Vec3::new(0.0, 0.0, -1.0));
        let hits = scene.raycast(&transforms, &ray);

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].unique_id, scene.find_id("near").unwrap());
        assert_eq!(hits[1].unique_id, scene.find_id("far").unwrap());
        assert!(hits[0].distance < hits[1].distance);
    }

    #[test]
    fn test_unload_releases_transforms_and_resources() {
        let descriptor = SceneDescriptor::from_ron(SCENE_RON).expect("parse");
        let mut transforms = TransformStore::with_capacity(8);
        let mut materials = MaterialStore::with_capacity(8);
        let mut resources = ResourceSystem::new(Arc::new(MeshLoader));

        let mut scene = Scene::from_descriptor(
            &descriptor,
            "testbed",
            &mut transforms,
            &mut materials,
            &mut resources,
        );
        pump_until_loaded(&mut scene, &mut resources);

        let key = ResourceKey::new("cube", "testbed");
        assert_eq!(resources.refcount(&key), 2);

        scene.unload(&mut transforms, &mut resources);
        assert_eq!(resources.refcount(&key), 0);
        assert_eq!(scene.node_count(), 0);
    }
}
