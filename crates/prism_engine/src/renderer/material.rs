//! Material bookkeeping
//!
//! The engine core tracks only what the view pipeline needs from a
//! material: its shader instance, the transparency flag that routes world
//! geometry into the sorted transparent list, and the frame stamp used to
//! upload instance uniforms at most once per frame.

use crate::handle::{Handle, HandleStore};

/// Material state tracked by the core
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Material {
    /// Material name (diagnostics and scene descriptor references)
    pub name: String,
    /// True when the diffuse map carries transparency; routes the geometry
    /// through back-to-front sorting in the world view
    pub diffuse_has_transparency: bool,
    /// Shader instance id acquired for this material, when bound
    pub shader_instance: Option<u32>,
    /// Frame number of the last instance-uniform upload (0 = never)
    pub render_frame_number: u64,
    /// Draw index of the last instance-uniform upload
    pub render_draw_index: u32,
}

impl Material {
    /// Create a named opaque material
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    /// Create a named material whose diffuse map has transparency
    pub fn transparent(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            diffuse_has_transparency: true,
            ..Self::default()
        }
    }

    /// Whether instance uniforms must be uploaded for this draw, stamping
    /// the material if so.
    ///
    /// Uniforms are uploaded at most once per (frame, draw pass) by
    /// recording the frame number and draw index of the last upload.
    pub fn take_instance_update(&mut self, frame_number: u64, draw_index: u32) -> bool {
        if self.render_frame_number == frame_number && self.render_draw_index == draw_index {
            return false;
        }
        self.render_frame_number = frame_number;
        self.render_draw_index = draw_index;
        true
    }
}

/// Handle-indexed material storage
pub type MaterialStore = HandleStore<Material>;

/// Acquire a material by name, reusing an existing entry when present
pub fn acquire_named(store: &mut MaterialStore, name: &str, transparent: bool) -> Handle {
    if let Some((handle, _)) = store.iter().find(|(_, material)| material.name == name) {
        return handle;
    }
    let material = if transparent {
        Material::transparent(name)
    } else {
        Material::new(name)
    };
    store.acquire(material)
}
