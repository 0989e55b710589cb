//! World view
//!
//! Renders scene geometry with the material shader, terrain with the
//! terrain shader and debug geometry with the flat colour shader. Opaque
//! geometry draws in submission order; geometry whose material carries
//! transparency is buffered, sorted back to front on distance from the
//! camera, and appended after the opaque set.

use std::cmp::Ordering;

use crate::foundation::frame::FrameData;
use crate::foundation::math::Vec3;
use crate::registry::Camera;
use crate::renderer::backend::{
    BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle, UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{ClearFlags, GeometryRenderData, RenderPassConfig, Viewport};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, ViewPacket};

/// Material shader name
pub const SHADER_MATERIAL: &str = "builtin.shader.material";
/// Terrain shader name
pub const SHADER_TERRAIN: &str = "builtin.shader.terrain";
/// Flat colour shader name
pub const SHADER_COLOUR_3D: &str = "builtin.shader.colour3d";

/// The main scene view
pub struct WorldView {
    pass: PassHandle,
    material_shader: ShaderHandle,
    terrain_shader: ShaderHandle,
    colour_shader: ShaderHandle,
    /// Lighting debug mode forwarded to the shaders (0 = lit)
    pub render_mode: u32,
}

impl WorldView {
    /// Create the world view
    pub fn new() -> Self {
        Self {
            pass: PassHandle(0),
            material_shader: ShaderHandle(0),
            terrain_shader: ShaderHandle(0),
            colour_shader: ShaderHandle(0),
            render_mode: 0,
        }
    }

    fn apply_globals(
        &self,
        backend: &mut dyn RendererBackend,
        shader: ShaderHandle,
        packet: &ViewPacket,
    ) -> BackendResult<()> {
        backend.shader_use(shader)?;
        backend.uniform_set(
            shader,
            "projection",
            UniformValue::Mat4(packet.viewport.projection),
        )?;
        backend.uniform_set(shader, "view", UniformValue::Mat4(packet.view_matrix))?;
        backend.uniform_set(
            shader,
            "ambient_colour",
            UniformValue::Vec4(packet.ambient_colour),
        )?;
        backend.uniform_set(
            shader,
            "view_position",
            UniformValue::Vec3(packet.view_position),
        )?;
        backend.uniform_set(shader, "mode", UniformValue::UInt(self.render_mode))?;
        backend.apply_globals(shader)
    }

    fn draw_with_materials(
        shader: ShaderHandle,
        geometries: &[GeometryRenderData],
        ctx: &mut RenderContext<'_>,
        draw_index: u32,
    ) -> BackendResult<()> {
        for geometry in geometries {
            let (instance, needs_update) = match ctx.materials.get_mut(geometry.material) {
                Ok(material) => {
                    let instance = match material.shader_instance {
                        Some(instance) => instance,
                        None => {
                            let instance = ctx.backend.shader_instance_acquire(shader)?;
                            material.shader_instance = Some(instance);
                            instance
                        }
                    };
                    let needs_update =
                        material.take_instance_update(ctx.frame.frame_number, draw_index);
                    (instance, needs_update)
                }
                Err(err) => {
                    log::warn!("draw submitted with invalid material handle: {err}");
                    (0, false)
                }
            };
            ctx.backend.bind_instance(shader, instance, needs_update)?;
            ctx.backend
                .uniform_set(shader, "model", UniformValue::Mat4(geometry.model))?;
            ctx.backend.draw_geometry(geometry);
        }
        Ok(())
    }
}

impl Default for WorldView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for WorldView {
    fn name(&self) -> &'static str {
        "world"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        // Colour is loaded from the skybox pass; only depth/stencil clear.
        vec![RenderPassConfig::window_pass(
            "world",
            ClearFlags::DEPTH | ClearFlags::STENCIL,
        )]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.pass = passes[0];
        self.material_shader = backend.shader_create(SHADER_MATERIAL)?;
        self.terrain_shader = backend.shader_create(SHADER_TERRAIN)?;
        self.colour_shader = backend.shader_create(SHADER_COLOUR_3D)?;
        Ok(())
    }

    fn on_destroy(&mut self, _backend: &mut dyn RendererBackend) {}

    fn on_resize(&mut self, _backend: &mut dyn RendererBackend, _width: u32, _height: u32) {}

    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        camera: Option<&mut Camera>,
        materials: &MaterialStore,
        payload: &FramePayload,
    ) -> BackendResult<ViewPacket> {
        let camera = camera
            .ok_or_else(|| RenderError::PacketBuildFailed("world view requires a camera".into()))?;
        let view_matrix = camera.view_get();
        let view_position = camera.position();

        let exhausted = || RenderError::PacketBuildFailed("frame arena exhausted".into());
        let mut geometries = frame
            .arena
            .alloc_list(payload.world_geometries.len().max(1))
            .ok_or_else(exhausted)?;
        let mut terrain_geometries = frame
            .arena
            .alloc_list(payload.terrain_geometries.len().max(1))
            .ok_or_else(exhausted)?;
        let mut debug_geometries = frame
            .arena
            .alloc_list(payload.debug_geometries.len().max(1))
            .ok_or_else(exhausted)?;

        // Opaque geometry keeps submission order; transparent geometry is
        // buffered with its distance from the camera.
        let mut transparent: Vec<(f32, GeometryRenderData)> =
            Vec::with_capacity(payload.world_geometries.len());
        for geometry in &payload.world_geometries {
            let is_transparent = materials
                .get(geometry.material)
                .map(|material| material.diffuse_has_transparency)
                .unwrap_or(false);
            if is_transparent {
                let centre = Vec3::new(
                    geometry.model[(0, 3)],
                    geometry.model[(1, 3)],
                    geometry.model[(2, 3)],
                );
                transparent.push(((centre - view_position).norm(), *geometry));
            } else {
                geometries.push(*geometry);
            }
        }
        // Back to front: farthest first.
        transparent.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(Ordering::Equal));
        for (_, geometry) in transparent {
            geometries.push(geometry);
        }

        for geometry in &payload.terrain_geometries {
            terrain_geometries.push(*geometry);
        }
        for geometry in &payload.debug_geometries {
            debug_geometries.push(*geometry);
        }

        Ok(ViewPacket {
            view_name: self.name(),
            viewport: *viewport,
            view_matrix,
            view_position,
            ambient_colour: payload.ambient_colour,
            geometries,
            terrain_geometries,
            debug_geometries,
            extended: PacketExtended::None,
        })
    }

    fn render(&mut self, packet: &ViewPacket, ctx: &mut RenderContext<'_>) -> BackendResult<()> {
        let target = ctx.backend.window_attachment_index();
        ctx.backend.begin_pass(self.pass, target)?;
        ctx.backend.viewport_set(packet.viewport.rect);
        let draw_index = ctx.frame.next_draw_index();

        if !packet.terrain_geometries.is_empty() {
            self.apply_globals(ctx.backend, self.terrain_shader, packet)?;
            Self::draw_with_materials(
                self.terrain_shader,
                packet.terrain_geometries.as_slice(),
                ctx,
                draw_index,
            )?;
        }

        if !packet.geometries.is_empty() {
            self.apply_globals(ctx.backend, self.material_shader, packet)?;
            Self::draw_with_materials(
                self.material_shader,
                packet.geometries.as_slice(),
                ctx,
                draw_index,
            )?;
        }

        if !packet.debug_geometries.is_empty() {
            ctx.backend.shader_use(self.colour_shader)?;
            ctx.backend.uniform_set(
                self.colour_shader,
                "projection",
                UniformValue::Mat4(packet.viewport.projection),
            )?;
            ctx.backend.uniform_set(
                self.colour_shader,
                "view",
                UniformValue::Mat4(packet.view_matrix),
            )?;
            ctx.backend.apply_globals(self.colour_shader)?;
            for geometry in &packet.debug_geometries {
                ctx.backend.uniform_set(
                    self.colour_shader,
                    "model",
                    UniformValue::Mat4(geometry.model),
                )?;
                ctx.backend.draw_geometry(geometry);
            }
        }

        ctx.backend.end_pass(self.pass)
    }
}
