//! Skybox view
//!
//! First pass of the frame: clears the colour attachment and draws the sky
//! cube with the camera's view matrix stripped of translation, so the box
//! stays centered on the viewer at any position.

use crate::foundation::frame::FrameData;
use crate::foundation::math::Mat4Ext;
use crate::registry::Camera;
use crate::renderer::backend::{
    BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle, UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{ClearFlags, GeometryRenderData, RenderPassConfig, Viewport};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, ViewPacket};

/// Skybox shader name
pub const SHADER_SKYBOX: &str = "builtin.shader.skybox";

/// Sky cube view
pub struct SkyboxView {
    pass: PassHandle,
    shader: ShaderHandle,
    instance: u32,
    // Frame of the last cubemap upload
    uploaded_frame: u64,
}

impl SkyboxView {
    /// Create the skybox view
    pub fn new() -> Self {
        Self {
            pass: PassHandle(0),
            shader: ShaderHandle(0),
            instance: 0,
            uploaded_frame: 0,
        }
    }

    fn cube_geometry() -> GeometryRenderData {
        GeometryRenderData {
            vertex_count: 36,
            unique_id: crate::handle::INVALID_ID,
            ..GeometryRenderData::default()
        }
    }
}

impl Default for SkyboxView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for SkyboxView {
    fn name(&self) -> &'static str {
        "skybox"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        vec![RenderPassConfig::window_pass("skybox", ClearFlags::COLOUR)]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.pass = passes[0];
        self.shader = backend.shader_create(SHADER_SKYBOX)?;
        self.instance = backend.shader_instance_acquire(self.shader)?;
        Ok(())
    }

    fn on_destroy(&mut self, backend: &mut dyn RendererBackend) {
        backend.shader_instance_release(self.shader, self.instance);
    }

    fn on_resize(&mut self, _backend: &mut dyn RendererBackend, _width: u32, _height: u32) {}

    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        camera: Option<&mut Camera>,
        _materials: &MaterialStore,
        _payload: &FramePayload,
    ) -> BackendResult<ViewPacket> {
        let camera = camera.ok_or_else(|| {
            RenderError::PacketBuildFailed("skybox view requires a camera".into())
        })?;
        // Zeroed translation keeps the cube centered on the camera.
        let view_matrix = camera.view_get().without_translation();
        let view_position = camera.position();

        let exhausted = || RenderError::PacketBuildFailed("frame arena exhausted".into());
        let mut geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;
        let terrain_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;
        let debug_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;
        geometries.push(Self::cube_geometry());

        Ok(ViewPacket {
            view_name: self.name(),
            viewport: *viewport,
            view_matrix,
            view_position,
            ambient_colour: crate::foundation::math::Vec4::zeros(),
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

        ctx.backend.shader_use(self.shader)?;
        ctx.backend.uniform_set(
            self.shader,
            "projection",
            UniformValue::Mat4(packet.viewport.projection),
        )?;
        ctx.backend
            .uniform_set(self.shader, "view", UniformValue::Mat4(packet.view_matrix))?;
        ctx.backend.apply_globals(self.shader)?;

        // The cubemap binding only changes when its texture does; upload at
        // most once per frame.
        let needs_update = self.uploaded_frame != ctx.frame.frame_number;
        self.uploaded_frame = ctx.frame.frame_number;
        ctx.backend
            .bind_instance(self.shader, self.instance, needs_update)?;

        for geometry in &packet.geometries {
            ctx.backend.draw_geometry(geometry);
        }
        ctx.backend.end_pass(self.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::{Vec3, Vec4};
    use crate::renderer::types::ProjectionKind;

    #[test]
    fn test_view_matrix_translation_zeroed() {
        let mut view = SkyboxView::new();
        let frame = FrameData::default();
        let mut camera = Camera::new();
        camera.position_set(Vec3::new(10.0, 5.0, -3.0));
        let materials = MaterialStore::with_capacity(1);
        let viewport = Viewport::new(
            Vec4::new(0.0, 0.0, 1280.0, 720.0),
            ProjectionKind::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                near: 0.1,
                far: 1000.0,
            },
        );

        let packet = view
            .build_packet(
                &frame,
                &viewport,
                Some(&mut camera),
                &materials,
                &FramePayload::default(),
            )
            .expect("packet");

        assert_eq!(packet.view_matrix[(0, 3)], 0.0);
        assert_eq!(packet.view_matrix[(1, 3)], 0.0);
        assert_eq!(packet.view_matrix[(2, 3)], 0.0);
        assert_eq!(packet.geometries.len(), 1);
    }

    #[test]
    fn test_pass_clears_colour_only() {
        let view = SkyboxView::new();
        let config = &view.pass_configs()[0];

        assert_eq!(config.clear_flags, ClearFlags::COLOUR);
    }
}
