//! Editor-world view
//!
//! Draws editor overlay geometry, currently the transform gizmo, on top of
//! the scene. The pass loads the colour attachment and clears depth and
//! stencil so the gizmo always renders over world geometry.

use crate::foundation::frame::FrameData;
use crate::registry::Camera;
use crate::renderer::backend::{
    BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle, UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{ClearFlags, RenderPassConfig, Viewport};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, ViewPacket};

/// Editor overlay view
pub struct EditorWorldView {
    pass: PassHandle,
    shader: ShaderHandle,
}

impl EditorWorldView {
    /// Create the editor-world view
    pub fn new() -> Self {
        Self {
            pass: PassHandle(0),
            shader: ShaderHandle(0),
        }
    }
}

impl Default for EditorWorldView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for EditorWorldView {
    fn name(&self) -> &'static str {
        "editor_world"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        vec![RenderPassConfig::window_pass(
            "editor_world",
            ClearFlags::DEPTH | ClearFlags::STENCIL,
        )]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.pass = passes[0];
        self.shader = backend.shader_create(crate::view::world::SHADER_COLOUR_3D)?;
        Ok(())
    }

    fn on_destroy(&mut self, _backend: &mut dyn RendererBackend) {}

    fn on_resize(&mut self, _backend: &mut dyn RendererBackend, _width: u32, _height: u32) {}

    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        camera: Option<&mut Camera>,
        _materials: &MaterialStore,
        payload: &FramePayload,
    ) -> BackendResult<ViewPacket> {
        let camera = camera.ok_or_else(|| {
            RenderError::PacketBuildFailed("editor-world view requires a camera".into())
        })?;
        let view_matrix = camera.view_get();
        let view_position = camera.position();

        let exhausted = || RenderError::PacketBuildFailed("frame arena exhausted".into());
        let mut geometries = frame.arena.alloc_list(2).ok_or_else(exhausted)?;
        let terrain_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;
        let debug_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;

        if let Some(gizmo) = &payload.gizmo {
            geometries.push(gizmo.geometry);
            if let Some(plane_normal) = gizmo.plane_normal {
                geometries.push(plane_normal);
            }
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

        if !packet.geometries.is_empty() {
            ctx.backend.shader_use(self.shader)?;
            ctx.backend.uniform_set(
                self.shader,
                "projection",
                UniformValue::Mat4(packet.viewport.projection),
            )?;
            ctx.backend
                .uniform_set(self.shader, "view", UniformValue::Mat4(packet.view_matrix))?;
            ctx.backend.apply_globals(self.shader)?;
            for geometry in &packet.geometries {
                ctx.backend
                    .uniform_set(self.shader, "model", UniformValue::Mat4(geometry.model))?;
                ctx.backend.draw_geometry(geometry);
            }
        }

        ctx.backend.end_pass(self.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::math::Vec4;
    use crate::renderer::types::{GeometryRenderData, ProjectionKind};
    use crate::view::GizmoPacket;

    fn viewport() -> Viewport {
        Viewport::new(
            Vec4::new(0.0, 0.0, 1280.0, 720.0),
            ProjectionKind::Perspective {
                fov_y: std::f32::consts::FRAC_PI_4,
                near: 0.1,
                far: 1000.0,
            },
        )
    }

    #[test]
    fn test_packet_empty_without_gizmo() {
        let mut view = EditorWorldView::new();
        let frame = FrameData::default();
        let mut camera = Camera::new();
        let materials = MaterialStore::with_capacity(1);
        let payload = FramePayload::default();

        let packet = view
            .build_packet(&frame, &viewport(), Some(&mut camera), &materials, &payload)
            .expect("packet");
        assert!(packet.geometries.is_empty());
    }

    #[test]
    fn test_packet_carries_gizmo_geometry() {
        let mut view = EditorWorldView::new();
        let frame = FrameData::default();
        let mut camera = Camera::new();
        let materials = MaterialStore::with_capacity(1);
        let mut payload = FramePayload::default();
        payload.gizmo = Some(GizmoPacket {
            geometry: GeometryRenderData {
                unique_id: 42,
                ..GeometryRenderData::default()
            },
            plane_normal: None,
        });

        let packet = view
            .build_packet(&frame, &viewport(), Some(&mut camera), &materials, &payload)
            .expect("packet");
        assert_eq!(packet.geometries.len(), 1);
        assert_eq!(packet.geometries.as_slice()[0].unique_id, 42);
    }
}
