//! UI view
//!
//! Orthographic overlay drawn last: UI meshes then text lists, both in
//! submission order with no depth testing. Its colour attachment is the
//! frame's presentation target, so this view must stay last in render
//! order.

use crate::foundation::frame::FrameData;
use crate::foundation::math::{Mat4, Vec3};
use crate::registry::Camera;
use crate::renderer::backend::{
    BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle, UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{
    AttachmentConfig, AttachmentSource, AttachmentType, ClearFlags, GeometryRenderData, LoadOp,
    RenderPassConfig, StoreOp, Viewport,
};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, UiText, ViewPacket};

/// UI shader name
pub const SHADER_UI: &str = "builtin.shader.ui";

/// Synthesize the draw submission for one text: a quad per glyph
pub fn text_geometry(text: &UiText) -> GeometryRenderData {
    GeometryRenderData {
        model: Mat4::new_translation(&Vec3::new(text.position[0], text.position[1], 0.0)),
        vertex_count: 6 * text.content.chars().count() as u32,
        unique_id: text.unique_id,
        ..GeometryRenderData::default()
    }
}

/// Screen-space overlay view
pub struct UiView {
    pass: PassHandle,
    shader: ShaderHandle,
}

impl UiView {
    /// Create the UI view
    pub fn new() -> Self {
        Self {
            pass: PassHandle(0),
            shader: ShaderHandle(0),
        }
    }
}

impl Default for UiView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for UiView {
    fn name(&self) -> &'static str {
        "ui"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        // Single colour attachment, loaded and presented. No depth: the UI
        // draws strictly in submission order.
        vec![RenderPassConfig {
            name: "ui".into(),
            clear_flags: ClearFlags::empty(),
            clear_colour: crate::foundation::math::Vec4::zeros(),
            clear_depth: 1.0,
            clear_stencil: 0,
            attachments: vec![AttachmentConfig {
                attachment_type: AttachmentType::Colour,
                source: AttachmentSource::Default,
                load_op: LoadOp::Load,
                store_op: StoreOp::Store,
                present_after: true,
            }],
            render_target_count: 0,
        }]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.pass = passes[0];
        self.shader = backend.shader_create(SHADER_UI)?;
        Ok(())
    }

    fn on_destroy(&mut self, _backend: &mut dyn RendererBackend) {}

    fn on_resize(&mut self, _backend: &mut dyn RendererBackend, _width: u32, _height: u32) {}

    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        _camera: Option<&mut Camera>,
        _materials: &MaterialStore,
        payload: &FramePayload,
    ) -> BackendResult<ViewPacket> {
        let exhausted = || RenderError::PacketBuildFailed("frame arena exhausted".into());
        let mut geometries = frame
            .arena
            .alloc_list(payload.ui_geometries.len().max(1))
            .ok_or_else(exhausted)?;
        let terrain_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;
        let debug_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;

        for geometry in &payload.ui_geometries {
            geometries.push(*geometry);
        }

        Ok(ViewPacket {
            view_name: self.name(),
            viewport: *viewport,
            view_matrix: Mat4::identity(),
            view_position: Vec3::zeros(),
            ambient_colour: payload.ambient_colour,
            geometries,
            terrain_geometries,
            debug_geometries,
            extended: PacketExtended::UiTexts(payload.ui_texts.clone()),
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

        for geometry in &packet.geometries {
            ctx.backend
                .uniform_set(self.shader, "model", UniformValue::Mat4(geometry.model))?;
            ctx.backend.draw_geometry(geometry);
        }

        if let PacketExtended::UiTexts(texts) = &packet.extended {
            for text in texts {
                let geometry = text_geometry(text);
                ctx.backend
                    .uniform_set(self.shader, "model", UniformValue::Mat4(geometry.model))?;
                ctx.backend.draw_geometry(&geometry);
            }
        }

        ctx.backend.end_pass(self.pass)
    }
}
