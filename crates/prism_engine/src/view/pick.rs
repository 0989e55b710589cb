//! Pick view
//!
//! Colour-id picking: object ids are encoded into the low 24 bits of an
//! RGB target, world and terrain geometry render in a first pass, UI
//! geometry in a second pass over the same colour target, and a single
//! pixel under the cursor is read back and decoded. A change in the
//! decoded id fires `OBJECT_HOVER_ID_CHANGED`.
//!
//! Both attachments are view-owned; nothing this view draws reaches the
//! window.

use crate::event::{codes, EventContext};
use crate::foundation::frame::FrameData;
use crate::foundation::math::{Mat4, Mat4Ext, Vec3};
use crate::handle::INVALID_ID;
use crate::registry::Camera;
use crate::renderer::backend::{
    AttachmentHandle, BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle,
    UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{
    AttachmentConfig, AttachmentSource, AttachmentType, ClearFlags, GeometryRenderData, LoadOp,
    RenderPassConfig, StoreOp, Viewport,
};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, ViewPacket};

/// World/terrain pick shader name
pub const SHADER_PICK_WORLD: &str = "builtin.shader.pick3d";
/// UI pick shader name
pub const SHADER_PICK_UI: &str = "builtin.shader.pick2d";

/// Encode an object id into an RGB triplet (low 24 bits)
pub fn encode_id(id: u32) -> [u8; 3] {
    [
        (id & 0xFF) as u8,
        ((id >> 8) & 0xFF) as u8,
        ((id >> 16) & 0xFF) as u8,
    ]
}

/// Decode a read-back pixel into an object id. Pure white is the cleared
/// "no hit" value and decodes to `INVALID_ID`.
pub fn decode_pixel(pixel: [u8; 4]) -> u32 {
    let id = u32::from(pixel[0]) | (u32::from(pixel[1]) << 8) | (u32::from(pixel[2]) << 16);
    if id == 0x00FF_FFFF {
        INVALID_ID
    } else {
        id
    }
}

struct PickShader {
    handle: ShaderHandle,
    // instance index == object id; grows lazily
    instance_count: u32,
    uploaded: Vec<bool>,
}

impl PickShader {
    fn new() -> Self {
        Self {
            handle: ShaderHandle(0),
            instance_count: 0,
            uploaded: Vec::new(),
        }
    }

    /// Ensure instance resources exist for `id`, acquiring in order so the
    /// instance index equals the id.
    fn ensure_instance(&mut self, backend: &mut dyn RendererBackend, id: u32) -> BackendResult<()> {
        while self.instance_count <= id {
            backend.shader_instance_acquire(self.handle)?;
            self.instance_count += 1;
            self.uploaded.push(false);
        }
        Ok(())
    }
}

/// Off-screen object picking view
pub struct PickView {
    world_pass: PassHandle,
    ui_pass: PassHandle,
    world_shader: PickShader,
    ui_shader: PickShader,
    colour: AttachmentHandle,
    depth: AttachmentHandle,
    hovered_id: u32,
}

impl PickView {
    /// Create the pick view
    pub fn new() -> Self {
        Self {
            world_pass: PassHandle(0),
            ui_pass: PassHandle(0),
            world_shader: PickShader::new(),
            ui_shader: PickShader::new(),
            colour: AttachmentHandle(0),
            depth: AttachmentHandle(0),
            hovered_id: INVALID_ID,
        }
    }

    /// Id currently under the cursor
    pub fn hovered_id(&self) -> u32 {
        self.hovered_id
    }

    fn create_attachments(
        &mut self,
        backend: &mut dyn RendererBackend,
        width: u32,
        height: u32,
    ) -> BackendResult<()> {
        self.colour = backend.attachment_create(AttachmentType::Colour, width, height)?;
        self.depth = backend.attachment_create(AttachmentType::Depth, width, height)?;
        Ok(())
    }

    fn draw_ids(
        shader: &mut PickShader,
        geometries: &[GeometryRenderData],
        backend: &mut dyn RendererBackend,
    ) -> BackendResult<()> {
        for geometry in geometries {
            let id = geometry.unique_id;
            if id == INVALID_ID {
                continue;
            }
            shader.ensure_instance(backend, id)?;
            let needs_update = !shader.uploaded[id as usize];
            if needs_update {
                let [r, g, b] = encode_id(id);
                backend.uniform_set(
                    shader.handle,
                    "id_colour",
                    UniformValue::Vec3(Vec3::new(
                        f32::from(r) / 255.0,
                        f32::from(g) / 255.0,
                        f32::from(b) / 255.0,
                    )),
                )?;
                shader.uploaded[id as usize] = true;
            }
            backend.bind_instance(shader.handle, id, needs_update)?;
            backend.uniform_set(shader.handle, "model", UniformValue::Mat4(geometry.model))?;
            backend.draw_geometry(geometry);
        }
        Ok(())
    }

    fn view_owned_pass(name: &str, clear_flags: ClearFlags, colour_load: LoadOp) -> RenderPassConfig {
        RenderPassConfig {
            name: name.into(),
            clear_flags,
            // White clear so empty pixels decode to no-hit
            clear_colour: crate::foundation::math::Vec4::new(1.0, 1.0, 1.0, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
            attachments: vec![
                AttachmentConfig {
                    attachment_type: AttachmentType::Colour,
                    source: AttachmentSource::ViewOwned,
                    load_op: colour_load,
                    store_op: StoreOp::Store,
                    present_after: false,
                },
                AttachmentConfig {
                    attachment_type: AttachmentType::Depth,
                    source: AttachmentSource::ViewOwned,
                    load_op: LoadOp::DontCare,
                    store_op: StoreOp::DontCare,
                    present_after: false,
                },
            ],
            render_target_count: 1,
        }
    }
}

impl Default for PickView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for PickView {
    fn name(&self) -> &'static str {
        "pick"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        vec![
            Self::view_owned_pass(
                "pick_world",
                ClearFlags::COLOUR | ClearFlags::DEPTH,
                LoadOp::DontCare,
            ),
            Self::view_owned_pass("pick_ui", ClearFlags::DEPTH, LoadOp::Load),
        ]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.world_pass = passes[0];
        self.ui_pass = passes[1];
        self.world_shader.handle = backend.shader_create(SHADER_PICK_WORLD)?;
        self.ui_shader.handle = backend.shader_create(SHADER_PICK_UI)?;
        let (width, height) = backend.window_extent();
        self.create_attachments(backend, width, height)
    }

    fn on_destroy(&mut self, backend: &mut dyn RendererBackend) {
        backend.attachment_destroy(self.colour);
        backend.attachment_destroy(self.depth);
    }

    fn on_resize(&mut self, backend: &mut dyn RendererBackend, width: u32, height: u32) {
        backend.attachment_destroy(self.colour);
        backend.attachment_destroy(self.depth);
        if let Err(err) = self.create_attachments(backend, width, height) {
            log::error!("failed to recreate pick attachments after resize: {err}");
        }
    }

    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        camera: Option<&mut Camera>,
        _materials: &MaterialStore,
        payload: &FramePayload,
    ) -> BackendResult<ViewPacket> {
        let camera = camera
            .ok_or_else(|| RenderError::PacketBuildFailed("pick view requires a camera".into()))?;
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
        let debug_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;

        // Unsorted: only the id under the cursor matters.
        for geometry in &payload.world_geometries {
            geometries.push(*geometry);
        }
        for geometry in &payload.terrain_geometries {
            terrain_geometries.push(*geometry);
        }

        let mut ui_geometries: Vec<GeometryRenderData> = payload.ui_geometries.clone();
        ui_geometries.extend(payload.ui_texts.iter().map(crate::view::ui::text_geometry));

        let rect = viewport.rect;
        let ui_projection = Mat4::orthographic(
            rect.x,
            rect.x + rect.z,
            rect.y + rect.w,
            rect.y,
            -100.0,
            100.0,
        );

        Ok(ViewPacket {
            view_name: self.name(),
            viewport: *viewport,
            view_matrix,
            view_position,
            ambient_colour: payload.ambient_colour,
            geometries,
            terrain_geometries,
            debug_geometries,
            extended: PacketExtended::Pick {
                mouse_x: payload.mouse_x,
                mouse_y: payload.mouse_y,
                ui_projection,
                ui_view: Mat4::identity(),
                ui_geometries,
            },
        })
    }

    fn render(&mut self, packet: &ViewPacket, ctx: &mut RenderContext<'_>) -> BackendResult<()> {
        let PacketExtended::Pick {
            mouse_x,
            mouse_y,
            ui_projection,
            ui_view,
            ui_geometries,
        } = &packet.extended
        else {
            return Err(RenderError::InvalidConfiguration(
                "pick view rendered without pick packet data".into(),
            ));
        };

        // Pass 1: world and terrain ids.
        ctx.backend.begin_pass(self.world_pass, 0)?;
        ctx.backend.viewport_set(packet.viewport.rect);
        ctx.backend.shader_use(self.world_shader.handle)?;
        ctx.backend.uniform_set(
            self.world_shader.handle,
            "projection",
            UniformValue::Mat4(packet.viewport.projection),
        )?;
        ctx.backend.uniform_set(
            self.world_shader.handle,
            "view",
            UniformValue::Mat4(packet.view_matrix),
        )?;
        ctx.backend.apply_globals(self.world_shader.handle)?;
        Self::draw_ids(
            &mut self.world_shader,
            packet.geometries.as_slice(),
            ctx.backend,
        )?;
        Self::draw_ids(
            &mut self.world_shader,
            packet.terrain_geometries.as_slice(),
            ctx.backend,
        )?;
        ctx.backend.end_pass(self.world_pass)?;

        // Pass 2: UI ids over the same colour target.
        ctx.backend.begin_pass(self.ui_pass, 0)?;
        ctx.backend.shader_use(self.ui_shader.handle)?;
        ctx.backend.uniform_set(
            self.ui_shader.handle,
            "projection",
            UniformValue::Mat4(*ui_projection),
        )?;
        ctx.backend
            .uniform_set(self.ui_shader.handle, "view", UniformValue::Mat4(*ui_view))?;
        ctx.backend.apply_globals(self.ui_shader.handle)?;
        Self::draw_ids(&mut self.ui_shader, ui_geometries, ctx.backend)?;
        ctx.backend.end_pass(self.ui_pass)?;

        // Cursor readback, clamped into the attachment.
        let (width, height) = ctx.backend.attachment_extent(self.colour)?;
        let x = (*mouse_x).clamp(0, width.saturating_sub(1) as i32) as u32;
        let y = (*mouse_y).clamp(0, height.saturating_sub(1) as i32) as u32;
        let pixel = ctx.backend.attachment_read_pixel(self.colour, x, y)?;
        let id = decode_pixel(pixel);

        if id != self.hovered_id {
            self.hovered_id = id;
            ctx.events.fire(
                codes::OBJECT_HOVER_ID_CHANGED,
                &EventContext::U32x4([id, 0, 0, 0]),
            );
        }
        Ok(())
    }
}
