//! Wireframe view
//!
//! Redraws world and terrain geometry as wireframe on top of the scene
//! with dedicated mesh and terrain wireframe shaders. Each shader carries
//! two colour instances: a normal tint for everything, and a green
//! selected instance for the geometry whose id matches the current
//! selection. Instance uniforms re-apply only when the recorded
//! (frame, draw pass) stamp differs from the current one.

use crate::foundation::frame::FrameData;
use crate::foundation::math::Vec4;
use crate::registry::Camera;
use crate::renderer::backend::{
    BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle, UniformValue,
};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{ClearFlags, GeometryRenderData, RenderPassConfig, Viewport};
use crate::view::{FramePayload, PacketExtended, RenderContext, RenderView, ViewPacket};

/// Mesh wireframe shader name
pub const SHADER_WIREFRAME_MESH: &str = "builtin.shader.wireframe";
/// Terrain wireframe shader name
pub const SHADER_WIREFRAME_TERRAIN: &str = "builtin.shader.wireframe_terrain";

const SELECTED_COLOUR: Vec4 = Vec4::new(0.0, 1.0, 0.0, 1.0);

struct ColourInstance {
    instance: u32,
    colour: Vec4,
    // Stamp of the last uniform upload
    frame_number: u64,
    draw_index: u32,
}

impl ColourInstance {
    fn new(colour: Vec4) -> Self {
        Self {
            instance: 0,
            colour,
            frame_number: 0,
            draw_index: 0,
        }
    }

    fn take_update(&mut self, frame_number: u64, draw_index: u32) -> bool {
        if self.frame_number == frame_number && self.draw_index == draw_index {
            return false;
        }
        self.frame_number = frame_number;
        self.draw_index = draw_index;
        true
    }
}

struct WireShader {
    handle: ShaderHandle,
    normal: ColourInstance,
    selected: ColourInstance,
}

impl WireShader {
    fn new(normal_colour: Vec4) -> Self {
        Self {
            handle: ShaderHandle(0),
            normal: ColourInstance::new(normal_colour),
            selected: ColourInstance::new(SELECTED_COLOUR),
        }
    }

    fn register(&mut self, backend: &mut dyn RendererBackend, name: &str) -> BackendResult<()> {
        self.handle = backend.shader_create(name)?;
        self.normal.instance = backend.shader_instance_acquire(self.handle)?;
        self.selected.instance = backend.shader_instance_acquire(self.handle)?;
        Ok(())
    }

    fn release(&mut self, backend: &mut dyn RendererBackend) {
        backend.shader_instance_release(self.handle, self.normal.instance);
        backend.shader_instance_release(self.handle, self.selected.instance);
    }

    fn draw_set(
        &mut self,
        geometries: &[GeometryRenderData],
        selected_id: u32,
        packet: &ViewPacket,
        backend: &mut dyn RendererBackend,
        frame_number: u64,
        draw_index: u32,
    ) -> BackendResult<()> {
        backend.shader_use(self.handle)?;
        backend.uniform_set(
            self.handle,
            "projection",
            UniformValue::Mat4(packet.viewport.projection),
        )?;
        backend.uniform_set(self.handle, "view", UniformValue::Mat4(packet.view_matrix))?;
        backend.apply_globals(self.handle)?;

        for geometry in geometries {
            let instance = if geometry.unique_id == selected_id
                && selected_id != crate::handle::INVALID_ID
            {
                &mut self.selected
            } else {
                &mut self.normal
            };
            let needs_update = instance.take_update(frame_number, draw_index);
            if needs_update {
                backend.uniform_set(
                    self.handle,
                    "colour",
                    UniformValue::Vec4(instance.colour),
                )?;
            }
            backend.bind_instance(self.handle, instance.instance, needs_update)?;
            backend.uniform_set(self.handle, "model", UniformValue::Mat4(geometry.model))?;
            backend.draw_geometry(geometry);
        }
        Ok(())
    }
}

/// Wireframe overlay view
pub struct WireframeView {
    pass: PassHandle,
    mesh_shader: WireShader,
    terrain_shader: WireShader,
    /// Whether the overlay renders this frame
    pub enabled: bool,
    selected_id: u32,
}

impl WireframeView {
    /// Create the wireframe view (disabled until toggled)
    pub fn new() -> Self {
        Self {
            pass: PassHandle(0),
            mesh_shader: WireShader::new(Vec4::new(0.8, 0.8, 0.8, 1.0)),
            terrain_shader: WireShader::new(Vec4::new(0.5, 0.7, 0.5, 1.0)),
            enabled: false,
            selected_id: crate::handle::INVALID_ID,
        }
    }
}

impl Default for WireframeView {
    fn default() -> Self {
        Self::new()
    }
}

impl RenderView for WireframeView {
    fn name(&self) -> &'static str {
        "wireframe"
    }

    fn pass_configs(&self) -> Vec<RenderPassConfig> {
        vec![RenderPassConfig::window_pass(
            "wireframe",
            ClearFlags::DEPTH | ClearFlags::STENCIL,
        )]
    }

    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()> {
        self.pass = passes[0];
        self.mesh_shader.register(backend, SHADER_WIREFRAME_MESH)?;
        self.terrain_shader
            .register(backend, SHADER_WIREFRAME_TERRAIN)?;
        Ok(())
    }

    fn on_destroy(&mut self, backend: &mut dyn RendererBackend) {
        self.mesh_shader.release(backend);
        self.terrain_shader.release(backend);
    }

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
            RenderError::PacketBuildFailed("wireframe view requires a camera".into())
        })?;
        let view_matrix = camera.view_get();
        let view_position = camera.position();
        self.selected_id = payload.selected_id;

        let exhausted = || RenderError::PacketBuildFailed("frame arena exhausted".into());
        let world_count = if self.enabled {
            payload.world_geometries.len()
        } else {
            0
        };
        let terrain_count = if self.enabled {
            payload.terrain_geometries.len()
        } else {
            0
        };
        let mut geometries = frame
            .arena
            .alloc_list(world_count.max(1))
            .ok_or_else(exhausted)?;
        let mut terrain_geometries = frame
            .arena
            .alloc_list(terrain_count.max(1))
            .ok_or_else(exhausted)?;
        let debug_geometries = frame.arena.alloc_list(1).ok_or_else(exhausted)?;

        if self.enabled {
            for geometry in &payload.world_geometries {
                geometries.push(*geometry);
            }
            for geometry in &payload.terrain_geometries {
                terrain_geometries.push(*geometry);
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
        if packet.geometries.is_empty() && packet.terrain_geometries.is_empty() {
            return Ok(());
        }

        let target = ctx.backend.window_attachment_index();
        ctx.backend.begin_pass(self.pass, target)?;
        let draw_index = ctx.frame.next_draw_index();

        if !packet.geometries.is_empty() {
            self.mesh_shader.draw_set(
                packet.geometries.as_slice(),
                self.selected_id,
                packet,
                ctx.backend,
                ctx.frame.frame_number,
                draw_index,
            )?;
        }
        if !packet.terrain_geometries.is_empty() {
            self.terrain_shader.draw_set(
                packet.terrain_geometries.as_slice(),
                self.selected_id,
                packet,
                ctx.backend,
                ctx.frame.frame_number,
                draw_index,
            )?;
        }

        ctx.backend.end_pass(self.pass)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event::EventBus;
    use crate::foundation::math::Mat4;
    use crate::renderer::null::{NullRenderer, RenderCall};
    use crate::renderer::types::ProjectionKind;

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

    fn geometry(id: u32) -> GeometryRenderData {
        GeometryRenderData {
            model: Mat4::identity(),
            unique_id: id,
            ..GeometryRenderData::default()
        }
    }

    #[test]
    fn test_disabled_view_skips_pass() {
        let mut backend = NullRenderer::new();
        let mut view = WireframeView::new();
        let pass = backend
            .pass_create(&view.pass_configs()[0])
            .expect("pass_create");
        view.on_registered(&mut backend, &[pass]).expect("register");

        let mut frame = FrameData::default();
        frame.begin_frame(0.016);
        let mut camera = Camera::new();
        let mut materials = MaterialStore::with_capacity(1);
        let mut payload = FramePayload::default();
        payload.world_geometries = vec![geometry(1)];

        let packet = view
            .build_packet(&frame, &viewport(), Some(&mut camera), &materials, &payload)
            .expect("packet");
        let mut events = EventBus::new();
        let mut ctx = RenderContext {
            backend: &mut backend,
            materials: &mut materials,
            events: &mut events,
            frame: &frame,
        };
        view.render(&packet, &mut ctx).expect("render");

        assert!(backend.pass_begin_order().is_empty());
    }

    #[test]
    fn test_selected_geometry_uses_selected_instance() {
        let mut backend = NullRenderer::new();
        let mut view = WireframeView::new();
        view.enabled = true;
        let pass = backend
            .pass_create(&view.pass_configs()[0])
            .expect("pass_create");
        view.on_registered(&mut backend, &[pass]).expect("register");
        let selected_instance = view.mesh_shader.selected.instance;

        let mut frame = FrameData::default();
        frame.begin_frame(0.016);
        let mut camera = Camera::new();
        let mut materials = MaterialStore::with_capacity(1);
        let mut payload = FramePayload::default();
        payload.world_geometries = vec![geometry(1), geometry(2)];
        payload.selected_id = 2;

        let packet = view
            .build_packet(&frame, &viewport(), Some(&mut camera), &materials, &payload)
            .expect("packet");
        let mut events = EventBus::new();
        let mut ctx = RenderContext {
            backend: &mut backend,
            materials: &mut materials,
            events: &mut events,
            frame: &frame,
        };
        view.render(&packet, &mut ctx).expect("render");

        let binds: Vec<u32> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                RenderCall::BindInstance(_, instance, _) => Some(*instance),
                _ => None,
            })
            .collect();
        assert_eq!(binds.len(), 2);
        assert_eq!(binds[1], selected_instance);
        assert_ne!(binds[0], binds[1]);
    }

    #[test]
    fn test_instance_uniforms_apply_once_per_pass() {
        let mut backend = NullRenderer::new();
        let mut view = WireframeView::new();
        view.enabled = true;
        let pass = backend
            .pass_create(&view.pass_configs()[0])
            .expect("pass_create");
        view.on_registered(&mut backend, &[pass]).expect("register");

        let mut frame = FrameData::default();
        frame.begin_frame(0.016);
        let mut camera = Camera::new();
        let mut materials = MaterialStore::with_capacity(1);
        let mut payload = FramePayload::default();
        payload.world_geometries = vec![geometry(1), geometry(2), geometry(3)];

        let packet = view
            .build_packet(&frame, &viewport(), Some(&mut camera), &materials, &payload)
            .expect("packet");
        let mut events = EventBus::new();
        let mut ctx = RenderContext {
            backend: &mut backend,
            materials: &mut materials,
            events: &mut events,
            frame: &frame,
        };
        view.render(&packet, &mut ctx).expect("render");

        let updates: Vec<bool> = backend
            .calls()
            .iter()
            .filter_map(|call| match call {
                RenderCall::BindInstance(_, _, update) => Some(*update),
                _ => None,
            })
            .collect();
        // All three draws share the normal instance: one upload.
        assert_eq!(updates, vec![true, false, false]);
    }
}
