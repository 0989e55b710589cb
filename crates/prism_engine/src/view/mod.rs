//! Render view pipeline
//!
//! A view is a named pipeline stage owning one or more render passes, a
//! shader set, a per-frame packet builder and a renderer. Views are
//! registered at boot from declarative configuration and executed in
//! declared order each frame: every view builds its packet first (packet
//! build order equals render order), then every view renders.

pub mod editor_world;
pub mod pick;
pub mod skybox;
pub mod ui;
pub mod wireframe;
pub mod world;

use crate::event::EventBus;
use crate::foundation::frame::{FrameData, FrameList};
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::handle::INVALID_ID;
use crate::renderer::backend::{BackendResult, PassHandle, RenderError, RendererBackend};
use crate::renderer::material::MaterialStore;
use crate::renderer::types::{validate_present_after, GeometryRenderData, Viewport};
use crate::registry::CameraRegistry;

pub use editor_world::EditorWorldView;
pub use pick::PickView;
pub use skybox::SkyboxView;
pub use ui::UiView;
pub use wireframe::WireframeView;
pub use world::WorldView;

/// A UI text submission
#[derive(Debug, Clone, PartialEq)]
pub struct UiText {
    /// Text content
    pub content: String,
    /// Screen position in pixels
    pub position: [f32; 2],
    /// Submission id, carried through to the pick pass
    pub unique_id: u32,
}

/// Gizmo geometry prepared for the editor-world view
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GizmoPacket {
    /// Mode geometry pre-multiplied by gizmo.world · scale(scale_scalar)
    pub geometry: GeometryRenderData,
    /// Interaction-plane normal line, emitted in debug builds while dragging
    pub plane_normal: Option<GeometryRenderData>,
}

/// Everything the frame's views consume, collected once per frame by the
/// engine before packet building starts.
#[derive(Debug)]
pub struct FramePayload {
    /// World geometry from the scene enumerator, in submission order
    pub world_geometries: Vec<GeometryRenderData>,
    /// Terrain geometry; bypasses transparency sorting
    pub terrain_geometries: Vec<GeometryRenderData>,
    /// Debug geometry (wire boxes, grids)
    pub debug_geometries: Vec<GeometryRenderData>,
    /// UI meshes in submission order
    pub ui_geometries: Vec<GeometryRenderData>,
    /// UI text lists in submission order
    pub ui_texts: Vec<UiText>,
    /// Gizmo geometry when a target is selected
    pub gizmo: Option<GizmoPacket>,
    /// Currently selected object id (`INVALID_ID` for none)
    pub selected_id: u32,
    /// Cursor position in window pixels
    pub mouse_x: i32,
    /// Cursor position in window pixels
    pub mouse_y: i32,
    /// Scene ambient colour
    pub ambient_colour: Vec4,
}

impl Default for FramePayload {
    fn default() -> Self {
        Self {
            world_geometries: Vec::new(),
            terrain_geometries: Vec::new(),
            debug_geometries: Vec::new(),
            ui_geometries: Vec::new(),
            ui_texts: Vec::new(),
            gizmo: None,
            selected_id: INVALID_ID,
            mouse_x: 0,
            mouse_y: 0,
            ambient_colour: Vec4::new(0.25, 0.25, 0.25, 1.0),
        }
    }
}

/// View-specific extension data riding in the packet
#[derive(Debug)]
pub enum PacketExtended {
    /// No extension
    None,
    /// Pick view extension: cursor position and the UI-phase matrices
    Pick {
        /// Cursor x in window pixels
        mouse_x: i32,
        /// Cursor y in window pixels
        mouse_y: i32,
        /// Orthographic projection for the UI pick pass
        ui_projection: Mat4,
        /// View matrix for the UI pick pass (identity)
        ui_view: Mat4,
        /// UI geometry rendered by the second pass
        ui_geometries: Vec<GeometryRenderData>,
    },
    /// UI view extension: text lists
    UiTexts(Vec<UiText>),
}

/// Per-frame draw submission for one view.
///
/// The geometry lists are backed by the frame arena; the packet must not
/// outlive the frame.
#[derive(Debug)]
pub struct ViewPacket {
    /// Owning view's name
    pub view_name: &'static str,
    /// Viewport the view renders into
    pub viewport: Viewport,
    /// View matrix (identity for orthographic UI)
    pub view_matrix: Mat4,
    /// View (camera) world position
    pub view_position: Vec3,
    /// Ambient colour
    pub ambient_colour: Vec4,
    /// Opaque-then-transparent geometry in final draw order
    pub geometries: FrameList<GeometryRenderData>,
    /// Terrain geometry
    pub terrain_geometries: FrameList<GeometryRenderData>,
    /// Debug geometry
    pub debug_geometries: FrameList<GeometryRenderData>,
    /// View-specific extension
    pub extended: PacketExtended,
}

/// Mutable systems a view renders against
pub struct RenderContext<'a> {
    /// GPU backend
    pub backend: &'a mut dyn RendererBackend,
    /// Material store (instance uniform bookkeeping)
    pub materials: &'a mut MaterialStore,
    /// Event bus (pick fires hover events)
    pub events: &'a mut EventBus,
    /// Frame data (frame number, draw index, arena)
    pub frame: &'a FrameData,
}

/// A named render pipeline stage.
///
/// A view's `render` must pair begin/end on every pass it enters; its
/// packet builder must draw all per-frame storage from the supplied frame
/// arena.
pub trait RenderView {
    /// Stable view name
    fn name(&self) -> &'static str;

    /// Declarative pass configurations, in execution order
    fn pass_configs(&self) -> Vec<crate::renderer::types::RenderPassConfig>;

    /// Called once at registration with the created pass handles; sets up
    /// shaders, instances and attachments
    fn on_registered(
        &mut self,
        backend: &mut dyn RendererBackend,
        passes: &[PassHandle],
    ) -> BackendResult<()>;

    /// Called at destruction; release shader instances and attachments
    fn on_destroy(&mut self, backend: &mut dyn RendererBackend);

    /// Called on window resize
    fn on_resize(&mut self, backend: &mut dyn RendererBackend, width: u32, height: u32);

    /// Build this frame's packet. Returning an error skips the view's
    /// contribution for the frame; the packet is not used.
    fn build_packet(
        &mut self,
        frame: &FrameData,
        viewport: &Viewport,
        camera: Option<&mut crate::registry::Camera>,
        materials: &MaterialStore,
        payload: &FramePayload,
    ) -> BackendResult<ViewPacket>;

    /// Render the packet
    fn render(&mut self, packet: &ViewPacket, ctx: &mut RenderContext<'_>) -> BackendResult<()>;
}

/// Registration-time configuration for one view
pub struct RenderViewConfig {
    /// The view implementation
    pub view: Box<dyn RenderView>,
    /// Viewport the view renders into
    pub viewport: Viewport,
    /// Camera name, or `None` for orthographic views
    pub camera: Option<String>,
}

struct RegisteredView {
    view: Box<dyn RenderView>,
    viewport: Viewport,
    camera: Option<String>,
    passes: Vec<PassHandle>,
    pass_configs: Vec<crate::renderer::types::RenderPassConfig>,
}

/// Registry of named views, executed in registration order
#[derive(Default)]
pub struct ViewSystem {
    views: Vec<RegisteredView>,
}

impl ViewSystem {
    /// Create an empty view system
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a view: validates the frame's pass layout, creates the
    /// view's passes on the backend and runs `on_registered`.
    pub fn register(
        &mut self,
        config: RenderViewConfig,
        backend: &mut dyn RendererBackend,
    ) -> BackendResult<()> {
        let RenderViewConfig {
            mut view,
            viewport,
            camera,
        } = config;

        if self.views.iter().any(|v| v.view.name() == view.name()) {
            return Err(RenderError::InvalidConfiguration(format!(
                "view '{}' already registered",
                view.name()
            )));
        }

        let pass_configs = view.pass_configs();

        // present_after must stay unique and final across the whole frame.
        let mut all_passes: Vec<&crate::renderer::types::RenderPassConfig> = self
            .views
            .iter()
            .flat_map(|v| v.pass_configs.iter())
            .collect();
        all_passes.extend(pass_configs.iter());
        validate_present_after(&all_passes).map_err(RenderError::InvalidConfiguration)?;

        let mut passes = Vec::with_capacity(pass_configs.len());
        for pass_config in &pass_configs {
            passes.push(backend.pass_create(pass_config)?);
        }

        view.on_registered(backend, &passes)?;
        log::info!("registered render view '{}'", view.name());

        self.views.push(RegisteredView {
            view,
            viewport,
            camera,
            passes,
            pass_configs,
        });
        Ok(())
    }

    /// Number of registered views
    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    /// Names of registered views in execution order
    pub fn view_names(&self) -> Vec<&'static str> {
        self.views.iter().map(|v| v.view.name()).collect()
    }

    /// Propagate a window resize to every view and viewport
    pub fn on_resize(&mut self, backend: &mut dyn RendererBackend, width: u32, height: u32) {
        for registered in &mut self.views {
            let rect = Vec4::new(
                registered.viewport.rect.x,
                registered.viewport.rect.y,
                width as f32,
                height as f32,
            );
            registered.viewport.resize(rect);
            registered.view.on_resize(backend, width, height);
        }
    }

    /// Execute one frame: build every packet in view order, then render
    /// every packet in the same order.
    ///
    /// A failed packet build skips that view and continues; a failed pass
    /// begin/end skips the remainder of the frame (the caller still
    /// attempts presentation).
    pub fn on_frame(
        &mut self,
        frame: &FrameData,
        payload: &FramePayload,
        backend: &mut dyn RendererBackend,
        materials: &mut MaterialStore,
        events: &mut EventBus,
        cameras: &mut CameraRegistry,
    ) -> BackendResult<()> {
        // Packet build phase.
        let mut packets: Vec<Option<ViewPacket>> = Vec::with_capacity(self.views.len());
        for registered in &mut self.views {
            let camera = registered
                .camera
                .as_deref()
                .and_then(|name| cameras.get_mut(name));
            match registered.view.build_packet(
                frame,
                &registered.viewport,
                camera,
                materials,
                payload,
            ) {
                Ok(packet) => packets.push(Some(packet)),
                Err(err) => {
                    log::error!(
                        "packet build failed for view '{}': {err}; skipping view this frame",
                        registered.view.name()
                    );
                    packets.push(None);
                }
            }
        }

        // Render phase, same order.
        for (registered, packet) in self.views.iter_mut().zip(packets.iter()) {
            let Some(packet) = packet else { continue };
            let mut ctx = RenderContext {
                backend,
                materials,
                events,
                frame,
            };
            registered.view.render(packet, &mut ctx)?;
        }
        Ok(())
    }

    /// Destroy all views: runs `on_destroy` then destroys their passes
    pub fn shutdown(&mut self, backend: &mut dyn RendererBackend) {
        for mut registered in self.views.drain(..) {
            registered.view.on_destroy(backend);
            for pass in registered.passes {
                backend.pass_destroy(pass);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::renderer::null::NullRenderer;
    use crate::renderer::types::{ClearFlags, ProjectionKind, RenderPassConfig};

    struct StubView {
        name: &'static str,
        present: bool,
    }

    impl RenderView for StubView {
        fn name(&self) -> &'static str {
            self.name
        }

        fn pass_configs(&self) -> Vec<RenderPassConfig> {
            let mut config = RenderPassConfig::window_pass(self.name, ClearFlags::empty());
            if self.present {
                config.attachments.last_mut().unwrap().present_after = true;
            }
            vec![config]
        }

        fn on_registered(
            &mut self,
            _backend: &mut dyn RendererBackend,
            _passes: &[PassHandle],
        ) -> BackendResult<()> {
            Ok(())
        }

        fn on_destroy(&mut self, _backend: &mut dyn RendererBackend) {}

        fn on_resize(&mut self, _backend: &mut dyn RendererBackend, _width: u32, _height: u32) {}

        fn build_packet(
            &mut self,
            frame: &FrameData,
            viewport: &Viewport,
            _camera: Option<&mut crate::registry::Camera>,
            _materials: &MaterialStore,
            _payload: &FramePayload,
        ) -> BackendResult<ViewPacket> {
            Ok(ViewPacket {
                view_name: self.name,
                viewport: *viewport,
                view_matrix: Mat4::identity(),
                view_position: Vec3::zeros(),
                ambient_colour: Vec4::new(0.25, 0.25, 0.25, 1.0),
                geometries: frame
                    .arena
                    .alloc_list(1)
                    .ok_or_else(|| RenderError::PacketBuildFailed("arena exhausted".into()))?,
                terrain_geometries: frame
                    .arena
                    .alloc_list(1)
                    .ok_or_else(|| RenderError::PacketBuildFailed("arena exhausted".into()))?,
                debug_geometries: frame
                    .arena
                    .alloc_list(1)
                    .ok_or_else(|| RenderError::PacketBuildFailed("arena exhausted".into()))?,
                extended: PacketExtended::None,
            })
        }

        fn render(
            &mut self,
            _packet: &ViewPacket,
            _ctx: &mut RenderContext<'_>,
        ) -> BackendResult<()> {
            Ok(())
        }
    }

    fn stub_config(name: &'static str, present: bool) -> RenderViewConfig {
        RenderViewConfig {
            view: Box::new(StubView { name, present }),
            viewport: Viewport::new(
                Vec4::new(0.0, 0.0, 1280.0, 720.0),
                ProjectionKind::Orthographic {
                    near: -1.0,
                    far: 1.0,
                },
            ),
            camera: None,
        }
    }

    #[test]
    fn test_register_rejects_duplicate_name() {
        let mut backend = NullRenderer::new();
        let mut views = ViewSystem::new();

        views
            .register(stub_config("world", false), &mut backend)
            .expect("register");
        assert!(views
            .register(stub_config("world", false), &mut backend)
            .is_err());
    }

    #[test]
    fn test_register_rejects_present_after_before_last() {
        let mut backend = NullRenderer::new();
        let mut views = ViewSystem::new();

        views
            .register(stub_config("ui", true), &mut backend)
            .expect("register");
        // Registering after the presenting view pushes it off the end.
        assert!(views
            .register(stub_config("late", false), &mut backend)
            .is_err());
    }

    #[test]
    fn test_views_execute_in_declared_order() {
        let mut backend = NullRenderer::new();
        let mut views = ViewSystem::new();
        views
            .register(stub_config("skybox", false), &mut backend)
            .expect("register");
        views
            .register(stub_config("world", false), &mut backend)
            .expect("register");

        assert_eq!(views.view_names(), vec!["skybox", "world"]);
    }
}
