//! Engine systems container and frame loop
//!
//! [`EngineSystems`] owns every core subsystem and is constructed once at
//! boot; subsystems receive it by reference, never through globals. The
//! frame contract: pump resource completions, update scene and audio,
//! collect the frame payload, build and render every view in order, then
//! present. A failed pass skips the remainder of the frame but the engine
//! still presents; a failed present is fatal.

use std::sync::Arc;

use thiserror::Error;

use crate::audio::{AudioBackend, AudioError, AudioSystem, AudioSystemConfig};
use crate::editor::Editor;
use crate::event::EventBus;
use crate::foundation::frame::{FrameData, DEFAULT_FRAME_ARENA_SIZE};
use crate::registry::{CameraRegistry, LightRegistry};
use crate::renderer::backend::{BackendResult, RenderError, RendererBackend};
use crate::renderer::material::MaterialStore;
use crate::resource::{ResourceKey, ResourceLoader, ResourceSystem};
use crate::scene::{Scene, SceneError};
use crate::transform::TransformStore;
use crate::view::{FramePayload, RenderViewConfig, ViewSystem};

const TRANSFORM_CAPACITY: usize = 512;
const MATERIAL_CAPACITY: usize = 64;
const CAMERA_CAPACITY: usize = 8;
const LIGHT_CAPACITY: usize = 16;

/// Errors surfaced at engine boot and scene load
#[derive(Debug, Error)]
pub enum EngineError {
    /// Renderer backend rejected a boot-time operation
    #[error(transparent)]
    Render(#[from] RenderError),

    /// Audio backend failed to initialise
    #[error(transparent)]
    Audio(#[from] AudioError),

    /// Scene descriptor failed to load or parse
    #[error(transparent)]
    Scene(#[from] SceneError),
}

/// Boot-time engine configuration
pub struct EngineConfig {
    /// Per-frame scratch arena capacity in bytes
    pub frame_arena_size: usize,
    /// Audio system configuration
    pub audio: AudioSystemConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            frame_arena_size: DEFAULT_FRAME_ARENA_SIZE,
            audio: AudioSystemConfig::default(),
        }
    }
}

/// Owner of every core subsystem
pub struct EngineSystems {
    /// Per-frame data and scratch arena
    pub frame: FrameData,
    /// Main-thread event bus
    pub events: EventBus,
    /// Asynchronous asset layer
    pub resources: ResourceSystem,
    /// Handle-indexed transform store
    pub transforms: TransformStore,
    /// Material store
    pub materials: MaterialStore,
    /// Named camera pool
    pub cameras: CameraRegistry,
    /// Named light pool
    pub lights: LightRegistry,
    /// Ordered render view registry
    pub views: ViewSystem,
    /// Loaded scene, if any
    pub scene: Option<Scene>,
    /// Editor interaction state
    pub editor: Editor,
    /// Audio mixer
    pub audio: AudioSystem,
    backend: Box<dyn RendererBackend>,
}

impl EngineSystems {
    /// Boot the engine over the given backends and asset loader
    pub fn new(
        backend: Box<dyn RendererBackend>,
        audio_backend: Box<dyn AudioBackend>,
        loader: Arc<dyn ResourceLoader>,
        config: EngineConfig,
    ) -> Result<Self, EngineError> {
        let audio = AudioSystem::new(config.audio, audio_backend)?;
        log::info!("engine systems up");
        Ok(Self {
            frame: FrameData::new(config.frame_arena_size),
            events: EventBus::new(),
            resources: ResourceSystem::new(loader),
            transforms: TransformStore::with_capacity(TRANSFORM_CAPACITY),
            materials: MaterialStore::with_capacity(MATERIAL_CAPACITY),
            cameras: CameraRegistry::new(CAMERA_CAPACITY),
            lights: LightRegistry::new(LIGHT_CAPACITY),
            views: ViewSystem::new(),
            scene: None,
            editor: Editor::new(),
            audio,
            backend,
        })
    }

    /// Renderer backend access for registration-time setup
    pub fn backend_mut(&mut self) -> &mut dyn RendererBackend {
        self.backend.as_mut()
    }

    /// Register a render view; views execute in registration order
    pub fn register_view(&mut self, config: RenderViewConfig) -> BackendResult<()> {
        self.views.register(config, self.backend.as_mut())
    }

    /// Load a scene descriptor and make it current.
    ///
    /// A previously loaded scene is unloaded first.
    pub fn scene_load(&mut self, name: &str, package: &str) -> Result<(), EngineError> {
        if let Some(mut old) = self.scene.take() {
            old.unload(&mut self.transforms, &mut self.resources);
        }
        let key = ResourceKey::new(name, package);
        let scene = Scene::from_resource(
            &key,
            &mut self.transforms,
            &mut self.materials,
            &mut self.resources,
        )?;
        self.scene = Some(scene);
        Ok(())
    }

    /// Propagate a window resize
    pub fn on_resize(&mut self, width: u32, height: u32) {
        self.views.on_resize(self.backend.as_mut(), width, height);
    }

    /// Run one frame.
    ///
    /// Returns an error only on fatal presentation failure; pass failures
    /// are logged, the remaining views are skipped and the frame still
    /// presents.
    pub fn frame(&mut self, delta_time: f32) -> BackendResult<()> {
        self.resources.pump_completions();
        if let Some(scene) = &mut self.scene {
            scene.update(&self.resources);
        }
        self.audio.update(&self.resources);

        self.frame.begin_frame(delta_time);

        let mut payload = FramePayload::default();
        if let Some(scene) = &self.scene {
            payload.ambient_colour = scene.ambient_colour();
            scene.frame_enumerate(&mut self.transforms, &mut payload.world_geometries);
        }
        payload.gizmo = self.editor.gizmo.render_data();
        payload.selected_id = self.editor.selected_id();
        payload.ui_texts = self.editor.hud.take_lines();
        let mouse = self.editor.mouse();
        payload.mouse_x = mouse.position.0 as i32;
        payload.mouse_y = mouse.position.1 as i32;

        self.backend.begin_frame(&self.frame)?;
        if let Err(err) = self.views.on_frame(
            &self.frame,
            &payload,
            self.backend.as_mut(),
            &mut self.materials,
            &mut self.events,
            &mut self.cameras,
        ) {
            log::error!(
                "frame {} aborted after pass failure: {err}",
                self.frame.frame_number
            );
        }
        self.backend.present()
    }

    /// Tear every subsystem down in dependency order
    pub fn shutdown(&mut self) {
        if let Some(mut scene) = self.scene.take() {
            scene.unload(&mut self.transforms, &mut self.resources);
        }
        self.views.shutdown(self.backend.as_mut());
        self.audio.shutdown();
        log::info!("engine systems down");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::audio::NullAudioBackend;
    use crate::foundation::math::{Mat4, Vec3, Vec4};
    use crate::renderer::backend::PassHandle;
    use crate::renderer::null::NullRenderer;
    use crate::renderer::types::{
        ClearFlags, GeometryRenderData, ProjectionKind, RenderPassConfig, Viewport,
    };
    use crate::resource::{ResourceData, ResourceError, ResourceType};
    use crate::view::{PacketExtended, RenderContext, RenderView, ViewPacket};
    use std::cell::RefCell;
    use std::rc::Rc;

    struct TestLoader;

    impl ResourceLoader for TestLoader {
        fn load(
            &self,
            _key: &ResourceKey,
            _resource_type: ResourceType,
        ) -> Result<ResourceData, ResourceError> {
            Ok(ResourceData::Text(
                r#"(name: "boot", nodes: [(name: "anchor")])"#.into(),
            ))
        }
    }

    /// Shared-handle renderer so tests can inspect state the engine owns
    #[derive(Clone)]
    struct SharedRenderer(Rc<RefCell<NullRenderer>>);

    impl RendererBackend for SharedRenderer {
        fn begin_frame(&mut self, frame: &FrameData) -> BackendResult<()> {
            self.0.borrow_mut().begin_frame(frame)
        }

        fn pass_create(&mut self, config: &RenderPassConfig) -> BackendResult<PassHandle> {
            self.0.borrow_mut().pass_create(config)
        }

        fn pass_destroy(&mut self, pass: PassHandle) {
            self.0.borrow_mut().pass_destroy(pass);
        }

        fn begin_pass(&mut self, pass: PassHandle, target_index: u32) -> BackendResult<()> {
            self.0.borrow_mut().begin_pass(pass, target_index)
        }

        fn end_pass(&mut self, pass: PassHandle) -> BackendResult<()> {
            self.0.borrow_mut().end_pass(pass)
        }

        fn viewport_set(&mut self, rect: Vec4) {
            self.0.borrow_mut().viewport_set(rect);
        }

        fn draw_geometry(&mut self, data: &GeometryRenderData) {
            self.0.borrow_mut().draw_geometry(data);
        }

        fn shader_create(
            &mut self,
            name: &str,
        ) -> BackendResult<crate::renderer::backend::ShaderHandle> {
            self.0.borrow_mut().shader_create(name)
        }

        fn shader_use(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
        ) -> BackendResult<()> {
            self.0.borrow_mut().shader_use(shader)
        }

        fn shader_instance_acquire(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
        ) -> BackendResult<u32> {
            self.0.borrow_mut().shader_instance_acquire(shader)
        }

        fn shader_instance_release(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
            instance: u32,
        ) {
            self.0.borrow_mut().shader_instance_release(shader, instance);
        }

        fn uniform_set(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
            name: &str,
            value: crate::renderer::backend::UniformValue,
        ) -> BackendResult<()> {
            self.0.borrow_mut().uniform_set(shader, name, value)
        }

        fn apply_globals(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
        ) -> BackendResult<()> {
            self.0.borrow_mut().apply_globals(shader)
        }

        fn bind_instance(
            &mut self,
            shader: crate::renderer::backend::ShaderHandle,
            instance: u32,
            needs_update: bool,
        ) -> BackendResult<()> {
            self.0.borrow_mut().bind_instance(shader, instance, needs_update)
        }

        fn attachment_create(
            &mut self,
            attachment_type: crate::renderer::types::AttachmentType,
            width: u32,
            height: u32,
        ) -> BackendResult<crate::renderer::backend::AttachmentHandle> {
            self.0
                .borrow_mut()
                .attachment_create(attachment_type, width, height)
        }

        fn attachment_destroy(
            &mut self,
            attachment: crate::renderer::backend::AttachmentHandle,
        ) {
            self.0.borrow_mut().attachment_destroy(attachment);
        }

        fn attachment_read_pixel(
            &mut self,
            attachment: crate::renderer::backend::AttachmentHandle,
            x: u32,
            y: u32,
        ) -> BackendResult<[u8; 4]> {
            self.0.borrow_mut().attachment_read_pixel(attachment, x, y)
        }

        fn attachment_extent(
            &self,
            attachment: crate::renderer::backend::AttachmentHandle,
        ) -> BackendResult<(u32, u32)> {
            self.0.borrow().attachment_extent(attachment)
        }

        fn window_attachment_count(&self) -> u32 {
            self.0.borrow().window_attachment_count()
        }

        fn window_attachment_index(&self) -> u32 {
            self.0.borrow().window_attachment_index()
        }

        fn window_extent(&self) -> (u32, u32) {
            self.0.borrow().window_extent()
        }

        fn present(&mut self) -> BackendResult<()> {
            self.0.borrow_mut().present()
        }
    }

    struct PassView {
        pass: Option<PassHandle>,
    }

    impl RenderView for PassView {
        fn name(&self) -> &'static str {
            "pass_view"
        }

        fn pass_configs(&self) -> Vec<RenderPassConfig> {
            let mut config = RenderPassConfig::window_pass("pass_view", ClearFlags::COLOUR);
            if let Some(last) = config.attachments.last_mut() {
                last.present_after = true;
            }
            vec![config]
        }

        fn on_registered(
            &mut self,
            _backend: &mut dyn RendererBackend,
            passes: &[PassHandle],
        ) -> BackendResult<()> {
            self.pass = passes.first().copied();
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
                view_name: "pass_view",
                viewport: *viewport,
                view_matrix: Mat4::identity(),
                view_position: Vec3::zeros(),
                ambient_colour: Vec4::new(0.25, 0.25, 0.25, 1.0),
                geometries: frame.arena.alloc_list(1).ok_or_else(|| {
                    RenderError::PacketBuildFailed("arena exhausted".into())
                })?,
                terrain_geometries: frame.arena.alloc_list(1).ok_or_else(|| {
                    RenderError::PacketBuildFailed("arena exhausted".into())
                })?,
                debug_geometries: frame.arena.alloc_list(1).ok_or_else(|| {
                    RenderError::PacketBuildFailed("arena exhausted".into())
                })?,
                extended: PacketExtended::None,
            })
        }

        fn render(&mut self, _packet: &ViewPacket, ctx: &mut RenderContext<'_>) -> BackendResult<()> {
            let pass = self.pass.ok_or_else(|| {
                RenderError::PassFailed("view rendered before registration".into())
            })?;
            ctx.backend.begin_pass(pass, ctx.backend.window_attachment_index())?;
            ctx.backend.end_pass(pass)
        }
    }

    fn boot() -> (EngineSystems, Rc<RefCell<NullRenderer>>) {
        let shared = Rc::new(RefCell::new(NullRenderer::new()));
        let engine = EngineSystems::new(
            Box::new(SharedRenderer(Rc::clone(&shared))),
            Box::new(NullAudioBackend::new()),
            Arc::new(TestLoader),
            EngineConfig::default(),
        )
        .expect("boot");
        (engine, shared)
    }

    fn pass_view_config() -> RenderViewConfig {
        RenderViewConfig {
            view: Box::new(PassView { pass: None }),
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
    fn test_frame_runs_and_presents() {
        let (mut engine, shared) = boot();
        engine.register_view(pass_view_config()).expect("register");

        engine.frame(0.016).expect("frame");

        assert_eq!(shared.borrow().pass_begin_order(), vec!["pass_view"]);
        assert_eq!(engine.frame.frame_number, 1);
    }

    #[test]
    fn test_pass_failure_still_presents() {
        let (mut engine, shared) = boot();
        engine.register_view(pass_view_config()).expect("register");

        shared.borrow_mut().fail_next_begin_pass = true;
        engine.frame(0.016).expect("frame should still present");

        // Recovery on the next frame
        engine.frame(0.016).expect("frame");
        assert_eq!(shared.borrow().pass_begin_order(), vec!["pass_view"]);
    }

    #[test]
    fn test_present_failure_is_fatal() {
        let (mut engine, shared) = boot();
        engine.register_view(pass_view_config()).expect("register");

        shared.borrow_mut().fail_present = true;
        assert!(matches!(
            engine.frame(0.016),
            Err(RenderError::PresentFailed(_))
        ));
    }

    #[test]
    fn test_scene_load_makes_scene_current() {
        let (mut engine, _shared) = boot();
        engine.scene_load("boot", "base").expect("scene");

        let scene = engine.scene.as_ref().expect("scene present");
        assert_eq!(scene.name(), "boot");
        assert_eq!(scene.node_count(), 1);
    }
}
