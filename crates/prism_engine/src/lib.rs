//! Prism engine core
//!
//! Core subsystems of a real-time 3D editor/renderer: the ordered render
//! view pipeline, the per-frame linear allocator, the handle-indexed
//! transform store, the scene graph, the editor picking/gizmo interaction
//! core and the audio mixer with its streaming backend abstraction.
//!
//! The engine never talks to a GPU or audio device directly. Concrete
//! backends implement [`renderer::backend::RendererBackend`] and
//! [`audio::AudioBackend`]; the bundled null backends record calls for
//! tests and headless runs.
//!
//! [`engine::EngineSystems`] ties everything together and drives the frame
//! contract: pump asset completions, update scene and audio, build every
//! view packet in registration order, render in the same order, present.

pub mod audio;
pub mod editor;
pub mod engine;
pub mod event;
pub mod foundation;
pub mod handle;
pub mod registry;
pub mod renderer;
pub mod resource;
pub mod scene;
pub mod transform;
pub mod view;

/// Commonly used types, re-exported for application crates
pub mod prelude {
    pub use crate::audio::{AudioSpace, AudioSystem, AudioSystemConfig, NullAudioBackend};
    pub use crate::editor::{Editor, Gizmo, GizmoMode, GizmoOrientation};
    pub use crate::engine::{EngineConfig, EngineError, EngineSystems};
    pub use crate::event::{EventBus, EventCode, EventContext};
    pub use crate::foundation::frame::{FrameArena, FrameData, FrameList};
    pub use crate::foundation::math::{Mat4, Quat, Ray, Vec3, Vec4};
    pub use crate::handle::{Handle, HandleStore, INVALID_ID};
    pub use crate::registry::{Camera, CameraRegistry, LightRegistry};
    pub use crate::renderer::backend::{RenderError, RendererBackend};
    pub use crate::renderer::null::NullRenderer;
    pub use crate::resource::{ResourceKey, ResourceLoader, ResourceSystem, ResourceType};
    pub use crate::scene::{Scene, SceneDescriptor};
    pub use crate::transform::TransformStore;
    pub use crate::view::{RenderView, RenderViewConfig, ViewSystem};
}
