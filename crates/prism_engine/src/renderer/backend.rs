//! Backend abstraction for the rendering system
//!
//! The engine core never talks to a GPU API directly; every view renders
//! through [`RendererBackend`]. The concrete Vulkan/OpenGL implementation
//! lives outside this crate — the trait is the contract, and
//! [`crate::renderer::null::NullRenderer`] provides a recording
//! implementation for tests and headless runs.

use thiserror::Error;

use crate::foundation::frame::FrameData;
use crate::foundation::math::{Mat4, Vec3, Vec4};
use crate::renderer::types::{AttachmentType, GeometryRenderData, RenderPassConfig};

/// Result type for backend operations
pub type BackendResult<T> = Result<T, RenderError>;

/// Errors surfaced by rendering operations
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RenderError {
    /// Pass creation was rejected by the backend
    #[error("render pass creation failed: {0}")]
    PassCreationFailed(String),

    /// A pass handle did not resolve
    #[error("unknown render pass handle {0:?}")]
    UnknownPass(PassHandle),

    /// A shader handle did not resolve
    #[error("unknown shader handle {0:?}")]
    UnknownShader(ShaderHandle),

    /// An attachment handle did not resolve
    #[error("unknown attachment handle {0:?}")]
    UnknownAttachment(AttachmentHandle),

    /// begin_pass/end_pass failed; the frame should be skipped
    #[error("render pass begin/end failed: {0}")]
    PassFailed(String),

    /// Packet build could not complete
    #[error("packet build failed: {0}")]
    PacketBuildFailed(String),

    /// Frame-level pipeline configuration is invalid
    #[error("invalid pipeline configuration: {0}")]
    InvalidConfiguration(String),

    /// Presentation failed; this is fatal
    #[error("presentation failed: {0}")]
    PresentFailed(String),
}

/// Handle to a render pass created on the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PassHandle(pub u64);

/// Handle to a shader program owned by the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShaderHandle(pub u64);

/// Handle to a render target attachment image
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct AttachmentHandle(pub u64);

/// A value bound to a shader uniform
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum UniformValue {
    /// 32-bit float
    Float(f32),
    /// 32-bit signed integer
    Int(i32),
    /// 32-bit unsigned integer
    UInt(u32),
    /// 3-component vector
    Vec3(Vec3),
    /// 4-component vector
    Vec4(Vec4),
    /// 4x4 matrix
    Mat4(Mat4),
}

/// Main rendering backend trait.
///
/// Single-threaded from the core's perspective: all calls happen on the
/// main thread inside the frame loop, between `begin_frame` and `present`.
pub trait RendererBackend {
    /// Begin recording a frame
    fn begin_frame(&mut self, frame: &FrameData) -> BackendResult<()>;

    /// Create a render pass from its declarative configuration
    fn pass_create(&mut self, config: &RenderPassConfig) -> BackendResult<PassHandle>;

    /// Destroy a render pass
    fn pass_destroy(&mut self, pass: PassHandle);

    /// Begin a pass against one of its render targets
    fn begin_pass(&mut self, pass: PassHandle, target_index: u32) -> BackendResult<()>;

    /// End the pass begun last
    fn end_pass(&mut self, pass: PassHandle) -> BackendResult<()>;

    /// Set the active viewport rectangle (x, y, width, height)
    fn viewport_set(&mut self, rect: Vec4);

    /// Record a draw for one geometry submission
    fn draw_geometry(&mut self, data: &GeometryRenderData);

    /// Look up or create a shader program by name
    fn shader_create(&mut self, name: &str) -> BackendResult<ShaderHandle>;

    /// Make a shader the active program
    fn shader_use(&mut self, shader: ShaderHandle) -> BackendResult<()>;

    /// Acquire per-instance resources on a shader (descriptor sets etc.)
    fn shader_instance_acquire(&mut self, shader: ShaderHandle) -> BackendResult<u32>;

    /// Release per-instance resources
    fn shader_instance_release(&mut self, shader: ShaderHandle, instance: u32);

    /// Stage a named uniform value on the active shader
    fn uniform_set(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        value: UniformValue,
    ) -> BackendResult<()>;

    /// Apply staged global uniforms
    fn apply_globals(&mut self, shader: ShaderHandle) -> BackendResult<()>;

    /// Bind an instance; `needs_update` uploads staged instance uniforms
    fn bind_instance(
        &mut self,
        shader: ShaderHandle,
        instance: u32,
        needs_update: bool,
    ) -> BackendResult<()>;

    /// Create a view-owned attachment image
    fn attachment_create(
        &mut self,
        attachment_type: AttachmentType,
        width: u32,
        height: u32,
    ) -> BackendResult<AttachmentHandle>;

    /// Destroy a view-owned attachment image
    fn attachment_destroy(&mut self, attachment: AttachmentHandle);

    /// Synchronously read one pixel (RGBA8) from a colour attachment
    fn attachment_read_pixel(
        &mut self,
        attachment: AttachmentHandle,
        x: u32,
        y: u32,
    ) -> BackendResult<[u8; 4]>;

    /// Extent of an attachment (width, height)
    fn attachment_extent(&self, attachment: AttachmentHandle) -> BackendResult<(u32, u32)>;

    /// Number of window (swapchain) attachments
    fn window_attachment_count(&self) -> u32;

    /// Index of the window attachment in flight this frame
    fn window_attachment_index(&self) -> u32;

    /// Current window extent (width, height)
    fn window_extent(&self) -> (u32, u32);

    /// Present the frame. Failure here is fatal for the engine.
    fn present(&mut self) -> BackendResult<()>;
}
