//! Rendering contract layer
//!
//! Declarative pass/attachment configuration, draw submission types, the
//! backend trait the GPU implementation fulfils, and the recording null
//! backend used by tests and headless runs.

pub mod backend;
pub mod material;
pub mod null;
pub mod types;

pub use backend::{
    AttachmentHandle, BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle,
    UniformValue,
};
pub use material::{Material, MaterialStore};
pub use null::{NullRenderer, RenderCall};
pub use types::{
    AttachmentConfig, AttachmentSource, AttachmentType, ClearFlags, GeometryRenderData, LoadOp,
    ProjectionKind, RenderPassConfig, StoreOp, Viewport,
};
