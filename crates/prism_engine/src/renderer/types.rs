//! Renderer-facing data types
//!
//! Pass and attachment configuration, draw submission payloads, and the
//! viewport/projection pairing views receive at packet-build time. These
//! types describe WHAT to render; the GPU backend behind
//! [`crate::renderer::RendererBackend`] decides how.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

use crate::foundation::math::{Mat4, Mat4Ext, Vec4};
use crate::handle::Handle;

bitflags! {
    /// Which aspects a render pass clears on begin
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct ClearFlags: u8 {
        /// Clear the colour attachment
        const COLOUR = 0b001;
        /// Clear the depth attachment
        const DEPTH = 0b010;
        /// Clear the stencil attachment
        const STENCIL = 0b100;
    }
}

/// Attachment kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentType {
    /// Colour target
    Colour,
    /// Depth target
    Depth,
}

/// Where an attachment's backing image comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttachmentSource {
    /// The swapchain/window-owned image
    Default,
    /// An image owned by the view (offscreen targets such as pick buffers)
    ViewOwned,
}

/// Load behaviour at pass begin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LoadOp {
    /// Preserve existing contents
    Load,
    /// Contents are undefined at pass begin
    DontCare,
}

/// Store behaviour at pass end
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StoreOp {
    /// Keep the results
    Store,
    /// Results may be discarded
    DontCare,
}

/// One attachment within a render pass
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttachmentConfig {
    /// Colour or depth
    pub attachment_type: AttachmentType,
    /// Window-owned or view-owned backing image
    pub source: AttachmentSource,
    /// Behaviour at pass begin
    pub load_op: LoadOp,
    /// Behaviour at pass end
    pub store_op: StoreOp,
    /// Present the backing image after this pass. True for at most one
    /// attachment per frame, and that attachment must be the last in render
    /// order.
    pub present_after: bool,
}

/// Declarative render pass configuration
#[derive(Debug, Clone, PartialEq)]
pub struct RenderPassConfig {
    /// Pass name, for diagnostics and target lookup
    pub name: String,
    /// Which aspects to clear at pass begin
    pub clear_flags: ClearFlags,
    /// Clear colour (when `COLOUR` is set)
    pub clear_colour: Vec4,
    /// Clear depth (when `DEPTH` is set)
    pub clear_depth: f32,
    /// Clear stencil (when `STENCIL` is set)
    pub clear_stencil: u32,
    /// Ordered attachments
    pub attachments: Vec<AttachmentConfig>,
    /// Number of render targets (one per swapchain image for default-source
    /// passes)
    pub render_target_count: u32,
}

impl RenderPassConfig {
    /// A pass over the default window attachments with the given clear flags
    pub fn window_pass(name: impl Into<String>, clear_flags: ClearFlags) -> Self {
        let colour_load = if clear_flags.contains(ClearFlags::COLOUR) {
            LoadOp::DontCare
        } else {
            LoadOp::Load
        };
        Self {
            name: name.into(),
            clear_flags,
            clear_colour: Vec4::new(0.0, 0.0, 0.2, 1.0),
            clear_depth: 1.0,
            clear_stencil: 0,
            attachments: vec![
                AttachmentConfig {
                    attachment_type: AttachmentType::Colour,
                    source: AttachmentSource::Default,
                    load_op: colour_load,
                    store_op: StoreOp::Store,
                    present_after: false,
                },
                AttachmentConfig {
                    attachment_type: AttachmentType::Depth,
                    source: AttachmentSource::Default,
                    load_op: LoadOp::DontCare,
                    store_op: StoreOp::Store,
                    present_after: false,
                },
            ],
            render_target_count: 0,
        }
    }
}

/// Validate the present_after invariant across the full frame's passes, in
/// render order.
///
/// Exactly zero or one attachment may be flagged; a flagged attachment must
/// be its pass's last attachment, and no later pass may touch a window
/// attachment. View-owned offscreen passes (pick) may follow the presenting
/// pass.
pub fn validate_present_after(passes: &[&RenderPassConfig]) -> Result<(), String> {
    let mut seen: Option<(usize, usize, &str)> = None;
    for (pass_index, pass) in passes.iter().enumerate() {
        for (attachment_index, attachment) in pass.attachments.iter().enumerate() {
            if attachment.present_after {
                if let Some((_, _, name)) = seen {
                    return Err(format!(
                        "present_after set on both pass '{name}' and pass '{}'",
                        pass.name
                    ));
                }
                seen = Some((pass_index, attachment_index, &pass.name));
            }
        }
    }

    if let Some((pass_index, attachment_index, name)) = seen {
        let last_window_pass = passes.iter().rposition(|pass| {
            pass.attachments
                .iter()
                .any(|a| a.source == AttachmentSource::Default)
        });
        if last_window_pass != Some(pass_index) {
            return Err(format!(
                "present_after pass '{name}' is not the last window pass in render order"
            ));
        }
        if attachment_index != passes[pass_index].attachments.len() - 1 {
            return Err(format!(
                "present_after attachment of pass '{name}' is not the pass's last attachment"
            ));
        }
    }
    Ok(())
}

/// Per-draw submission payload
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryRenderData {
    /// Model (world) matrix
    pub model: Mat4,
    /// Material handle into the material store
    pub material: Handle,
    /// Vertex count
    pub vertex_count: u32,
    /// Offset into the shared vertex buffer
    pub vertex_buffer_offset: u64,
    /// Index count
    pub index_count: u32,
    /// Offset into the shared index buffer
    pub index_buffer_offset: u64,
    /// Object id, used for wireframe selection and pick encoding
    pub unique_id: u32,
    /// True when negative scaling flipped the winding
    pub winding_inverted: bool,
}

impl Default for GeometryRenderData {
    fn default() -> Self {
        Self {
            model: Mat4::identity(),
            material: Handle::invalid(),
            vertex_count: 0,
            vertex_buffer_offset: 0,
            index_count: 0,
            index_buffer_offset: 0,
            unique_id: crate::handle::INVALID_ID,
            winding_inverted: false,
        }
    }
}

/// Projection parameters for a viewport
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ProjectionKind {
    /// Perspective projection
    Perspective {
        /// Vertical field of view in radians
        fov_y: f32,
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
    /// Pixel-space orthographic projection (UI)
    Orthographic {
        /// Near plane distance
        near: f32,
        /// Far plane distance
        far: f32,
    },
}

/// Viewport rectangle plus its projection matrix
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Viewport {
    /// (x, y, width, height) in pixels
    pub rect: Vec4,
    /// Projection parameters
    pub kind: ProjectionKind,
    /// Matrix derived from `kind` and `rect`
    pub projection: Mat4,
}

impl Viewport {
    /// Create a viewport, deriving its projection matrix
    pub fn new(rect: Vec4, kind: ProjectionKind) -> Self {
        let mut viewport = Self {
            rect,
            kind,
            projection: Mat4::identity(),
        };
        viewport.regenerate();
        viewport
    }

    /// Recompute the projection after a rect change
    pub fn resize(&mut self, rect: Vec4) {
        self.rect = rect;
        self.regenerate();
    }

    fn regenerate(&mut self) {
        self.projection = match self.kind {
            ProjectionKind::Perspective { fov_y, near, far } => {
                let aspect = if self.rect.w > 0.0 {
                    self.rect.z / self.rect.w
                } else {
                    1.0
                };
                Mat4::perspective(fov_y, aspect, near, far)
            }
            ProjectionKind::Orthographic { near, far } => Mat4::orthographic(
                self.rect.x,
                self.rect.x + self.rect.z,
                self.rect.y + self.rect.w,
                self.rect.y,
                near,
                far,
            ),
        };
    }
}
