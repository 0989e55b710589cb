//! Recording null backend
//!
//! Implements [`RendererBackend`] without a GPU. Every call is recorded in
//! order, attachments are modeled as sparse CPU pixel stores (defaulting to
//! pure white, matching a cleared pick buffer), and tests can inject pixels
//! and failures. Also used by the editor binary for headless runs.

use std::collections::HashMap;

use crate::foundation::frame::FrameData;
use crate::foundation::math::Vec4;
use crate::renderer::backend::{
    AttachmentHandle, BackendResult, PassHandle, RenderError, RendererBackend, ShaderHandle,
    UniformValue,
};
use crate::renderer::types::{AttachmentType, GeometryRenderData, RenderPassConfig};

/// One recorded backend call
#[derive(Debug, Clone, PartialEq)]
pub enum RenderCall {
    /// begin_frame with the frame number
    BeginFrame(u64),
    /// begin_pass with the pass name and target index
    BeginPass(String, u32),
    /// end_pass with the pass name
    EndPass(String),
    /// viewport_set
    ViewportSet([f32; 4]),
    /// draw_geometry with the submission's unique id
    Draw(u32),
    /// shader_use with the shader name
    ShaderUse(String),
    /// apply_globals with the shader name
    ApplyGlobals(String),
    /// bind_instance with shader name, instance id and whether uniforms
    /// were uploaded
    BindInstance(String, u32, bool),
    /// uniform_set with shader name and uniform name
    UniformSet(String, String),
    /// present
    Present,
}

#[derive(Debug)]
struct NullAttachment {
    attachment_type: AttachmentType,
    width: u32,
    height: u32,
    pixels: HashMap<(u32, u32), [u8; 4]>,
}

#[derive(Debug)]
struct NullShader {
    name: String,
    next_instance: u32,
}

/// Headless recording renderer backend
#[derive(Debug, Default)]
pub struct NullRenderer {
    calls: Vec<RenderCall>,
    passes: HashMap<PassHandle, RenderPassConfig>,
    shaders: HashMap<ShaderHandle, NullShader>,
    attachments: HashMap<AttachmentHandle, NullAttachment>,
    next_pass: u64,
    next_shader: u64,
    next_attachment: u64,
    window_width: u32,
    window_height: u32,
    /// When set, the next begin_pass fails once (frame-skip path testing)
    pub fail_next_begin_pass: bool,
    /// When set, present fails (fatal path testing)
    pub fail_present: bool,
}

impl NullRenderer {
    /// Create a null renderer with a 1280x720 window
    pub fn new() -> Self {
        Self {
            window_width: 1280,
            window_height: 720,
            ..Self::default()
        }
    }

    /// Recorded calls in order
    pub fn calls(&self) -> &[RenderCall] {
        &self.calls
    }

    /// Forget recorded calls
    pub fn clear_calls(&mut self) {
        self.calls.clear();
    }

    /// Inject a pixel into an attachment (test hook standing in for GPU
    /// rasterization)
    pub fn set_attachment_pixel(
        &mut self,
        attachment: AttachmentHandle,
        x: u32,
        y: u32,
        pixel: [u8; 4],
    ) {
        if let Some(state) = self.attachments.get_mut(&attachment) {
            state.pixels.insert((x, y), pixel);
        }
    }

    /// Names of passes begun, in order
    pub fn pass_begin_order(&self) -> Vec<&str> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::BeginPass(name, _) => Some(name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Unique ids drawn, in order
    pub fn draw_order(&self) -> Vec<u32> {
        self.calls
            .iter()
            .filter_map(|call| match call {
                RenderCall::Draw(id) => Some(*id),
                _ => None,
            })
            .collect()
    }

    fn pass_name(&self, pass: PassHandle) -> BackendResult<String> {
        self.passes
            .get(&pass)
            .map(|config| config.name.clone())
            .ok_or(RenderError::UnknownPass(pass))
    }

    fn shader_name(&self, shader: ShaderHandle) -> BackendResult<String> {
        self.shaders
            .get(&shader)
            .map(|state| state.name.clone())
            .ok_or(RenderError::UnknownShader(shader))
    }
}

impl RendererBackend for NullRenderer {
    fn begin_frame(&mut self, frame: &FrameData) -> BackendResult<()> {
        self.calls.push(RenderCall::BeginFrame(frame.frame_number));
        Ok(())
    }

    fn pass_create(&mut self, config: &RenderPassConfig) -> BackendResult<PassHandle> {
        self.next_pass += 1;
        let handle = PassHandle(self.next_pass);
        self.passes.insert(handle, config.clone());
        Ok(handle)
    }

    fn pass_destroy(&mut self, pass: PassHandle) {
        self.passes.remove(&pass);
    }

    fn begin_pass(&mut self, pass: PassHandle, target_index: u32) -> BackendResult<()> {
        if self.fail_next_begin_pass {
            self.fail_next_begin_pass = false;
            return Err(RenderError::PassFailed("injected begin_pass failure".into()));
        }
        let name = self.pass_name(pass)?;
        self.calls.push(RenderCall::BeginPass(name, target_index));
        Ok(())
    }

    fn end_pass(&mut self, pass: PassHandle) -> BackendResult<()> {
        let name = self.pass_name(pass)?;
        self.calls.push(RenderCall::EndPass(name));
        Ok(())
    }

    fn viewport_set(&mut self, rect: Vec4) {
        self.calls
            .push(RenderCall::ViewportSet([rect.x, rect.y, rect.z, rect.w]));
    }

    fn draw_geometry(&mut self, data: &GeometryRenderData) {
        self.calls.push(RenderCall::Draw(data.unique_id));
    }

    fn shader_create(&mut self, name: &str) -> BackendResult<ShaderHandle> {
        if let Some((handle, _)) = self.shaders.iter().find(|(_, s)| s.name == name) {
            return Ok(*handle);
        }
        self.next_shader += 1;
        let handle = ShaderHandle(self.next_shader);
        self.shaders.insert(
            handle,
            NullShader {
                name: name.to_string(),
                next_instance: 0,
            },
        );
        Ok(handle)
    }

    fn shader_use(&mut self, shader: ShaderHandle) -> BackendResult<()> {
        let name = self.shader_name(shader)?;
        self.calls.push(RenderCall::ShaderUse(name));
        Ok(())
    }

    fn shader_instance_acquire(&mut self, shader: ShaderHandle) -> BackendResult<u32> {
        let state = self
            .shaders
            .get_mut(&shader)
            .ok_or(RenderError::UnknownShader(shader))?;
        let instance = state.next_instance;
        state.next_instance += 1;
        Ok(instance)
    }

    fn shader_instance_release(&mut self, _shader: ShaderHandle, _instance: u32) {}

    fn uniform_set(
        &mut self,
        shader: ShaderHandle,
        name: &str,
        _value: UniformValue,
    ) -> BackendResult<()> {
        let shader_name = self.shader_name(shader)?;
        self.calls
            .push(RenderCall::UniformSet(shader_name, name.to_string()));
        Ok(())
    }

    fn apply_globals(&mut self, shader: ShaderHandle) -> BackendResult<()> {
        let name = self.shader_name(shader)?;
        self.calls.push(RenderCall::ApplyGlobals(name));
        Ok(())
    }

    fn bind_instance(
        &mut self,
        shader: ShaderHandle,
        instance: u32,
        needs_update: bool,
    ) -> BackendResult<()> {
        let name = self.shader_name(shader)?;
        self.calls
            .push(RenderCall::BindInstance(name, instance, needs_update));
        Ok(())
    }

    fn attachment_create(
        &mut self,
        attachment_type: AttachmentType,
        width: u32,
        height: u32,
    ) -> BackendResult<AttachmentHandle> {
        self.next_attachment += 1;
        let handle = AttachmentHandle(self.next_attachment);
        self.attachments.insert(
            handle,
            NullAttachment {
                attachment_type,
                width,
                height,
                pixels: HashMap::new(),
            },
        );
        Ok(handle)
    }

    fn attachment_destroy(&mut self, attachment: AttachmentHandle) {
        self.attachments.remove(&attachment);
    }

    fn attachment_read_pixel(
        &mut self,
        attachment: AttachmentHandle,
        x: u32,
        y: u32,
    ) -> BackendResult<[u8; 4]> {
        let state = self
            .attachments
            .get(&attachment)
            .ok_or(RenderError::UnknownAttachment(attachment))?;
        // Unwritten texels read back as pure white, the pick "no hit" value.
        Ok(*state.pixels.get(&(x, y)).unwrap_or(&[255, 255, 255, 255]))
    }

    fn attachment_extent(&self, attachment: AttachmentHandle) -> BackendResult<(u32, u32)> {
        let state = self
            .attachments
            .get(&attachment)
            .ok_or(RenderError::UnknownAttachment(attachment))?;
        debug_assert!(matches!(
            state.attachment_type,
            AttachmentType::Colour | AttachmentType::Depth
        ));
        Ok((state.width, state.height))
    }

    fn window_attachment_count(&self) -> u32 {
        3
    }

    fn window_attachment_index(&self) -> u32 {
        0
    }

    fn window_extent(&self) -> (u32, u32) {
        (self.window_width, self.window_height)
    }

    fn present(&mut self) -> BackendResult<()> {
        if self.fail_present {
            return Err(RenderError::PresentFailed("injected present failure".into()));
        }
        self.calls.push(RenderCall::Present);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_records_pass_lifecycle() {
        let mut backend = NullRenderer::new();
        let config =
            RenderPassConfig::window_pass("world", crate::renderer::types::ClearFlags::empty());
        let pass = backend.pass_create(&config).expect("pass_create");

        backend.begin_pass(pass, 0).expect("begin");
        backend.draw_geometry(&GeometryRenderData {
            unique_id: 7,
            ..GeometryRenderData::default()
        });
        backend.end_pass(pass).expect("end");

        assert_eq!(backend.pass_begin_order(), vec!["world"]);
        assert_eq!(backend.draw_order(), vec![7]);
    }

    #[test]
    fn test_unwritten_pixels_read_white() {
        let mut backend = NullRenderer::new();
        let attachment = backend
            .attachment_create(AttachmentType::Colour, 8, 8)
            .expect("create");

        let pixel = backend.attachment_read_pixel(attachment, 3, 3).expect("read");
        assert_eq!(pixel, [255, 255, 255, 255]);
    }

    #[test]
    fn test_injected_pixel_reads_back() {
        let mut backend = NullRenderer::new();
        let attachment = backend
            .attachment_create(AttachmentType::Colour, 8, 8)
            .expect("create");
        backend.set_attachment_pixel(attachment, 2, 5, [7, 0, 0, 255]);

        let pixel = backend.attachment_read_pixel(attachment, 2, 5).expect("read");
        assert_eq!(pixel, [7, 0, 0, 255]);
    }

    #[test]
    fn test_shader_create_is_idempotent_by_name() {
        let mut backend = NullRenderer::new();
        let a = backend.shader_create("builtin.material").expect("create");
        let b = backend.shader_create("builtin.material").expect("create");

        assert_eq!(a, b);
    }

    #[test]
    fn test_begin_pass_failure_injection() {
        let mut backend = NullRenderer::new();
        let config =
            RenderPassConfig::window_pass("world", crate::renderer::types::ClearFlags::empty());
        let pass = backend.pass_create(&config).expect("pass_create");

        backend.fail_next_begin_pass = true;
        assert!(backend.begin_pass(pass, 0).is_err());
        // Only fails once
        assert!(backend.begin_pass(pass, 0).is_ok());
    }
}
