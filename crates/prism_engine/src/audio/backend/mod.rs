//! Audio backend abstraction
//!
//! The frontend never touches a device API; it drives an [`AudioBackend`]
//! that owns buffers and per-channel sources. [`NullAudioBackend`] records
//! state for tests and headless runs; the software device backend with
//! streaming workers lives in [`software`].

pub mod software;

use std::sync::Arc;

use thiserror::Error;

use crate::audio::AudioSpace;
use crate::foundation::math::Vec3;
use crate::resource::AudioPcm;

/// Errors surfaced by audio operations
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AudioError {
    /// Backend initialisation failed
    #[error("audio backend init failed: {0}")]
    InitFailed(String),

    /// A buffer id did not resolve
    #[error("unknown audio buffer {0:?}")]
    UnknownBuffer(BufferId),

    /// A channel index is out of range
    #[error("audio channel {0} out of range")]
    InvalidChannel(u32),

    /// No free channel for playback
    #[error("no free audio channel")]
    NoFreeChannel,

    /// All base resource slots are in use
    #[error("audio resource slots exhausted ({0})")]
    ResourceSlotsExhausted(u32),

    /// The instance handle was stale
    #[error(transparent)]
    InvalidHandle(#[from] crate::handle::HandleError),

    /// The asset layer rejected the request
    #[error(transparent)]
    Resource(#[from] crate::resource::ResourceError),
}

/// Handle to PCM data uploaded to the backend
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BufferId(pub u32);

/// Device parameters handed to the backend at init
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioBackendConfig {
    /// Output sample rate in Hz
    pub frequency: u32,
    /// Output channel count (1 or 2)
    pub channel_count: u32,
    /// Samples per streamed chunk
    pub chunk_size: u32,
    /// Number of playback sources (one per frontend channel)
    pub max_sources: u32,
}

impl Default for AudioBackendConfig {
    fn default() -> Self {
        Self {
            frequency: 44_100,
            channel_count: 2,
            chunk_size: 4096 * 16,
            max_sources: 8,
        }
    }
}

/// Device-facing audio contract.
///
/// Channel indices come from the frontend and are dense in
/// `0..max_sources`. A streaming buffer must never be hardware-looped;
/// looping is emulated by the backend's stream worker.
pub trait AudioBackend {
    /// Initialise the device with the given parameters
    fn init(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError>;

    /// Tear the device down; all sources stop
    fn shutdown(&mut self);

    /// Upload PCM data, or register it for streaming
    fn buffer_load(&mut self, pcm: Arc<AudioPcm>, streaming: bool) -> Result<BufferId, AudioError>;

    /// Release an uploaded buffer
    fn buffer_unload(&mut self, buffer: BufferId);

    /// Bind a buffer to a channel source and start playback.
    ///
    /// `use_mono` selects the downmixed mono data so 3D spatialization
    /// applies to stereo assets.
    fn play(
        &mut self,
        channel: u32,
        buffer: BufferId,
        space: AudioSpace,
        looping: bool,
        use_mono: bool,
    ) -> Result<(), AudioError>;

    /// Stop a channel's source
    fn stop(&mut self, channel: u32);

    /// Whether the channel's source is currently audible
    fn is_playing(&self, channel: u32) -> bool;

    /// Per-channel gain (post mixing)
    fn gain_set(&mut self, channel: u32, gain: f32);

    /// Per-channel pitch in 0.5..=2.0
    fn pitch_set(&mut self, channel: u32, pitch: f32);

    /// Per-channel emitter position
    fn position_set(&mut self, channel: u32, position: Vec3);

    /// Listener position, updated once per frame
    fn listener_position_set(&mut self, position: Vec3);

    /// Per-frame backend upkeep
    fn update(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq)]
struct NullSource {
    playing: bool,
    buffer: Option<BufferId>,
    looping: bool,
    gain: f32,
    pitch: f32,
    position: Vec3,
}

impl Default for NullSource {
    fn default() -> Self {
        Self {
            playing: false,
            buffer: None,
            looping: false,
            gain: 1.0,
            pitch: 1.0,
            position: Vec3::zeros(),
        }
    }
}

/// Bookkeeping-only backend for tests and headless runs
#[derive(Default)]
pub struct NullAudioBackend {
    sources: Vec<NullSource>,
    buffers: Vec<Option<(Arc<AudioPcm>, bool)>>,
    listener: Vec3,
}

impl NullAudioBackend {
    /// Create an uninitialised null backend
    pub fn new() -> Self {
        Self::default()
    }

    /// Test hook: gain last set on a channel
    pub fn gain(&self, channel: u32) -> Option<f32> {
        self.sources.get(channel as usize).map(|s| s.gain)
    }

    /// Test hook: position last set on a channel
    pub fn position(&self, channel: u32) -> Option<Vec3> {
        self.sources.get(channel as usize).map(|s| s.position)
    }

    /// Test hook: whether a buffer is registered as streaming
    pub fn buffer_streaming(&self, buffer: BufferId) -> Option<bool> {
        self.buffers
            .get(buffer.0 as usize)
            .and_then(|slot| slot.as_ref().map(|(_, streaming)| *streaming))
    }

    /// Test hook: looping flag last set on a channel source
    pub fn source_looping(&self, channel: u32) -> Option<bool> {
        self.sources.get(channel as usize).map(|s| s.looping)
    }
}

impl AudioBackend for NullAudioBackend {
    fn init(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        self.sources = vec![NullSource::default(); config.max_sources as usize];
        Ok(())
    }

    fn shutdown(&mut self) {
        for source in &mut self.sources {
            source.playing = false;
        }
        self.buffers.clear();
    }

    fn buffer_load(&mut self, pcm: Arc<AudioPcm>, streaming: bool) -> Result<BufferId, AudioError> {
        let id = BufferId(self.buffers.len() as u32);
        self.buffers.push(Some((pcm, streaming)));
        Ok(id)
    }

    fn buffer_unload(&mut self, buffer: BufferId) {
        if let Some(slot) = self.buffers.get_mut(buffer.0 as usize) {
            *slot = None;
        }
    }

    fn play(
        &mut self,
        channel: u32,
        buffer: BufferId,
        _space: AudioSpace,
        looping: bool,
        _use_mono: bool,
    ) -> Result<(), AudioError> {
        let streaming = self
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .map(|(_, streaming)| *streaming)
            .ok_or(AudioError::UnknownBuffer(buffer))?;
        let source = self
            .sources
            .get_mut(channel as usize)
            .ok_or(AudioError::InvalidChannel(channel))?;
        source.playing = true;
        source.buffer = Some(buffer);
        // Streaming sources loop in the worker, never on the device.
        source.looping = looping && !streaming;
        Ok(())
    }

    fn stop(&mut self, channel: u32) {
        if let Some(source) = self.sources.get_mut(channel as usize) {
            source.playing = false;
            source.buffer = None;
        }
    }

    fn is_playing(&self, channel: u32) -> bool {
        self.sources
            .get(channel as usize)
            .is_some_and(|s| s.playing)
    }

    fn gain_set(&mut self, channel: u32, gain: f32) {
        if let Some(source) = self.sources.get_mut(channel as usize) {
            source.gain = gain;
        }
    }

    fn pitch_set(&mut self, channel: u32, pitch: f32) {
        if let Some(source) = self.sources.get_mut(channel as usize) {
            source.pitch = pitch;
        }
    }

    fn position_set(&mut self, channel: u32, position: Vec3) {
        if let Some(source) = self.sources.get_mut(channel as usize) {
            source.position = position;
        }
    }

    fn listener_position_set(&mut self, position: Vec3) {
        self.listener = position;
    }

    fn update(&mut self) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pcm() -> Arc<AudioPcm> {
        Arc::new(AudioPcm {
            sample_rate: 44_100,
            channels: 2,
            samples: vec![0; 512],
            mono: Some(vec![0; 256]),
        })
    }

    #[test]
    fn test_streaming_never_hardware_loops() {
        let mut backend = NullAudioBackend::new();
        backend.init(&AudioBackendConfig::default()).expect("init");

        let streamed = backend.buffer_load(pcm(), true).expect("load");
        backend
            .play(0, streamed, AudioSpace::TwoD, true, false)
            .expect("play");
        assert_eq!(backend.source_looping(0), Some(false));

        let whole = backend.buffer_load(pcm(), false).expect("load");
        backend
            .play(1, whole, AudioSpace::TwoD, true, false)
            .expect("play");
        assert_eq!(backend.source_looping(1), Some(true));
    }

    #[test]
    fn test_play_rejects_unloaded_buffer() {
        let mut backend = NullAudioBackend::new();
        backend.init(&AudioBackendConfig::default()).expect("init");

        let buffer = backend.buffer_load(pcm(), false).expect("load");
        backend.buffer_unload(buffer);

        assert_eq!(
            backend.play(0, buffer, AudioSpace::TwoD, false, false),
            Err(AudioError::UnknownBuffer(buffer))
        );
    }
}
