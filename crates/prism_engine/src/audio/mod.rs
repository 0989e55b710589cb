//! Audio system
//!
//! Frontend mixer over an [`AudioBackend`]. Sounds are acquired as
//! refcounted base resources (one per asset) with per-play instances;
//! playback binds an instance to a mixer channel. Asset loads are
//! asynchronous: playing before the PCM arrives defers via `trigger_play`
//! and the per-frame update starts the sound once the buffer is uploaded.

pub mod backend;
pub mod spatial;

pub use backend::software::SoftwareAudioBackend;
pub use backend::{
    AudioBackend, AudioBackendConfig, AudioError, BufferId, NullAudioBackend,
};
pub use spatial::{attenuation, AttenuationModel};

use serde::Deserialize;

use crate::foundation::math::Vec3;
use crate::handle::{Handle, HandleStore};
use crate::resource::{ResourceData, ResourceKey, ResourceSystem, ResourceType};

/// Whether a sound mixes flat or positions itself in the world
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AudioSpace {
    /// Flat playback, tracks the listener
    #[default]
    TwoD,
    /// Spatialized playback with distance attenuation
    ThreeD,
}

fn default_channel_count() -> u32 {
    8
}

fn default_resource_count() -> u32 {
    32
}

fn default_frequency() -> u32 {
    44_100
}

fn default_output_channels() -> u32 {
    2
}

fn default_chunk_size() -> u32 {
    4096 * 16
}

/// Audio system configuration, parsed from RON.
///
/// A parse failure falls back to defaults with a warning; out-of-range
/// values are clamped by [`Self::sanitize`].
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct AudioSystemConfig {
    /// Backend selector recorded in the scene config
    #[serde(default)]
    pub backend_plugin_name: String,
    /// Mixer channel count (minimum 4)
    #[serde(default = "default_channel_count")]
    pub audio_channel_count: u32,
    /// Concurrent base resource slots (minimum 32)
    #[serde(default = "default_resource_count")]
    pub max_resource_count: u32,
    /// Device sample rate in Hz
    #[serde(default = "default_frequency")]
    pub frequency: u32,
    /// Device output channels, clamped to 1..=2
    #[serde(default = "default_output_channels")]
    pub channel_count: u32,
    /// Samples per streamed chunk
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u32,
}

impl Default for AudioSystemConfig {
    fn default() -> Self {
        Self {
            backend_plugin_name: String::new(),
            audio_channel_count: default_channel_count(),
            max_resource_count: default_resource_count(),
            frequency: default_frequency(),
            channel_count: default_output_channels(),
            chunk_size: default_chunk_size(),
        }
    }
}

impl AudioSystemConfig {
    /// Parse a RON config, falling back to defaults on failure
    pub fn from_ron(text: &str) -> Self {
        match ron::from_str::<Self>(text) {
            Ok(config) => config.sanitize(),
            Err(err) => {
                log::warn!("audio config parse failed, using defaults: {err}");
                Self::default()
            }
        }
    }

    /// Clamp configured values into their supported ranges
    pub fn sanitize(mut self) -> Self {
        self.audio_channel_count = self.audio_channel_count.max(4);
        self.max_resource_count = self.max_resource_count.max(32);
        self.channel_count = self.channel_count.clamp(1, 2);
        self
    }

    fn backend_config(&self) -> AudioBackendConfig {
        AudioBackendConfig {
            frequency: self.frequency,
            channel_count: self.channel_count,
            chunk_size: self.chunk_size,
            max_sources: self.audio_channel_count,
        }
    }
}

/// Per-play state bound to one base resource
#[derive(Debug, Clone)]
pub struct AudioInstance {
    base: usize,
    /// Playback rate in 0.5..=2.0
    pub pitch: f32,
    /// Instance gain in 0..=1
    pub volume: f32,
    /// Emitter position (3D only)
    pub position: Vec3,
    /// Restart at EOF
    pub looping: bool,
    /// Full-volume radius
    pub inner_radius: f32,
    /// Silence radius
    pub outer_radius: f32,
    /// Exponential rolloff power
    pub falloff: f32,
    /// Rolloff shape
    pub attenuation_model: AttenuationModel,
    /// Flat or spatialized
    pub space: AudioSpace,
    trigger_play: bool,
}

impl Default for AudioInstance {
    fn default() -> Self {
        Self {
            base: usize::MAX,
            pitch: 1.0,
            volume: 1.0,
            position: Vec3::zeros(),
            looping: false,
            inner_radius: 1.0,
            outer_radius: 50.0,
            falloff: 1.0,
            attenuation_model: AttenuationModel::Linear,
            space: AudioSpace::TwoD,
            trigger_play: false,
        }
    }
}

struct BaseResource {
    key: ResourceKey,
    is_streaming: bool,
    buffer: Option<BufferId>,
    instances: Vec<Handle>,
}

#[derive(Clone, Copy)]
struct Channel {
    volume: f32,
    bound: Option<(usize, Handle)>,
}

/// Frontend audio mixer
pub struct AudioSystem {
    config: AudioSystemConfig,
    backend: Box<dyn AudioBackend>,
    bases: Vec<Option<BaseResource>>,
    instances: HandleStore<AudioInstance>,
    channels: Vec<Channel>,
    master_volume: f32,
    listener_position: Vec3,
}

impl AudioSystem {
    /// Initialise the backend and the mixer channels
    pub fn new(
        config: AudioSystemConfig,
        mut backend: Box<dyn AudioBackend>,
    ) -> Result<Self, AudioError> {
        let config = config.sanitize();
        backend.init(&config.backend_config())?;
        let bases = (0..config.max_resource_count).map(|_| None).collect();
        let channels = vec![
            Channel {
                volume: 1.0,
                bound: None,
            };
            config.audio_channel_count as usize
        ];
        Ok(Self {
            config,
            backend,
            bases,
            instances: HandleStore::with_capacity(16),
            channels,
            master_volume: 1.0,
            listener_position: Vec3::zeros(),
        })
    }

    /// Active configuration
    pub fn config(&self) -> &AudioSystemConfig {
        &self.config
    }

    /// Acquire a playable instance of an asset.
    ///
    /// The instance handle is valid immediately; the asset request fires on
    /// first acquire and later instances share the base slot. Looping
    /// defaults to true for streaming sounds.
    pub fn acquire(
        &mut self,
        name: &str,
        package: &str,
        is_streaming: bool,
        space: AudioSpace,
        resources: &mut ResourceSystem,
    ) -> Result<Handle, AudioError> {
        let key = ResourceKey::new(name, package);
        let slot = match self.find_base(&key) {
            Some(slot) => slot,
            None => {
                let slot = self
                    .bases
                    .iter()
                    .position(Option::is_none)
                    .ok_or(AudioError::ResourceSlotsExhausted(
                        self.config.max_resource_count,
                    ))?;
                let listen_key = key.clone();
                resources.request(
                    key.clone(),
                    ResourceType::Audio,
                    Box::new(move |_, result| {
                        if let Err(err) = result {
                            log::error!(
                                "audio asset '{}:{}' failed to load: {err}",
                                listen_key.package,
                                listen_key.name
                            );
                        }
                    }),
                )?;
                self.bases[slot] = Some(BaseResource {
                    key,
                    is_streaming,
                    buffer: None,
                    instances: Vec::new(),
                });
                slot
            }
        };

        let handle = self.instances.acquire(AudioInstance {
            base: slot,
            looping: is_streaming,
            space,
            ..AudioInstance::default()
        });
        if let Some(base) = self.bases[slot].as_mut() {
            base.instances.push(handle);
        }
        Ok(handle)
    }

    /// Play an instance on the first free channel
    pub fn play(&mut self, instance: Handle) -> Result<u32, AudioError> {
        let channel = self
            .channels
            .iter()
            .position(|c| c.bound.is_none())
            .ok_or(AudioError::NoFreeChannel)? as u32;
        self.play_on_channel(channel, instance)?;
        Ok(channel)
    }

    /// Bind an instance to a specific channel and start it.
    ///
    /// When the asset has not finished loading the play is deferred via
    /// the instance's trigger and starts from the per-frame update.
    pub fn play_on_channel(&mut self, channel: u32, instance: Handle) -> Result<(), AudioError> {
        if channel as usize >= self.channels.len() {
            return Err(AudioError::InvalidChannel(channel));
        }
        let state = self.instances.get_mut(instance)?;
        let base_index = state.base;
        let space = state.space;
        let looping = state.looping;
        let base = self.bases[base_index]
            .as_ref()
            .ok_or(AudioError::InvalidHandle(
                crate::handle::HandleError::Stale {
                    index: instance.index,
                },
            ))?;

        if self.channels[channel as usize].bound.is_some() {
            self.backend.stop(channel);
        }

        match base.buffer {
            Some(buffer) => {
                self.backend
                    .play(channel, buffer, space, looping, false)?;
            }
            None => {
                self.instances
                    .get_mut(instance)
                    .map(|state| state.trigger_play = true)?;
            }
        }
        self.channels[channel as usize].bound = Some((base_index, instance));
        Ok(())
    }

    /// Stop whatever is playing on a channel
    pub fn stop(&mut self, channel: u32) {
        if let Some(slot) = self.channels.get_mut(channel as usize) {
            slot.bound = None;
            self.backend.stop(channel);
        }
    }

    /// Whether an instance is bound to an audible channel
    pub fn is_playing(&self, instance: Handle) -> bool {
        self.channels.iter().enumerate().any(|(index, channel)| {
            channel.bound.is_some_and(|(_, bound)| bound == instance)
                && (self.backend.is_playing(index as u32)
                    || self
                        .instances
                        .get(instance)
                        .is_ok_and(|state| state.trigger_play))
        })
    }

    /// Set an instance's gain, clamped to 0..=1
    pub fn volume_set(&mut self, instance: Handle, volume: f32) -> Result<(), AudioError> {
        self.instances.get_mut(instance)?.volume = volume.clamp(0.0, 1.0);
        Ok(())
    }

    /// Set an instance's pitch, clamped to 0.5..=2.0
    pub fn pitch_set(&mut self, instance: Handle, pitch: f32) -> Result<(), AudioError> {
        self.instances.get_mut(instance)?.pitch = pitch.clamp(0.5, 2.0);
        Ok(())
    }

    /// Move an instance's emitter
    pub fn position_set(&mut self, instance: Handle, position: Vec3) -> Result<(), AudioError> {
        self.instances.get_mut(instance)?.position = position;
        Ok(())
    }

    /// Set a mixer channel's gain, clamped to 0..=1
    pub fn channel_volume_set(&mut self, channel: u32, volume: f32) {
        if let Some(slot) = self.channels.get_mut(channel as usize) {
            slot.volume = volume.clamp(0.0, 1.0);
        }
    }

    /// Set the master gain, clamped to 0..=1
    pub fn master_volume_set(&mut self, volume: f32) {
        self.master_volume = volume.clamp(0.0, 1.0);
    }

    /// Move the listener; 3D attenuation and 2D tracking follow it
    pub fn listener_position_set(&mut self, position: Vec3) {
        self.listener_position = position;
    }

    /// Per-frame update: adopt finished loads, consume deferred plays, and
    /// mix channel gains
    pub fn update(&mut self, resources: &ResourceSystem) {
        self.backend.listener_position_set(self.listener_position);
        self.adopt_loads(resources);

        for index in 0..self.channels.len() {
            let channel = index as u32;
            let Some((base_index, instance)) = self.channels[index].bound else {
                continue;
            };
            let Ok(state) = self.instances.get(instance) else {
                // Instance released mid-play.
                self.channels[index].bound = None;
                self.backend.stop(channel);
                continue;
            };
            let buffer = self.bases[base_index].as_ref().and_then(|b| b.buffer);

            if state.trigger_play {
                if let Some(buffer) = buffer {
                    let space = state.space;
                    let looping = state.looping;
                    if let Err(err) = self.backend.play(channel, buffer, space, looping, false) {
                        log::error!("deferred play failed on channel {channel}: {err}");
                    }
                    if let Ok(state) = self.instances.get_mut(instance) {
                        state.trigger_play = false;
                    }
                }
            }

            let state = match self.instances.get(instance) {
                Ok(state) => state.clone(),
                Err(_) => continue,
            };
            let spatial_gain = match state.space {
                AudioSpace::TwoD => 1.0,
                AudioSpace::ThreeD => attenuation(
                    (state.position - self.listener_position).norm(),
                    state.inner_radius,
                    state.outer_radius,
                    state.falloff,
                    state.attenuation_model,
                ),
            };
            let gain =
                spatial_gain * state.volume * self.channels[index].volume * self.master_volume;
            self.backend.gain_set(channel, gain);
            self.backend.pitch_set(channel, state.pitch);
            let position = match state.space {
                // Flat sounds ride the listener so device panning stays centred.
                AudioSpace::TwoD => self.listener_position,
                AudioSpace::ThreeD => state.position,
            };
            self.backend.position_set(channel, position);

            if !state.trigger_play && !self.backend.is_playing(channel) {
                self.channels[index].bound = None;
            }
        }

        self.backend.update();
    }

    /// Release an instance.
    ///
    /// The last instance of a base resource unloads the backend buffer,
    /// drops the asset refcount and frees the slot.
    pub fn release(
        &mut self,
        instance: Handle,
        resources: &mut ResourceSystem,
    ) -> Result<(), AudioError> {
        let state = self.instances.release(instance)?;
        for index in 0..self.channels.len() {
            if self.channels[index]
                .bound
                .is_some_and(|(_, bound)| bound == instance)
            {
                self.channels[index].bound = None;
                self.backend.stop(index as u32);
            }
        }

        let Some(base) = self.bases.get_mut(state.base).and_then(Option::as_mut) else {
            return Ok(());
        };
        base.instances.retain(|h| *h != instance);
        if base.instances.is_empty() {
            if let Some(buffer) = base.buffer {
                self.backend.buffer_unload(buffer);
            }
            let key = base.key.clone();
            self.bases[state.base] = None;
            resources.release(&key)?;
        }
        Ok(())
    }

    /// Stop everything and tear the backend down
    pub fn shutdown(&mut self) {
        for channel in &mut self.channels {
            channel.bound = None;
        }
        self.backend.shutdown();
    }

    fn find_base(&self, key: &ResourceKey) -> Option<usize> {
        self.bases
            .iter()
            .position(|slot| slot.as_ref().is_some_and(|base| base.key == *key))
    }

    fn adopt_loads(&mut self, resources: &ResourceSystem) {
        for slot in self.bases.iter_mut().flatten() {
            if slot.buffer.is_some() {
                continue;
            }
            let Some(data) = resources.get(&slot.key) else {
                continue;
            };
            let ResourceData::Audio(pcm) = data.as_ref() else {
                log::error!(
                    "audio asset '{}:{}' resolved to a non-audio payload",
                    slot.key.package,
                    slot.key.name
                );
                continue;
            };
            match self
                .backend
                .buffer_load(std::sync::Arc::new(pcm.clone()), slot.is_streaming)
            {
                Ok(buffer) => slot.buffer = Some(buffer),
                Err(err) => log::error!(
                    "audio buffer upload failed for '{}:{}': {err}",
                    slot.key.package,
                    slot.key.name
                ),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::resource::{AudioPcm, ResourceError, ResourceLoader};
    use approx::assert_relative_eq;
    use std::sync::Arc;
    use std::time::Duration;

    struct PcmLoader;

    impl ResourceLoader for PcmLoader {
        fn load(
            &self,
            _key: &ResourceKey,
            _resource_type: ResourceType,
        ) -> Result<ResourceData, ResourceError> {
            Ok(ResourceData::Audio(AudioPcm {
                sample_rate: 44_100,
                channels: 1,
                samples: vec![0; 128],
                mono: None,
            }))
        }
    }

    fn system() -> (AudioSystem, ResourceSystem) {
        let audio = AudioSystem::new(
            AudioSystemConfig::default(),
            Box::new(NullAudioBackend::new()),
        )
        .expect("audio init");
        (audio, ResourceSystem::new(Arc::new(PcmLoader)))
    }

    fn pump_until_loaded(resources: &mut ResourceSystem, key: &ResourceKey) {
        for _ in 0..100 {
            resources.pump_completions();
            if resources.get(key).is_some() {
                return;
            }
            std::thread::sleep(Duration::from_millis(2));
        }
        panic!("resource never loaded");
    }

    #[test]
    fn test_config_parse_failure_falls_back_to_defaults() {
        let config = AudioSystemConfig::from_ron("this is not ron");
        assert_eq!(config, AudioSystemConfig::default());
    }

    #[test]
    fn test_config_clamps_minimums() {
        let config = AudioSystemConfig::from_ron(
            r#"(audio_channel_count: 1, max_resource_count: 2, channel_count: 7)"#,
        );
        assert_eq!(config.audio_channel_count, 4);
        assert_eq!(config.max_resource_count, 32);
        assert_eq!(config.channel_count, 2);
    }

    #[test]
    fn test_play_before_ready_defers_then_starts() {
        let (mut audio, mut resources) = system();
        let instance = audio
            .acquire("engine_hum", "sounds", false, AudioSpace::TwoD, &mut resources)
            .expect("acquire");

        let channel = audio.play(instance).expect("play");
        // Bound but deferred: the asset has not arrived yet.
        assert!(audio.is_playing(instance));

        pump_until_loaded(&mut resources, &ResourceKey::new("engine_hum", "sounds"));
        audio.update(&resources);

        assert!(audio.backend.is_playing(channel));
        assert!(audio.is_playing(instance));
    }

    #[test]
    fn test_last_instance_release_frees_asset() {
        let (mut audio, mut resources) = system();
        let key = ResourceKey::new("shot", "sounds");
        let first = audio
            .acquire("shot", "sounds", false, AudioSpace::TwoD, &mut resources)
            .expect("acquire");
        let second = audio
            .acquire("shot", "sounds", false, AudioSpace::TwoD, &mut resources)
            .expect("acquire");
        pump_until_loaded(&mut resources, &key);
        audio.update(&resources);
        assert_eq!(resources.refcount(&key), 1);

        audio.release(first, &mut resources).expect("release");
        assert_eq!(resources.refcount(&key), 1);
        audio.release(second, &mut resources).expect("release");
        assert_eq!(resources.refcount(&key), 0);
        assert!(audio.instances.get(second).is_err());
    }

    /// Null backend wrapper that shares its recorded gains with the test
    struct RecordingBackend {
        inner: NullAudioBackend,
        gains: std::rc::Rc<std::cell::RefCell<Vec<f32>>>,
    }

    impl AudioBackend for RecordingBackend {
        fn init(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
            self.gains
                .borrow_mut()
                .resize(config.max_sources as usize, 1.0);
            self.inner.init(config)
        }

        fn shutdown(&mut self) {
            self.inner.shutdown();
        }

        fn buffer_load(
            &mut self,
            pcm: Arc<AudioPcm>,
            streaming: bool,
        ) -> Result<BufferId, AudioError> {
            self.inner.buffer_load(pcm, streaming)
        }

        fn buffer_unload(&mut self, buffer: BufferId) {
            self.inner.buffer_unload(buffer);
        }

        fn play(
            &mut self,
            channel: u32,
            buffer: BufferId,
            space: AudioSpace,
            looping: bool,
            use_mono: bool,
        ) -> Result<(), AudioError> {
            self.inner.play(channel, buffer, space, looping, use_mono)
        }

        fn stop(&mut self, channel: u32) {
            self.inner.stop(channel);
        }

        fn is_playing(&self, channel: u32) -> bool {
            self.inner.is_playing(channel)
        }

        fn gain_set(&mut self, channel: u32, gain: f32) {
            self.gains.borrow_mut()[channel as usize] = gain;
            self.inner.gain_set(channel, gain);
        }

        fn pitch_set(&mut self, channel: u32, pitch: f32) {
            self.inner.pitch_set(channel, pitch);
        }

        fn position_set(&mut self, channel: u32, position: Vec3) {
            self.inner.position_set(channel, position);
        }

        fn listener_position_set(&mut self, position: Vec3) {
            self.inner.listener_position_set(position);
        }

        fn update(&mut self) {
            self.inner.update();
        }
    }

    #[test]
    fn test_mixing_gain_combines_volumes() {
        let gains = std::rc::Rc::new(std::cell::RefCell::new(Vec::new()));
        let mut audio = AudioSystem::new(
            AudioSystemConfig::default(),
            Box::new(RecordingBackend {
                inner: NullAudioBackend::new(),
                gains: std::rc::Rc::clone(&gains),
            }),
        )
        .expect("audio init");
        let mut resources = ResourceSystem::new(Arc::new(PcmLoader));

        let key = ResourceKey::new("beep", "sounds");
        let instance = audio
            .acquire("beep", "sounds", false, AudioSpace::ThreeD, &mut resources)
            .expect("acquire");
        pump_until_loaded(&mut resources, &key);

        // Midpoint of the default 1.0..50.0 attenuation band: spatial gain 0.5
        audio
            .position_set(instance, Vec3::new(0.0, 0.0, 25.5))
            .expect("position");
        audio.volume_set(instance, 0.8).expect("volume");
        let channel = audio.play(instance).expect("play");
        audio.channel_volume_set(channel, 0.5);
        audio.master_volume_set(0.5);
        audio.update(&resources);

        // 0.5 (distance) * 0.8 (instance) * 0.5 (channel) * 0.5 (master)
        assert_relative_eq!(gains.borrow()[channel as usize], 0.1, epsilon = 1e-3);
    }

    #[test]
    fn test_no_free_channel_errors() {
        let (mut audio, mut resources) = system();
        let channels = audio.config().audio_channel_count;
        let mut instances = Vec::new();
        for index in 0..=channels {
            let instance = audio
                .acquire(
                    &format!("sound_{index}"),
                    "sounds",
                    false,
                    AudioSpace::TwoD,
                    &mut resources,
                )
                .expect("acquire");
            instances.push(instance);
        }
        for instance in instances.iter().take(channels as usize) {
            audio.play(*instance).expect("play");
        }

        assert_eq!(
            audio.play(instances[channels as usize]),
            Err(AudioError::NoFreeChannel)
        );
    }

    #[test]
    fn test_streaming_acquire_defaults_to_looping() {
        let (mut audio, mut resources) = system();
        let streamed = audio
            .acquire("music", "sounds", true, AudioSpace::TwoD, &mut resources)
            .expect("acquire");
        let one_shot = audio
            .acquire("click", "sounds", false, AudioSpace::TwoD, &mut resources)
            .expect("acquire");

        assert!(audio.instances.get(streamed).expect("get").looping);
        assert!(!audio.instances.get(one_shot).expect("get").looping);
    }
}
