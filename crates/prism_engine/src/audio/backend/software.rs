//! Software device backend
//!
//! Emulates a playback device in process. Each channel owns a source with
//! a worker thread; the worker polls roughly every 2 ms, advances a
//! sample-accurate playhead from wall-clock time, and refills streaming
//! chunks through [`stream_data`]. Source state lives behind a per-source
//! mutex; `trigger_play` and `trigger_exit` are the only commands crossing
//! the thread boundary.

use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use crate::audio::backend::{AudioBackend, AudioBackendConfig, AudioError, BufferId};
use crate::audio::AudioSpace;
use crate::foundation::math::Vec3;
use crate::resource::AudioPcm;

const POLL_INTERVAL: Duration = Duration::from_millis(2);
// Chunks queued ahead of the playhead per streaming source
const QUEUE_DEPTH: usize = 2;

/// Streaming read state over one PCM payload
pub struct StreamCursor {
    pcm: Arc<AudioPcm>,
    /// Read from the downmixed mono data instead of the interleaved samples
    pub use_mono: bool,
    /// Next sample index to copy
    pub cursor: usize,
    /// Samples remaining before EOF
    pub total_samples_left: usize,
    /// Samples per refill chunk
    pub chunk_size: usize,
}

impl StreamCursor {
    /// Create a cursor at the start of the payload
    pub fn new(pcm: Arc<AudioPcm>, use_mono: bool, chunk_size: usize) -> Self {
        let total = Self::sample_count(&pcm, use_mono);
        Self {
            pcm,
            use_mono,
            cursor: 0,
            total_samples_left: total,
            chunk_size,
        }
    }

    fn sample_count(pcm: &AudioPcm, use_mono: bool) -> usize {
        if use_mono {
            pcm.mono.as_ref().map_or(0, Vec::len)
        } else {
            pcm.samples.len()
        }
    }

    fn data(&self) -> &[i16] {
        if self.use_mono {
            self.pcm.mono.as_deref().unwrap_or(&[])
        } else {
            &self.pcm.samples
        }
    }

    /// Rewind to the start of the payload
    pub fn rewind(&mut self) {
        self.cursor = 0;
        self.total_samples_left = Self::sample_count(&self.pcm, self.use_mono);
    }
}

/// Copy the next chunk of PCM into `out`.
///
/// Returns false at EOF without writing; the caller decides whether to
/// rewind (loop emulation) or stop.
pub fn stream_data(cursor: &mut StreamCursor, out: &mut Vec<i16>) -> bool {
    if cursor.total_samples_left == 0 {
        return false;
    }
    let take = cursor.chunk_size.min(cursor.total_samples_left);
    let data = cursor.data();
    out.clear();
    out.extend_from_slice(&data[cursor.cursor..cursor.cursor + take]);
    cursor.cursor += take;
    cursor.total_samples_left -= take;
    true
}

struct SourceState {
    stream: Option<StreamCursor>,
    streaming: bool,
    looping: bool,
    playing: bool,
    trigger_play: bool,
    trigger_exit: bool,
    // Queued-but-unplayed samples, refilled by the worker
    queued_samples: usize,
    started: Option<Instant>,
    consumed_samples: usize,
    sample_rate: u32,
}

impl SourceState {
    fn new() -> Self {
        Self {
            stream: None,
            streaming: false,
            looping: false,
            playing: false,
            trigger_play: false,
            trigger_exit: false,
            queued_samples: 0,
            started: None,
            consumed_samples: 0,
            sample_rate: 44_100,
        }
    }

    /// Refill streaming chunks until the queue is full. Returns false when
    /// the source ran out of data and must stop.
    fn refill(&mut self, scratch: &mut Vec<i16>) -> bool {
        let target = match &self.stream {
            Some(stream) => stream.chunk_size * QUEUE_DEPTH,
            None => return false,
        };
        while self.queued_samples < target {
            let Some(stream) = self.stream.as_mut() else {
                return false;
            };
            if stream_data(stream, scratch) {
                self.queued_samples += scratch.len();
                continue;
            }
            if self.looping {
                // Loop emulation: rewind and retry the refill.
                stream.rewind();
                continue;
            }
            return self.queued_samples > 0;
        }
        true
    }

    fn advance_playhead(&mut self) {
        let Some(started) = self.started else { return };
        let elapsed = started.elapsed().as_secs_f64();
        let played = (elapsed * f64::from(self.sample_rate)) as usize;
        let newly = played.saturating_sub(self.consumed_samples);
        self.consumed_samples = played;
        self.queued_samples = self.queued_samples.saturating_sub(newly);
    }
}

struct Source {
    state: Arc<Mutex<SourceState>>,
    worker: Option<JoinHandle<()>>,
}

impl Source {
    fn spawn(index: u32, sample_rate: u32) -> Self {
        let state = Arc::new(Mutex::new(SourceState {
            sample_rate,
            ..SourceState::new()
        }));
        let thread_state = Arc::clone(&state);
        let worker = std::thread::Builder::new()
            .name(format!("prism-audio-source-{index}"))
            .spawn(move || {
                let mut scratch: Vec<i16> = Vec::new();
                loop {
                    std::thread::sleep(POLL_INTERVAL);
                    let mut st = match thread_state.lock() {
                        Ok(st) => st,
                        Err(_) => break,
                    };
                    if st.trigger_exit {
                        break;
                    }
                    if st.trigger_play && st.stream.is_some() {
                        st.trigger_play = false;
                        st.playing = true;
                        st.started = Some(Instant::now());
                        st.consumed_samples = 0;
                        st.queued_samples = 0;
                    }
                    if !st.playing {
                        continue;
                    }
                    st.advance_playhead();
                    if st.streaming {
                        if !st.refill(&mut scratch) && st.queued_samples == 0 {
                            // Buffer exhaustion is a graceful stop.
                            st.playing = false;
                        }
                    } else if st.queued_samples == 0 {
                        if st.looping {
                            if let Some(stream) = &mut st.stream {
                                stream.rewind();
                            }
                            let whole = st
                                .stream
                                .as_ref()
                                .map_or(0, |s| s.total_samples_left);
                            st.queued_samples = whole;
                            if let Some(stream) = &mut st.stream {
                                stream.total_samples_left = 0;
                            }
                        } else {
                            st.playing = false;
                        }
                    }
                }
            })
            .ok();
        if worker.is_none() {
            log::error!("failed to spawn audio source worker {index}");
        }
        Self { state, worker }
    }

    fn stop_worker(&mut self) {
        if let Ok(mut st) = self.state.lock() {
            st.trigger_exit = true;
        }
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}

/// In-process device backend with streaming source workers
pub struct SoftwareAudioBackend {
    config: AudioBackendConfig,
    sources: Vec<Source>,
    buffers: Vec<Option<(Arc<AudioPcm>, bool)>>,
    listener: Vec3,
    gains: Vec<f32>,
    pitches: Vec<f32>,
    positions: Vec<Vec3>,
}

impl SoftwareAudioBackend {
    /// Create an uninitialised backend; call [`AudioBackend::init`]
    pub fn new() -> Self {
        Self {
            config: AudioBackendConfig::default(),
            sources: Vec::new(),
            buffers: Vec::new(),
            listener: Vec3::zeros(),
            gains: Vec::new(),
            pitches: Vec::new(),
            positions: Vec::new(),
        }
    }
}

impl Default for SoftwareAudioBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for SoftwareAudioBackend {
    fn drop(&mut self) {
        self.shutdown();
    }
}

impl AudioBackend for SoftwareAudioBackend {
    fn init(&mut self, config: &AudioBackendConfig) -> Result<(), AudioError> {
        if config.channel_count == 0 || config.channel_count > 2 {
            return Err(AudioError::InitFailed(format!(
                "unsupported output channel count {}",
                config.channel_count
            )));
        }
        self.config = config.clone();
        self.sources = (0..config.max_sources)
            .map(|index| Source::spawn(index, config.frequency))
            .collect();
        self.gains = vec![1.0; config.max_sources as usize];
        self.pitches = vec![1.0; config.max_sources as usize];
        self.positions = vec![Vec3::zeros(); config.max_sources as usize];
        log::info!(
            "software audio backend up: {} Hz, {} outputs, {} sources",
            config.frequency,
            config.channel_count,
            config.max_sources
        );
        Ok(())
    }

    fn shutdown(&mut self) {
        for source in &mut self.sources {
            source.stop_worker();
        }
        self.sources.clear();
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
        space: AudioSpace,
        looping: bool,
        use_mono: bool,
    ) -> Result<(), AudioError> {
        let (pcm, streaming) = self
            .buffers
            .get(buffer.0 as usize)
            .and_then(Option::as_ref)
            .cloned()
            .ok_or(AudioError::UnknownBuffer(buffer))?;
        let source = self
            .sources
            .get(channel as usize)
            .ok_or(AudioError::InvalidChannel(channel))?;

        // Stereo played in 3D spatializes through the mono downmix.
        let use_mono = use_mono || (space == AudioSpace::ThreeD && pcm.channels > 1);
        let chunk_size = self.config.chunk_size as usize;
        let mut st = source
            .state
            .lock()
            .map_err(|_| AudioError::InitFailed("audio source mutex poisoned".into()))?;
        let mut cursor = StreamCursor::new(pcm, use_mono, chunk_size);
        if !streaming {
            // Whole payload queued up front; the worker only tracks the end.
            st.queued_samples = cursor.total_samples_left;
            cursor.total_samples_left = 0;
        }
        st.stream = Some(cursor);
        st.streaming = streaming;
        st.looping = looping;
        st.trigger_play = true;
        Ok(())
    }

    fn stop(&mut self, channel: u32) {
        if let Some(source) = self.sources.get(channel as usize) {
            if let Ok(mut st) = source.state.lock() {
                st.playing = false;
                st.trigger_play = false;
                st.stream = None;
                st.queued_samples = 0;
            }
        }
    }

    fn is_playing(&self, channel: u32) -> bool {
        self.sources.get(channel as usize).is_some_and(|source| {
            source
                .state
                .lock()
                .map(|st| st.playing || st.trigger_play)
                .unwrap_or(false)
        })
    }

    fn gain_set(&mut self, channel: u32, gain: f32) {
        if let Some(slot) = self.gains.get_mut(channel as usize) {
            *slot = gain.clamp(0.0, 1.0);
        }
    }

    fn pitch_set(&mut self, channel: u32, pitch: f32) {
        if let Some(slot) = self.pitches.get_mut(channel as usize) {
            *slot = pitch.clamp(0.5, 2.0);
        }
    }

    fn position_set(&mut self, channel: u32, position: Vec3) {
        if let Some(slot) = self.positions.get_mut(channel as usize) {
            *slot = position;
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

    fn pcm(samples: usize) -> Arc<AudioPcm> {
        Arc::new(AudioPcm {
            sample_rate: 44_100,
            channels: 1,
            samples: (0..samples as i16).collect(),
            mono: None,
        })
    }

    #[test]
    fn test_stream_data_chunks_until_eof() {
        let mut cursor = StreamCursor::new(pcm(10), false, 4);
        let mut out = Vec::new();

        assert!(stream_data(&mut cursor, &mut out));
        assert_eq!(out, vec![0, 1, 2, 3]);
        assert!(stream_data(&mut cursor, &mut out));
        assert_eq!(out, vec![4, 5, 6, 7]);
        assert!(stream_data(&mut cursor, &mut out));
        assert_eq!(out, vec![8, 9]);
        // EOF: nothing written, false returned
        assert!(!stream_data(&mut cursor, &mut out));
        assert_eq!(cursor.total_samples_left, 0);
    }

    #[test]
    fn test_rewind_resets_total() {
        let mut cursor = StreamCursor::new(pcm(6), false, 6);
        let mut out = Vec::new();
        assert!(stream_data(&mut cursor, &mut out));
        assert!(!stream_data(&mut cursor, &mut out));

        cursor.rewind();
        assert_eq!(cursor.total_samples_left, 6);
        assert!(stream_data(&mut cursor, &mut out));
    }

    #[test]
    fn test_looping_refill_reads_past_eof() {
        let mut state = SourceState::new();
        state.stream = Some(StreamCursor::new(pcm(6), false, 4));
        state.streaming = true;
        state.looping = true;

        let mut scratch = Vec::new();
        assert!(state.refill(&mut scratch));
        // Queue target is 2 chunks (8 samples); a 6-sample payload must
        // wrap to satisfy it.
        assert!(state.queued_samples >= 8);
    }

    #[test]
    fn test_non_looping_refill_stops_at_eof() {
        let mut state = SourceState::new();
        state.stream = Some(StreamCursor::new(pcm(6), false, 4));
        state.streaming = true;
        state.looping = false;

        let mut scratch = Vec::new();
        // First refill drains the whole payload
        assert!(state.refill(&mut scratch));
        assert_eq!(state.queued_samples, 6);

        // Playhead consumed everything; next refill reports exhaustion
        state.queued_samples = 0;
        assert!(!state.refill(&mut scratch));
    }

    #[test]
    fn test_play_before_worker_sets_trigger() {
        let mut backend = SoftwareAudioBackend::new();
        backend
            .init(&AudioBackendConfig {
                max_sources: 1,
                ..AudioBackendConfig::default()
            })
            .expect("init");
        let buffer = backend.buffer_load(pcm(64), false).expect("load");
        backend
            .play(0, buffer, AudioSpace::TwoD, false, false)
            .expect("play");

        // trigger_play counts as playing until the worker consumes it
        assert!(backend.is_playing(0));
        backend.stop(0);
        assert!(!backend.is_playing(0));
    }
}
