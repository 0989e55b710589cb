//! Resource/asset request layer
//!
//! Asynchronous asset acquisition with per-request listeners and
//! main-thread completion delivery. Resources are refcounted and keyed by
//! (name, package); the actual file parsing is an external concern behind
//! the [`ResourceLoader`] trait. Completions are produced on the loader
//! thread and queued; observed state only changes when the main thread
//! drains the queue at the top of update.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread::JoinHandle;

use thiserror::Error;

/// Errors surfaced by the resource layer
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ResourceError {
    /// The loader failed to produce the asset
    #[error("failed to load resource '{name}' from package '{package}': {reason}")]
    LoadFailed {
        /// Resource name
        name: String,
        /// Package name
        package: String,
        /// Loader-provided reason
        reason: String,
    },

    /// Released or queried a resource that is not tracked
    #[error("resource '{name}' in package '{package}' is not registered")]
    NotRegistered {
        /// Resource name
        name: String,
        /// Package name
        package: String,
    },

    /// The loader thread is gone (engine shutting down)
    #[error("resource loader thread unavailable")]
    LoaderUnavailable,
}

/// Resource identity: every resource is keyed by (name, package)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ResourceKey {
    /// Asset name within the package
    pub name: String,
    /// Package the asset belongs to
    pub package: String,
}

impl ResourceKey {
    /// Build a key from name and package
    pub fn new(name: impl Into<String>, package: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            package: package.into(),
        }
    }
}

/// Categories of loadable assets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceType {
    /// Raw bytes
    Binary,
    /// UTF-8 text (configs, descriptors)
    Text,
    /// Decoded PCM audio
    Audio,
    /// Static mesh geometry
    StaticMesh,
}

/// Decoded PCM payload produced by an audio loader.
///
/// Interleaved signed 16-bit samples. For stereo assets the loader also
/// provides a downmixed mono copy so 3D playback can spatialize.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioPcm {
    /// Output sample rate in Hz
    pub sample_rate: u32,
    /// Interleaved channel count (1 or 2)
    pub channels: u8,
    /// Interleaved samples
    pub samples: Vec<i16>,
    /// Mono downmix, present when `channels == 2`
    pub mono: Option<Vec<i16>>,
}

impl AudioPcm {
    /// Total sample count per channel
    pub fn samples_per_channel(&self) -> usize {
        self.samples.len() / usize::from(self.channels.max(1))
    }
}

/// Loaded resource payload
#[derive(Debug, Clone, PartialEq)]
pub enum ResourceData {
    /// Raw bytes
    Binary(Vec<u8>),
    /// UTF-8 text
    Text(String),
    /// Decoded PCM audio
    Audio(AudioPcm),
    /// Mesh vertex/index payload: (vertex bytes, indices)
    StaticMesh(Vec<u8>, Vec<u32>),
}

/// Loader contract: turns a key into a decoded payload.
///
/// Implementations run on the loader thread and must be `Send + Sync`.
/// Asset file format parsing lives behind this trait, outside the engine
/// core.
pub trait ResourceLoader: Send + Sync {
    /// Produce the payload for a key
    fn load(&self, key: &ResourceKey, resource_type: ResourceType)
        -> Result<ResourceData, ResourceError>;
}

/// Per-request completion listener, invoked on the main thread during
/// [`ResourceSystem::pump_completions`]
pub type ResourceListener =
    Box<dyn FnMut(&ResourceKey, Result<Arc<ResourceData>, ResourceError>)>;

enum EntryState {
    Pending { listeners: Vec<ResourceListener> },
    Loaded(Arc<ResourceData>),
}

struct Entry {
    refcount: usize,
    state: EntryState,
}

enum Job {
    Load(ResourceKey, ResourceType),
}

type CompletionMessage = (ResourceKey, Result<ResourceData, ResourceError>);

/// Refcounted asynchronous resource system.
///
/// One loader thread services requests in order; completions are delivered
/// on the main thread only.
pub struct ResourceSystem {
    entries: HashMap<ResourceKey, Entry>,
    loader: Arc<dyn ResourceLoader>,
    jobs: Option<mpsc::Sender<Job>>,
    completions: mpsc::Receiver<CompletionMessage>,
    // Listeners for already-loaded resources, delivered on the next pump so
    // completion always happens at a predictable point in the frame.
    ready: Vec<(ResourceKey, ResourceListener)>,
    worker: Option<JoinHandle<()>>,
}

impl ResourceSystem {
    /// Create the system and spawn its loader thread
    pub fn new(loader: Arc<dyn ResourceLoader>) -> Self {
        let (job_tx, job_rx) = mpsc::channel::<Job>();
        let (completion_tx, completion_rx) = mpsc::channel::<CompletionMessage>();

        let thread_loader = Arc::clone(&loader);
        let worker = std::thread::Builder::new()
            .name("prism-resource-loader".into())
            .spawn(move || {
                while let Ok(Job::Load(key, resource_type)) = job_rx.recv() {
                    let result = thread_loader.load(&key, resource_type);
                    if completion_tx.send((key, result)).is_err() {
                        break;
                    }
                }
            })
            .ok();

        if worker.is_none() {
            log::error!("failed to spawn resource loader thread; async requests will fail");
        }

        Self {
            entries: HashMap::new(),
            loader,
            jobs: Some(job_tx),
            completions: completion_rx,
            ready: Vec::new(),
            worker,
        }
    }

    /// Request a resource asynchronously.
    ///
    /// Increments the refcount immediately. The listener fires during a
    /// later [`Self::pump_completions`], even when the resource is already
    /// loaded.
    pub fn request(
        &mut self,
        key: ResourceKey,
        resource_type: ResourceType,
        listener: ResourceListener,
    ) -> Result<(), ResourceError> {
        match self.entries.get_mut(&key) {
            Some(entry) => {
                entry.refcount += 1;
                match &mut entry.state {
                    EntryState::Pending { listeners } => listeners.push(listener),
                    EntryState::Loaded(_) => self.ready.push((key, listener)),
                }
                Ok(())
            }
            None => {
                let jobs = self.jobs.as_ref().ok_or(ResourceError::LoaderUnavailable)?;
                jobs.send(Job::Load(key.clone(), resource_type))
                    .map_err(|_| ResourceError::LoaderUnavailable)?;
                self.entries.insert(
                    key,
                    Entry {
                        refcount: 1,
                        state: EntryState::Pending {
                            listeners: vec![listener],
                        },
                    },
                );
                Ok(())
            }
        }
    }

    /// Load a small resource synchronously on the calling thread.
    ///
    /// Intended for configuration-type assets consumed at boot.
    pub fn load_sync(
        &mut self,
        key: ResourceKey,
        resource_type: ResourceType,
    ) -> Result<Arc<ResourceData>, ResourceError> {
        if let Some(entry) = self.entries.get_mut(&key) {
            if let EntryState::Loaded(data) = &entry.state {
                entry.refcount += 1;
                return Ok(Arc::clone(data));
            }
        }
        let data = Arc::new(self.loader.load(&key, resource_type)?);
        let entry = self.entries.entry(key).or_insert(Entry {
            refcount: 0,
            state: EntryState::Loaded(Arc::clone(&data)),
        });
        entry.refcount += 1;
        entry.state = EntryState::Loaded(Arc::clone(&data));
        Ok(data)
    }

    /// Drain queued completions, invoking listeners on the calling (main)
    /// thread. Call at the top of update.
    ///
    /// Returns the number of completions delivered.
    pub fn pump_completions(&mut self) -> usize {
        let mut delivered = 0;

        // Listeners attached to already-loaded resources.
        for (key, mut listener) in self.ready.drain(..) {
            if let Some(entry) = self.entries.get(&key) {
                if let EntryState::Loaded(data) = &entry.state {
                    listener(&key, Ok(Arc::clone(data)));
                    delivered += 1;
                }
            }
        }

        // Fresh loads from the worker.
        while let Ok((key, result)) = self.completions.try_recv() {
            let Some(entry) = self.entries.get_mut(&key) else {
                // Every requester released before the load finished.
                continue;
            };
            let listeners = match &mut entry.state {
                EntryState::Pending { listeners } => std::mem::take(listeners),
                EntryState::Loaded(_) => Vec::new(),
            };
            match result {
                Ok(data) => {
                    let data = Arc::new(data);
                    entry.state = EntryState::Loaded(Arc::clone(&data));
                    for mut listener in listeners {
                        listener(&key, Ok(Arc::clone(&data)));
                        delivered += 1;
                    }
                }
                Err(err) => {
                    log::error!("resource load failed: {err}");
                    // Failed slot is released outright; handles become invalid.
                    self.entries.remove(&key);
                    for mut listener in listeners {
                        listener(&key, Err(err.clone()));
                        delivered += 1;
                    }
                }
            }
        }

        delivered
    }

    /// Loaded payload for a key, if the load has completed
    pub fn get(&self, key: &ResourceKey) -> Option<Arc<ResourceData>> {
        match self.entries.get(key)?.state {
            EntryState::Loaded(ref data) => Some(Arc::clone(data)),
            EntryState::Pending { .. } => None,
        }
    }

    /// Current refcount for a key (0 when unknown)
    pub fn refcount(&self, key: &ResourceKey) -> usize {
        self.entries.get(key).map_or(0, |entry| entry.refcount)
    }

    /// Decrement the refcount; the entry is freed when it reaches zero
    pub fn release(&mut self, key: &ResourceKey) -> Result<(), ResourceError> {
        let entry = self
            .entries
            .get_mut(key)
            .ok_or_else(|| ResourceError::NotRegistered {
                name: key.name.clone(),
                package: key.package.clone(),
            })?;
        entry.refcount = entry.refcount.saturating_sub(1);
        if entry.refcount == 0 {
            self.entries.remove(key);
            log::debug!("resource '{}:{}' released", key.package, key.name);
        }
        Ok(())
    }
}

impl Drop for ResourceSystem {
    fn drop(&mut self) {
        // Closing the job channel ends the worker loop.
        self.jobs = None;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
