//! The duplex pipeline coordinator
//!
//! Arbitrates one microphone, one speaker, and one non-reentrant synthesis
//! model across the capture callback, the transcript poll loop, and a pool
//! of concurrent response workers, under cooperative shutdown.
//!
//! Shared state is deliberately small:
//! - [`PlaybackGate`]: true exactly while a worker owns the speaker. The
//!   capture feed drops chunks while it is raised, so the assistant never
//!   transcribes its own voice.
//! - [`ShutdownSignal`]: one-way flag, checked at the top of the poll loop
//!   and at every worker stage boundary.
//! - two mutexes wrapping the synthesis model and the speaker, so exclusive
//!   access is structural rather than advisory.
//!
//! Transcripts dispatch in finalization order, but playback happens in
//! completion order: answer latency varies per question, and whichever job
//! reaches the playback lock first speaks first. Only the scarce resources
//! are serialized, never the whole pipeline.

mod pool;
mod worker;

pub use pool::WorkerPool;

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use tokio::sync::Mutex;

use crate::agent::KnowledgeAgent;
use crate::audio::AudioSink;
use crate::synth::Synthesizer;
use crate::transcribe::Transcriber;

use worker::ResponseJob;

/// Pipeline tuning knobs
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Concurrent response workers
    pub workers: usize,
    /// Poll interval for finalized transcripts
    pub poll_interval: Duration,
    /// How long shutdown waits for in-flight jobs
    pub drain_timeout: Duration,
    /// Synthesis voice identifier
    pub voice: String,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            workers: 2,
            poll_interval: Duration::from_millis(100),
            drain_timeout: Duration::from_secs(10),
            voice: "af_heart".to_string(),
        }
    }
}

/// Shared flag that is true exactly while audio is sounding from the speaker
///
/// Written only through [`raise`](Self::raise) inside the playback scope;
/// read by the capture feed and the poll loop.
#[derive(Clone, Debug, Default)]
pub struct PlaybackGate {
    active: Arc<AtomicBool>,
}

impl PlaybackGate {
    /// Create a lowered gate
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// True while a worker is emitting audio
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }

    /// Raise the gate for the lifetime of the returned guard
    ///
    /// Only the worker holding the playback lock may call this. The guard
    /// lowers the gate when dropped, on every exit path including errors.
    #[must_use]
    pub fn raise(&self) -> PlaybackGateGuard {
        self.active.store(true, Ordering::SeqCst);
        PlaybackGateGuard {
            active: Arc::clone(&self.active),
        }
    }
}

/// Lowers the playback gate on drop
pub struct PlaybackGateGuard {
    active: Arc<AtomicBool>,
}

impl Drop for PlaybackGateGuard {
    fn drop(&mut self) {
        self.active.store(false, Ordering::SeqCst);
    }
}

/// Process-wide one-way shutdown flag
///
/// Any context may trip it; once true it never resets. Loops and workers
/// consult it at their defined checkpoints.
#[derive(Clone, Debug, Default)]
pub struct ShutdownSignal {
    requested: Arc<AtomicBool>,
}

impl ShutdownSignal {
    /// Create an untripped signal
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Trip the signal. Idempotent.
    pub fn request(&self) {
        if !self.requested.swap(true, Ordering::SeqCst) {
            tracing::info!("shutdown requested");
        }
    }

    /// True once shutdown has been requested
    #[must_use]
    pub fn is_requested(&self) -> bool {
        self.requested.load(Ordering::SeqCst)
    }
}

/// Handles a response job needs once dispatched
pub(crate) struct PipelineShared {
    pub agent: Arc<dyn KnowledgeAgent>,
    /// The synthesis lock: the model is not safe for concurrent invocation
    pub synthesizer: Mutex<Box<dyn Synthesizer>>,
    /// The playback lock: one speaker, one job at a time
    pub sink: Mutex<Box<dyn AudioSink>>,
    pub gate: PlaybackGate,
    pub shutdown: ShutdownSignal,
    pub voice: String,
}

/// The capture-side gate, installed as the capture stream's chunk handler
///
/// Runs on the audio callback thread: it reads two flags and either drops
/// the chunk or forwards it synchronously to the transcriber. Dropping while
/// the gate is raised is the feedback-prevention mechanism; the check is
/// cheap, so capture callbacks never stall regardless of downstream load.
#[derive(Clone)]
pub struct CaptureFeed {
    transcriber: Arc<dyn Transcriber>,
    gate: PlaybackGate,
    shutdown: ShutdownSignal,
}

impl CaptureFeed {
    /// Handle one captured chunk
    pub fn on_chunk(&self, samples: &[f32]) {
        if self.shutdown.is_requested() || self.gate.is_active() {
            return;
        }
        self.transcriber.feed(samples);
    }
}

/// The pipeline coordinator
pub struct Pipeline {
    transcriber: Arc<dyn Transcriber>,
    shared: Arc<PipelineShared>,
    config: PipelineConfig,
    gate: PlaybackGate,
    shutdown: ShutdownSignal,
}

impl Pipeline {
    /// Assemble a pipeline over the four collaborators
    #[must_use]
    pub fn new(
        transcriber: Arc<dyn Transcriber>,
        agent: Arc<dyn KnowledgeAgent>,
        synthesizer: Box<dyn Synthesizer>,
        sink: Box<dyn AudioSink>,
        config: PipelineConfig,
    ) -> Self {
        let gate = PlaybackGate::new();
        let shutdown = ShutdownSignal::new();
        let shared = Arc::new(PipelineShared {
            agent,
            synthesizer: Mutex::new(synthesizer),
            sink: Mutex::new(sink),
            gate: gate.clone(),
            shutdown: shutdown.clone(),
            voice: config.voice.clone(),
        });

        Self {
            transcriber,
            shared,
            config,
            gate,
            shutdown,
        }
    }

    /// Handle for tripping shutdown from any context
    #[must_use]
    pub fn shutdown_signal(&self) -> ShutdownSignal {
        self.shutdown.clone()
    }

    /// Handle observing whether playback is currently sounding
    #[must_use]
    pub fn playback_gate(&self) -> PlaybackGate {
        self.gate.clone()
    }

    /// The chunk handler to install on the capture stream
    #[must_use]
    pub fn capture_feed(&self) -> CaptureFeed {
        CaptureFeed {
            transcriber: Arc::clone(&self.transcriber),
            gate: self.gate.clone(),
            shutdown: self.shutdown.clone(),
        }
    }

    /// Run the poll-and-dispatch loop until shutdown, then drain workers
    ///
    /// Each tick: skip polling while the playback gate is raised (nothing
    /// meaningful finalizes while capture is gated); otherwise poll for a
    /// finalized transcript and submit non-empty ones to the pool without
    /// waiting. Poll failures are logged and the loop continues. On
    /// shutdown the loop exits without a final poll.
    pub async fn run(&self) {
        let pool = WorkerPool::new(self.config.workers);
        tracing::info!(
            workers = self.config.workers,
            poll_ms = self.config.poll_interval.as_millis() as u64,
            "pipeline running"
        );

        while !self.shutdown.is_requested() {
            if !self.gate.is_active() {
                match self.transcriber.poll().await {
                    Ok(Some(transcript)) if !transcript.trim().is_empty() => {
                        let job = ResponseJob::new(transcript);
                        tracing::info!(
                            job = %job.id,
                            transcript = %job.transcript,
                            "dispatching response job"
                        );
                        pool.submit(worker::respond(Arc::clone(&self.shared), job));
                    }
                    Ok(_) => {}
                    Err(e) => {
                        tracing::warn!(error = %e, "transcript poll failed");
                    }
                }
            }

            tokio::time::sleep(self.config.poll_interval).await;
        }

        pool.drain(self.config.drain_timeout).await;
        tracing::info!("pipeline stopped");
    }
}
