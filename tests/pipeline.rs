//! Pipeline coordinator integration tests
//!
//! Exercises the coordination invariants with mock collaborators — no audio
//! hardware and no network required.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use chatterbox::{
    AudioSink, Error, KnowledgeAgent, Pipeline, PipelineConfig, PlaybackGate, Result,
    ShutdownSignal, SynthesizedSpeech, Synthesizer, Transcriber,
};

/// Transcriber serving a scripted queue of transcripts, one per poll
#[derive(Default)]
struct ScriptedTranscriber {
    queue: Mutex<VecDeque<String>>,
    fed_chunks: AtomicUsize,
    polls: AtomicUsize,
}

impl ScriptedTranscriber {
    fn new(transcripts: &[&str]) -> Self {
        Self {
            queue: Mutex::new(transcripts.iter().map(|s| (*s).to_string()).collect()),
            ..Self::default()
        }
    }
}

#[async_trait]
impl Transcriber for ScriptedTranscriber {
    fn feed(&self, _samples: &[f32]) {
        self.fed_chunks.fetch_add(1, Ordering::SeqCst);
    }

    async fn poll(&self) -> Result<Option<String>> {
        self.polls.fetch_add(1, Ordering::SeqCst);
        Ok(self.queue.lock().unwrap().pop_front())
    }
}

/// Agent whose latency depends on the question, to invert completion order
#[derive(Default)]
struct StubAgent {
    calls: AtomicUsize,
    fail: bool,
}

#[async_trait]
impl KnowledgeAgent for StubAgent {
    async fn ask(&self, question: &str) -> Result<String> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail {
            return Err(Error::Agent("agent offline".to_string()));
        }
        let delay = if question.contains("slow") { 250 } else { 20 };
        tokio::time::sleep(Duration::from_millis(delay)).await;
        Ok(format!("the answer to {question}"))
    }
}

/// Observed synthesizer state, shared between the test and the mock
#[derive(Default)]
struct SynthProbe {
    busy: AtomicBool,
    reentered: AtomicBool,
    phonemize_calls: AtomicUsize,
    synthesize_calls: AtomicUsize,
    produce_empty: AtomicBool,
    /// When set, synthesis trips shutdown mid-call
    trip_on_synthesize: Mutex<Option<ShutdownSignal>>,
}

struct ProbeSynthesizer {
    probe: Arc<SynthProbe>,
}

#[async_trait]
impl Synthesizer for ProbeSynthesizer {
    async fn phonemize(&self, text: &str) -> Result<String> {
        if self.probe.busy.swap(true, Ordering::SeqCst) {
            self.probe.reentered.store(true, Ordering::SeqCst);
        }
        self.probe.phonemize_calls.fetch_add(1, Ordering::SeqCst);
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.probe.busy.store(false, Ordering::SeqCst);
        Ok(format!("/{text}/"))
    }

    async fn synthesize(&self, phonemes: &str, _voice: &str) -> Result<SynthesizedSpeech> {
        if self.probe.busy.swap(true, Ordering::SeqCst) {
            self.probe.reentered.store(true, Ordering::SeqCst);
        }
        self.probe.synthesize_calls.fetch_add(1, Ordering::SeqCst);
        if let Some(signal) = self.probe.trip_on_synthesize.lock().unwrap().as_ref() {
            signal.request();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        self.probe.busy.store(false, Ordering::SeqCst);

        if self.probe.produce_empty.load(Ordering::SeqCst) {
            return Ok(SynthesizedSpeech::default());
        }
        // Encode the phoneme length in the sample count so tests can tell
        // which job's audio played
        Ok(SynthesizedSpeech {
            samples: vec![0.1; phonemes.len()],
            sample_rate: 24000,
        })
    }
}

/// Observed sink state, shared between the test and the mock
#[derive(Default)]
struct SinkProbe {
    playing: AtomicBool,
    overlapped: AtomicBool,
    gate_open_during_play: AtomicBool,
    fail_next: AtomicBool,
    played: Mutex<Vec<usize>>,
    /// Gate handle, installed after the pipeline is constructed
    gate: Mutex<Option<PlaybackGate>>,
}

struct ProbeSink {
    probe: Arc<SinkProbe>,
}

#[async_trait]
impl AudioSink for ProbeSink {
    async fn play(&self, samples: &[f32], _sample_rate: u32) -> Result<()> {
        if self.probe.playing.swap(true, Ordering::SeqCst) {
            self.probe.overlapped.store(true, Ordering::SeqCst);
        }
        let gate = self.probe.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            if !gate.is_active() {
                self.probe.gate_open_during_play.store(true, Ordering::SeqCst);
            }
        }
        tokio::time::sleep(Duration::from_millis(30)).await;
        self.probe.playing.store(false, Ordering::SeqCst);

        if self.probe.fail_next.swap(false, Ordering::SeqCst) {
            return Err(Error::Audio("device gone".to_string()));
        }
        self.probe.played.lock().unwrap().push(samples.len());
        Ok(())
    }
}

struct Harness {
    pipeline: Arc<Pipeline>,
    transcriber: Arc<ScriptedTranscriber>,
    agent: Arc<StubAgent>,
    synth: Arc<SynthProbe>,
    sink: Arc<SinkProbe>,
}

fn harness(transcripts: &[&str], workers: usize, agent_fails: bool) -> Harness {
    let transcriber = Arc::new(ScriptedTranscriber::new(transcripts));
    let agent = Arc::new(StubAgent {
        fail: agent_fails,
        ..StubAgent::default()
    });
    let synth = Arc::new(SynthProbe::default());
    let sink = Arc::new(SinkProbe::default());

    let pipeline = Arc::new(Pipeline::new(
        Arc::clone(&transcriber) as Arc<dyn Transcriber>,
        Arc::clone(&agent) as Arc<dyn KnowledgeAgent>,
        Box::new(ProbeSynthesizer {
            probe: Arc::clone(&synth),
        }),
        Box::new(ProbeSink {
            probe: Arc::clone(&sink),
        }),
        PipelineConfig {
            workers,
            poll_interval: Duration::from_millis(10),
            drain_timeout: Duration::from_secs(5),
            voice: "af_heart".to_string(),
        },
    ));

    *sink.gate.lock().unwrap() = Some(pipeline.playback_gate());

    Harness {
        pipeline,
        transcriber,
        agent,
        synth,
        sink,
    }
}

/// Poll until `cond` holds or the timeout elapses
async fn wait_for(cond: impl Fn() -> bool, timeout: Duration) -> bool {
    let start = Instant::now();
    while start.elapsed() < timeout {
        if cond() {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    cond()
}

// No chunk reaches the transcriber while the playback gate is raised
#[tokio::test]
async fn capture_feed_drops_chunks_while_gate_raised() {
    let h = harness(&[], 2, false);
    let feed = h.pipeline.capture_feed();
    let chunk = vec![0.1f32; 160];

    feed.on_chunk(&chunk);
    assert_eq!(h.transcriber.fed_chunks.load(Ordering::SeqCst), 1);

    {
        let _guard = h.pipeline.playback_gate().raise();
        feed.on_chunk(&chunk);
        feed.on_chunk(&chunk);
        assert_eq!(h.transcriber.fed_chunks.load(Ordering::SeqCst), 1);
    }

    // Gate lowered: feeding resumes
    feed.on_chunk(&chunk);
    assert_eq!(h.transcriber.fed_chunks.load(Ordering::SeqCst), 2);

    // Shutdown also closes the feed, permanently
    h.pipeline.shutdown_signal().request();
    feed.on_chunk(&chunk);
    assert_eq!(h.transcriber.fed_chunks.load(Ordering::SeqCst), 2);
}

// One transcript flows end to end and plays exactly once
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn single_transcript_plays_once_and_capture_resumes() {
    let h = harness(&["what is the capital of France"], 2, false);
    let feed = h.pipeline.capture_feed();

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    let sink = Arc::clone(&h.sink);
    assert!(
        wait_for(
            move || sink.played.lock().unwrap().len() == 1,
            Duration::from_secs(5)
        )
        .await,
        "playback should happen exactly once"
    );

    // Give the worker a moment to release the speaker and lower the gate
    tokio::time::sleep(Duration::from_millis(50)).await;

    // Gate closed again: capture resumes feeding
    assert!(!h.pipeline.playback_gate().is_active());
    feed.on_chunk(&[0.1f32; 160]);
    assert_eq!(h.transcriber.fed_chunks.load(Ordering::SeqCst), 1);

    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    assert_eq!(h.agent.calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.synth.phonemize_calls.load(Ordering::SeqCst), 1);
    assert_eq!(h.sink.played.lock().unwrap().len(), 1);
    assert!(!h.synth.reentered.load(Ordering::SeqCst));
    assert!(!h.sink.gate_open_during_play.load(Ordering::SeqCst));
}

// The fast answer plays first, and the model/speaker locks never overlap
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn completion_order_playback_without_lock_corruption() {
    let h = harness(&["slow question", "quick question"], 2, false);

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    let sink = Arc::clone(&h.sink);
    assert!(
        wait_for(
            move || sink.played.lock().unwrap().len() == 2,
            Duration::from_secs(5)
        )
        .await,
        "both jobs should play"
    );

    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    // Sample counts encode phoneme length, which differs per transcript
    let quick_len = "/the answer to quick question/".len();
    let slow_len = "/the answer to slow question/".len();
    let played = h.sink.played.lock().unwrap().clone();
    assert_eq!(played, vec![quick_len, slow_len]);

    assert!(!h.synth.reentered.load(Ordering::SeqCst), "synthesis lock was re-entered");
    assert!(!h.sink.overlapped.load(Ordering::SeqCst), "playback lock was re-entered");
    assert!(!h.sink.gate_open_during_play.load(Ordering::SeqCst));
    assert!(!h.pipeline.playback_gate().is_active());
}

// A failed answer stage never reaches synthesis or playback
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn failed_answer_skips_synthesis_and_playback() {
    let h = harness(&["anything"], 2, true);

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    let agent = Arc::clone(&h.agent);
    assert!(
        wait_for(
            move || agent.calls.load(Ordering::SeqCst) == 1,
            Duration::from_secs(5)
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    assert_eq!(h.synth.phonemize_calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synth.synthesize_calls.load(Ordering::SeqCst), 0);
    assert!(h.sink.played.lock().unwrap().is_empty());
    assert!(!h.pipeline.playback_gate().is_active());
}

// Shutdown mid-synthesis lets the call finish but never plays
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_during_synthesis_aborts_before_playback() {
    let h = harness(&["anything"], 2, false);
    *h.synth.trip_on_synthesize.lock().unwrap() = Some(h.pipeline.shutdown_signal());

    h.pipeline.run().await;

    assert_eq!(h.synth.synthesize_calls.load(Ordering::SeqCst), 1);
    assert!(h.sink.played.lock().unwrap().is_empty());
    assert!(!h.pipeline.playback_gate().is_active());
}

// Empty synthesis output aborts the job without emitting audio
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_synthesis_skips_playback() {
    let h = harness(&["anything"], 2, false);
    h.synth.produce_empty.store(true, Ordering::SeqCst);

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    let synth = Arc::clone(&h.synth);
    assert!(
        wait_for(
            move || synth.synthesize_calls.load(Ordering::SeqCst) == 1,
            Duration::from_secs(5)
        )
        .await
    );
    tokio::time::sleep(Duration::from_millis(100)).await;

    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    assert!(h.sink.played.lock().unwrap().is_empty());
}

// A playback failure still lowers the gate and releases the lock
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn playback_failure_lowers_gate() {
    let h = harness(&["first", "second"], 1, false);
    h.sink.fail_next.store(true, Ordering::SeqCst);

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    // The first play fails; the second must still get the speaker
    let sink = Arc::clone(&h.sink);
    assert!(
        wait_for(
            move || sink.played.lock().unwrap().len() == 1,
            Duration::from_secs(5)
        )
        .await,
        "pipeline should survive a playback failure"
    );

    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    assert!(!h.pipeline.playback_gate().is_active());
    assert!(!h.sink.overlapped.load(Ordering::SeqCst));
}

// Once shutdown is requested the loop neither polls nor dispatches
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_prevents_any_further_dispatch() {
    let h = harness(&["never dispatched"], 2, false);

    h.pipeline.shutdown_signal().request();
    let start = Instant::now();
    h.pipeline.run().await;

    assert!(start.elapsed() < Duration::from_secs(2), "shutdown exit must be bounded");
    assert_eq!(h.transcriber.polls.load(Ordering::SeqCst), 0, "no final poll after shutdown");
    assert_eq!(h.agent.calls.load(Ordering::SeqCst), 0);
}

// Polling with nothing finalized dispatches nothing
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn empty_polls_have_no_side_effects() {
    let h = harness(&[], 2, false);

    let runner = tokio::spawn({
        let pipeline = Arc::clone(&h.pipeline);
        async move { pipeline.run().await }
    });

    tokio::time::sleep(Duration::from_millis(150)).await;
    h.pipeline.shutdown_signal().request();
    runner.await.unwrap();

    assert!(h.transcriber.polls.load(Ordering::SeqCst) > 1);
    assert_eq!(h.agent.calls.load(Ordering::SeqCst), 0);
    assert_eq!(h.synth.phonemize_calls.load(Ordering::SeqCst), 0);
    assert!(h.sink.played.lock().unwrap().is_empty());
}
