//! Per-job response flow: answer, synthesize, play
//!
//! Every stage failure is caught and logged here and terminates only this
//! job; nothing propagates to the poll loop, the pool, or other jobs. The
//! shutdown signal is consulted at each stage boundary, and an abort on that
//! path is a normal early exit, not a failure.

use std::sync::Arc;

use uuid::Uuid;

use super::PipelineShared;

/// A transcript travelling toward playback
///
/// Created at dispatch time, handed to exactly one worker, never retried.
pub(crate) struct ResponseJob {
    pub id: Uuid,
    pub transcript: String,
}

impl ResponseJob {
    pub fn new(transcript: String) -> Self {
        Self {
            id: Uuid::new_v4(),
            transcript,
        }
    }
}

/// Drive one job through answer generation, synthesis, and playback
pub(crate) async fn respond(shared: Arc<PipelineShared>, job: ResponseJob) {
    if shared.shutdown.is_requested() {
        tracing::debug!(job = %job.id, "shutdown before job started");
        return;
    }

    // Answer stage: no lock held, answers generate fully concurrently
    let answer = match shared.agent.ask(&job.transcript).await {
        Ok(text) if !text.trim().is_empty() => text,
        Ok(_) => {
            tracing::warn!(job = %job.id, "agent returned an empty answer");
            return;
        }
        Err(e) => {
            tracing::warn!(job = %job.id, error = %e, "answer generation failed");
            return;
        }
    };
    tracing::info!(job = %job.id, answer = %answer, "answer ready");

    if shared.shutdown.is_requested() {
        tracing::debug!(job = %job.id, "shutdown before synthesis");
        return;
    }

    // Synthesis stage: the model lock spans exactly the two model calls.
    // Jobs queue here for the model without blocking each other's answers.
    let speech = {
        let synthesizer = shared.synthesizer.lock().await;
        let phonemes = match synthesizer.phonemize(&answer).await {
            Ok(p) => p,
            Err(e) => {
                tracing::warn!(job = %job.id, error = %e, "phonemization failed");
                return;
            }
        };
        match synthesizer.synthesize(&phonemes, &shared.voice).await {
            Ok(s) => s,
            Err(e) => {
                tracing::warn!(job = %job.id, error = %e, "synthesis failed");
                return;
            }
        }
    };

    if shared.shutdown.is_requested() {
        tracing::debug!(job = %job.id, "shutdown before playback");
        return;
    }
    if speech.is_empty() {
        tracing::warn!(job = %job.id, "synthesis produced no audio");
        return;
    }

    // Playback stage: exclusive speaker access. The gate is raised strictly
    // before the first sample and lowered by the guard on every exit path,
    // so capture never observes the assistant's own voice as input.
    {
        let sink = shared.sink.lock().await;
        let _gate = shared.gate.raise();
        if let Err(e) = sink.play(&speech.samples, speech.sample_rate).await {
            tracing::warn!(job = %job.id, error = %e, "playback failed");
        }
    }

    tracing::debug!(job = %job.id, "job complete");
}
