use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use chatterbox::config::SttProviderKind;
use chatterbox::transcribe::SttClient;
use chatterbox::{
    AudioCapture, AudioPlayback, AudioSink, Config, HttpKnowledgeAgent, KokoroSynthesizer,
    Pipeline, PipelineConfig, RemoteTranscriber, Synthesizer,
};

/// Chatterbox - hands-free voice assistant that answers questions aloud
#[derive(Parser)]
#[command(name = "chatterbox", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Concurrent response workers
    #[arg(long)]
    workers: Option<usize>,

    /// Synthesis voice
    #[arg(long)]
    voice: Option<String>,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Test microphone input
    TestMic {
        /// Duration in seconds
        #[arg(short, long, default_value = "5")]
        duration: u64,
    },
    /// Test speaker output
    TestSpeaker,
    /// Test TTS output
    TestTts {
        /// Text to speak
        #[arg(default_value = "Hello! This is a test of the text to speech system.")]
        text: String,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,chatterbox=info",
        1 => "info,chatterbox=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

#[allow(clippy::future_not_send)]
async fn run(cli: Cli) -> anyhow::Result<()> {
    if let Some(cmd) = cli.command {
        return match cmd {
            Command::TestMic { duration } => test_mic(duration).await,
            Command::TestSpeaker => test_speaker().await,
            Command::TestTts { text } => test_tts(&text).await,
        };
    }

    let mut config = Config::load();
    if let Some(workers) = cli.workers {
        config.pipeline.workers = workers;
    }
    if let Some(voice) = cli.voice {
        config.tts.voice = voice;
    }

    tracing::info!(
        stt = ?config.stt.provider,
        agent = %config.agent.model,
        voice = %config.tts.voice,
        workers = config.pipeline.workers,
        "starting chatterbox"
    );

    // Every collaborator must come up before the loop begins
    let stt = match config.stt.provider {
        SttProviderKind::Whisper => SttClient::whisper(
            config.stt.base_url.clone(),
            config.stt.api_key.clone().unwrap_or_default(),
            config.stt.model.clone(),
        )?,
        SttProviderKind::Deepgram => SttClient::deepgram(
            config.stt.api_key.clone().unwrap_or_default(),
            config.stt.model.clone(),
        )?,
    };
    let transcriber = Arc::new(RemoteTranscriber::new(stt));

    let mut agent = HttpKnowledgeAgent::new(
        config.agent.base_url.clone(),
        config.agent.api_key.clone(),
        config.agent.model.clone(),
    )
    .with_max_tokens(config.agent.max_tokens);
    if let Some(prompt) = config.agent.system_prompt.clone() {
        agent = agent.with_system_prompt(prompt);
    }

    let synthesizer = KokoroSynthesizer::new(
        config.tts.base_url.clone(),
        config.tts.language.clone(),
        config.tts.speed,
    );

    let playback = AudioPlayback::new()?;
    let mut capture = AudioCapture::new()?;

    let pipeline = Pipeline::new(
        transcriber,
        Arc::new(agent),
        Box::new(synthesizer),
        Box::new(playback),
        PipelineConfig {
            workers: config.pipeline.workers,
            poll_interval: Duration::from_millis(config.pipeline.poll_interval_ms),
            drain_timeout: Duration::from_secs(config.pipeline.drain_timeout_secs),
            voice: config.tts.voice.clone(),
        },
    );

    // A single interrupt trips the one-way shutdown signal
    let shutdown = pipeline.shutdown_signal();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            shutdown.request();
        }
    });

    let feed = pipeline.capture_feed();
    capture.start(move |chunk| feed.on_chunk(chunk))?;
    tracing::info!("listening - press ctrl-c to exit");

    pipeline.run().await;

    capture.stop();
    tracing::info!("chatterbox stopped");

    Ok(())
}

/// Test microphone input
#[allow(clippy::future_not_send)]
async fn test_mic(duration: u64) -> anyhow::Result<()> {
    println!("Testing microphone for {duration} seconds...");
    println!("Speak into your microphone!\n");

    let mut capture = AudioCapture::new()?;

    let buffer = Arc::new(std::sync::Mutex::new(Vec::<f32>::new()));
    let callback_buffer = Arc::clone(&buffer);
    capture.start(move |chunk| {
        if let Ok(mut buf) = callback_buffer.lock() {
            buf.extend_from_slice(chunk);
        }
    })?;

    println!("Sample rate: {} Hz", capture.sample_rate());
    println!("---");

    for i in 0..duration {
        tokio::time::sleep(Duration::from_secs(1)).await;

        let samples = {
            let mut buf = buffer.lock().unwrap();
            std::mem::take(&mut *buf)
        };
        let energy = chatterbox::audio::calculate_rms(&samples);
        let peak = samples.iter().map(|s| s.abs()).fold(0.0f32, f32::max);

        // Visual meter
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
        let meter_len = (energy * 100.0).min(50.0) as usize;
        let meter: String = "█".repeat(meter_len) + &" ".repeat(50 - meter_len);

        println!(
            "[{:2}s] RMS: {:.4} | Peak: {:.4} | [{}]",
            i + 1,
            energy,
            peak,
            meter
        );
    }

    capture.stop();

    println!("\n---");
    println!("If you saw movement in the meter, your mic is working!");
    println!("If RMS stayed near 0, check:");
    println!("  1. Is your mic plugged in?");
    println!("  2. Run: pactl info | grep 'Default Source'");
    println!("  3. Try: pavucontrol (to check levels)");

    Ok(())
}

/// Test speaker output with a sine wave
async fn test_speaker() -> anyhow::Result<()> {
    println!("Testing speaker output...");
    println!("You should hear a 440Hz tone for 2 seconds\n");

    let playback = AudioPlayback::new()?;

    let sample_rate = 24000_u32;
    let frequency = 440.0_f32;
    let duration_secs = 2.0_f32;
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_sign_loss,
        clippy::cast_precision_loss
    )]
    let num_samples = (sample_rate as f32 * duration_secs) as usize;

    #[allow(clippy::cast_precision_loss)]
    let samples: Vec<f32> = (0..num_samples)
        .map(|i| {
            let t = i as f32 / sample_rate as f32;
            (2.0 * std::f32::consts::PI * frequency * t).sin() * 0.3 // 30% volume
        })
        .collect();

    println!("Playing {} samples at {} Hz...", samples.len(), sample_rate);

    playback.play(&samples, sample_rate).await?;

    println!("\n---");
    println!("If you heard the tone, your speakers are working!");
    println!("If you didn't hear anything, check:");
    println!("  1. Run: pactl info | grep 'Default Sink'");
    println!("  2. Try: pavucontrol (to check output levels)");

    Ok(())
}

/// Test TTS output through the configured Kokoro server
async fn test_tts(text: &str) -> anyhow::Result<()> {
    println!("Testing TTS with text: \"{text}\"\n");

    let config = Config::load();
    let synthesizer = KokoroSynthesizer::new(
        config.tts.base_url.clone(),
        config.tts.language.clone(),
        config.tts.speed,
    );

    println!("Phonemizing...");
    let phonemes = synthesizer.phonemize(text).await?;
    println!("Phonemes: {phonemes}");

    println!("Synthesizing speech...");
    let speech = synthesizer.synthesize(&phonemes, &config.tts.voice).await?;
    println!(
        "Got {} samples at {} Hz",
        speech.samples.len(),
        speech.sample_rate
    );

    if speech.is_empty() {
        anyhow::bail!("synthesizer returned no audio");
    }

    println!("Playing audio...");
    let playback = AudioPlayback::new()?;
    playback.play(&speech.samples, speech.sample_rate).await?;

    println!("\n---");
    println!("If you heard the speech, TTS is working!");

    Ok(())
}
