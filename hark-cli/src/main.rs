//! `hark` command-line front end.
//!
//! Builds the reference dictionary from a labeled corpus, then spots words on
//! a live serial stream (`listen`), over a recorded log (`replay`), or just
//! inspects the dictionary (`dict`). Matches go to stdout and logs to stderr,
//! so `--json` output stays machine-readable.

mod settings;

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::Context;
use clap::{Parser, Subcommand};
use crossbeam_channel::RecvTimeoutError;
use hark_core::{
    EngineConfig, FrameSource, HarkEngine, MatchEvent, ReferenceDictionary, ReplaySource,
    SerialSource,
};
use serde::Serialize;
use tracing::{info, warn};

use settings::{default_settings_path, load_settings, CliSettings};

#[derive(Parser)]
#[command(
    name = "hark",
    version,
    about = "Spot spoken words in a serial feature stream"
)]
struct Cli {
    /// Settings file (JSON). Defaults to the per-user data directory.
    #[arg(long, global = true, value_name = "FILE")]
    settings: Option<PathBuf>,

    /// Print match events as JSON lines instead of bare labels.
    #[arg(long, global = true)]
    json: bool,

    /// Override the voiced amplitude threshold.
    #[arg(long, global = true, value_name = "LEVEL")]
    threshold: Option<f32>,

    /// Override the quiet-frame hangover length.
    #[arg(long, global = true, value_name = "FRAMES")]
    max_quiet: Option<usize>,

    /// Override the first feature index within a record.
    #[arg(long, global = true, value_name = "INDEX")]
    feature_lo: Option<usize>,

    /// Override the end (exclusive) of the feature range.
    #[arg(long, global = true, value_name = "INDEX")]
    feature_hi: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Listen on the serial device and print each recognized word.
    Listen {
        /// Labels file, one word per line in recording order.
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,
        /// Frame log recorded while the labeled words were spoken.
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,
        /// Serial device path (overrides the settings file).
        #[arg(long)]
        port: Option<String>,
        /// Baud rate (overrides the settings file).
        #[arg(long)]
        baud: Option<u32>,
    },
    /// Replay a recorded frame log through the recognizer.
    ///
    /// Replaying the corpus log itself is a quick health check: every word
    /// should come back as its own label at distance zero.
    Replay {
        /// Frame log to replay.
        log: PathBuf,
        /// Labels file, one word per line in recording order.
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,
        /// Frame log recorded while the labeled words were spoken.
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,
    },
    /// Build the dictionary and list its entries without running a session.
    Dict {
        /// Labels file, one word per line in recording order.
        #[arg(long, value_name = "FILE")]
        labels: PathBuf,
        /// Frame log recorded while the labeled words were spoken.
        #[arg(long, value_name = "FILE")]
        corpus: PathBuf,
    },
}

fn main() -> anyhow::Result<()> {
    // ── Tracing ───────────────────────────────────────────────────────────
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "hark=info".parse().unwrap()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // ── Settings ──────────────────────────────────────────────────────────
    let settings_path = cli.settings.clone().unwrap_or_else(default_settings_path);
    let mut settings = load_settings(&settings_path);
    apply_overrides(&mut settings, &cli);
    settings.normalize();
    let config = settings.engine_config();
    config.validate()?;
    info!(
        settings_path = ?settings_path,
        threshold = config.amplitude_threshold,
        max_quiet_frames = config.max_quiet_frames,
        feature_lo = config.feature_lo,
        feature_hi = config.feature_hi,
        "runtime settings loaded"
    );

    match cli.command {
        Command::Listen {
            labels,
            corpus,
            port,
            baud,
        } => {
            let dictionary = build_dictionary(&labels, &corpus, &config)?;
            let engine = HarkEngine::new(config.clone(), dictionary)?;
            let port = port.unwrap_or_else(|| settings.port.clone());
            let baud = baud.unwrap_or(settings.baud);
            let source = SerialSource::open(&port, baud, config.protocol())?;
            run_session(&engine, Box::new(source), cli.json)
        }
        Command::Replay {
            log,
            labels,
            corpus,
        } => {
            let dictionary = build_dictionary(&labels, &corpus, &config)?;
            let engine = HarkEngine::new(config.clone(), dictionary)?;
            let source = ReplaySource::open(&log, config.protocol())
                .with_context(|| format!("opening replay log {}", log.display()))?;
            run_session(&engine, Box::new(source), cli.json)
        }
        Command::Dict { labels, corpus } => {
            let dictionary = build_dictionary(&labels, &corpus, &config)?;
            print_dictionary(&dictionary, cli.json)
        }
    }
}

fn apply_overrides(settings: &mut CliSettings, cli: &Cli) {
    if let Some(v) = cli.threshold {
        settings.amplitude_threshold = v;
    }
    if let Some(v) = cli.max_quiet {
        settings.max_quiet_frames = v;
    }
    if let Some(v) = cli.feature_lo {
        settings.feature_lo = v;
    }
    if let Some(v) = cli.feature_hi {
        settings.feature_hi = v;
    }
}

fn build_dictionary(
    labels: &Path,
    corpus: &Path,
    config: &EngineConfig,
) -> anyhow::Result<ReferenceDictionary> {
    let dictionary =
        ReferenceDictionary::from_corpus(labels, corpus, config.protocol(), config.segmenter())
            .with_context(|| {
                format!(
                    "building dictionary from {} + {}",
                    labels.display(),
                    corpus.display()
                )
            })?;
    if dictionary.is_empty() {
        warn!("corpus produced an empty dictionary");
    }
    Ok(dictionary)
}

/// Run one engine session to completion, printing matches as they arrive.
/// Ctrl-C trips the session's stop token for a clean shutdown.
fn run_session(engine: &HarkEngine, source: Box<dyn FrameSource>, json: bool) -> anyhow::Result<()> {
    let matches = engine.subscribe_matches();
    let session = engine.start(source)?;

    let stop = session.stop_token();
    ctrlc::set_handler(move || {
        info!("interrupt received, stopping");
        stop.stop();
    })
    .context("installing the Ctrl-C handler")?;

    loop {
        match matches.recv_timeout(Duration::from_millis(50)) {
            Ok(event) => print_match(&event, json)?,
            Err(RecvTimeoutError::Timeout) => {
                if session.is_finished() {
                    break;
                }
            }
            Err(RecvTimeoutError::Disconnected) => break,
        }
    }
    // The pipeline may have emitted between the last timeout and finishing.
    for event in matches.try_iter() {
        print_match(&event, json)?;
    }
    session.join()?;
    Ok(())
}

fn print_match(event: &MatchEvent, json: bool) -> anyhow::Result<()> {
    if json {
        println!("{}", serde_json::to_string(event)?);
    } else {
        println!("{}", event.label);
    }
    Ok(())
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct DictEntry<'a> {
    label: &'a str,
    frames: usize,
    dim: usize,
}

fn print_dictionary(dictionary: &ReferenceDictionary, json: bool) -> anyhow::Result<()> {
    for (label, segment) in dictionary.entries() {
        if json {
            let entry = DictEntry {
                label,
                frames: segment.len(),
                dim: segment.dim(),
            };
            println!("{}", serde_json::to_string(&entry)?);
        } else {
            println!("{label}\t{} frames", segment.len());
        }
    }
    Ok(())
}
