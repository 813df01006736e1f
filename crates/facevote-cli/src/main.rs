use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use facevote_core::{IdentityProfile, PixelGridExtractor, ScrfdDetector, VoterId};
use facevote_engine::{
    check_enrollable, run_enrollment, CapturePolicy, Config, EnrollmentCapture, EnrollmentOutcome,
    FrameOutcome, RecognitionLoop, RunSummary, VotingSession,
};
use facevote_hw::Camera;
use facevote_store::{EnrollmentStore, VoteLedger};
use std::future::Future;
use std::io;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::task::JoinHandle;

mod prompt;

use prompt::TerminalPrompt;

#[derive(Parser)]
#[command(name = "facevote", version, about = "Face-recognition voting station")]
struct Cli {
    /// Config file (default: $XDG_CONFIG_HOME/facevote/config.toml)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Capture face samples for a voter
    Enroll {
        /// 12-digit voter ID
        #[arg(long)]
        voter_id: String,
        #[arg(long)]
        name: String,
        #[arg(long)]
        constituency: String,
    },
    /// Run the voting station
    Vote,
    /// List enrolled voters
    Voters,
    /// Show votes per choice
    Tally,
    /// Print a JSON status summary
    Status,
    /// List V4L2 capture devices
    Devices,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let load_config = || Config::load(cli.config.as_deref()).context("failed to load configuration");

    match cli.command {
        Commands::Enroll {
            ref voter_id,
            ref name,
            ref constituency,
        } => {
            let config = load_config()?;
            let voter_id = VoterId::parse(voter_id)?;
            let profile = IdentityProfile::new(voter_id, name, constituency, config.name_policy())?;
            let outcome = run_blocking(move |cancel| enroll(&config, profile, &cancel)).await?;
            match outcome {
                EnrollmentOutcome::Committed { samples } => {
                    println!("Enrolled {samples} samples.");
                }
                EnrollmentOutcome::Discarded { samples } => {
                    println!("Enrollment cancelled with {samples} samples; nothing was saved.");
                }
            }
        }
        Commands::Vote => {
            let config = load_config()?;
            let summary = run_blocking(move |cancel| vote(&config, &cancel)).await?;
            println!(
                "Session ended: {} votes recorded, {} already-voted and {} unknown sightings.",
                summary.votes, summary.already_voted, summary.unknown
            );
        }
        Commands::Voters => list_voters(&load_config()?)?,
        Commands::Tally => print_tally(&load_config()?)?,
        Commands::Status => print_status(&load_config()?)?,
        Commands::Devices => list_devices(),
    }

    Ok(())
}

/// Run a blocking session on the blocking pool. The first Ctrl-C raises
/// the cancellation flag and the session stops at the next frame boundary;
/// a second one exits at once, since an open prompt never sees the flag.
async fn run_blocking<T, F>(task: F) -> Result<T>
where
    F: FnOnce(Arc<AtomicBool>) -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    let cancel = Arc::new(AtomicBool::new(false));
    let worker = tokio::task::spawn_blocking({
        let cancel = cancel.clone();
        move || task(cancel)
    });

    match supervise(worker, &cancel, tokio::signal::ctrl_c).await? {
        Supervised::Finished(value) => Ok(value),
        Supervised::Abandoned => std::process::exit(130),
    }
}

#[derive(Debug, PartialEq)]
enum Supervised<T> {
    Finished(T),
    /// Interrupted twice before the worker returned.
    Abandoned,
}

async fn supervise<T, I, Fut>(
    mut worker: JoinHandle<Result<T>>,
    cancel: &AtomicBool,
    mut interrupt: I,
) -> Result<Supervised<T>>
where
    I: FnMut() -> Fut,
    Fut: Future<Output = io::Result<()>>,
{
    tokio::select! {
        joined = &mut worker => return Ok(Supervised::Finished(joined??)),
        signal = interrupt() => {
            signal?;
            tracing::info!("interrupt received, stopping after the current frame");
            cancel.store(true, Ordering::Relaxed);
            eprintln!("Stopping. Answer or quit an open prompt, or press Ctrl-C again to exit now.");
        }
    }

    tokio::select! {
        joined = &mut worker => Ok(Supervised::Finished(joined??)),
        signal = interrupt() => {
            signal?;
            tracing::warn!("second interrupt received, exiting without waiting for the session");
            Ok(Supervised::Abandoned)
        }
    }
}

fn enroll(config: &Config, profile: IdentityProfile, cancel: &AtomicBool) -> Result<EnrollmentOutcome> {
    let mut store = EnrollmentStore::open(config.enrollment_dir())?;
    check_enrollable(&store, &profile)?;

    let mut detector = ScrfdDetector::load(&config.scrfd_model_path(), config.detection_confidence)
        .context("failed to load face detector")?;
    let mut camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)
        .context("failed to open camera")?;
    camera.warm_up(config.warmup_frames);

    println!(
        "Capturing {} samples for voter {}. Look at the camera; press Ctrl-C to stop.",
        config.target_samples,
        profile.voter_id()
    );
    let capture = EnrollmentCapture::new(profile, CapturePolicy::from_config(config));
    let extractor = PixelGridExtractor::new(config.signature_size);
    Ok(run_enrollment(&mut camera, &mut detector, &extractor, capture, &mut store, cancel)?)
}

fn vote(config: &Config, cancel: &AtomicBool) -> Result<RunSummary> {
    let session = VotingSession::open(config).context("failed to prepare voting session")?;
    let detector = ScrfdDetector::load(&config.scrfd_model_path(), config.detection_confidence)
        .context("failed to load face detector")?;
    let extractor = PixelGridExtractor::new(config.signature_size);
    let mut recognition =
        RecognitionLoop::new(session, detector, extractor, TerminalPrompt::stdio())?;

    let mut camera = Camera::open(&config.camera_device, config.frame_width, config.frame_height)
        .context("failed to open camera")?;
    camera.warm_up(config.warmup_frames);
    println!("Voting station ready. Press Ctrl-C to close.");

    let mut last_shown: Option<FrameOutcome> = None;
    let summary = recognition.run_with(&mut camera, cancel, |outcome| {
        let message = match outcome {
            FrameOutcome::AlreadyVoted(id) => format!("Voter {id} has already voted."),
            FrameOutcome::Unknown(id) => format!("Voter {id} is not enrolled."),
            FrameOutcome::Voted(record) => {
                format!("Vote recorded for {} ({}).", record.voter_id, record.choice)
            }
            FrameOutcome::Abstained(id) => format!("Skipped voter {id}."),
            _ => return,
        };
        if last_shown.as_ref() != Some(outcome) {
            println!("{message}");
            last_shown = Some(outcome.clone());
        }
    })?;
    Ok(summary)
}

fn list_voters(config: &Config) -> Result<()> {
    let enrolled = EnrollmentStore::open(config.enrollment_dir())?.load_all()?;
    let ledger = VoteLedger::open(config.ledger_path())?;

    if enrolled.is_empty() {
        println!("No voters enrolled");
        return Ok(());
    }

    println!(
        "{:<12}  {:<20}  {:<20}  {:>7}  VOTED",
        "VOTER ID", "NAME", "CONSTITUENCY", "SAMPLES"
    );
    for (voter_id, samples) in enrolled.sample_counts() {
        let Some(profile) = enrolled.lookup(&voter_id) else {
            continue;
        };
        let voted = if ledger.has_voted(&voter_id) { "yes" } else { "no" };
        let low = if samples < config.neighbors { " (below k)" } else { "" };
        println!(
            "{:<12}  {:<20}  {:<20}  {:>7}  {voted}{low}",
            voter_id,
            profile.name(),
            profile.constituency(),
            samples
        );
    }
    Ok(())
}

fn print_tally(config: &Config) -> Result<()> {
    let ledger = VoteLedger::open(config.ledger_path())?;
    let ballot = config.parsed_ballot()?;
    let mut counts = ledger.tally();

    for choice in ballot.choices() {
        let votes = counts.remove(choice.label()).unwrap_or(0);
        println!("{:<20} {votes:>6}", choice.label());
    }
    // Labels recorded under an earlier ballot.
    for (label, votes) in counts {
        println!("{:<20} {votes:>6}  (not on current ballot)", label);
    }
    println!("{:<20} {:>6}", "TOTAL", ledger.len());
    Ok(())
}

fn print_status(config: &Config) -> Result<()> {
    let enrolled = EnrollmentStore::open(config.enrollment_dir())?.load_all()?;
    let ledger = VoteLedger::open(config.ledger_path())?;

    let status = serde_json::json!({
        "version": env!("CARGO_PKG_VERSION"),
        "data_dir": config.data_dir,
        "camera_device": config.camera_device,
        "detector_model_present": config.scrfd_model_path().exists(),
        "enrolled_voters": enrolled.profiles.len(),
        "samples": enrolled.len(),
        "signature_dimensions": enrolled.dimensions(),
        "neighbors": config.neighbors,
        "votes": ledger.len(),
        "ballot": config.parsed_ballot()?.choices().iter().map(|c| c.label().to_string()).collect::<Vec<_>>(),
    });
    println!("{}", serde_json::to_string_pretty(&status)?);
    Ok(())
}

fn list_devices() {
    let devices = Camera::list_devices();
    if devices.is_empty() {
        println!("No V4L2 capture devices found");
    }
    for device in devices {
        println!("{}  {} ({})", device.path, device.name, device.driver);
    }
}
