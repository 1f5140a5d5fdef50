use std::fs;
use std::io::{self, Write};
use std::path::PathBuf;
use std::process;
use std::sync::Arc;
use std::thread;

use clap::{Parser, Subcommand};
use crossbeam_channel::unbounded;

use facestream_core::detection::domain::face_detector::FaceDetector;
use facestream_core::detection::domain::sampling_policy::SamplingPolicy;
use facestream_core::pipeline::detection_session::DetectionSession;
use facestream_core::pipeline::pipeline_logger::StdoutPipelineLogger;
use facestream_core::pipeline::staleness::needs_processing;
use facestream_core::pipeline::stream_supervisor::{
    StartedStream, StreamError, StreamSupervisor, WorkerExit,
};
use facestream_core::query::status::{resolve_artifact, StatusSnapshot};
use facestream_core::shared::config::FacestreamConfig;
use facestream_core::streaming::infrastructure::ffmpeg_hls_encoder::FfmpegHlsEncoder;
use facestream_core::video::domain::video_reader::VideoReader;
use facestream_core::video::infrastructure::ffmpeg_reader::FfmpegReader;

/// Face inventory and HLS streaming for a recorded video.
#[derive(Parser)]
#[command(name = "facestream")]
struct Cli {
    /// JSON config file. Missing keys keep their defaults.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Source video.
    #[arg(long, global = true)]
    video: Option<PathBuf>,

    /// Detection report location.
    #[arg(long, global = true)]
    report: Option<PathBuf>,

    /// Directory receiving the playlist and its segments.
    #[arg(long, global = true)]
    stream_dir: Option<PathBuf>,

    /// Run detection on every Nth frame.
    #[arg(long, global = true)]
    stride: Option<usize>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Build the face report if the video is newer than it.
    Detect {
        /// Rebuild even if the report is up to date.
        #[arg(long)]
        force: bool,
    },
    /// Start the HLS encoder and wait for it to finish.
    Stream,
    /// Start streaming and, when stale, detection side by side.
    Run,
    /// Print video, playlist and report readiness as JSON.
    Status,
    /// Write a stream artifact to stdout.
    Fetch {
        /// File name inside the stream directory, e.g. `segment_000.ts`.
        name: String,
    },
}

enum Outcome {
    Stream(Result<StartedStream, StreamError>),
    Detection(Option<bool>),
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    if let Err(e) = run() {
        eprintln!("Error: {e}");
        process::exit(1);
    }
}

fn run() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();
    let config = load_config(&cli)?;

    match cli.command {
        Command::Detect { force } => run_detect(&config, force),
        Command::Stream => run_stream(&config),
        Command::Run => run_all(config),
        Command::Status => run_status(&config),
        Command::Fetch { name } => run_fetch(&config, &name),
    }
}

fn load_config(cli: &Cli) -> Result<FacestreamConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => FacestreamConfig::load(path)?,
        None => FacestreamConfig::default(),
    };
    if let Some(video) = &cli.video {
        config.paths.video = video.clone();
    }
    if let Some(report) = &cli.report {
        config.paths.report = report.clone();
    }
    if let Some(dir) = &cli.stream_dir {
        config.paths.stream_dir = dir.clone();
    }
    if let Some(stride) = cli.stride {
        config.sampling.stride = stride;
    }
    config.validate()?;
    Ok(config)
}

fn run_detect(config: &FacestreamConfig, force: bool) -> Result<(), Box<dyn std::error::Error>> {
    let paths = &config.paths;
    if !force && !needs_processing(&paths.video, &paths.report) {
        log::info!("Using existing face detection data");
        return Ok(());
    }

    let session = build_session(config)?;
    let mut logger = StdoutPipelineLogger::new(config.sampling.progress_interval());
    if !session.process(&paths.video, &paths.report, &mut logger) {
        return Err("face detection did not complete".into());
    }
    Ok(())
}

fn run_stream(config: &FacestreamConfig) -> Result<(), Box<dyn std::error::Error>> {
    let started = build_supervisor(config).start(&config.paths.video, &config.paths.stream_dir)?;
    println!("{}", config.playlist_url());
    report_worker_exit(started.worker.wait())
}

fn run_all(config: FacestreamConfig) -> Result<(), Box<dyn std::error::Error>> {
    let config = Arc::new(config);
    let supervisor = build_supervisor(&config);
    let (tx, rx) = unbounded();

    {
        let tx = tx.clone();
        let config = Arc::clone(&config);
        thread::spawn(move || {
            let result = supervisor.start(&config.paths.video, &config.paths.stream_dir);
            let _ = tx.send(Outcome::Stream(result));
        });
    }

    let session = if needs_processing(&config.paths.video, &config.paths.report) {
        Some(Arc::new(build_session(&config)?))
    } else {
        None
    };
    if let Some(session) = &session {
        let session = Arc::clone(session);
        let config = Arc::clone(&config);
        let tx = tx.clone();
        thread::spawn(move || {
            let mut logger = StdoutPipelineLogger::new(config.sampling.progress_interval());
            let ok = session.process(&config.paths.video, &config.paths.report, &mut logger);
            let _ = tx.send(Outcome::Detection(Some(ok)));
        });
    } else {
        log::info!("Using existing face detection data");
        let _ = tx.send(Outcome::Detection(None));
    }
    drop(tx);

    let mut worker = None;
    let mut failed = false;
    for outcome in rx.iter() {
        match outcome {
            Outcome::Stream(Ok(started)) => {
                let running = session.as_ref().is_some_and(|s| s.is_running());
                print_status(&config, running)?;
                worker = Some(started.worker);
            }
            Outcome::Stream(Err(e)) => {
                log::error!("Stream failed to start: {e}");
                failed = true;
            }
            Outcome::Detection(Some(false)) => failed = true,
            Outcome::Detection(_) => {}
        }
    }

    if let Some(worker) = worker {
        report_worker_exit(worker.wait())?;
    }
    if failed {
        return Err("one or more background tasks failed".into());
    }
    Ok(())
}

/// This process owns no session, so a detection running elsewhere is
/// reported from its last stored report only.
fn run_status(config: &FacestreamConfig) -> Result<(), Box<dyn std::error::Error>> {
    print_status(config, false)
}

fn print_status(
    config: &FacestreamConfig,
    session_running: bool,
) -> Result<(), Box<dyn std::error::Error>> {
    let snapshot = StatusSnapshot::collect(config, session_running)?;
    println!("{}", serde_json::to_string_pretty(&snapshot)?);
    Ok(())
}

fn run_fetch(config: &FacestreamConfig, name: &str) -> Result<(), Box<dyn std::error::Error>> {
    let path = resolve_artifact(&config.paths.stream_dir, name)?;
    let bytes = fs::read(&path)?;
    let mut stdout = io::stdout().lock();
    stdout.write_all(&bytes)?;
    stdout.flush()?;
    Ok(())
}

fn report_worker_exit(exit: WorkerExit) -> Result<(), Box<dyn std::error::Error>> {
    match exit {
        WorkerExit::Success => Ok(()),
        WorkerExit::Failed(Some(code)) => Err(format!("encoder exited with code {code}").into()),
        WorkerExit::Failed(None) => Err("encoder was terminated by a signal".into()),
        WorkerExit::Lost(reason) => Err(format!("encoder status unavailable: {reason}").into()),
    }
}

fn build_session(config: &FacestreamConfig) -> Result<DetectionSession, Box<dyn std::error::Error>> {
    let policy = SamplingPolicy::new(config.sampling.stride)?;
    let detector = build_detector(config)?;
    Ok(DetectionSession::new(
        Box::new(|| Box::new(FfmpegReader::new()) as Box<dyn VideoReader>),
        detector,
        policy,
    ))
}

fn build_supervisor(config: &FacestreamConfig) -> StreamSupervisor {
    StreamSupervisor::new(Box::new(FfmpegHlsEncoder::new(&config.stream)), &config.stream)
}

#[cfg(feature = "opencv")]
fn build_detector(
    config: &FacestreamConfig,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    use facestream_core::detection::infrastructure::cascade_face_detector::{
        CascadeFaceDetector, CascadeParams,
    };
    use facestream_core::shared::model_resolver;

    let detector = &config.detector;
    log::info!("Resolving model: {}", detector.model_name);
    let model_path = model_resolver::resolve(
        &detector.model_name,
        &detector.model_url,
        detector.model_path.as_deref(),
    )?;
    Ok(Box::new(CascadeFaceDetector::new(
        &model_path,
        CascadeParams::from(detector),
    )?))
}

#[cfg(not(feature = "opencv"))]
fn build_detector(
    _config: &FacestreamConfig,
) -> Result<Box<dyn FaceDetector>, Box<dyn std::error::Error>> {
    Err("face detection requires the `opencv` feature".into())
}
