use std::fs;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use thiserror::Error;

use crate::shared::config::StreamConfig;
use crate::shared::single_flight::SingleFlight;
use crate::streaming::domain::stream_encoder::{is_playlist_ready, EncodeJob, StreamEncoder};

#[derive(Error, Debug)]
pub enum StreamError {
    #[error("video not found: {0}")]
    NotFound(PathBuf),
    #[error("another stream start is in progress")]
    AlreadyStarting,
    #[error("failed to prepare {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to launch encoder: {0}")]
    Spawn(#[source] std::io::Error),
    #[error("playlist {playlist} not ready after {attempts} checks")]
    Timeout { playlist: PathBuf, attempts: u32 },
}

/// How an encoding worker ended.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WorkerExit {
    Success,
    /// Non-zero exit; `None` when killed by a signal.
    Failed(Option<i32>),
    /// The exit status could not be collected.
    Lost(String),
}

/// Owned handle to a running encoder and the thread draining its output.
///
/// Dropping the handle detaches it: the worker keeps running and its
/// outcome is only logged.
#[derive(Debug)]
pub struct EncoderWorker {
    pid: u32,
    drain: JoinHandle<WorkerExit>,
}

impl EncoderWorker {
    fn supervise(mut child: Child) -> Self {
        let pid = child.id();
        let drain = thread::spawn(move || {
            if let Some(stderr) = child.stderr.take() {
                for line in BufReader::new(stderr).lines() {
                    match line {
                        Ok(line) if !line.trim().is_empty() => {
                            log::debug!("encoder: {}", line.trim())
                        }
                        Ok(_) => {}
                        Err(e) => {
                            log::debug!("encoder output unreadable: {e}");
                            break;
                        }
                    }
                }
            }

            match child.wait() {
                Ok(status) if status.success() => {
                    log::info!("Encoder {pid} completed conversion");
                    WorkerExit::Success
                }
                Ok(status) => {
                    log::error!("Encoder {pid} exited with error: {status}");
                    WorkerExit::Failed(status.code())
                }
                Err(e) => {
                    log::error!("Encoder {pid} could not be waited on: {e}");
                    WorkerExit::Lost(e.to_string())
                }
            }
        });
        Self { pid, drain }
    }

    pub fn pid(&self) -> u32 {
        self.pid
    }

    /// Blocks until the worker exits.
    pub fn wait(self) -> WorkerExit {
        self.drain
            .join()
            .unwrap_or_else(|_| WorkerExit::Lost("drain thread panicked".into()))
    }
}

/// A stream whose playlist has become readable.
#[derive(Debug)]
pub struct StartedStream {
    pub playlist: PathBuf,
    pub worker: EncoderWorker,
}

/// Launches the re-encoding worker and waits for its first playlist write.
///
/// `start` resets the output directory and launches unconditionally.
/// Overlapping `start` calls are rejected while one is still launching or
/// polling. Workers from earlier completed calls are not tracked: they
/// keep running, and may still be writing when a later call resets the
/// directory.
pub struct StreamSupervisor {
    encoder: Box<dyn StreamEncoder>,
    playlist_name: String,
    poll_interval: Duration,
    poll_attempts: u32,
    starting: SingleFlight,
}

impl StreamSupervisor {
    pub fn new(encoder: Box<dyn StreamEncoder>, config: &StreamConfig) -> Self {
        Self {
            encoder,
            playlist_name: config.playlist_name.clone(),
            poll_interval: config.poll_interval(),
            poll_attempts: config.poll_attempts,
            starting: SingleFlight::new(),
        }
    }

    #[cfg(test)]
    fn is_starting(&self) -> bool {
        self.starting.is_active()
    }

    /// Resets `output_dir`, launches the encoder and polls for the playlist.
    ///
    /// On [`StreamError::Timeout`] the worker is left running.
    pub fn start(&self, video: &Path, output_dir: &Path) -> Result<StartedStream, StreamError> {
        let _guard = self
            .starting
            .try_acquire()
            .ok_or(StreamError::AlreadyStarting)?;

        reset_dir(output_dir)?;

        if !video.exists() {
            log::error!("Video file not found: {}", video.display());
            return Err(StreamError::NotFound(video.to_path_buf()));
        }

        let job = EncodeJob {
            video: video.to_path_buf(),
            output_dir: output_dir.to_path_buf(),
            playlist: output_dir.join(&self.playlist_name),
        };
        let child = self.encoder.spawn(&job).map_err(StreamError::Spawn)?;
        let worker = EncoderWorker::supervise(child);
        log::info!("Encoder {} launched for {}", worker.pid(), video.display());

        for _ in 0..self.poll_attempts {
            if is_playlist_ready(&job.playlist) {
                log::info!("Playlist created: {}", job.playlist.display());
                return Ok(StartedStream {
                    playlist: job.playlist,
                    worker,
                });
            }
            thread::sleep(self.poll_interval);
        }

        log::error!("Timeout waiting for playlist creation");
        Err(StreamError::Timeout {
            playlist: job.playlist,
            attempts: self.poll_attempts,
        })
    }
}

/// Creates `dir` if needed and deletes everything inside it.
fn reset_dir(dir: &Path) -> Result<(), StreamError> {
    let io_err = |source| StreamError::Io {
        path: dir.to_path_buf(),
        source,
    };
    fs::create_dir_all(dir).map_err(io_err)?;
    for entry in fs::read_dir(dir).map_err(io_err)? {
        let path = entry.map_err(io_err)?.path();
        let removed = if path.is_dir() {
            fs::remove_dir_all(&path)
        } else {
            fs::remove_file(&path)
        };
        removed.map_err(|source| StreamError::Io { path, source })?;
    }
    Ok(())
}
