use std::ffi::OsString;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::thread;
use std::time::{Duration, Instant};

use crate::shared::constants::REMUX_TIMEOUT;
use crate::video::domain::audio_remuxer::{AudioRemuxer, RemuxOutcome};

const POLL_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, thiserror::Error)]
pub enum RemuxError {
    #[error("ffmpeg binary not found on PATH")]
    NotFound,

    #[error("failed to spawn ffmpeg: {0}")]
    Spawn(#[from] std::io::Error),

    #[error("ffmpeg timed out after {0:?}")]
    Timeout(Duration),

    #[error("ffmpeg exited with {code:?}: {stderr}")]
    Failed { code: Option<i32>, stderr: String },
}

/// Re-encodes the raw output to H.264 with the source's audio by shelling
/// out to the `ffmpeg` binary.
///
/// Tries audio first, then a silent re-encode, then moves the raw file
/// into place untouched.
pub struct FfmpegRemuxer {
    binary: Option<PathBuf>,
    timeout: Duration,
}

impl FfmpegRemuxer {
    pub fn new() -> Self {
        Self::with_binary(which::which("ffmpeg").ok(), REMUX_TIMEOUT)
    }

    pub fn with_binary(binary: Option<PathBuf>, timeout: Duration) -> Self {
        Self { binary, timeout }
    }

    fn run(&self, args: &[OsString]) -> Result<(), RemuxError> {
        let binary = self.binary.as_ref().ok_or(RemuxError::NotFound)?;
        let mut command = Command::new(binary);
        command.args(args);
        run_with_timeout(command, self.timeout)
    }
}

impl Default for FfmpegRemuxer {
    fn default() -> Self {
        Self::new()
    }
}

impl AudioRemuxer for FfmpegRemuxer {
    fn remux(
        &self,
        source: &Path,
        processed: &Path,
        output: &Path,
    ) -> Result<RemuxOutcome, Box<dyn std::error::Error>> {
        let attempts = [
            (RemuxOutcome::WithAudio, with_audio_args(source, processed, output)),
            (RemuxOutcome::Silent, silent_args(processed, output)),
        ];

        for (outcome, args) in attempts {
            match self.run(&args) {
                Ok(()) => {
                    if let Err(e) = std::fs::remove_file(processed) {
                        log::warn!("Could not remove {}: {e}", processed.display());
                    }
                    log::info!("Remux finished ({outcome:?}): {}", output.display());
                    return Ok(outcome);
                }
                Err(RemuxError::NotFound) => {
                    log::warn!("ffmpeg not found, keeping encoder output as-is");
                    break;
                }
                Err(e) => log::warn!("Remux attempt {outcome:?} failed: {e}"),
            }
        }

        if processed != output {
            std::fs::rename(processed, output)?;
        }
        Ok(RemuxOutcome::Untouched)
    }
}

fn with_audio_args(source: &Path, processed: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-v", "error", "-i"].map(OsString::from).to_vec();
    args.push(processed.into());
    args.push("-i".into());
    args.push(source.into());
    args.extend(
        [
            "-map", "0:v:0", "-map", "1:a:0", "-c:v", "libx264", "-preset", "fast", "-crf", "23",
            "-pix_fmt", "yuv420p", "-c:a", "aac", "-movflags", "+faststart", "-shortest",
        ]
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

fn silent_args(processed: &Path, output: &Path) -> Vec<OsString> {
    let mut args: Vec<OsString> = ["-y", "-v", "error", "-i"].map(OsString::from).to_vec();
    args.push(processed.into());
    args.extend(
        [
            "-c:v", "libx264", "-preset", "fast", "-crf", "23", "-pix_fmt", "yuv420p", "-an",
            "-movflags", "+faststart",
        ]
        .map(OsString::from),
    );
    args.push(output.into());
    args
}

/// Runs `command` to completion, killing it once `timeout` elapses.
///
/// stderr is drained on its own thread so a chatty child never blocks on a
/// full pipe.
fn run_with_timeout(mut command: Command, timeout: Duration) -> Result<(), RemuxError> {
    let mut child = command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::piped())
        .spawn()?;

    let drain = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut text = String::new();
            let _ = pipe.read_to_string(&mut text);
            text
        })
    });
    let collect_stderr = |drain: Option<thread::JoinHandle<String>>| {
        drain
            .and_then(|handle| handle.join().ok())
            .unwrap_or_default()
    };

    let started = Instant::now();
    let status = loop {
        if let Some(status) = child.try_wait()? {
            break status;
        }
        if started.elapsed() >= timeout {
            let _ = child.kill();
            let _ = child.wait();
            collect_stderr(drain);
            return Err(RemuxError::Timeout(timeout));
        }
        thread::sleep(POLL_INTERVAL);
    };

    let stderr = collect_stderr(drain);
    if status.success() {
        return Ok(());
    }
    Err(RemuxError::Failed {
        code: status.code(),
        stderr: stderr.trim().to_string(),
    })
}
