use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::Stdio;

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::RelayError;

/// Converts Telegram animations (MP4 clips) into something Discord plays inline.
#[async_trait]
pub trait Transcoder: Send + Sync {
    async fn to_gif(&self, input: &Path, output: &Path, fps: u32) -> Result<(), RelayError>;
}

/// Shells out to `ffmpeg`.
pub struct FfmpegTranscoder {
    program: PathBuf,
}

impl FfmpegTranscoder {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn args(input: &Path, output: &Path, fps: u32) -> Vec<OsString> {
        let mut args: Vec<OsString> = ["-hide_banner", "-loglevel", "error", "-y", "-i"]
            .into_iter()
            .map(OsString::from)
            .collect();
        args.push(input.as_os_str().to_owned());
        args.push("-r".into());
        args.push(fps.to_string().into());
        args.push("-f".into());
        args.push("gif".into());
        args.push(output.as_os_str().to_owned());
        args
    }
}

#[async_trait]
impl Transcoder for FfmpegTranscoder {
    async fn to_gif(&self, input: &Path, output: &Path, fps: u32) -> Result<(), RelayError> {
        debug!(
            "Converting {} -> {} at {} fps",
            input.display(),
            output.display(),
            fps
        );

        let result = tokio::process::Command::new(&self.program)
            .args(Self::args(input, output, fps))
            .stdin(Stdio::null())
            .kill_on_drop(true)
            .output()
            .await
            .map_err(|e| {
                RelayError::Conversion(format!(
                    "failed to run {}: {}",
                    self.program.display(),
                    e
                ))
            })?;

        if !result.status.success() {
            let stderr = String::from_utf8_lossy(&result.stderr);
            return Err(RelayError::Conversion(format!(
                "{} exited with {}: {}",
                self.program.display(),
                result.status,
                stderr.trim()
            )));
        }

        info!("Converted animation to {}", output.display());
        Ok(())
    }
}
