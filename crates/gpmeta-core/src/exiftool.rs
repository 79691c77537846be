// exiftool invocation for applying sidecar metadata to a media file

use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::error::EntryError;
use crate::takeout_json::{read_taken_time, EXIF_DATETIME_FORMAT};

/// Environment override for the exiftool executable.
pub const EXIFTOOL_ENV: &str = "GPMETA_EXIFTOOL";

const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// Writes the metadata of a sidecar into its media file, in place.
pub trait MetadataWriter {
    fn apply(&self, media: &Path, sidecar: &Path) -> Result<(), EntryError>;
}

/// Resolve the exiftool executable: explicit path, then `GPMETA_EXIFTOOL`, then PATH.
pub fn exiftool_path(explicit: Option<&Path>) -> PathBuf {
    if let Some(p) = explicit {
        return p.to_path_buf();
    }
    match std::env::var(EXIFTOOL_ENV) {
        Ok(v) if !v.is_empty() => PathBuf::from(v),
        _ => PathBuf::from(if cfg!(windows) { "exiftool.exe" } else { "exiftool" }),
    }
}

#[derive(Debug, Clone)]
pub struct ExifTool {
    program: PathBuf,
    timeout: Duration,
}

impl ExifTool {
    pub fn new(program: PathBuf, timeout: Duration) -> Self {
        Self { program, timeout }
    }

    /// Arguments for one invocation: import every tag from the sidecar, override
    /// DateTimeOriginal with the photo-taken time when known, no backup copy.
    pub fn args(media: &Path, sidecar: &Path) -> Vec<String> {
        let mut args = vec![format!("-json={}", sidecar.display())];
        if let Some(taken) = read_taken_time(sidecar) {
            args.push(format!("-DateTimeOriginal={}", taken.format(EXIF_DATETIME_FORMAT)));
        }
        args.push("-overwrite_original".to_string());
        args.push(media.display().to_string());
        args
    }

    fn failure(media: &Path, reason: String) -> EntryError {
        EntryError::ExternalToolFailure {
            media: media.to_path_buf(),
            reason,
        }
    }
}

impl MetadataWriter for ExifTool {
    fn apply(&self, media: &Path, sidecar: &Path) -> Result<(), EntryError> {
        let args = Self::args(media, sidecar);
        debug!("{} {}", self.program.display(), args.join(" "));

        let mut child = Command::new(&self.program)
            .args(&args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::piped())
            .spawn()
            .map_err(|e| Self::failure(media, format!("failed to run {}: {}", self.program.display(), e)))?;

        // Drain stderr on a side thread so a chatty tool cannot block on a full pipe.
        let stderr = child.stderr.take().map(|mut pipe| {
            std::thread::spawn(move || {
                let mut text = String::new();
                let _ = pipe.read_to_string(&mut text);
                text
            })
        });

        let started = Instant::now();
        let status = loop {
            match child.try_wait() {
                Ok(Some(status)) => break status,
                Ok(None) if started.elapsed() >= self.timeout => {
                    let _ = child.kill();
                    let _ = child.wait();
                    return Err(Self::failure(
                        media,
                        format!("timed out after {}s", self.timeout.as_secs()),
                    ));
                }
                Ok(None) => std::thread::sleep(POLL_INTERVAL),
                Err(e) => return Err(Self::failure(media, format!("waiting for exiftool: {}", e))),
            }
        };

        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        if !status.success() {
            let code = status
                .code()
                .map_or_else(|| "signal".to_string(), |c| c.to_string());
            warn!("exiftool exited with {} on {}: {}", code, media.display(), stderr.trim());
            return Err(Self::failure(media, format!("exit status {}", code)));
        }
        if !stderr.trim().is_empty() {
            debug!("exiftool: {}", stderr.trim());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn test_args_with_taken_time() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("IMG.jpg.json");
        fs::write(&sidecar, br#"{"photoTakenTime": {"timestamp": "1577872800"}}"#).unwrap();
        let media = dir.path().join("IMG.jpg");

        let args = ExifTool::args(&media, &sidecar);
        assert_eq!(args.len(), 4);
        assert_eq!(args[0], format!("-json={}", sidecar.display()));
        assert!(args[1].starts_with("-DateTimeOriginal="));
        assert!(!args[1].contains('"'));
        assert_eq!(args[2], "-overwrite_original");
        assert_eq!(args[3], media.display().to_string());
    }

    #[test]
    fn test_args_without_taken_time() {
        let dir = tempfile::tempdir().unwrap();
        let sidecar = dir.path().join("IMG.jpg.json");
        fs::write(&sidecar, br#"{"title": "IMG.jpg"}"#).unwrap();
        let args = ExifTool::args(&dir.path().join("IMG.jpg"), &sidecar);
        assert_eq!(args.len(), 3);
        assert_eq!(args[1], "-overwrite_original");
    }

    #[test]
    fn test_missing_program_is_tool_failure() {
        let dir = tempfile::tempdir().unwrap();
        let tool = ExifTool::new(dir.path().join("no-such-exiftool"), Duration::from_secs(5));
        let err = tool
            .apply(&dir.path().join("IMG.jpg"), &dir.path().join("IMG.jpg.json"))
            .unwrap_err();
        assert!(matches!(err, EntryError::ExternalToolFailure { .. }));
    }

    #[cfg(unix)]
    #[test]
    fn test_nonzero_exit_and_timeout() {
        let dir = tempfile::tempdir().unwrap();
        let media = dir.path().join("IMG.jpg");
        let sidecar = dir.path().join("IMG.jpg.json");

        // `false` ignores its arguments and exits 1
        let err = ExifTool::new(PathBuf::from("false"), Duration::from_secs(5))
            .apply(&media, &sidecar)
            .unwrap_err();
        assert!(err.to_string().contains("exit status 1"));

        // `yes` never exits on its own
        let err = ExifTool::new(PathBuf::from("yes"), Duration::from_millis(200))
            .apply(&media, &sidecar)
            .unwrap_err();
        assert!(err.to_string().contains("timed out"));
    }
}
