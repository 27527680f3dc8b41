//! Media format detection with `ffprobe`.

use amp_job::ToolCache;
use std::path::Path;
use tokio::process::Command;

use crate::TranscribeError;

/// Formats accepted by the transcription service.
pub const SUPPORTED_FORMATS: [&str; 8] = ["amr", "flac", "m4a", "mp3", "mp4", "ogg", "wav", "webm"];

/// Map an ffprobe `format_name` (a comma separated list of demuxer names)
/// to a transcription media format.
pub fn media_format(format_name: &str) -> Option<&'static str> {
    format_name
        .split(',')
        .map(str::trim)
        .find_map(|name| match name {
            "wav" => Some("wav"),
            "mp3" => Some("mp3"),
            "flac" => Some("flac"),
            "ogg" => Some("ogg"),
            "amr" => Some("amr"),
            "webm" | "matroska" => Some("webm"),
            "m4a" => Some("m4a"),
            "mov" | "mp4" => Some("mp4"),
            _ => None,
        })
}

/// Run `ffprobe` and return the container's `format_name`.
///
/// # Errors
/// If ffprobe cannot be started, exits with a failure, or prints nothing.
#[tracing::instrument]
pub async fn format_name(path: &Path) -> Result<String, TranscribeError> {
    let probe_error = |reason: String| TranscribeError::Probe {
        path: path.display().to_string(),
        reason,
    };

    let output = Command::new("ffprobe")
        .arg("-v")
        .arg("error")
        .arg("-show_entries")
        .arg("format=format_name")
        .arg("-of")
        .arg("default=noprint_wrappers=1:nokey=1")
        .arg(path)
        .output()
        .await
        .map_err(|err| probe_error(format!("failed to run ffprobe: {err}")))?;

    if !output.status.success() {
        return Err(probe_error(format!(
            "ffprobe failed with status {}: {}",
            output.status,
            String::from_utf8_lossy(&output.stderr).trim()
        )));
    }

    let format_name = String::from_utf8_lossy(&output.stdout).trim().to_string();
    if format_name.is_empty() {
        return Err(probe_error("ffprobe reported no format".to_string()));
    }

    Ok(format_name)
}

/// Transcription media format of `path`, probing at most once per file.
///
/// # Errors
/// If probing fails or the container is not supported.
pub async fn detect(
    cache: &ToolCache<String>,
    path: &Path,
) -> Result<&'static str, TranscribeError> {
    let format_name = cache
        .get_or_try_insert_with(path, || format_name(path))
        .await?;

    media_format(&format_name).ok_or_else(|| TranscribeError::Probe {
        path: path.display().to_string(),
        reason: format!("unsupported container format {format_name}"),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::path::PathBuf;

    #[test]
    fn test_media_format() {
        assert_eq!(media_format("wav"), Some("wav"));
        assert_eq!(media_format("mov,mp4,m4a,3gp,3g2,mj2"), Some("mp4"));
        assert_eq!(media_format("matroska,webm"), Some("webm"));
        assert_eq!(media_format("avi"), None);
    }

    #[tokio::test]
    async fn test_detect_uses_cached_format() {
        let cache = ToolCache::new();
        let path = PathBuf::from("/media/does-not-exist.m4a");
        cache.insert(&path, "mov,mp4,m4a,3gp,3g2,mj2".to_string());

        // never reaches ffprobe, the file doesn't even exist
        assert_eq!(detect(&cache, &path).await.unwrap(), "mp4");
    }

    #[tokio::test]
    async fn test_detect_rejects_unsupported_format() {
        let cache = ToolCache::new();
        let path = PathBuf::from("/media/clip.avi");
        cache.insert(&path, "avi".to_string());

        assert!(matches!(
            detect(&cache, &path).await,
            Err(TranscribeError::Probe { .. })
        ));
    }
}
