use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Error, Debug)]
pub enum ModelResolveError {
    #[error("configured model file does not exist: {0}")]
    MissingOverride(PathBuf),
    #[error("failed to create cache directory: {0}")]
    CacheDir(#[source] std::io::Error),
    #[error("download failed for {url}: {source}")]
    Download {
        url: String,
        #[source]
        source: reqwest::Error,
    },
    #[error("failed to write model to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("could not determine cache directory")]
    NoCacheDir,
}

/// Resolve the cascade model file, checking local locations before downloading.
///
/// Resolution order:
/// 1. Explicit override (must exist)
/// 2. User cache directory (platform-specific)
/// 3. Download from URL to cache
pub fn resolve(
    name: &str,
    url: &str,
    override_path: Option<&Path>,
) -> Result<PathBuf, ModelResolveError> {
    if let Some(path) = override_path {
        return if path.exists() {
            Ok(path.to_path_buf())
        } else {
            Err(ModelResolveError::MissingOverride(path.to_path_buf()))
        };
    }

    let cache_dir = model_cache_dir()?;
    resolve_in(&cache_dir, name, url)
}

fn resolve_in(cache_dir: &Path, name: &str, url: &str) -> Result<PathBuf, ModelResolveError> {
    let cached_path = cache_dir.join(name);
    if cached_path.exists() {
        return Ok(cached_path);
    }

    fs::create_dir_all(cache_dir).map_err(ModelResolveError::CacheDir)?;
    log::info!("Downloading {name} from {url}");
    download(url, &cached_path)?;
    Ok(cached_path)
}

/// Platform-specific model cache directory.
///
/// - macOS: `~/Library/Application Support/Facestream/models/`
/// - Linux: `$XDG_CACHE_HOME/Facestream/models/` or `~/.cache/Facestream/models/`
/// - Windows: `%LOCALAPPDATA%/Facestream/models/`
pub fn model_cache_dir() -> Result<PathBuf, ModelResolveError> {
    #[cfg(target_os = "macos")]
    {
        dirs::data_dir()
            .map(|d| d.join("Facestream").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
    #[cfg(not(target_os = "macos"))]
    {
        dirs::cache_dir()
            .map(|d| d.join("Facestream").join("models"))
            .ok_or(ModelResolveError::NoCacheDir)
    }
}

fn download(url: &str, dest: &Path) -> Result<(), ModelResolveError> {
    let download_err = |e| ModelResolveError::Download {
        url: url.to_string(),
        source: e,
    };
    let response = reqwest::blocking::get(url)
        .and_then(|r| r.error_for_status())
        .map_err(download_err)?;
    let bytes = response.bytes().map_err(download_err)?;

    // Write to a temp file first, then rename for atomicity
    let temp_path = dest.with_extension("part");
    let write_err = |e| ModelResolveError::Write {
        path: temp_path.clone(),
        source: e,
    };
    let mut file = fs::File::create(&temp_path).map_err(write_err)?;
    file.write_all(&bytes).map_err(write_err)?;
    file.flush().map_err(write_err)?;
    drop(file);

    fs::rename(&temp_path, dest).map_err(|e| ModelResolveError::Write {
        path: dest.to_path_buf(),
        source: e,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_override_path_is_returned_when_present() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("cascade.xml");
        fs::write(&model, b"<opencv_storage/>").unwrap();

        let resolved = resolve("ignored.xml", "http://invalid.example.com", Some(&model)).unwrap();
        assert_eq!(resolved, model);
    }

    #[test]
    fn test_missing_override_is_an_error() {
        let tmp = TempDir::new().unwrap();
        let model = tmp.path().join("absent.xml");

        let err = resolve("ignored.xml", "http://invalid.example.com", Some(&model)).unwrap_err();
        assert!(matches!(err, ModelResolveError::MissingOverride(p) if p == model));
    }

    #[test]
    fn test_cached_file_skips_download() {
        let tmp = TempDir::new().unwrap();
        fs::write(tmp.path().join("cascade.xml"), b"cached").unwrap();

        let resolved = resolve_in(
            tmp.path(),
            "cascade.xml",
            "http://invalid.nonexistent.example.com/cascade.xml",
        )
        .unwrap();
        assert_eq!(fs::read(resolved).unwrap(), b"cached");
    }

    #[test]
    fn test_model_cache_dir_returns_path() {
        let path = model_cache_dir().unwrap();
        assert!(path.to_string_lossy().contains("Facestream"));
        assert!(path.to_string_lossy().contains("models"));
    }

    #[test]
    fn test_download_atomic_no_partial_on_failure() {
        let tmp = TempDir::new().unwrap();
        let dest = tmp.path().join("cascade.xml");
        let result = download("http://invalid.nonexistent.example.com/model", &dest);
        assert!(result.is_err());
        assert!(!dest.exists());
        assert!(!dest.with_extension("part").exists());
    }
}
