//! Working-file helpers for the pipeline.

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

use crate::error::{MediaError, MediaResult};

/// Copy `src` to `dst` byte for byte, creating parent directories.
///
/// The copy lands in a temporary sibling first and is renamed into place, so
/// `dst` never holds a partially written file.
pub async fn copy_verbatim(src: impl AsRef<Path>, dst: impl AsRef<Path>) -> MediaResult<u64> {
    let src = src.as_ref();
    let dst = dst.as_ref();

    if !src.exists() {
        return Err(MediaError::FileNotFound(src.to_path_buf()));
    }

    if let Some(parent) = dst.parent() {
        if !parent.exists() {
            fs::create_dir_all(parent).await?;
        }
    }

    let tmp_dst = dst.with_extension("partial");
    let bytes = match fs::copy(src, &tmp_dst).await {
        Ok(bytes) => bytes,
        Err(e) => {
            tracing::error!(
                "Failed to copy {} -> {}: {}",
                src.display(),
                tmp_dst.display(),
                e
            );
            let _ = fs::remove_file(&tmp_dst).await;
            return Err(MediaError::from(e));
        }
    };

    if let Err(e) = fs::rename(&tmp_dst, dst).await {
        let _ = fs::remove_file(&tmp_dst).await;
        return Err(MediaError::from(e));
    }

    tracing::debug!(bytes, "Copied {} -> {}", src.display(), dst.display());
    Ok(bytes)
}

/// Remove every path that exists. Best effort: failures are logged.
///
/// Returns the number of files actually removed.
pub async fn remove_paths<'a, I>(paths: I) -> usize
where
    I: IntoIterator<Item = &'a Path>,
{
    let mut removed = 0;
    for path in paths {
        match fs::remove_file(path).await {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == ErrorKind::NotFound => {}
            Err(e) => {
                tracing::warn!("Failed to remove working file {}: {}", path.display(), e);
            }
        }
    }
    removed
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_copy_verbatim_creates_parents() {
        let dir = TempDir::new().unwrap();
        let src = dir.path().join("source.bin");
        let dst = dir.path().join("nested/out/result.mkv");
        fs::write(&src, b"original bytes").await.unwrap();

        let copied = copy_verbatim(&src, &dst).await.unwrap();

        assert_eq!(copied, 14);
        assert_eq!(fs::read(&dst).await.unwrap(), b"original bytes");
        assert!(!dst.with_extension("partial").exists());
    }

    #[tokio::test]
    async fn test_failed_copy_leaves_no_partial_file() {
        let dir = TempDir::new().unwrap();
        // A directory passes the existence check but cannot be copied
        let src = dir.path().join("source_dir");
        fs::create_dir(&src).await.unwrap();
        let dst = dir.path().join("result.mkv");
        let partial = dst.with_extension("partial");
        fs::write(&partial, b"stale").await.unwrap();

        let result = copy_verbatim(&src, &dst).await;

        assert!(matches!(result, Err(MediaError::Io(_))));
        assert!(!partial.exists());
        assert!(!dst.exists());
    }

    #[tokio::test]
    async fn test_copy_verbatim_missing_source() {
        let dir = TempDir::new().unwrap();
        let result = copy_verbatim(dir.path().join("nope"), dir.path().join("out")).await;
        assert!(matches!(result, Err(MediaError::FileNotFound(_))));
    }

    #[tokio::test]
    async fn test_remove_paths_ignores_missing() {
        let dir = TempDir::new().unwrap();
        let present = dir.path().join("a.mkv");
        let missing = dir.path().join("b.mkv");
        fs::write(&present, b"x").await.unwrap();

        let removed = remove_paths([present.as_path(), missing.as_path()]).await;

        assert_eq!(removed, 1);
        assert!(!present.exists());
    }
}
