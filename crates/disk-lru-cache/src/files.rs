//! Filesystem primitives used by the journal and the engine

use std::io::ErrorKind;
use std::path::Path;
use tokio::fs;

/// Delete a file, treating "already gone" as success
pub async fn delete_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_file(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

/// Rename `from` to `to`. When `overwrite` is set any existing destination is
/// deleted first.
pub async fn rename(from: &Path, to: &Path, overwrite: bool) -> std::io::Result<()> {
    if overwrite {
        delete_if_exists(to).await?;
    }
    fs::rename(from, to).await
}

pub async fn exists(path: &Path) -> bool {
    fs::try_exists(path).await.unwrap_or(false)
}

pub async fn file_len(path: &Path) -> std::io::Result<u64> {
    Ok(fs::metadata(path).await?.len())
}

/// Recursively delete a directory and everything in it, foreign files included
pub async fn remove_dir_all_if_exists(path: &Path) -> std::io::Result<()> {
    match fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_delete_if_exists_tolerates_missing() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing");
        assert!(delete_if_exists(&path).await.is_ok());

        fs::write(&path, b"x").await.unwrap();
        delete_if_exists(&path).await.unwrap();
        assert!(!exists(&path).await);
    }

    #[tokio::test]
    async fn test_rename_with_overwrite() {
        let dir = tempdir().unwrap();
        let from = dir.path().join("from");
        let to = dir.path().join("to");
        fs::write(&from, b"new").await.unwrap();
        fs::write(&to, b"old data").await.unwrap();

        rename(&from, &to, true).await.unwrap();

        assert!(!exists(&from).await);
        assert_eq!(fs::read(&to).await.unwrap(), b"new");
        assert_eq!(file_len(&to).await.unwrap(), 3);
    }

    #[tokio::test]
    async fn test_remove_dir_all_if_exists() {
        let dir = tempdir().unwrap();
        let cache_dir = dir.path().join("cache");
        fs::create_dir_all(cache_dir.join("nested")).await.unwrap();
        fs::write(cache_dir.join("nested/file"), b"F").await.unwrap();

        remove_dir_all_if_exists(&cache_dir).await.unwrap();
        assert!(!exists(&cache_dir).await);

        // Second call is a no-op
        remove_dir_all_if_exists(&cache_dir).await.unwrap();
    }
}
