use std::io;
use std::path::{Path, PathBuf};

use tokio::io::AsyncWriteExt as _;

/// Replace the file at `path` with `content` so that readers either see the old
/// content or the new content, never a partially written file.
///
/// The content is written to a sibling temp file first, flushed to disk, and then
/// renamed over the destination. The directory is synced afterwards so the rename
/// survives a crash. Concurrent writers to the same path share the temp file.
pub async fn write_atomic(path: &Path, content: &[u8]) -> io::Result<()> {
    if let Some(parent) = path.parent() {
        tokio::fs::create_dir_all(parent).await?;
    }

    let tmppath = temp_path(path)?;
    let result = write_and_sync(&tmppath, content).await;
    if let Err(err) = result {
        let _ = tokio::fs::remove_file(&tmppath).await;
        return Err(err);
    }

    // Ok, writing succeeded, let's now replace the real file with the tmpfile
    tokio::fs::rename(&tmppath, path).await?;
    sync_dir(path.parent().unwrap_or(Path::new(""))).await
}

#[cfg(unix)]
async fn sync_dir(dir: &Path) -> io::Result<()> {
    let dir = if dir.as_os_str().is_empty() {
        Path::new(".")
    } else {
        dir
    };
    tokio::fs::File::open(dir).await?.sync_all().await
}

// Directories can't be opened as files on other platforms
#[cfg(not(unix))]
async fn sync_dir(_dir: &Path) -> io::Result<()> {
    Ok(())
}

async fn write_and_sync(path: &Path, content: &[u8]) -> io::Result<()> {
    let mut file = tokio::fs::File::create(path).await?;
    file.write_all(content).await?;
    file.sync_all().await
}

/// The temp file used while writing `path`. Starts with a dot and ends in `.tmp`
/// so that directory listings looking for real files skip it.
pub fn temp_path(path: &Path) -> io::Result<PathBuf> {
    let filename = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::InvalidInput,
                format!("Path has no valid utf-8 filename: {}", path.display()),
            )
        })?;
    Ok(path.with_file_name(format!(".{filename}.tmp")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn creates_parent_dirs() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("a").join("b").join("file");

        write_atomic(&path, b"content").await.unwrap();

        assert_eq!(b"content".to_vec(), tokio::fs::read(&path).await.unwrap());
    }

    #[tokio::test]
    async fn overwrites_and_leaves_no_temp_file() {
        let tempdir = tempfile::tempdir().unwrap();
        let path = tempdir.path().join("file");

        write_atomic(&path, b"first").await.unwrap();
        write_atomic(&path, b"second").await.unwrap();

        assert_eq!(b"second".to_vec(), tokio::fs::read(&path).await.unwrap());
        assert!(!temp_path(&path).unwrap().exists());
    }

    #[tokio::test]
    async fn syncs_containing_directory() {
        let tempdir = tempfile::tempdir().unwrap();
        sync_dir(tempdir.path()).await.unwrap();
        assert!(sync_dir(&tempdir.path().join("missing")).await.is_err() || cfg!(not(unix)));
    }

    #[test]
    fn temp_path_is_hidden_sibling() {
        let path = Path::new("/some/dir/ins_1.json");
        assert_eq!(
            PathBuf::from("/some/dir/.ins_1.json.tmp"),
            temp_path(path).unwrap()
        );
    }
}
