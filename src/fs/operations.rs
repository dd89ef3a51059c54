use std::{
    ffi::OsString,
    io,
    path::{Path, PathBuf},
};

use fs4::tokio::AsyncFileExt;
use tokio::{fs::File, io::AsyncWriteExt};

/// Advisory lock on the sibling `.lock` file of a document. Held by every writer of the
/// document, including writers in other processes.
pub struct FileLock {
    file: File,
}

impl FileLock {
    pub async fn acquire(path: &Path) -> Result<Self, io::Error> {
        let file = File::options()
            .write(true)
            .create(true)
            .truncate(false)
            .open(sibling(path, "lock"))
            .await?;

        // Waiting blocks, and the current holder may be a task on this same thread.
        let file = tokio::task::spawn_blocking(move || {
            file.lock_exclusive()?;
            Ok::<_, io::Error>(file)
        })
        .await
        .map_err(io::Error::other)??;
        Ok(Self { file })
    }

    pub async fn release(self) -> Result<(), io::Error> {
        self.file.unlock_async().await
    }
}

/// Replaces the contents of `path` so that readers observe either the previous or the new
/// contents, never a partially written file. Takes the [FileLock] for the duration of the write.
pub async fn write_atomically(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let lock = FileLock::acquire(path).await?;
    let result = replace_contents(path, contents).await;
    lock.release().await?;
    result
}

/// Writes to a sibling temporary file and renames it over `path`. The caller holds the
/// [FileLock].
pub async fn replace_contents(path: &Path, contents: &[u8]) -> Result<(), io::Error> {
    let temporary = sibling(path, "tmp");
    let mut file = File::create(&temporary).await?;
    file.write_all(contents).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);

    tokio::fs::rename(&temporary, path).await
}

/// Reads the whole file. A missing file is reported as `None`.
pub async fn read_if_exists(path: &Path) -> Result<Option<Vec<u8>>, io::Error> {
    match tokio::fs::read(path).await {
        Ok(contents) => Ok(Some(contents)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn sibling(path: &Path, extension: &str) -> PathBuf {
    let mut name = path.file_name().map(OsString::from).unwrap_or_default();
    name.push(".");
    name.push(extension);
    path.with_file_name(name)
}

#[cfg(test)]
mod tests {
    use anyhow::Result;
    use tempfile::tempdir;

    use super::{read_if_exists, replace_contents, sibling, write_atomically, FileLock};

    #[tokio::test]
    async fn test_write_atomically_creates_and_replaces() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("document.json");

        write_atomically(&path, b"first").await?;
        assert_eq!(read_if_exists(&path).await?, Some(b"first".to_vec()));

        write_atomically(&path, b"second, and longer").await?;
        assert_eq!(
            read_if_exists(&path).await?,
            Some(b"second, and longer".to_vec())
        );

        assert!(!sibling(&path, "tmp").exists());
        Ok(())
    }

    #[tokio::test]
    async fn test_lock_waits_for_holder() -> Result<()> {
        let dir = tempdir()?;
        let path = dir.path().join("document.json");
        write_atomically(&path, b"0").await?;

        let held = FileLock::acquire(&path).await?;
        let (released, written) = tokio::join!(
            async {
                tokio::task::yield_now().await;
                replace_contents(&path, b"1").await?;
                held.release().await
            },
            async {
                write_atomically(&path, b"2").await?;
                read_if_exists(&path).await
            }
        );
        released?;
        assert_eq!(written?, Some(b"2".to_vec()));
        assert_eq!(read_if_exists(&path).await?, Some(b"2".to_vec()));
        Ok(())
    }

    #[tokio::test]
    async fn test_read_missing_file() -> Result<()> {
        let dir = tempdir()?;
        assert_eq!(read_if_exists(&dir.path().join("missing.json")).await?, None);
        Ok(())
    }

    #[test]
    fn test_sibling_names() {
        let path = std::path::Path::new("/data/aggregate.json");
        assert_eq!(
            sibling(path, "lock"),
            std::path::PathBuf::from("/data/aggregate.json.lock")
        );
    }
}
