use std::{
    future::Future,
    ops::Deref,
    path::{Path, PathBuf},
};

use anyhow::{Context, Result};
use serde::{de::DeserializeOwned, Serialize};
use serde_json::Value;
use tracing::debug;

use crate::fs::operations::{read_if_exists, replace_contents, write_atomically, FileLock};

/// Interface for abstracting durable key-value storage. Values are JSON documents that are always
/// read and written whole.
pub trait DocumentStorage: Send + Sync {
    /// Retrieves the document stored under `key`, `None` if it was never written.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send;

    /// Replaces the document stored under `key`.
    fn set(&self, key: &str, value: Value) -> impl Future<Output = Result<()>> + Send;

    /// Replaces the document under `key` with what `change` makes of the current one. No other
    /// writer of `key` runs in between. An error from `change` leaves the document as it was.
    fn update<F>(&self, key: &str, change: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnOnce(Option<Value>) -> Result<Value> + Send;
}

impl<T: Deref + Send + Sync> DocumentStorage for T
where
    T::Target: DocumentStorage,
{
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<Value>>> + Send {
        self.deref().get(key)
    }

    fn set(&self, key: &str, value: Value) -> impl Future<Output = Result<()>> + Send {
        self.deref().set(key, value)
    }

    fn update<F>(&self, key: &str, change: F) -> impl Future<Output = Result<()>> + Send
    where
        F: FnOnce(Option<Value>) -> Result<Value> + Send,
    {
        self.deref().update(key, change)
    }
}

/// Loads a typed document. A document that was never written is reported as its default value.
/// A document that exists but can't be parsed is an error, so that callers don't overwrite data
/// they failed to understand.
pub async fn load_document<T: DeserializeOwned + Default>(
    storage: &impl DocumentStorage,
    key: &str,
) -> Result<T> {
    match storage.get(key).await? {
        Some(value) => serde_json::from_value(value)
            .with_context(|| format!("Document {key} has unexpected shape")),
        None => {
            debug!("Document {key} is missing, using defaults");
            Ok(T::default())
        }
    }
}

/// Typed read-modify-write of a document, see [DocumentStorage::update].
pub async fn update_document<T, F>(storage: &impl DocumentStorage, key: &str, change: F) -> Result<()>
where
    T: Serialize + DeserializeOwned + Default,
    F: FnOnce(&mut T) -> Result<()> + Send,
{
    storage
        .update(key, |current| {
            let mut document: T = match current {
                Some(value) => serde_json::from_value(value)
                    .with_context(|| format!("Document {key} has unexpected shape"))?,
                None => T::default(),
            };
            change(&mut document)?;
            Ok(serde_json::to_value(&document)?)
        })
        .await
}

pub async fn save_document<T: Serialize>(
    storage: &impl DocumentStorage,
    key: &str,
    document: &T,
) -> Result<()> {
    let value = serde_json::to_value(document)?;
    storage.set(key, value).await
}

/// The main realization of [DocumentStorage]. Each key is a `<key>.json` file in a directory.
pub struct FileDocumentStorage {
    data_dir: PathBuf,
}

impl FileDocumentStorage {
    pub fn new(data_dir: PathBuf) -> Result<Self, std::io::Error> {
        std::fs::create_dir_all(&data_dir)?;

        Ok(Self { data_dir })
    }

    fn path_for(&self, key: &str) -> PathBuf {
        self.data_dir.join(format!("{key}.json"))
    }
}

impl DocumentStorage for FileDocumentStorage {
    async fn get(&self, key: &str) -> Result<Option<Value>> {
        read_value(&self.path_for(key)).await
    }

    async fn set(&self, key: &str, value: Value) -> Result<()> {
        let path = self.path_for(key);
        let contents = serde_json::to_vec_pretty(&value)?;
        write_atomically(&path, &contents)
            .await
            .with_context(|| format!("Failed to write {path:?}"))
    }

    async fn update<F>(&self, key: &str, change: F) -> Result<()>
    where
        F: FnOnce(Option<Value>) -> Result<Value> + Send,
    {
        let path = self.path_for(key);
        let lock = FileLock::acquire(&path)
            .await
            .with_context(|| format!("Failed to lock {path:?}"))?;

        let result = async {
            let value = change(read_value(&path).await?)?;
            let contents = serde_json::to_vec_pretty(&value)?;
            replace_contents(&path, &contents)
                .await
                .with_context(|| format!("Failed to write {path:?}"))
        }
        .await;

        lock.release()
            .await
            .with_context(|| format!("Failed to unlock {path:?}"))?;
        result
    }
}

async fn read_value(path: &Path) -> Result<Option<Value>> {
    let Some(contents) = read_if_exists(path)
        .await
        .with_context(|| format!("Failed to read {path:?}"))?
    else {
        return Ok(None);
    };
    let value = serde_json::from_slice(&contents)
        .with_context(|| format!("File {path:?} doesn't contain valid json"))?;
    Ok(Some(value))
}
