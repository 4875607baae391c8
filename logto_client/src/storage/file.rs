//! A storage backend that uses a local file

use std::{collections::BTreeMap, io, path::PathBuf};

use async_trait::async_trait;
use tokio::{fs::OpenOptions, sync::Mutex};

use super::{Storage, StorageKey};
use crate::BoxError;

type Document = BTreeMap<String, String>;

/// Storage kept in a single JSON document on the local filesystem
///
/// On unix, the file is created readable and writable by its owner only. A missing file
/// is treated as empty storage.
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
    lock: Mutex<()>,
}

impl FileStorage {
    /// Constructs a new file storage backed by the document at `path`
    pub fn new(path: PathBuf) -> Self {
        Self {
            path,
            lock: Mutex::new(()),
        }
    }

    async fn read_document(&self) -> Result<Document, io::Error> {
        use tokio::io::AsyncReadExt;

        let mut file = match OpenOptions::new().read(true).open(&self.path).await {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => return Ok(Document::new()),
            Err(err) => return Err(err),
        };

        let mut data = String::new();
        file.read_to_string(&mut data).await?;

        if data.trim().is_empty() {
            return Ok(Document::new());
        }

        Ok(serde_json::from_str(&data)?)
    }

    async fn write_document(&self, document: &Document) -> Result<(), io::Error> {
        use tokio::io::AsyncWriteExt;

        let mut file_opts = OpenOptions::new();

        file_opts.create(true).truncate(true).write(true);

        #[cfg(unix)]
        file_opts.mode(0o600);

        let mut file = file_opts.open(&self.path).await?;
        let data = serde_json::to_string_pretty(document)?;
        file.write_all(data.as_bytes()).await?;
        file.flush().await?;
        Ok(())
    }
}

#[async_trait]
impl Storage for FileStorage {
    async fn get_item(&self, key: StorageKey) -> Result<Option<String>, BoxError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        Ok(document.remove(key.as_str()))
    }

    #[tracing::instrument(skip(self, value), fields(path = %self.path.display()))]
    async fn set_item(&self, key: StorageKey, value: &str) -> Result<(), BoxError> {
        let _guard = self.lock.lock().await;
        let mut document = self.read_document().await?;
        document.insert(key.as_str().to_owned(), value.to_owned());
        self.write_document(&document).await?;
        tracing::trace!("wrote session state");
        Ok(())
    }
}
