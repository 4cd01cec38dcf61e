//! Items file written by the last stage of a chain.

use crate::chain::ItemConsumer;
use crate::logging::marker;
use async_trait::async_trait;
use loadchain_shared::errors::{LoadchainError, LoadchainResult};
use loadchain_shared::DataItem;
use std::path::{Path, PathBuf};
use tokio::fs::File;
use tokio::io::{AsyncWriteExt, BufWriter};
use tokio::sync::Mutex;

/// Consumer that records every item it receives as a `name,size` line.
///
/// The file has the same format as the item input file, so one run's output
/// can seed the next run.
pub struct ItemFileOutput {
    name: String,
    path: PathBuf,
    writer: Mutex<Option<BufWriter<File>>>,
}

impl ItemFileOutput {
    /// Create (or truncate) the items file. An existing file is overwritten
    /// with a warning.
    pub fn create(path: &Path) -> LoadchainResult<Self> {
        if path.exists() {
            tracing::warn!(
                marker = marker::ERR,
                path = %path.display(),
                "Items output file \"{}\" already exists",
                path.display()
            );
        }

        let file = std::fs::File::create(path).map_err(|e| {
            LoadchainError::Config(format!(
                "Failed to create items output file {}: {}",
                path.display(),
                e
            ))
        })?;

        Ok(Self {
            name: format!("items-output:{}", path.display()),
            path: path.to_path_buf(),
            writer: Mutex::new(Some(BufWriter::new(File::from_std(file)))),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

#[async_trait]
impl ItemConsumer for ItemFileOutput {
    fn name(&self) -> &str {
        &self.name
    }

    async fn put(&self, item: DataItem) -> LoadchainResult<()> {
        let mut guard = self.writer.lock().await;
        let writer = guard.as_mut().ok_or_else(|| {
            LoadchainError::InvalidState(format!("{} is already complete", self.name))
        })?;
        writer.write_all(format!("{}\n", item).as_bytes()).await?;
        Ok(())
    }

    async fn complete(&self) {
        let Some(mut writer) = self.writer.lock().await.take() else {
            return;
        };
        if let Err(e) = writer.flush().await {
            tracing::warn!(
                marker = marker::ERR,
                path = %self.path.display(),
                error = %e,
                "Failed to flush items output file"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::logging::capture::CapturedLogs;

    #[tokio::test]
    async fn test_writes_item_lines_and_flushes_on_complete() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        let output = ItemFileOutput::create(&path).unwrap();

        output.put(DataItem::new("a", 1)).await.unwrap();
        output.put(DataItem::new("b", 2048)).await.unwrap();
        output.complete().await;
        output.complete().await;

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "a,1\nb,2048\n");
        assert!(output.put(DataItem::new("c", 3)).await.is_err());
    }

    #[test]
    fn test_existing_file_is_truncated_with_warning() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("items.csv");
        std::fs::write(&path, "old,1\n").unwrap();

        let logs = CapturedLogs::default();
        tracing::subscriber::with_default(logs.subscriber(), || {
            ItemFileOutput::create(&path).unwrap();
        });

        assert_eq!(std::fs::read_to_string(&path).unwrap(), "");
        let line = logs.line_containing("already exists").unwrap();
        assert!(line.contains("WARN"), "{}", line);
    }

    #[test]
    fn test_missing_directory_is_config_error() {
        let dir = tempfile::tempdir().unwrap();
        let res = ItemFileOutput::create(&dir.path().join("absent").join("items.csv"));
        assert!(matches!(res, Err(LoadchainError::Config(_))));
    }
}
