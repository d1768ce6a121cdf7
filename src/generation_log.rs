use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;

const RULE: &str = "==================================================";

/// Append-only record of every (question, sql) pair the model produced.
pub struct GenerationLog {
    path: PathBuf,
    // keeps concurrent appends from interleaving
    lock: Mutex<()>,
}

impl GenerationLog {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            lock: Mutex::new(()),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn append(&self, question: &str, sql: &str) -> std::io::Result<()> {
        let record = format_record(
            &chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string(),
            question,
            sql,
        );

        let _guard = self.lock.lock().await;
        let mut file = tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await?;
        file.write_all(record.as_bytes()).await?;
        file.flush().await
    }
}

fn format_record(timestamp: &str, question: &str, sql: &str) -> String {
    format!(
        "{RULE}\nTimestamp: {timestamp}\nNatural Language Query:\n{question}\n\nGenerated SQL Query:\n{sql}\n{RULE}\n\n"
    )
}
