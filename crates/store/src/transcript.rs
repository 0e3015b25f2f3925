//! Append-only JSONL transcripts.
//!
//! Each conversation gets a `<chatId>.jsonl` file under the transcript
//! directory. Every persisted message is appended as a single JSON line.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use cg_domain::error::{Error, Result};

use crate::store::MessageRecord;

/// A single transcript line.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TranscriptLine {
    pub timestamp: String,
    pub role: String,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message_group_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,
}

impl From<&MessageRecord> for TranscriptLine {
    fn from(r: &MessageRecord) -> Self {
        Self {
            timestamp: r.created_at.to_rfc3339(),
            role: r.message.role.as_str().to_string(),
            content: r.message.content.extract_all_text(),
            message_group_id: r.message_group_id.clone(),
            model: r.model.clone(),
        }
    }
}

pub struct TranscriptWriter {
    base_dir: PathBuf,
}

impl TranscriptWriter {
    pub fn new(base_dir: &Path) -> Self {
        Self {
            base_dir: base_dir.to_path_buf(),
        }
    }

    fn path_for(&self, chat_id: &str) -> Result<PathBuf> {
        let safe = !chat_id.is_empty()
            && chat_id
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');
        if !safe {
            return Err(Error::Store(format!(
                "chat id '{chat_id}' is not usable as a transcript file name"
            )));
        }
        Ok(self.base_dir.join(format!("{chat_id}.jsonl")))
    }

    /// Append lines to a conversation's transcript.
    ///
    /// File I/O runs under `spawn_blocking`.
    pub async fn append_async(&self, chat_id: &str, lines: Vec<TranscriptLine>) -> Result<()> {
        if lines.is_empty() {
            return Ok(());
        }

        let path = self.path_for(chat_id)?;
        let mut buf = String::new();
        for line in &lines {
            buf.push_str(&serde_json::to_string(line)?);
            buf.push('\n');
        }
        let dir = self.base_dir.clone();

        tokio::task::spawn_blocking(move || {
            use std::io::Write;
            std::fs::create_dir_all(&dir)?;
            let mut file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)?;
            file.write_all(buf.as_bytes())?;
            Ok::<(), Error>(())
        })
        .await
        .map_err(|e| Error::Other(format!("spawn_blocking join: {e}")))??;

        tracing::debug!(chat_id, lines = lines.len(), "transcript appended");
        Ok(())
    }

    /// Read back a transcript. Malformed lines are skipped.
    pub fn read(&self, chat_id: &str) -> Result<Vec<TranscriptLine>> {
        let path = self.path_for(chat_id)?;
        if !path.exists() {
            return Ok(Vec::new());
        }
        let content = std::fs::read_to_string(&path)?;
        Ok(content
            .lines()
            .filter(|l| !l.trim().is_empty())
            .filter_map(|l| serde_json::from_str(l).ok())
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cg_domain::tool::Message;

    #[tokio::test]
    async fn append_then_read_back() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(&tmp.path().join("transcripts"));

        let rec = MessageRecord::new("chat-1", "u1", Message::user("hello"))
            .with_group(Some("g1".into()));
        writer
            .append_async("chat-1", vec![TranscriptLine::from(&rec)])
            .await
            .unwrap();
        let rec = MessageRecord::new("chat-1", "u1", Message::assistant("hi there"));
        writer
            .append_async("chat-1", vec![TranscriptLine::from(&rec)])
            .await
            .unwrap();

        let lines = writer.read("chat-1").unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].role, "user");
        assert_eq!(lines[0].message_group_id.as_deref(), Some("g1"));
        assert_eq!(lines[1].content, "hi there");
    }

    #[tokio::test]
    async fn path_traversal_ids_are_rejected() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(tmp.path());
        let rec = MessageRecord::new("x", "u", Message::user("x"));
        let err = writer
            .append_async("../escape", vec![TranscriptLine::from(&rec)])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("transcript file name"));
    }

    #[test]
    fn missing_transcript_reads_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let writer = TranscriptWriter::new(tmp.path());
        assert!(writer.read("nothing-here").unwrap().is_empty());
    }
}
