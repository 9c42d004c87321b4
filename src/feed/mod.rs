// src/feed/mod.rs

//! Feed file staging.
//!
//! A [`FeedFile`] holds the rows of one CSV feed in memory and stages them
//! in the working directory. The first line is always the header derived
//! from the `output` column names.

pub mod ascii;
pub mod template;

use std::path::{Path, PathBuf};

use crate::error::{AppError, Result};
use crate::models::{Fields, OutputColumns};
use crate::storage::FeedArchive;
use crate::storage::local::write_atomic;

/// One CSV feed staged in the working directory.
#[derive(Debug)]
pub struct FeedFile {
    path: PathBuf,
    filename: String,
    columns: OutputColumns,
    lines: Vec<Vec<String>>,
}

impl FeedFile {
    pub fn new(working_dir: impl AsRef<Path>, filename: &str, columns: OutputColumns) -> Self {
        let lines = vec![columns.headers()];
        Self {
            path: working_dir.as_ref().join(filename),
            filename: filename.to_string(),
            columns,
            lines,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// Header followed by data rows.
    pub fn lines(&self) -> &[Vec<String>] {
        &self.lines
    }

    /// Number of data rows.
    pub fn row_count(&self) -> usize {
        self.lines.len().saturating_sub(1)
    }

    /// Start an empty feed and make sure the working directory exists.
    pub async fn init_file(&mut self) -> Result<()> {
        self.lines = vec![self.columns.headers()];
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        Ok(())
    }

    /// Load the staged file, if any. Returns whether it existed.
    pub async fn read_file(&mut self) -> Result<bool> {
        match tokio::fs::read(&self.path).await {
            Ok(bytes) => {
                self.load_bytes(&bytes)?;
                Ok(true)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                self.init_file().await?;
                Ok(false)
            }
            Err(e) => Err(AppError::Io(e)),
        }
    }

    /// Load a previously shipped feed from the bucket. Returns whether it
    /// existed.
    pub async fn read_file_from_bucket(
        &mut self,
        bucket: &dyn FeedArchive,
        name: &str,
    ) -> Result<bool> {
        match bucket.fetch(name).await? {
            Some(bytes) => {
                self.load_bytes(&bytes)?;
                Ok(true)
            }
            None => {
                self.init_file().await?;
                Ok(false)
            }
        }
    }

    /// Replace the lines with CSV `bytes`; the stored header is replaced by
    /// the current column names.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> Result<()> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(false)
            .flexible(true)
            .from_reader(bytes);
        let mut lines = vec![self.columns.headers()];
        for (index, record) in reader.records().enumerate() {
            let record = record?;
            if index == 0 {
                continue;
            }
            lines.push(record.iter().map(str::to_string).collect());
        }
        self.lines = lines;
        Ok(())
    }

    /// Render one row from `fields` through the output templates.
    pub fn append_line(&mut self, fields: &Fields) {
        let line = self
            .columns
            .iter()
            .map(|(_, value)| template::render(value, fields))
            .collect();
        self.lines.push(line);
    }

    /// Drop the first `first_changed` data rows. The header is kept.
    pub fn trim_lines(&mut self, first_changed: usize) {
        let end = 1 + first_changed.min(self.row_count());
        self.lines.drain(1..end);
    }

    /// Transliterate every data row to ASCII, HTML-escaping the columns
    /// named in `html_fields`, then rewrite the staged file.
    pub async fn convert_lines_to_ascii(&mut self, html_fields: &[String]) -> Result<()> {
        let html_columns: Vec<bool> = self
            .columns
            .iter()
            .map(|(header, _)| html_fields.iter().any(|f| f == header))
            .collect();

        for line in self.lines.iter_mut().skip(1) {
            for (index, value) in line.iter_mut().enumerate() {
                *value = if html_columns.get(index).copied().unwrap_or(false) {
                    ascii::to_html(value)
                } else {
                    ascii::to_ascii(value)
                };
            }
        }
        self.write_file().await
    }

    /// Serialize all lines to CSV.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut writer = csv::WriterBuilder::new()
            .flexible(true)
            .from_writer(Vec::new());
        for line in &self.lines {
            writer.write_record(line)?;
        }
        writer
            .into_inner()
            .map_err(|e| AppError::Io(e.into_error()))
    }

    /// Write the staged file atomically.
    pub async fn write_file(&self) -> Result<()> {
        let bytes = self.to_bytes()?;
        write_atomic(&self.path, &bytes).await?;
        log::debug!("Wrote {} rows to {:?}", self.row_count(), self.path);
        Ok(())
    }

    /// Remove the staged file; a missing file is not an error.
    pub async fn delete_file(&self) -> Result<()> {
        match tokio::fs::remove_file(&self.path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(AppError::Io(e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    use async_trait::async_trait;

    use crate::models::FieldName;

    /// Shipped feeds keyed by name.
    struct Archive(HashMap<String, Vec<u8>>);

    #[async_trait]
    impl FeedArchive for Archive {
        async fn fetch(&self, name: &str) -> Result<Option<Vec<u8>>> {
            Ok(self.0.get(name).cloned())
        }
    }

    fn columns() -> OutputColumns {
        OutputColumns::new(vec![
            ("ID".into(), "${id}".into()),
            ("Title".into(), "${title}".into()),
            ("Body".into(), "<p>${body}</p>".into()),
        ])
    }

    fn row(id: &str, title: &str) -> Fields {
        let mut fields = Fields::new();
        fields.set(FieldName::Id, id);
        fields.set(FieldName::Title, title);
        fields.set(FieldName::Body, "Déjà vu");
        fields
    }

    #[tokio::test]
    async fn test_write_and_read_back() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = FeedFile::new(dir.path(), "posts.csv", columns());
        feed.init_file().await.unwrap();
        feed.append_line(&row("42", "Hello, world"));
        feed.write_file().await.unwrap();

        assert!(feed.path().exists());
        assert!(!feed.path().with_extension("tmp").exists());

        let mut reread = FeedFile::new(dir.path(), "posts.csv", columns());
        assert!(reread.read_file().await.unwrap());
        assert_eq!(reread.lines(), feed.lines());
        assert_eq!(reread.lines()[1][0], "00042");
        assert_eq!(reread.lines()[1][1], "Hello, world");
    }

    #[tokio::test]
    async fn test_read_replaces_header() {
        let dir = tempfile::tempdir().unwrap();
        tokio::fs::write(dir.path().join("posts.csv"), "Old,Header\n1,a\n")
            .await
            .unwrap();
        let mut feed = FeedFile::new(dir.path(), "posts.csv", columns());
        assert!(feed.read_file().await.unwrap());
        assert_eq!(feed.lines()[0], vec!["ID", "Title", "Body"]);
        assert_eq!(feed.row_count(), 1);
    }

    #[tokio::test]
    async fn test_read_file_from_bucket() {
        let dir = tempfile::tempdir().unwrap();
        let archive = Archive(HashMap::from([(
            "posts/posts.csv".to_string(),
            b"Old,Header,Cols\n00007,Shipped,Body\n".to_vec(),
        )]));

        let mut feed = FeedFile::new(dir.path(), "posts.csv", columns());
        feed.append_line(&row("1", "stale"));
        assert!(
            feed.read_file_from_bucket(&archive, "posts/posts.csv")
                .await
                .unwrap()
        );
        assert_eq!(feed.lines()[0], vec!["ID", "Title", "Body"]);
        assert_eq!(feed.row_count(), 1);
        assert_eq!(feed.lines()[1][1], "Shipped");

        assert!(
            !feed
                .read_file_from_bucket(&archive, "posts/other.csv")
                .await
                .unwrap()
        );
        assert_eq!(feed.row_count(), 0);
    }

    #[tokio::test]
    async fn test_missing_file_reads_empty() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = FeedFile::new(dir.path().join("work"), "posts.csv", columns());
        assert!(!feed.read_file().await.unwrap());
        assert_eq!(feed.row_count(), 0);
        feed.delete_file().await.unwrap();
    }

    #[test]
    fn test_trim_never_removes_header() {
        let mut feed = FeedFile::new("/tmp", "posts.csv", columns());
        for id in ["1", "2", "3"] {
            feed.append_line(&row(id, "t"));
        }
        feed.trim_lines(2);
        assert_eq!(feed.row_count(), 1);
        assert_eq!(feed.lines()[0][0], "ID");
        assert_eq!(feed.lines()[1][0], "00003");

        feed.trim_lines(10);
        assert_eq!(feed.lines().len(), 1);
        assert_eq!(feed.lines()[0][0], "ID");
    }

    #[tokio::test]
    async fn test_convert_lines_to_ascii() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = FeedFile::new(dir.path(), "posts.csv", columns());
        feed.append_line(&row("1", "Café – news"));
        feed.convert_lines_to_ascii(&["Body".to_string()]).await.unwrap();

        assert_eq!(feed.lines()[0][1], "Title");
        assert_eq!(feed.lines()[1][1], "Cafe - news");
        assert_eq!(feed.lines()[1][2], "&lt;p&gt;D&#233;j&#224; vu&lt;/p&gt;");

        let written = tokio::fs::read_to_string(feed.path()).await.unwrap();
        assert!(written.contains("Cafe - news"));
    }

    #[tokio::test]
    async fn test_delete_file() {
        let dir = tempfile::tempdir().unwrap();
        let mut feed = FeedFile::new(dir.path(), "posts.csv", columns());
        feed.init_file().await.unwrap();
        feed.write_file().await.unwrap();
        feed.delete_file().await.unwrap();
        assert!(!feed.path().exists());
        feed.delete_file().await.unwrap();
    }
}
