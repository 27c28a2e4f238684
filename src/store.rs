//! Durable raw page storage.
//!
//! A raw file holds the identity block for a run followed by every page in
//! fetch order:
//!
//! ```json
//! {
//!   "username": "alice",
//!   "userId": "42",
//!   "fetchedAt": "2025-01-08T12:00:00Z",
//!   "user": { ... },
//!   "tweetsAndReplies": { "pageCount": 2, "pages": [ ... ] }
//! }
//! ```
//!
//! Every write replaces the whole document through a temporary sibling and a
//! rename, so a crash leaves either the previous or the new document on disk,
//! never a torn one.

use crate::error::{CollectError, Result, ResultExt};
use crate::model::{RawFileHeader, RawPage};
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RawDocumentRef<'a> {
    #[serde(flatten)]
    header: &'a RawFileHeader,
    tweets_and_replies: PageSectionRef<'a>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PageSectionRef<'a> {
    page_count: usize,
    pages: &'a [RawPage],
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawDocument {
    #[serde(flatten)]
    header: RawFileHeader,
    #[serde(default)]
    tweets_and_replies: PageSection,
}

#[derive(Default, Deserialize)]
struct PageSection {
    #[serde(default)]
    pages: Vec<RawPage>,
}

/// Append-only store of the pages fetched for one run.
#[derive(Debug)]
pub struct RawPageStore {
    path: PathBuf,
    header: RawFileHeader,
    pages: Vec<RawPage>,
}

impl RawPageStore {
    /// Start a new raw file and write its (page-less) document immediately.
    ///
    /// # Errors
    ///
    /// Returns an error if the parent directory or the file cannot be written.
    pub fn create(path: impl Into<PathBuf>, header: RawFileHeader) -> Result<Self> {
        let path = path.into();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| CollectError::path_error("create directory", parent, e))?;
        }
        let store = Self {
            path,
            header,
            pages: Vec::new(),
        };
        store.persist()?;
        Ok(store)
    }

    /// Load an existing raw file.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::RawFileNotFound`] when the path does not exist
    /// and [`CollectError::InvalidRawFile`] when it is not a raw page document.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        if !path.exists() {
            return Err(CollectError::raw_file_not_found(path));
        }
        let content = std::fs::read_to_string(&path)
            .map_err(|e| CollectError::path_error("read", &path, e))?;
        let document: RawDocument = serde_json::from_str(&content)
            .map_err(|e| CollectError::invalid_raw_file(&path, e.to_string()))?;
        if document.header.user_id.trim().is_empty() {
            return Err(CollectError::invalid_raw_file(&path, "userId is empty"));
        }
        debug!(
            path = %path.display(),
            pages = document.tweets_and_replies.pages.len(),
            "Opened raw page file"
        );
        Ok(Self {
            path,
            header: document.header,
            pages: document.tweets_and_replies.pages,
        })
    }

    /// Record one page. The page is on disk when this returns `Ok`.
    ///
    /// # Errors
    ///
    /// Returns an error if the document cannot be rewritten; the in-memory
    /// page list is left as it was.
    pub fn append(&mut self, page: RawPage) -> Result<()> {
        self.pages.push(page);
        if let Err(e) = self.persist() {
            self.pages.pop();
            return Err(e);
        }
        Ok(())
    }

    #[must_use]
    pub fn pages(&self) -> &[RawPage] {
        &self.pages
    }

    #[must_use]
    pub const fn header(&self) -> &RawFileHeader {
        &self.header
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The run stamp embedded in the file name (`<user>_<stamp>.json`).
    ///
    /// Falls back to the whole file stem for files named some other way.
    #[must_use]
    pub fn run_stamp(&self) -> String {
        let stem = self
            .path
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_default();
        let prefix = format!("{}_", self.header.username);
        stem.strip_prefix(&prefix)
            .filter(|rest| !rest.is_empty())
            .map_or_else(|| stem.clone(), str::to_string)
    }

    fn persist(&self) -> Result<()> {
        let document = RawDocumentRef {
            header: &self.header,
            tweets_and_replies: PageSectionRef {
                page_count: self.pages.len(),
                pages: &self.pages,
            },
        };
        write_json_atomic(&self.path, &document)
    }
}

/// Pretty-print `value` to `path` via a temporary sibling and a rename.
///
/// # Errors
///
/// Returns an error if serialization or any filesystem step fails.
pub fn write_json_atomic<T: Serialize + ?Sized>(path: &Path, value: &T) -> Result<()> {
    let mut tmp_name = path.file_name().unwrap_or_default().to_os_string();
    tmp_name.push(".tmp");
    let tmp = path.with_file_name(tmp_name);

    let file = File::create(&tmp).map_err(|e| CollectError::path_error("create", &tmp, e))?;
    let mut writer = BufWriter::new(file);
    serde_json::to_writer_pretty(&mut writer, value)
        .with_context(|| format!("Failed to serialize {}", path.display()))?;
    writer
        .write_all(b"\n")
        .and_then(|()| writer.flush())
        .map_err(|e| CollectError::path_error("write", &tmp, e))?;
    writer
        .get_ref()
        .sync_all()
        .map_err(|e| CollectError::path_error("sync", &tmp, e))?;
    drop(writer);

    std::fs::rename(&tmp, path).map_err(|e| CollectError::path_error("rename", path, e))
}
