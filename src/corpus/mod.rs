//! The file corpus: every piece of context a session can hand to the model.
//!
//! Records are immutable once ingested except through [`Corpus::apply_change`],
//! which replaces content by name. Readers work on a [`CorpusSnapshot`] so an
//! edit made between invocations can never be observed halfway through one.

pub mod ingest;

pub use ingest::{ingest_bytes, ingest_dir, ingest_path};

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// What a file is, which decides how it is packaged for the model and
/// whether the import extractor looks at it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FileKind {
    Source,
    Image,
    Log,
    Metric,
    Issue,
}

impl FileKind {
    /// Guess a kind from the file name's extension.
    ///
    /// `Issue` is never inferred; it must be declared by the caller.
    pub fn infer(name: &str) -> Self {
        let ext = extension(name).map(|e| e.to_ascii_lowercase());
        match ext.as_deref() {
            Some("png" | "jpg" | "jpeg" | "gif" | "webp") => FileKind::Image,
            Some("log") => FileKind::Log,
            Some("json" | "csv") => FileKind::Metric,
            _ => FileKind::Source,
        }
    }

    /// Upper-case label used in the context delimiter template.
    pub fn label(&self) -> &'static str {
        match self {
            FileKind::Source => "FILE",
            FileKind::Image => "IMAGE",
            FileKind::Log => "LOG",
            FileKind::Metric => "METRIC",
            FileKind::Issue => "ISSUE",
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Source => "source",
            FileKind::Image => "image",
            FileKind::Log => "log",
            FileKind::Metric => "metric",
            FileKind::Issue => "issue",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s.to_ascii_lowercase().as_str() {
            "source" => Some(FileKind::Source),
            "image" => Some(FileKind::Image),
            "log" => Some(FileKind::Log),
            "metric" => Some(FileKind::Metric),
            "issue" => Some(FileKind::Issue),
            _ => None,
        }
    }
}

/// One unit of ingested context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileRecord {
    pub id: Uuid,
    /// Path or bare filename; the matching key for imports and apply-change
    pub name: String,
    /// UTF-8 text, or a base64 payload for images
    pub content: String,
    pub kind: FileKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub media_type: Option<String>,
}

impl FileRecord {
    pub fn new(name: impl Into<String>, content: impl Into<String>, kind: FileKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            content: content.into(),
            kind,
            media_type: None,
        }
    }

    pub fn with_media_type(mut self, media_type: impl Into<String>) -> Self {
        self.media_type = Some(media_type.into());
        self
    }
}

/// Read-only view of the corpus taken at the start of an invocation.
pub type CorpusSnapshot = Arc<[FileRecord]>;

/// Whether [`Corpus::apply_change`] replaced an existing record or appended one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ApplyOutcome {
    Replaced(Uuid),
    Added(Uuid),
}

/// The ordered set of files loaded into a session.
///
/// Insertion order is preserved and is the order files are sent to the model.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Corpus {
    files: Vec<FileRecord>,
}

impl Corpus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_records(files: Vec<FileRecord>) -> Self {
        Self { files }
    }

    pub fn add(&mut self, record: FileRecord) -> Uuid {
        let id = record.id;
        self.files.push(record);
        id
    }

    pub fn extend(&mut self, records: impl IntoIterator<Item = FileRecord>) {
        self.files.extend(records);
    }

    /// Remove a record by id. Returns the removed record, if any.
    pub fn remove(&mut self, id: Uuid) -> Option<FileRecord> {
        let idx = self.files.iter().position(|f| f.id == id)?;
        Some(self.files.remove(idx))
    }

    /// Replace the content of the first record named `name`, or append a new
    /// source record when none exists.
    pub fn apply_change(&mut self, name: &str, content: &str) -> ApplyOutcome {
        if let Some(existing) = self.files.iter_mut().find(|f| f.name == name) {
            existing.content = content.to_string();
            return ApplyOutcome::Replaced(existing.id);
        }
        ApplyOutcome::Added(self.add(FileRecord::new(name, content, FileKind::Source)))
    }

    pub fn get(&self, id: Uuid) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.id == id)
    }

    pub fn find_by_name(&self, name: &str) -> Option<&FileRecord> {
        self.files.iter().find(|f| f.name == name)
    }

    /// Resolve a user-supplied reference: a full id, an id prefix, or a name.
    pub fn lookup(&self, key: &str) -> Option<&FileRecord> {
        if let Ok(id) = Uuid::parse_str(key) {
            return self.get(id);
        }
        self.find_by_name(key).or_else(|| {
            let mut hits = self.files.iter().filter(|f| f.id.to_string().starts_with(key));
            match (hits.next(), hits.next()) {
                (Some(only), None) if !key.is_empty() => Some(only),
                _ => None,
            }
        })
    }

    pub fn files(&self) -> &[FileRecord] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn clear(&mut self) {
        self.files.clear();
    }

    pub fn snapshot(&self) -> CorpusSnapshot {
        Arc::from(self.files.clone())
    }
}

/// Text after the final `.` of the last path segment.
pub(crate) fn extension(name: &str) -> Option<&str> {
    let file = name.rsplit('/').next().unwrap_or(name);
    file.rsplit_once('.').map(|(_, ext)| ext)
}
