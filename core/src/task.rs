use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Supported document formats. The set is closed: adding a format means
/// extending this enum and every exhaustive match over it.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Txt,
    Markdown,
    Word,
    Csv,
    Excel,
    Pdf,
    Srt,
    Json,
}

impl DocumentFormat {
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "txt" => Some(Self::Txt),
            "md" | "markdown" => Some(Self::Markdown),
            "docx" => Some(Self::Word),
            "csv" => Some(Self::Csv),
            "xlsx" => Some(Self::Excel),
            "pdf" => Some(Self::Pdf),
            "srt" => Some(Self::Srt),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    pub fn from_path(path: &Path) -> Option<Self> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
    }

    /// Whether the source bytes need a binary extraction step before
    /// chunking (OOXML containers, PDF).
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Word | Self::Excel | Self::Pdf)
    }

    /// Sequential-prose formats abort the whole attempt on the first failed
    /// unit; tabular/JSON formats substitute a failure placeholder instead.
    pub fn fails_fast(&self) -> bool {
        matches!(
            self,
            Self::Txt | Self::Markdown | Self::Word | Self::Pdf | Self::Srt
        )
    }

    pub fn extensions() -> &'static [&'static str] {
        &["txt", "md", "markdown", "docx", "csv", "xlsx", "pdf", "srt", "json"]
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    Pending,
    Processing,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileInfo {
    pub original_name: String,
    pub stored_path: PathBuf,
    pub size: u64,
    pub mime_type: String,
    pub extension: String,
    pub format: DocumentFormat,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationOptions {
    pub target_language: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_language: Option<String>,
    pub preserve_formatting: bool,
}

impl Default for TranslationOptions {
    fn default() -> Self {
        Self {
            target_language: "Chinese".into(),
            source_language: None,
            preserve_formatting: true,
        }
    }
}

/// Durable record of one translation task. One JSON file per id in the task
/// store; the scheduler's processing routine and explicit user actions are
/// the only writers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: Uuid,
    pub file_info: FileInfo,
    pub options: TranslationOptions,
    pub status: TaskStatus,
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    pub retry_count: u32,
    pub owner_token: String,
}

impl Task {
    pub fn new(file_info: FileInfo, options: TranslationOptions, owner_token: String) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            file_info,
            options,
            status: TaskStatus::Pending,
            progress: 0,
            created_at: now,
            updated_at: now,
            output_path: None,
            error_message: None,
            retry_count: 0,
            owner_token,
        }
    }

    pub fn touch(&mut self) {
        self.updated_at = Utc::now();
    }

    pub fn is_owned_by(&self, token: &str) -> bool {
        self.owner_token == token
    }
}

/// Grouping of task ids created by one batch upload. Derived bookkeeping
/// only; task lifecycle stays with the task store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BatchGroup {
    pub batch_id: Uuid,
    pub task_ids: Vec<Uuid>,
    pub created_at: DateTime<Utc>,
}

/// Structural locator of a translation unit inside its document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum UnitPosition {
    /// Sequential chunk index (text, markdown, extracted word/pdf text).
    Chunk(usize),
    /// Table cell by zero-based row and column.
    Cell { row: usize, column: usize },
    /// Subtitle block index.
    Subtitle(usize),
    /// Dotted path to a JSON leaf string, e.g. `items[2].title`.
    JsonPath(String),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum UnitStatus {
    Pending,
    Done,
    Failed,
}

/// The smallest independently translatable piece of a document. Lives only
/// for one processing attempt and is discarded after reassembly.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TranslationUnit {
    pub position: UnitPosition,
    pub source_text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub translated_text: Option<String>,
    pub status: UnitStatus,
}

impl TranslationUnit {
    pub fn new(position: UnitPosition, source_text: impl Into<String>) -> Self {
        Self {
            position,
            source_text: source_text.into(),
            translated_text: None,
            status: UnitStatus::Pending,
        }
    }

    /// Output text for reassembly: the translation when one exists,
    /// otherwise the original source.
    pub fn output_text(&self) -> &str {
        self.translated_text.as_deref().unwrap_or(&self.source_text)
    }
}
