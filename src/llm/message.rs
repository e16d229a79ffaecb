//! Request-side message shapes and file context packaging.

use crate::corpus::{FileKind, FileRecord};
use serde::{Deserialize, Serialize};

/// One typed segment of a user message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum MessagePart {
    Text(String),
    /// Binary payload (base64) such as an image
    InlineData { media_type: String, data: String },
}

impl MessagePart {
    pub fn text(text: impl Into<String>) -> Self {
        MessagePart::Text(text.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

/// A prior exchange replayed to the backend as conversation context.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryTurn {
    pub role: Role,
    pub text: String,
}

impl HistoryTurn {
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            text: text.into(),
        }
    }

    pub fn model(text: impl Into<String>) -> Self {
        Self {
            role: Role::Model,
            text: text.into(),
        }
    }
}

const DEFAULT_IMAGE_MEDIA_TYPE: &str = "image/png";

/// Package one file as a message part.
pub fn file_part(file: &FileRecord) -> MessagePart {
    match file.kind {
        FileKind::Image => MessagePart::InlineData {
            media_type: file
                .media_type
                .clone()
                .unwrap_or_else(|| DEFAULT_IMAGE_MEDIA_TYPE.to_string()),
            data: file.content.clone(),
        },
        kind => MessagePart::Text(format!(
            "--- START OF {label} ({name}) ---\n{content}\n--- END OF {label} ---",
            label = kind.label(),
            name = file.name,
            content = file.content,
        )),
    }
}

/// One part per file in the order supplied, then the prompt as the final part.
pub fn build_parts(files: &[FileRecord], prompt: &str) -> Vec<MessagePart> {
    files
        .iter()
        .map(file_part)
        .chain(std::iter::once(MessagePart::text(prompt)))
        .collect()
}
