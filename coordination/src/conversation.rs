//! Conversation storage interface.
//!
//! A conversation is an ordered list of [`ChatTurn`]s plus index metadata
//! (title, last update, preview of the latest user message). Only the
//! interface and an in-memory store live here; on-disk layout is left to
//! whoever implements [`ConversationStore`] for a real backend.

use std::collections::HashMap;
use std::fmt;

use async_trait::async_trait;
use chrono::Local;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use crate::chat::ChatTurn;
use crate::dispatch::Role;

/// Title given to conversations created without one.
pub const DEFAULT_TITLE: &str = "새 대화";
/// Maximum preview length, in characters.
pub const PREVIEW_CHARS: usize = 80;

const UPDATED_AT_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConversationId(String);

impl ConversationId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Fresh 12-hex-digit id.
    pub fn generate() -> Self {
        let mut hex = Uuid::new_v4().simple().to_string();
        hex.truncate(12);
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ConversationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Index entry returned by [`ConversationStore::list`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationSummary {
    pub id: ConversationId,
    pub title: String,
    /// Local time of the last create/save/rename, `YYYY-MM-DD HH:MM:SS`.
    pub updated_at: String,
    /// Latest user message on one line, truncated to [`PREVIEW_CHARS`].
    pub last_preview: String,
}

#[derive(Debug, Error)]
pub enum ConversationError {
    #[error("conversation not found: {0}")]
    NotFound(ConversationId),

    #[error("failed to export conversation {id}: {message}")]
    Export { id: ConversationId, message: String },
}

/// Exported form of one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationExport {
    pub id: ConversationId,
    pub title: String,
    pub updated_at: String,
    pub messages: Vec<ChatTurn>,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ConversationStore: Send + Sync {
    async fn create(&self, title: &str) -> Result<ConversationId, ConversationError>;

    /// Most recently created first.
    async fn list(&self) -> Result<Vec<ConversationSummary>, ConversationError>;

    async fn load(&self, id: &ConversationId) -> Result<Vec<ChatTurn>, ConversationError>;

    /// Replace the stored turns and refresh `updated_at` and the preview.
    async fn save(&self, id: &ConversationId, turns: &[ChatTurn]) -> Result<(), ConversationError>;

    async fn rename(&self, id: &ConversationId, title: &str) -> Result<(), ConversationError>;

    async fn delete(&self, id: &ConversationId) -> Result<(), ConversationError>;

    /// Pretty-printed JSON of [`ConversationExport`].
    async fn export(&self, id: &ConversationId) -> Result<String, ConversationError>;
}

/// Latest user message, newlines flattened, cut to [`PREVIEW_CHARS`].
pub fn preview(turns: &[ChatTurn]) -> String {
    turns
        .iter()
        .rev()
        .find(|t| t.role == Role::User)
        .map(|t| t.content.replace('\n', " ").chars().take(PREVIEW_CHARS).collect())
        .unwrap_or_default()
}

fn now() -> String {
    Local::now().format(UPDATED_AT_FORMAT).to_string()
}

#[derive(Debug, Clone)]
struct Entry {
    title: String,
    updated_at: String,
    last_preview: String,
    turns: Vec<ChatTurn>,
}

#[derive(Debug, Default)]
struct Inner {
    /// Creation order.
    order: Vec<ConversationId>,
    entries: HashMap<ConversationId, Entry>,
}

impl Inner {
    fn entry_mut(&mut self, id: &ConversationId) -> Result<&mut Entry, ConversationError> {
        self.entries
            .get_mut(id)
            .ok_or_else(|| ConversationError::NotFound(id.clone()))
    }
}

/// Process-local store; contents vanish with the process.
#[derive(Debug, Default)]
pub struct InMemoryConversationStore {
    inner: RwLock<Inner>,
}

impl InMemoryConversationStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ConversationStore for InMemoryConversationStore {
    async fn create(&self, title: &str) -> Result<ConversationId, ConversationError> {
        let title = match title.trim() {
            "" => DEFAULT_TITLE.to_string(),
            t => t.to_string(),
        };
        let id = ConversationId::generate();
        let mut inner = self.inner.write().await;
        inner.entries.insert(
            id.clone(),
            Entry {
                title,
                updated_at: now(),
                last_preview: String::new(),
                turns: Vec::new(),
            },
        );
        inner.order.push(id.clone());
        Ok(id)
    }

    async fn list(&self) -> Result<Vec<ConversationSummary>, ConversationError> {
        let inner = self.inner.read().await;
        Ok(inner
            .order
            .iter()
            .rev()
            .filter_map(|id| {
                inner.entries.get(id).map(|e| ConversationSummary {
                    id: id.clone(),
                    title: e.title.clone(),
                    updated_at: e.updated_at.clone(),
                    last_preview: e.last_preview.clone(),
                })
            })
            .collect())
    }

    async fn load(&self, id: &ConversationId) -> Result<Vec<ChatTurn>, ConversationError> {
        let inner = self.inner.read().await;
        inner
            .entries
            .get(id)
            .map(|e| e.turns.clone())
            .ok_or_else(|| ConversationError::NotFound(id.clone()))
    }

    async fn save(&self, id: &ConversationId, turns: &[ChatTurn]) -> Result<(), ConversationError> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id)?;
        entry.turns = turns.to_vec();
        entry.last_preview = preview(turns);
        entry.updated_at = now();
        Ok(())
    }

    async fn rename(&self, id: &ConversationId, title: &str) -> Result<(), ConversationError> {
        let mut inner = self.inner.write().await;
        let entry = inner.entry_mut(id)?;
        entry.title = title.trim().to_string();
        entry.updated_at = now();
        Ok(())
    }

    async fn delete(&self, id: &ConversationId) -> Result<(), ConversationError> {
        let mut inner = self.inner.write().await;
        if inner.entries.remove(id).is_none() {
            return Err(ConversationError::NotFound(id.clone()));
        }
        inner.order.retain(|c| c != id);
        Ok(())
    }

    async fn export(&self, id: &ConversationId) -> Result<String, ConversationError> {
        let inner = self.inner.read().await;
        let entry = inner
            .entries
            .get(id)
            .ok_or_else(|| ConversationError::NotFound(id.clone()))?;
        let export = ConversationExport {
            id: id.clone(),
            title: entry.title.clone(),
            updated_at: entry.updated_at.clone(),
            messages: entry.turns.clone(),
        };
        serde_json::to_string_pretty(&export).map_err(|e| ConversationError::Export {
            id: id.clone(),
            message: e.to_string(),
        })
    }
}
