//! Persona store: named system prompts loaded by id.
//!
//! Personas live as YAML files in a prompts directory:
//!
//! ```yaml
//! id: parenting_expert_v1      # optional, defaults to the file stem
//! name: 육아 정보 도우미        # optional, defaults to the id
//! content: |
//!   # 역할
//!   ...
//! ```
//!
//! The core only needs `get(id)`; listing is for the CLI.

use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, warn};

/// Informational / expert persona, also the system default.
pub const PARENTING_EXPERT: &str = "parenting_expert_v1";
/// Emotional-support persona.
pub const SOOTHING_EXPERT: &str = "soothing_expert_v1";

/// Opaque persona identifier.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PersonaId(String);

impl PersonaId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn parenting_expert() -> Self {
        Self::new(PARENTING_EXPERT)
    }

    pub fn soothing_expert() -> Self {
        Self::new(SOOTHING_EXPERT)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PersonaId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for PersonaId {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for PersonaId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

/// A loaded persona.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Persona {
    pub id: PersonaId,
    /// Display name.
    pub name: String,
    /// System prompt text sent to the model.
    pub content: String,
    /// Full source text of the persona definition (used in diagnosis prompts).
    pub raw: String,
}

impl Persona {
    /// Build a persona directly from its prompt text.
    pub fn new(id: impl Into<String>, name: impl Into<String>, content: impl Into<String>) -> Self {
        let content = content.into();
        Self {
            id: PersonaId::new(id),
            name: name.into(),
            raw: content.clone(),
            content,
        }
    }

    /// Parse a persona from YAML text. `fallback_id` is used when the file
    /// carries no `id` field.
    pub fn from_yaml(raw: &str, fallback_id: &str) -> Result<Self, PersonaError> {
        let file: PersonaFile = serde_yaml::from_str(raw).map_err(|e| PersonaError::Parse {
            id: fallback_id.to_string(),
            message: e.to_string(),
        })?;
        let id = file.id.unwrap_or_else(|| fallback_id.to_string());
        let name = file.name.unwrap_or_else(|| id.clone());
        Ok(Self {
            id: PersonaId::new(id),
            name,
            content: file.content.unwrap_or_default(),
            raw: raw.to_string(),
        })
    }
}

#[derive(Debug, Deserialize)]
struct PersonaFile {
    id: Option<String>,
    name: Option<String>,
    content: Option<String>,
}

/// Errors from persona lookup.
#[derive(Debug, Error)]
pub enum PersonaError {
    #[error("persona not found: {0}")]
    NotFound(PersonaId),

    #[error("failed to read persona store at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("invalid persona file for {id}: {message}")]
    Parse { id: String, message: String },
}

/// Read access to personas by id.
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait PersonaStore: Send + Sync {
    /// Look up one persona. Never substitutes unrelated content for a miss.
    async fn get(&self, id: &PersonaId) -> Result<Persona, PersonaError>;

    /// All personas, sorted by display name.
    async fn list(&self) -> Result<Vec<Persona>, PersonaError>;
}

/// Personas held in memory, keyed by id.
#[derive(Debug, Clone, Default)]
pub struct InMemoryPersonaStore {
    personas: BTreeMap<PersonaId, Persona>,
}

impl InMemoryPersonaStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, persona: Persona) -> Self {
        self.insert(persona);
        self
    }

    pub fn insert(&mut self, persona: Persona) {
        self.personas.insert(persona.id.clone(), persona);
    }
}

#[async_trait]
impl PersonaStore for InMemoryPersonaStore {
    async fn get(&self, id: &PersonaId) -> Result<Persona, PersonaError> {
        self.personas
            .get(id)
            .cloned()
            .ok_or_else(|| PersonaError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Persona>, PersonaError> {
        let mut all: Vec<Persona> = self.personas.values().cloned().collect();
        all.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(all)
    }
}

/// Personas read from `*.yml` / `*.yaml` files in a directory.
///
/// Files are re-read on every call so edits (including accepted
/// `.proposed` revisions) are picked up without a restart.
#[derive(Debug, Clone)]
pub struct FsPersonaStore {
    dir: PathBuf,
}

impl FsPersonaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    async fn load_all(&self) -> Result<Vec<Persona>, PersonaError> {
        let io_err = |source| PersonaError::Io {
            path: self.dir.clone(),
            source,
        };

        let mut entries = tokio::fs::read_dir(&self.dir).await.map_err(io_err)?;
        let mut personas = Vec::new();

        while let Some(entry) = entries.next_entry().await.map_err(io_err)? {
            let path = entry.path();
            if !is_persona_file(&path) {
                continue;
            }
            let stem = path
                .file_stem()
                .and_then(|s| s.to_str())
                .unwrap_or_default()
                .to_string();
            let raw = tokio::fs::read_to_string(&path)
                .await
                .map_err(|source| PersonaError::Io {
                    path: path.clone(),
                    source,
                })?;
            match Persona::from_yaml(&raw, &stem) {
                Ok(p) => personas.push(p),
                Err(e) => warn!(path = %path.display(), error = %e, "skipping unreadable persona"),
            }
        }

        personas.sort_by(|a, b| a.name.cmp(&b.name));
        debug!(dir = %self.dir.display(), count = personas.len(), "personas loaded");
        Ok(personas)
    }
}

fn is_persona_file(path: &Path) -> bool {
    matches!(
        path.extension().and_then(|e| e.to_str()),
        Some("yml") | Some("yaml")
    )
}

#[async_trait]
impl PersonaStore for FsPersonaStore {
    async fn get(&self, id: &PersonaId) -> Result<Persona, PersonaError> {
        self.load_all()
            .await?
            .into_iter()
            .find(|p| &p.id == id)
            .ok_or_else(|| PersonaError::NotFound(id.clone()))
    }

    async fn list(&self) -> Result<Vec<Persona>, PersonaError> {
        self.load_all().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn yaml_id_defaults_to_file_stem() {
        let p = Persona::from_yaml("name: 위로 도우미\ncontent: 따뜻하게 답해", "soothing_expert_v1")
            .unwrap();
        assert_eq!(p.id, PersonaId::soothing_expert());
        assert_eq!(p.name, "위로 도우미");
        assert_eq!(p.content, "따뜻하게 답해");
    }

    #[test]
    fn yaml_name_defaults_to_id() {
        let p = Persona::from_yaml("id: custom\ncontent: hi", "file").unwrap();
        assert_eq!(p.id.as_str(), "custom");
        assert_eq!(p.name, "custom");
    }

    #[test]
    fn invalid_yaml_is_parse_error() {
        let err = Persona::from_yaml("content: [unclosed", "broken").unwrap_err();
        assert!(matches!(err, PersonaError::Parse { .. }));
    }

    #[tokio::test]
    async fn fs_store_reads_yaml_files_sorted_by_name() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("b.yml"), "name: Beta\ncontent: b").unwrap();
        std::fs::write(dir.path().join("a.yaml"), "name: Alpha\ncontent: a").unwrap();
        std::fs::write(dir.path().join("notes.txt"), "ignored").unwrap();

        let store = FsPersonaStore::new(dir.path());
        let all = store.list().await.unwrap();
        let names: Vec<&str> = all.iter().map(|p| p.name.as_str()).collect();
        assert_eq!(names, vec!["Alpha", "Beta"]);

        let b = store.get(&PersonaId::new("b")).await.unwrap();
        assert_eq!(b.content, "b");
        assert!(b.raw.contains("name: Beta"));
    }

    #[tokio::test]
    async fn fs_store_miss_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let store = FsPersonaStore::new(dir.path());
        let err = store.get(&PersonaId::new("nope")).await.unwrap_err();
        assert!(matches!(err, PersonaError::NotFound(id) if id.as_str() == "nope"));
    }

    #[tokio::test]
    async fn fs_store_missing_dir_is_io_error() {
        let store = FsPersonaStore::new("/definitely/not/here");
        assert!(matches!(store.list().await, Err(PersonaError::Io { .. })));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryPersonaStore::new().with(Persona::new("x", "X", "prompt"));
        assert_eq!(store.get(&"x".into()).await.unwrap().content, "prompt");
        assert!(store.get(&"y".into()).await.is_err());
    }

    #[test]
    fn persona_id_from_owned_string() {
        let id: PersonaId = String::from("soothing_expert_v1").into();
        assert_eq!(id, PersonaId::soothing_expert());
    }
}
