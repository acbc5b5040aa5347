//! Emergency protocol documents and the library that resolves them
//!
//! Documents live as `<id>.yaml` files in one flat directory. A scene names
//! the topics it touches through `tags` in its `scene_metadata.yaml`; tags
//! resolve to ids directly or through the `registry.yaml` index.

use handoff_core::{Error, Result};
use handoff_engine::PromptSource;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// Openings that make a cognitive prompt an order rather than a question.
const IMPERATIVE_STARTS: &[&str] = &["Give ", "Administer ", "Inject ", "Start ", "Stop ", "Bolus "];
const CITATION_TOKENS: &[&str] = &["http://", "https://", "doi:", "et al.", "Figure", "Table"];

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolMeta {
    pub id: String,
    pub title: String,
    #[serde(default)]
    pub parent: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub related_topics: Vec<String>,
    #[serde(default = "default_priority")]
    pub priority: f64,
    #[serde(default)]
    pub version: Option<String>,
}

fn default_priority() -> f64 {
    0.5
}

/// One protocol document. Read-only once loaded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolDoc {
    pub meta: ProtocolMeta,
    pub summary: String,
    #[serde(default)]
    pub signals: Vec<String>,
    #[serde(default)]
    pub red_flags: Vec<String>,
    #[serde(default)]
    pub primary_differential: Vec<String>,
    #[serde(default)]
    pub first_checks: Vec<String>,
    #[serde(default)]
    pub cognitive_prompts: Vec<String>,
    #[serde(default)]
    pub contraindications_notes: Vec<String>,
}

impl ProtocolDoc {
    pub fn from_yaml(content: &str) -> Result<Self> {
        let doc: ProtocolDoc = serde_yaml::from_str(content)?;
        doc.validate()?;
        Ok(doc)
    }

    pub fn validate(&self) -> Result<()> {
        let id = &self.meta.id;
        if id.len() < 3 || !id.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_') {
            return Err(Error::protocol_error(id, "id must be a lowercase slug"));
        }
        if self.meta.title.trim().is_empty() {
            return Err(Error::protocol_error(id, "title is empty"));
        }
        if self.summary.trim().is_empty() {
            return Err(Error::protocol_error(id, "summary is empty"));
        }
        if CITATION_TOKENS.iter().any(|t| self.summary.contains(t)) {
            return Err(Error::protocol_error(id, "summary must not carry citations"));
        }
        if let Some(p) = self
            .cognitive_prompts
            .iter()
            .find(|p| IMPERATIVE_STARTS.iter().any(|s| p.starts_with(s)))
        {
            return Err(Error::protocol_error(id, format!("cognitive prompt is imperative: {}", p)));
        }
        Ok(())
    }
}

impl PromptSource for ProtocolDoc {
    fn first_cognitive_prompt(&self) -> Option<&str> {
        self.cognitive_prompts.first().map(|s| s.as_str())
    }
}

/// The part of `scene_metadata.yaml` the library cares about.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SceneMetadata {
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

impl SceneMetadata {
    /// Metadata next to a scene file; empty when absent or unreadable.
    pub fn for_scene(scene_path: &Path) -> Self {
        let path = scene_path.with_file_name("scene_metadata.yaml");
        let Ok(content) = std::fs::read_to_string(&path) else {
            return Self::default();
        };
        match serde_yaml::from_str::<Option<SceneMetadata>>(&content) {
            Ok(meta) => meta.unwrap_or_default(),
            Err(e) => {
                warn!("Ignoring malformed {}: {}", path.display(), e);
                Self::default()
            }
        }
    }
}

#[derive(Debug, Deserialize)]
struct RegistryEntry {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    children: Vec<String>,
}

pub struct ProtocolLibrary {
    library_dir: PathBuf,
    /// Lowercased registry id -> document id to try when no direct match exists.
    registry: HashMap<String, String>,
}

impl ProtocolLibrary {
    pub fn new(library_dir: impl Into<PathBuf>) -> Self {
        Self {
            library_dir: library_dir.into(),
            registry: HashMap::new(),
        }
    }

    /// Attach a registry index. A missing or unreadable registry leaves the index empty.
    pub fn with_registry(mut self, registry_path: &Path) -> Self {
        match std::fs::read_to_string(registry_path) {
            Ok(content) => match parse_registry(&content) {
                Ok(index) => {
                    info!("Loaded {} registry ids from {}", index.len(), registry_path.display());
                    self.registry = index;
                }
                Err(e) => warn!("Failed to parse {}: {}", registry_path.display(), e),
            },
            Err(_) => debug!("No registry at {}", registry_path.display()),
        }
        self
    }

    pub fn library_dir(&self) -> &Path {
        &self.library_dir
    }

    fn doc_path(&self, id: &str) -> PathBuf {
        self.library_dir.join(format!("{}.yaml", id))
    }

    /// Map scene tags to document ids, first occurrence wins.
    pub fn resolve_topic_ids<S: AsRef<str>>(&self, tags: &[S]) -> Vec<String> {
        let mut seen = HashSet::new();
        let mut ids = Vec::new();
        for tag in tags {
            let normalized = tag.as_ref().trim().to_lowercase().replace('-', "_");
            let resolved = if self.doc_path(&normalized).exists() {
                Some(normalized)
            } else {
                self.registry
                    .get(&normalized)
                    .filter(|mapped| self.doc_path(mapped).exists())
                    .cloned()
            };
            if let Some(id) = resolved {
                if seen.insert(id.clone()) {
                    ids.push(id);
                }
            }
        }
        ids
    }

    /// Load documents by id, skipping missing or malformed ones.
    pub fn load(&self, ids: &[String]) -> Vec<ProtocolDoc> {
        let mut docs = Vec::new();
        for id in ids {
            let path = self.doc_path(id);
            let content = match std::fs::read_to_string(&path) {
                Ok(c) => c,
                Err(_) => continue,
            };
            match ProtocolDoc::from_yaml(&content) {
                Ok(doc) => docs.push(doc),
                Err(e) => warn!("Skipping protocol {}: {}", path.display(), e),
            }
        }
        docs
    }

    pub fn load_for_scene(&self, scene_path: &Path) -> Vec<ProtocolDoc> {
        let metadata = SceneMetadata::for_scene(scene_path);
        let ids = self.resolve_topic_ids(&metadata.tags);
        self.load(&ids)
    }
}

fn parse_registry(content: &str) -> Result<HashMap<String, String>> {
    let entries: Option<Vec<serde_yaml::Value>> = serde_yaml::from_str(content)?;
    let mut index = HashMap::new();
    for value in entries.unwrap_or_default() {
        let Ok(entry) = serde_yaml::from_value::<RegistryEntry>(value) else {
            continue;
        };
        let parent = entry.id.map(|p| p.trim().to_lowercase());
        // Children without their own document fall back to the parent's.
        for child in &entry.children {
            let child = child.trim().to_lowercase();
            let target = parent.clone().unwrap_or_else(|| child.clone());
            index.insert(child, target);
        }
        if let Some(parent) = parent {
            index.insert(parent.clone(), parent);
        }
    }
    Ok(index)
}
