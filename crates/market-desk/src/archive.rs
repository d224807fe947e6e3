//! History Archive and Instruction Store
//!
//! In-memory implementations of the context assembler's collaborator
//! interfaces. The archive holds free-text records (past reports, meeting
//! notes) scoped to a user and optionally a workspace; search is a naive
//! keyword match. Production deployments back these with the document
//! store.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::RwLock;

use assistant_core::context::{HistoryArchive, InstructionStore};

/// One archived record
#[derive(Clone, Debug)]
pub struct HistoryEntry {
    pub user_id: String,
    pub workspace: Option<String>,
    pub title: String,
    pub body: String,
}

/// In-memory history archive with keyword search
pub struct InMemoryHistoryArchive {
    entries: RwLock<Vec<HistoryEntry>>,
}

impl Default for InMemoryHistoryArchive {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryArchive {
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(Vec::new()),
        }
    }

    pub fn insert(&self, entry: HistoryEntry) {
        self.entries.write().unwrap().push(entry);
    }

    fn matches(entry: &HistoryEntry, user_id: &str, workspace: Option<&str>, terms: &[String]) -> bool {
        if entry.user_id != user_id {
            return false;
        }
        if let Some(ws) = workspace {
            if entry.workspace.as_deref() != Some(ws) {
                return false;
            }
        }

        let haystack = format!("{} {}", entry.title, entry.body).to_lowercase();
        terms.iter().any(|t| haystack.contains(t))
    }
}

#[async_trait]
impl HistoryArchive for InMemoryHistoryArchive {
    async fn search(
        &self,
        user_id: &str,
        workspace: Option<&str>,
        query: &str,
    ) -> assistant_core::Result<Option<String>> {
        let terms: Vec<String> = query
            .split_whitespace()
            .filter(|w| w.len() > 3)
            .map(|w| w.to_lowercase())
            .collect();

        if terms.is_empty() {
            return Ok(None);
        }

        let entries = self.entries.read().unwrap();
        let hits: Vec<String> = entries
            .iter()
            .filter(|e| Self::matches(e, user_id, workspace, &terms))
            .take(5)
            .map(|e| format!("### {}\n{}", e.title, e.body))
            .collect();

        if hits.is_empty() {
            Ok(None)
        } else {
            Ok(Some(hits.join("\n\n")))
        }
    }
}

/// In-memory per-user custom instructions
pub struct InMemoryInstructionStore {
    instructions: RwLock<HashMap<String, String>>,
}

impl Default for InMemoryInstructionStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryInstructionStore {
    pub fn new() -> Self {
        Self {
            instructions: RwLock::new(HashMap::new()),
        }
    }

    pub fn set(&self, user_id: impl Into<String>, text: impl Into<String>) {
        self.instructions
            .write()
            .unwrap()
            .insert(user_id.into(), text.into());
    }
}

#[async_trait]
impl InstructionStore for InMemoryInstructionStore {
    async fn fetch(&self, user_id: &str) -> assistant_core::Result<Option<String>> {
        Ok(self.instructions.read().unwrap().get(user_id).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_search_scopes_to_user_and_workspace() {
        let archive = InMemoryHistoryArchive::new();
        archive.insert(HistoryEntry {
            user_id: "u-1".into(),
            workspace: Some("acme".into()),
            title: "Acme quarterly review".into(),
            body: "Discussed expansion plans.".into(),
        });
        archive.insert(HistoryEntry {
            user_id: "u-2".into(),
            workspace: None,
            title: "Other user's quarterly notes".into(),
            body: "Private.".into(),
        });

        let hit = archive
            .search("u-1", Some("acme"), "quarterly review")
            .await
            .unwrap();
        assert!(hit.unwrap().contains("Acme quarterly review"));

        let miss = archive
            .search("u-1", Some("other-ws"), "quarterly review")
            .await
            .unwrap();
        assert!(miss.is_none());
    }

    #[tokio::test]
    async fn test_short_queries_return_nothing() {
        let archive = InMemoryHistoryArchive::new();
        archive.insert(HistoryEntry {
            user_id: "u-1".into(),
            workspace: None,
            title: "A note".into(),
            body: "Body".into(),
        });

        assert!(archive.search("u-1", None, "a an it").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_instruction_store_roundtrip() {
        let store = InMemoryInstructionStore::new();
        store.set("u-1", "Prefer tables.");

        assert_eq!(
            store.fetch("u-1").await.unwrap().as_deref(),
            Some("Prefer tables.")
        );
        assert!(store.fetch("u-2").await.unwrap().is_none());
    }
}
