//! Directory of notebooks the server currently has open.
//!
//! Pluto refuses to "open" a file that is already running, so before asking
//! the server we look the location up here and jump straight to its editor.
//! The server reports `id → location`; lookups go the other way too.

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("Notebook list decode failed: {0}")]
    Decode(#[from] rmp_serde::decode::Error),
}

/// Decode the MessagePack body of `/notebooklist`.
pub fn decode_snapshot(bytes: &[u8]) -> Result<HashMap<String, String>, SnapshotError> {
    Ok(rmp_serde::from_slice(bytes)?)
}

#[derive(Debug, Default, Clone)]
pub struct NotebookDirectory {
    location_to_id: HashMap<String, String>,
    id_to_location: HashMap<String, String>,
}

impl NotebookDirectory {
    pub fn from_snapshot(snapshot: HashMap<String, String>) -> Self {
        let mut directory = Self::default();
        for (id, location) in snapshot {
            directory.add(location, id);
        }
        directory
    }

    /// Pair `location` with `id`, dropping any earlier pairing of either.
    pub fn add(&mut self, location: String, id: String) {
        if let Some(old_id) = self.location_to_id.remove(&location) {
            self.id_to_location.remove(&old_id);
        }
        if let Some(old_location) = self.id_to_location.remove(&id) {
            self.location_to_id.remove(&old_location);
        }
        self.location_to_id.insert(location.clone(), id.clone());
        self.id_to_location.insert(id, location);
    }

    pub fn remove(&mut self, location: &str) {
        if let Some(id) = self.location_to_id.remove(location) {
            self.id_to_location.remove(&id);
        }
    }

    pub fn has_location(&self, location: &str) -> bool {
        self.location_to_id.contains_key(location)
    }

    pub fn id_for(&self, location: &str) -> Option<&str> {
        self.location_to_id.get(location).map(String::as_str)
    }

    pub fn has_id(&self, id: &str) -> bool {
        self.id_to_location.contains_key(id)
    }

    pub fn location_for(&self, id: &str) -> Option<&str> {
        self.id_to_location.get(id).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.id_to_location.len()
    }

    pub fn is_empty(&self) -> bool {
        self.id_to_location.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot() -> HashMap<String, String> {
        HashMap::from([
            ("id1".to_string(), "/a/b.jl".to_string()),
            ("id2".to_string(), "http://x".to_string()),
        ])
    }

    #[test]
    fn test_lookup_both_directions() {
        let dir = NotebookDirectory::from_snapshot(snapshot());
        assert_eq!(dir.id_for("/a/b.jl"), Some("id1"));
        assert_eq!(dir.location_for("id2"), Some("http://x"));
        assert!(!dir.has_location("/nonexistent"));
        assert!(dir.has_id("id1"));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_remove() {
        let mut dir = NotebookDirectory::from_snapshot(snapshot());
        dir.remove("/a/b.jl");
        assert!(!dir.has_location("/a/b.jl"));
        assert!(!dir.has_id("id1"));
        dir.remove("/never/added.jl");
        assert_eq!(dir.len(), 1);
    }

    #[test]
    fn test_readd_replaces_previous_pairing() {
        let mut dir = NotebookDirectory::from_snapshot(snapshot());

        dir.add("/a/b.jl".to_string(), "id3".to_string());
        assert_eq!(dir.id_for("/a/b.jl"), Some("id3"));
        assert!(!dir.has_id("id1"));

        dir.add("/moved/b.jl".to_string(), "id3".to_string());
        assert_eq!(dir.location_for("id3"), Some("/moved/b.jl"));
        assert!(!dir.has_location("/a/b.jl"));
        assert_eq!(dir.len(), 2);
    }

    #[test]
    fn test_decode_snapshot() {
        let bytes = rmp_serde::to_vec(&snapshot()).unwrap();
        let decoded = decode_snapshot(&bytes).unwrap();
        let dir = NotebookDirectory::from_snapshot(decoded);
        assert_eq!(dir.id_for("http://x"), Some("id2"));
    }

    #[test]
    fn test_decode_garbage() {
        assert!(decode_snapshot(&[0xc1, 0x00]).is_err());
    }
}
