//! Board lookup tables for sites with opaque internal ids.
//!
//! DCInside galleries and Blind topics are addressed by internal ids that
//! users never type; pre-built JSON tables map display names onto them. The
//! tables are loaded lazily from disk, and a missing file only disables
//! resolution for the affected site.

use crate::error::{CrawlError, CrawlResult};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};

pub const GALLERIES_FILE: &str = "galleries.json";
pub const TOPICS_FILE: &str = "boards.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GalleryKind {
    Regular,
    Minor,
}

#[derive(Debug, Clone, Deserialize)]
pub struct GalleryEntry {
    pub id: String,
    #[serde(rename = "type", default)]
    kind_tag: String,
}

impl GalleryEntry {
    pub fn kind(&self) -> GalleryKind {
        if self.kind_tag.eq_ignore_ascii_case("mgallery")
            || self.kind_tag.eq_ignore_ascii_case("minor")
        {
            GalleryKind::Minor
        } else {
            GalleryKind::Regular
        }
    }
}

/// Process-wide lookup tables, read-only after load.
#[derive(Debug, Default)]
pub struct BoardTables {
    galleries: HashMap<String, GalleryEntry>,
    topics: HashMap<String, String>,
}

impl BoardTables {
    /// Load both tables from `data_dir`. Absent or unreadable files are
    /// tolerated and leave the corresponding table empty.
    pub fn load(data_dir: &Path) -> Self {
        let galleries = read_table::<GalleryEntry>(&data_dir.join(GALLERIES_FILE));
        let topics = read_table::<String>(&data_dir.join(TOPICS_FILE));
        tracing::info!(
            galleries = galleries.len(),
            topics = topics.len(),
            dir = %data_dir.display(),
            "board lookup tables loaded"
        );
        Self { galleries, topics }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    /// Resolve a DCInside gallery by id, exact name, or substring.
    /// Minor galleries are searched first so the more specific table wins.
    pub fn resolve_gallery(&self, input: &str) -> CrawlResult<(String, GalleryKind)> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() || self.galleries.is_empty() {
            return Err(CrawlError::BoardNotFound { input: input.to_string() });
        }

        // Exact id or exact case-folded name
        for (name, entry) in &self.galleries {
            if needle == entry.id || needle == name.to_lowercase() {
                return Ok((entry.id.clone(), entry.kind()));
            }
        }

        let substring_match = |kind: GalleryKind| {
            self.galleries
                .iter()
                .filter(|(_, e)| e.kind() == kind)
                .filter(|(name, _)| name.to_lowercase().contains(&needle))
                .min_by_key(|(name, _)| name.chars().count())
        };

        if let Some((name, entry)) =
            substring_match(GalleryKind::Minor).or_else(|| substring_match(GalleryKind::Regular))
        {
            tracing::debug!(input = %input, matched = %name, id = %entry.id, "gallery resolved by substring");
            return Ok((entry.id.clone(), entry.kind()));
        }

        Err(CrawlError::BoardNotFound { input: input.to_string() })
    }

    /// Resolve a Blind topic by id, exact name, or substring (shortest
    /// matching name wins).
    pub fn resolve_topic(&self, input: &str) -> CrawlResult<String> {
        let needle = input.trim().to_lowercase();
        if needle.is_empty() || self.topics.is_empty() {
            return Err(CrawlError::BoardNotFound { input: input.to_string() });
        }

        for (name, id) in &self.topics {
            if needle == *id || needle == name.to_lowercase() {
                return Ok(id.clone());
            }
        }

        if let Some((name, id)) = self
            .topics
            .iter()
            .filter(|(name, _)| name.to_lowercase().contains(&needle))
            .min_by_key(|(name, _)| name.chars().count())
        {
            tracing::debug!(input = %input, matched = %name, "topic resolved by substring");
            return Ok(id.clone());
        }

        Err(CrawlError::BoardNotFound { input: input.to_string() })
    }

    /// Name suggestions for the autocomplete endpoint, capped by the caller.
    pub fn gallery_suggestions(&self, keyword: &str, cap: usize) -> Vec<String> {
        suggest(self.galleries.keys(), keyword, cap)
    }

    pub fn topic_suggestions(&self, keyword: &str, cap: usize) -> Vec<String> {
        suggest(self.topics.keys(), keyword, cap)
    }
}

fn suggest<'a>(names: impl Iterator<Item = &'a String>, keyword: &str, cap: usize) -> Vec<String> {
    let needle = keyword.trim().to_lowercase();
    let mut matches: Vec<&String> = names
        .filter(|name| name.to_lowercase().contains(&needle))
        .collect();
    matches.sort_by_key(|name| (name.chars().count(), name.as_str()));
    matches.into_iter().take(cap).cloned().collect()
}

fn read_table<T: serde::de::DeserializeOwned>(path: &PathBuf) -> HashMap<String, T> {
    let raw = match std::fs::read_to_string(path) {
        Ok(raw) => raw,
        Err(_) => {
            tracing::warn!(path = %path.display(), "lookup table missing, resolution disabled");
            return HashMap::new();
        }
    };
    match serde_json::from_str(&raw) {
        Ok(table) => table,
        Err(err) => {
            tracing::warn!(path = %path.display(), error = %err, "lookup table unreadable");
            HashMap::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tables() -> BoardTables {
        let galleries = serde_json::json!({
            "프로그래밍": {"id": "programming", "type": "regular"},
            "프로그래밍 질문": {"id": "progqa", "type": "mgallery"},
            "싱글벙글": {"id": "singlebungle", "type": "regular"},
        });
        let topics = serde_json::json!({
            "블라블라": "blablah",
            "개발자": "dev",
            "개발자 커리어": "dev-career",
        });
        BoardTables {
            galleries: serde_json::from_value(galleries).unwrap(),
            topics: serde_json::from_value(topics).unwrap(),
        }
    }

    #[test]
    fn exact_id_wins() {
        let (id, kind) = tables().resolve_gallery("programming").unwrap();
        assert_eq!(id, "programming");
        assert_eq!(kind, GalleryKind::Regular);
    }

    #[test]
    fn exact_name_is_case_folded() {
        let id = tables().resolve_topic("개발자").unwrap();
        assert_eq!(id, "dev");
    }

    #[test]
    fn substring_prefers_minor_then_shortest() {
        // "프로그" matches both galleries; the minor one is searched first.
        let (id, kind) = tables().resolve_gallery("프로그").unwrap();
        assert_eq!(id, "progqa");
        assert_eq!(kind, GalleryKind::Minor);

        // "개발" matches two topics; the shorter name wins.
        assert_eq!(tables().resolve_topic("개발").unwrap(), "dev");
    }

    #[test]
    fn miss_is_a_hard_error() {
        assert!(matches!(
            tables().resolve_gallery("없는갤러리"),
            Err(CrawlError::BoardNotFound { .. })
        ));
        assert!(matches!(
            BoardTables::empty().resolve_topic("개발자"),
            Err(CrawlError::BoardNotFound { .. })
        ));
    }

    #[test]
    fn missing_files_are_tolerated() {
        let dir = tempfile::tempdir().unwrap();
        let tables = BoardTables::load(dir.path());
        assert!(tables.resolve_gallery("anything").is_err());
    }

    #[test]
    fn suggestions_are_capped_and_sorted() {
        let names = tables().topic_suggestions("개발", 15);
        assert_eq!(names, vec!["개발자", "개발자 커리어"]);
        assert_eq!(tables().topic_suggestions("개발", 1).len(), 1);
    }
}
