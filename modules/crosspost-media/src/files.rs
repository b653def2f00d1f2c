//! Archive filename derivation and sanitizing.

use sha2::{Digest, Sha256};
use std::collections::HashSet;

const FORBIDDEN: &[char] = &['<', '>', ':', '"', '/', '\\', '|', '?', '*'];

const MAX_NAME_LEN: usize = 120;

/// Derive a safe archive entry name from a media URL. Falls back to
/// `media_{index}_{hash}.{ext}` when the URL path gives nothing usable, and
/// suffixes `_1`, `_2`, ... on collisions with `taken`.
pub fn entry_name(url: &str, index: usize, taken: &mut HashSet<String>) -> String {
    let candidate = url
        .split(['?', '#'])
        .next()
        .and_then(|path| path.rsplit('/').next())
        .map(sanitize)
        .filter(|name| !name.is_empty() && name.contains('.'))
        .unwrap_or_else(|| format!("media_{index}_{}.{}", short_hash(url), guess_extension(url)));

    let unique = dedupe(candidate, taken);
    taken.insert(unique.clone());
    unique
}

fn sanitize(raw: &str) -> String {
    let cleaned: String = raw
        .chars()
        .map(|c| if FORBIDDEN.contains(&c) || c.is_control() { '_' } else { c })
        .collect();

    // Collapse runs of underscores left behind by stripping.
    let mut collapsed = String::with_capacity(cleaned.len());
    let mut last_underscore = false;
    for c in cleaned.chars() {
        if c == '_' {
            if !last_underscore {
                collapsed.push(c);
            }
            last_underscore = true;
        } else {
            collapsed.push(c);
            last_underscore = false;
        }
    }

    collapsed
        .trim_matches(['_', '.', ' '])
        .chars()
        .take(MAX_NAME_LEN)
        .collect()
}

fn dedupe(name: String, taken: &HashSet<String>) -> String {
    if !taken.contains(&name) {
        return name;
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem.to_string(), format!(".{ext}")),
        None => (name.clone(), String::new()),
    };
    for n in 1.. {
        let candidate = format!("{stem}_{n}{ext}");
        if !taken.contains(&candidate) {
            return candidate;
        }
    }
    unreachable!()
}

fn short_hash(url: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(url.as_bytes());
    hex::encode(&hasher.finalize()[..4])
}

fn guess_extension(url: &str) -> &'static str {
    let lower = url.to_lowercase();
    for ext in ["jpg", "jpeg", "png", "gif", "webp", "mp4", "webm", "mp3"] {
        if lower.contains(&format!(".{ext}")) {
            return if ext == "jpeg" { "jpg" } else { ext };
        }
    }
    "bin"
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn path_stem_is_sanitized() {
        let mut taken = HashSet::new();
        let name = entry_name("https://i.redd.it/ab<c>d.jpg?width=640", 0, &mut taken);
        assert_eq!(name, "ab_c_d.jpg");
    }

    #[test]
    fn collisions_get_numeric_suffixes() {
        let mut taken = HashSet::new();
        let first = entry_name("https://a.example/photo.jpg", 0, &mut taken);
        let second = entry_name("https://b.example/photo.jpg", 1, &mut taken);
        let third = entry_name("https://c.example/photo.jpg", 2, &mut taken);
        assert_eq!(first, "photo.jpg");
        assert_eq!(second, "photo_1.jpg");
        assert_eq!(third, "photo_2.jpg");
    }

    #[test]
    fn pathless_urls_fall_back_to_hashed_names() {
        let mut taken = HashSet::new();
        let name = entry_name("https://v.redd.it/xyz", 3, &mut taken);
        assert!(name.starts_with("media_3_"));
        assert!(name.ends_with(".bin"));
    }

    #[test]
    fn fallback_keeps_a_recognizable_extension() {
        let mut taken = HashSet::new();
        let name = entry_name("https://cdn.example/stream.mp4/segment", 0, &mut taken);
        assert!(name.ends_with(".mp4"));
    }
}
