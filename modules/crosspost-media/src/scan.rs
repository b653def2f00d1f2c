//! Media-URL scanning over crawl results.

use crosspost_common::PostRecord;
use std::collections::HashSet;

/// Extensions accepted as downloadable media.
const MEDIA_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "webp", "bmp", "mp4", "webm", "mov", "mp3", "m4a", "wav",
];

/// Hosts that serve media regardless of what the URL path looks like.
const MEDIA_HOSTS: &[&str] = &[
    "imgur.com",
    "i.imgur.com",
    "i.redd.it",
    "v.redd.it",
    "preview.redd.it",
    "pinimg.com",
    "youtube.com",
    "youtu.be",
    "streamable.com",
    "giphy.com",
    "gfycat.com",
    "cdn.discordapp.com",
];

/// Post fields inspected for media URLs, beyond the two dedicated ones.
const EXTRA_KEYS: &[&str] = &["image_url", "attachment_url"];

/// Collect every valid media URL across the posts, deduplicated, in post
/// order.
pub fn collect_media_urls(posts: &[PostRecord]) -> Vec<String> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut urls = Vec::new();

    let mut push = |url: &str| {
        if is_media_url(url) && seen.insert(url.to_string()) {
            urls.push(url.to_string());
        }
    };

    for post in posts {
        if let Some(url) = &post.media_url {
            push(url);
        }
        if let Some(url) = &post.thumbnail_url {
            push(url);
        }
        for key in EXTRA_KEYS {
            if let Some(url) = post.extras.get(*key).and_then(|v| v.as_str()) {
                push(url);
            }
        }
    }
    urls
}

/// A URL qualifies by extension or by host.
pub fn is_media_url(url: &str) -> bool {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return false;
    }

    let path = url.split(['?', '#']).next().unwrap_or(url);
    if let Some(ext) = path.rsplit('.').next() {
        if MEDIA_EXTENSIONS.contains(&ext.to_ascii_lowercase().as_str()) {
            return true;
        }
    }

    let host = crosspost_common::extract_domain(url);
    MEDIA_HOSTS.iter().any(|h| host == *h || host.ends_with(&format!(".{h}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crosspost_common::SiteType;

    #[test]
    fn extension_and_host_validation() {
        assert!(is_media_url("https://example.com/photo.JPG"));
        assert!(is_media_url("https://i.redd.it/anything"));
        assert!(is_media_url("https://www.youtube.com/watch?v=abc"));
        assert!(!is_media_url("https://example.com/article.html"));
        assert!(!is_media_url("ftp://example.com/photo.jpg"));
    }

    #[test]
    fn urls_are_deduped_in_post_order() {
        let mut first = PostRecord::new(SiteType::Reddit, "pics", "a", "https://reddit.com/a");
        first.media_url = Some("https://i.redd.it/one.jpg".into());
        first.thumbnail_url = Some("https://i.redd.it/one.jpg".into());

        let mut second = PostRecord::new(SiteType::Reddit, "pics", "b", "https://reddit.com/b");
        second.thumbnail_url = Some("https://i.redd.it/two.png".into());
        second
            .extras
            .insert("image_url".into(), serde_json::json!("https://cdn.discordapp.com/att/three"));

        let urls = collect_media_urls(&[first, second]);
        assert_eq!(
            urls,
            vec![
                "https://i.redd.it/one.jpg",
                "https://i.redd.it/two.png",
                "https://cdn.discordapp.com/att/three",
            ]
        );
    }
}
