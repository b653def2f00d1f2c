pub mod cancel;
pub mod config;
pub mod error;
pub mod messages;
pub mod progress;
pub mod types;

pub use cancel::CancelFlag;
pub use config::Config;
pub use error::ErrorCode;
pub use messages::Locale;
pub use progress::{CrawlStep, ProgressSink, ServerMessage};
pub use types::*;

/// Extract the host of a URL-ish string, lowercased, without a leading `www.`.
/// Tolerates bare domains (`example.com/path`) the way user input arrives.
pub fn extract_domain(input: &str) -> String {
    let stripped = input
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped.split(['/', '?', '#']).next().unwrap_or("").to_ascii_lowercase();
    host.trim_start_matches("www.").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_domain_strips_scheme_and_www() {
        assert_eq!(extract_domain("https://www.reddit.com/r/rust"), "reddit.com");
        assert_eq!(extract_domain("gall.dcinside.com/board/lists/?id=game"), "gall.dcinside.com");
        assert_eq!(extract_domain("  http://BBC.co.uk  "), "bbc.co.uk");
    }
}
