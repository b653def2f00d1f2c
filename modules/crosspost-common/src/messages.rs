use crate::error::ErrorCode;
use crate::progress::CrawlStep;
use crate::types::SiteType;
use serde::{Deserialize, Serialize};

/// UI locale used to render human-readable status and error text. The
/// machine-readable codes next to that text are locale-independent.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Locale {
    #[default]
    En,
    Ko,
}

impl Locale {
    pub fn from_tag(tag: &str) -> Self {
        match tag.to_ascii_lowercase().as_str() {
            "ko" | "kr" | "ko-kr" => Self::Ko,
            _ => Self::En,
        }
    }
}

pub fn step_text(locale: Locale, step: CrawlStep, site: Option<SiteType>) -> String {
    let site_name = site.map(|s| s.as_str().to_uppercase());
    match locale {
        Locale::En => match step {
            CrawlStep::Initializing => "Initializing...".to_string(),
            CrawlStep::DetectingSite => "Detecting site...".to_string(),
            CrawlStep::Connecting => match site_name {
                Some(name) => format!("Connecting to {name}..."),
                None => "Connecting...".to_string(),
            },
            CrawlStep::Collecting => match site_name {
                Some(name) => format!("Collecting posts from {name}..."),
                None => "Collecting posts...".to_string(),
            },
            CrawlStep::Filtering => "Filtering posts...".to_string(),
            CrawlStep::Processing => "Processing data...".to_string(),
            CrawlStep::Translating => "Translating titles...".to_string(),
            CrawlStep::Packaging => "Packaging media files...".to_string(),
            CrawlStep::Finalizing => "Finalizing results...".to_string(),
            CrawlStep::Complete => "Complete".to_string(),
        },
        Locale::Ko => match step {
            CrawlStep::Initializing => "초기화 중...".to_string(),
            CrawlStep::DetectingSite => "사이트 감지 중...".to_string(),
            CrawlStep::Connecting => match site_name {
                Some(name) => format!("{name} 연결 중..."),
                None => "연결 중...".to_string(),
            },
            CrawlStep::Collecting => match site_name {
                Some(name) => format!("{name}에서 게시물 수집 중..."),
                None => "게시물 수집 중...".to_string(),
            },
            CrawlStep::Filtering => "게시물 필터링 중...".to_string(),
            CrawlStep::Processing => "데이터 처리 중...".to_string(),
            CrawlStep::Translating => "제목 번역 중...".to_string(),
            CrawlStep::Packaging => "미디어 파일 압축 중...".to_string(),
            CrawlStep::Finalizing => "결과 정리 중...".to_string(),
            CrawlStep::Complete => "완료".to_string(),
        },
    }
}

pub fn error_text(locale: Locale, code: ErrorCode) -> &'static str {
    match locale {
        Locale::En => match code {
            ErrorCode::InvalidUrl => "The input is not a valid URL",
            ErrorCode::SiteNotFound => "No crawler is available for this site",
            ErrorCode::NoPostsFound => "No posts matched the given conditions",
            ErrorCode::ConnectionFailed => "Could not connect to the site",
            ErrorCode::Timeout => "The request timed out",
            ErrorCode::RateLimited => "The site is rate-limiting requests",
            ErrorCode::CrawlingError => "An error occurred while crawling",
            ErrorCode::TranslationFailed => "Translation failed",
            ErrorCode::InvalidParameters => "Invalid request parameters",
        },
        Locale::Ko => match code {
            ErrorCode::InvalidUrl => "유효한 URL이 아닙니다",
            ErrorCode::SiteNotFound => "이 사이트를 지원하는 크롤러가 없습니다",
            ErrorCode::NoPostsFound => "조건에 맞는 게시물이 없습니다",
            ErrorCode::ConnectionFailed => "사이트에 연결할 수 없습니다",
            ErrorCode::Timeout => "요청 시간이 초과되었습니다",
            ErrorCode::RateLimited => "사이트가 요청을 제한하고 있습니다",
            ErrorCode::CrawlingError => "크롤링 중 오류가 발생했습니다",
            ErrorCode::TranslationFailed => "번역에 실패했습니다",
            ErrorCode::InvalidParameters => "요청 매개변수가 올바르지 않습니다",
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn locale_tag_parsing() {
        assert_eq!(Locale::from_tag("ko"), Locale::Ko);
        assert_eq!(Locale::from_tag("KO-KR"), Locale::Ko);
        assert_eq!(Locale::from_tag("en"), Locale::En);
        assert_eq!(Locale::from_tag("fr"), Locale::En);
    }

    #[test]
    fn step_text_includes_site() {
        let text = step_text(Locale::En, CrawlStep::Collecting, Some(SiteType::Reddit));
        assert!(text.contains("REDDIT"));
        let text = step_text(Locale::Ko, CrawlStep::Connecting, Some(SiteType::Dcinside));
        assert!(text.contains("DCINSIDE"));
    }
}
