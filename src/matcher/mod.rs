//! Keyword matching: crawled content in, per-user notification events out.

mod directory;
mod keywords;
mod models;
mod trigger;

pub use directory::{HttpKeywordDirectory, KeywordDirectory};
pub use keywords::{extract_keywords, MIN_KEYWORD_CHARS};
pub use models::CrawledContent;
pub use trigger::{KeywordMatcher, MatchError, MatchOutcome};
