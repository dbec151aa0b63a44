//! User-Agent based bot filter
//!
//! Cheap pattern matching that turns away headless browsers, HTTP libraries
//! and self-declared crawlers before they reach the counters. It is not
//! meant to stop a determined client.

/// Case-insensitive substrings that mark automated clients
const BLOCKED_UA_FRAGMENTS: &[&str] = &[
    "headlesschrome",
    "phantomjs",
    "selenium",
    "puppeteer",
    "playwright",
    "crawler",
    "spider",
    "curl",
    "wget",
    "python-requests",
    "node-fetch",
    "go-http-client",
];

/// Real browsers send far longer strings than this
const MIN_UA_LEN: usize = 10;

pub fn is_bot(user_agent: Option<&str>) -> bool {
    let Some(ua) = user_agent else {
        return true;
    };
    if ua.chars().count() < MIN_UA_LEN {
        return true;
    }

    let ua = ua.to_lowercase();
    BLOCKED_UA_FRAGMENTS.iter().any(|f| ua.contains(f)) || has_word(&ua, "bot")
}

/// `word` appears delimited by non-word characters (`\b` semantics)
fn has_word(haystack: &str, word: &str) -> bool {
    haystack
        .split(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
        .any(|token| token == word)
}
