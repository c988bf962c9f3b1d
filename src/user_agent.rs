//! User-Agent string shared by every request the crawler makes.

/// Project URL for User-Agent identification.
const PROJECT_UA_URL: &str = "https://github.com/fierce/catalog-crawler";

/// Default User-Agent for catalog and media requests (identifies the tool).
#[must_use]
pub(crate) fn default_crawler_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("catalog-crawler/{version} (+{PROJECT_UA_URL})")
}
