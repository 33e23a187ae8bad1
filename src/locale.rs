//! Locale detection and fallback resolution for dialogue assets.
//!
//! Graph assets are named `"<npc_key>_<locale>.json"`. The locale used for
//! an NPC is resolved in order: explicit argument, configured setting,
//! process environment, then the default.

use tracing::debug;

pub const DEFAULT_LOCALE: &str = "en-US";

/// Locales we ship dialogue for. Anything else normalizes to the default.
const SUPPORTED_LOCALES: &[&str] = &["zh-CN", "en-US"];

/// Normalize a locale tag to one of the supported locales.
///
/// Accepts BCP 47-ish tags as well as POSIX forms like `zh_CN.UTF-8`.
pub fn normalize(tag: &str) -> String {
    let tag = tag.split('.').next().unwrap_or(tag).replace('_', "-");
    let lower = tag.to_ascii_lowercase();

    for supported in SUPPORTED_LOCALES {
        if lower == supported.to_ascii_lowercase() {
            return (*supported).to_string();
        }
    }

    // Match on bare language ("zh", "en-GB" -> "en-US")
    let language = lower.split('-').next().unwrap_or("");
    for supported in SUPPORTED_LOCALES {
        let supported_language = supported.split('-').next().unwrap_or("");
        if !language.is_empty() && language == supported_language.to_ascii_lowercase() {
            return (*supported).to_string();
        }
    }

    DEFAULT_LOCALE.to_string()
}

/// Resolve the primary locale: explicit -> configured -> environment -> default.
pub fn detect(explicit: Option<&str>, configured: Option<&str>) -> String {
    if let Some(tag) = explicit {
        return normalize(tag);
    }
    if let Some(tag) = configured {
        return normalize(tag);
    }
    if let Some(tag) = system_locale() {
        debug!("using system locale '{}'", tag);
        return normalize(&tag);
    }
    DEFAULT_LOCALE.to_string()
}

/// Read the locale from the process environment, if set.
fn system_locale() -> Option<String> {
    for var in ["LC_ALL", "LC_MESSAGES", "LANG"] {
        if let Ok(value) = std::env::var(var) {
            let value = value.trim();
            if !value.is_empty() && value != "C" && value != "POSIX" {
                return Some(value.to_string());
            }
        }
    }
    None
}

/// Build the ordered locale chain to try for an NPC: the primary locale
/// followed by the configured fallbacks, deduplicated.
pub fn fallback_chain(primary: &str, fallbacks: &[String]) -> Vec<String> {
    let mut chain = vec![normalize(primary)];
    for tag in fallbacks {
        let normalized = normalize(tag);
        if !chain.contains(&normalized) {
            chain.push(normalized);
        }
    }
    if !chain.contains(&DEFAULT_LOCALE.to_string()) {
        chain.push(DEFAULT_LOCALE.to_string());
    }
    chain
}
