//! Workshop identifier extraction from user input.

use regex::Regex;
use std::sync::LazyLock;

static ID_PARAM_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[?&]id=(\d+)").expect("Invalid workshop id regex"));

/// True for a non-empty string of ASCII digits.
pub fn is_workshop_id(text: &str) -> bool {
    !text.is_empty() && text.bytes().all(|b| b.is_ascii_digit())
}

/// Extract a numeric Steam Workshop id from a bare id or a pasted URL.
///
/// Accepted forms:
/// - `2875848298`
/// - `https://steamcommunity.com/sharedfiles/filedetails/?id=2875848298`
/// - `...?searchtext=zomboid&id=2875848298`
///
/// # Examples
///
/// ```
/// use pzmm::services::extract_workshop_id;
///
/// assert_eq!(extract_workshop_id(" 2875848298 "), Some("2875848298".to_string()));
/// assert_eq!(extract_workshop_id("ModA"), None);
/// ```
pub fn extract_workshop_id(input: &str) -> Option<String> {
    let text = input.trim();
    if text.is_empty() {
        return None;
    }

    if is_workshop_id(text) {
        return Some(text.to_string());
    }

    ID_PARAM_PATTERN
        .captures(text)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}
