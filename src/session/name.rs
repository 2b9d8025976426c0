use std::sync::OnceLock;

use regex::Regex;

use crate::error::{Result, StewardError};
use crate::storage::namespace_id;

const MAX_NAME_LEN: usize = 59;

static ALLOWED_CHARS: OnceLock<Regex> = OnceLock::new();

fn allowed_chars() -> &'static Regex {
    ALLOWED_CHARS.get_or_init(|| Regex::new(r"^[A-Za-z0-9 _-]+$").unwrap())
}

/// Checks a session name against the naming rules and returns it unchanged.
///
/// Rules: 1 to 59 characters of letters, digits, spaces, `_` and `-`; no
/// leading, trailing or doubled spaces; the namespace id must begin with a letter.
pub fn validate_session_name(name: &str) -> Result<&str> {
    let invalid = |reason: &str| {
        Err(StewardError::Validation(format!(
            "invalid session name '{}': {}",
            name, reason
        )))
    };

    if name.is_empty() {
        return invalid("name must not be empty");
    }
    if name.chars().count() > MAX_NAME_LEN {
        return invalid("name must be at most 59 characters");
    }
    if !allowed_chars().is_match(name) {
        return invalid("only letters, digits, spaces, '_' and '-' are allowed");
    }
    if name.starts_with(' ') || name.ends_with(' ') {
        return invalid("name must not start or end with a space");
    }
    if name.contains("  ") {
        return invalid("name must not contain consecutive spaces");
    }
    if !namespace_id(name)
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic())
    {
        return invalid("name must start with a letter");
    }

    Ok(name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_valid_names() {
        for name in ["Spring Cup", "heat_1", "Round-3 Final", "A", &"a".repeat(59)] {
            assert!(validate_session_name(name).is_ok(), "{name}");
        }
    }

    #[test]
    fn test_rejects_invalid_names() {
        let long = "a".repeat(60);
        for name in [
            "",
            " Leading",
            "Trailing ",
            "Double  space",
            "1st Heat",
            "_private",
            "semi;colon",
            "Émile",
            long.as_str(),
        ] {
            let err = validate_session_name(name).unwrap_err();
            assert!(matches!(err, StewardError::Validation(_)), "{name}");
        }
    }
}
