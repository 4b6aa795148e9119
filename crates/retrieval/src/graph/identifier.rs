//! Schema identifier validation
//!
//! Cypher cannot bind property keys, labels or relation types as parameters.
//! Anything spliced into query text must pass this allow-list first.

use kgfusion_common::errors::{AppError, Result};
use regex_lite::Regex;
use std::sync::OnceLock;

const MAX_IDENTIFIER_LEN: usize = 64;

fn identifier_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("static pattern"))
}

/// Validate a schema identifier and return it for splicing
pub fn validate_identifier(identifier: &str) -> Result<&str> {
    if identifier.len() > MAX_IDENTIFIER_LEN {
        return Err(AppError::InvalidIdentifier {
            identifier: identifier.chars().take(MAX_IDENTIFIER_LEN).collect(),
            reason: format!("longer than {} characters", MAX_IDENTIFIER_LEN),
        });
    }

    if !identifier_pattern().is_match(identifier) {
        return Err(AppError::InvalidIdentifier {
            identifier: identifier.to_string(),
            reason: "only ASCII letters, digits and '_' are allowed, not starting with a digit"
                .to_string(),
        });
    }

    Ok(identifier)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_accepts_plain_identifiers() {
        for ok in ["name", "Name", "_id", "entity_name2"] {
            assert_eq!(validate_identifier(ok).unwrap(), ok);
        }
    }

    #[test]
    fn test_rejects_injection_attempts() {
        for bad in [
            "",
            "1name",
            "name`}) DETACH DELETE (n",
            "name space",
            "이름",
            "name;",
        ] {
            assert!(
                matches!(validate_identifier(bad), Err(AppError::InvalidIdentifier { .. })),
                "accepted {bad:?}"
            );
        }
    }

    #[test]
    fn test_rejects_overlong_identifier() {
        let long = "a".repeat(65);
        assert!(validate_identifier(&long).is_err());
        assert!(validate_identifier(&"a".repeat(64)).is_ok());
    }
}
