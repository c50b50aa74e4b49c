//! Candidate name → artifact identifier.

/// Identifier used when a name has no ASCII alphanumerics at all.
pub const PLACEHOLDER_IDENTIFIER: &str = "candidate";

/// Map a free-text candidate name to a file-name-safe identifier.
///
/// Every character that is not an ASCII letter or digit becomes `_`,
/// leading and trailing `_` are stripped and the result is lowercased.
/// Output matches `[a-z0-9_]*`, never starts or ends with `_`, and is never
/// empty. Applying it twice changes nothing.
pub fn sanitize(name: &str) -> String {
    let mapped: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() {
                c.to_ascii_lowercase()
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = mapped.trim_matches('_');
    if trimmed.is_empty() {
        PLACEHOLDER_IDENTIFIER.to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_sanitize_examples() {
        assert_eq!(sanitize("SHiP-RRIP (Signature)"), "ship_rrip__signature");
        assert_eq!(
            sanitize("SFSRIP – Stream Filter SRRIP with Signature Predictor"),
            "sfsrip___stream_filter_srrip_with_signature_predictor"
        );
        assert_eq!(sanitize("__DRRIP__"), "drrip");
        assert_eq!(sanitize("Café LRU"), "caf__lru");
    }

    #[test]
    fn test_sanitize_falls_back_to_placeholder() {
        assert_eq!(sanitize(""), PLACEHOLDER_IDENTIFIER);
        assert_eq!(sanitize("***"), PLACEHOLDER_IDENTIFIER);
        assert_eq!(sanitize("ßü"), PLACEHOLDER_IDENTIFIER);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        #[test]
        fn prop_sanitize_idempotent(name in "\\PC{0,40}") {
            let once = sanitize(&name);
            prop_assert_eq!(sanitize(&once), once);
        }

        #[test]
        fn prop_sanitize_charset_and_edges(name in "\\PC{0,40}") {
            let out = sanitize(&name);
            prop_assert!(!out.is_empty());
            prop_assert!(out.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '_'));
            prop_assert!(!out.starts_with('_'));
            prop_assert!(!out.ends_with('_'));
        }
    }
}
