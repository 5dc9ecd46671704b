//! Topic derivation from request paths
//!
//! Rules:
//! - Leading, trailing and repeated `/` are dropped
//! - Remaining segments are joined with a single `/`
//! - An empty result is not a topic
//! - Topic names MUST NOT contain wildcards (+ or #) or the null character,
//!   brokers refuse those on PUBLISH

/// Maximum topic name length in bytes
const MAX_TOPIC_LEN: usize = 65535;

/// Normalize a URL path into a topic; may return an empty string
pub fn derive_topic(path: &str) -> String {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .collect::<Vec<_>>()
        .join("/")
}

/// Validate a topic name for PUBLISH
pub fn validate_topic_name(topic: &str) -> Result<(), &'static str> {
    if topic.is_empty() {
        return Err("topic name cannot be empty");
    }

    if topic.len() > MAX_TOPIC_LEN {
        return Err("topic name exceeds maximum length");
    }

    if topic.contains('\0') {
        return Err("topic name cannot contain null character");
    }

    if topic.contains('+') || topic.contains('#') {
        return Err("topic name cannot contain wildcards");
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_derive_topic() {
        let cases = [
            ("/sensors/temp", "sensors/temp"),
            ("/a//b/", "a/b"),
            ("a/b", "a/b"),
            ("//home///kitchen//light/", "home/kitchen/light"),
            ("/single", "single"),
            ("///", ""),
            ("/", ""),
            ("", ""),
        ];

        for (path, expected) in cases {
            assert_eq!(derive_topic(path), expected, "path {:?}", path);
        }
    }

    #[test]
    fn test_derive_topic_keeps_segment_content() {
        assert_eq!(derive_topic("/dev ice/%20/x.y"), "dev ice/%20/x.y");
        assert_eq!(derive_topic("/$SYS/info"), "$SYS/info");
    }

    #[test]
    fn test_validate_topic_name() {
        assert!(validate_topic_name("sensors/temp").is_ok());
        assert!(validate_topic_name("").is_err());
        assert!(validate_topic_name("sensors/+").is_err());
        assert!(validate_topic_name("sensors/#").is_err());
        assert!(validate_topic_name("bad\0topic").is_err());
        assert!(validate_topic_name(&"a".repeat(MAX_TOPIC_LEN + 1)).is_err());
    }

    mod proptest_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn prop_derived_topic_has_no_empty_segments(path in "[a-z/]{0,40}") {
                let topic = derive_topic(&path);
                prop_assert!(!topic.starts_with('/'));
                prop_assert!(!topic.ends_with('/'));
                prop_assert!(!topic.contains("//"));
            }

            #[test]
            fn prop_derive_topic_is_idempotent(path in "[a-z0-9/]{0,40}") {
                let once = derive_topic(&path);
                prop_assert_eq!(derive_topic(&once), once.clone());
                prop_assert_eq!(derive_topic(&format!("/{}", once)), once);
            }

            #[test]
            fn prop_segments_are_preserved_in_order(segments in prop::collection::vec("[a-z0-9]{1,8}", 1..6)) {
                let path = format!("//{}/", segments.join("//"));
                prop_assert_eq!(derive_topic(&path), segments.join("/"));
            }
        }
    }
}
