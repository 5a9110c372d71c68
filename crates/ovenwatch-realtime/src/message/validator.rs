//! Frame and topic validation rules.

use ovenwatch_core::error::AppError;

/// Maximum allowed inbound frame size in bytes.
pub const MAX_FRAME_SIZE: usize = 65_536;

/// Maximum topic length in characters.
pub const MAX_TOPIC_LEN: usize = 256;

/// Validates raw frame size and emptiness.
pub fn validate_frame(raw: &str) -> Result<(), AppError> {
    if raw.len() > MAX_FRAME_SIZE {
        return Err(AppError::protocol(format!(
            "Frame exceeds maximum size of {} bytes",
            MAX_FRAME_SIZE
        )));
    }

    if raw.trim().is_empty() {
        return Err(AppError::protocol("Empty frame"));
    }

    Ok(())
}

/// Whether `topic` is a well-formed topic string.
pub fn is_valid_topic(topic: &str) -> bool {
    !topic.is_empty()
        && topic.chars().count() <= MAX_TOPIC_LEN
        && topic
            .chars()
            .all(|c| c.is_alphanumeric() || matches!(c, ':' | '-' | '_' | '.'))
}

/// Keeps only well-formed topics, preserving order and dropping duplicates.
pub fn valid_topics<'a>(topics: impl IntoIterator<Item = &'a str>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for topic in topics {
        if is_valid_topic(topic) && !out.iter().any(|t| t == topic) {
            out.push(topic.to_string());
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_topic_rules() {
        assert!(is_valid_topic("system_health"));
        assert!(is_valid_topic("orders:store-12.kitchen"));
        assert!(!is_valid_topic(""));
        assert!(!is_valid_topic("has space"));
        assert!(!is_valid_topic(&"a".repeat(MAX_TOPIC_LEN + 1)));
    }

    #[test]
    fn test_valid_topics_dedups() {
        let topics = valid_topics(["alerts", "alerts", "bad topic", "metrics"]);
        assert_eq!(topics, vec!["alerts".to_string(), "metrics".to_string()]);
    }

    #[test]
    fn test_frame_limits() {
        assert!(validate_frame("   ").is_err());
        assert!(validate_frame(&"x".repeat(MAX_FRAME_SIZE + 1)).is_err());
        assert!(validate_frame("{}").is_ok());
    }
}
