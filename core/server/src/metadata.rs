//! Request metadata extraction.
//!
//! Tenant identity and chat history arrive as gRPC metadata headers, not
//! request fields. Malformed values degrade to "absent" rather than
//! failing the call; only a missing user id is treated as unauthorized,
//! and that decision belongs to the chat handler.

use sage_llm::ChatMessage;
use tonic::metadata::MetadataMap;

/// Metadata key carrying the authenticated user id.
pub const USER_ID_KEY: &str = "x-user-id";
/// Metadata key carrying the organization id.
pub const ORGANIZATION_ID_KEY: &str = "x-organization-id";
/// Metadata key carrying comma-separated group ids.
pub const GROUP_IDS_KEY: &str = "x-group-ids";
/// Metadata key carrying the JSON-encoded chat history.
pub const CHAT_HISTORY_KEY: &str = "x-chat-history";

/// Extract the user id, if present and numeric.
pub fn user_id(metadata: &MetadataMap) -> Option<i64> {
    header_str(metadata, USER_ID_KEY)?.trim().parse().ok()
}

/// Extract the organization id, if present and numeric.
pub fn organization_id(metadata: &MetadataMap) -> Option<i64> {
    header_str(metadata, ORGANIZATION_ID_KEY)?.trim().parse().ok()
}

/// Extract the group ids from a comma-separated header.
///
/// Entries that do not parse as integers are dropped.
pub fn group_ids(metadata: &MetadataMap) -> Vec<i64> {
    header_str(metadata, GROUP_IDS_KEY)
        .map(|value| {
            value
                .split(',')
                .filter_map(|part| part.trim().parse().ok())
                .collect()
        })
        .unwrap_or_default()
}

/// Extract the chat history from a JSON header.
///
/// Malformed JSON yields an empty history; entries missing either field
/// are filtered out.
pub fn chat_history(metadata: &MetadataMap) -> Vec<ChatMessage> {
    let raw = match header_str(metadata, CHAT_HISTORY_KEY) {
        Some(raw) => raw,
        None => return vec![],
    };

    let entries: Vec<serde_json::Value> = match serde_json::from_str(raw) {
        Ok(serde_json::Value::Array(entries)) => entries,
        _ => {
            tracing::warn!("malformed chat history header, treating as empty");
            return vec![];
        }
    };

    entries
        .into_iter()
        .filter_map(|entry| {
            let role = entry.get("role")?.as_str()?.to_string();
            let content = entry.get("content")?.as_str()?.to_string();
            Some(ChatMessage { role, content })
        })
        .collect()
}

fn header_str<'a>(metadata: &'a MetadataMap, key: &str) -> Option<&'a str> {
    metadata.get(key)?.to_str().ok()
}

#[cfg(test)]
mod tests {
    use super::*;
    use tonic::metadata::MetadataValue;

    fn metadata_with(key: &'static str, value: &str) -> MetadataMap {
        let mut metadata = MetadataMap::new();
        metadata.insert(key, MetadataValue::try_from(value).unwrap());
        metadata
    }

    #[test]
    fn test_user_id_parsed() {
        let metadata = metadata_with("x-user-id", "42");
        assert_eq!(user_id(&metadata), Some(42));
    }

    #[test]
    fn test_user_id_missing_or_invalid() {
        assert_eq!(user_id(&MetadataMap::new()), None);
        assert_eq!(user_id(&metadata_with("x-user-id", "abc")), None);
    }

    #[test]
    fn test_group_ids_parsed() {
        let metadata = metadata_with("x-group-ids", "10, 20,30");
        assert_eq!(group_ids(&metadata), vec![10, 20, 30]);
    }

    #[test]
    fn test_group_ids_bad_entries_dropped() {
        let metadata = metadata_with("x-group-ids", "10,abc,,30");
        assert_eq!(group_ids(&metadata), vec![10, 30]);
    }

    #[test]
    fn test_group_ids_missing() {
        assert!(group_ids(&MetadataMap::new()).is_empty());
    }

    #[test]
    fn test_chat_history_parsed() {
        let metadata = metadata_with(
            "x-chat-history",
            r#"[{"role":"user","content":"hi"},{"role":"assistant","content":"hello"}]"#,
        );
        let history = chat_history(&metadata);
        assert_eq!(history.len(), 2);
        assert_eq!(history[0].role, "user");
        assert_eq!(history[1].content, "hello");
    }

    #[test]
    fn test_chat_history_filters_incomplete_entries() {
        let metadata = metadata_with(
            "x-chat-history",
            r#"[{"role":"user"},{"content":"x"},{"role":"user","content":"keep"}]"#,
        );
        let history = chat_history(&metadata);
        assert_eq!(history.len(), 1);
        assert_eq!(history[0].content, "keep");
    }

    #[test]
    fn test_chat_history_malformed_is_empty() {
        let metadata = metadata_with("x-chat-history", "not json");
        assert!(chat_history(&metadata).is_empty());

        let metadata = metadata_with("x-chat-history", r#"{"role":"user"}"#);
        assert!(chat_history(&metadata).is_empty());
    }
}
