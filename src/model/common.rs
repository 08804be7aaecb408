use chrono::{SecondsFormat, Utc};
use uuid::Uuid;

pub type Id = String;

/// Fresh record id. Simple (hyphen-free) form so it satisfies the `Id` field format.
pub fn generate_id() -> Id {
    Uuid::new_v4().simple().to_string()
}

/// Timestamp written into server-managed time fields
pub fn now_timestamp() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Millis, true)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_ids_are_word_characters() {
        let id = generate_id();
        assert_eq!(id.len(), 32);
        assert!(id.chars().all(|c| c.is_ascii_alphanumeric()));
        assert_ne!(id, generate_id());
    }

    #[test]
    fn timestamps_parse_as_rfc3339() {
        let ts = now_timestamp();
        assert!(chrono::DateTime::parse_from_rfc3339(&ts).is_ok());
    }
}
