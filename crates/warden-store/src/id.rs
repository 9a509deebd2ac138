//! Prefixed entity identifiers, e.g. `case_1f2a9c3b4d5e`.

use uuid::Uuid;

/// Generate a new id with the given domain prefix and 12 hex characters of
/// randomness.
pub fn new_id(prefix: &str) -> String {
    let uuid = Uuid::new_v4().simple().to_string();
    format!("{}_{}", prefix, &uuid[..12])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_new_id_shape() {
        let id = new_id("case");
        assert!(id.starts_with("case_"));
        assert_eq!(id.len(), "case_".len() + 12);
        assert_ne!(new_id("case"), new_id("case"));
    }
}
