use uuid::Uuid;

/// Deterministic UUIDv5 from an arbitrary string id.
///
/// Used to derive stable vector point ids from `content_hash:chunk_index`
/// keys, so re-submitting identical content upserts the same points.
pub fn stable_uuid(id: &str) -> Uuid {
    Uuid::new_v5(&Uuid::NAMESPACE_URL, id.as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn same_input_same_uuid() {
        assert_eq!(stable_uuid("abc:0"), stable_uuid("abc:0"));
        assert_ne!(stable_uuid("abc:0"), stable_uuid("abc:1"));
    }
}
