//! Structural validation of space descriptors.
//!
//! Only shape is checked here. Payloads and their ids are opaque: how an id
//! relates to its payload, signatures, and ACL semantics all belong to the
//! ACL collaborator.

use crate::descriptor::SpaceDescriptor;
use crate::error::CoreError;

/// Validate a descriptor received from a peer before it is used to create a
/// space.
///
/// Checks that the space id and both payload ids are present.
pub fn validate_descriptor(descriptor: &SpaceDescriptor) -> Result<(), CoreError> {
    if descriptor.header.space_id.is_empty() {
        return Err(CoreError::InvalidDescriptor("empty space id".into()));
    }

    if descriptor.acl_payload_id.is_empty() {
        return Err(CoreError::InvalidDescriptor("empty acl payload id".into()));
    }

    if descriptor.settings_payload_id.is_empty() {
        return Err(CoreError::InvalidDescriptor(
            "empty settings payload id".into(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::SpaceHeader;
    use crate::types::SpaceId;
    use bytes::Bytes;

    fn descriptor(id: &str) -> SpaceDescriptor {
        SpaceDescriptor::new(
            SpaceHeader {
                space_id: SpaceId::from(id),
                space_type: "notes".into(),
                created_at: 0,
                origin: Bytes::new(),
            },
            Bytes::from_static(b"acl-root"),
            Bytes::from_static(b"settings-root"),
        )
    }

    #[test]
    fn test_valid_descriptor() {
        assert!(validate_descriptor(&descriptor("s1")).is_ok());
    }

    #[test]
    fn test_empty_space_id_rejected() {
        assert!(validate_descriptor(&descriptor("")).is_err());
    }

    #[test]
    fn test_foreign_payload_ids_accepted() {
        let mut d = descriptor("s1");
        d.acl_payload_id = "bafyreiacl".into();
        d.settings_payload_id = "bafyreisettings".into();
        assert!(validate_descriptor(&d).is_ok());
    }

    #[test]
    fn test_missing_acl_id_rejected() {
        let mut d = descriptor("s1");
        d.acl_payload_id.clear();
        let err = validate_descriptor(&d).unwrap_err();
        assert!(matches!(err, CoreError::InvalidDescriptor(_)));
    }

    #[test]
    fn test_missing_settings_id_rejected() {
        let mut d = descriptor("s1");
        d.settings_payload_id.clear();
        assert!(validate_descriptor(&d).is_err());
    }
}
