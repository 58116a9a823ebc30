//! Device identity and its bounded host-facing snapshot.

use serde::{Deserialize, Serialize};

/// Maximum product-name length exposed to hosts, in bytes. Longer names are
/// truncated on a character boundary.
pub const MAX_PRODUCT_NAME_BYTES: usize = 255;

/// Live device identity state, held by the protocol stack implementation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceIdentity {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub minor_revision: u8,
    pub serial_number: u32,
    pub product_name: String,
}

impl Default for DeviceIdentity {
    fn default() -> Self {
        Self {
            vendor_id: 1,
            device_type: 12,
            product_code: 65_001,
            major_revision: 1,
            minor_revision: 0,
            serial_number: 0,
            product_name: "EtherNet/IP Bridge Device".to_string(),
        }
    }
}

/// Immutable, point-in-time copy of the device identity for host queries.
///
/// The product name is bounded to [`MAX_PRODUCT_NAME_BYTES`]; truncation
/// replaces error signaling for oversized names.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentitySnapshot {
    pub vendor_id: u16,
    pub device_type: u16,
    pub product_code: u16,
    pub major_revision: u8,
    pub minor_revision: u8,
    pub serial_number: u32,
    pub product_name: String,
}

impl IdentitySnapshot {
    /// Compose a snapshot from the current identity state. Pure and
    /// infallible.
    pub fn from_identity(identity: &DeviceIdentity) -> Self {
        Self {
            vendor_id: identity.vendor_id,
            device_type: identity.device_type,
            product_code: identity.product_code,
            major_revision: identity.major_revision,
            minor_revision: identity.minor_revision,
            serial_number: identity.serial_number,
            product_name: bounded_name(&identity.product_name),
        }
    }
}

fn bounded_name(name: &str) -> String {
    if name.len() <= MAX_PRODUCT_NAME_BYTES {
        return name.to_string();
    }
    let mut end = MAX_PRODUCT_NAME_BYTES;
    while !name.is_char_boundary(end) {
        end -= 1;
    }
    name[..end].to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_integer_fields_round_trip() {
        let identity = DeviceIdentity {
            vendor_id: 0xffff,
            device_type: 12,
            product_code: 65_001,
            major_revision: 3,
            minor_revision: 9,
            serial_number: u32::MAX,
            product_name: "Adapter".to_string(),
        };
        let snapshot = IdentitySnapshot::from_identity(&identity);
        assert_eq!(snapshot.vendor_id, 0xffff);
        assert_eq!(snapshot.device_type, 12);
        assert_eq!(snapshot.product_code, 65_001);
        assert_eq!(snapshot.major_revision, 3);
        assert_eq!(snapshot.minor_revision, 9);
        assert_eq!(snapshot.serial_number, u32::MAX);
        assert_eq!(snapshot.product_name, "Adapter");
    }

    #[test]
    fn test_oversized_name_is_truncated() {
        let identity = DeviceIdentity {
            product_name: "x".repeat(1000),
            ..DeviceIdentity::default()
        };
        let snapshot = IdentitySnapshot::from_identity(&identity);
        assert_eq!(snapshot.product_name.len(), MAX_PRODUCT_NAME_BYTES);
        assert!(snapshot.product_name.chars().all(|c| c == 'x'));
    }

    #[test]
    fn test_truncation_respects_char_boundaries() {
        // 3-byte characters; 255 is not a multiple of 3, so a naive byte cut
        // would split a character.
        let identity = DeviceIdentity {
            product_name: "\u{20AC}".repeat(100), // 300 bytes of '€'
            ..DeviceIdentity::default()
        };
        let snapshot = IdentitySnapshot::from_identity(&identity);
        assert!(snapshot.product_name.len() <= MAX_PRODUCT_NAME_BYTES);
        assert_eq!(snapshot.product_name.len() % 3, 0);
        assert!(snapshot.product_name.chars().all(|c| c == '\u{20AC}'));
    }

    #[test]
    fn test_name_at_limit_is_unchanged() {
        let identity = DeviceIdentity {
            product_name: "y".repeat(MAX_PRODUCT_NAME_BYTES),
            ..DeviceIdentity::default()
        };
        let snapshot = IdentitySnapshot::from_identity(&identity);
        assert_eq!(snapshot.product_name.len(), MAX_PRODUCT_NAME_BYTES);
    }
}
