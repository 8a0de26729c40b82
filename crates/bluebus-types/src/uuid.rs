//! Bluetooth UUID validation and canonicalization.
//!
//! GATT services and characteristics are named by UUIDs that BlueZ reports in
//! the 128-bit dashed form (`0000180f-0000-1000-8000-00805f9b34fb`). Users and
//! device documentation usually refer to the assigned numbers in their 16-bit
//! (`180f`) or 32-bit (`0000180f`) short forms. The short forms are offsets
//! into the Bluetooth base UUID, so every short form has exactly one 128-bit
//! expansion.
//!
//! All identifiers handled here are lowercase hex: BlueZ never reports upper
//! case, and accepting both would make string comparison ambiguous.

use tracing::{debug, warn};
use uuid::{Uuid, uuid};

use crate::error::{ParseError, ParseResult};

/// The Bluetooth base UUID that 16-bit and 32-bit short forms expand into.
pub const BASE_UUID: Uuid = uuid!("00000000-0000-1000-8000-00805f9b34fb");

/// Bits of a 128-bit UUID that must equal [`BASE_UUID`] for it to have a short form.
const BASE_MASK: u128 = (1 << 96) - 1;

// --- Standard GATT UUIDs ---

/// Generic Access Profile (GAP) service.
pub const GAP_SERVICE: Uuid = uuid!("00001800-0000-1000-8000-00805f9b34fb");

/// Device Information service.
pub const DEVICE_INFO_SERVICE: Uuid = uuid!("0000180a-0000-1000-8000-00805f9b34fb");

/// Battery service.
pub const BATTERY_SERVICE: Uuid = uuid!("0000180f-0000-1000-8000-00805f9b34fb");

/// Battery level characteristic.
pub const BATTERY_LEVEL: Uuid = uuid!("00002a19-0000-1000-8000-00805f9b34fb");

/// Client Characteristic Configuration descriptor.
pub const CLIENT_CHARACTERISTIC_CONFIG: Uuid = uuid!("00002902-0000-1000-8000-00805f9b34fb");

fn is_hex(s: &str) -> bool {
    s.bytes().all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Check whether `s` is a UUID in one of the accepted forms.
///
/// Accepts 16-bit (4 hex digits), 32-bit (8 hex digits) and 128-bit
/// (36 characters, dashed 8-4-4-4-12) forms. Hex digits must be lowercase.
///
/// # Examples
///
/// ```
/// use bluebus_types::uuid::is_valid;
///
/// assert!(is_valid("1234"));
/// assert!(is_valid("00001234-0000-1000-8000-00805f9b34fb"));
/// assert!(!is_valid("ABCD"));
/// assert!(!is_valid("12345"));
/// ```
pub fn is_valid(s: &str) -> bool {
    match s.len() {
        4 | 8 => is_hex(s),
        36 if s.is_ascii() => {
            let bytes = s.as_bytes();
            [8, 13, 18, 23].iter().all(|&i| bytes[i] == b'-')
                && is_hex(&s[0..8])
                && is_hex(&s[9..13])
                && is_hex(&s[14..18])
                && is_hex(&s[19..23])
                && is_hex(&s[24..36])
        }
        _ => false,
    }
}

/// Build the 128-bit UUID for a 16-bit assigned number.
pub fn uuid_from_u16(short: u16) -> Uuid {
    uuid_from_u32(u32::from(short))
}

/// Build the 128-bit UUID for a 32-bit assigned number.
pub fn uuid_from_u32(short: u32) -> Uuid {
    Uuid::from_u128(BASE_UUID.as_u128() | (u128::from(short) << 96))
}

/// Expand a validated identifier into its 128-bit form.
///
/// Returns [`ParseError::InvalidUuid`] if `s` is not in an accepted form.
pub fn try_canonicalize(s: &str) -> ParseResult<String> {
    match s.len() {
        4 | 8 if is_valid(s) => {
            let short = u32::from_str_radix(s, 16)
                .map_err(|_| ParseError::InvalidUuid(s.to_string()))?;
            Ok(uuid_from_u32(short).hyphenated().to_string())
        }
        36 if is_valid(s) => Ok(s.to_string()),
        _ => Err(ParseError::InvalidUuid(s.to_string())),
    }
}

/// Expand an identifier into its 128-bit form.
///
/// 128-bit input is returned unchanged.
///
/// # Panics
///
/// Panics if `s` is not a valid identifier. Callers are expected to have
/// checked it with [`is_valid`] first; use [`try_canonicalize`] for untrusted
/// input.
///
/// # Examples
///
/// ```
/// use bluebus_types::uuid::canonicalize;
///
/// assert_eq!(canonicalize("180f"), "0000180f-0000-1000-8000-00805f9b34fb");
/// ```
pub fn canonicalize(s: &str) -> String {
    match try_canonicalize(s) {
        Ok(long) => long,
        Err(e) => panic!("canonicalize called with unvalidated identifier: {e}"),
    }
}

/// Contract an identifier to its shortest form.
///
/// Identifiers derived from the base UUID become 16-bit (when the value fits)
/// or 32-bit forms. Anything else, including input that is not a valid
/// identifier, is returned unchanged.
///
/// # Examples
///
/// ```
/// use bluebus_types::uuid::shorten;
///
/// assert_eq!(shorten("0000180f-0000-1000-8000-00805f9b34fb"), "180f");
/// assert_eq!(shorten("12345678-0000-1000-8000-00805f9b34fb"), "12345678");
/// assert_eq!(
///     shorten("12345678-9abc-def0-1234-56789abcdef0"),
///     "12345678-9abc-def0-1234-56789abcdef0"
/// );
/// ```
pub fn shorten(s: &str) -> String {
    let Ok(long) = try_canonicalize(s) else {
        return s.to_string();
    };
    let Ok(value) = Uuid::parse_str(&long) else {
        return long;
    };
    let bits = value.as_u128();
    if bits & BASE_MASK != BASE_UUID.as_u128() {
        return long;
    }
    let short = (bits >> 96) as u32;
    if short <= u32::from(u16::MAX) {
        format!("{short:04x}")
    } else {
        format!("{short:08x}")
    }
}

/// Test whether every required identifier is among the advertised ones.
///
/// Both sides are compared in 128-bit form. An invalid entry in `required`
/// is a caller error: it is logged and the whole test fails. Advertised
/// entries come from the remote service; they are lowercased before
/// comparison and malformed ones are ignored.
///
/// # Examples
///
/// ```
/// use bluebus_types::uuid::uuids_include;
///
/// let advertised = ["0000aaaa-0000-1000-8000-00805f9b34fb", "0000bbbb-0000-1000-8000-00805f9b34fb"];
/// assert!(uuids_include(&advertised, &["aaaa"]));
/// assert!(!uuids_include(&advertised[..1], &["bbbb"]));
/// ```
pub fn uuids_include<A, R>(advertised: &[A], required: &[R]) -> bool
where
    A: AsRef<str>,
    R: AsRef<str>,
{
    let advertised: Vec<String> = advertised
        .iter()
        .filter_map(|u| {
            let lower = u.as_ref().to_ascii_lowercase();
            match try_canonicalize(&lower) {
                Ok(long) => Some(long),
                Err(_) => {
                    debug!("Ignoring malformed advertised UUID {:?}", u.as_ref());
                    None
                }
            }
        })
        .collect();

    for u in required {
        let u = u.as_ref();
        let Ok(long) = try_canonicalize(u) else {
            warn!("Invalid UUID {:?}", u);
            return false;
        };
        if !advertised.contains(&long) {
            return false;
        }
    }
    true
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_is_valid() {
        let cases = [
            ("1234", true),
            ("abcd", true),
            ("12345678", true),
            ("00001234-0000-1000-8000-00805f9b34fb", true),
            ("12345", false),
            ("ABCD", false),
            ("abcx", false),
            ("123456789", false),
            ("1234567z", false),
            ("00001234-0000-1000-8000-00805F9B34FB", false),
            ("0000123400001000800000805f9b34fb", false),
            ("g0001234-0000-1000-8000-00805f9b34fb", false),
            ("00001234-0000-1000-8000_00805f9b34fb", false),
            ("00001234-00001-000-8000-00805f9b34fb", false),
            ("", false),
        ];
        for (uuid, valid) in cases {
            assert_eq!(is_valid(uuid), valid, "is_valid({uuid:?})");
        }
    }

    #[test]
    fn test_canonicalize() {
        let cases = [
            ("1234", "00001234-0000-1000-8000-00805f9b34fb"),
            ("00001234", "00001234-0000-1000-8000-00805f9b34fb"),
            ("12345678", "12345678-0000-1000-8000-00805f9b34fb"),
            (
                "00001234-0000-1000-8000-00805f9b34fb",
                "00001234-0000-1000-8000-00805f9b34fb",
            ),
        ];
        for (uuid, long) in cases {
            assert_eq!(canonicalize(uuid), long, "canonicalize({uuid:?})");
        }
    }

    #[test]
    #[should_panic(expected = "unvalidated identifier")]
    fn test_canonicalize_panics_on_invalid() {
        canonicalize("ABCD");
    }

    #[test]
    fn test_try_canonicalize_rejects_invalid() {
        assert_eq!(
            try_canonicalize("12345"),
            Err(ParseError::InvalidUuid("12345".to_string()))
        );
    }

    #[test]
    fn test_shorten() {
        let cases = [
            ("00001234-0000-1000-8000-00805f9b34fb", "1234"),
            ("00001234", "1234"),
            ("1234", "1234"),
            ("12345678-0000-1000-8000-00805f9b34fb", "12345678"),
            (
                "12345678-9abc-1000-8000-00805f9b34fb",
                "12345678-9abc-1000-8000-00805f9b34fb",
            ),
            (
                "12345678-9abc-def0-8000-00805f9b34fb",
                "12345678-9abc-def0-8000-00805f9b34fb",
            ),
            (
                "12345678-9abc-def0-1234-56789abcdef0",
                "12345678-9abc-def0-1234-56789abcdef0",
            ),
            ("not-a-uuid", "not-a-uuid"),
        ];
        for (uuid, short) in cases {
            assert_eq!(shorten(uuid), short, "shorten({uuid:?})");
        }
    }

    #[test]
    fn test_uuid_from_u16() {
        assert_eq!(uuid_from_u16(0x180f), BATTERY_SERVICE);
        assert_eq!(uuid_from_u16(0x2a19), BATTERY_LEVEL);
        assert_eq!(uuid_from_u32(0x2902), CLIENT_CHARACTERISTIC_CONFIG);
    }

    #[test]
    fn test_uuids_include() {
        let advertised = [
            "0000aaaa-0000-1000-8000-00805f9b34fb",
            "0000bbbb-0000-1000-8000-00805f9b34fb",
        ];
        assert!(uuids_include(&advertised, &["aaaa"]));
        assert!(uuids_include(&advertised, &["aaaa", "0000bbbb"]));
        assert!(!uuids_include(&advertised[..1], &["bbbb"]));
        assert!(uuids_include(&advertised, &[] as &[&str]));
    }

    #[test]
    fn test_uuids_include_invalid_required_is_no_match() {
        let advertised = ["0000aaaa-0000-1000-8000-00805f9b34fb"];
        assert!(!uuids_include(&advertised, &["AAAA"]));
        assert!(!uuids_include(&advertised, &["aaaa", "xyz"]));
    }

    #[test]
    fn test_uuids_include_lowercases_advertised() {
        let advertised = ["0000AAAA-0000-1000-8000-00805F9B34FB", "garbage"];
        assert!(uuids_include(&advertised, &["aaaa"]));
    }

    proptest! {
        #[test]
        fn prop_shorten_inverts_canonicalize_16(short in any::<u16>()) {
            let s = format!("{short:04x}");
            prop_assert_eq!(shorten(&canonicalize(&s)), s);
        }

        #[test]
        fn prop_shorten_inverts_canonicalize_32(short in 0x1_0000u32..) {
            let s = format!("{short:08x}");
            prop_assert_eq!(shorten(&canonicalize(&s)), s);
        }

        #[test]
        fn prop_non_base_uuids_pass_through(bits in any::<u128>()) {
            prop_assume!(bits & BASE_MASK != BASE_UUID.as_u128());
            let long = Uuid::from_u128(bits).hyphenated().to_string();
            prop_assert!(is_valid(&long));
            prop_assert_eq!(canonicalize(&long), long.clone());
            prop_assert_eq!(shorten(&long), long);
        }
    }
}
