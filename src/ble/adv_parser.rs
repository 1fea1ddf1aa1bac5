//! Advertising-data (AD structure) helpers.
//!
//! AD payloads are a sequence of `[len][type][data; len - 1]` records.
//! The builders in [`super::advertising`] emit them; these readers are
//! used to check what actually goes on air.

use heapless::String;

pub const AD_TYPE_FLAGS: u8 = 0x01;
pub const AD_TYPE_UUID128_INCOMPLETE: u8 = 0x06;
pub const AD_TYPE_UUID128_COMPLETE: u8 = 0x07;
pub const AD_TYPE_NAME_SHORT: u8 = 0x08;
pub const AD_TYPE_NAME_COMPLETE: u8 = 0x09;

/// LE General Discoverable Mode.
pub const FLAG_LE_GENERAL_DISCOVERABLE: u8 = 0x02;
/// BR/EDR Not Supported.
pub const FLAG_BR_EDR_NOT_SUPPORTED: u8 = 0x04;

/// Iterator over `(ad_type, data)` records. Stops at the first malformed
/// length.
pub struct AdStructures<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Iterator for AdStructures<'a> {
    type Item = (u8, &'a [u8]);

    fn next(&mut self) -> Option<Self::Item> {
        let len = *self.data.get(self.pos)? as usize;
        if len == 0 || self.pos + len >= self.data.len() {
            return None;
        }
        let ad_type = self.data[self.pos + 1];
        let body = &self.data[self.pos + 2..self.pos + 1 + len];
        self.pos += len + 1;
        Some((ad_type, body))
    }
}

pub fn ad_structures(data: &[u8]) -> AdStructures<'_> {
    AdStructures { data, pos: 0 }
}

/// Flags byte, if present.
pub fn extract_flags(data: &[u8]) -> Option<u8> {
    ad_structures(data)
        .find(|(ad_type, body)| *ad_type == AD_TYPE_FLAGS && body.len() == 1)
        .map(|(_, body)| body[0])
}

/// Check if the data lists `uuid` in a (complete or incomplete) 128-bit
/// service UUID record.
pub fn contains_service_uuid128(data: &[u8], uuid: u128) -> bool {
    let wanted = uuid.to_le_bytes();
    ad_structures(data)
        .filter(|(ad_type, _)| {
            *ad_type == AD_TYPE_UUID128_COMPLETE || *ad_type == AD_TYPE_UUID128_INCOMPLETE
        })
        .any(|(_, body)| body.chunks_exact(16).any(|chunk| chunk == wanted))
}

/// Extract complete/shortened local name from advertisement data.
pub fn extract_device_name(data: &[u8]) -> String<32> {
    for (ad_type, body) in ad_structures(data) {
        if ad_type == AD_TYPE_NAME_SHORT || ad_type == AD_TYPE_NAME_COMPLETE {
            let mut name = String::new();
            for &b in body {
                if name.push(b as char).is_err() {
                    break;
                }
            }
            return name;
        }
    }

    let mut s = String::new();
    let _ = s.push_str("Unknown");
    s
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn flags_are_found_among_records() {
        let ad_data = [0x02, 0x01, 0x06, 0x03, 0x09, b'A', b'B'];
        assert_eq!(extract_flags(&ad_data), Some(0x06));
    }

    #[test]
    fn uuid128_is_matched_little_endian() {
        let uuid = 0x00001523_1212_efde_1523_785feabcd123_u128;
        let mut ad_data = [0u8; 18];
        ad_data[0] = 17;
        ad_data[1] = AD_TYPE_UUID128_COMPLETE;
        ad_data[2..].copy_from_slice(&uuid.to_le_bytes());

        assert!(contains_service_uuid128(&ad_data, uuid));
        assert!(!contains_service_uuid128(&ad_data, uuid + 1));
    }

    #[test]
    fn extract_complete_local_name() {
        let ad_data = [0x05, 0x09, b'M', b'o', b'u', b's'];
        assert_eq!(extract_device_name(&ad_data).as_str(), "Mous");
    }

    #[test]
    fn no_name_in_advertisement() {
        let ad_data = [0x02, 0x01, 0x06];
        assert_eq!(extract_device_name(&ad_data).as_str(), "Unknown");
    }

    #[test]
    fn malformed_lengths_stop_parsing() {
        assert_eq!(ad_structures(&[0x00]).count(), 0);
        assert_eq!(ad_structures(&[0x05, 0x03, 0x12]).count(), 0);
        assert_eq!(extract_flags(&[]), None);
    }
}
