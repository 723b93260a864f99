// Copyright 2020 The stratadb Authors.
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// See the License for the specific language governing permissions and
// limitations under the License.

use crc32fast::Hasher;

const MASK_DELTA: u32 = 0xa282_ead8;

/// Returns a `u32` crc checksum for given data
pub fn hash(data: &[u8]) -> u32 {
    let mut h = Hasher::new();
    h.update(data);
    h.finalize()
}

/// Returns the crc of the concatenation of the data covered by `crc` and `data`
pub fn extend(crc: u32, data: &[u8]) -> u32 {
    let mut h = Hasher::new_with_initial(crc);
    h.update(data);
    h.finalize()
}

/// Return a masked representation of crc.
///
/// Motivation: it is problematic to compute the CRC of a string that
/// contains embedded CRCs.  Therefore we recommend that CRCs stored
/// somewhere (e.g., in files) should be masked before being stored.
pub fn mask(crc: u32) -> u32 {
    ((crc >> 15) | (crc << 17)).wrapping_add(MASK_DELTA)
}

/// Return the crc whose masked representation is `masked`
pub fn unmask(masked: u32) -> u32 {
    let rot = masked.wrapping_sub(MASK_DELTA);
    (rot >> 17) | (rot << 15)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_well_known_results() {
        // From rfc3720 section B.4.
        let buf = [0u8; 32];
        assert_eq!(0x8a91_36aa, hash(&buf));
        let buf = [0xffu8; 32];
        assert_eq!(0x62a8_ab43, hash(&buf));
    }

    #[test]
    fn test_values_differ() {
        assert_ne!(hash(b"a"), hash(b"foo"));
    }

    #[test]
    fn test_extend_equals_whole() {
        assert_eq!(hash(b"hello world"), extend(hash(b"hello "), b"world"));
    }

    #[test]
    fn test_mask_round_trip() {
        let crc = hash(b"foo");
        assert_ne!(crc, mask(crc));
        assert_ne!(crc, mask(mask(crc)));
        assert_eq!(crc, unmask(mask(crc)));
        assert_eq!(crc, unmask(unmask(mask(mask(crc)))));
    }
}
