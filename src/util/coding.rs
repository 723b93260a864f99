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

// Copyright (c) 2011 The LevelDB Authors. All rights reserved.
// Use of this source code is governed by a BSD-style license that can be
// found in the LICENSE file.

/// Encodes `value` in little-endian into the first 4 bytes of `dst`.
///
/// # Panics
///
/// Panics if `dst.len()` is less than 4.
pub fn encode_fixed_32(dst: &mut [u8], value: u32) {
    assert!(
        dst.len() >= 4,
        "[coding] the length of 'dst' must be at least 4 for a u32, but got {}",
        dst.len()
    );
    dst[..4].copy_from_slice(&value.to_le_bytes());
}

/// Encodes `value` in little-endian into the first 8 bytes of `dst`.
///
/// # Panics
///
/// Panics if `dst.len()` is less than 8.
pub fn encode_fixed_64(dst: &mut [u8], value: u64) {
    assert!(
        dst.len() >= 8,
        "[coding] the length of 'dst' must be at least 8 for a u64, but got {}",
        dst.len()
    );
    dst[..8].copy_from_slice(&value.to_le_bytes());
}

/// Appends `value` in little-endian to the given vec.
pub fn put_fixed_32(dst: &mut Vec<u8>, value: u32) {
    dst.extend_from_slice(&value.to_le_bytes());
}

/// Appends `value` in little-endian to the given vec.
pub fn put_fixed_64(dst: &mut Vec<u8>, value: u64) {
    dst.extend_from_slice(&value.to_le_bytes());
}

/// Decodes the first 4 bytes of `src` in little-endian.
///
/// # Panics
///
/// Panics if `src.len()` is less than 4.
pub fn decode_fixed_32(src: &[u8]) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&src[..4]);
    u32::from_le_bytes(buf)
}

/// Decodes the first 8 bytes of `src` in little-endian.
///
/// # Panics
///
/// Panics if `src.len()` is less than 8.
pub fn decode_fixed_64(src: &[u8]) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&src[..8]);
    u64::from_le_bytes(buf)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fixed_32_round_trip() {
        let tests = vec![0u32, 1, 255, 256, 512, u32::max_value() - 1, u32::max_value()];
        for input in tests {
            let mut buf = vec![0; 4];
            encode_fixed_32(&mut buf, input);
            assert_eq!(decode_fixed_32(&buf), input);
        }
    }

    #[test]
    fn test_fixed_64_round_trip() {
        let tests = vec![
            0u64,
            1,
            255,
            256,
            1 << 32,
            (1 << 56) - 1,
            u64::max_value(),
        ];
        for input in tests {
            let mut buf = vec![];
            put_fixed_64(&mut buf, input);
            assert_eq!(buf.len(), 8);
            assert_eq!(decode_fixed_64(&buf), input);
        }
    }

    #[test]
    fn test_fixed_32_little_endian() {
        let mut buf = vec![];
        put_fixed_32(&mut buf, 0x0403_0201);
        assert_eq!(buf, vec![1, 2, 3, 4]);
    }

    #[test]
    #[should_panic]
    fn test_encode_fixed_32_panics_on_short_dst() {
        let mut buf = [0u8; 3];
        encode_fixed_32(&mut buf, 1);
    }
}
