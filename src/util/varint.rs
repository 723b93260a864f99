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

/// The max bytes of a encoded u32 varint
pub const MAX_VARINT_LEN_U32: usize = 5;
/// The max bytes of a encoded u64 varint
pub const MAX_VARINT_LEN_U64: usize = 10;

macro_rules! impl_varint {
    ($type:ty, $uint:ty, $max_shift:expr) => {
        impl $type {
            /// Appends `n` as a varint to the given vec and returns
            /// the count of written bytes.
            pub fn put_varint(dst: &mut Vec<u8>, mut n: $uint) -> usize {
                let mut written = 1;
                while n >= 0b1000_0000 {
                    dst.push((n as u8) | 0b1000_0000);
                    n >>= 7;
                    written += 1;
                }
                dst.push(n as u8);
                written
            }

            /// Appends the length of `src` as a varint prefix followed by
            /// the contents of `src`.
            pub fn put_varint_prefixed_slice(dst: &mut Vec<u8>, src: &[u8]) {
                Self::put_varint(dst, src.len() as $uint);
                dst.extend_from_slice(src);
            }

            /// Decodes a varint from the head of `src`. Returns the value and
            /// the count of consumed bytes, or `None` when `src` holds no
            /// complete varint or the value overflows.
            pub fn read(src: &[u8]) -> Option<($uint, usize)> {
                let mut n: $uint = 0;
                let mut shift = 0u32;
                for (i, &b) in src.iter().enumerate() {
                    if shift > $max_shift {
                        return None;
                    }
                    if b < 0b1000_0000 {
                        return match (<$uint>::from(b)).checked_shl(shift) {
                            Some(v) => Some((n | v, i + 1)),
                            None => None,
                        };
                    }
                    match (<$uint>::from(b) & 0b0111_1111).checked_shl(shift) {
                        Some(v) => n |= v,
                        None => return None,
                    }
                    shift += 7;
                }
                None
            }

            /// Decodes a varint from the head of `src` and advances `src`
            /// past the consumed bytes.
            pub fn drain_read(src: &mut &[u8]) -> Option<$uint> {
                let (n, consumed) = Self::read(src)?;
                *src = &src[consumed..];
                Some(n)
            }

            /// Decodes a length-prefixed slice from the head of `src` and
            /// advances `src` past both the prefix and the contents.
            pub fn get_varint_prefixed_slice<'a>(src: &mut &'a [u8]) -> Option<&'a [u8]> {
                let len = Self::drain_read(src)? as usize;
                if src.len() < len {
                    return None;
                }
                let res = &src[..len];
                *src = &src[len..];
                Some(res)
            }
        }
    };
}

/// Varint coding for u32
pub enum VarintU32 {}
/// Varint coding for u64
pub enum VarintU64 {}

impl_varint!(VarintU32, u32, 31);
impl_varint!(VarintU64, u64, 63);
