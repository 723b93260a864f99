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

use crate::util::coding::{decode_fixed_64, put_fixed_64};
use crate::util::comparator::Comparator;
use crate::util::varint::VarintU32;
use std::cmp::Ordering;
use std::fmt::{Debug, Formatter};
use std::str;

/// The max key sequence number. The value is 2^56 - 1 because the seq number
/// only takes 56 bits when it is serialized into an `InternalKey`.
pub const MAX_KEY_SEQUENCE: u64 = (1u64 << 56) - 1;

/// The tail bytes length of an internal key:
/// 7 bytes sequence number + 1 byte value type
pub const INTERNAL_KEY_TAIL: usize = 8;

#[derive(Debug, Clone, Copy, Eq, PartialEq)]
pub enum ValueType {
    /// A value indicating that the key is deleted
    Deletion = 0,
    /// A normal value
    Value = 1,

    /// Unknown type
    Unknown,
}

/// `VALUE_TYPE_FOR_SEEK` defines the `ValueType` that should be passed when
/// constructing an internal key for seeking to a particular sequence number
/// (since we sort sequence numbers in decreasing order and the value type is
/// embedded as the low 8 bits in the sequence number in internal keys, we
/// need to use the highest-numbered ValueType, not the lowest).
pub const VALUE_TYPE_FOR_SEEK: ValueType = ValueType::Value;

impl From<u64> for ValueType {
    fn from(v: u64) -> Self {
        match v {
            1 => ValueType::Value,
            0 => ValueType::Deletion,
            _ => ValueType::Unknown,
        }
    }
}

/// A `ParsedInternalKey` is the deserialized view of an internal key.
pub struct ParsedInternalKey<'a> {
    /// The user's normal used key
    pub user_key: &'a [u8],
    /// The sequence number of the key
    pub seq: u64,
    /// The value type
    pub value_type: ValueType,
}

impl<'a> ParsedInternalKey<'a> {
    pub fn new(key: &'a [u8], seq: u64, value_type: ValueType) -> ParsedInternalKey<'a> {
        ParsedInternalKey {
            user_key: key,
            seq,
            value_type,
        }
    }

    /// Try to extract a `ParsedInternalKey` from the given bytes.
    /// Returns `None` if data length is less than 8 or we got an unknown
    /// value type.
    pub fn decode_from(internal_key: &'a [u8]) -> Option<ParsedInternalKey<'a>> {
        let size = internal_key.len();
        if size < INTERNAL_KEY_TAIL {
            return None;
        }
        let num = decode_fixed_64(&internal_key[size - INTERNAL_KEY_TAIL..]);
        let t = ValueType::from(num & 0xff);
        if t == ValueType::Unknown {
            return None;
        }
        Some(Self {
            user_key: &internal_key[..size - INTERNAL_KEY_TAIL],
            seq: num >> 8,
            value_type: t,
        })
    }

    /// Returns an `InternalKey` encoded from this `ParsedInternalKey`
    #[inline]
    pub fn encode(&self) -> InternalKey {
        InternalKey::new(self.user_key, self.seq, self.value_type)
    }
}

impl<'a> Debug for ParsedInternalKey<'a> {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        write!(
            f,
            "{:?} @ {} : {:?}",
            self.user_key, self.seq, self.value_type
        )
    }
}

/// An `InternalKey` is an encoding of a `ParsedInternalKey`.
///
/// The format of an `InternalKey`:
///
/// ```text
/// | ----------- n bytes ----------- | --- 7 bytes --- | - 1 byte - |
///              user key                  seq number        type
/// ```
#[derive(Default, Clone, PartialEq, Eq)]
pub struct InternalKey {
    data: Vec<u8>,
}

impl InternalKey {
    pub fn new(key: &[u8], seq: u64, t: ValueType) -> Self {
        let mut data = Vec::from(key);
        put_fixed_64(&mut data, pack_seq_and_type(seq, t));
        InternalKey { data }
    }

    #[inline]
    pub fn decoded_from(src: &[u8]) -> Self {
        Self {
            data: Vec::from(src),
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.data.len()
    }

    #[inline]
    pub fn data(&self) -> &[u8] {
        self.data.as_slice()
    }

    #[inline]
    pub fn user_key(&self) -> &[u8] {
        let length = self.data.len();
        &self.data[..length - INTERNAL_KEY_TAIL]
    }

    /// Returns a `ParsedInternalKey` view, or `None` for an ill-formed key
    pub fn parsed(&self) -> Option<ParsedInternalKey<'_>> {
        ParsedInternalKey::decode_from(self.data.as_slice())
    }
}

impl Debug for InternalKey {
    fn fmt(&self, f: &mut Formatter) -> std::fmt::Result {
        if let Some(parsed) = self.parsed() {
            write!(f, "{:?}", parsed)
        } else {
            write!(f, "(bad){:?}", &self.data)
        }
    }
}

/// A `LookupKey` represents a point-read request for a user key at a
/// specific sequence number.
///
/// The format of a `LookupKey`:
///
/// ```text
///
///   +---------------------------------+
///   | varint32 of internal key length |
///   +---------------------------------+ --------------- user key start
///   | user key bytes                  |
///   +---------------------------------+   internal key
///   | sequence (7)        |  seek (1) |
///   +---------------------------------+ ---------------
///
/// ```
pub struct LookupKey {
    data: Vec<u8>,
    ukey_start: usize,
}

impl LookupKey {
    pub fn new(user_key: &[u8], seq_number: u64) -> Self {
        let mut data = vec![];
        let ukey_start =
            VarintU32::put_varint(&mut data, (user_key.len() + INTERNAL_KEY_TAIL) as u32);
        data.extend_from_slice(user_key);
        put_fixed_64(
            &mut data,
            pack_seq_and_type(seq_number, VALUE_TYPE_FOR_SEEK),
        );
        Self { data, ukey_start }
    }

    /// Returns an internal key (suitable for passing to an internal iterator)
    pub fn internal_key(&self) -> &[u8] {
        &self.data[self.ukey_start..]
    }

    /// Returns the user key
    pub fn user_key(&self) -> &[u8] {
        let len = self.data.len();
        &self.data[self.ukey_start..len - INTERNAL_KEY_TAIL]
    }
}

/// `InternalKeyComparator` is used for comparing encoded internal keys.
/// The comparison result is ordered by:
///    increasing user key (according to the user-supplied comparator)
///    decreasing sequence number
///    decreasing type (though the sequence number should be enough to
///    disambiguate)
#[derive(Clone, Default)]
pub struct InternalKeyComparator<C: Comparator> {
    /// The comparator defined in `Options`
    pub user_comparator: C,
}

impl<C: Comparator> InternalKeyComparator<C> {
    pub fn new(ucmp: C) -> Self {
        InternalKeyComparator {
            user_comparator: ucmp,
        }
    }
}

impl<C: Comparator> Comparator for InternalKeyComparator<C> {
    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        let ua = extract_user_key(a);
        let ub = extract_user_key(b);
        match self.user_comparator.compare(ua, ub) {
            Ordering::Equal => {
                let sa = extract_seq_number(a);
                let sb = extract_seq_number(b);
                // a larger seq number is ordered first since it should be
                // seeked first
                sb.cmp(&sa)
            }
            o => o,
        }
    }

    #[inline]
    fn name(&self) -> &str {
        "stratadb.InternalKeyComparator"
    }

    fn separator(&self, a: &[u8], b: &[u8]) -> Vec<u8> {
        let ua = extract_user_key(a);
        let ub = extract_user_key(b);
        let mut sep = self.user_comparator.separator(ua, ub);
        if sep.len() < ua.len() && self.user_comparator.compare(ua, &sep) == Ordering::Less {
            // The user key has become shorter physically, but larger
            // logically. Tack on the earliest possible number to the
            // shortened user key.
            put_fixed_64(
                &mut sep,
                pack_seq_and_type(MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK),
            );
            sep
        } else {
            a.to_owned()
        }
    }

    fn successor(&self, key: &[u8]) -> Vec<u8> {
        let ukey = extract_user_key(key);
        let mut suc = self.user_comparator.successor(ukey);
        if suc.len() < ukey.len() && self.user_comparator.compare(ukey, &suc) == Ordering::Less {
            put_fixed_64(
                &mut suc,
                pack_seq_and_type(MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK),
            );
            suc
        } else {
            key.to_owned()
        }
    }
}

/// Returns the user key portion of an encoded internal key
#[inline]
pub fn extract_user_key(key: &[u8]) -> &[u8] {
    let size = key.len();
    assert!(
        size >= INTERNAL_KEY_TAIL,
        "[internal key] invalid size of internal key: expect >= {} but got {}",
        INTERNAL_KEY_TAIL,
        size
    );
    &key[..size - INTERNAL_KEY_TAIL]
}

// Gets the sequence number from an encoded internal key
#[inline]
fn extract_seq_number(key: &[u8]) -> u64 {
    let size = key.len();
    assert!(
        size >= INTERNAL_KEY_TAIL,
        "[internal key] invalid size of internal key: expect >= {} but got {}",
        INTERNAL_KEY_TAIL,
        size
    );
    decode_fixed_64(&key[size - INTERNAL_KEY_TAIL..]) >> 8
}

// Composes a sequence number and a value type into a single u64
#[inline]
fn pack_seq_and_type(seq: u64, v_type: ValueType) -> u64 {
    assert!(
        seq <= MAX_KEY_SEQUENCE,
        "[key seq] the sequence number should be <= {}, but got {}",
        MAX_KEY_SEQUENCE,
        seq
    );
    seq << 8 | v_type as u64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::comparator::BytewiseComparator;

    #[test]
    fn test_pack_seq_and_type() {
        let tests: Vec<(u64, ValueType, Vec<u8>)> = vec![
            (1, ValueType::Value, vec![1, 1, 0, 0, 0, 0, 0, 0]),
            (2, ValueType::Deletion, vec![0, 2, 0, 0, 0, 0, 0, 0]),
            (
                MAX_KEY_SEQUENCE,
                ValueType::Deletion,
                vec![0, 255, 255, 255, 255, 255, 255, 255],
            ),
        ];
        for (seq, t, expect) in tests {
            assert_eq!(pack_seq_and_type(seq, t), decode_fixed_64(&expect));
        }
    }

    #[test]
    #[should_panic]
    fn test_pack_seq_and_type_panic() {
        pack_seq_and_type(1 << 56, ValueType::Value);
    }

    fn assert_encoded_decoded(key: &str, seq: u64, vt: ValueType) {
        let encoded = InternalKey::new(key.as_bytes(), seq, vt);
        assert_eq!(key.as_bytes(), encoded.user_key());
        let decoded = encoded.parsed().expect("");
        assert_eq!(key.as_bytes(), decoded.user_key);
        assert_eq!(seq, decoded.seq);
        assert_eq!(vt, decoded.value_type);
    }

    #[test]
    fn test_internal_key_encode_decode() {
        let test_keys = ["", "k", "hello", "longggggggggggggggggggggg"];
        let test_seqs = [
            1,
            2,
            3,
            (1u64 << 8) - 1,
            1u64 << 8,
            (1u64 << 8) + 1,
            (1u64 << 16) - 1,
            1u64 << 16,
            (1u64 << 16) + 1,
            (1u64 << 32) - 1,
            1u64 << 32,
            (1u64 << 32) + 1,
        ];
        for key in &test_keys {
            for seq in &test_seqs {
                assert_encoded_decoded(key, *seq, ValueType::Value);
                assert_encoded_decoded(key, *seq, ValueType::Deletion);
            }
        }
    }

    #[test]
    fn test_icmp_compare() {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let tests = vec![
            (
                ("", 100, ValueType::Value),
                ("", 100, ValueType::Value),
                Ordering::Equal,
            ),
            // physically less but logically larger
            (
                ("", 90, ValueType::Value),
                ("", 100, ValueType::Value),
                Ordering::Greater,
            ),
            // only compares the seq if the user keys are the same
            (
                ("", 90, ValueType::Value),
                ("", 90, ValueType::Deletion),
                Ordering::Equal,
            ),
            (
                ("a", 90, ValueType::Value),
                ("b", 100, ValueType::Value),
                Ordering::Less,
            ),
        ];
        for (a, b, expected) in tests {
            let ka = InternalKey::new(a.0.as_bytes(), a.1, a.2);
            let kb = InternalKey::new(b.0.as_bytes(), b.1, b.2);
            assert_eq!(expected, icmp.compare(ka.data(), kb.data()));
        }
    }

    #[test]
    fn test_icmp_separator() {
        let tests = vec![
            // user keys are the same
            (
                ("foo", 100, ValueType::Value),
                ("foo", 99, ValueType::Value),
                ("foo", 100, ValueType::Value),
            ),
            (
                ("foo", 100, ValueType::Value),
                ("foo", 101, ValueType::Value),
                ("foo", 100, ValueType::Value),
            ),
            // user keys are disordered
            (
                ("foo", 100, ValueType::Value),
                ("bar", 99, ValueType::Value),
                ("foo", 100, ValueType::Value),
            ),
            // user keys are different but correctly ordered
            (
                ("foo", 100, ValueType::Value),
                ("hello", 200, ValueType::Value),
                ("g", MAX_KEY_SEQUENCE, VALUE_TYPE_FOR_SEEK),
            ),
            // a's user key is a prefix of b's
            (
                ("foo", 100, ValueType::Value),
                ("foobar", 200, ValueType::Value),
                ("foo", 100, ValueType::Value),
            ),
            // b's user key is a prefix of a's
            (
                ("foobar", 100, ValueType::Value),
                ("foo", 200, ValueType::Value),
                ("foobar", 100, ValueType::Value),
            ),
        ];
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        for (a, b, expected) in tests {
            let ka = InternalKey::new(a.0.as_bytes(), a.1, a.2);
            let kb = InternalKey::new(b.0.as_bytes(), b.1, b.2);
            assert_eq!(
                InternalKey::new(expected.0.as_bytes(), expected.1, expected.2).data(),
                icmp.separator(ka.data(), kb.data()).as_slice()
            );
        }
    }

    #[test]
    fn test_icmp_successor() {
        let icmp = InternalKeyComparator::new(BytewiseComparator::default());
        let tests = vec![
            (
                (Vec::from("foo".as_bytes()), 100, ValueType::Value),
                (
                    Vec::from("g".as_bytes()),
                    MAX_KEY_SEQUENCE,
                    VALUE_TYPE_FOR_SEEK,
                ),
            ),
            (
                (vec![255u8, 255u8], 100, ValueType::Value),
                (vec![255u8, 255u8], 100, ValueType::Value),
            ),
        ];
        for (k, expected) in tests {
            assert_eq!(
                icmp.successor(InternalKey::new(&k.0, k.1, k.2).data()),
                InternalKey::new(&expected.0, expected.1, expected.2).data()
            );
        }
    }

    #[test]
    fn test_lookup_key() {
        let lkey = LookupKey::new(b"parrot", 100);
        assert_eq!(lkey.user_key(), b"parrot");
        assert_eq!(
            lkey.internal_key(),
            InternalKey::new(b"parrot", 100, VALUE_TYPE_FOR_SEEK).data()
        );
    }
}
