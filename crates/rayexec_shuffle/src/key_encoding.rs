//! Key extraction, order-preserving encoding, and hashing.
//!
//! A "key" is the subset of a record's fields used for grouping/sorting,
//! optionally followed by a back-pointer field that never participates in
//! comparisons or hashing. Keys are materialized as ordinary records
//! (via [`RecordBuilder`]) so storage and arena handling are uniform, but
//! comparison doesn't walk field-by-field at compare time: each key is
//! encoded once, up front, into a byte string whose plain lexicographic
//! order matches the logical sort order. That keeps every comparator in
//! this crate a `[u8]` comparison instead of a per-type dispatch.

use std::hash::Hasher;

use crate::page_pool::RecordPointer;
use crate::record::{FieldLayout, FieldType, RecordBuilder, RecordMetadata, RecordView};
use crate::varlen::VarlenArena;

#[derive(Debug, Clone, Copy)]
pub struct SortSpec {
    pub descending: bool,
    pub nulls_first: bool,
}

impl SortSpec {
    pub fn asc() -> Self {
        SortSpec {
            descending: false,
            nulls_first: true,
        }
    }
}

/// Layout and comparison rules for a record's key.
pub struct KeyMetadata {
    pub source_indices: Vec<usize>,
    pub sort: Vec<SortSpec>,
    pub key_meta: RecordMetadata,
    pub has_back_pointer: bool,
}

impl KeyMetadata {
    pub fn new(
        source_types: &[FieldType],
        source_indices: Vec<usize>,
        sort: Vec<SortSpec>,
        has_back_pointer: bool,
    ) -> Self {
        assert_eq!(source_indices.len(), sort.len());
        let mut types: Vec<FieldType> = source_indices.iter().map(|&i| source_types[i]).collect();
        if has_back_pointer {
            types.push(FieldType::Pointer);
        }
        KeyMetadata {
            source_indices,
            sort,
            key_meta: RecordMetadata::new(&types),
            has_back_pointer,
        }
    }

    /// Index of the trailing back-pointer field, if present.
    pub fn back_pointer_field(&self) -> Option<usize> {
        self.has_back_pointer
            .then(|| self.key_meta.fields.len() - 1)
    }

    /// Number of fields that actually participate in ordering (excludes the
    /// back-pointer field).
    fn num_sort_fields(&self) -> usize {
        self.source_indices.len()
    }
}

/// Project the key fields out of a source record into a fresh builder.
/// The back-pointer field, if any, is left unset; callers fill it in once
/// the corresponding value record's address is known.
pub fn extract_key<'m>(
    key_meta: &'m KeyMetadata,
    src_view: &RecordView,
    src_arena: &VarlenArena,
) -> RecordBuilder<'m> {
    let mut builder = RecordBuilder::new(&key_meta.key_meta);
    for (dst_idx, &src_idx) in key_meta.source_indices.iter().enumerate() {
        let field_ty = key_meta.key_meta.fields[dst_idx].ty;
        match field_ty {
            FieldType::Int64 => match src_view.get_i64(src_idx) {
                Some(v) => builder.set_i64(dst_idx, v),
                None => builder.set_null(dst_idx),
            },
            FieldType::Float64 => match src_view.get_f64(src_idx) {
                Some(v) => builder.set_f64(dst_idx, v),
                None => builder.set_null(dst_idx),
            },
            FieldType::Utf8 => match src_view.get_str(src_idx, src_arena) {
                Some(v) => builder.set_str(dst_idx, v),
                None => builder.set_null(dst_idx),
            },
            FieldType::Pointer => unreachable!("source fields are never pointers"),
        }
    }
    builder
}

pub fn set_back_pointer(key_meta: &KeyMetadata, bytes: &mut [u8], ptr: RecordPointer) {
    let field = key_meta
        .key_meta
        .fields
        .last()
        .expect("has_back_pointer implies at least one field");
    bytes[field.offset..field.offset + 4].copy_from_slice(&ptr.page_idx.to_le_bytes());
    bytes[field.offset + 4..field.offset + 8].copy_from_slice(&ptr.offset.to_le_bytes());
}

fn normalize_f64(v: f64, normalize: bool) -> f64 {
    if !normalize {
        return v;
    }
    if v.is_nan() {
        f64::NAN
    } else if v == 0.0 {
        0.0
    } else {
        v
    }
}

/// Order-preserving encoding of a signed 64-bit integer: flip the sign bit
/// so unsigned big-endian comparison matches signed numeric order.
fn encode_i64(v: i64) -> [u8; 8] {
    ((v as u64) ^ (1u64 << 63)).to_be_bytes()
}

/// Order-preserving encoding of an IEEE-754 double (Java/RocksDB style):
/// for non-negative values, flip the sign bit; for negative values, flip
/// every bit. Either way bigger values sort bigger under big-endian byte
/// comparison.
fn encode_f64(v: f64) -> [u8; 8] {
    let bits = v.to_bits();
    let flipped = if bits & (1 << 63) != 0 {
        !bits
    } else {
        bits | (1 << 63)
    };
    flipped.to_be_bytes()
}

/// Memcomparable encoding of a UTF-8 string: escape `0x00` bytes as
/// `0x00 0xFF` and terminate with `0x00 0x00`, so concatenating
/// variable-length fields in a multi-field key stays unambiguous and
/// prefix-comparisons still fall out correctly (shorter strings sort
/// before longer ones that extend them).
fn encode_str_into(bytes: &[u8], out: &mut Vec<u8>) {
    for &b in bytes {
        if b == 0x00 {
            out.push(0x00);
            out.push(0xFF);
        } else {
            out.push(b);
        }
    }
    out.push(0x00);
    out.push(0x00);
}

fn encode_field(
    field: &FieldLayout,
    view: &RecordView,
    idx: usize,
    arena: &VarlenArena,
    sort: SortSpec,
    normalize_float: bool,
    out: &mut Vec<u8>,
) {
    let start = out.len();
    let is_null = view.is_null(idx);

    let null_marker = if sort.nulls_first {
        if is_null {
            0x00
        } else {
            0x01
        }
    } else if is_null {
        0x01
    } else {
        0x00
    };
    out.push(null_marker);

    if !is_null {
        match field.ty {
            FieldType::Int64 => {
                out.extend_from_slice(&encode_i64(view.get_i64(idx).unwrap()));
            }
            FieldType::Float64 => {
                let v = normalize_f64(view.get_f64(idx).unwrap(), normalize_float);
                out.extend_from_slice(&encode_f64(v));
            }
            FieldType::Utf8 => {
                encode_str_into(view.get_str(idx, arena).unwrap().as_bytes(), out);
            }
            FieldType::Pointer => unreachable!("pointer fields never participate in ordering"),
        }
    }

    if sort.descending {
        for b in &mut out[start..] {
            *b = !*b;
        }
    }
}

/// Encode the ordering-relevant fields of a materialized key record into a
/// byte string whose plain lexicographic order is the logical sort order.
pub fn encode_comparable(
    key_meta: &KeyMetadata,
    key_bytes: &[u8],
    key_arena: &VarlenArena,
    normalize_float: bool,
) -> Vec<u8> {
    let view = RecordView::new(&key_meta.key_meta, key_bytes);
    let mut out = Vec::with_capacity(key_meta.key_meta.fixed_size);
    for (idx, field) in key_meta
        .key_meta
        .fields
        .iter()
        .enumerate()
        .take(key_meta.num_sort_fields())
    {
        encode_field(
            field,
            &view,
            idx,
            key_arena,
            key_meta.sort[idx],
            normalize_float,
            &mut out,
        );
    }
    out
}

/// Hash a record's key fields directly (not via the comparable encoding,
/// since hashing doesn't need an order, just consistency), for use by both the
/// partitioner and the pre-aggregation hash table. Float normalization is
/// applied for the same reason it's applied in the comparable encoding: two
/// keys considered equal by the comparator must hash equal.
pub fn hash_key(
    key_meta: &KeyMetadata,
    key_bytes: &[u8],
    key_arena: &VarlenArena,
    normalize_float: bool,
) -> u64 {
    let view = RecordView::new(&key_meta.key_meta, key_bytes);
    let mut hasher = ahash::AHasher::default();
    for (idx, field) in key_meta
        .key_meta
        .fields
        .iter()
        .enumerate()
        .take(key_meta.num_sort_fields())
    {
        if view.is_null(idx) {
            hasher.write_u8(0);
            continue;
        }
        hasher.write_u8(1);
        match field.ty {
            FieldType::Int64 => hasher.write_i64(view.get_i64(idx).unwrap()),
            FieldType::Float64 => {
                let v = normalize_f64(view.get_f64(idx).unwrap(), normalize_float);
                hasher.write_u64(v.to_bits());
            }
            FieldType::Utf8 => hasher.write(view.get_str(idx, key_arena).unwrap().as_bytes()),
            FieldType::Pointer => unreachable!(),
        }
    }
    hasher.finish()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::page_pool::PagePool;
    use crate::record::RecordBuilder as RB;

    fn make_key_meta(sort: SortSpec, has_bp: bool) -> KeyMetadata {
        KeyMetadata::new(&[FieldType::Float64], vec![0], vec![sort], has_bp)
    }

    fn encode_single_f64(v: f64, sort: SortSpec, normalize: bool) -> Vec<u8> {
        let km = make_key_meta(sort, false);
        let pool = PagePool::new(4096);
        let mut arena = VarlenArena::new(pool);
        let mut b = RB::new(&km.key_meta);
        b.set_f64(0, v);
        let bytes = b.finish().materialize(&km.key_meta, &mut arena);
        encode_comparable(&km, &bytes, &arena, normalize)
    }

    #[test]
    fn nan_values_normalize_equal() {
        let a = encode_single_f64(f64::NAN, SortSpec::asc(), true);
        let b = encode_single_f64(-f64::NAN, SortSpec::asc(), true);
        assert_eq!(a, b);
    }

    #[test]
    fn negative_zero_normalizes_to_positive() {
        let a = encode_single_f64(0.0, SortSpec::asc(), true);
        let b = encode_single_f64(-0.0, SortSpec::asc(), true);
        assert_eq!(a, b);
    }

    #[test]
    fn float_order_preserved_across_sign() {
        let neg = encode_single_f64(-5.0, SortSpec::asc(), true);
        let zero = encode_single_f64(0.0, SortSpec::asc(), true);
        let pos = encode_single_f64(5.0, SortSpec::asc(), true);
        assert!(neg < zero);
        assert!(zero < pos);
    }

    #[test]
    fn descending_flips_order() {
        let asc_small = encode_single_f64(1.0, SortSpec::asc(), true);
        let asc_big = encode_single_f64(2.0, SortSpec::asc(), true);
        assert!(asc_small < asc_big);

        let desc = SortSpec {
            descending: true,
            nulls_first: true,
        };
        let desc_small = encode_single_f64(1.0, desc, true);
        let desc_big = encode_single_f64(2.0, desc, true);
        assert!(desc_big < desc_small);
    }

    #[test]
    fn nulls_first_sorts_before_values() {
        let km = make_key_meta(SortSpec::asc(), false);
        let pool = PagePool::new(4096);
        let mut arena = VarlenArena::new(pool);
        let mut b = RB::new(&km.key_meta);
        b.set_null(0);
        let null_bytes = b.finish().materialize(&km.key_meta, &mut arena);
        let null_encoded = encode_comparable(&km, &null_bytes, &arena, true);
        let value_encoded = encode_single_f64(-1000.0, SortSpec::asc(), true);
        assert!(null_encoded < value_encoded);
    }

    #[test]
    fn back_pointer_excluded_from_comparable_bytes() {
        let km = make_key_meta(SortSpec::asc(), true);
        let pool = PagePool::new(4096);
        let mut arena = VarlenArena::new(pool);
        let mut b = RB::new(&km.key_meta);
        b.set_f64(0, 1.0);
        let mut bytes = b.finish().materialize(&km.key_meta, &mut arena);
        let before = encode_comparable(&km, &bytes, &arena, true);
        set_back_pointer(&km, &mut bytes, RecordPointer::new(7, 42));
        let after = encode_comparable(&km, &bytes, &arena, true);
        assert_eq!(before, after);
    }

    #[test]
    fn equal_keys_hash_equal_with_normalization() {
        let km = make_key_meta(SortSpec::asc(), false);
        let pool = PagePool::new(4096);
        let mut arena = VarlenArena::new(pool);

        let mut b1 = RB::new(&km.key_meta);
        b1.set_f64(0, 0.0);
        let bytes1 = b1.finish().materialize(&km.key_meta, &mut arena);

        let mut b2 = RB::new(&km.key_meta);
        b2.set_f64(0, -0.0);
        let bytes2 = b2.finish().materialize(&km.key_meta, &mut arena);

        assert_eq!(
            hash_key(&km, &bytes1, &arena, true),
            hash_key(&km, &bytes2, &arena, true)
        );
    }
}
