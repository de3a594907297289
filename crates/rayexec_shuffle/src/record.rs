//! Row-oriented record layout: fixed-size slots plus a nullity bitmap,
//! with variable-length fields stored out-of-line as [`VarlenHandle`]s.
//!
//! This plays the role of the original engine's externally-supplied record
//! metadata subsystem. That subsystem is out of scope for this crate, which
//! treats record layout as a prerequisite, so this module is a minimal
//! stand-in just complete enough to build, store, and compare records in
//! tests and worked examples.

use crate::page_pool::RecordPointer;
use crate::varlen::{VarlenArena, VarlenHandle};

/// Scalar types a record field can hold.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FieldType {
    Int64,
    Float64,
    Utf8,
    /// A `RecordPointer` stored inline. Used only for the trailing
    /// back-pointer field of an aggregate key record.
    Pointer,
}

impl FieldType {
    fn size(self) -> usize {
        match self {
            FieldType::Int64 | FieldType::Float64 => 8,
            FieldType::Utf8 => std::mem::size_of::<VarlenHandle>(),
            FieldType::Pointer => 8,
        }
    }

    fn align(self) -> usize {
        match self {
            FieldType::Int64 | FieldType::Float64 | FieldType::Pointer => 8,
            FieldType::Utf8 => 4,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct FieldLayout {
    pub ty: FieldType,
    pub offset: usize,
    pub null_bit: usize,
}

/// Layout of a fixed-size record: a nullity bitmap followed by field slots.
#[derive(Debug, Clone)]
pub struct RecordMetadata {
    pub fields: Vec<FieldLayout>,
    pub nullity_bytes: usize,
    pub fixed_size: usize,
}

const RECORD_ALIGN: usize = 8;

fn align_up(n: usize, align: usize) -> usize {
    (n + align - 1) & !(align - 1)
}

impl RecordMetadata {
    pub fn new(field_types: &[FieldType]) -> Self {
        let nullity_bytes = field_types.len().div_ceil(8).max(if field_types.is_empty() {
            0
        } else {
            1
        });
        let mut cursor = nullity_bytes;
        let mut fields = Vec::with_capacity(field_types.len());
        for (i, ty) in field_types.iter().enumerate() {
            cursor = align_up(cursor, ty.align());
            fields.push(FieldLayout {
                ty: *ty,
                offset: cursor,
                null_bit: i,
            });
            cursor += ty.size();
        }
        let fixed_size = align_up(cursor, RECORD_ALIGN);
        RecordMetadata {
            fields,
            nullity_bytes,
            fixed_size,
        }
    }

    pub fn num_fields(&self) -> usize {
        self.fields.len()
    }
}

/// A record under construction: a zeroed fixed-size buffer plus any pending
/// variable-length payloads, not yet copied into an arena.
pub struct RecordBuilder<'m> {
    meta: &'m RecordMetadata,
    buf: Vec<u8>,
    varlen_payloads: Vec<Option<Vec<u8>>>,
}

impl<'m> RecordBuilder<'m> {
    pub fn new(meta: &'m RecordMetadata) -> Self {
        RecordBuilder {
            meta,
            buf: vec![0u8; meta.fixed_size],
            varlen_payloads: vec![None; meta.fields.len()],
        }
    }

    fn set_null_bit(&mut self, field: &FieldLayout, is_null: bool) {
        let byte = field.null_bit / 8;
        let bit = field.null_bit % 8;
        if is_null {
            self.buf[byte] |= 1 << bit;
        } else {
            self.buf[byte] &= !(1 << bit);
        }
    }

    pub fn set_null(&mut self, idx: usize) {
        let field = self.meta.fields[idx];
        self.set_null_bit(&field, true);
    }

    pub fn set_i64(&mut self, idx: usize, v: i64) {
        let field = self.meta.fields[idx];
        debug_assert_eq!(field.ty, FieldType::Int64);
        self.set_null_bit(&field, false);
        self.buf[field.offset..field.offset + 8].copy_from_slice(&v.to_le_bytes());
    }

    pub fn set_f64(&mut self, idx: usize, v: f64) {
        let field = self.meta.fields[idx];
        debug_assert_eq!(field.ty, FieldType::Float64);
        self.set_null_bit(&field, false);
        self.buf[field.offset..field.offset + 8].copy_from_slice(&v.to_bits().to_le_bytes());
    }

    pub fn set_str(&mut self, idx: usize, v: &str) {
        let field = self.meta.fields[idx];
        debug_assert_eq!(field.ty, FieldType::Utf8);
        self.set_null_bit(&field, false);
        self.varlen_payloads[idx] = Some(v.as_bytes().to_vec());
    }

    pub fn set_pointer(&mut self, idx: usize, ptr: RecordPointer) {
        let field = self.meta.fields[idx];
        debug_assert_eq!(field.ty, FieldType::Pointer);
        self.set_null_bit(&field, false);
        self.buf[field.offset..field.offset + 4].copy_from_slice(&ptr.page_idx.to_le_bytes());
        self.buf[field.offset + 4..field.offset + 8].copy_from_slice(&ptr.offset.to_le_bytes());
    }

    pub fn finish(self) -> OwnedRecord {
        OwnedRecord {
            fixed: self.buf,
            varlen_payloads: self.varlen_payloads,
        }
    }
}

/// A fully-built record not yet resident in an arena.
pub struct OwnedRecord {
    pub fixed: Vec<u8>,
    pub varlen_payloads: Vec<Option<Vec<u8>>>,
}

impl OwnedRecord {
    /// Resolve every varlen field against `arena`, writing the resulting
    /// handle into the fixed bytes, and return the bytes ready for
    /// [`crate::arena_store::ArenaRecordStore::append`].
    pub fn materialize(mut self, meta: &RecordMetadata, arena: &mut VarlenArena) -> Vec<u8> {
        for (idx, field) in meta.fields.iter().enumerate() {
            if field.ty != FieldType::Utf8 {
                continue;
            }
            if let Some(payload) = self.varlen_payloads[idx].take() {
                let handle = arena.alloc(&payload);
                let bytes = unsafe {
                    std::slice::from_raw_parts(
                        &handle as *const VarlenHandle as *const u8,
                        std::mem::size_of::<VarlenHandle>(),
                    )
                };
                self.fixed[field.offset..field.offset + bytes.len()].copy_from_slice(bytes);
            }
        }
        self.fixed
    }
}

/// Deep-copy a record's fixed bytes from one varlen arena into another,
/// re-resolving every varlen field against `dst_arena`. Used when a record
/// crosses from the arena it arrived in (e.g. a writer's scratch buffer)
/// into a partition's own storage.
pub fn copy_record(
    meta: &RecordMetadata,
    bytes: &[u8],
    src_arena: &VarlenArena,
    dst_arena: &mut VarlenArena,
) -> Vec<u8> {
    let mut out = bytes.to_vec();
    let view = RecordView::new(meta, bytes);
    for (idx, field) in meta.fields.iter().enumerate() {
        if field.ty != FieldType::Utf8 || view.is_null(idx) {
            continue;
        }
        let s = view.get_str(idx, src_arena).unwrap();
        let handle = dst_arena.alloc(s.as_bytes());
        let handle_bytes = unsafe {
            std::slice::from_raw_parts(
                &handle as *const VarlenHandle as *const u8,
                std::mem::size_of::<VarlenHandle>(),
            )
        };
        out[field.offset..field.offset + handle_bytes.len()].copy_from_slice(handle_bytes);
    }
    out
}

/// A read-only view over a record's fixed bytes, resolving varlen fields
/// lazily against the arena that holds them.
pub struct RecordView<'a> {
    meta: &'a RecordMetadata,
    bytes: &'a [u8],
}

impl<'a> RecordView<'a> {
    pub fn new(meta: &'a RecordMetadata, bytes: &'a [u8]) -> Self {
        debug_assert_eq!(bytes.len(), meta.fixed_size);
        RecordView { meta, bytes }
    }

    pub fn is_null(&self, idx: usize) -> bool {
        let field = self.meta.fields[idx];
        let byte = field.null_bit / 8;
        let bit = field.null_bit % 8;
        self.bytes[byte] & (1 << bit) != 0
    }

    pub fn get_i64(&self, idx: usize) -> Option<i64> {
        if self.is_null(idx) {
            return None;
        }
        let field = self.meta.fields[idx];
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.bytes[field.offset..field.offset + 8]);
        Some(i64::from_le_bytes(b))
    }

    pub fn get_f64(&self, idx: usize) -> Option<f64> {
        if self.is_null(idx) {
            return None;
        }
        let field = self.meta.fields[idx];
        let mut b = [0u8; 8];
        b.copy_from_slice(&self.bytes[field.offset..field.offset + 8]);
        Some(f64::from_bits(u64::from_le_bytes(b)))
    }

    pub fn get_str(&self, idx: usize, arena: &'a VarlenArena) -> Option<&'a str> {
        if self.is_null(idx) {
            return None;
        }
        let field = self.meta.fields[idx];
        let handle_bytes = &self.bytes[field.offset..field.offset + std::mem::size_of::<VarlenHandle>()];
        let mut handle = VarlenHandle::default();
        unsafe {
            std::ptr::copy_nonoverlapping(
                handle_bytes.as_ptr(),
                &mut handle as *mut VarlenHandle as *mut u8,
                handle_bytes.len(),
            );
        }
        Some(std::str::from_utf8(arena.get(handle)).expect("varlen payload is valid utf8"))
    }

    pub fn get_pointer(&self, idx: usize) -> RecordPointer {
        let field = self.meta.fields[idx];
        let mut page_idx = [0u8; 4];
        let mut offset = [0u8; 4];
        page_idx.copy_from_slice(&self.bytes[field.offset..field.offset + 4]);
        offset.copy_from_slice(&self.bytes[field.offset + 4..field.offset + 8]);
        RecordPointer::new(u32::from_le_bytes(page_idx), u32::from_le_bytes(offset))
    }
}
