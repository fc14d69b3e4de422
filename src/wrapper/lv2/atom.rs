//! Readers for the parts of the LV2 atom format the wrapper consumes: event sequences, objects, and
//! numeric atoms. Everything works on byte slices so the host's buffers only need to be turned into
//! a slice once.

use std::mem::size_of;

use super::sys::{LV2_Atom, LV2_Atom_Sequence};

/// Atom bodies are padded to a multiple of 64 bits.
fn pad_size(size: usize) -> usize {
    (size + 7) & !7
}

fn read_u32(bytes: &[u8], offset: usize) -> Option<u32> {
    let bytes = bytes.get(offset..offset + 4)?;
    Some(u32::from_ne_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]))
}

fn read_u64(bytes: &[u8], offset: usize) -> Option<u64> {
    let bytes = bytes.get(offset..offset + 8)?;
    let mut buf = [0; 8];
    buf.copy_from_slice(bytes);
    Some(u64::from_ne_bytes(buf))
}

/// A single atom: its type URID and its body.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Atom<'a> {
    pub type_: u32,
    pub body: &'a [u8],
}

/// The URIDs needed to interpret numeric atoms.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NumberTypes {
    pub int: u32,
    pub long: u32,
    pub float: u32,
    pub double: u32,
}

impl Atom<'_> {
    /// The atom's value as a double, if it is one of the four numeric atom types.
    pub fn number(&self, types: &NumberTypes) -> Option<f64> {
        if self.type_ == types.int {
            read_u32(self.body, 0).map(|value| value as i32 as f64)
        } else if self.type_ == types.long {
            read_u64(self.body, 0).map(|value| value as i64 as f64)
        } else if self.type_ == types.float {
            read_u32(self.body, 0).map(|value| f32::from_bits(value) as f64)
        } else if self.type_ == types.double {
            read_u64(self.body, 0).map(f64::from_bits)
        } else {
            None
        }
    }
}

/// The body of an `atom:Sequence`, as a byte slice starting at the sequence's `unit` field.
///
/// # Safety
///
/// `sequence` must point to a valid sequence atom whose `size` covers the entire body.
pub unsafe fn sequence_body<'a>(sequence: *const LV2_Atom_Sequence) -> &'a [u8] {
    let size = (*sequence).atom.size as usize;
    let body = (sequence as *const u8).add(size_of::<LV2_Atom>());

    std::slice::from_raw_parts(body, size)
}

/// Iterate over a sequence's events as `(frames, atom)` pairs. `body` is the sequence's body,
/// including the `unit` and `pad` fields. Timestamps are always interpreted as frames.
pub fn sequence_events(body: &[u8]) -> SequenceEvents<'_> {
    let offset = body.len().min(8);

    SequenceEvents { body, offset }
}

pub struct SequenceEvents<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for SequenceEvents<'a> {
    type Item = (i64, Atom<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        // Every event consists of a 64-bit timestamp followed by an atom header and its body
        let frames = read_u64(self.body, self.offset)? as i64;
        let size = read_u32(self.body, self.offset + 8)? as usize;
        let type_ = read_u32(self.body, self.offset + 12)?;

        let body_start = self.offset + 16;
        let body = self.body.get(body_start..body_start + size)?;
        self.offset = body_start + pad_size(size);

        Some((frames, Atom { type_, body }))
    }
}

/// Iterate over an object's properties as `(key, value)` pairs. Returns the object's type URID
/// along with the iterator, or `None` if the body is too small to be an object.
pub fn object_properties(body: &[u8]) -> Option<(u32, ObjectProperties<'_>)> {
    let otype = read_u32(body, 4)?;

    Some((otype, ObjectProperties { body, offset: 8 }))
}

pub struct ObjectProperties<'a> {
    body: &'a [u8],
    offset: usize,
}

impl<'a> Iterator for ObjectProperties<'a> {
    type Item = (u32, Atom<'a>);

    fn next(&mut self) -> Option<Self::Item> {
        // The key, a context we don't use, and then the value's atom header and body
        let key = read_u32(self.body, self.offset)?;
        let size = read_u32(self.body, self.offset + 8)? as usize;
        let type_ = read_u32(self.body, self.offset + 12)?;

        let body_start = self.offset + 16;
        let body = self.body.get(body_start..body_start + size)?;
        self.offset = body_start + pad_size(size);

        Some((key, Atom { type_, body }))
    }
}
