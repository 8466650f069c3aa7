//! Frame codec.
//!
//! ## Frame Format
//!
//! ```text
//! | length field (8, LE) | record body (N) | zero padding (0-7) |
//! ```
//!
//! The low 56 bits of the length field hold the record body length. When the
//! body is not a multiple of 8 bytes, bit 63 is set and bits 56-58 hold the
//! padding length, so every frame starts on an 8-byte boundary. A length
//! field of zero marks the unwritten, pre-allocated end of a segment.

mod decoder;
mod encoder;
mod page_writer;

pub use decoder::Decoder;
pub use encoder::Encoder;
pub use page_writer::PageWriter;

/// Size of the frame length field.
pub const FRAME_SIZE_LEN: u64 = 8;

/// Exclusive upper bound on a record body length.
pub const MAX_RECORD_BYTES: u64 = 1 << 56;

const PAD_MARKER: u64 = 0x80;
const LENGTH_MASK: u64 = MAX_RECORD_BYTES - 1;

/// Computes the length field and padding for a record body of `record_bytes`.
///
/// Returns `(length_field, pad_bytes)`.
#[must_use]
pub const fn encode_frame_size(record_bytes: u64) -> (u64, u64) {
    let mut length_field = record_bytes;
    let pad_bytes = (8 - (record_bytes % 8)) % 8;
    if pad_bytes != 0 {
        length_field |= (PAD_MARKER | pad_bytes) << 56;
    }
    (length_field, pad_bytes)
}

/// Splits a length field into `(record_bytes, pad_bytes)`.
#[must_use]
pub const fn decode_frame_size(length_field: u64) -> (u64, u64) {
    let record_bytes = length_field & LENGTH_MASK;
    let pad_bytes = if length_field >> 63 == 1 {
        (length_field >> 56) & 0x7
    } else {
        0
    };
    (record_bytes, pad_bytes)
}
