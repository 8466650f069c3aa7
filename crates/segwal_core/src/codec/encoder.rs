//! Frame encoder.

use super::{encode_frame_size, PageWriter, MAX_RECORD_BYTES};
use crate::checksum::ChainedCrc64;
use crate::config::WalConfig;
use crate::error::{WalError, WalResult};
use crate::record::{Record, RecordKind};
use std::io::Write;

/// Serializes records into frames and writes them through a [`PageWriter`].
///
/// The encoder owns the running checksum chain for the segment it writes.
/// Entry and metadata records are fed into the chain and stamped with the
/// resulting value; anchors are written as-is.
#[derive(Debug)]
pub struct Encoder<W: Write> {
    writer: PageWriter<W>,
    crc: ChainedCrc64,
    /// File offset of the next frame, counting buffered bytes.
    offset: u64,
    scratch: Vec<u8>,
}

impl<W: Write> Encoder<W> {
    /// Creates an encoder that continues the chain from `prev_crc` and whose
    /// first frame lands at `offset` in the file.
    pub fn new(writer: W, prev_crc: u64, offset: u64, config: &WalConfig) -> Self {
        Self {
            writer: PageWriter::new(
                writer,
                config.page_bytes,
                config.buffer_watermark_bytes,
                offset,
            ),
            crc: ChainedCrc64::new(prev_crc),
            offset,
            scratch: Vec::new(),
        }
    }

    /// Encodes one record and appends its frame to the buffer.
    ///
    /// Sets `record.checksum` for entry and metadata records.
    ///
    /// # Errors
    ///
    /// Returns [`WalError::InvalidRecord`] if the record body does not fit the
    /// 56-bit length field, or an I/O error from the page writer. Bytes
    /// already handed to the page writer are not rolled back.
    pub fn encode(&mut self, record: &mut Record) -> WalResult<()> {
        let mut next = self.crc;
        if record.kind != RecordKind::ChecksumAnchor {
            next.write(&record.payload);
            record.checksum = next.sum();
        }

        self.scratch.clear();
        record.encode_into(&mut self.scratch);
        let record_bytes = self.scratch.len() as u64;
        if record_bytes >= MAX_RECORD_BYTES {
            return Err(WalError::invalid_record(format!(
                "record body of {record_bytes} bytes exceeds the frame limit"
            )));
        }

        self.crc = next;

        let (length_field, pad_bytes) = encode_frame_size(record_bytes);
        self.scratch.resize(self.scratch.len() + pad_bytes as usize, 0);

        self.writer.write_all(&length_field.to_le_bytes())?;
        self.writer.write_all(&self.scratch)?;
        self.offset += 8 + record_bytes + pad_bytes;
        Ok(())
    }

    /// Writes all buffered frames to the underlying writer.
    pub fn flush(&mut self) -> WalResult<()> {
        self.writer.flush()?;
        Ok(())
    }

    /// Returns the file offset just past the last encoded frame.
    #[must_use]
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Returns the current value of the checksum chain.
    #[must_use]
    pub fn last_crc(&self) -> u64 {
        self.crc.sum()
    }

    /// Returns a reference to the underlying writer.
    pub fn get_ref(&self) -> &W {
        self.writer.get_ref()
    }
}
