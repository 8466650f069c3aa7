//! Frame decoder.

use super::{decode_frame_size, FRAME_SIZE_LEN};
use crate::checksum::ChainedCrc64;
use crate::config::MIN_SECTOR_SIZE;
use crate::error::{WalError, WalResult};
use crate::record::{Record, RecordKind};
use std::io::{self, BufReader, Read};

/// Reads frames from an ordered chain of segment readers and verifies them
/// against the running checksum chain.
///
/// A zero length field or the physical end of a source moves on to the next
/// source. Once every source is exhausted [`Decoder::decode`] returns
/// `Ok(None)`.
///
/// The final source is the segment currently being appended to, so a frame
/// there that is cut short or fails verification in a way consistent with an
/// interrupted write ends the log cleanly instead of failing; see
/// [`Decoder::torn`].
#[derive(Debug)]
pub struct Decoder<R: Read> {
    readers: Vec<BufReader<R>>,
    current: usize,
    crc: ChainedCrc64,
    last_offset: u64,
    torn: bool,
}

impl<R: Read> Decoder<R> {
    /// Creates a decoder over `readers`, read in order.
    pub fn new(readers: Vec<R>) -> Self {
        Self {
            readers: readers.into_iter().map(BufReader::new).collect(),
            current: 0,
            crc: ChainedCrc64::default(),
            last_offset: 0,
            torn: false,
        }
    }

    /// Decodes the next record.
    ///
    /// Returns `Ok(None)` at the end of the log, including when the tail
    /// ends in a torn write.
    ///
    /// # Errors
    ///
    /// - [`WalError::UnexpectedEndOfLog`] if a frame in a non-final source is
    ///   cut short
    /// - [`WalError::ChecksumMismatch`] if a record or anchor breaks the chain
    /// - [`WalError::InvalidRecord`] if a record body is malformed
    pub fn decode(&mut self) -> WalResult<Option<Record>> {
        loop {
            if self.current >= self.readers.len() {
                return Ok(None);
            }

            let mut field = [0u8; FRAME_SIZE_LEN as usize];
            let n = read_up_to(&mut self.readers[self.current], &mut field)?;
            if n == 0 {
                self.advance_source();
                continue;
            }
            if n < field.len() {
                return self.cut_short();
            }

            let length_field = u64::from_le_bytes(field);
            if length_field == 0 {
                self.advance_source();
                continue;
            }

            let (record_bytes, pad_bytes) = decode_frame_size(length_field);
            let frame_bytes = record_bytes + pad_bytes;
            let mut body = Vec::new();
            (&mut self.readers[self.current])
                .take(frame_bytes)
                .read_to_end(&mut body)?;
            if (body.len() as u64) < frame_bytes {
                return self.cut_short();
            }

            let record = match Record::decode(&body[..record_bytes as usize]) {
                Ok(record) => record,
                Err(err) => {
                    if self.is_torn_frame(&body) {
                        return Ok(self.end_torn());
                    }
                    return Err(err);
                }
            };

            if record.kind == RecordKind::ChecksumAnchor {
                let sum = self.crc.sum();
                if sum != 0 && sum != record.checksum {
                    return Err(WalError::ChecksumMismatch {
                        expected: record.checksum,
                        actual: sum,
                    });
                }
                self.crc = ChainedCrc64::new(record.checksum);
            } else {
                let mut next = self.crc;
                next.write(&record.payload);
                if next.sum() != record.checksum {
                    if self.is_torn_frame(&body) {
                        return Ok(self.end_torn());
                    }
                    return Err(WalError::ChecksumMismatch {
                        expected: record.checksum,
                        actual: next.sum(),
                    });
                }
                self.crc = next;
            }

            self.last_offset += FRAME_SIZE_LEN + frame_bytes;
            return Ok(Some(record));
        }
    }

    /// Returns the checksum chain value after the last verified record.
    #[must_use]
    pub fn last_crc(&self) -> u64 {
        self.crc.sum()
    }

    /// Returns the offset, within the current source, just past the last
    /// verified record.
    #[must_use]
    pub fn last_offset(&self) -> u64 {
        self.last_offset
    }

    /// Returns true if decoding stopped at a torn write on the final source.
    #[must_use]
    pub fn torn(&self) -> bool {
        self.torn
    }

    fn on_last_source(&self) -> bool {
        self.current + 1 == self.readers.len()
    }

    fn advance_source(&mut self) {
        if self.on_last_source() {
            // Keep `last_offset` pointing into the tail.
            self.current = self.readers.len();
            return;
        }
        self.current += 1;
        self.last_offset = 0;
    }

    fn cut_short(&mut self) -> WalResult<Option<Record>> {
        if self.on_last_source() {
            return Ok(self.end_torn());
        }
        Err(WalError::UnexpectedEndOfLog {
            offset: self.last_offset,
        })
    }

    fn end_torn(&mut self) -> Option<Record> {
        self.torn = true;
        self.current = self.readers.len();
        None
    }

    /// Reports whether `frame` (body plus padding) looks like a write that
    /// never fully reached the disk: some sector-aligned chunk of it is all
    /// zeros.
    fn is_torn_frame(&self, frame: &[u8]) -> bool {
        if !self.on_last_source() {
            return false;
        }

        let sector = MIN_SECTOR_SIZE as u64;
        let mut file_offset = self.last_offset + FRAME_SIZE_LEN;
        let mut rest = frame;
        while !rest.is_empty() {
            let chunk_len = ((sector - file_offset % sector) as usize).min(rest.len());
            let (chunk, tail) = rest.split_at(chunk_len);
            if chunk.iter().all(|&b| b == 0) {
                return true;
            }
            file_offset += chunk_len as u64;
            rest = tail;
        }
        false
    }
}

/// Reads until `buf` is full or the reader is exhausted.
fn read_up_to<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => {}
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codec::Encoder;
    use crate::config::WalConfig;
    use crate::record::Entry;
    use std::io::Cursor;

    fn encode_all(prev_crc: u64, records: &mut [Record]) -> (Vec<u8>, u64) {
        let mut enc = Encoder::new(Vec::new(), prev_crc, 0, &WalConfig::default());
        for record in records.iter_mut() {
            enc.encode(record).unwrap();
        }
        enc.flush().unwrap();
        let crc = enc.last_crc();
        (enc.get_ref().clone(), crc)
    }

    fn entries(range: std::ops::Range<u64>) -> Vec<Record> {
        range
            .map(|i| {
                Record::entry(&Entry {
                    index: i,
                    data: format!("Entry{i}").into_bytes(),
                })
            })
            .collect()
    }

    fn drain<R: Read>(dec: &mut Decoder<R>) -> WalResult<Vec<Record>> {
        let mut out = Vec::new();
        while let Some(record) = dec.decode()? {
            out.push(record);
        }
        Ok(out)
    }

    #[test]
    fn decodes_what_was_encoded() {
        let mut records = vec![Record::anchor(0), Record::metadata(b"meta")];
        records.extend(entries(0..5));
        let (bytes, crc) = encode_all(0, &mut records);

        let mut dec = Decoder::new(vec![Cursor::new(bytes.clone())]);
        let decoded = drain(&mut dec).unwrap();
        assert_eq!(decoded, records);
        assert_eq!(dec.last_crc(), crc);
        assert_eq!(dec.last_offset(), bytes.len() as u64);
        assert!(!dec.torn());
    }

    #[test]
    fn zero_length_field_ends_source() {
        let mut records = entries(0..2);
        let (mut bytes, _) = encode_all(0, &mut records);
        let used = bytes.len() as u64;
        bytes.extend_from_slice(&[0u8; 4096]);

        let mut dec = Decoder::new(vec![Cursor::new(bytes)]);
        assert_eq!(drain(&mut dec).unwrap().len(), 2);
        assert_eq!(dec.last_offset(), used);
        assert!(!dec.torn());
    }

    #[test]
    fn chain_continues_across_sources() {
        let mut first = vec![Record::anchor(0), Record::metadata(b"m")];
        first.extend(entries(0..3));
        let (seg1, crc1) = encode_all(0, &mut first);

        let mut second = vec![Record::anchor(crc1), Record::metadata(b"m")];
        second.extend(entries(3..6));
        let (seg2, crc2) = encode_all(crc1, &mut second);

        let mut dec = Decoder::new(vec![Cursor::new(seg1), Cursor::new(seg2.clone())]);
        let decoded = drain(&mut dec).unwrap();
        assert_eq!(decoded.len(), first.len() + second.len());
        assert_eq!(dec.last_crc(), crc2);
        assert_eq!(dec.last_offset(), seg2.len() as u64);
    }

    #[test]
    fn broken_anchor_is_rejected() {
        let mut first = entries(0..1);
        let (seg1, crc1) = encode_all(0, &mut first);
        let mut second = vec![Record::anchor(crc1 ^ 1)];
        let (seg2, _) = encode_all(crc1 ^ 1, &mut second);

        let mut dec = Decoder::new(vec![Cursor::new(seg1), Cursor::new(seg2)]);
        assert!(dec.decode().unwrap().is_some());
        let err = dec.decode().unwrap_err();
        assert!(matches!(err, WalError::ChecksumMismatch { .. }));
    }

    #[test]
    fn flipped_byte_in_sealed_segment_is_corruption() {
        let mut first = entries(0..3);
        let (mut seg1, crc1) = encode_all(0, &mut first);
        let mut second = vec![Record::anchor(crc1)];
        let (seg2, _) = encode_all(crc1, &mut second);

        // Last byte of the first entry's data ("Entry0"); the frame is 32
        // bytes and the body starts after the 8-byte length field.
        seg1[8 + 9 + 8 + 5] ^= 0xFF;

        let mut dec = Decoder::new(vec![Cursor::new(seg1), Cursor::new(seg2)]);
        let err = drain(&mut dec).unwrap_err();
        assert!(matches!(err, WalError::ChecksumMismatch { .. }));
    }

    #[test]
    fn flipped_byte_in_tail_is_not_torn() {
        let mut records = entries(0..3);
        let (mut bytes, _) = encode_all(0, &mut records);
        let last = bytes.len() - 1;
        bytes[last - 4] ^= 0x01;

        let mut dec = Decoder::new(vec![Cursor::new(bytes)]);
        let err = drain(&mut dec).unwrap_err();
        assert!(matches!(err, WalError::ChecksumMismatch { .. }));
        assert!(!dec.torn());
    }

    #[test]
    fn zeroed_tail_frame_is_torn() {
        let mut records = entries(0..3);
        let (mut bytes, _) = encode_all(0, &mut records);
        let frame_len = bytes.len() / 3;
        let start = bytes.len() - frame_len;
        for b in &mut bytes[start + 8..] {
            *b = 0;
        }

        let mut dec = Decoder::new(vec![Cursor::new(bytes)]);
        let decoded = drain(&mut dec).unwrap();
        assert_eq!(decoded.len(), 2);
        assert!(dec.torn());
        assert_eq!(dec.last_offset(), start as u64);

        // The chain reflects only the verified records.
        let mut crc = ChainedCrc64::new(0);
        for record in &records[..2] {
            crc.write(&record.payload);
        }
        assert_eq!(dec.last_crc(), crc.sum());
    }

    #[test]
    fn truncated_tail_is_torn() {
        let mut records = entries(0..2);
        let (bytes, _) = encode_all(0, &mut records);
        let cut = bytes.len() - 5;

        let mut dec = Decoder::new(vec![Cursor::new(bytes[..cut].to_vec())]);
        assert_eq!(drain(&mut dec).unwrap().len(), 1);
        assert!(dec.torn());
    }

    #[test]
    fn truncated_sealed_segment_is_error() {
        let mut records = entries(0..2);
        let (bytes, _) = encode_all(0, &mut records);
        let cut = bytes.len() - 5;

        let mut dec = Decoder::new(vec![
            Cursor::new(bytes[..cut].to_vec()),
            Cursor::new(Vec::new()),
        ]);
        assert!(dec.decode().unwrap().is_some());
        let err = dec.decode().unwrap_err();
        assert!(matches!(err, WalError::UnexpectedEndOfLog { .. }));
    }

    #[test]
    fn partial_length_field_on_tail_is_torn() {
        let mut records = entries(0..1);
        let (mut bytes, _) = encode_all(0, &mut records);
        bytes.extend_from_slice(&[1, 2, 3]);

        let mut dec = Decoder::new(vec![Cursor::new(bytes)]);
        assert_eq!(drain(&mut dec).unwrap().len(), 1);
        assert!(dec.torn());
    }

    #[test]
    fn empty_sources_end_log() {
        let mut dec: Decoder<Cursor<Vec<u8>>> = Decoder::new(Vec::new());
        assert!(dec.decode().unwrap().is_none());

        let mut dec = Decoder::new(vec![
            Cursor::new(Vec::new()),
            Cursor::new(vec![0u8; 64]),
        ]);
        assert!(dec.decode().unwrap().is_none());
        assert_eq!(dec.last_offset(), 0);
        assert!(!dec.torn());
    }
}
