//! Page-aligned buffered writer.

use std::io::{self, Write};

/// Buffers writes and flushes them to the underlying writer on page
/// boundaries.
///
/// Bytes accumulate until a write would cross the watermark. At that point
/// the current partial page is completed from the incoming bytes, the buffer
/// is written out, whole pages go straight to the inner writer, and the
/// remainder is buffered. Nothing reaches the inner writer between those
/// points unless [`Write::flush`] is called.
#[derive(Debug)]
pub struct PageWriter<W: Write> {
    inner: W,
    /// Position within the current page where the buffer starts.
    page_offset: usize,
    page_bytes: usize,
    watermark: usize,
    buf: Vec<u8>,
}

impl<W: Write> PageWriter<W> {
    /// Creates a page writer whose first byte lands at `page_offset` bytes
    /// into the file.
    pub fn new(inner: W, page_bytes: usize, watermark: usize, page_offset: u64) -> Self {
        let page_bytes = page_bytes.max(1);
        Self {
            inner,
            page_offset: (page_offset % page_bytes as u64) as usize,
            page_bytes,
            watermark,
            buf: Vec::with_capacity(watermark + page_bytes),
        }
    }

    /// Returns the number of bytes waiting in the buffer.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buf.len()
    }

    /// Returns a reference to the inner writer.
    pub fn get_ref(&self) -> &W {
        &self.inner
    }

    fn flush_buffer(&mut self) -> io::Result<()> {
        if self.buf.is_empty() {
            return Ok(());
        }
        self.inner.write_all(&self.buf)?;
        self.page_offset = (self.page_offset + self.buf.len()) % self.page_bytes;
        self.buf.clear();
        Ok(())
    }
}

impl<W: Write> Write for PageWriter<W> {
    fn write(&mut self, mut data: &[u8]) -> io::Result<usize> {
        let total = data.len();
        if self.buf.len() + data.len() <= self.watermark {
            self.buf.extend_from_slice(data);
            return Ok(total);
        }

        // Complete the partial page so the flushed buffer ends aligned.
        let used = (self.page_offset + self.buf.len()) % self.page_bytes;
        if used != 0 {
            let slack = self.page_bytes - used;
            if slack > data.len() {
                self.buf.extend_from_slice(data);
                return Ok(total);
            }
            self.buf.extend_from_slice(&data[..slack]);
            data = &data[slack..];
        }
        self.flush_buffer()?;

        if data.len() > self.page_bytes {
            let whole = data.len() / self.page_bytes * self.page_bytes;
            self.inner.write_all(&data[..whole])?;
            data = &data[whole..];
        }
        self.buf.extend_from_slice(data);
        Ok(total)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.flush_buffer()?;
        self.inner.flush()
    }
}
