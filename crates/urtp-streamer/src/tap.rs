//! Buffered file sink for the audio stream.
//!
//! Writing is only fast enough when a large block goes out in one
//! write, so datagram bodies accumulate in a scratch buffer sized at
//! half the ring's worth of audio and are flushed in one go.

use std::fs::File;
use std::io::{self, Write};
use std::path::Path;

use crate::session::RING_SLOTS;

pub struct FileTap {
    file: File,
    buf: Vec<u8>,
    capacity: usize,
}

impl FileTap {
    /// Create (truncating) the file; the scratch buffer holds
    /// `RING_SLOTS / 2` bodies of `body_size` bytes.
    pub fn create(path: &Path, body_size: usize) -> io::Result<Self> {
        let capacity = body_size * (RING_SLOTS / 2);
        Ok(Self {
            file: File::create(path)?,
            buf: Vec::with_capacity(capacity),
            capacity,
        })
    }

    /// Append one datagram body; returns whether a flush happened.
    pub fn push(&mut self, body: &[u8]) -> io::Result<bool> {
        self.buf.extend_from_slice(body);
        if self.buf.len() >= self.capacity {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
            return Ok(true);
        }
        Ok(false)
    }

    /// Flush whatever remains buffered.
    pub fn finish(&mut self) -> io::Result<()> {
        if !self.buf.is_empty() {
            self.file.write_all(&self.buf)?;
            self.buf.clear();
        }
        self.file.flush()
    }
}
