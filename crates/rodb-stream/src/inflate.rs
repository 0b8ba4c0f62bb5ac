use std::io::{self, Read};

use flate2::read::DeflateDecoder;

use crate::StreamError;

/// Second header bytes valid for a 32 KiB-window zlib stream without a
/// preset dictionary, one per compression level group.
const ZLIB_FLAGS: [u8; 4] = [0x01, 0x5e, 0x9c, 0xda];

/// Decompresses a zlib-wrapped deflate stream.
///
/// The 2-byte zlib header is validated up front (first byte `0x78`, second
/// byte one of the four no-dictionary flag values); the body is then
/// streamed as raw deflate. The trailing Adler-32 checksum is never read or
/// verified; object payloads are usually range-limited and would not reach
/// it anyway.
#[derive(Debug)]
pub struct InflateStream<R> {
    decoder: DeflateDecoder<R>,
}

impl<R: Read> InflateStream<R> {
    pub fn new(mut inner: R) -> Result<Self, StreamError> {
        let mut header = [0u8; 2];
        inner.read_exact(&mut header).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                StreamError::InvalidData("truncated zlib header".into())
            } else {
                StreamError::Io(e)
            }
        })?;
        if header[0] != 0x78 {
            return Err(StreamError::InvalidData(format!(
                "bad zlib header: first byte 0x{:02x}",
                header[0]
            )));
        }
        if !ZLIB_FLAGS.contains(&header[1]) {
            return Err(StreamError::InvalidData(format!(
                "bad zlib header: flag byte 0x{:02x}",
                header[1]
            )));
        }
        Ok(Self {
            decoder: DeflateDecoder::new(inner),
        })
    }

    /// Give back the wrapped stream.
    pub fn into_inner(self) -> R {
        self.decoder.into_inner()
    }
}

impl<R: Read> Read for InflateStream<R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.decoder.read(buf)
    }
}
