//! Streaming delta application.
//!
//! A delta stream opens with two size varints (base size, result size) and
//! continues with copy and insert opcodes. [`DeltaStream`] applies them as
//! a pull stream: each `read` consumes just enough opcodes and base bytes
//! to make progress, so reconstructing a large object never materializes
//! it.

use std::io::{self, Read, Seek, SeekFrom};

use rodb_stream::{cancelled_error, MemoStream};
use rodb_utils::CancelToken;

use crate::varint::read_size_varint;
use crate::PackError;

fn invalid_data(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

#[derive(Clone, Copy, Debug)]
enum State {
    Opcode,
    Copy { remaining: u64 },
    Insert { remaining: u64 },
}

/// Applies a delta instruction stream against a memoized base.
///
/// The base must be random-access: copy instructions may reference any
/// earlier (or later) region of it, in any order. The stream yields exactly
/// `result_size` bytes; anything else in the instruction stream (early
/// EOF, overproduction, trailing bytes, the reserved zero opcode) is
/// invalid data.
#[derive(Debug)]
pub struct DeltaStream<D> {
    delta: D,
    base: MemoStream,
    result_size: u64,
    produced: u64,
    state: State,
    token: CancelToken,
    trailing_checked: bool,
}

impl<D: Read> DeltaStream<D> {
    /// Parse the delta header and bind the stream to its base.
    ///
    /// Fails immediately if the declared base size does not match the
    /// base's actual length.
    pub fn new(mut delta: D, base: MemoStream, token: CancelToken) -> Result<Self, PackError> {
        let header_err = |e: PackError| match e {
            PackError::InvalidVarint(reason) => {
                PackError::InvalidDelta(format!("bad header varint: {reason}"))
            }
            other => other,
        };
        let base_size = read_size_varint(&mut delta).map_err(header_err)?;
        if base_size != base.len() {
            return Err(PackError::InvalidDelta(format!(
                "declared base size {base_size} does not match base length {}",
                base.len()
            )));
        }
        let result_size = read_size_varint(&mut delta).map_err(header_err)?;
        Ok(Self {
            delta,
            base,
            result_size,
            produced: 0,
            state: State::Opcode,
            token,
            trailing_checked: false,
        })
    }

    /// Total number of bytes this stream will produce.
    pub fn result_size(&self) -> u64 {
        self.result_size
    }

    fn read_delta_byte(&mut self, context: &'static str) -> io::Result<u8> {
        let mut byte = [0u8; 1];
        self.delta.read_exact(&mut byte).map_err(|e| {
            if e.kind() == io::ErrorKind::UnexpectedEof {
                invalid_data(format!("delta truncated in {context}"))
            } else {
                e
            }
        })?;
        Ok(byte[0])
    }

    /// Decode the next opcode and arm the matching state.
    fn next_instruction(&mut self) -> io::Result<()> {
        let op = self.read_delta_byte("opcode")?;

        if op & 0x80 != 0 {
            // Copy: bits 0..3 select offset bytes, bits 4..6 size bytes,
            // each LSB-first; absent bytes contribute zero.
            let mut offset: u64 = 0;
            for (i, flag) in [0x01u8, 0x02, 0x04, 0x08].into_iter().enumerate() {
                if op & flag != 0 {
                    offset |= (self.read_delta_byte("copy offset")? as u64) << (8 * i);
                }
            }
            let mut size: u64 = 0;
            for (i, flag) in [0x10u8, 0x20, 0x40].into_iter().enumerate() {
                if op & flag != 0 {
                    size |= (self.read_delta_byte("copy size")? as u64) << (8 * i);
                }
            }
            if size == 0 {
                size = 0x10000;
            }
            if offset + size > self.base.len() {
                return Err(invalid_data(format!(
                    "copy out of bounds: offset={offset} size={size} base={}",
                    self.base.len()
                )));
            }
            if self.produced + size > self.result_size {
                return Err(invalid_data("delta output exceeds declared result size"));
            }
            self.base.seek(SeekFrom::Start(offset))?;
            self.state = State::Copy { remaining: size };
            Ok(())
        } else if op != 0 {
            let count = op as u64;
            if self.produced + count > self.result_size {
                return Err(invalid_data("delta output exceeds declared result size"));
            }
            self.state = State::Insert { remaining: count };
            Ok(())
        } else {
            Err(invalid_data("reserved delta opcode 0"))
        }
    }
}

impl<D: Read> Read for DeltaStream<D> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        loop {
            if self.produced == self.result_size {
                if !self.trailing_checked {
                    self.trailing_checked = true;
                    let mut probe = [0u8; 1];
                    if self.delta.read(&mut probe)? != 0 {
                        return Err(invalid_data("trailing bytes after delta end"));
                    }
                }
                return Ok(0);
            }
            if self.token.is_cancelled() {
                return Err(cancelled_error());
            }

            match self.state {
                State::Opcode => self.next_instruction()?,
                State::Copy { remaining } => {
                    let cap = buf.len().min(remaining as usize);
                    let n = self.base.read(&mut buf[..cap])?;
                    if n == 0 {
                        return Err(invalid_data("base stream ended during copy"));
                    }
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        State::Opcode
                    } else {
                        State::Copy { remaining: left }
                    };
                    self.produced += n as u64;
                    return Ok(n);
                }
                State::Insert { remaining } => {
                    let cap = buf.len().min(remaining as usize);
                    let n = self.delta.read(&mut buf[..cap])?;
                    if n == 0 {
                        return Err(invalid_data("delta truncated in insert data"));
                    }
                    let left = remaining - n as u64;
                    self.state = if left == 0 {
                        State::Opcode
                    } else {
                        State::Insert { remaining: left }
                    };
                    self.produced += n as u64;
                    return Ok(n);
                }
            }
        }
    }
}
