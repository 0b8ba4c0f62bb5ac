use std::collections::VecDeque;
use std::io::{self, Read};

use crate::ByteStream;

/// Concatenation of child streams.
///
/// Reads drain child 0 until it signals EOF, then child 1, and so on. Each
/// child is dropped the moment it reports EOF, releasing whatever it holds
/// (pooled buffers, cached file handles). Forward-only.
pub struct ChainStream {
    children: VecDeque<ByteStream>,
}

impl ChainStream {
    pub fn new(children: Vec<ByteStream>) -> Self {
        Self {
            children: children.into(),
        }
    }

    /// Append another child after the existing ones.
    pub fn push(&mut self, child: ByteStream) {
        self.children.push_back(child);
    }

    /// Number of children not yet fully drained.
    pub fn remaining_children(&self) -> usize {
        self.children.len()
    }
}

impl Read for ChainStream {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }
        while let Some(front) = self.children.front_mut() {
            let n = front.read(buf)?;
            if n > 0 {
                return Ok(n);
            }
            // Child exhausted: dispose of it now.
            self.children.pop_front();
        }
        Ok(0)
    }
}
