use crate::{HashError, ObjectId};

/// Fan-out table mapping first byte to cumulative count.
///
/// Pack index files open with 256 big-endian `u32` values; entry `i` holds
/// the number of objects whose first hash byte is ≤ `i`, so entry 255 is
/// the total and the candidate slice for any OID is
/// `counts[first_byte - 1]..counts[first_byte]`.
#[derive(Debug)]
pub struct FanoutTable {
    counts: [u32; 256],
}

impl FanoutTable {
    /// Parse from binary form (1024 bytes of big-endian `u32`).
    ///
    /// A short slice or decreasing cumulative counts are invalid data.
    pub fn from_bytes(data: &[u8]) -> Result<Self, HashError> {
        if data.len() < 1024 {
            return Err(HashError::TruncatedFanout { actual: data.len() });
        }
        let mut counts = [0u32; 256];
        for (slot, chunk) in counts.iter_mut().zip(data.chunks_exact(4)) {
            *slot = u32::from_be_bytes(chunk.try_into().expect("chunk is 4 bytes"));
        }
        for bucket in 1..256 {
            let (previous, value) = (counts[bucket - 1], counts[bucket]);
            if value < previous {
                return Err(HashError::NonMonotonicFanout {
                    bucket,
                    value,
                    previous,
                });
            }
        }
        Ok(Self { counts })
    }

    /// Build from a sorted slice of OIDs (fixtures and index writers).
    ///
    /// Sortedness is the caller's responsibility and is not checked.
    pub fn build(oids: &[ObjectId]) -> Self {
        let mut counts = [0u32; 256];
        for oid in oids {
            counts[oid.first_byte() as usize] += 1;
        }
        let mut running = 0u32;
        for slot in counts.iter_mut() {
            running += *slot;
            *slot = running;
        }
        Self { counts }
    }

    /// Serialize to the 1024-byte binary form.
    pub fn to_bytes(&self) -> [u8; 1024] {
        let mut out = [0u8; 1024];
        for (chunk, count) in out.chunks_exact_mut(4).zip(self.counts) {
            chunk.copy_from_slice(&count.to_be_bytes());
        }
        out
    }

    /// The sorted-table index range holding OIDs that start with
    /// `first_byte`.
    pub fn range(&self, first_byte: u8) -> std::ops::Range<usize> {
        let end = self.counts[first_byte as usize] as usize;
        let start = match first_byte.checked_sub(1) {
            Some(prev) => self.counts[prev as usize] as usize,
            None => 0,
        };
        start..end
    }

    /// Total number of objects tracked.
    pub fn total(&self) -> u32 {
        self.counts[255]
    }

    /// The cumulative count at `bucket`.
    pub fn get(&self, bucket: u8) -> u32 {
        self.counts[bucket as usize]
    }
}
