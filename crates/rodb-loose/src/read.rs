use std::io::{self, Read};
use std::path::PathBuf;
use std::sync::Arc;

use rodb_hash::ObjectId;
use rodb_object::{header, ObjectType};
use rodb_stream::{ByteStream, ChainStream, InflateStream, PreloadStream, RangeStream};
use rodb_utils::{BufferPool, Fs};

use crate::LooseError;

/// Headers fit comfortably in this much decompressed prefix.
const HEADER_PROBE: usize = 64;

/// Interface to the loose object directory.
pub struct LooseStore {
    objects_dir: PathBuf,
    fs: Arc<dyn Fs>,
    pool: Arc<BufferPool>,
}

impl LooseStore {
    pub fn new(objects_dir: impl Into<PathBuf>, fs: Arc<dyn Fs>, pool: Arc<BufferPool>) -> Self {
        Self {
            objects_dir: objects_dir.into(),
            fs,
            pool,
        }
    }

    /// The file path for a given OID.
    pub fn object_path(&self, oid: &ObjectId) -> PathBuf {
        self.objects_dir.join(oid.loose_path())
    }

    /// Whether a loose object exists.
    pub fn contains(&self, oid: &ObjectId) -> bool {
        self.fs.is_file(&self.object_path(oid))
    }

    /// Open a loose object as `(type, size, payload stream)`.
    ///
    /// Returns `Ok(None)` if no such file exists; an existing but corrupt
    /// object is an error. The header is parsed eagerly, payload bytes
    /// decompress on demand: whatever the header probe over-read is
    /// replayed through a preload stream ahead of the live inflater.
    pub fn open(&self, oid: &ObjectId) -> Result<Option<(ObjectType, u64, ByteStream)>, LooseError> {
        let (ty, size, leftover, inflate) = match self.open_parsed(oid)? {
            Some(parts) => parts,
            None => return Ok(None),
        };

        let preload = PreloadStream::copied_from(&self.pool, &leftover);
        let chain = ChainStream::new(vec![Box::new(preload), Box::new(inflate)]);
        let stream: ByteStream = Box::new(RangeStream::new(chain, size));
        Ok(Some((ty, size, stream)))
    }

    /// Read just `(type, size)` without touching the payload.
    pub fn read_header(&self, oid: &ObjectId) -> Result<Option<(ObjectType, u64)>, LooseError> {
        Ok(self.open_parsed(oid)?.map(|(ty, size, _, _)| (ty, size)))
    }

    /// Materialize a loose object's payload.
    pub fn read(&self, oid: &ObjectId) -> Result<Option<(ObjectType, Vec<u8>)>, LooseError> {
        let (ty, size, mut stream) = match self.open(oid)? {
            Some(parts) => parts,
            None => return Ok(None),
        };
        let mut data = Vec::with_capacity(size.min(1 << 20) as usize);
        stream.read_to_end(&mut data)?;
        if data.len() as u64 != size {
            return Err(LooseError::Corrupt {
                oid: oid.to_hex(),
                reason: format!("payload is {} bytes, header declares {size}", data.len()),
            });
        }
        Ok(Some((ty, data)))
    }

    /// Open the file, inflate the header probe, and parse it.
    ///
    /// Returns the parsed type and size, the over-read payload bytes, and
    /// the still-live inflater.
    #[allow(clippy::type_complexity)]
    fn open_parsed(
        &self,
        oid: &ObjectId,
    ) -> Result<Option<(ObjectType, u64, Vec<u8>, InflateStream<Box<dyn rodb_utils::FileRead>>)>, LooseError>
    {
        let path = self.object_path(oid);
        let file = match self.fs.open(&path) {
            Ok(f) => f,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(LooseError::Io(e)),
        };

        let mut inflate =
            InflateStream::new(file).map_err(|e| LooseError::from_stream(oid, e))?;

        let mut probe = [0u8; HEADER_PROBE];
        let mut filled = 0;
        let header_len = loop {
            if filled == probe.len() {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: format!("header exceeds {HEADER_PROBE} bytes"),
                });
            }
            let n = inflate.read(&mut probe[filled..]).map_err(|e| {
                if e.kind() == io::ErrorKind::InvalidData {
                    LooseError::Corrupt {
                        oid: oid.to_hex(),
                        reason: e.to_string(),
                    }
                } else {
                    LooseError::Io(e)
                }
            })?;
            if n == 0 {
                return Err(LooseError::Corrupt {
                    oid: oid.to_hex(),
                    reason: "unexpected EOF before header terminator".into(),
                });
            }
            filled += n;
            if let Some(null_pos) = probe[..filled].iter().position(|&b| b == 0) {
                break null_pos + 1;
            }
        };

        let (ty, size, parsed_len) =
            header::parse_header(&probe[..filled]).map_err(|e| LooseError::Header {
                oid: oid.to_hex(),
                source: e,
            })?;
        debug_assert_eq!(parsed_len, header_len);

        Ok(Some((ty, size, probe[header_len..filled].to_vec(), inflate)))
    }
}
