//! Object type and header codec for the rodb read-only object database.
//!
//! Higher-level decoding of commits, trees, and tags into structured graphs
//! belongs to layers above this workspace; here an object is its type, its
//! size, and its raw payload bytes.

pub mod header;

/// Errors produced by object type and header parsing.
#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("invalid object type: {0:?}")]
    InvalidType(String),

    #[error("invalid object header: {0}")]
    InvalidHeader(String),
}

/// The four concrete types of git objects.
///
/// Pack entries additionally use kind numbers 6 (OFS_DELTA) and 7
/// (REF_DELTA), but those never surface to callers: delta resolution
/// rewrites them to the base object's concrete type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectType {
    Commit,
    Tree,
    Blob,
    Tag,
}

impl ObjectType {
    /// Parse from the type name in object headers.
    pub fn from_bytes(s: &[u8]) -> Result<Self, ObjectError> {
        match s {
            b"commit" => Ok(Self::Commit),
            b"tree" => Ok(Self::Tree),
            b"blob" => Ok(Self::Blob),
            b"tag" => Ok(Self::Tag),
            _ => Err(ObjectError::InvalidType(
                String::from_utf8_lossy(s).into_owned(),
            )),
        }
    }

    /// The canonical type name.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Commit => "commit",
            Self::Tree => "tree",
            Self::Blob => "blob",
            Self::Tag => "tag",
        }
    }

    /// The kind number used in pack entry headers (1..=4).
    pub fn pack_kind(&self) -> u8 {
        match self {
            Self::Commit => 1,
            Self::Tree => 2,
            Self::Blob => 3,
            Self::Tag => 4,
        }
    }

    /// Map a pack entry kind number (1..=4) back to a concrete type.
    pub fn from_pack_kind(kind: u8) -> Option<Self> {
        match kind {
            1 => Some(Self::Commit),
            2 => Some(Self::Tree),
            3 => Some(Self::Blob),
            4 => Some(Self::Tag),
            _ => None,
        }
    }
}

impl std::fmt::Display for ObjectType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for ObjectType {
    type Err = ObjectError;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_bytes(s.as_bytes())
    }
}
