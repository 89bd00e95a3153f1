use std::io;

use thiserror::Error;

/// Enumeration of errors which can result from reading, writing or building a DMS model
#[derive(Error, Debug)]
pub enum DmsError {
    #[error("not a DMS file (magic {found:#010x})")]
    BadMagic { found: u32 },
    #[error("unexpected end of DMS stream")]
    Truncated,
    #[error("I/O error: {0}")]
    Io(io::Error),
    #[error("static model declares {0} animations")]
    UnexpectedAnimations(u32),
    #[error("animation '{animation}' has {found} bones, skeleton has {expected}")]
    BoneCountMismatch {
        animation: String,
        expected: usize,
        found: i32,
    },
    #[error("animation '{animation}' stores {found} poses, expected {expected}")]
    PoseCountMismatch {
        animation: String,
        expected: usize,
        found: usize,
    },
    #[error("skeleton has no bones")]
    EmptySkeleton,
    #[error("{what} name is not valid UTF-8")]
    InvalidName { what: &'static str },
    #[error("bone {bone} has parent {parent}, which does not precede it")]
    BoneOrder { bone: usize, parent: i32 },
    #[error("negative {what} count: {value}")]
    NegativeCount { what: &'static str, value: i32 },
    #[error("mesh {mesh} references vertex {index} but only has {vertex_count}")]
    IndexOutOfRange {
        mesh: usize,
        index: u32,
        vertex_count: usize,
    },
    #[error("vertex index {0} does not fit in 24 bits")]
    IndexOverflow(u32),
    #[error("stripification failed: {0}")]
    Stripify(String),
    #[cfg(feature = "convert")]
    #[error("glTF error: {0}")]
    Gltf(#[from] gltf::Error),
    #[cfg(feature = "convert")]
    #[error("import failed: {0}")]
    Import(String),
}

// short reads are a format problem, not an I/O one
impl From<io::Error> for DmsError {
    fn from(err: io::Error) -> Self {
        if err.kind() == io::ErrorKind::UnexpectedEof {
            DmsError::Truncated
        } else {
            DmsError::Io(err)
        }
    }
}

pub type DmsResult<T> = Result<T, DmsError>;
