use std::fmt::Display;

/// Errors surfaced by a graph load.
///
/// One error is surfaced per load. Body errors carry the byte offset of the
/// offending token so callers can point at the exact position in the input
/// file.
#[derive(Debug)]
pub enum LoadError {
    /// The input path could not be opened.
    NotFound(std::io::Error),
    /// The banner or size triple of the input could not be parsed.
    BadHeader(String),
    /// A malformed body token, a negative vertex id after rebasing, or an
    /// out-of-bounds entry was found at `offset` (checked parsing only).
    BadBody { offset: usize },
    /// Mapping the input or allocating scratch/output memory failed.
    ResourceExhausted(String),
}

impl Display for LoadError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LoadError::NotFound(e) => write!(f, "error opening input file: {e}"),
            LoadError::BadHeader(msg) => write!(f, "error invalid header: {msg}"),
            LoadError::BadBody { offset } => {
                write!(f, "error invalid body at byte offset {offset}")
            }
            LoadError::ResourceExhausted(msg) => write!(f, "error out of resources: {msg}"),
        }
    }
}

impl std::error::Error for LoadError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            LoadError::NotFound(e) => Some(e),
            _ => None,
        }
    }
}

impl LoadError {
    /// Shifts the byte offset of a body error by `base`, leaving every other
    /// variant untouched. Used to translate block-relative offsets into file
    /// offsets.
    #[inline]
    pub(crate) fn offset_by(self, base: usize) -> Self {
        match self {
            LoadError::BadBody { offset } => LoadError::BadBody {
                offset: offset + base,
            },
            e => e,
        }
    }
}
