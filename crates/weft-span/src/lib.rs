//! Source provenance: compilation unit identities, positions and file paths.

mod path;
mod position;

pub use path::{FilePath, FilePathError, FilePathSegment};
pub use position::{CodeLocation, Position};
pub use text_size::{TextRange, TextSize};
