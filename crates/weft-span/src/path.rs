use std::fmt;
use std::sync::Arc;

use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use weft_structured::{Structured, Structurer};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilePathError {
    #[error("empty path segment")]
    Empty,
    #[error("`{0}` is a reserved path segment")]
    Reserved(String),
    #[error("path segment `{0}` contains a separator")]
    Separator(String),
    #[error("`{0}` is not a relative path")]
    NotRelative(String),
}

/// One validated path component.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePathSegment(Arc<str>);

impl FilePathSegment {
    pub fn new(name: &str) -> Result<Self, FilePathError> {
        if name.is_empty() {
            return Err(FilePathError::Empty);
        }
        if name == "." || name == ".." {
            return Err(FilePathError::Reserved(name.to_owned()));
        }
        if name.contains(['/', '\\']) {
            return Err(FilePathError::Separator(name.to_owned()));
        }
        Ok(Self(name.into()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for FilePathSegment {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

/// Root-relative path of a source file or directory.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FilePath {
    segments: Vec<FilePathSegment>,
    is_dir: bool,
}

impl FilePath {
    pub fn new(segments: Vec<FilePathSegment>, is_dir: bool) -> Self {
        Self { segments, is_dir }
    }

    pub fn root() -> Self {
        Self { segments: Vec::new(), is_dir: true }
    }

    pub fn dir<'a>(segments: impl IntoIterator<Item = &'a str>) -> Result<Self, FilePathError> {
        Ok(Self { segments: parse_segments(segments)?, is_dir: true })
    }

    pub fn file<'a>(segments: impl IntoIterator<Item = &'a str>) -> Result<Self, FilePathError> {
        Ok(Self { segments: parse_segments(segments)?, is_dir: false })
    }

    pub fn segments(&self) -> &[FilePathSegment] {
        &self.segments
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn is_file(&self) -> bool {
        !self.is_dir
    }

    pub fn is_root(&self) -> bool {
        self.segments.is_empty()
    }

    pub fn last(&self) -> Option<&FilePathSegment> {
        self.segments.last()
    }

    /// The directory containing this path, `None` for the root.
    pub fn parent(&self) -> Option<Self> {
        let (_, rest) = self.segments.split_last()?;
        Some(Self { segments: rest.to_vec(), is_dir: true })
    }

    /// A directory is its own directory; a file resolves to its parent.
    pub fn dir_name(&self) -> Self {
        if self.is_dir {
            self.clone()
        } else {
            self.parent().unwrap_or_else(Self::root)
        }
    }

    pub fn join(&self, segment: FilePathSegment, is_dir: bool) -> Self {
        debug_assert!(self.is_dir, "joining onto file path {self}");
        let mut segments = self.segments.clone();
        segments.push(segment);
        Self { segments, is_dir }
    }

    pub fn is_ancestor_of(&self, other: &Self) -> bool {
        self.is_dir
            && self.segments.len() < other.segments.len()
            && other.segments.starts_with(&self.segments)
    }

    pub fn from_utf8_path(path: &Utf8Path, is_dir: bool) -> Result<Self, FilePathError> {
        let mut segments = Vec::new();
        for component in path.components() {
            match component {
                Utf8Component::Normal(name) => segments.push(FilePathSegment::new(name)?),
                Utf8Component::CurDir => {}
                _ => return Err(FilePathError::NotRelative(path.to_string())),
            }
        }
        Ok(Self { segments, is_dir })
    }

    pub fn to_utf8_path_buf(&self) -> Utf8PathBuf {
        self.segments.iter().map(FilePathSegment::as_str).collect()
    }
}

fn parse_segments<'a>(
    segments: impl IntoIterator<Item = &'a str>,
) -> Result<Vec<FilePathSegment>, FilePathError> {
    segments.into_iter().map(FilePathSegment::new).collect()
}

impl fmt::Display for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.segments.is_empty() {
            return f.write_str(if self.is_dir { "/" } else { "" });
        }
        for (i, segment) in self.segments.iter().enumerate() {
            if i != 0 {
                f.write_str("/")?;
            }
            f.write_str(segment.as_str())?;
        }
        if self.is_dir {
            f.write_str("/")?;
        }
        Ok(())
    }
}

impl fmt::Debug for FilePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FilePath({self})")
    }
}

impl Structured for FilePath {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| {
            o.key("segments", |s| {
                s.arr(|a| {
                    for segment in &self.segments {
                        a.element(segment.as_str());
                    }
                })
            });
            o.field("isDir", &self.is_dir);
        });
    }
}
