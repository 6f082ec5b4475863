use std::fmt;
use std::sync::Arc;

use weft_span::{FilePath, FilePathError, FilePathSegment};

use crate::kind::Symbol;
use crate::tree::StayId;

/// Leaf payload and the currency passed to feature implementations.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Void,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(Arc<str>),
    Symbol(Symbol),
    List(Arc<[Value]>),
    StayRef(StayId),
}

impl Value {
    pub fn str(text: &str) -> Self {
        Self::Str(text.into())
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::Str(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_symbol(&self) -> Option<&Symbol> {
        match self {
            Self::Symbol(symbol) => Some(symbol),
            _ => None,
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Void => f.write_str("void"),
            Self::Bool(value) => write!(f, "{value}"),
            Self::Int(value) => write!(f, "{value}"),
            Self::Float(value) => write!(f, "{value:?}"),
            Self::Str(text) => write!(f, "{text:?}"),
            Self::Symbol(symbol) => write!(f, "{symbol}"),
            Self::List(items) => {
                f.write_str("[")?;
                for (i, item) in items.iter().enumerate() {
                    if i != 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{item}")?;
                }
                f.write_str("]")
            }
            Self::StayRef(stay) => write!(f, "{stay:?}"),
        }
    }
}

const DIR_TAG: &str = "d";
const FILE_TAG: &str = "f";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum FilePathDecodeError {
    #[error("expected a list")]
    NotAList,
    #[error("missing directory/file tag")]
    MissingTag,
    #[error("unknown tag `{0}`")]
    UnknownTag(String),
    #[error("segment {0} is not a string")]
    NonStringSegment(usize),
    #[error(transparent)]
    BadSegment(#[from] FilePathError),
}

/// `["d" | "f", segment...]`
impl From<&FilePath> for Value {
    fn from(path: &FilePath) -> Self {
        let tag = if path.is_dir() { DIR_TAG } else { FILE_TAG };
        let items = std::iter::once(Self::str(tag))
            .chain(path.segments().iter().map(|segment| Self::str(segment.as_str())))
            .collect::<Vec<_>>();
        Self::List(items.into())
    }
}

impl TryFrom<&Value> for FilePath {
    type Error = FilePathDecodeError;

    fn try_from(value: &Value) -> Result<Self, Self::Error> {
        let Value::List(items) = value else {
            return Err(FilePathDecodeError::NotAList);
        };
        let (tag, segments) = items.split_first().ok_or(FilePathDecodeError::MissingTag)?;
        let is_dir = match tag.as_str() {
            Some(DIR_TAG) => true,
            Some(FILE_TAG) => false,
            Some(other) => return Err(FilePathDecodeError::UnknownTag(other.to_owned())),
            None => return Err(FilePathDecodeError::MissingTag),
        };
        let segments = segments
            .iter()
            .enumerate()
            .map(|(i, segment)| {
                let text = segment.as_str().ok_or(FilePathDecodeError::NonStringSegment(i))?;
                Ok(FilePathSegment::new(text)?)
            })
            .collect::<Result<Vec<_>, FilePathDecodeError>>()?;
        Ok(Self::new(segments, is_dir))
    }
}
