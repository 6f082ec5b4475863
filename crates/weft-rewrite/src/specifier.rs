//! Module specifiers: `[<protocol>:]<path>`.
//!
//! Paths starting with `./`, `../`, `.` or `..` are relative to the directory
//! of the importing unit, paths starting with `/` are relative to the root,
//! and anything else is `<library>/<path inside the library>`. Each segment is
//! percent-decoded on its own; `.` and `..` are normalized away and a trailing
//! `/` makes the result a directory.

use weft_errors::MessageTemplate;
use weft_span::{FilePath, FilePathSegment};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ResolvedSpecifier {
    /// A file or directory under the same root as the importer.
    Relative(FilePath),
    Library { name: String, path: FilePath },
}

impl ResolvedSpecifier {
    pub fn path(&self) -> &FilePath {
        match self {
            Self::Relative(path) | Self::Library { path, .. } => path,
        }
    }

    pub fn library(&self) -> Option<&str> {
        match self {
            Self::Relative(_) => None,
            Self::Library { name, .. } => Some(name),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Specifier {
    pub protocol: Option<String>,
    pub resolved: ResolvedSpecifier,
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SpecifierError {
    #[error("malformed specifier")]
    Malformed,
    #[error("too many `..` segments")]
    TooManyParentParts,
    #[error("segment `{0}` is not valid percent-encoded UTF-8")]
    MalformedSegmentUtf8(String),
}

impl SpecifierError {
    pub fn template(&self, specifier: &str) -> MessageTemplate {
        match self {
            Self::Malformed => MessageTemplate::MalformedSpecifier,
            Self::TooManyParentParts => MessageTemplate::ImportPathHasTooManyParentParts {
                specifier: specifier.to_owned(),
            },
            Self::MalformedSegmentUtf8(segment) => {
                MessageTemplate::MalformedImportPathSegmentUtf8 { segment: segment.clone() }
            }
        }
    }
}

/// Resolves `specifier` as written in the unit at `base`.
pub fn resolve_specifier(specifier: &str, base: &FilePath) -> Result<Specifier, SpecifierError> {
    let (protocol, path) = split_protocol(specifier);
    if path.is_empty() {
        return Err(SpecifierError::Malformed);
    }

    let resolved = if let Some(rest) = path.strip_prefix('/') {
        ResolvedSpecifier::Relative(walk_segments(FilePath::root(), rest)?)
    } else if is_relative(path) {
        ResolvedSpecifier::Relative(walk_segments(base.dir_name(), path)?)
    } else {
        let (name, rest) = path.split_once('/').unwrap_or((path, ""));
        let name = percent_decode(name)?;
        if name.is_empty() || name == "." || name == ".." {
            return Err(SpecifierError::Malformed);
        }
        let path =
            if rest.is_empty() { FilePath::root() } else { walk_segments(FilePath::root(), rest)? };
        ResolvedSpecifier::Library { name, path }
    };
    Ok(Specifier { protocol: protocol.map(str::to_owned), resolved })
}

fn split_protocol(specifier: &str) -> (Option<&str>, &str) {
    let Some((protocol, rest)) = specifier.split_once(':') else {
        return (None, specifier);
    };
    let mut chars = protocol.chars();
    let well_formed = chars.next().is_some_and(|c| c.is_ascii_alphabetic())
        && chars.all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '-' | '.'));
    if well_formed { (Some(protocol), rest) } else { (None, specifier) }
}

fn is_relative(path: &str) -> bool {
    path == "." || path == ".." || path.starts_with("./") || path.starts_with("../")
}

fn walk_segments(start: FilePath, path: &str) -> Result<FilePath, SpecifierError> {
    let mut segments = start.segments().to_vec();
    let mut is_dir = true;
    for raw in path.split('/') {
        is_dir = true;
        match raw {
            "" | "." => {}
            ".." => {
                segments.pop().ok_or(SpecifierError::TooManyParentParts)?;
            }
            _ => {
                let decoded = percent_decode(raw)?;
                let segment = FilePathSegment::new(&decoded).ok();
                segments.push(segment.ok_or(SpecifierError::Malformed)?);
                is_dir = false;
            }
        }
    }
    Ok(FilePath::new(segments, is_dir))
}

fn percent_decode(raw: &str) -> Result<String, SpecifierError> {
    let malformed = || SpecifierError::MalformedSegmentUtf8(raw.to_owned());
    let bytes = raw.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' {
            let high = bytes.get(i + 1).and_then(|&b| hex_digit(b));
            let low = bytes.get(i + 2).and_then(|&b| hex_digit(b));
            let (Some(high), Some(low)) = (high, low) else { return Err(malformed()) };
            decoded.push((high << 4) | low);
            i += 3;
        } else {
            decoded.push(bytes[i]);
            i += 1;
        }
    }
    String::from_utf8(decoded).ok().ok_or_else(malformed)
}

fn hex_digit(b: u8) -> Option<u8> {
    (b as char).to_digit(16).map(|d| d as u8)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn file(segments: &[&str]) -> FilePath {
        FilePath::file(segments.iter().copied()).unwrap()
    }

    fn dir(segments: &[&str]) -> FilePath {
        FilePath::dir(segments.iter().copied()).unwrap()
    }

    fn relative(specifier: &str, base: &FilePath) -> Result<FilePath, SpecifierError> {
        match resolve_specifier(specifier, base)?.resolved {
            ResolvedSpecifier::Relative(path) => Ok(path),
            other => panic!("expected a relative path, got {other:?}"),
        }
    }

    #[test]
    fn parent_parts_against_file_base() {
        assert_eq!(relative("../../foo", &file(&["a", "b", "c.weft"])), Ok(file(&["foo"])));
        assert_eq!(
            relative("../../foo", &file(&["a", "c.weft"])),
            Err(SpecifierError::TooManyParentParts)
        );
    }

    #[test]
    fn parent_of_directory() {
        assert_eq!(relative("../", &dir(&["a", "b"])), Ok(dir(&["a"])));
        assert_eq!(relative("..", &dir(&["a", "b"])), Ok(dir(&["a"])));
        assert_eq!(relative("../", &FilePath::root()), Err(SpecifierError::TooManyParentParts));
    }

    #[test]
    fn absolute_paths_are_unchanged() {
        for path in [file(&["a", "b.weft"]), dir(&["lib", "x"]), file(&["top"])] {
            let specifier = format!("/{path}");
            assert_eq!(relative(&specifier, &file(&["elsewhere", "m.weft"])), Ok(path));
        }
    }

    #[test]
    fn dots_are_normalized() {
        let base = file(&["a", "m.weft"]);
        assert_eq!(relative("./earth", &base), Ok(file(&["a", "earth"])));
        assert_eq!(relative("./x/./../y/", &base), Ok(dir(&["a", "y"])));
        assert_eq!(relative(".", &base), Ok(dir(&["a"])));
    }

    #[test]
    fn percent_decoding() {
        let base = FilePath::root();
        assert_eq!(relative("./%E2%9C%93.weft", &base), Ok(file(&["\u{2713}.weft"])));
        assert_eq!(relative("./a%20b", &base), Ok(file(&["a b"])));
        assert_eq!(
            relative("./ok/%FF", &base),
            Err(SpecifierError::MalformedSegmentUtf8("%FF".to_owned()))
        );
        assert_eq!(
            relative("./%E2%9", &base),
            Err(SpecifierError::MalformedSegmentUtf8("%E2%9".to_owned()))
        );
        assert_eq!(relative("./a%2Fb", &base), Err(SpecifierError::Malformed));
    }

    #[test]
    fn libraries_and_protocols() {
        let base = file(&["m.weft"]);
        let spec = resolve_specifier("std/io/print", &base).unwrap();
        assert_eq!(spec.protocol, None);
        assert_eq!(
            spec.resolved,
            ResolvedSpecifier::Library { name: "std".to_owned(), path: file(&["io", "print"]) }
        );

        let spec = resolve_specifier("weft:std", &base).unwrap();
        assert_eq!(spec.protocol.as_deref(), Some("weft"));
        assert_eq!(spec.resolved.library(), Some("std"));
        assert!(spec.resolved.path().is_root());

        assert_eq!(resolve_specifier("std/../..", &base), Err(SpecifierError::TooManyParentParts));
        assert_eq!(resolve_specifier("", &base), Err(SpecifierError::Malformed));
        assert_eq!(resolve_specifier("weft:", &base), Err(SpecifierError::Malformed));
    }

    #[test]
    fn error_templates() {
        let template = SpecifierError::TooManyParentParts.template("../x");
        assert_eq!(template.id(), "ImportPathHasTooManyParentParts");
        assert_eq!(template.to_string(), "import path `../x` walks above the root");
    }
}
