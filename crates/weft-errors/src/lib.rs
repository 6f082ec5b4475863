use std::fmt::Display;

pub use annotate_snippets::Renderer;
use annotate_snippets::{Level as SnippetLevel, Snippet};
use weft_span::Position;
use weft_structured::{Structured, Structurer};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Level {
    Info,
    Warning,
    Error,
}

impl Level {
    fn snippet_level(self) -> SnippetLevel {
        match self {
            Self::Info => SnippetLevel::Info,
            Self::Warning => SnippetLevel::Warning,
            Self::Error => SnippetLevel::Error,
        }
    }
}

/// What went wrong. Each variant has a stable identifier, see [`MessageTemplate::id`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MessageTemplate {
    #[error("`{callee}` expects {expected} argument(s), found {actual}")]
    ArityMismatch { callee: String, expected: usize, actual: usize },
    #[error("malformed declaration: {reason}")]
    MalformedDeclaration { reason: String },
    #[error("expected a declaration")]
    ExpectedDeclaration,
    #[error("malformed module specifier")]
    MalformedSpecifier,
    #[error("import path `{specifier}` walks above the root")]
    ImportPathHasTooManyParentParts { specifier: String },
    #[error("path segment `{segment}` is not valid percent-encoded UTF-8")]
    MalformedImportPathSegmentUtf8 { segment: String },
    #[error("cannot import `{specifier}`: {reason}")]
    ImportFailed { specifier: String, reason: String },
    #[error("`{name}` is not exported by `{specifier}`")]
    MissingExport { name: String, specifier: String },
    #[error("feature `{feature}` is not supported by this interpreter")]
    UnsupportedByInterpreter { feature: String },
    #[error("type metadata on a multi-name import cannot be split per name")]
    ComplexTypeMetadataInMultiImport,
    #[error("cannot derive JSON interop: {reason}")]
    MalformedJsonType { reason: String },
    #[error("placeholder was never resolved")]
    UnresolvedStay,
    #[error("compilation stopped at stage {stage}: {reason}")]
    IncompleteCompilation { stage: String, reason: String },
    #[error("backend `{backend}` failed: {reason}")]
    BackendFailed { backend: String, reason: String },
}

impl MessageTemplate {
    pub fn id(&self) -> &'static str {
        match self {
            Self::ArityMismatch { .. } => "ArityMismatch",
            Self::MalformedDeclaration { .. } => "MalformedDeclaration",
            Self::ExpectedDeclaration => "ExpectedDeclaration",
            Self::MalformedSpecifier => "MalformedSpecifier",
            Self::ImportPathHasTooManyParentParts { .. } => "ImportPathHasTooManyParentParts",
            Self::MalformedImportPathSegmentUtf8 { .. } => "MalformedImportPathSegmentUtf8",
            Self::ImportFailed { .. } => "ImportFailed",
            Self::MissingExport { .. } => "MissingExport",
            Self::UnsupportedByInterpreter { .. } => "UnsupportedByInterpreter",
            Self::ComplexTypeMetadataInMultiImport => "ComplexTypeMetadataInMultiImport",
            Self::MalformedJsonType { .. } => "MalformedJsonType",
            Self::UnresolvedStay => "UnresolvedStay",
            Self::IncompleteCompilation { .. } => "IncompleteCompilation",
            Self::BackendFailed { .. } => "BackendFailed",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    level: Level,
    template: MessageTemplate,
    message: String,
    pos: Position,
}

impl Diagnostic {
    pub fn new(level: Level, template: MessageTemplate, pos: Position) -> Self {
        let message = template.to_string();
        Self { level, template, message, pos }
    }

    pub fn error(template: MessageTemplate, pos: Position) -> Self {
        Self::new(Level::Error, template, pos)
    }

    pub fn level(&self) -> Level {
        self.level
    }

    pub fn template(&self) -> &MessageTemplate {
        &self.template
    }

    pub fn pos(&self) -> &Position {
        &self.pos
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn render<'a>(
        &'a self,
        renderer: &'a Renderer,
        path: &'a str,
        text: &'a str,
    ) -> impl Display + 'a {
        let level = self.level.snippet_level();
        let message = level.title(&self.message).id(self.template.id()).snippet(
            Snippet::source(text)
                .origin(path)
                .annotation(level.span(self.pos.range().into()).label("here"))
                .fold(true),
        );
        renderer.render(message)
    }
}

impl Structured for Diagnostic {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| {
            o.key("level", |s| s.value(format!("{:?}", self.level)));
            o.field("template", self.template.id());
            o.field("message", self.message());
            o.field("pos", &self.pos);
        });
    }
}

/// Receives diagnostics for one compilation unit.
pub trait LogSink {
    fn log(&mut self, diagnostic: Diagnostic);
}

/// Collecting sink that also mirrors every entry to `tracing`.
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    entries: Vec<Diagnostic>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> &[Diagnostic] {
        &self.entries
    }

    pub fn error_count(&self) -> usize {
        self.entries.iter().filter(|d| d.level == Level::Error).count()
    }

    pub fn has_errors(&self) -> bool {
        self.error_count() != 0
    }

    pub fn ids(&self) -> Vec<&'static str> {
        self.entries.iter().map(|d| d.template.id()).collect()
    }

    pub fn take(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}

impl LogSink for Diagnostics {
    fn log(&mut self, diagnostic: Diagnostic) {
        match diagnostic.level {
            Level::Error => tracing::debug!(
                id = diagnostic.template.id(),
                pos = %diagnostic.pos,
                "error: {}",
                diagnostic.template
            ),
            Level::Warning | Level::Info => tracing::trace!(
                id = diagnostic.template.id(),
                pos = %diagnostic.pos,
                "{}",
                diagnostic.template
            ),
        }
        self.entries.push(diagnostic);
    }
}

impl Structured for Diagnostics {
    fn destructure(&self, s: &mut Structurer) {
        self.entries.destructure(s);
    }
}

#[cfg(test)]
mod tests {
    use weft_span::CodeLocation;

    use super::*;

    #[test]
    fn collects_and_counts() {
        let pos = Position::new(CodeLocation::new("m"), 2, 5);
        let mut sink = Diagnostics::new();
        sink.log(Diagnostic::error(MessageTemplate::MalformedSpecifier, pos.clone()));
        sink.log(Diagnostic::new(Level::Warning, MessageTemplate::UnresolvedStay, pos));
        assert_eq!(sink.error_count(), 1);
        assert_eq!(sink.ids(), ["MalformedSpecifier", "UnresolvedStay"]);
    }

    #[test]
    fn renders_with_snippet() {
        let text = "let x = import(1)\n";
        let pos = Position::new(CodeLocation::new("m"), 15, 16);
        let diagnostic = Diagnostic::error(
            MessageTemplate::ArityMismatch { callee: "import".into(), expected: 1, actual: 0 },
            pos,
        );
        let renderer = Renderer::plain();
        let rendered = diagnostic.render(&renderer, "m.weft", text).to_string();
        assert!(rendered.starts_with("error[ArityMismatch]: `import` expects 1 argument(s)"));
        assert!(rendered.contains("m.weft:1:16"), "{rendered}");
        assert!(rendered.contains("let x = import(1)"), "{rendered}");
    }
}
