use crate::reflect::{Accessor, OutTree};

const INDENT: &str = "  ";

/// One step of a node's layout. Slot indices refer to the node's
/// [`OutTree::child_accessors`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FormatElement {
    /// A keyword, spaced from words and from opening braces.
    Word(&'static str),
    /// Punctuation, glued to its neighbours.
    Punct(&'static str),
    /// An operator, with a space on both sides.
    Op(&'static str),
    /// The node's own [`OutTree::token_text`].
    Text,
    /// The node's own text as an operator.
    OpText,
    /// Every child in a slot, back to back.
    Child(usize),
    /// Every child in a slot, with `", "` between them.
    Commas(usize),
    /// Every child in a slot, one per line.
    Lines(usize),
    /// The elements, only when the slot has a child.
    Present(usize, &'static [FormatElement]),
    Newline,
    Indent,
    Dedent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Last {
    Start,
    Keyword,
    Word,
    Punct,
    Spaced,
}

/// Renders [`OutTree`] nodes token by token.
#[derive(Debug)]
pub struct Formatter {
    out: String,
    indent: usize,
    line_start: bool,
    last: Last,
}

impl Default for Formatter {
    fn default() -> Self {
        Self::new()
    }
}

impl Formatter {
    pub fn new() -> Self {
        Self { out: String::new(), indent: 0, line_start: true, last: Last::Start }
    }

    pub fn node<N: OutTree>(&mut self, node: &N) {
        for &element in node.format_elements() {
            self.element(node, element);
        }
    }

    fn element<N: OutTree>(&mut self, node: &N, element: FormatElement) {
        let slot = |index: usize| -> Accessor<N> { node.child_accessors()[index] };
        match element {
            FormatElement::Word(text) => self.token(text, Last::Keyword),
            FormatElement::Punct(text) => self.token(text, Last::Punct),
            FormatElement::Op(text) => self.token(text, Last::Spaced),
            FormatElement::Text => {
                let text = node.token_text().unwrap_or_default();
                let operator = text.chars().all(|c| !is_word_char(c));
                let class = if operator { Last::Spaced } else { Last::Word };
                self.token(&text, class);
            }
            FormatElement::OpText => {
                let text = node.token_text().unwrap_or_default();
                self.token(&text, Last::Spaced);
            }
            FormatElement::Child(index) => {
                for child in slot(index).iter(node) {
                    self.node(child);
                }
            }
            FormatElement::Commas(index) => {
                for (i, child) in slot(index).iter(node).enumerate() {
                    if i != 0 {
                        self.token(",", Last::Punct);
                        self.last = Last::Spaced;
                    }
                    self.node(child);
                }
            }
            FormatElement::Lines(index) => {
                for child in slot(index).iter(node) {
                    self.newline();
                    self.node(child);
                }
            }
            FormatElement::Present(index, elements) => {
                if slot(index).count(node) != 0 {
                    for &element in elements {
                        self.element(node, element);
                    }
                }
            }
            FormatElement::Newline => self.newline(),
            FormatElement::Indent => self.indent += 1,
            FormatElement::Dedent => self.indent = self.indent.saturating_sub(1),
        }
    }

    fn token(&mut self, text: &str, class: Last) {
        if text.is_empty() {
            return;
        }
        if self.line_start {
            for _ in 0..self.indent {
                self.out.push_str(INDENT);
            }
            self.line_start = false;
        } else {
            let spaced = match (self.last, class) {
                (Last::Spaced, _) | (_, Last::Spaced) => true,
                (Last::Word | Last::Keyword, Last::Word | Last::Keyword) => true,
                (Last::Keyword, Last::Punct) => matches!(text, "{" | "["),
                _ => false,
            };
            if spaced {
                self.out.push(' ');
            }
        }
        self.out.push_str(text);
        self.last = class;
    }

    /// Never produces blank lines.
    fn newline(&mut self) {
        if !self.line_start {
            self.out.push('\n');
            self.line_start = true;
            self.last = Last::Start;
        }
    }

    /// The text so far, ending in exactly one newline unless empty.
    pub fn finish(mut self) -> String {
        self.newline();
        self.out
    }
}

fn is_word_char(c: char) -> bool {
    c.is_alphanumeric() || matches!(c, '_' | '"' | '\'')
}

pub fn format<N: OutTree>(node: &N) -> String {
    let mut formatter = Formatter::new();
    formatter.node(node);
    formatter.finish()
}
