//! A small s-expression front end producing [`Cst`]s.
//!
//! ```text
//! (let x 1)                  (let x Int 1)
//! (let {a b *} (import "./m"))
//! (@export (let x 1))        (@Decorated (side) (let {a b} (import "./m")))
//! (fn (a b) (add a b))       (block (f) (g))
//! (f \key 1 "text")          ; comment
//! ```

use std::sync::Arc;

use weft_span::{CodeLocation, Position};

use crate::cst::{Cst, CstToken, Operator, TokenKind};

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum SexprError {
    #[error("unexpected end of input at {0}")]
    UnexpectedEof(u32),
    #[error("unexpected `{found}` at {offset}")]
    Unexpected { found: char, offset: u32 },
    #[error("unterminated string starting at {0}")]
    UnterminatedString(u32),
    #[error("empty form at {0}")]
    EmptyForm(u32),
    #[error("malformed `{form}` at {offset}: {reason}")]
    Malformed { form: &'static str, offset: u32, reason: &'static str },
}

impl SexprError {
    /// Byte offset the error points at.
    pub fn offset(&self) -> u32 {
        match *self {
            Self::UnexpectedEof(offset)
            | Self::Unexpected { offset, .. }
            | Self::UnterminatedString(offset)
            | Self::EmptyForm(offset)
            | Self::Malformed { offset, .. } => offset,
        }
    }
}

/// Parses a whole unit. Top-level forms become the operands of a root.
pub fn parse(loc: &CodeLocation, text: &str) -> Result<Cst, SexprError> {
    let mut reader = Reader { loc, text, offset: 0 };
    let mut forms = Vec::new();
    loop {
        reader.skip_trivia();
        if reader.peek().is_none() {
            break;
        }
        forms.push(reader.form()?);
    }
    let pos = reader.pos(0, reader.offset);
    Ok(Cst::Inner { operator: Operator::Root, operands: forms, pos })
}

struct Reader<'a> {
    loc: &'a CodeLocation,
    text: &'a str,
    offset: u32,
}

enum Form {
    Atom(CstToken),
    List(Vec<Form>, Position),
    Curly(Vec<Form>, Position),
}

impl Form {
    fn pos(&self) -> &Position {
        match self {
            Self::Atom(token) => &token.pos,
            Self::List(_, pos) | Self::Curly(_, pos) => pos,
        }
    }

    fn word(&self) -> Option<&str> {
        match self {
            Self::Atom(CstToken { kind: TokenKind::Word, text, .. }) => Some(text),
            _ => None,
        }
    }
}

impl Reader<'_> {
    fn pos(&self, left: u32, right: u32) -> Position {
        Position::new(self.loc.clone(), left, right)
    }

    fn rest(&self) -> &str {
        &self.text[self.offset as usize..]
    }

    fn peek(&self) -> Option<char> {
        self.rest().chars().next()
    }

    fn bump(&mut self) -> Option<char> {
        let c = self.peek()?;
        self.offset += c.len_utf8() as u32;
        Some(c)
    }

    fn skip_trivia(&mut self) {
        while let Some(c) = self.peek() {
            if c == ';' {
                while self.peek().is_some_and(|c| c != '\n') {
                    self.bump();
                }
            } else if c.is_whitespace() {
                self.bump();
            } else {
                break;
            }
        }
    }

    fn form(&mut self) -> Result<Cst, SexprError> {
        let form = self.read()?;
        lower(form)
    }

    fn read(&mut self) -> Result<Form, SexprError> {
        self.skip_trivia();
        let start = self.offset;
        match self.peek() {
            None => Err(SexprError::UnexpectedEof(start)),
            Some('(') => {
                self.bump();
                let items = self.items(')')?;
                Ok(Form::List(items, self.pos(start, self.offset)))
            }
            Some('{') => {
                self.bump();
                let items = self.items('}')?;
                Ok(Form::Curly(items, self.pos(start, self.offset)))
            }
            Some('"') => self.string(),
            Some(found @ (')' | '}')) => Err(SexprError::Unexpected { found, offset: start }),
            Some(_) => Ok(self.atom()),
        }
    }

    fn items(&mut self, close: char) -> Result<Vec<Form>, SexprError> {
        let mut items = Vec::new();
        loop {
            self.skip_trivia();
            match self.peek() {
                None => return Err(SexprError::UnexpectedEof(self.offset)),
                Some(c) if c == close => {
                    self.bump();
                    return Ok(items);
                }
                Some(_) => items.push(self.read()?),
            }
        }
    }

    fn string(&mut self) -> Result<Form, SexprError> {
        let start = self.offset;
        self.bump();
        let mut text = String::new();
        loop {
            match self.bump() {
                None => return Err(SexprError::UnterminatedString(start)),
                Some('"') => break,
                Some('\\') => match self.bump() {
                    Some('n') => text.push('\n'),
                    Some('t') => text.push('\t'),
                    Some(c) => text.push(c),
                    None => return Err(SexprError::UnterminatedString(start)),
                },
                Some(c) => text.push(c),
            }
        }
        let pos = self.pos(start, self.offset);
        Ok(Form::Atom(CstToken { kind: TokenKind::Str, text: text.into(), pos }))
    }

    fn atom(&mut self) -> Form {
        let start = self.offset;
        while self.peek().is_some_and(|c| !c.is_whitespace() && !"(){}\";".contains(c)) {
            self.bump();
        }
        let raw = &self.text[start as usize..self.offset as usize];
        let pos = self.pos(start, self.offset);
        let (kind, text) = if raw == "*" {
            (TokenKind::Star, raw)
        } else if let Some(symbol) = raw.strip_prefix('\\') {
            (TokenKind::Symbol, symbol)
        } else if raw.parse::<i64>().is_ok() {
            (TokenKind::Int, raw)
        } else {
            (TokenKind::Word, raw)
        };
        Form::Atom(CstToken { kind, text: Arc::from(text), pos })
    }
}

fn inner(operator: Operator, operands: Vec<Form>, pos: Position) -> Result<Cst, SexprError> {
    let operands = operands.into_iter().map(lower).collect::<Result<_, _>>()?;
    Ok(Cst::Inner { operator, operands, pos })
}

fn lower(form: Form) -> Result<Cst, SexprError> {
    match form {
        Form::Atom(token) => Ok(Cst::Leaf(token)),
        Form::Curly(items, pos) => inner(Operator::Curly, items, pos),
        Form::List(items, pos) => {
            let offset = u32::from(pos.left());
            let Some(head) = items.first() else {
                return Err(SexprError::EmptyForm(offset));
            };
            match head.word() {
                Some("let") => inner(Operator::Let, items.into_iter().skip(1).collect(), pos),
                Some("block") => inner(Operator::Block, items.into_iter().skip(1).collect(), pos),
                Some("fn") => {
                    let mut items = items.into_iter().skip(1);
                    let (Some(Form::List(params, _)), Some(body), None) =
                        (items.next(), items.next(), items.next())
                    else {
                        let reason = "expected `(fn (params...) body)`";
                        return Err(SexprError::Malformed { form: "fn", offset, reason });
                    };
                    if params.iter().any(|param| param.word().is_none()) {
                        let reason = "parameters must be names";
                        return Err(SexprError::Malformed { form: "fn", offset, reason });
                    }
                    inner(Operator::Fun, params.into_iter().chain([body]).collect(), pos)
                }
                Some(word) if word.starts_with('@') => {
                    let mut items = items;
                    if items.len() < 2 {
                        let reason = "a decorator needs a declaration";
                        return Err(SexprError::Malformed { form: "@", offset, reason });
                    }
                    let decl = items.remove(items.len() - 1);
                    items.insert(1, decl);
                    inner(Operator::Decorate, items, pos)
                }
                _ => {
                    debug_assert!(!items.is_empty(), "{}", head.pos());
                    inner(Operator::Call, items, pos)
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::expect;

    use super::*;
    use crate::Tree;

    fn dump(text: &str) -> String {
        let loc = CodeLocation::new("test");
        let cst = parse(&loc, text).unwrap();
        let tree = Tree::from_cst(loc, &cst);
        let root = tree.root();
        tree.children(root).iter().map(|&n| tree.dump(n)).collect::<Vec<_>>().join("\n")
    }

    #[test]
    fn reads_every_form() {
        let text = r#"
            ; a comment
            (let x 1)
            (let {a b *} (import "./m"))
            (@Decorated (side) (let {a b} (import "./m")))
            (fn (a b) (add a b))
            (block (f \key "a\"b"))
        "#;
        expect![[r#"
            (Decl x \init 1)
            (Decl (Destructure a b *) \init (Call import "./m"))
            (Call @Decorated (Decl (Destructure a b) \init (Call import "./m")) (Call side))
            (Fun a b (Call add a b))
            (Block (Call f \key "a\"b"))"#]]
        .assert_eq(&dump(text));
    }

    #[test]
    fn positions_are_byte_offsets() {
        let loc = CodeLocation::new("test");
        let Cst::Inner { operands, .. } = parse(&loc, "  (f 12)").unwrap() else { panic!() };
        assert_eq!(*operands[0].pos(), Position::new(loc.clone(), 2, 8));
        let Cst::Inner { operands, .. } = &operands[0] else { panic!() };
        assert_eq!(*operands[1].pos(), Position::new(loc, 5, 7));
    }

    #[test]
    fn errors() {
        let loc = CodeLocation::new("test");
        assert_eq!(parse(&loc, "(f"), Err(SexprError::UnexpectedEof(2)));
        assert_eq!(parse(&loc, ")"), Err(SexprError::Unexpected { found: ')', offset: 0 }));
        assert_eq!(parse(&loc, "\"abc"), Err(SexprError::UnterminatedString(0)));
        assert_eq!(parse(&loc, "(f ())"), Err(SexprError::EmptyForm(3)));
        assert!(matches!(parse(&loc, "(fn a b)"), Err(SexprError::Malformed { form: "fn", .. })));
    }
}
