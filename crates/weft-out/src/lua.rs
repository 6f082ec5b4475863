//! Lua output grammar.

use std::borrow::Cow;
use std::fmt::Write as _;

use weft_span::Position;

use crate::format::FormatElement::{self, *};
use crate::reflect::{Accessor, OutTree};

#[derive(Debug, Clone, PartialEq)]
pub enum Lua {
    Chunk { pos: Position, body: Vec<Lua> },
    Local { pos: Position, name: Box<Lua>, value: Option<Box<Lua>> },
    Assign { pos: Position, target: Box<Lua>, value: Box<Lua> },
    Return { pos: Position, values: Vec<Lua> },
    Do { pos: Position, body: Vec<Lua> },
    Function { pos: Position, params: Vec<Lua>, body: Vec<Lua> },
    Call { pos: Position, callee: Box<Lua>, args: Vec<Lua> },
    Index { pos: Position, table: Box<Lua>, key: Box<Lua> },
    Table { pos: Position, fields: Vec<Lua> },
    Field { pos: Position, key: Box<Lua>, value: Box<Lua> },
    Binary { pos: Position, op: &'static str, lhs: Box<Lua>, rhs: Box<Lua> },
    Paren { pos: Position, inner: Box<Lua> },
    Name { pos: Position, name: String },
    Str { pos: Position, value: String },
    Int { pos: Position, value: i64 },
    Float { pos: Position, value: f64 },
    Bool { pos: Position, value: bool },
    Nil { pos: Position },
}

impl Lua {
    pub fn name(pos: Position, name: impl Into<String>) -> Self {
        Self::Name { pos, name: name.into() }
    }

    pub fn str(pos: Position, value: impl Into<String>) -> Self {
        Self::Str { pos, value: value.into() }
    }

    pub fn call(pos: Position, callee: Self, args: Vec<Self>) -> Self {
        Self::Call { pos, callee: Box::new(callee), args }
    }

    pub fn local(pos: Position, name: Self, value: Option<Self>) -> Self {
        Self::Local { pos, name: Box::new(name), value: value.map(Box::new) }
    }
}

macro_rules! slots {
    ($(one $f:ident = $variant:ident.$field:ident;)*) => {$(
        fn $f(node: &Lua) -> Option<&Lua> {
            match node {
                Lua::$variant { $field, .. } => Some(&**$field),
                _ => None,
            }
        }
    )*};
}

macro_rules! optional_slots {
    ($(opt $f:ident = $variant:ident.$field:ident;)*) => {$(
        fn $f(node: &Lua) -> Option<&Lua> {
            match node {
                Lua::$variant { $field, .. } => $field.as_deref(),
                _ => None,
            }
        }
    )*};
}

macro_rules! many_slots {
    ($(many $f:ident = $variant:ident.$field:ident;)*) => {$(
        fn $f(node: &Lua) -> &[Lua] {
            match node {
                Lua::$variant { $field, .. } => $field.as_slice(),
                _ => &[],
            }
        }
    )*};
}

slots! {
    one local_name = Local.name;
    one assign_target = Assign.target;
    one assign_value = Assign.value;
    one call_callee = Call.callee;
    one index_table = Index.table;
    one index_key = Index.key;
    one field_key = Field.key;
    one field_value = Field.value;
    one binary_lhs = Binary.lhs;
    one binary_rhs = Binary.rhs;
    one paren_inner = Paren.inner;
}

optional_slots! {
    opt local_value = Local.value;
}

many_slots! {
    many chunk_body = Chunk.body;
    many return_values = Return.values;
    many do_body = Do.body;
    many function_params = Function.params;
    many function_body = Function.body;
    many call_args = Call.args;
    many table_fields = Table.fields;
}

const CHUNK: &[Accessor<Lua>] = &[Accessor::Many(chunk_body)];
const LOCAL: &[Accessor<Lua>] = &[Accessor::One(local_name), Accessor::One(local_value)];
const ASSIGN: &[Accessor<Lua>] = &[Accessor::One(assign_target), Accessor::One(assign_value)];
const RETURN: &[Accessor<Lua>] = &[Accessor::Many(return_values)];
const DO: &[Accessor<Lua>] = &[Accessor::Many(do_body)];
const FUNCTION: &[Accessor<Lua>] =
    &[Accessor::Many(function_params), Accessor::Many(function_body)];
const CALL: &[Accessor<Lua>] = &[Accessor::One(call_callee), Accessor::Many(call_args)];
const INDEX: &[Accessor<Lua>] = &[Accessor::One(index_table), Accessor::One(index_key)];
const TABLE: &[Accessor<Lua>] = &[Accessor::Many(table_fields)];
const FIELD: &[Accessor<Lua>] = &[Accessor::One(field_key), Accessor::One(field_value)];
const BINARY: &[Accessor<Lua>] = &[Accessor::One(binary_lhs), Accessor::One(binary_rhs)];
const PAREN: &[Accessor<Lua>] = &[Accessor::One(paren_inner)];
const LEAF: &[Accessor<Lua>] = &[];

const CHUNK_FORMAT: &[FormatElement] = &[Lines(0)];
const LOCAL_FORMAT: &[FormatElement] =
    &[Word("local"), Child(0), Present(1, &[Op("="), Child(1)])];
const ASSIGN_FORMAT: &[FormatElement] = &[Child(0), Op("="), Child(1)];
const RETURN_FORMAT: &[FormatElement] = &[Word("return"), Commas(0)];
const DO_FORMAT: &[FormatElement] = &[Word("do"), Indent, Lines(0), Dedent, Newline, Word("end")];
const FUNCTION_FORMAT: &[FormatElement] = &[
    Word("function"),
    Punct("("),
    Commas(0),
    Punct(")"),
    Indent,
    Lines(1),
    Dedent,
    Newline,
    Word("end"),
];
const CALL_FORMAT: &[FormatElement] = &[Child(0), Punct("("), Commas(1), Punct(")")];
const INDEX_FORMAT: &[FormatElement] = &[Child(0), Punct("["), Child(1), Punct("]")];
const TABLE_FORMAT: &[FormatElement] = &[Punct("{"), Commas(0), Punct("}")];
const FIELD_FORMAT: &[FormatElement] = &[Punct("["), Child(0), Punct("]"), Op("="), Child(1)];
const BINARY_FORMAT: &[FormatElement] = &[Child(0), OpText, Child(1)];
const PAREN_FORMAT: &[FormatElement] = &[Punct("("), Child(0), Punct(")")];
const LEAF_FORMAT: &[FormatElement] = &[Text];

impl OutTree for Lua {
    fn child_accessors(&self) -> &'static [Accessor<Self>] {
        match self {
            Self::Chunk { .. } => CHUNK,
            Self::Local { .. } => LOCAL,
            Self::Assign { .. } => ASSIGN,
            Self::Return { .. } => RETURN,
            Self::Do { .. } => DO,
            Self::Function { .. } => FUNCTION,
            Self::Call { .. } => CALL,
            Self::Index { .. } => INDEX,
            Self::Table { .. } => TABLE,
            Self::Field { .. } => FIELD,
            Self::Binary { .. } => BINARY,
            Self::Paren { .. } => PAREN,
            Self::Name { .. }
            | Self::Str { .. }
            | Self::Int { .. }
            | Self::Float { .. }
            | Self::Bool { .. }
            | Self::Nil { .. } => LEAF,
        }
    }

    fn pos(&self) -> &Position {
        match self {
            Self::Chunk { pos, .. }
            | Self::Local { pos, .. }
            | Self::Assign { pos, .. }
            | Self::Return { pos, .. }
            | Self::Do { pos, .. }
            | Self::Function { pos, .. }
            | Self::Call { pos, .. }
            | Self::Index { pos, .. }
            | Self::Table { pos, .. }
            | Self::Field { pos, .. }
            | Self::Binary { pos, .. }
            | Self::Paren { pos, .. }
            | Self::Name { pos, .. }
            | Self::Str { pos, .. }
            | Self::Int { pos, .. }
            | Self::Float { pos, .. }
            | Self::Bool { pos, .. }
            | Self::Nil { pos } => pos,
        }
    }

    fn format_elements(&self) -> &'static [FormatElement] {
        match self {
            Self::Chunk { .. } => CHUNK_FORMAT,
            Self::Local { .. } => LOCAL_FORMAT,
            Self::Assign { .. } => ASSIGN_FORMAT,
            Self::Return { .. } => RETURN_FORMAT,
            Self::Do { .. } => DO_FORMAT,
            Self::Function { .. } => FUNCTION_FORMAT,
            Self::Call { .. } => CALL_FORMAT,
            Self::Index { .. } => INDEX_FORMAT,
            Self::Table { .. } => TABLE_FORMAT,
            Self::Field { .. } => FIELD_FORMAT,
            Self::Binary { .. } => BINARY_FORMAT,
            Self::Paren { .. } => PAREN_FORMAT,
            Self::Name { .. }
            | Self::Str { .. }
            | Self::Int { .. }
            | Self::Float { .. }
            | Self::Bool { .. }
            | Self::Nil { .. } => LEAF_FORMAT,
        }
    }

    fn token_text(&self) -> Option<Cow<'_, str>> {
        let text = match self {
            Self::Name { name, .. } => Cow::Borrowed(name.as_str()),
            Self::Str { value, .. } => Cow::Owned(quote(value)),
            Self::Int { value, .. } => Cow::Owned(value.to_string()),
            Self::Float { value, .. } => Cow::Owned(float(*value)),
            Self::Bool { value, .. } => Cow::Borrowed(if *value { "true" } else { "false" }),
            Self::Nil { .. } => Cow::Borrowed("nil"),
            Self::Binary { op, .. } => Cow::Borrowed(*op),
            _ => return None,
        };
        Some(text)
    }
}

/// A double-quoted Lua string literal.
pub fn quote(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\t' => out.push_str("\\t"),
            c if c.is_control() => {
                let mut buf = [0; 4];
                for byte in c.encode_utf8(&mut buf).bytes() {
                    let _ = write!(out, "\\{byte:03}");
                }
            }
            c => out.push(c),
        }
    }
    out.push('"');
    out
}

fn float(value: f64) -> String {
    if value.is_nan() {
        "(0/0)".to_owned()
    } else if value.is_infinite() {
        let sign = if value < 0.0 { "-" } else { "" };
        format!("{sign}math.huge")
    } else {
        // Debug keeps the fraction, so the value stays a float in Lua.
        format!("{value:?}")
    }
}

const KEYWORDS: &[&str] = &[
    "and", "break", "do", "else", "elseif", "end", "false", "for", "function", "goto", "if", "in",
    "local", "nil", "not", "or", "repeat", "return", "then", "true", "until", "while",
];

/// `name` as a Lua identifier: other characters become `_`, and keywords
/// and leading digits get a `_` prefix.
pub fn identifier(name: &str) -> String {
    let mut out = name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() || c == '_' { c } else { '_' })
        .collect::<String>();
    if out.is_empty() || out.starts_with(|c: char| c.is_ascii_digit()) || KEYWORDS.contains(&&*out)
    {
        out.insert(0, '_');
    }
    out
}
