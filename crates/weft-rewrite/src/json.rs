use weft_errors::MessageTemplate;
use weft_span::Position;
use weft_tree::{Name, NodeKind, Symbol, TreeBuilder, Value};

use crate::engine::{Fail, Macro, MacroEnv, MacroOutcome};
use crate::stage::Stage;

/// `@json` on `let T = struct(\field Type ...)`.
///
/// Keeps the type declaration, marks it `\json`, and declares
/// `encodeTJson` and `decodeTJson` next to it. Field codecs follow the same
/// naming scheme, so `\age Int` is encoded with `encodeIntJson`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonDecorator;

impl Macro for JsonDecorator {
    fn expand(&self, env: &mut MacroEnv<'_>) -> MacroOutcome {
        match json(env) {
            Ok(outcome) => outcome,
            Err(fail) => fail.into(),
        }
    }
}

struct Field {
    name: Symbol,
    ty: String,
}

fn malformed(env: &MacroEnv<'_>, reason: &str) -> Fail {
    env.fail(MessageTemplate::MalformedJsonType { reason: reason.to_owned() })
}

fn json(env: &mut MacroEnv<'_>) -> Result<MacroOutcome, Fail> {
    env.check_arity(1)?;
    if env.stage() < Stage::Define {
        return Ok(MacroOutcome::NotYet);
    }
    let tree = env.tree();
    let decl = env.args()[0];
    if *tree.kind(decl) != NodeKind::Decl {
        return Err(env.fail(MessageTemplate::ExpectedDeclaration));
    }
    let type_name = match tree.decl_pattern(decl).map(|pattern| tree.kind(pattern)) {
        Some(NodeKind::LeftName(Name::Source(name))) => name.clone(),
        _ => return Err(malformed(env, "the type needs a simple name")),
    };
    let Some(init) = tree.metadata(decl, &Symbol::INIT) else {
        return Err(malformed(env, "the type has no definition"));
    };
    if tree.callee_name(init) != Some(&Name::source("struct")) {
        return Err(malformed(env, "only `struct(...)` types derive JSON interop"));
    }
    let args = &tree.children(init)[1..];
    if args.len() % 2 != 0 {
        return Err(malformed(env, "fields must be `\\name Type` pairs"));
    }
    let mut fields = Vec::with_capacity(args.len() / 2);
    for pair in args.chunks(2) {
        let name = tree.value_of(pair[0]).and_then(Value::as_symbol).cloned();
        let ty = match tree.kind(pair[1]) {
            NodeKind::RightName(Name::Source(ty)) => Some(ty.to_string()),
            _ => None,
        };
        let (Some(name), Some(ty)) = (name, ty) else {
            return Err(malformed(env, "fields must be `\\name Type` pairs"));
        };
        fields.push(Field { name, ty });
    }
    let in_block =
        tree.parent(env.call()).is_some_and(|parent| *tree.kind(parent) == NodeKind::Block);
    if !in_block {
        return Err(malformed(env, "`@json` must decorate a statement"));
    }

    let children = tree.children(decl).to_vec();
    let decl_pos = tree.pos(decl).clone();
    let pos = env.call_pos().right_edge();
    let value = env.names().fresh("value");
    let json = env.names().fresh("json");
    tracing::debug!(%type_name, fields = fields.len(), "deriving json interop");

    env.replace_call(|b| {
        b.node_at(NodeKind::Decl, decl_pos, |b| {
            b.graft_all(children);
            b.symbol(Symbol::JSON, pos.clone());
            b.value(Value::Bool(true), pos.clone());
        });
        function(b, &format!("encode{type_name}Json"), value.clone(), &pos, |b| {
            call(b, Name::source("jsonObject"), &pos, |b| {
                for field in &fields {
                    b.symbol(field.name.clone(), pos.clone());
                    call(b, Name::source(&format!("encode{}Json", field.ty)), &pos, |b| {
                        call(b, Name::source("get"), &pos, |b| {
                            b.right_name(value.clone(), pos.clone());
                            b.symbol(field.name.clone(), pos.clone());
                        });
                    });
                }
            });
        });
        function(b, &format!("decode{type_name}Json"), json.clone(), &pos, |b| {
            call(b, Name::Source(type_name.clone()), &pos, |b| {
                for field in &fields {
                    b.symbol(field.name.clone(), pos.clone());
                    call(b, Name::source(&format!("decode{}Json", field.ty)), &pos, |b| {
                        call(b, Name::source("jsonField"), &pos, |b| {
                            b.right_name(json.clone(), pos.clone());
                            b.symbol(field.name.clone(), pos.clone());
                        });
                    });
                }
            });
        });
    });
    Ok(MacroOutcome::Done)
}

/// `let name = fn(param) body`
fn function(
    b: &mut TreeBuilder<'_>,
    name: &str,
    param: Name,
    pos: &Position,
    body: impl FnOnce(&mut TreeBuilder<'_>),
) {
    b.node_at(NodeKind::Decl, pos.clone(), |b| {
        b.left_name(Name::source(name), pos.clone());
        b.symbol(Symbol::INIT, pos.clone());
        b.node_at(NodeKind::Fun, pos.clone(), |b| {
            b.left_name(param, pos.clone());
            body(b);
        });
    });
}

fn call(
    b: &mut TreeBuilder<'_>,
    callee: Name,
    pos: &Position,
    args: impl FnOnce(&mut TreeBuilder<'_>),
) {
    b.node_at(NodeKind::Call, pos.clone(), |b| {
        b.right_name(callee, pos.clone());
        args(b);
    });
}
