use weft_errors::MessageTemplate;
use weft_tree::{Name, NodeKind, Symbol, Tree, Value};

use crate::engine::{Macro, MacroEnv, MacroOutcome};
use crate::imports::Export;

/// `@export` on a declaration with a simple name: unwraps the declaration
/// and marks it with `\export`.
#[derive(Debug, Default, Clone, Copy)]
pub struct ExportDecorator;

impl Macro for ExportDecorator {
    fn expand(&self, env: &mut MacroEnv<'_>) -> MacroOutcome {
        if let Err(fail) = env.check_arity(1) {
            return fail.into();
        }
        let tree = env.tree();
        let decl = env.args()[0];
        if *tree.kind(decl) != NodeKind::Decl {
            return env.fail(MessageTemplate::ExpectedDeclaration).into();
        }
        let named = tree.decl_pattern(decl).is_some_and(|pattern| {
            matches!(tree.kind(pattern), NodeKind::LeftName(Name::Source(_)))
        });
        if !named {
            let reason = "only declarations of a single name can be exported".to_owned();
            return env.fail(MessageTemplate::MalformedDeclaration { reason }).into();
        }

        let children = tree.children(decl).to_vec();
        let pos = tree.pos(decl).clone();
        let marked = tree.metadata(decl, &Symbol::EXPORT).is_some();
        let edge = pos.right_edge();
        env.replace_call(|b| {
            b.node_at(NodeKind::Decl, pos, |b| {
                b.graft_all(children);
                if !marked {
                    b.symbol(Symbol::EXPORT, edge.clone());
                    b.value(Value::Bool(true), edge);
                }
            });
        });
        MacroOutcome::Done
    }
}

/// Bindings of the top-level declarations marked `\export`.
pub fn collect_exports(tree: &Tree) -> Vec<Export> {
    let root = tree.root();
    tree.children(root)
        .iter()
        .filter(|&&decl| tree.metadata(decl, &Symbol::EXPORT).is_some())
        .filter_map(|&decl| {
            let name = match tree.kind(tree.decl_pattern(decl)?) {
                NodeKind::LeftName(name) => name.base().into(),
                _ => return None,
            };
            let value =
                tree.metadata(decl, &Symbol::INIT).and_then(|init| tree.value_of(init)).cloned();
            let type_info = tree.metadata(decl, &Symbol::TYPE).and_then(|ty| match tree.kind(ty) {
                NodeKind::Value(value) => Some(value.clone()),
                NodeKind::RightName(name) => Some(Value::str(&name.to_string())),
                _ => None,
            });
            let metadata = tree
                .metadata_entries(decl)
                .into_iter()
                .filter(|(_, key, _)| {
                    ![Symbol::INIT, Symbol::TYPE, Symbol::EXPORT, Symbol::STAY].contains(key)
                })
                .filter_map(|(_, key, value)| Some((key, tree.value_of(value)?.clone())))
                .collect();
            Some(Export {
                name,
                value,
                type_info,
                metadata,
                pos: tree.pos(decl).clone(),
                exporter: tree.loc().clone(),
            })
        })
        .collect()
}
