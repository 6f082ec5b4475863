//! Lowers finished trees into the Lua output grammar.

use weft_out::lua::{Lua, identifier};
use weft_span::{CodeLocation, Position};
use weft_tree::{Name, NodeId, NodeKind, Symbol, Tree, Value};

/// One chunk per module. Declarations marked `\export` are returned as a
/// table, which is what `require` hands to importers.
pub(crate) fn chunk(tree: &Tree) -> Lua {
    let lower = Lower { tree };
    let root = tree.root();
    let mut body =
        tree.children(root).iter().map(|&node| lower.statement(node)).collect::<Vec<_>>();
    let exports = lower.exports();
    if !exports.is_empty() {
        let pos = tree.pos(root).right_edge();
        let fields = exports
            .into_iter()
            .map(|(pos, name)| Lua::Field {
                pos: pos.clone(),
                key: Box::new(Lua::str(pos.clone(), name.base())),
                value: Box::new(lower_name(&pos, name)),
            })
            .collect();
        body.push(Lua::Return { pos: pos.clone(), values: vec![Lua::Table { pos, fields }] });
    }
    Lua::Chunk { pos: tree.pos(root).clone(), body }
}

/// `a/b.wf` is required as `a.b`.
pub(crate) fn module_name(loc: &CodeLocation) -> String {
    let path = loc.as_str();
    let (dir, file) = path.rsplit_once('/').unwrap_or(("", path));
    let stem = file_stem(file);
    let mut name = dir.replace('/', ".");
    if !name.is_empty() {
        name.push('.');
    }
    name.push_str(stem);
    name
}

/// `x.a.wf` has the stem `x.a`, the same one the scheduler keys it by.
pub(crate) fn file_stem(file: &str) -> &str {
    match file.rsplit_once('.') {
        Some((stem, _)) if !stem.is_empty() => stem,
        _ => file,
    }
}

struct Lower<'t> {
    tree: &'t Tree,
}

impl Lower<'_> {
    fn exports(&self) -> Vec<(Position, &Name)> {
        let tree = self.tree;
        tree.children(tree.root())
            .iter()
            .filter(|&&decl| tree.metadata(decl, &Symbol::EXPORT).is_some())
            .filter_map(|&decl| {
                let pattern = tree.decl_pattern(decl)?;
                Some((tree.pos(decl).clone(), tree.name_of(pattern)?))
            })
            .collect()
    }

    fn statement(&self, node: NodeId) -> Lua {
        let pos = self.tree.pos(node).clone();
        match self.tree.kind(node) {
            NodeKind::Decl => self.decl(node),
            NodeKind::Call => self.call(node),
            NodeKind::Block => Lua::Do { pos, body: self.statements(node) },
            NodeKind::Error => self.error(node),
            _ => Lua::local(pos.clone(), Lua::name(pos, "_"), Some(self.expression(node))),
        }
    }

    fn statements(&self, block: NodeId) -> Vec<Lua> {
        self.tree.children(block).iter().map(|&node| self.statement(node)).collect()
    }

    fn decl(&self, decl: NodeId) -> Lua {
        let tree = self.tree;
        let pos = tree.pos(decl).clone();
        let Some(name) = tree.decl_pattern(decl).and_then(|pattern| tree.name_of(pattern)) else {
            return self.error(decl);
        };
        let value = tree.metadata(decl, &Symbol::INIT).map(|init| self.expression(init));
        Lua::local(pos.clone(), lower_name(&pos, name), value)
    }

    fn expression(&self, node: NodeId) -> Lua {
        let tree = self.tree;
        let pos = tree.pos(node).clone();
        match tree.kind(node) {
            NodeKind::Call => self.call(node),
            NodeKind::Block => {
                let function = Lua::Function {
                    pos: pos.clone(),
                    params: Vec::new(),
                    body: self.body(tree.children(node)),
                };
                let callee = Lua::Paren { pos: pos.clone(), inner: Box::new(function) };
                Lua::call(pos, callee, Vec::new())
            }
            NodeKind::Fun => {
                let Some((&body, params)) = tree.children(node).split_last() else {
                    return self.error(node);
                };
                let params = params.iter().map(|&param| self.expression(param)).collect();
                let body = match tree.kind(body) {
                    NodeKind::Block => self.body(tree.children(body)),
                    _ => self.body(&[body]),
                };
                Lua::Function { pos, params, body }
            }
            NodeKind::LeftName(name) | NodeKind::RightName(name) => lower_name(&pos, name),
            NodeKind::Value(value) => lower_value(&pos, value),
            NodeKind::Decl
            | NodeKind::Destructure
            | NodeKind::Wildcard
            | NodeKind::Stay(_)
            | NodeKind::Esc { .. }
            | NodeKind::Error => self.error(node),
        }
    }

    /// Statements of a function body, returning the last expression.
    fn body(&self, nodes: &[NodeId]) -> Vec<Lua> {
        let Some((&last, init)) = nodes.split_last() else {
            return Vec::new();
        };
        let mut body = init.iter().map(|&node| self.statement(node)).collect::<Vec<_>>();
        match self.tree.kind(last) {
            NodeKind::Decl | NodeKind::Block | NodeKind::Error => body.push(self.statement(last)),
            _ => {
                let pos = self.tree.pos(last).clone();
                body.push(Lua::Return { pos, values: vec![self.expression(last)] });
            }
        }
        body
    }

    fn call(&self, call: NodeId) -> Lua {
        let pos = self.tree.pos(call).clone();
        let Some((&callee, args)) = self.tree.children(call).split_first() else {
            return self.error(call);
        };
        let args = args.iter().map(|&arg| self.expression(arg)).collect();
        Lua::call(pos, self.expression(callee), args)
    }

    /// Code that did not compile raises when reached.
    fn error(&self, node: NodeId) -> Lua {
        let pos = self.tree.pos(node).clone();
        let message = format!("{pos}: does not compile: {}", self.tree.dump(node));
        let message = Lua::str(pos.clone(), message);
        Lua::call(pos.clone(), Lua::name(pos, "error"), vec![message])
    }
}

fn lower_name(pos: &Position, name: &Name) -> Lua {
    match name {
        Name::Source(text) => Lua::name(pos.clone(), identifier(text)),
        Name::Temporary { base, uid } => {
            Lua::name(pos.clone(), identifier(&format!("{base}_{uid}")))
        }
        Name::Exported { module, name } => {
            let module = Lua::str(pos.clone(), module_name(module));
            let callee = Lua::name(pos.clone(), "require");
            let require = Lua::call(pos.clone(), callee, vec![module]);
            Lua::Index {
                pos: pos.clone(),
                table: Box::new(require),
                key: Box::new(Lua::str(pos.clone(), &**name)),
            }
        }
    }
}

fn lower_value(pos: &Position, value: &Value) -> Lua {
    let pos = pos.clone();
    match value {
        Value::Void | Value::StayRef(_) => Lua::Nil { pos },
        Value::Bool(value) => Lua::Bool { pos, value: *value },
        Value::Int(value) => Lua::Int { pos, value: *value },
        Value::Float(value) => Lua::Float { pos, value: *value },
        Value::Str(text) => Lua::str(pos, &**text),
        Value::Symbol(symbol) => Lua::str(pos, symbol.as_str()),
        Value::List(items) => {
            let fields = items.iter().map(|item| lower_value(&pos, item)).collect();
            Lua::Table { pos, fields }
        }
    }
}

#[cfg(test)]
mod tests {
    use expect_test::{Expect, expect};
    use weft_rewrite::Stage;
    use weft_span::{CodeLocation, FilePath};
    use weft_stage::Scheduler;
    use weft_tree::{Tree, sexpr};

    use super::*;

    #[track_caller]
    fn check(text: &str, expect: Expect) {
        let loc = CodeLocation::new("m.wf");
        let cst = sexpr::parse(&loc, text).unwrap();
        let tree = Tree::from_cst(loc, &cst);
        expect.assert_eq(&weft_out::format(&chunk(&tree)));
    }

    #[test]
    fn declarations_and_calls() {
        check(
            r#"(let x 1) (let name "Earth") (print (greet name) \loud) (let end x)"#,
            expect![[r#"
                local x = 1
                local name = "Earth"
                print(greet(name), "loud")
                local _end = x
            "#]],
        );
    }

    #[test]
    fn functions_return_their_last_expression() {
        check(
            "(let add (fn (a b) (block (let c (plus a b)) (double c)))) (let id (fn (x) x))",
            expect![[r#"
                local add = function(a, b)
                  local c = plus(a, b)
                  return double(c)
                end
                local id = function(x)
                  return x
                end
            "#]],
        );
    }

    #[test]
    fn blocks() {
        check(
            "(block (f)) (let y (block (let z 2) z)) 3",
            expect![[r#"
                do
                  f()
                end
                local y = (function()
                  local z = 2
                  return z
                end)()
                local _ = 3
            "#]],
        );
    }

    #[test]
    fn exports_are_returned() {
        let mut scheduler = Scheduler::new();
        let loc = CodeLocation::new("m.wf");
        let cst = sexpr::parse(&loc, "(@export (let answer 42)) (let hidden 0)").unwrap();
        let id = scheduler.add_module(FilePath::file(["m.wf"]).unwrap(), Tree::from_cst(loc, &cst));
        assert!(scheduler.run_until(Stage::Run).is_clean());

        expect![[r#"
            local answer = 42
            local hidden = 0
            return {["answer"] = answer}
        "#]]
        .assert_eq(&weft_out::format(&chunk(scheduler.module(id).tree())));
    }

    #[test]
    fn exported_names_are_required() {
        let loc = CodeLocation::new("m.wf");
        let tree = Tree::from_cst(loc.clone(), &sexpr::parse(&loc, "").unwrap());
        let pos = tree.pos(tree.root()).clone();
        let name = Name::Exported { module: CodeLocation::new("lib/m.wf"), name: "b".into() };
        let lua = lower_name(&pos, &name);
        assert_eq!(weft_out::format(&lua), "require(\"lib.m\")[\"b\"]\n");
    }

    #[test]
    fn unsupported_nodes_raise() {
        check(
            "(let {a b} 1)",
            expect![[r#"
                error("m.wf+0-13: does not compile: (Decl (Destructure a b) \\init 1)")
            "#]],
        );
    }

    #[test]
    fn module_names() {
        assert_eq!(module_name(&CodeLocation::new("earth.wf")), "earth");
        assert_eq!(module_name(&CodeLocation::new("lib/std/io.wf")), "lib.std.io");
        assert_eq!(module_name(&CodeLocation::new("noext")), "noext");
        assert_eq!(module_name(&CodeLocation::new("app/x.a.wf")), "app.x.a");
    }
}
