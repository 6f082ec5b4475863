use expect_test::expect;
use weft_out::lua::{Lua, identifier, quote};
use weft_out::{
    OutTree, any_child_depth, any_child_within_recursive, boundary_descent, child_count,
    child_or_null, children, format,
};
use weft_span::{CodeLocation, Position};

fn at(left: u32) -> Position {
    Position::new(CodeLocation::new("main"), left, left + 1)
}

fn name(text: &str) -> Lua {
    Lua::name(at(0), text)
}

fn int(value: i64) -> Lua {
    Lua::Int { pos: at(0), value }
}

fn sample() -> Lua {
    let greet = Lua::Function {
        pos: at(1),
        params: vec![name("name")],
        body: vec![Lua::Return {
            pos: at(2),
            values: vec![Lua::Binary {
                pos: at(2),
                op: "..",
                lhs: Box::new(Lua::str(at(2), "hi ")),
                rhs: Box::new(name("name")),
            }],
        }],
    };
    let field = |key: &str, value| Lua::Field {
        pos: at(3),
        key: Box::new(Lua::str(at(3), key)),
        value: Box::new(value),
    };
    let table = Lua::Table {
        pos: at(3),
        fields: vec![
            field("a", int(1)),
            field("b\n", Lua::Table { pos: at(3), fields: Vec::new() }),
        ],
    };
    Lua::Chunk {
        pos: at(0),
        body: vec![
            Lua::local(at(0), name("x"), Some(int(1))),
            Lua::local(at(1), name("greet"), Some(greet)),
            Lua::call(
                at(2),
                name("print"),
                vec![Lua::call(at(2), name("greet"), vec![Lua::str(at(2), "Earth")])],
            ),
            Lua::local(at(3), name("t"), Some(table)),
            Lua::Assign {
                pos: at(4),
                target: Box::new(Lua::Index {
                    pos: at(4),
                    table: Box::new(name("t")),
                    key: Box::new(Lua::str(at(4), "c")),
                }),
                value: Box::new(Lua::Bool { pos: at(4), value: true }),
            },
            Lua::Do { pos: at(5), body: vec![Lua::local(at(5), name("y"), None)] },
            Lua::Return { pos: at(6), values: vec![name("x"), Lua::Nil { pos: at(6) }] },
        ],
    }
}

#[test]
fn formats_a_chunk() {
    expect![[r#"
        local x = 1
        local greet = function(name)
          return "hi " .. name
        end
        print(greet("Earth"))
        local t = {["a"] = 1, ["b\n"] = {}}
        t["c"] = true
        do
          local y
        end
        return x, nil
    "#]]
    .assert_eq(&format(&sample()));
}

#[test]
fn formats_nested_blocks() {
    let inner = Lua::Function { pos: at(0), params: Vec::new(), body: Vec::new() };
    let outer = Lua::Function {
        pos: at(0),
        params: vec![name("a"), name("b")],
        body: vec![
            Lua::local(at(0), name("f"), Some(inner)),
            Lua::Return {
                pos: at(0),
                values: vec![Lua::Paren {
                    pos: at(0),
                    inner: Box::new(Lua::Table { pos: at(0), fields: vec![name("a")] }),
                }],
            },
        ],
    };
    let chunk = Lua::Chunk { pos: at(0), body: vec![Lua::local(at(0), name("g"), Some(outer))] };
    expect![[r#"
        local g = function(a, b)
          local f = function()
          end
          return({a})
        end
    "#]]
    .assert_eq(&format(&chunk));
}

/// Every node's flat child indices agree with its accessor walk.
#[track_caller]
fn check_reflection(node: &Lua) {
    let all = children(node).collect::<Vec<_>>();
    assert_eq!(child_count(node), all.len());
    for (index, child) in all.iter().enumerate() {
        let found = child_or_null(node, index).unwrap();
        assert!(std::ptr::eq(found, *child), "child {index} of {node:?}");
    }
    assert!(child_or_null(node, all.len()).is_none());
    for child in all {
        check_reflection(child);
    }
}

#[test]
fn reflection_is_consistent() {
    check_reflection(&sample());

    let without_value = Lua::local(at(0), name("y"), None);
    assert_eq!(child_count(&without_value), 1);
    let call = Lua::call(at(0), name("f"), vec![int(1), int(2)]);
    assert_eq!(child_or_null(&call, 2), Some(&int(2)));
    assert_eq!(child_count(&name("leaf")), 0);
}

#[test]
fn boundary_descent_is_breadth_first() {
    let chunk = sample();
    let names = boundary_descent(&chunk, |_| true)
        .filter_map(|node| match node {
            Lua::Name { name, .. } => Some(name.as_str()),
            _ => None,
        })
        .collect::<Vec<_>>();
    assert_eq!(names, ["x", "greet", "print", "t", "x", "name", "greet", "t", "y", "name"]);

    // Function bodies are not entered.
    let outside = boundary_descent(&chunk, |node| !matches!(node, Lua::Function { .. }))
        .filter(|node| matches!(node, Lua::Return { .. }))
        .count();
    assert_eq!(outside, 1);
}

#[test]
fn depth_queries() {
    let chunk = sample();
    let is_binary = |node: &Lua| matches!(node, Lua::Binary { .. });
    let anywhere = |_: &Lua| true;
    let outside_functions = |node: &Lua| !matches!(node, Lua::Function { .. });

    assert_eq!(any_child_depth(&chunk, anywhere, is_binary), Some(4));
    assert_eq!(any_child_depth(&chunk, outside_functions, is_binary), None);
    assert_eq!(any_child_depth(&chunk, anywhere, |node| matches!(node, Lua::Do { .. })), Some(1));

    assert!(any_child_within_recursive(&chunk, &anywhere, &is_binary));
    assert!(!any_child_within_recursive(&chunk, &outside_functions, &is_binary));
}

#[test]
fn clones_are_deep() {
    let original = sample();
    let mut copy = original.clone();
    let Lua::Chunk { body, .. } = &mut copy else { panic!() };
    body.truncate(1);
    assert_eq!(child_count(&original), 7);
    assert_eq!(child_count(&copy), 1);
    assert_eq!(copy.pos(), original.pos());
}

#[test]
fn quoting() {
    assert_eq!(quote(r#"say "hi"\"#), r#""say \"hi\"\\""#);
    assert_eq!(quote("a\u{1}b"), r#""a\001b""#);
    assert_eq!(identifier("end"), "_end");
    assert_eq!(identifier("1st"), "_1st");
    assert_eq!(identifier("value#0"), "value_0");
    assert_eq!(identifier(""), "_");

    let float = |value| Lua::Float { pos: at(0), value }.token_text().unwrap().into_owned();
    assert_eq!(float(1.0), "1.0");
    assert_eq!(float(f64::NEG_INFINITY), "-math.huge");
}
