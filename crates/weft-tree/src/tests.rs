use expect_test::expect;
use weft_span::{CodeLocation, FilePath, FilePathError, Position};

use crate::{
    Cst, CstPart, CstToken, FilePathDecodeError, Name, NodeId, NodeKind, Operator, Order,
    StayError, Symbol, TokenKind, Tree, Value, VisitCue, VisitError, Walked, flatten, fold, walk,
};

fn loc() -> CodeLocation {
    CodeLocation::new("test")
}

fn token(kind: TokenKind, text: &str, left: u32) -> Cst {
    let right = left + text.len() as u32;
    Cst::Leaf(CstToken { kind, text: text.into(), pos: Position::new(loc(), left, right) })
}

fn word(text: &str) -> Cst {
    token(TokenKind::Word, text, 0)
}

fn int(value: i64) -> Cst {
    token(TokenKind::Int, &value.to_string(), 0)
}

fn string(text: &str) -> Cst {
    token(TokenKind::Str, text, 0)
}

fn inner(operator: Operator, operands: Vec<Cst>) -> Cst {
    let fallback = Position::new(loc(), 0, 0);
    let pos = Position::union_all(operands.iter().map(Cst::pos), &fallback);
    Cst::Inner { operator, operands, pos }
}

fn root(operands: Vec<Cst>) -> Cst {
    inner(Operator::Root, operands)
}

fn tree_of(operands: Vec<Cst>) -> Tree {
    Tree::from_cst(loc(), &root(operands))
}

/// `(Block (Decl x \init (Call f 1)))`
fn small_tree() -> Tree {
    tree_of(vec![inner(
        Operator::Let,
        vec![word("x"), inner(Operator::Call, vec![word("f"), int(1)])],
    )])
}

fn pos(left: u32, right: u32) -> Position {
    Position::new(loc(), left, right)
}

#[test]
fn flatten_brackets_every_inner_node() {
    let cst = root(vec![inner(
        Operator::Let,
        vec![word("x"), inner(Operator::Call, vec![word("f"), int(1)])],
    )]);
    let parts = flatten(&cst);
    let rendered = parts
        .iter()
        .map(|part| match part {
            CstPart::LeftParenthesis { operator, .. } => format!("({operator:?}"),
            CstPart::Token(token) => token.text.to_string(),
            CstPart::RightParenthesis { .. } => ")".to_owned(),
        })
        .collect::<Vec<_>>()
        .join(" ");
    expect!["(Root (Let x (Call f 1 ) ) )"].assert_eq(&rendered);

    let Some(CstPart::LeftParenthesis { pos, .. }) = parts.first() else { panic!() };
    assert_eq!(*pos, cst.pos().left_edge());
    let Some(CstPart::RightParenthesis { operator, pos }) = parts.last() else { panic!() };
    assert_eq!(*operator, Operator::Root);
    assert_eq!(*pos, cst.pos().right_edge());

    let mut depth = 0i32;
    for part in &parts {
        match part {
            CstPart::LeftParenthesis { .. } => depth += 1,
            CstPart::RightParenthesis { .. } => depth -= 1,
            CstPart::Token(_) => assert!(depth > 0),
        }
        assert!(depth >= 0);
    }
    assert_eq!(depth, 0);
}

#[test]
fn from_cst_reduces_declarations() {
    let tree = tree_of(vec![
        inner(Operator::Let, vec![word("world"), string("Earth")]),
        inner(Operator::Let, vec![word("n"), word("Int"), int(3)]),
        inner(Operator::Let, vec![word("broken")]),
        inner(
            Operator::Decorate,
            vec![word("export"), inner(Operator::Let, vec![word("x"), int(1)])],
        ),
        inner(
            Operator::Let,
            vec![
                inner(Operator::Curly, vec![word("a"), token(TokenKind::Star, "*", 0)]),
                inner(Operator::Call, vec![word("import"), string("./m")]),
            ],
        ),
        inner(
            Operator::Fun,
            vec![
                word("a"),
                word("b"),
                inner(Operator::Call, vec![word("add"), word("a"), word("b")]),
            ],
        ),
    ]);
    let dumps = tree.children(tree.root()).iter().map(|&n| tree.dump(n)).collect::<Vec<_>>();
    expect![[r#"
        (Decl world \init "Earth")
        (Decl n \type Int \init 3)
        (Error broken)
        (Call @export (Decl x \init 1))
        (Decl (Destructure a *) \init (Call import "./m"))
        (Fun a b (Call add a b))"#]]
    .assert_eq(&dumps.join("\n"));

    let decl = tree.children(tree.root())[1];
    assert!(matches!(tree.kind(tree.decl_pattern(decl).unwrap()), NodeKind::LeftName(_)));
    assert_eq!(tree.dump(tree.metadata(decl, &Symbol::TYPE).unwrap()), "Int");
    assert_eq!(tree.metadata_key_index(decl, &Symbol::INIT), Some(3));
    assert_eq!(tree.metadata(decl, &Symbol::STAY), None);

    let call = tree.children(tree.root())[3];
    assert_eq!(tree.callee_name(call), Some(&Name::source("@export")));
}

#[test]
fn pre_order_visits_parents_first() {
    let tree = small_tree();
    let mut seen = Vec::new();
    let walked = walk(&tree, tree.root(), Order::Pre, |tree, node| {
        seen.push(tree.kind(node).name());
        VisitCue::Continue
    });
    assert_eq!(walked, Ok(Walked::Completed));
    expect!["Block Decl LeftName Value Call RightName Value"].assert_eq(&seen.join(" "));
}

#[test]
fn post_order_visits_children_first() {
    let tree = small_tree();
    let mut seen: Vec<NodeId> = Vec::new();
    let walked = walk(&tree, tree.root(), Order::Post, |tree, node| {
        assert!(tree.children(node).iter().all(|child| seen.contains(child)));
        seen.push(node);
        VisitCue::Continue
    });
    assert_eq!(walked, Ok(Walked::Completed));
    let names = seen.iter().map(|&n| tree.kind(n).name()).collect::<Vec<_>>();
    expect!["LeftName Value RightName Value Call Decl Block"].assert_eq(&names.join(" "));
}

#[test]
fn visit_count_is_one_plus_children() {
    let tree = small_tree();
    fn count(tree: &Tree, node: NodeId, order: Order) -> usize {
        let mut n = 0;
        walk(tree, node, order, |_, _| {
            n += 1;
            VisitCue::Continue
        })
        .unwrap();
        n
    }
    for order in [Order::Pre, Order::Post] {
        let mut stack = vec![tree.root()];
        while let Some(node) = stack.pop() {
            let children = tree.children(node);
            let expected = 1 + children.iter().map(|&c| count(&tree, c, order)).sum::<usize>();
            assert_eq!(count(&tree, node, order), expected);
            stack.extend(children);
        }
    }
}

#[test]
fn skip_and_stop_cues() {
    let tree = small_tree();
    let mut seen = 0;
    let walked = walk(&tree, tree.root(), Order::Pre, |tree, node| {
        seen += 1;
        if *tree.kind(node) == NodeKind::Decl { VisitCue::SkipOne } else { VisitCue::Continue }
    });
    assert_eq!((walked, seen), (Ok(Walked::Completed), 2));

    let mut seen = 0;
    let walked = walk(&tree, tree.root(), Order::Pre, |_, _| {
        seen += 1;
        if seen == 3 { VisitCue::AllDone } else { VisitCue::Continue }
    });
    assert_eq!((walked, seen), (Ok(Walked::Stopped), 3));

    let first_leaf = tree.decl_pattern(tree.children(tree.root())[0]).unwrap();
    let walked = walk(&tree, tree.root(), Order::Post, |_, _| VisitCue::SkipOne);
    assert_eq!(walked, Err(VisitError::SkipInPostOrder(first_leaf)));
}

#[test]
fn fold_combines_in_visit_order() {
    let tree = small_tree();
    let names = fold(
        &tree,
        tree.root(),
        Order::Post,
        |tree, node| (VisitCue::Continue, tree.name_of(node).map(ToString::to_string)),
        |acc, next| format!("{acc},{next}"),
    );
    assert_eq!(names, Ok(Some("x,f".to_owned())));

    let ints = fold(
        &tree,
        tree.root(),
        Order::Pre,
        |tree, node| match tree.value_of(node) {
            Some(Value::Int(_)) => (VisitCue::Continue, Some(1)),
            _ => (VisitCue::Continue, None),
        },
        |a, b| a + b,
    );
    assert_eq!(ints, Ok(Some(1)));
}

fn numbered_block(n: i64) -> Tree {
    let mut tree = Tree::new(loc(), pos(0, 100));
    let root = tree.root();
    tree.replace(root, 0..0, |b| {
        for i in 0..n {
            let left = i as u32 * 10;
            b.value(Value::Int(i), pos(left, left + 1));
        }
    });
    tree
}

#[test]
fn replace_splices_range_atomically() {
    let mut tree = numbered_block(4);
    let root = tree.root();
    let old = tree.children(root).to_vec();

    let inserted = tree.replace(root, 1..3, |b| {
        b.value(Value::Int(10), pos(10, 11));
        b.node(NodeKind::Call, |b| {
            b.right_name(Name::source("f"), pos(12, 13));
            b.value(Value::Int(11), pos(14, 15));
        });
        b.value(Value::Int(12), pos(20, 21));
    });

    expect!["(Block 0 10 (Call f 11) 12 3)"].assert_eq(&tree.dump(root));
    let children = tree.children(root);
    assert_eq!(children[0], old[0]);
    assert_eq!(children[4], old[3]);
    assert_eq!(&children[1..4], inserted.as_slice());
    for &child in children {
        assert_eq!(tree.parent(child), Some(root));
    }
    assert_eq!(*tree.pos(inserted[1]), pos(12, 15));
    assert!(!tree.is_attached(old[1]));
    assert_eq!(tree.parent(old[2]), None);
}

#[test]
fn empty_synthesized_node_sits_at_range_edge() {
    let mut tree = numbered_block(2);
    let root = tree.root();
    let inserted = tree.replace(root, 1..1, |b| b.node(NodeKind::Block, |_| {}));
    assert_eq!(*tree.pos(inserted[0]), pos(10, 10));
    let appended = tree.replace(root, 3..3, |b| b.node(NodeKind::Block, |_| {}));
    assert_eq!(*tree.pos(appended[0]), pos(100, 100));
}

#[test]
fn graft_moves_removed_subtrees() {
    let mut tree = numbered_block(3);
    let root = tree.root();
    let old = tree.children(root).to_vec();
    tree.replace(root, 0..2, |b| {
        b.node(NodeKind::Call, |b| {
            b.right_name(Name::source("pair"), pos(0, 0));
            b.graft(old[1]);
            b.graft(old[0]);
        });
    });
    expect!["(Block (Call pair 1 0) 2)"].assert_eq(&tree.dump(root));
    assert_eq!(tree.ancestors(old[0]).collect::<Vec<_>>(), [tree.children(root)[0], root]);
    assert!(tree.is_attached(old[0]));
}

#[test]
fn graft_from_inside_removed_subtree() {
    let mut tree = small_tree();
    let root = tree.root();
    let decl = tree.children(root)[0];
    let call = tree.metadata(decl, &Symbol::INIT).unwrap();
    tree.replace(root, 0..1, |b| b.graft(call));
    expect!["(Block (Call f 1))"].assert_eq(&tree.dump(root));
    expect!["(Decl x \\init)"].assert_eq(&tree.dump(decl));
}

#[test]
#[should_panic(expected = "still attached")]
fn graft_of_attached_node_panics() {
    let mut tree = numbered_block(3);
    let root = tree.root();
    let keep = tree.children(root)[2];
    tree.replace(root, 0..1, |b| b.graft(keep));
}

#[test]
#[should_panic(expected = "Marker must be completed")]
fn unfinished_marker_panics() {
    let mut tree = numbered_block(1);
    let root = tree.root();
    tree.replace(root, 0..0, |b| {
        let _m = b.start(NodeKind::Block);
    });
}

#[test]
fn deep_copy_is_detached_and_equal() {
    let mut tree = small_tree();
    let decl = tree.children(tree.root())[0];
    let (copy, map) = tree.deep_copy_with_map(decl);
    assert_eq!(tree.dump(copy), tree.dump(decl));
    assert_eq!(tree.parent(copy), None);
    assert!(!tree.is_attached(copy));
    assert_eq!(map[&decl], copy);
    assert_eq!(map.len(), 6);
    for (&original, &copied) in &map {
        assert_ne!(original, copied);
        assert_eq!(tree.pos(original), tree.pos(copied));
    }
}

#[test]
fn stay_lifecycle() {
    let mut tree = small_tree();
    let root = tree.root();
    let mut stay = None;
    let decl = tree.replace(root, 1..1, |b| {
        b.node(NodeKind::Decl, |b| {
            b.left_name(Name::source("y"), pos(0, 1));
            b.symbol(Symbol::STAY, pos(1, 1));
            stay = Some(b.stay(pos(1, 1)));
        });
    })[0];
    let stay = stay.unwrap();
    let leaf = tree.metadata(decl, &Symbol::STAY).unwrap();
    assert_eq!(tree.find_stay(stay), Some(leaf));
    assert_eq!(tree.unconsumed_stays(), [(stay, leaf)]);

    let (copy, map) = tree.deep_copy_with_map(decl);
    let NodeKind::Stay(copied) = *tree.kind(map[&leaf]) else { panic!() };
    assert_ne!(copied, stay);
    assert_eq!(tree.find_stay(copied), None, "copy is detached");
    assert_eq!(tree.parent(copy), None);

    assert_eq!(tree.consume_stay(stay), Ok(()));
    assert_eq!(tree.consume_stay(stay), Err(StayError::AlreadyConsumed(stay)));
    assert!(tree.unconsumed_stays().is_empty());

    tree.replace(root, 1..2, |_| {});
    assert_eq!(tree.find_stay(stay), None);
}

#[test]
fn structured_view() {
    let tree = tree_of(vec![inner(Operator::Call, vec![word("f"), int(1)])]);
    let call = tree.children(tree.root())[0];
    let json = weft_structured::to_json(&tree.view(call));
    assert_eq!(json["kind"], "Call");
    assert_eq!(json["children"][0]["leaf"], "f");
    assert_eq!(json["children"][1]["leaf"], "1");
}

#[test]
fn file_path_transport() {
    let path = FilePath::file(["a", "b.weft"]).unwrap();
    let value = Value::from(&path);
    expect![[r#"["f", "a", "b.weft"]"#]].assert_eq(&value.to_string());
    assert_eq!(FilePath::try_from(&value), Ok(path));

    let dir = FilePath::dir(["lib"]).unwrap();
    assert_eq!(FilePath::try_from(&Value::from(&dir)), Ok(dir));
    assert_eq!(FilePath::try_from(&Value::from(&FilePath::root())), Ok(FilePath::root()));
}

#[test]
fn file_path_transport_rejects_bad_values() {
    let list = |items: Vec<Value>| Value::List(items.into());
    assert_eq!(FilePath::try_from(&Value::str("a")), Err(FilePathDecodeError::NotAList));
    assert_eq!(FilePath::try_from(&list(vec![])), Err(FilePathDecodeError::MissingTag));
    assert_eq!(
        FilePath::try_from(&list(vec![Value::str("x")])),
        Err(FilePathDecodeError::UnknownTag("x".to_owned()))
    );
    assert_eq!(
        FilePath::try_from(&list(vec![Value::str("f"), Value::Int(1)])),
        Err(FilePathDecodeError::NonStringSegment(0))
    );
    assert_eq!(
        FilePath::try_from(&list(vec![Value::str("d"), Value::str("..")])),
        Err(FilePathDecodeError::BadSegment(FilePathError::Reserved("..".to_owned())))
    );
    assert_eq!(
        FilePath::try_from(&list(vec![Value::str("d"), Value::str("")])),
        Err(FilePathDecodeError::BadSegment(FilePathError::Empty))
    );
}
