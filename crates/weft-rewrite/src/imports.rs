//! Cross-unit bindings: what exporters publish, what importers record, and
//! how an import declaration is turned into local declarations.

use std::collections::BTreeSet;
use std::sync::Arc;

use rustc_hash::FxHashMap;
use weft_errors::{Diagnostic, LogSink, MessageTemplate};
use weft_span::{CodeLocation, Position};
use weft_structured::{Structured, Structurer};
use weft_tree::{
    Name, NameMaker, NodeId, NodeKind, StayError, StayId, Symbol, Tree, TreeBuilder, Value,
};

/// A binding published by a unit.
#[derive(Debug, Clone, PartialEq)]
pub struct Export {
    pub name: Arc<str>,
    /// Known when the exported initializer is a literal.
    pub value: Option<Value>,
    pub type_info: Option<Value>,
    /// Declaration metadata that importers copy, in declaration order.
    pub metadata: Vec<(Symbol, Value)>,
    pub pos: Position,
    pub exporter: CodeLocation,
}

impl Export {
    pub fn metadata_values<'a>(&'a self, key: &'a Symbol) -> impl Iterator<Item = &'a Value> + 'a {
        self.metadata.iter().filter(move |(k, _)| k == key).map(|(_, value)| value)
    }
}

impl Structured for Export {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| {
            o.field("name", &*self.name);
            o.key("value", |s| match &self.value {
                Some(value) => s.value(value.to_string()),
                None => s.null(),
            });
            o.key("type", |s| match &self.type_info {
                Some(value) => s.value(value.to_string()),
                None => s.null(),
            });
            o.key("metadata", |s| {
                s.obj(|o| {
                    for (key, value) in &self.metadata {
                        o.field(key.as_str(), &value.to_string());
                    }
                })
            });
            o.field("exporter", self.exporter.as_str());
        });
    }
}

/// A unit that produces bindings.
pub trait Exporter {
    fn loc(&self) -> &CodeLocation;

    /// `None` until the unit has published.
    fn exports(&self) -> Option<&[Export]>;
}

/// A unit that consumes bindings.
pub trait Importer {
    fn loc(&self) -> &CodeLocation;

    fn record_import_metadata(&mut self, record: ImportRecord);
}

/// Why an import succeeded or failed, kept for dependency-graph construction.
#[derive(Debug, Clone, PartialEq)]
pub enum ImportRecord {
    Ok {
        specifier: String,
        exporter: CodeLocation,
        imported: BTreeSet<Arc<str>>,
        /// The importer waited for the exporter's bindings.
        is_blocking_import: bool,
    },
    Unresolvable {
        specifier: String,
        reason: String,
    },
    Broken {
        specifier: String,
        exporter: CodeLocation,
        missing: Vec<Arc<str>>,
    },
}

impl ImportRecord {
    pub fn is_bad(&self) -> bool {
        !matches!(self, Self::Ok { .. })
    }

    pub fn specifier(&self) -> &str {
        match self {
            Self::Ok { specifier, .. }
            | Self::Unresolvable { specifier, .. }
            | Self::Broken { specifier, .. } => specifier,
        }
    }
}

impl Structured for ImportRecord {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| match self {
            Self::Ok { specifier, exporter, imported, is_blocking_import } => {
                o.field("kind", "ok");
                o.field("specifier", specifier);
                o.field("exporter", exporter.as_str());
                o.key("imported", |s| {
                    s.arr(|a| {
                        for name in imported {
                            a.element(&**name);
                        }
                    })
                });
                o.field("isBlockingImport", is_blocking_import);
            }
            Self::Unresolvable { specifier, reason } => {
                o.field("kind", "unresolvable");
                o.field("specifier", specifier);
                o.field("reason", reason);
            }
            Self::Broken { specifier, exporter, missing } => {
                o.field("kind", "broken");
                o.field("specifier", specifier);
                o.field("exporter", exporter.as_str());
                o.key("missing", |s| {
                    s.arr(|a| {
                        for name in missing {
                            a.element(&**name);
                        }
                    })
                });
            }
        });
    }
}

/// Published bindings of one unit, detached from the unit itself.
#[derive(Debug, Clone)]
pub struct ExportTable {
    loc: CodeLocation,
    exports: Option<Vec<Export>>,
}

impl ExportTable {
    pub fn new(loc: CodeLocation) -> Self {
        Self { loc, exports: None }
    }

    pub fn published(loc: CodeLocation, exports: Vec<Export>) -> Self {
        Self { loc, exports: Some(exports) }
    }

    pub fn publish(&mut self, exports: Vec<Export>) {
        self.exports = Some(exports);
    }

    pub fn is_published(&self) -> bool {
        self.exports.is_some()
    }
}

impl Exporter for ExportTable {
    fn loc(&self) -> &CodeLocation {
        &self.loc
    }

    fn exports(&self) -> Option<&[Export]> {
        self.exports.as_deref()
    }
}

/// The import records of one unit.
#[derive(Debug, Clone)]
pub struct ImportLedger {
    loc: CodeLocation,
    records: Vec<ImportRecord>,
}

impl ImportLedger {
    pub fn new(loc: CodeLocation) -> Self {
        Self { loc, records: Vec::new() }
    }

    pub fn records(&self) -> &[ImportRecord] {
        &self.records
    }
}

impl Importer for ImportLedger {
    fn loc(&self) -> &CodeLocation {
        &self.loc
    }

    fn record_import_metadata(&mut self, record: ImportRecord) {
        tracing::trace!(
            importer = %self.loc,
            specifier = record.specifier(),
            bad = record.is_bad(),
            "import recorded"
        );
        self.records.push(record);
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum BindError {
    #[error("{0:?} is not attached to the tree")]
    StayNotFound(StayId),
    #[error("{0:?} is not declaration metadata")]
    NotInDeclaration(StayId),
    #[error("`{0}` has not published its exports")]
    NotPublished(CodeLocation),
    #[error(transparent)]
    Stay(#[from] StayError),
}

struct Binding<'x> {
    name: Arc<str>,
    pos: Position,
    export: Option<&'x Export>,
}

/// A decorator call wrapping an import declaration, outermost first.
struct Wrapper {
    pos: Position,
    callee: NodeId,
    args: Vec<NodeId>,
}

/// Replaces the declaration holding `stay` with declarations bound to the
/// exporter's bindings.
///
/// A single name is rewritten in place. Several names (or a wildcard, which
/// adds every export not named explicitly) clone the whole decorated
/// declaration once per name; decorator arguments that are not plain names
/// or literals are evaluated once into temporaries declared before the
/// clones. User errors are logged and leave error nodes behind; the
/// returned nodes are what now stands in the declaration's place.
pub fn create_local_bindings_for_import(
    tree: &mut Tree,
    stay: StayId,
    specifier: &str,
    exporter: &dyn Exporter,
    importer: &mut dyn Importer,
    names: &mut NameMaker,
    log: &mut dyn LogSink,
) -> Result<Vec<NodeId>, BindError> {
    let leaf = tree.find_stay(stay).ok_or(BindError::StayNotFound(stay))?;
    let decl = tree
        .parent(leaf)
        .filter(|&parent| *tree.kind(parent) == NodeKind::Decl)
        .ok_or(BindError::NotInDeclaration(stay))?;
    let exports =
        exporter.exports().ok_or_else(|| BindError::NotPublished(exporter.loc().clone()))?;
    tree.consume_stay(stay)?;

    let (requested, wildcard) = match requested_names(tree, decl) {
        Ok(requested) => requested,
        Err(reason) => {
            let pos = tree.pos(decl).clone();
            log.log(Diagnostic::error(MessageTemplate::MalformedDeclaration { reason }, pos));
            return Ok(error_out(tree, decl));
        }
    };

    let mut bindings = requested
        .iter()
        .map(|(name, pos)| Binding {
            name: name.clone(),
            pos: pos.clone(),
            export: exports.iter().find(|export| export.name == *name),
        })
        .collect::<Vec<_>>();
    if wildcard {
        let pattern_pos = tree.pos(tree.children(decl)[0]).clone();
        for export in exports {
            if !requested.iter().any(|(name, _)| *name == export.name) {
                bindings.push(Binding {
                    name: export.name.clone(),
                    pos: pattern_pos.clone(),
                    export: Some(export),
                });
            }
        }
    }

    let missing = bindings
        .iter()
        .filter(|binding| binding.export.is_none())
        .map(|binding| binding.name.clone())
        .collect::<Vec<_>>();
    for binding in bindings.iter().filter(|binding| binding.export.is_none()) {
        let template = MessageTemplate::MissingExport {
            name: binding.name.to_string(),
            specifier: specifier.to_owned(),
        };
        log.log(Diagnostic::error(template, binding.pos.clone()));
    }

    let kept_metadata = tree
        .metadata_entries(decl)
        .into_iter()
        .filter(|(_, key, _)| *key != Symbol::STAY && *key != Symbol::INIT)
        .map(|(_, key, value)| (key, value))
        .collect::<Vec<_>>();
    let decl_pos = tree.pos(decl).clone();
    let source = exporter.loc().clone();

    let inserted = if let [binding] = bindings.as_slice() {
        tree.replace_node(decl, |b| emit_binding(b, &decl_pos, binding, &kept_metadata, &source))
    } else {
        if let Some(ty) = tree.metadata(decl, &Symbol::TYPE) {
            if !matches!(tree.kind(ty), NodeKind::Value(_)) {
                let pos = tree.pos(ty).clone();
                log.log(Diagnostic::error(MessageTemplate::ComplexTypeMetadataInMultiImport, pos));
                return Ok(error_out(tree, decl));
            }
        }
        let (outermost, chain) = decorator_chain(tree, decl);
        let Some(block) =
            tree.parent(outermost).filter(|&parent| *tree.kind(parent) == NodeKind::Block)
        else {
            let reason = "an import of several names must be a statement".to_owned();
            log.log(Diagnostic::error(MessageTemplate::MalformedDeclaration { reason }, decl_pos));
            return Ok(error_out(tree, outermost));
        };
        let hoisted = chain
            .iter()
            .flat_map(|wrapper| wrapper.args.iter().copied())
            .filter(|&arg| !is_simple(tree, arg))
            .map(|arg| (arg, names.fresh("t")))
            .collect::<Vec<_>>();
        let temps = hoisted.iter().cloned().collect::<FxHashMap<_, _>>();
        let index = tree.children(block).iter().position(|&c| c == outermost).unwrap_or(0);

        tree.replace(block, index..index + 1, |b| {
            for (arg, temp) in &hoisted {
                let pos = b.tree().pos(*arg).clone();
                b.node_at(NodeKind::Decl, pos.clone(), |b| {
                    b.left_name(temp.clone(), pos.left_edge());
                    b.symbol(Symbol::INIT, pos.left_edge());
                    b.graft(*arg);
                });
            }
            for binding in &bindings {
                emit_wrapped(b, &chain, &temps, &decl_pos, binding, &kept_metadata, &source);
            }
        })
    };

    let record = if missing.is_empty() {
        ImportRecord::Ok {
            specifier: specifier.to_owned(),
            exporter: source,
            imported: bindings.iter().map(|binding| binding.name.clone()).collect(),
            is_blocking_import: true,
        }
    } else {
        ImportRecord::Broken { specifier: specifier.to_owned(), exporter: source, missing }
    };
    tracing::debug!(specifier, bindings = bindings.len(), bad = record.is_bad(), "import bound");
    importer.record_import_metadata(record);
    Ok(inserted)
}

type Requested = (Vec<(Arc<str>, Position)>, bool);

fn requested_names(tree: &Tree, decl: NodeId) -> Result<Requested, String> {
    let pattern = tree.decl_pattern(decl).ok_or_else(|| "declaration has no pattern".to_owned())?;
    match tree.kind(pattern) {
        NodeKind::LeftName(name) => {
            Ok((vec![(name.base().into(), tree.pos(pattern).clone())], false))
        }
        NodeKind::Destructure => {
            let mut names = Vec::new();
            let mut wildcard = false;
            for &child in tree.children(pattern) {
                match tree.kind(child) {
                    NodeKind::LeftName(name) => {
                        names.push((name.base().into(), tree.pos(child).clone()));
                    }
                    NodeKind::Wildcard => wildcard = true,
                    kind => return Err(format!("cannot import into a {} pattern", kind.name())),
                }
            }
            Ok((names, wildcard))
        }
        kind => Err(format!("cannot import into a {} pattern", kind.name())),
    }
}

/// Walks up through decorator calls that wrap `decl`.
fn decorator_chain(tree: &Tree, decl: NodeId) -> (NodeId, Vec<Wrapper>) {
    let mut outermost = decl;
    let mut chain = Vec::new();
    while let Some(edge) = tree.edge(outermost) {
        let is_decorator = tree
            .callee_name(edge.parent)
            .is_some_and(|name| matches!(name, Name::Source(text) if text.starts_with('@')));
        if edge.index != 1 || !is_decorator {
            break;
        }
        let children = tree.children(edge.parent);
        chain.push(Wrapper {
            pos: tree.pos(edge.parent).clone(),
            callee: children[0],
            args: children[2..].to_vec(),
        });
        outermost = edge.parent;
    }
    chain.reverse();
    (outermost, chain)
}

fn is_simple(tree: &Tree, node: NodeId) -> bool {
    matches!(tree.kind(node), NodeKind::Value(_) | NodeKind::RightName(_))
}

fn error_out(tree: &mut Tree, node: NodeId) -> Vec<NodeId> {
    tree.replace_node(node, |b| b.node(NodeKind::Error, |b| b.graft(node)))
}

fn emit_wrapped(
    b: &mut TreeBuilder<'_>,
    chain: &[Wrapper],
    temps: &FxHashMap<NodeId, Name>,
    decl_pos: &Position,
    binding: &Binding<'_>,
    kept_metadata: &[(Symbol, NodeId)],
    source: &CodeLocation,
) {
    let Some((wrapper, inner)) = chain.split_first() else {
        emit_binding(b, decl_pos, binding, kept_metadata, source);
        return;
    };
    if binding.export.is_none() {
        emit_binding(b, decl_pos, binding, kept_metadata, source);
        return;
    }
    b.node_at(NodeKind::Call, wrapper.pos.clone(), |b| {
        let callee = b.copy(wrapper.callee);
        b.graft(callee);
        emit_wrapped(b, inner, temps, decl_pos, binding, kept_metadata, source);
        for &arg in &wrapper.args {
            match temps.get(&arg) {
                Some(temp) => {
                    let pos = b.tree().pos(arg).clone();
                    b.right_name(temp.clone(), pos);
                }
                None => {
                    let copy = b.copy(arg);
                    b.graft(copy);
                }
            }
        }
    });
}

/// One local declaration for `binding`, or an error node if it is missing.
fn emit_binding(
    b: &mut TreeBuilder<'_>,
    decl_pos: &Position,
    binding: &Binding<'_>,
    kept_metadata: &[(Symbol, NodeId)],
    source: &CodeLocation,
) {
    let Some(export) = binding.export else {
        b.node_at(NodeKind::Error, binding.pos.clone(), |b| {
            b.left_name(Name::Source(binding.name.clone()), binding.pos.clone());
        });
        return;
    };
    let edge = decl_pos.right_edge();
    b.node_at(NodeKind::Decl, decl_pos.clone(), |b| {
        b.left_name(Name::Source(binding.name.clone()), binding.pos.clone());
        for (key, value) in kept_metadata {
            let pos = b.tree().pos(*value).clone();
            b.symbol(key.clone(), pos.left_edge());
            let copy = b.copy(*value);
            b.graft(copy);
        }
        let has_type = kept_metadata.iter().any(|(key, _)| *key == Symbol::TYPE);
        if let Some(type_info) = export.type_info.as_ref().filter(|_| !has_type) {
            b.symbol(Symbol::TYPE, edge.clone());
            b.value(type_info.clone(), edge.clone());
        }
        for (key, value) in &export.metadata {
            if kept_metadata.iter().all(|(kept, _)| kept != key) {
                b.symbol(key.clone(), edge.clone());
                b.value(value.clone(), edge.clone());
            }
        }
        b.symbol(Symbol::INIT, edge.clone());
        match &export.value {
            Some(value) => b.value(value.clone(), edge),
            None => {
                let name = Name::Exported { module: source.clone(), name: export.name.clone() };
                b.right_name(name, edge);
            }
        }
    });
}
