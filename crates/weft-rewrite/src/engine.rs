use std::fmt;

use rustc_hash::{FxHashMap, FxHashSet};
use weft_errors::{Diagnostic, LogSink, MessageTemplate};
use weft_span::{CodeLocation, FilePath, Position};
use weft_tree::{Name, NameMaker, NodeId, NodeKind, Order, Tree, TreeBuilder, Value, VisitCue, walk};

use crate::stage::Stage;

/// A macro that could not do its job.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fail {
    pub diagnostic: Diagnostic,
    /// The environment lacks something the macro needs; the unit cannot continue.
    pub fatal: bool,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MacroOutcome {
    Done,
    Fail(Fail),
    /// Leave the call as it is and retry at a later stage.
    NotYet,
}

impl From<Fail> for MacroOutcome {
    fn from(fail: Fail) -> Self {
        Self::Fail(fail)
    }
}

/// Feature key under which pending imports are handed to the scheduler.
pub const IMPORT_PENDING: &str = "importPending";

/// Named capabilities supplied to macros by whoever drives expansion.
pub trait FeatureHost {
    fn has_feature(&self, key: &str) -> bool;

    /// `None` when `key` has no implementation.
    fn call_feature(&mut self, key: &str, args: &[Value]) -> Option<Value>;
}

#[derive(Debug, Default, Clone, Copy)]
pub struct NoFeatures;

impl FeatureHost for NoFeatures {
    fn has_feature(&self, _key: &str) -> bool {
        false
    }

    fn call_feature(&mut self, _key: &str, _args: &[Value]) -> Option<Value> {
        None
    }
}

/// Per-unit state threaded through one expansion pass.
pub struct ExpandContext<'a> {
    pub stage: Stage,
    pub path: &'a FilePath,
    pub names: &'a mut NameMaker,
    pub log: &'a mut dyn LogSink,
    pub features: &'a mut dyn FeatureHost,
}

/// What a macro sees of the world while it expands one call.
///
/// A macro mutates the tree at most once per invocation, through
/// [`MacroEnv::replace_call`] or [`MacroEnv::replace_call_in_declaration`].
pub struct MacroEnv<'e> {
    tree: &'e mut Tree,
    call: NodeId,
    stage: Stage,
    path: &'e FilePath,
    names: &'e mut NameMaker,
    log: &'e mut dyn LogSink,
    features: &'e mut dyn FeatureHost,
    committed: bool,
}

impl<'e> MacroEnv<'e> {
    pub fn new(tree: &'e mut Tree, call: NodeId, cx: &'e mut ExpandContext<'_>) -> Self {
        Self {
            tree,
            call,
            stage: cx.stage,
            path: cx.path,
            names: &mut *cx.names,
            log: &mut *cx.log,
            features: &mut *cx.features,
            committed: false,
        }
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    /// Path of the unit being expanded, used to resolve relative specifiers.
    pub fn path(&self) -> &FilePath {
        self.path
    }

    pub fn loc(&self) -> &CodeLocation {
        self.tree.loc()
    }

    pub fn tree(&self) -> &Tree {
        self.tree
    }

    pub fn call(&self) -> NodeId {
        self.call
    }

    pub fn call_pos(&self) -> Position {
        self.tree.pos(self.call).clone()
    }

    pub fn callee(&self) -> Option<&Name> {
        self.tree.callee_name(self.call)
    }

    pub fn args(&self) -> &[NodeId] {
        &self.tree.children(self.call)[1..]
    }

    pub fn arg_value(&self, index: usize) -> Option<&Value> {
        self.tree.value_of(*self.args().get(index)?)
    }

    pub fn names(&mut self) -> &mut NameMaker {
        self.names
    }

    pub fn log(&mut self, diagnostic: Diagnostic) {
        self.log.log(diagnostic);
    }

    pub fn fail(&self, template: MessageTemplate) -> Fail {
        Fail { diagnostic: Diagnostic::error(template, self.call_pos()), fatal: false }
    }

    pub fn check_arity(&self, expected: usize) -> Result<(), Fail> {
        let actual = self.args().len();
        if actual == expected {
            return Ok(());
        }
        let callee = self.callee().map_or_else(String::new, ToString::to_string);
        Err(self.fail(MessageTemplate::ArityMismatch { callee, expected, actual }))
    }

    pub fn has_feature(&self, key: &str) -> bool {
        self.features.has_feature(key)
    }

    /// The fatal failure for a feature nobody implements.
    pub fn unsupported(&self, key: &str) -> Fail {
        let template = MessageTemplate::UnsupportedByInterpreter { feature: key.to_owned() };
        Fail { diagnostic: Diagnostic::error(template, self.call_pos()), fatal: true }
    }

    /// Calls a feature implementation. A missing implementation is fatal.
    pub fn call_feature(&mut self, key: &str, args: &[Value]) -> Result<Value, Fail> {
        match self.features.call_feature(key, args) {
            Some(value) => Ok(value),
            None => Err(self.unsupported(key)),
        }
    }

    /// The declaration whose child is this call.
    pub fn enclosing_declaration(&self) -> Option<NodeId> {
        let parent = self.tree.parent(self.call)?;
        (*self.tree.kind(parent) == NodeKind::Decl).then_some(parent)
    }

    pub fn is_committed(&self) -> bool {
        self.committed
    }

    #[track_caller]
    fn commit(&mut self) {
        assert!(!self.committed, "a macro may replace its call site only once");
        self.committed = true;
    }

    /// Replaces the call with whatever `build` emits.
    #[track_caller]
    pub fn replace_call(&mut self, build: impl FnOnce(&mut TreeBuilder<'_>)) -> Vec<NodeId> {
        self.commit();
        self.tree.replace_node(self.call, build)
    }

    /// Replaces the call inside its declaration and appends metadata to that
    /// declaration, as one replacement of the declaration's tail.
    #[track_caller]
    pub fn replace_call_in_declaration(
        &mut self,
        build_call: impl FnOnce(&mut TreeBuilder<'_>),
        metadata: impl FnOnce(&mut TreeBuilder<'_>),
    ) {
        let decl = self.enclosing_declaration().expect("call is not inside a declaration");
        self.commit();
        let children = self.tree.children(decl);
        let index = children.iter().position(|&c| c == self.call).unwrap_or(children.len());
        let trailing = children[index + 1..].to_vec();
        let len = children.len();
        self.tree.replace(decl, index..len, |b| {
            build_call(b);
            b.graft_all(trailing);
            metadata(b);
        });
    }
}

pub trait Macro {
    fn expand(&self, env: &mut MacroEnv<'_>) -> MacroOutcome;
}

/// Macros keyed by the source name they are called by.
#[derive(Default)]
pub struct MacroRegistry {
    macros: FxHashMap<String, Box<dyn Macro>>,
}

impl MacroRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// `import`, `@export` and `@json`.
    pub fn standard() -> Self {
        let mut registry = Self::new();
        registry.register("import", crate::import::ImportMacro);
        registry.register("@export", crate::export::ExportDecorator);
        registry.register("@json", crate::json::JsonDecorator);
        registry
    }

    pub fn register(&mut self, name: &str, m: impl Macro + 'static) {
        self.macros.insert(name.to_owned(), Box::new(m));
    }

    pub fn get(&self, name: &Name) -> Option<&dyn Macro> {
        match name {
            Name::Source(text) => self.macros.get(&**text).map(|m| &**m),
            Name::Temporary { .. } | Name::Exported { .. } => None,
        }
    }
}

impl fmt::Debug for MacroRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names = self.macros.keys().collect::<Vec<_>>();
        names.sort();
        f.debug_struct("MacroRegistry").field("macros", &names).finish()
    }
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct Expansion {
    pub expanded: usize,
    pub failed: usize,
    /// Invocations that changed the tree.
    pub mutated: usize,
    /// Calls that asked to be retried at a later stage.
    pub deferred: Vec<NodeId>,
    /// A fatal failure stopped the pass.
    pub fatal: bool,
}

pub struct MacroEngine<'r> {
    registry: &'r MacroRegistry,
}

impl<'r> MacroEngine<'r> {
    pub fn new(registry: &'r MacroRegistry) -> Self {
        Self { registry }
    }

    /// Expands macro calls until none makes progress.
    ///
    /// Failures are logged and the failing call is wrapped in an error node,
    /// except for fatal ones which stop the pass at once.
    pub fn expand(&self, tree: &mut Tree, cx: &mut ExpandContext<'_>) -> Expansion {
        let _span = tracing::debug_span!("expand", unit = %tree.loc(), stage = %cx.stage).entered();
        let mut expansion = Expansion::default();
        let mut settled = FxHashSet::default();

        loop {
            let sites = self.call_sites(tree, &settled);
            if sites.is_empty() {
                break;
            }
            let mut progressed = false;
            for call in sites {
                // An earlier failure in this pass may have wrapped the site.
                if !tree.is_attached(call) || is_inert(tree, call) {
                    continue;
                }
                let Some(expander) = tree.callee_name(call).and_then(|name| self.registry.get(name))
                else {
                    continue;
                };
                let mut env = MacroEnv::new(tree, call, cx);
                let outcome = expander.expand(&mut env);
                let committed = env.committed;
                match outcome {
                    MacroOutcome::Done => {
                        expansion.expanded += 1;
                        progressed = true;
                        if committed {
                            expansion.mutated += 1;
                        } else {
                            settled.insert(call);
                        }
                    }
                    MacroOutcome::NotYet => {
                        tracing::trace!(?call, "macro deferred");
                        settled.insert(call);
                        expansion.deferred.push(call);
                    }
                    MacroOutcome::Fail(Fail { diagnostic, fatal }) => {
                        expansion.failed += 1;
                        progressed = true;
                        cx.log.log(diagnostic);
                        if fatal {
                            expansion.fatal = true;
                            return expansion;
                        }
                        expansion.mutated += 1;
                        if committed {
                            settled.insert(call);
                        } else {
                            tree.replace_node(call, |b| b.node(NodeKind::Error, |b| b.graft(call)));
                        }
                    }
                }
            }
            if !progressed {
                break;
            }
        }
        tracing::debug!(
            expanded = expansion.expanded,
            failed = expansion.failed,
            mutated = expansion.mutated,
            deferred = expansion.deferred.len(),
            "expansion finished"
        );
        expansion
    }

    fn call_sites(&self, tree: &Tree, settled: &FxHashSet<NodeId>) -> Vec<NodeId> {
        let mut sites = Vec::new();
        // Pre-order walks cannot fail.
        let _ = walk(tree, tree.root(), Order::Pre, |tree, node| match tree.kind(node) {
            NodeKind::Esc { .. } | NodeKind::Error => VisitCue::SkipOne,
            NodeKind::Call => {
                let registered = tree.callee_name(node).and_then(|name| self.registry.get(name));
                if registered.is_some() && !settled.contains(&node) {
                    sites.push(node);
                }
                VisitCue::Continue
            }
            _ => VisitCue::Continue,
        });
        sites
    }
}

/// Below an `Esc` or `Error` node nothing expands.
fn is_inert(tree: &Tree, node: NodeId) -> bool {
    tree.ancestors(node)
        .any(|node| matches!(tree.kind(node), NodeKind::Esc { .. } | NodeKind::Error))
}
