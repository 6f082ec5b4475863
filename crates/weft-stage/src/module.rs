use std::collections::BTreeSet;

use weft_errors::{Diagnostic, Diagnostics, LogSink, MessageTemplate};
use weft_rewrite::{
    BindError, ExpandContext, Expansion, Export, ExportTable, Exporter, FeatureHost,
    IMPORT_PENDING, ImportLedger, ImportRecord, Importer, MacroEngine, MacroRegistry,
    PendingImport, Stage, collect_exports, create_local_bindings_for_import,
};
use weft_span::{CodeLocation, FilePath, Position};
use weft_structured::{Structured, Structurer};
use weft_tree::{NameMaker, NodeId, NodeKind, Tree, Value};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ModuleId(pub(crate) usize);

impl ModuleId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModuleStatus {
    Running,
    /// Reached the target stage. It may still carry error diagnostics.
    Finished,
    /// A macro needed a feature nobody provides.
    Failed,
    /// Could not make progress while other modules could not either.
    Stuck,
}

/// One compilation unit and everything the scheduler tracks about it.
#[derive(Debug)]
pub struct Module {
    path: FilePath,
    tree: Tree,
    stage: Stage,
    status: ModuleStatus,
    names: NameMaker,
    log: Diagnostics,
    /// Macro calls that asked to be retried at a later stage.
    deferred: Vec<NodeId>,
    /// Imports handed over by `import(...)` and not yet satisfied.
    waiting: Vec<PendingImport>,
    imports: ImportLedger,
    exports: ExportTable,
}

impl Module {
    pub fn new(path: FilePath, tree: Tree) -> Self {
        let loc = tree.loc().clone();
        Self {
            path,
            tree,
            stage: Stage::Import,
            status: ModuleStatus::Running,
            names: NameMaker::new(),
            log: Diagnostics::new(),
            deferred: Vec::new(),
            waiting: Vec::new(),
            imports: ImportLedger::new(loc.clone()),
            exports: ExportTable::new(loc),
        }
    }

    pub fn path(&self) -> &FilePath {
        &self.path
    }

    pub fn loc(&self) -> &CodeLocation {
        self.tree.loc()
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn status(&self) -> ModuleStatus {
        self.status
    }

    pub fn diagnostics(&self) -> &Diagnostics {
        &self.log
    }

    pub fn import_records(&self) -> &[ImportRecord] {
        self.imports.records()
    }

    pub fn waiting(&self) -> &[PendingImport] {
        &self.waiting
    }

    pub fn is_published(&self) -> bool {
        self.exports.is_published()
    }

    pub(crate) fn is_running(&self) -> bool {
        self.status == ModuleStatus::Running
    }

    /// Zero-width position at the start of the unit.
    fn start(&self) -> Position {
        self.tree.pos(self.tree.root()).left_edge()
    }

    pub(crate) fn expand(&mut self, registry: &MacroRegistry) -> Expansion {
        let mut queue = ImportQueue(&mut self.waiting);
        let mut cx = ExpandContext {
            stage: self.stage,
            path: &self.path,
            names: &mut self.names,
            log: &mut self.log,
            features: &mut queue,
        };
        let expansion = MacroEngine::new(registry).expand(&mut self.tree, &mut cx);
        self.deferred.clone_from(&expansion.deferred);
        if expansion.fatal {
            self.status = ModuleStatus::Failed;
        }
        expansion
    }

    pub(crate) fn take_waiting(&mut self) -> Vec<PendingImport> {
        std::mem::take(&mut self.waiting)
    }

    pub(crate) fn keep_waiting(&mut self, pending: Vec<PendingImport>) {
        self.waiting.extend(pending);
    }

    /// Binds `pending` to what `exporter` published.
    pub(crate) fn bind(&mut self, pending: &PendingImport, exporter: &dyn Exporter) {
        let Some(stay) = pending.stay else {
            self.imports.record_import_metadata(ImportRecord::Ok {
                specifier: pending.specifier.clone(),
                exporter: exporter.loc().clone(),
                imported: BTreeSet::new(),
                is_blocking_import: false,
            });
            return;
        };
        let result = create_local_bindings_for_import(
            &mut self.tree,
            stay,
            &pending.specifier,
            exporter,
            &mut self.imports,
            &mut self.names,
            &mut self.log,
        );
        if let Err(err) = result {
            self.bind_failed(pending, &err);
        }
    }

    fn bind_failed(&mut self, pending: &PendingImport, err: &BindError) {
        tracing::warn!(module = %self.loc(), specifier = %pending.specifier, %err, "bind failed");
        let template = MessageTemplate::ImportFailed {
            specifier: pending.specifier.clone(),
            reason: err.to_string(),
        };
        let pos = self.start();
        self.log.log(Diagnostic::error(template, pos));
    }

    /// Reports an import nobody can satisfy and turns its declaration into
    /// an error node.
    pub(crate) fn unresolvable(&mut self, pending: &PendingImport, reason: String) {
        let decl = pending
            .stay
            .and_then(|stay| Some((stay, self.tree.find_stay(stay)?)))
            .and_then(|(stay, leaf)| Some((stay, self.tree.parent(leaf)?)))
            .filter(|&(_, decl)| *self.tree.kind(decl) == NodeKind::Decl);
        let pos = match decl {
            Some((stay, decl)) => {
                let pos = self.tree.pos(decl).clone();
                if self.tree.consume_stay(stay).is_ok() {
                    self.tree.replace_node(decl, |b| b.node(NodeKind::Error, |b| b.graft(decl)));
                }
                pos
            }
            None => self.start(),
        };
        let template = MessageTemplate::ImportFailed {
            specifier: pending.specifier.clone(),
            reason: reason.clone(),
        };
        self.log.log(Diagnostic::error(template, pos));
        self.imports.record_import_metadata(ImportRecord::Unresolvable {
            specifier: pending.specifier.clone(),
            reason,
        });
    }

    pub(crate) fn publish(&mut self) {
        let exports = collect_exports(&self.tree);
        tracing::debug!(module = %self.loc(), exports = exports.len(), "exports published");
        self.exports.publish(exports);
    }

    /// Moves past the current stage, or finishes at `target`.
    pub(crate) fn advance(&mut self, target: Stage) {
        if self.stage == Stage::Export {
            self.publish();
        }
        match self.stage.next().filter(|_| self.stage < target) {
            Some(next) => {
                tracing::debug!(module = %self.loc(), from = %self.stage, to = %next, "stage done");
                self.stage = next;
            }
            None => self.finish(),
        }
    }

    fn finish(&mut self) {
        for site in std::mem::take(&mut self.deferred) {
            let callee = self.tree.callee_name(site).map_or_else(String::new, ToString::to_string);
            let template = MessageTemplate::IncompleteCompilation {
                stage: self.stage.to_string(),
                reason: format!("`{callee}` is still waiting for a later stage"),
            };
            self.log.log(Diagnostic::error(template, self.tree.pos(site).clone()));
        }
        for (_, leaf) in self.tree.unconsumed_stays() {
            let pos = self.tree.pos(leaf).clone();
            self.log.log(Diagnostic::error(MessageTemplate::UnresolvedStay, pos));
        }
        self.status = ModuleStatus::Finished;
    }

    /// Gives up on this module because nothing can unblock it.
    pub(crate) fn stall(&mut self) {
        let specifiers =
            self.waiting.iter().map(|p| format!("`{}`", p.specifier)).collect::<Vec<_>>();
        let reason = if specifiers.is_empty() {
            "no progress is possible".to_owned()
        } else {
            format!("waiting on {}", specifiers.join(", "))
        };
        tracing::warn!(module = %self.loc(), stage = %self.stage, %reason, "module stuck");
        let template =
            MessageTemplate::IncompleteCompilation { stage: self.stage.to_string(), reason };
        let pos = self.start();
        self.log.log(Diagnostic::error(template, pos));
        self.status = ModuleStatus::Stuck;
    }
}

impl Exporter for Module {
    fn loc(&self) -> &CodeLocation {
        self.tree.loc()
    }

    fn exports(&self) -> Option<&[Export]> {
        self.exports.exports()
    }
}

impl Importer for Module {
    fn loc(&self) -> &CodeLocation {
        self.tree.loc()
    }

    fn record_import_metadata(&mut self, record: ImportRecord) {
        self.imports.record_import_metadata(record);
    }
}

impl Structured for Module {
    fn destructure(&self, s: &mut Structurer) {
        s.obj(|o| {
            o.field("loc", self.loc());
            o.field("path", &self.path);
            o.field("stage", self.stage.name());
            o.field("status", &format!("{:?}", self.status));
            o.field("imports", self.imports.records());
            o.key("exports", |s| match self.exports.exports() {
                Some(exports) => exports.destructure(s),
                None => s.null(),
            });
            o.field("diagnostics", &self.log);
        });
    }
}

/// The `importPending` feature: queues imports for the scheduler.
struct ImportQueue<'a>(&'a mut Vec<PendingImport>);

impl FeatureHost for ImportQueue<'_> {
    fn has_feature(&self, key: &str) -> bool {
        key == IMPORT_PENDING
    }

    fn call_feature(&mut self, key: &str, args: &[Value]) -> Option<Value> {
        if key != IMPORT_PENDING {
            return None;
        }
        self.0.push(PendingImport::from_args(args)?);
        Some(Value::Void)
    }
}
