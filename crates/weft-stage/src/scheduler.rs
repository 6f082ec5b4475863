use rustc_hash::FxHashMap;
use weft_rewrite::{MacroRegistry, PendingImport, Stage};
use weft_span::{FilePath, FilePathSegment};
use weft_tree::Tree;

use crate::module::{Module, ModuleId, ModuleStatus};

/// Advances every module through the stages, one stage per module and
/// round, until all of them reach the target or none can move.
///
/// A module stays at a stage while any of its imports waits for an
/// exporter; exporters publish once they are done with [`Stage::Export`].
pub struct Scheduler {
    modules: Vec<Module>,
    by_key: FxHashMap<FilePath, ModuleId>,
    libraries: FxHashMap<String, FilePath>,
    registry: MacroRegistry,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RunSummary {
    pub rounds: usize,
    pub finished: usize,
    pub failed: usize,
    pub stuck: usize,
    pub errors: usize,
}

impl RunSummary {
    pub fn is_clean(&self) -> bool {
        self.failed == 0 && self.stuck == 0 && self.errors == 0
    }
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self::with_registry(MacroRegistry::standard())
    }

    pub fn with_registry(registry: MacroRegistry) -> Self {
        Self {
            modules: Vec::new(),
            by_key: FxHashMap::default(),
            libraries: FxHashMap::default(),
            registry,
        }
    }

    /// Makes `<name>/...` specifiers resolve below `root`.
    pub fn add_library(&mut self, name: &str, root: FilePath) {
        self.libraries.insert(name.to_owned(), root);
    }

    pub fn add_module(&mut self, path: FilePath, tree: Tree) -> ModuleId {
        let id = ModuleId(self.modules.len());
        let key = module_key(&path);
        if let Some(existing) = self.by_key.get(&key) {
            let shadowed_by = self.modules[existing.0].path();
            tracing::warn!(%path, %shadowed_by, "module shadowed");
        } else {
            self.by_key.insert(key, id);
        }
        self.modules.push(Module::new(path, tree));
        id
    }

    pub fn module(&self, id: ModuleId) -> &Module {
        &self.modules[id.0]
    }

    pub fn modules(&self) -> &[Module] {
        &self.modules
    }

    pub fn into_modules(self) -> Vec<Module> {
        self.modules
    }

    /// The module an import of `path` would bind to.
    pub fn find(&self, path: &FilePath) -> Option<ModuleId> {
        self.by_key.get(&module_key(path)).copied()
    }

    /// Runs every module up to and including `target`.
    ///
    /// Modules that finished an earlier run are left alone.
    pub fn run_until(&mut self, target: Stage) -> RunSummary {
        let _span =
            tracing::info_span!("run_until", %target, modules = self.modules.len()).entered();
        let mut summary = RunSummary::default();

        loop {
            let running = (0..self.modules.len())
                .filter(|&index| self.modules[index].is_running())
                .collect::<Vec<_>>();
            if running.is_empty() {
                break;
            }
            summary.rounds += 1;
            let mut progressed = false;
            for index in running {
                progressed |= self.step(index, target);
            }
            if !progressed {
                for module in self.modules.iter_mut().filter(|module| module.is_running()) {
                    module.stall();
                }
                break;
            }
        }

        for module in &self.modules {
            match module.status() {
                ModuleStatus::Finished => summary.finished += 1,
                ModuleStatus::Failed => summary.failed += 1,
                ModuleStatus::Stuck => summary.stuck += 1,
                ModuleStatus::Running => {}
            }
            summary.errors += module.diagnostics().error_count();
        }
        tracing::info!(?summary, "run finished");
        summary
    }

    /// One stage of one module. Returns whether anything changed.
    fn step(&mut self, index: usize, target: Stage) -> bool {
        let expansion = self.modules[index].expand(&self.registry);
        if expansion.fatal {
            return true;
        }
        // A macro that settles without touching the tree changes nothing.
        let mut progressed = expansion.mutated > 0;
        progressed |= self.settle_imports(index);

        let module = &mut self.modules[index];
        if module.waiting().is_empty() {
            module.advance(target);
            progressed = true;
        }
        progressed
    }

    fn settle_imports(&mut self, index: usize) -> bool {
        let pending = self.modules[index].take_waiting();
        let mut still_waiting = Vec::new();
        let mut progressed = false;

        for import in pending {
            let exporter = match self.locate(&import) {
                Ok(exporter) if exporter == index => {
                    let reason = "a module cannot import itself".to_owned();
                    self.modules[index].unresolvable(&import, reason);
                    progressed = true;
                    continue;
                }
                Ok(exporter) => exporter,
                Err(reason) => {
                    self.modules[index].unresolvable(&import, reason);
                    progressed = true;
                    continue;
                }
            };
            let (importer, exporter) = pair_mut(&mut self.modules, index, exporter);
            if exporter.is_published() || import.stay.is_none() {
                importer.bind(&import, exporter);
                progressed = true;
            } else if exporter.is_running() {
                still_waiting.push(import);
            } else {
                let reason = match exporter.status() {
                    ModuleStatus::Finished => {
                        format!("`{}` stops before publishing its exports", exporter.path())
                    }
                    _ => format!("`{}` did not compile", exporter.path()),
                };
                importer.unresolvable(&import, reason);
                progressed = true;
            }
        }

        self.modules[index].keep_waiting(still_waiting);
        progressed
    }

    fn locate(&self, import: &PendingImport) -> Result<usize, String> {
        let path = match &import.library {
            None => import.path.clone(),
            Some(name) => {
                let root =
                    self.libraries.get(name).ok_or_else(|| format!("unknown library `{name}`"))?;
                let segments = root.segments().iter().chain(import.path.segments()).cloned();
                FilePath::new(segments.collect(), import.path.is_dir())
            }
        };
        self.find(&path).map(ModuleId::index).ok_or_else(|| format!("no module at `{path}`"))
    }
}

/// `a/b.wf` and `a/b` name the same module.
fn module_key(path: &FilePath) -> FilePath {
    let stem = path
        .last()
        .filter(|_| path.is_file())
        .and_then(|last| last.as_str().rsplit_once('.'))
        .and_then(|(stem, _)| FilePathSegment::new(stem).ok());
    match stem {
        Some(stem) => {
            let mut segments = path.segments().to_vec();
            segments.pop();
            segments.push(stem);
            FilePath::new(segments, false)
        }
        None => path.clone(),
    }
}

fn pair_mut<T>(items: &mut [T], a: usize, b: usize) -> (&mut T, &T) {
    assert_ne!(a, b);
    if a < b {
        let (left, right) = items.split_at_mut(b);
        (&mut left[a], &right[0])
    } else {
        let (left, right) = items.split_at_mut(a);
        (&mut right[0], &left[b])
    }
}
