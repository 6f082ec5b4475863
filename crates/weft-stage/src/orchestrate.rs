use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use weft_errors::{Diagnostic, MessageTemplate};
use weft_span::Position;

use crate::backend::{Backend, BackendError, BackendId, OutputFile, SiblingData};
use crate::cancel::{CancelGroup, InFlight, Phase};
use crate::module::Module;
use crate::output::{OutputArea, OutputSink};

#[derive(Debug)]
pub struct BackendFailure {
    pub backend: BackendId,
    pub phase: Phase,
    pub error: BackendError,
}

impl BackendFailure {
    pub fn to_diagnostic(&self, pos: Position) -> Diagnostic {
        let template = MessageTemplate::BackendFailed {
            backend: self.backend.to_string(),
            reason: format!("{} failed: {}", self.phase, self.error),
        };
        Diagnostic::error(template, pos)
    }
}

impl fmt::Display for BackendFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "backend `{}` failed in {}: {}", self.backend, self.phase, self.error)
    }
}

#[derive(Debug, Default)]
pub struct OrchestrationReport {
    /// Backends that went through every phase.
    pub completed: Vec<BackendId>,
    pub failures: Vec<BackendFailure>,
    /// Files written, outputs and keep files together.
    pub written: usize,
    /// The whole sequence was cancelled before it finished.
    pub cancelled: bool,
}

impl OrchestrationReport {
    pub fn is_success(&self) -> bool {
        self.failures.is_empty() && !self.cancelled
    }

    pub fn failure(&self, backend: &BackendId) -> Option<&BackendFailure> {
        self.failures.iter().find(|failure| failure.backend == *backend)
    }
}

/// Runs every backend through the phases of [`Backend`] over the same
/// modules.
///
/// `cancel_check` is called before each phase with a handle on that phase
/// alone. Backends see it only in the phases that take a [`CancelGroup`],
/// and writes check it before they start. Cancelling `group` stops the
/// sequence at the next phase boundary.
pub fn orchestrate(
    backends: Vec<Box<dyn Backend>>,
    modules: &[Module],
    sink: &dyn OutputSink,
    group: &CancelGroup,
    cancel_check: &mut dyn FnMut(&InFlight),
) -> OrchestrationReport {
    let _span = tracing::info_span!("orchestrate", backends = backends.len()).entered();
    let slots = backends
        .into_iter()
        .map(|backend| Slot { id: backend.id(), backend, live: true })
        .collect();
    let report = OrchestrationReport::default();
    let mut run = Orchestration { slots, group, cancel_check, report };
    if run.run(modules, sink).is_some() {
        run.report.completed = run.live().map(|(_, slot)| slot.id.clone()).collect();
    }
    tracing::info!(
        completed = run.report.completed.len(),
        failed = run.report.failures.len(),
        written = run.report.written,
        cancelled = run.report.cancelled,
        "orchestration finished"
    );
    run.report
}

struct Slot {
    id: BackendId,
    backend: Box<dyn Backend>,
    live: bool,
}

struct Orchestration<'a> {
    slots: Vec<Slot>,
    group: &'a CancelGroup,
    cancel_check: &'a mut dyn FnMut(&InFlight),
    report: OrchestrationReport,
}

impl Orchestration<'_> {
    /// `None` when the group was cancelled.
    fn run(&mut self, modules: &[Module], sink: &dyn OutputSink) -> Option<()> {
        let group = self.group.clone();
        self.checkpoint(Phase::Setup)?;
        self.sequential(Phase::Setup, |backend| backend.setup(&group));

        self.checkpoint(Phase::PreAnalysis)?;
        let mut roots = SiblingData::default();
        for (_, slot) in self.live() {
            roots.insert(slot.id.clone(), slot.backend.library_roots());
        }
        self.sequential(Phase::PreAnalysis, |backend| backend.pre_analysis(modules, &roots));

        self.checkpoint(Phase::Tentative)?;
        let plans = self.sequential(Phase::Tentative, |backend| backend.tentative(modules));
        self.checkpoint(Phase::FinishTentative)?;
        self.sequential(Phase::FinishTentative, |backend| backend.finish_tentative(&plans));

        let join = self.checkpoint(Phase::LoadKeepFiles)?;
        self.parallel(Phase::LoadKeepFiles, &join, |backend, join| {
            backend.load_keep_files(sink, join)
        });
        let join = self.checkpoint(Phase::Translate)?;
        self.parallel(Phase::Translate, &join, |backend, join| backend.translate(modules, join));

        self.checkpoint(Phase::Collate)?;
        let outputs = self.sequential(Phase::Collate, |backend| backend.collate(&plans));
        self.checkpoint(Phase::PreWrite)?;
        self.sequential(Phase::PreWrite, |backend| backend.pre_write(&outputs));

        let join = self.checkpoint(Phase::WriteOutputs)?;
        let files = self.files_of(&outputs);
        self.write_join(Phase::WriteOutputs, OutputArea::Output, &join, sink, &files);

        let join = self.checkpoint(Phase::WriteKeepFiles)?;
        let keep = self.sequential(Phase::WriteKeepFiles, |backend| Ok(backend.keep_files()));
        let files = self.files_of(&keep);
        self.write_join(Phase::WriteKeepFiles, OutputArea::Keep, &join, sink, &files);

        let join = self.checkpoint(Phase::PostWrite)?;
        self.parallel(Phase::PostWrite, &join, |backend, join| backend.post_write(join));
        Some(())
    }

    fn live(&self) -> impl Iterator<Item = (usize, &Slot)> {
        self.slots.iter().enumerate().filter(|(_, slot)| slot.live)
    }

    /// Lets the caller look at the upcoming phase; `None` once the whole
    /// group is cancelled.
    fn checkpoint(&mut self, phase: Phase) -> Option<CancelGroup> {
        let join = self.group.child();
        (self.cancel_check)(&InFlight { phase, join: join.clone() });
        if self.group.is_cancelled() {
            tracing::info!(%phase, "orchestration cancelled");
            self.report.cancelled = true;
            return None;
        }
        tracing::debug!(%phase, live = self.live().count(), "phase");
        Some(join)
    }

    fn sequential<T>(
        &mut self,
        phase: Phase,
        mut f: impl FnMut(&mut dyn Backend) -> Result<T, BackendError>,
    ) -> SiblingData<T> {
        let mut results = Vec::new();
        for (index, slot) in self.slots.iter_mut().enumerate().filter(|(_, slot)| slot.live) {
            results.push((index, guarded(|| f(slot.backend.as_mut()))));
        }
        self.settle(phase, results)
    }

    /// Runs `f` for every live backend at once and waits for all of them.
    fn parallel<T: Send>(
        &mut self,
        phase: Phase,
        join: &CancelGroup,
        f: impl Fn(&mut dyn Backend, &CancelGroup) -> Result<T, BackendError> + Sync,
    ) -> SiblingData<T> {
        let (sender, receiver) = crossbeam_channel::unbounded();
        std::thread::scope(|scope| {
            for (index, slot) in self.slots.iter_mut().enumerate().filter(|(_, slot)| slot.live) {
                let sender = sender.clone();
                let f = &f;
                scope.spawn(move || {
                    let result = guarded(|| f(slot.backend.as_mut(), join));
                    // The receiver outlives the scope.
                    let _ = sender.send((index, result));
                });
            }
        });
        drop(sender);
        let mut results = receiver.into_iter().collect::<Vec<_>>();
        results.sort_by_key(|(index, _)| *index);
        self.settle(phase, results)
    }

    /// Writes every file of one join point concurrently.
    fn write_join(
        &mut self,
        phase: Phase,
        area: OutputArea,
        join: &CancelGroup,
        sink: &dyn OutputSink,
        files: &[(usize, OutputFile)],
    ) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let slots = &self.slots;
        std::thread::scope(|scope| {
            for (index, file) in files {
                let sender = sender.clone();
                let backend = &slots[*index].id;
                scope.spawn(move || {
                    let result = join
                        .check()
                        .and_then(|()| sink.write(area, backend, file).map_err(BackendError::from));
                    let _ = sender.send((*index, result));
                });
            }
        });
        drop(sender);

        let mut failed = BTreeMap::new();
        for (index, result) in receiver {
            match result {
                Ok(()) => self.report.written += 1,
                Err(error) => {
                    failed.entry(index).or_insert(error);
                }
            }
        }
        for (index, error) in failed {
            self.fail(index, phase, error);
        }
    }

    fn files_of(&self, outputs: &SiblingData<Vec<OutputFile>>) -> Vec<(usize, OutputFile)> {
        self.live()
            .filter_map(|(index, slot)| Some((index, outputs.get(&slot.id)?)))
            .flat_map(|(index, files)| files.iter().map(move |file| (index, file.clone())))
            .collect()
    }

    fn settle<T>(
        &mut self,
        phase: Phase,
        results: Vec<(usize, Result<T, BackendError>)>,
    ) -> SiblingData<T> {
        let mut data = SiblingData::default();
        for (index, result) in results {
            match result {
                Ok(value) => data.insert(self.slots[index].id.clone(), value),
                Err(error) => self.fail(index, phase, error),
            }
        }
        data
    }

    fn fail(&mut self, index: usize, phase: Phase, error: BackendError) {
        let slot = &mut self.slots[index];
        tracing::warn!(backend = %slot.id, %phase, %error, "backend dropped");
        slot.live = false;
        self.report.failures.push(BackendFailure { backend: slot.id.clone(), phase, error });
    }
}

/// Turns a panic inside a backend into an error for that backend alone.
fn guarded<T>(f: impl FnOnce() -> Result<T, BackendError>) -> Result<T, BackendError> {
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => Err(BackendError::Panicked(panic_message(&*payload))),
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(message) = payload.downcast_ref::<&str>() {
        (*message).to_owned()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_owned()
    }
}
