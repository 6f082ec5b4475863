use std::fmt;
use std::io;
use std::sync::Arc;

use indexmap::IndexMap;
use weft_span::FilePath;

use crate::cancel::CancelGroup;
use crate::module::Module;
use crate::output::OutputSink;

#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BackendId(Arc<str>);

impl BackendId {
    pub fn new(id: &str) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Debug for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&*self.0, f)
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum BackendError {
    #[error("{0}")]
    Failed(String),
    #[error("cancelled")]
    Cancelled,
    #[error("panicked: {0}")]
    Panicked(String),
    #[error(transparent)]
    Io(#[from] io::Error),
}

impl BackendError {
    pub fn failed(message: impl fmt::Display) -> Self {
        Self::Failed(message.to_string())
    }
}

/// A generated file, relative to the backend's output directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFile {
    pub path: FilePath,
    pub content: String,
}

impl OutputFile {
    pub fn new(path: FilePath, content: impl Into<String>) -> Self {
        Self { path, content: content.into() }
    }
}

/// What a backend intends to produce, shared with its siblings before any
/// of them commits to a layout.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Tentative {
    pub files: Vec<FilePath>,
}

/// Read-only per-backend values, in backend registration order.
#[derive(Debug, Clone)]
pub struct SiblingData<T> {
    entries: IndexMap<BackendId, T>,
}

impl<T> Default for SiblingData<T> {
    fn default() -> Self {
        Self { entries: IndexMap::new() }
    }
}

impl<T> SiblingData<T> {
    pub(crate) fn insert(&mut self, id: BackendId, value: T) {
        self.entries.insert(id, value);
    }

    pub fn get(&self, id: &BackendId) -> Option<&T> {
        self.entries.get(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&BackendId, &T)> {
        self.entries.iter()
    }

    /// Every entry except `id`'s own.
    pub fn others<'a>(
        &'a self,
        id: &'a BackendId,
    ) -> impl Iterator<Item = (&'a BackendId, &'a T)> {
        self.entries.iter().filter(move |(other, _)| *other != id)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// One target language.
///
/// Phases run in the order they are declared here, each phase finishing
/// for every backend before the next starts. A backend that fails or
/// panics in any phase is left out of the remaining ones.
pub trait Backend: Send {
    fn id(&self) -> BackendId;

    fn setup(&mut self, _cancel: &CancelGroup) -> Result<(), BackendError> {
        Ok(())
    }

    /// Roots this backend resolves libraries from, shown to its siblings.
    fn library_roots(&self) -> Vec<FilePath> {
        Vec::new()
    }

    fn pre_analysis(
        &mut self,
        _modules: &[Module],
        _library_roots: &SiblingData<Vec<FilePath>>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    fn tentative(&mut self, modules: &[Module]) -> Result<Tentative, BackendError>;

    fn finish_tentative(
        &mut self,
        _siblings: &SiblingData<Tentative>,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Loads files a previous run asked to keep. Runs on its own thread.
    fn load_keep_files(
        &mut self,
        _keep: &dyn OutputSink,
        _cancel: &CancelGroup,
    ) -> Result<(), BackendError> {
        Ok(())
    }

    /// Runs on its own thread.
    fn translate(&mut self, modules: &[Module], cancel: &CancelGroup) -> Result<(), BackendError>;

    /// Final output files, given every sibling's settled plan.
    fn collate(
        &mut self,
        siblings: &SiblingData<Tentative>,
    ) -> Result<Vec<OutputFile>, BackendError>;

    fn pre_write(&mut self, _outputs: &SiblingData<Vec<OutputFile>>) -> Result<(), BackendError> {
        Ok(())
    }

    /// Files to hand back to [`Backend::load_keep_files`] next time.
    fn keep_files(&self) -> Vec<OutputFile> {
        Vec::new()
    }

    /// Runs on its own thread once every output is written.
    fn post_write(&mut self, _cancel: &CancelGroup) -> Result<(), BackendError> {
        Ok(())
    }
}
