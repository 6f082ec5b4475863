use std::collections::BTreeMap;
use std::io;
use std::sync::Mutex;

use camino::{Utf8Path, Utf8PathBuf};
use weft_span::FilePath;

use crate::backend::{BackendId, OutputFile};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum OutputArea {
    /// Generated sources.
    Output,
    /// Files a backend keeps between runs.
    Keep,
}

/// Where backends' files end up. Writes of one join point happen
/// concurrently, so implementations must be thread safe.
pub trait OutputSink: Sync {
    fn write(&self, area: OutputArea, backend: &BackendId, file: &OutputFile) -> io::Result<()>;

    /// `Ok(None)` when there is no such file.
    fn read(
        &self,
        area: OutputArea,
        backend: &BackendId,
        path: &FilePath,
    ) -> io::Result<Option<String>>;
}

/// `<root>/<backend>/...` for outputs and `<root>/.keep/<backend>/...` for
/// keep files.
#[derive(Debug, Clone)]
pub struct DirOutput {
    root: Utf8PathBuf,
}

impl DirOutput {
    pub fn new(root: impl Into<Utf8PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn path_of(&self, area: OutputArea, backend: &BackendId, path: &FilePath) -> Utf8PathBuf {
        let base = match area {
            OutputArea::Output => self.root.join(backend.as_str()),
            OutputArea::Keep => self.root.join(".keep").join(backend.as_str()),
        };
        base.join(path.to_utf8_path_buf())
    }
}

impl OutputSink for DirOutput {
    fn write(&self, area: OutputArea, backend: &BackendId, file: &OutputFile) -> io::Result<()> {
        let path = self.path_of(area, backend, &file.path);
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        tracing::trace!(%path, bytes = file.content.len(), "writing");
        std::fs::write(&path, &file.content)
    }

    fn read(
        &self,
        area: OutputArea,
        backend: &BackendId,
        path: &FilePath,
    ) -> io::Result<Option<String>> {
        match std::fs::read_to_string(self.path_of(area, backend, path)) {
            Ok(text) => Ok(Some(text)),
            Err(err) if err.kind() == io::ErrorKind::NotFound => Ok(None),
            Err(err) => Err(err),
        }
    }
}

type Key = (OutputArea, BackendId, FilePath);

/// Keeps every file in memory.
#[derive(Debug, Default)]
pub struct MemoryOutput {
    files: Mutex<BTreeMap<Key, String>>,
}

impl MemoryOutput {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far, sorted.
    pub fn files(&self) -> Vec<(OutputArea, BackendId, FilePath, String)> {
        let files = self.files.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        files
            .iter()
            .map(|((area, backend, path), text)| {
                (*area, backend.clone(), path.clone(), text.clone())
            })
            .collect()
    }

    pub fn get(&self, area: OutputArea, backend: &BackendId, path: &FilePath) -> Option<String> {
        let files = self.files.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        files.get(&(area, backend.clone(), path.clone())).cloned()
    }

    /// Seeds a keep file, as if an earlier run had written it.
    pub fn insert(&self, area: OutputArea, backend: &BackendId, file: OutputFile) {
        let mut files = self.files.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        files.insert((area, backend.clone(), file.path), file.content);
    }
}

impl OutputSink for MemoryOutput {
    fn write(&self, area: OutputArea, backend: &BackendId, file: &OutputFile) -> io::Result<()> {
        self.insert(area, backend, file.clone());
        Ok(())
    }

    fn read(
        &self,
        area: OutputArea,
        backend: &BackendId,
        path: &FilePath,
    ) -> io::Result<Option<String>> {
        Ok(self.get(area, backend, path))
    }
}
