use weft_out::lua::Lua;
use weft_span::{FilePath, FilePathSegment};
use weft_stage::{
    Backend, BackendError, BackendId, CancelGroup, Module, ModuleStatus, OutputArea, OutputFile,
    OutputSink, SiblingData, Tentative,
};

use crate::translate;

/// Lists the files written by the previous run.
const MANIFEST: &str = "manifest";

pub(crate) fn create(id: &BackendId, libraries: &[FilePath]) -> anyhow::Result<Box<dyn Backend>> {
    match id.as_str() {
        LuaBackend::ID => Ok(Box::new(LuaBackend::new(libraries.to_vec()))),
        other => anyhow::bail!("unknown backend `{other}`"),
    }
}

/// Writes one `.lua` file per module that compiled cleanly.
#[derive(Debug, Default)]
pub(crate) struct LuaBackend {
    libraries: Vec<FilePath>,
    /// Module index and output path, in module order.
    plan: Vec<(usize, FilePath)>,
    chunks: Vec<(FilePath, Lua)>,
    previous: Vec<FilePath>,
    written: Vec<FilePath>,
}

impl LuaBackend {
    pub(crate) const ID: &'static str = "lua";

    pub(crate) fn new(libraries: Vec<FilePath>) -> Self {
        Self { libraries, ..Self::default() }
    }
}

impl Backend for LuaBackend {
    fn id(&self) -> BackendId {
        BackendId::new(Self::ID)
    }

    fn library_roots(&self) -> Vec<FilePath> {
        self.libraries.clone()
    }

    fn tentative(&mut self, modules: &[Module]) -> Result<Tentative, BackendError> {
        self.plan.clear();
        for (index, module) in modules.iter().enumerate() {
            if module.status() != ModuleStatus::Finished || module.diagnostics().has_errors() {
                tracing::debug!(path = %module.path(), "not generating code");
                continue;
            }
            self.plan.push((index, output_path(module.path())?));
        }
        Ok(Tentative { files: self.plan.iter().map(|(_, path)| path.clone()).collect() })
    }

    fn finish_tentative(&mut self, siblings: &SiblingData<Tentative>) -> Result<(), BackendError> {
        let id = self.id();
        for (other, plan) in siblings.others(&id) {
            tracing::trace!(backend = %other, files = plan.files.len(), "sibling plan");
        }
        Ok(())
    }

    fn load_keep_files(
        &mut self,
        keep: &dyn OutputSink,
        _cancel: &CancelGroup,
    ) -> Result<(), BackendError> {
        let manifest = FilePath::file([MANIFEST]).map_err(BackendError::failed)?;
        let Some(text) = keep.read(OutputArea::Keep, &self.id(), &manifest)? else {
            return Ok(());
        };
        self.previous = text
            .lines()
            .filter(|line| !line.is_empty())
            .filter_map(|line| FilePath::file(line.split('/')).ok())
            .collect();
        tracing::debug!(files = self.previous.len(), "loaded manifest");
        Ok(())
    }

    fn translate(&mut self, modules: &[Module], cancel: &CancelGroup) -> Result<(), BackendError> {
        self.chunks.clear();
        for (index, path) in &self.plan {
            cancel.check()?;
            let module = modules.get(*index).ok_or_else(|| {
                BackendError::failed(format_args!("no module for `{path}`"))
            })?;
            self.chunks.push((path.clone(), translate::chunk(module.tree())));
        }
        Ok(())
    }

    fn collate(
        &mut self,
        _siblings: &SiblingData<Tentative>,
    ) -> Result<Vec<OutputFile>, BackendError> {
        let files = self
            .chunks
            .iter()
            .map(|(path, chunk)| OutputFile::new(path.clone(), weft_out::format(chunk)))
            .collect::<Vec<_>>();
        self.written = files.iter().map(|file| file.path.clone()).collect();
        Ok(files)
    }

    fn keep_files(&self) -> Vec<OutputFile> {
        let mut manifest = String::new();
        for path in &self.written {
            manifest.push_str(&path.to_string());
            manifest.push('\n');
        }
        match FilePath::file([MANIFEST]) {
            Ok(path) => vec![OutputFile::new(path, manifest)],
            Err(_) => Vec::new(),
        }
    }

    fn post_write(&mut self, _cancel: &CancelGroup) -> Result<(), BackendError> {
        for path in self.previous.iter().filter(|path| !self.written.contains(path)) {
            tracing::info!(%path, "stale output from an earlier run");
        }
        Ok(())
    }
}

/// `a/b.wf` becomes `a/b.lua`; only the last extension is dropped.
fn output_path(path: &FilePath) -> Result<FilePath, BackendError> {
    let segments = path.segments();
    let Some((last, dirs)) = segments.split_last() else {
        return Err(BackendError::failed(format_args!("module path `{path}` has no file name")));
    };
    let stem = translate::file_stem(last.as_str());
    let file = FilePathSegment::new(&format!("{stem}.lua")).map_err(BackendError::failed)?;
    Ok(FilePath::new(dirs.iter().cloned().chain([file]).collect(), false))
}
