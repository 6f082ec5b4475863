use anyhow::{Context, bail};
use camino::{Utf8Component, Utf8Path, Utf8PathBuf};
use clap::{Args, Parser};
use weft_rewrite::Stage;
use weft_span::FilePath;
use weft_stage::BackendId;

#[derive(Parser)]
#[command(name = "weft", version, about = "Staged tree-rewriting compiler pipeline")]
pub(crate) enum Options {
    /// Compile modules and write every backend's output.
    Build(BuildArgs),
}

#[derive(Args)]
pub(crate) struct BuildArgs {
    /// Source files, one module each
    #[arg(required = true)]
    pub(crate) inputs: Vec<Utf8PathBuf>,
    /// Directory module paths are relative to
    #[arg(long, default_value = ".")]
    pub(crate) root: Utf8PathBuf,
    /// Output directory
    #[arg(short, long, default_value = "weft-out")]
    pub(crate) out: Utf8PathBuf,
    /// Backend to run; may be repeated
    #[arg(long = "backend", default_value = "lua")]
    pub(crate) backends: Vec<String>,
    /// `name=dir`: resolve `name/...` imports below `dir`, relative to the root
    #[arg(long = "library", value_name = "NAME=DIR", value_parser = parse_library)]
    pub(crate) libraries: Vec<(String, Utf8PathBuf)>,
    /// Last stage to run
    #[arg(long, default_value = "run")]
    pub(crate) until: Stage,
}

fn parse_library(text: &str) -> Result<(String, Utf8PathBuf), String> {
    let (name, dir) = text.split_once('=').ok_or("expected `name=dir`")?;
    if name.is_empty() || name.contains('/') {
        return Err(format!("invalid library name `{name}`"));
    }
    Ok((name.to_owned(), dir.into()))
}

/// Everything `build` needs, with paths already checked.
#[derive(Debug, Clone)]
pub(crate) struct BuildConfig {
    pub(crate) root: Utf8PathBuf,
    pub(crate) inputs: Vec<Utf8PathBuf>,
    pub(crate) out: Utf8PathBuf,
    pub(crate) backends: Vec<BackendId>,
    pub(crate) libraries: Vec<(String, FilePath)>,
    pub(crate) until: Stage,
}

impl BuildConfig {
    pub(crate) fn from_args(args: BuildArgs) -> anyhow::Result<Self> {
        let libraries = args
            .libraries
            .iter()
            .map(|(name, dir)| {
                let root = relative_path(dir, true)
                    .with_context(|| format!("invalid root for library `{name}`"))?;
                Ok((name.clone(), root))
            })
            .collect::<anyhow::Result<_>>()?;
        let mut backends = Vec::new();
        for id in &args.backends {
            let id = BackendId::new(id);
            if !backends.contains(&id) {
                backends.push(id);
            }
        }
        Ok(Self {
            root: args.root,
            inputs: args.inputs,
            out: args.out,
            backends,
            libraries,
            until: args.until,
        })
    }

    /// Where `path` sits below the root, as a module path.
    pub(crate) fn module_path(&self, path: &Utf8Path) -> anyhow::Result<FilePath> {
        let relative = if path.is_absolute() || self.root != "." {
            path.strip_prefix(&self.root)
                .with_context(|| format!("`{path}` is outside the root `{}`", self.root))?
        } else {
            path
        };
        relative_path(relative, false)
    }
}

fn relative_path(path: &Utf8Path, is_dir: bool) -> anyhow::Result<FilePath> {
    let mut segments = Vec::new();
    for component in path.components() {
        match component {
            Utf8Component::Normal(segment) => segments.push(segment),
            Utf8Component::CurDir => {}
            _ => bail!("`{path}` must be a relative path without `..`"),
        }
    }
    let path = if is_dir { FilePath::dir(segments) } else { FilePath::file(segments) };
    Ok(path?)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(args: &[&str]) -> BuildConfig {
        let Options::Build(args) = Options::try_parse_from(args).unwrap();
        BuildConfig::from_args(args).unwrap()
    }

    #[test]
    fn defaults() {
        let config = config(&["weft", "build", "main.wf"]);
        assert_eq!(config.backends, [BackendId::new("lua")]);
        assert_eq!(config.until, Stage::Run);
        assert_eq!(config.out, "weft-out");
        assert!(config.libraries.is_empty());
        let path = config.module_path("./src/main.wf".into()).unwrap();
        assert_eq!(path, FilePath::file(["src", "main.wf"]).unwrap());
    }

    #[test]
    fn flags() {
        let config = config(&[
            "weft",
            "build",
            "app/main.wf",
            "--root",
            "app",
            "--library",
            "std=vendor/std",
            "--backend",
            "lua",
            "--backend",
            "lua",
            "--until",
            "export",
        ]);
        assert_eq!(config.backends.len(), 1);
        assert_eq!(config.until, Stage::Export);
        assert_eq!(
            config.libraries,
            [("std".to_owned(), FilePath::dir(["vendor", "std"]).unwrap())]
        );
        let path = config.module_path("app/main.wf".into()).unwrap();
        assert_eq!(path, FilePath::file(["main.wf"]).unwrap());
        assert!(config.module_path("other/main.wf".into()).is_err());
    }

    #[test]
    fn rejected_flags() {
        let parse = |args: &[&str]| Options::try_parse_from(args).map(|_| ());
        assert!(parse(&["weft", "build"]).is_err());
        assert!(parse(&["weft", "build", "m.wf", "--library", "std"]).is_err());
        assert!(parse(&["weft", "build", "m.wf", "--until", "later"]).is_err());

        let Options::Build(args) =
            Options::try_parse_from(["weft", "build", "m.wf", "--library", "std=../std"]).unwrap();
        assert!(BuildConfig::from_args(args).is_err());
    }
}
