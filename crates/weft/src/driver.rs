use anyhow::Context as _;
use text_size::TextSize;
use weft_errors::{Diagnostic, Renderer};
use weft_inputs::{File, SourceDb};
use weft_rewrite::Stage;
use weft_span::CodeLocation;
use weft_stage::{
    CancelGroup, InFlight, OrchestrationReport, OutputSink, RunSummary, Scheduler, orchestrate,
};
use weft_tree::{Tree, sexpr};

use crate::backend;
use crate::config::BuildConfig;

/// What a build did, with every message already rendered.
#[derive(Debug)]
pub(crate) struct Outcome {
    pub(crate) summary: RunSummary,
    /// Files that failed to parse and never became modules.
    pub(crate) unparsed: usize,
    pub(crate) report: Option<OrchestrationReport>,
    pub(crate) messages: Vec<String>,
}

impl Outcome {
    pub(crate) fn is_success(&self) -> bool {
        self.unparsed == 0
            && self.summary.is_clean()
            && self.report.as_ref().is_none_or(OrchestrationReport::is_success)
    }
}

pub(crate) fn load(db: &SourceDb, config: &BuildConfig) -> anyhow::Result<Vec<File>> {
    config
        .inputs
        .iter()
        .map(|path| {
            let text = std::fs::read_to_string(path)
                .with_context(|| format!("failed to read `{path}`"))?;
            Ok(File::new(db, path.clone(), text))
        })
        .collect()
}

pub(crate) fn build(
    db: &SourceDb,
    files: &[File],
    config: &BuildConfig,
    sink: &dyn OutputSink,
    renderer: &Renderer,
) -> anyhow::Result<Outcome> {
    let mut messages = Vec::new();
    let mut unparsed = 0;
    let mut scheduler = Scheduler::new();
    for (name, root) in &config.libraries {
        scheduler.add_library(name, root.clone());
    }

    // Diagnostics point at the location named after each module's path.
    let mut sources = Vec::new();
    for &file in files {
        let path = config.module_path(file.path(db))?;
        let loc = CodeLocation::new(path.to_string());
        let cst = match sexpr::parse(&loc, file.text(db)) {
            Ok(cst) => cst,
            Err(err) => {
                let header = file.location_header(db, TextSize::new(err.offset()));
                messages.push(format!("error: {header}: {err}"));
                unparsed += 1;
                continue;
            }
        };
        scheduler.add_module(path, Tree::from_cst(loc.clone(), &cst));
        sources.push((loc, file));
    }

    let summary = scheduler.run_until(config.until);
    tracing::info!(?summary, "stages finished");
    let modules = scheduler.into_modules();
    for module in &modules {
        for diagnostic in module.diagnostics().entries() {
            messages.push(render(db, &sources, diagnostic, renderer));
        }
    }

    if config.backends.is_empty() || config.until < Stage::GenerateCode {
        tracing::info!(until = %config.until, "no code generation");
        return Ok(Outcome { summary, unparsed, report: None, messages });
    }
    let libraries = config.libraries.iter().map(|(_, root)| root.clone()).collect::<Vec<_>>();
    let backends = config
        .backends
        .iter()
        .map(|id| backend::create(id, &libraries))
        .collect::<anyhow::Result<Vec<_>>>()?;

    let report = orchestrate(backends, &modules, sink, &CancelGroup::new(), &mut |in_flight| {
        trace_phase(in_flight);
    });
    for failure in &report.failures {
        messages.push(format!("error: {failure}"));
    }
    if report.cancelled {
        messages.push("error: code generation was cancelled".to_owned());
    }
    Ok(Outcome { summary, unparsed, report: Some(report), messages })
}

fn trace_phase(in_flight: &InFlight) {
    tracing::debug!(phase = %in_flight.phase(), "starting phase");
}

fn render(
    db: &SourceDb,
    sources: &[(CodeLocation, File)],
    diagnostic: &Diagnostic,
    renderer: &Renderer,
) -> String {
    let loc = diagnostic.pos().loc();
    match sources.iter().find(|(source, _)| source == loc) {
        Some((_, file)) => {
            let path = file.path(db).as_str();
            diagnostic.render(renderer, path, file.text(db)).to_string()
        }
        None => format!("error: {loc}: {}", diagnostic.message()),
    }
}

#[cfg(test)]
mod tests {
    use camino::Utf8PathBuf;
    use weft_span::FilePath;
    use weft_stage::{BackendId, MemoryOutput, OutputArea};

    use super::*;

    fn config(until: Stage) -> BuildConfig {
        BuildConfig {
            root: Utf8PathBuf::from("."),
            inputs: Vec::new(),
            out: Utf8PathBuf::from("weft-out"),
            backends: vec![BackendId::new("lua")],
            libraries: Vec::new(),
            until,
        }
    }

    fn compile(sources: &[(&str, &str)], config: &BuildConfig) -> (Outcome, MemoryOutput) {
        let db = SourceDb::default();
        let files = sources
            .iter()
            .map(|(path, text)| File::new(&db, Utf8PathBuf::from(*path), (*text).to_owned()))
            .collect::<Vec<_>>();
        let sink = MemoryOutput::new();
        let outcome = build(&db, &files, config, &sink, &Renderer::plain()).unwrap();
        (outcome, sink)
    }

    #[test]
    fn builds_every_module() {
        let (outcome, sink) = compile(
            &[
                ("app/main.wf", r#"(let greeting (import "./strings")) (print greeting)"#),
                ("app/strings.wf", r#"(@export (let greeting "hello"))"#),
            ],
            &config(Stage::Run),
        );
        assert!(outcome.is_success(), "{:?}", outcome.messages);
        assert_eq!(outcome.summary.finished, 2);

        let files = sink
            .files()
            .into_iter()
            .filter(|(area, ..)| *area == OutputArea::Output)
            .map(|(_, _, path, _)| path.to_string())
            .collect::<Vec<_>>();
        assert_eq!(files, ["app/main.lua", "app/strings.lua"]);
    }

    #[test]
    fn dotted_module_names_keep_their_own_output() {
        let (outcome, sink) =
            compile(&[("x.a.wf", "(let a 1)"), ("x.b.wf", "(let b 2)")], &config(Stage::Run));
        assert!(outcome.is_success(), "{:?}", outcome.messages);
        assert_eq!(outcome.summary.finished, 2);

        let files = sink
            .files()
            .into_iter()
            .filter(|(area, ..)| *area == OutputArea::Output)
            .map(|(_, _, path, text)| format!("{path} {text:?}"))
            .collect::<Vec<_>>();
        assert_eq!(files, [r#"x.a.lua "local a = 1\n""#, r#"x.b.lua "local b = 2\n""#]);
    }

    #[test]
    fn parse_errors_skip_the_file() {
        let (outcome, sink) =
            compile(&[("bad.wf", "(let x\n  (f"), ("ok.wf", "(let y 1)")], &config(Stage::Run));
        assert!(!outcome.is_success());
        assert_eq!(outcome.unparsed, 1);
        assert_eq!(outcome.messages, ["error: bad.wf:2:5: unexpected end of input at 11"]);
        let id = BackendId::new("lua");
        let ok = FilePath::file(["ok.lua"]).unwrap();
        assert!(sink.get(OutputArea::Output, &id, &ok).is_some());
    }

    #[test]
    fn diagnostics_are_rendered_against_their_file() {
        let (outcome, _) =
            compile(&[("main.wf", r#"(let x (import "./nope"))"#)], &config(Stage::Run));
        assert!(!outcome.is_success());
        let [message] = outcome.messages.as_slice() else { panic!("{:?}", outcome.messages) };
        assert!(message.contains("error[ImportFailed]"), "{message}");
        assert!(message.contains("main.wf"), "{message}");
    }

    #[test]
    fn early_stages_skip_code_generation() {
        let (outcome, sink) = compile(&[("main.wf", "(let x 1)")], &config(Stage::Define));
        assert!(outcome.is_success());
        assert!(outcome.report.is_none());
        assert!(sink.files().is_empty());
    }

    #[test]
    fn unknown_backends_are_rejected() {
        let mut config = config(Stage::Run);
        config.backends.push(BackendId::new("cobol"));
        let db = SourceDb::default();
        let sink = MemoryOutput::new();
        let error = build(&db, &[], &config, &sink, &Renderer::plain()).unwrap_err();
        assert_eq!(error.to_string(), "unknown backend `cobol`");
    }
}
