use expect_test::{Expect, expect};
use weft_rewrite::{ImportRecord, Macro, MacroEnv, MacroOutcome, MacroRegistry, Stage};
use weft_span::{CodeLocation, FilePath};
use weft_stage::{Module, ModuleStatus, RunSummary, Scheduler};
use weft_tree::{Tree, sexpr};

fn add(scheduler: &mut Scheduler, path: &str, text: &str) {
    let path = FilePath::file(path.split('/')).unwrap();
    let loc = CodeLocation::new(path.to_string());
    let cst = sexpr::parse(&loc, text).unwrap();
    scheduler.add_module(path, Tree::from_cst(loc, &cst));
}

fn module<'a>(scheduler: &'a Scheduler, path: &str) -> &'a Module {
    let id = scheduler.find(&FilePath::file(path.split('/')).unwrap()).unwrap();
    scheduler.module(id)
}

#[track_caller]
fn check_tree(module: &Module, expect: Expect) {
    let tree = module.tree();
    let lines = tree.children(tree.root()).iter().map(|&node| tree.dump(node));
    expect.assert_eq(&lines.collect::<Vec<_>>().join("\n"));
}

#[test]
fn imports_bind_once_the_exporter_publishes() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(let world (import "./earth"))"#);
    add(&mut scheduler, "earth.wf", r#"(@export (let world "Earth"))"#);

    let summary = scheduler.run_until(Stage::Run);
    assert!(summary.is_clean(), "{summary:?}");
    assert_eq!(summary.finished, 2);

    let main = module(&scheduler, "main");
    check_tree(main, expect![[r#"(Decl world \init "Earth")"#]]);
    assert_eq!(main.stage(), Stage::Run);
    let [ImportRecord::Ok { specifier, imported, is_blocking_import, .. }] = main.import_records()
    else {
        panic!("{:?}", main.import_records())
    };
    assert_eq!(specifier, "./earth");
    assert_eq!(imported.iter().map(|name| &**name).collect::<Vec<_>>(), ["world"]);
    assert!(*is_blocking_import);
    assert!(module(&scheduler, "earth").is_published());
}

#[test]
fn effect_imports_do_not_wait() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(import "./setup")"#);
    add(&mut scheduler, "setup.wf", "(print 1)");

    let summary = scheduler.run_until(Stage::Define);
    assert!(summary.is_clean(), "{summary:?}");
    let [ImportRecord::Ok { imported, is_blocking_import, .. }] =
        module(&scheduler, "main").import_records()
    else {
        panic!()
    };
    assert!(imported.is_empty());
    assert!(!*is_blocking_import);
}

#[test]
fn cycles_get_stuck() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "a.wf", r#"(let x (import "./b"))"#);
    add(&mut scheduler, "b.wf", r#"(let y (import "./a"))"#);

    let summary = scheduler.run_until(Stage::Run);
    assert_eq!(summary, RunSummary { rounds: 2, finished: 0, failed: 0, stuck: 2, errors: 2 });
    for path in ["a", "b"] {
        let module = module(&scheduler, path);
        assert_eq!(module.status(), ModuleStatus::Stuck);
        assert_eq!(module.stage(), Stage::Import);
        assert_eq!(module.diagnostics().ids(), ["IncompleteCompilation"]);
    }
    let message = module(&scheduler, "a").diagnostics().entries()[0].message().to_owned();
    assert!(message.contains("waiting on `./b`"), "{message}");
}

#[test]
fn missing_modules_are_unresolvable() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(let x (import "./nope")) (let y 1)"#);

    let summary = scheduler.run_until(Stage::Run);
    assert_eq!(summary.finished, 1);
    assert_eq!(summary.errors, 1);

    let main = module(&scheduler, "main");
    check_tree(
        main,
        expect![[r#"
            (Error (Decl x \init import("./nope") \stay stay#0))
            (Decl y \init 1)"#]],
    );
    assert_eq!(main.diagnostics().ids(), ["ImportFailed"]);
    let [ImportRecord::Unresolvable { specifier, reason }] = main.import_records() else {
        panic!()
    };
    assert_eq!(specifier, "./nope");
    assert_eq!(reason, "no module at `nope`");
}

#[test]
fn self_imports_are_unresolvable() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(let x (import "./main"))"#);

    scheduler.run_until(Stage::Run);
    let [ImportRecord::Unresolvable { reason, .. }] = module(&scheduler, "main").import_records()
    else {
        panic!()
    };
    assert_eq!(reason, "a module cannot import itself");
}

#[test]
fn library_imports() {
    let mut scheduler = Scheduler::new();
    scheduler.add_library("std", FilePath::dir(["lib", "std"]).unwrap());
    add(&mut scheduler, "main.wf", r#"(let print (import "std/io"))"#);
    add(&mut scheduler, "lib/std/io.wf", r#"(@export (let print "builtin"))"#);

    let summary = scheduler.run_until(Stage::Run);
    assert!(summary.is_clean(), "{summary:?}");
    check_tree(module(&scheduler, "main"), expect![[r#"(Decl print \init "builtin")"#]]);
}

#[test]
fn unknown_libraries() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(let print (import "std/io"))"#);

    scheduler.run_until(Stage::Run);
    let [ImportRecord::Unresolvable { reason, .. }] = module(&scheduler, "main").import_records()
    else {
        panic!()
    };
    assert_eq!(reason, "unknown library `std`");
}

#[test]
fn exporters_that_stop_early() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(let world (import "./earth"))"#);
    add(&mut scheduler, "earth.wf", r#"(@export (let world "Earth"))"#);

    scheduler.run_until(Stage::Define);
    let earth = module(&scheduler, "earth");
    assert_eq!(earth.status(), ModuleStatus::Finished);
    assert!(!earth.is_published());
    let [ImportRecord::Unresolvable { reason, .. }] = module(&scheduler, "main").import_records()
    else {
        panic!()
    };
    assert_eq!(reason, "`earth.wf` stops before publishing its exports");
}

#[test]
fn macros_waiting_for_a_later_stage() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", r#"(@json (let P (struct \name Str)))"#);

    let summary = scheduler.run_until(Stage::Import);
    assert_eq!((summary.finished, summary.errors), (1, 1));
    let main = module(&scheduler, "main");
    assert_eq!(main.diagnostics().ids(), ["IncompleteCompilation"]);
    let message = main.diagnostics().entries()[0].message().to_owned();
    assert!(message.contains("`@json` is still waiting for a later stage"), "{message}");
}

struct Eval;

impl Macro for Eval {
    fn expand(&self, env: &mut MacroEnv<'_>) -> MacroOutcome {
        env.unsupported("eval").into()
    }
}

#[test]
fn failed_exporters_fail_their_importers() {
    let mut registry = MacroRegistry::standard();
    registry.register("eval", Eval);
    let mut scheduler = Scheduler::with_registry(registry);
    add(&mut scheduler, "main.wf", r#"(let y (import "./dyn"))"#);
    add(&mut scheduler, "dyn.wf", r#"(@export (let y 1)) (eval "1")"#);

    let summary = scheduler.run_until(Stage::Run);
    assert_eq!((summary.finished, summary.failed), (1, 1));

    let dynamic = module(&scheduler, "dyn");
    assert_eq!(dynamic.status(), ModuleStatus::Failed);
    assert_eq!(dynamic.diagnostics().ids(), ["UnsupportedByInterpreter"]);

    let [ImportRecord::Unresolvable { reason, .. }] = module(&scheduler, "main").import_records()
    else {
        panic!()
    };
    assert_eq!(reason, "`dyn.wf` did not compile");
}

/// Settles without touching its call.
struct Noop;

impl Macro for Noop {
    fn expand(&self, _env: &mut MacroEnv<'_>) -> MacroOutcome {
        MacroOutcome::Done
    }
}

#[test]
fn macros_that_change_nothing_do_not_keep_cycles_alive() {
    let mut registry = MacroRegistry::standard();
    registry.register("noop", Noop);
    let mut scheduler = Scheduler::with_registry(registry);
    add(&mut scheduler, "a.wf", r#"(let x (import "./b")) (noop)"#);
    add(&mut scheduler, "b.wf", r#"(let y (import "./a"))"#);

    let summary = scheduler.run_until(Stage::Run);
    assert_eq!((summary.finished, summary.stuck, summary.errors), (0, 2, 2));
    for path in ["a", "b"] {
        let module = module(&scheduler, path);
        assert_eq!(module.status(), ModuleStatus::Stuck);
        assert_eq!(module.diagnostics().ids(), ["IncompleteCompilation"]);
    }
}

#[test]
fn finished_modules_stay_finished() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "main.wf", "(let x 1)");

    assert_eq!(scheduler.run_until(Stage::Define).finished, 1);
    let again = scheduler.run_until(Stage::Run);
    assert_eq!((again.rounds, again.finished), (0, 1));
    assert_eq!(module(&scheduler, "main").stage(), Stage::Define);
}

#[test]
fn first_module_wins() {
    let mut scheduler = Scheduler::new();
    add(&mut scheduler, "m.wf", "(let x 1)");
    add(&mut scheduler, "m.lua", "(let x 2)");

    let id = scheduler.find(&FilePath::file(["m"]).unwrap()).unwrap();
    assert_eq!(id.index(), 0);
    assert_eq!(scheduler.modules().len(), 2);
}
