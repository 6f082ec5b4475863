//! Macro expansion over [`weft_tree::Tree`]: the engine that finds and
//! invokes macro calls, and the `import`, `@export` and `@json` macros.

mod engine;
mod export;
mod import;
mod imports;
mod json;
mod specifier;
mod stage;

pub use engine::{
    ExpandContext, Expansion, FeatureHost, Fail, IMPORT_PENDING, Macro, MacroEngine, MacroEnv,
    MacroOutcome, MacroRegistry, NoFeatures,
};
pub use export::{ExportDecorator, collect_exports};
pub use import::{ImportMacro, PendingImport};
pub use imports::{
    BindError, Export, ExportTable, Exporter, ImportLedger, ImportRecord, Importer,
    create_local_bindings_for_import,
};
pub use json::JsonDecorator;
pub use specifier::{ResolvedSpecifier, Specifier, SpecifierError, resolve_specifier};
pub use stage::{Stage, UnknownStage};
