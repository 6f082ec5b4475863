use std::sync::Arc;

use weft_errors::MessageTemplate;
use weft_span::FilePath;
use weft_tree::{NodeKind, StayId, Symbol, Value};

use crate::engine::{Fail, IMPORT_PENDING, Macro, MacroEnv, MacroOutcome};
use crate::specifier::resolve_specifier;

/// `import("<specifier>")`.
///
/// Resolves the specifier, makes sure the enclosing declaration carries a
/// stay under `\stay`, hands the import to the `importPending` feature and
/// leaves an `Esc` node in place of the call.
#[derive(Debug, Default, Clone, Copy)]
pub struct ImportMacro;

impl Macro for ImportMacro {
    fn expand(&self, env: &mut MacroEnv<'_>) -> MacroOutcome {
        match import(env) {
            Ok(outcome) => outcome,
            Err(fail) => fail.into(),
        }
    }
}

fn import(env: &mut MacroEnv<'_>) -> Result<MacroOutcome, Fail> {
    env.check_arity(1)?;
    let Some(Value::Str(specifier)) = env.arg_value(0).cloned() else {
        return Err(env.fail(MessageTemplate::MalformedSpecifier));
    };
    let resolved = resolve_specifier(&specifier, env.path())
        .map_err(|err| env.fail(err.template(&specifier)))?
        .resolved;
    if !env.has_feature(IMPORT_PENDING) {
        return Err(env.unsupported(IMPORT_PENDING));
    }

    let pos = env.call_pos();
    let display: Arc<str> = format!("import({:?})", &*specifier).into();
    let esc = NodeKind::Esc { display };
    let stay = match env.enclosing_declaration() {
        None => {
            env.replace_call(|b| b.leaf_at(esc, pos));
            None
        }
        Some(decl) => {
            let existing = env.tree().metadata(decl, &Symbol::STAY).and_then(|leaf| {
                match env.tree().kind(leaf) {
                    NodeKind::Stay(stay) => Some(*stay),
                    _ => None,
                }
            });
            match existing {
                Some(stay) => {
                    env.replace_call(|b| b.leaf_at(esc, pos));
                    Some(stay)
                }
                None => {
                    let mut stay = None;
                    let edge = pos.right_edge();
                    env.replace_call_in_declaration(
                        |b| b.leaf_at(esc, pos),
                        |b| {
                            b.symbol(Symbol::STAY, edge.clone());
                            stay = Some(b.stay(edge));
                        },
                    );
                    stay
                }
            }
        }
    };

    let pending = PendingImport {
        specifier: specifier.to_string(),
        library: resolved.library().map(str::to_owned),
        path: resolved.path().clone(),
        stay,
    };
    tracing::debug!(specifier = %pending.specifier, stay = ?pending.stay, "import pending");
    env.call_feature(IMPORT_PENDING, &pending.to_args())?;
    Ok(MacroOutcome::Done)
}

/// An import handed to the `importPending` feature.
///
/// Travels as `[specifier, library or "", encoded path, stay or void]`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingImport {
    pub specifier: String,
    pub library: Option<String>,
    pub path: FilePath,
    /// Absent for imports evaluated for their effects only.
    pub stay: Option<StayId>,
}

impl PendingImport {
    pub fn to_args(&self) -> Vec<Value> {
        vec![
            Value::str(&self.specifier),
            Value::str(self.library.as_deref().unwrap_or("")),
            Value::from(&self.path),
            self.stay.map_or(Value::Void, Value::StayRef),
        ]
    }

    pub fn from_args(args: &[Value]) -> Option<Self> {
        let [specifier, library, path, stay] = args else {
            return None;
        };
        let library = match library.as_str()? {
            "" => None,
            name => Some(name.to_owned()),
        };
        let stay = match stay {
            Value::StayRef(stay) => Some(*stay),
            Value::Void => None,
            _ => return None,
        };
        Some(Self {
            specifier: specifier.as_str()?.to_owned(),
            library,
            path: FilePath::try_from(path).ok()?,
            stay,
        })
    }
}
