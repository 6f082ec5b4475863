use std::fmt;
use std::str::FromStr;

/// Coarse checkpoints of a compilation unit, in pipeline order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Stage {
    Import,
    Define,
    Type,
    Export,
    GenerateCode,
    Run,
}

impl Stage {
    pub const ALL: [Self; 6] =
        [Self::Import, Self::Define, Self::Type, Self::Export, Self::GenerateCode, Self::Run];

    pub fn next(self) -> Option<Self> {
        match self {
            Self::Import => Some(Self::Define),
            Self::Define => Some(Self::Type),
            Self::Type => Some(Self::Export),
            Self::Export => Some(Self::GenerateCode),
            Self::GenerateCode => Some(Self::Run),
            Self::Run => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Import => "import",
            Self::Define => "define",
            Self::Type => "type",
            Self::Export => "export",
            Self::GenerateCode => "generate-code",
            Self::Run => "run",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown stage `{0}`")]
pub struct UnknownStage(String);

impl FromStr for Stage {
    type Err = UnknownStage;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|stage| stage.name() == s)
            .ok_or_else(|| UnknownStage(s.to_owned()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn stages_are_ordered() {
        assert!(Stage::Import < Stage::Define);
        assert!(Stage::GenerateCode < Stage::Run);
        let walked = std::iter::successors(Some(Stage::Import), |s| s.next()).collect::<Vec<_>>();
        assert_eq!(walked, Stage::ALL);
    }

    #[test]
    fn parse_names() {
        assert_eq!("generate-code".parse(), Ok(Stage::GenerateCode));
        assert_eq!("later".parse::<Stage>(), Err(UnknownStage("later".to_owned())));
    }
}
