//! Source texts fed to the pipeline, tracked by salsa so line tables are
//! computed once per file revision.

pub use line_index::{LineCol, LineIndex};
use text_size::TextSize;

#[salsa::db]
#[derive(Default, Clone)]
pub struct SourceDb {
    storage: salsa::Storage<Self>,
}

#[salsa::db]
impl salsa::Database for SourceDb {}

#[salsa::input(debug)]
pub struct File {
    #[returns(ref)]
    pub path: camino::Utf8PathBuf,
    #[returns(deref)]
    pub text: String,
}

#[salsa::tracked]
impl File {
    #[salsa::tracked(returns(ref), no_eq)]
    pub fn line_index(self, db: &dyn salsa::Database) -> LineIndex {
        LineIndex::new(self.text(db))
    }
}

impl File {
    /// One-based line and column, the way editors print them.
    pub fn line_col(self, db: &dyn salsa::Database, offset: TextSize) -> (u32, u32) {
        let LineCol { line, col } = self.line_index(db).line_col(offset);
        (line + 1, col + 1)
    }

    pub fn location_header(self, db: &dyn salsa::Database, offset: TextSize) -> String {
        let (line, col) = self.line_col(db, offset);
        format!("{}:{line}:{col}", self.path(db))
    }
}

#[cfg(test)]
mod tests {
    use salsa::Setter as _;

    use super::*;

    #[test]
    fn line_col_follows_edits() {
        let mut db = SourceDb::default();
        let file = File::new(&db, "m.weft".into(), "(let x 1)\n(let y 2)\n".to_owned());
        assert_eq!(file.line_col(&db, TextSize::new(12)), (2, 3));
        assert_eq!(file.location_header(&db, TextSize::new(0)), "m.weft:1:1");

        file.set_text(&mut db).to("\n\n(let y 2)\n".to_owned());
        assert_eq!(file.line_col(&db, TextSize::new(2)), (3, 1));
    }
}
