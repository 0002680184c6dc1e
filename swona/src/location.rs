//! Source location tracking

use std::fmt;
use std::rc::Rc;

/// A location in source code.
///
/// Besides the position, the location keeps the text of the line it points
/// into so that diagnostics can show context without the full source text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub file: Rc<str>,
    /// 1-based line number
    pub line: usize,
    /// 1-based column number
    pub column: usize,
    pub line_text: Rc<str>,
}

impl SourceLocation {
    pub fn new(file: Rc<str>, line: usize, column: usize, line_text: Rc<str>) -> Self {
        Self {
            file,
            line,
            column,
            line_text,
        }
    }

    /// Location for expressions built through the embedding API rather than parsed.
    pub fn synthetic() -> Self {
        Self::new(Rc::from("<bridge>"), 0, 0, Rc::from(""))
    }

    /// Two line representation: the location, the line text and a caret
    /// under the column.
    pub fn to_long_string(&self) -> String {
        let prefix = format!("{} ", self);
        let indent = " ".repeat(self.column.saturating_sub(1) + prefix.chars().count());
        format!("{}{}\n{}^\n", prefix, self.line_text, indent)
    }
}

impl fmt::Display for SourceLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}:{}:{}]", self.file, self.line, self.column)
    }
}
