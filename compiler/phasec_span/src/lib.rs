use index_vec::define_index_type;
use internment::Intern;
use std::fmt;

define_index_type! {
    pub struct FileID = u32;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Span {
    pub start: Position,
    pub end: Position,
    pub file: FileID,
}

impl Span {
    /// Span covering the start of `line`.
    pub fn line(file: FileID, line: usize) -> Span {
        Span {
            start: Position { line, offset: 0 },
            end: Position { line, offset: 0 },
            file,
        }
    }
}

impl fmt::Display for Span {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "file#{}:{}:{}",
            self.file.index(),
            self.start.line,
            self.start.offset
        )
    }
}

#[derive(Debug, Default, Copy, Clone, PartialEq, Eq, Hash)]
pub struct Position {
    pub line: usize,
    pub offset: usize,
}

/// Interned identifier. Cheap to copy and comparable across threads.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Symbol(Intern<String>);

impl Symbol {
    pub fn new(string: &str) -> Symbol {
        Symbol(Intern::new(String::from(string)))
    }

    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Splits `pkg.sub.Name` into (`pkg.sub`, `Name`).
    pub fn split_qualified(&self) -> Option<(Symbol, Symbol)> {
        let (package, name) = self.as_str().rsplit_once('.')?;
        Some((Symbol::new(package), Symbol::new(name)))
    }
}

impl From<&str> for Symbol {
    fn from(value: &str) -> Self {
        Symbol::new(value)
    }
}

impl fmt::Debug for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self.as_str(), f)
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(self.as_str(), f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_symbol_interning() {
        let a = Symbol::new("Deprecated");
        let b = Symbol::from("Deprecated");
        assert_eq!(a, b);
        assert_eq!(a.as_str(), "Deprecated");
    }

    #[test]
    fn test_split_qualified() {
        let (package, name) = Symbol::new("lib.util.Marker").split_qualified().unwrap();
        assert_eq!(package.as_str(), "lib.util");
        assert_eq!(name.as_str(), "Marker");
        assert!(Symbol::new("Marker").split_qualified().is_none());
    }

    #[test]
    fn test_line_span_display() {
        let span = Span::line(FileID::new(2), 7);
        assert_eq!(span.start, span.end);
        assert_eq!(span.to_string(), "file#2:7:0");
    }
}
