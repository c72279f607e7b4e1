//! Source location tracking

use serde::{Deserialize, Serialize};

/// A 1-based line/column position in the script source
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub line: u32,
    pub column: u32,
}

impl Position {
    pub fn new(line: u32, column: u32) -> Self {
        Self { line, column }
    }

    /// True for positions synthesized without source information
    pub fn is_unknown(&self) -> bool {
        self.line == 0
    }
}

impl std::fmt::Display for Position {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "line: {}, column: {}", self.line, self.column)
    }
}

/// A value with source location
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Spanned<T> {
    pub node: T,
    #[serde(default)]
    pub pos: Position,
}

impl<T> Spanned<T> {
    pub fn new(node: T, pos: Position) -> Self {
        Self { node, pos }
    }

    /// Wrap a node without source information
    pub fn synthetic(node: T) -> Self {
        Self {
            node,
            pos: Position::default(),
        }
    }

    /// Reposition a node (used by tree builders)
    pub fn at(mut self, line: u32, column: u32) -> Self {
        self.pos = Position::new(line, column);
        self
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Spanned<U> {
        Spanned {
            node: f(self.node),
            pos: self.pos,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_position_display() {
        let pos = Position::new(3, 14);
        assert_eq!(pos.to_string(), "line: 3, column: 14");
    }

    #[test]
    fn test_position_default_is_unknown() {
        assert!(Position::default().is_unknown());
        assert!(!Position::new(1, 1).is_unknown());
    }

    #[test]
    fn test_spanned_at_repositions() {
        let node = Spanned::synthetic(42).at(7, 2);
        assert_eq!(node.pos, Position::new(7, 2));
        assert_eq!(node.node, 42);
    }

    #[test]
    fn test_spanned_map_keeps_position() {
        let node = Spanned::new(21, Position::new(2, 5));
        let doubled = node.map(|n| n * 2);
        assert_eq!(doubled.node, 42);
        assert_eq!(doubled.pos, Position::new(2, 5));
    }

    #[test]
    fn test_spanned_missing_pos_deserializes() {
        let node: Spanned<i64> = serde_json::from_str(r#"{"node": 5}"#).unwrap();
        assert_eq!(node.node, 5);
        assert!(node.pos.is_unknown());
    }
}
