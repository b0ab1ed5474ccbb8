//! The closed set of operators and their shunting-yard precedence.
//!
//! Precedence follows the source engine exactly: higher binds tighter.
//! `OBrace`/`CBrace` exist only to drive the parser's stack discipline and
//! never survive into a completed AST; `Invalid` is returned by the lexer
//! for a byte that looked like an operator-candidate but wasn't one.

/// A single operator symbol understood by the engine.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Not,
    Plus,
    Mult,
    And,
    Or,
    Ge,
    Gt,
    Le,
    Lt,
    OBrace,
    CBrace,
    Invalid,
}

impl Operator {
    /// Shunting-yard precedence: higher binds tighter.
    pub fn precedence(self) -> i32 {
        match self {
            Operator::Not => 6,
            Operator::Plus => 5,
            Operator::Ge | Operator::Gt | Operator::Le | Operator::Lt => 4,
            Operator::Mult | Operator::And => 3,
            Operator::Or => 2,
            Operator::OBrace | Operator::CBrace => 1,
            Operator::Invalid => -1,
        }
    }

    /// Whether this operator takes exactly one operand.
    pub fn is_unary(self) -> bool {
        matches!(self, Operator::Not)
    }

    /// Whether this is one of the four ordering comparisons.
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            Operator::Ge | Operator::Gt | Operator::Le | Operator::Lt
        )
    }

    /// Whether chained applications of this operator flatten into one n-ary
    /// node (see `ast::attach`). Comparisons are deliberately excluded: each
    /// comparison keeps exactly one `Limit` child and one operand child.
    pub fn is_flattenable(self) -> bool {
        matches!(
            self,
            Operator::Plus | Operator::Mult | Operator::And | Operator::Or
        )
    }

    /// The canonical rendering used by the pretty-printer.
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Not => "!",
            Operator::Plus => "+",
            Operator::Mult => "*",
            Operator::And => "&",
            Operator::Or => "|",
            Operator::Ge => ">=",
            Operator::Gt => ">",
            Operator::Le => "<=",
            Operator::Lt => "<",
            Operator::OBrace => "(",
            Operator::CBrace => ")",
            Operator::Invalid => "???",
        }
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn precedence_ordering() {
        assert!(Operator::Not.precedence() > Operator::Plus.precedence());
        assert!(Operator::Plus.precedence() > Operator::Ge.precedence());
        assert!(Operator::Ge.precedence() > Operator::And.precedence());
        assert!(Operator::And.precedence() > Operator::Or.precedence());
        assert!(Operator::Or.precedence() > Operator::OBrace.precedence());
    }

    #[test]
    fn flattenable_set_excludes_comparisons_and_not() {
        assert!(Operator::Plus.is_flattenable());
        assert!(Operator::Mult.is_flattenable());
        assert!(Operator::And.is_flattenable());
        assert!(Operator::Or.is_flattenable());
        assert!(!Operator::Not.is_flattenable());
        assert!(!Operator::Ge.is_flattenable());
        assert!(!Operator::Gt.is_flattenable());
        assert!(!Operator::Le.is_flattenable());
        assert!(!Operator::Lt.is_flattenable());
    }
}
