//! Operator descriptors and the ordered operator table.
//!
//! The table is consulted by the lexer (which symbols exist, longest match
//! first) and by the parser (one reduction rule per precedence group). The
//! evaluation routines live with the evaluator and are keyed by symbol and
//! arity, so this crate stays free of runtime values.

use std::cmp::Ordering;
use std::fmt;

/// One operator definition.
///
/// `left` and `right` state on which sides an operand is expected: a binary
/// operator has both, a prefix operator only `right`, a postfix operator
/// only `left`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Operator {
    pub symbol: String,
    pub precedence: i32,
    pub left: bool,
    pub right: bool,
    /// Whether the parser generates a reduction rule for this operator.
    /// `=` and `->` are recognised by dedicated rules instead.
    pub creates_rule: bool,
}

impl Operator {
    pub fn new(symbol: impl Into<String>, precedence: i32, left: bool, right: bool) -> Self {
        Self {
            symbol: symbol.into(),
            precedence,
            left,
            right,
            creates_rule: true,
        }
    }

    pub fn binary(symbol: impl Into<String>, precedence: i32) -> Self {
        Self::new(symbol, precedence, true, true)
    }

    pub fn prefix(symbol: impl Into<String>, precedence: i32) -> Self {
        Self::new(symbol, precedence, false, true)
    }

    pub fn postfix(symbol: impl Into<String>, precedence: i32) -> Self {
        Self::new(symbol, precedence, true, false)
    }

    /// An operator that only exists as a lexical symbol.
    pub fn without_rule(mut self) -> Self {
        self.creates_rule = false;
        self
    }

    /// Number of operands the operator consumes.
    pub fn arity(&self) -> usize {
        usize::from(self.left) + usize::from(self.right)
    }

    pub fn is_double_sided(&self) -> bool {
        self.left && self.right
    }

    /// `|>` and `>|` thread a value into a callable.
    pub fn is_pipeline(&self) -> bool {
        self.symbol == "|>" || self.symbol == ">|"
    }

    fn table_order(&self, other: &Self) -> Ordering {
        other
            .precedence
            .cmp(&self.precedence)
            .then_with(|| other.symbol.len().cmp(&self.symbol.len()))
            .then_with(|| other.left.cmp(&self.left))
            .then_with(|| self.right.cmp(&other.right))
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.left, self.right) {
            (true, true) => write!(f, "a {} b", self.symbol),
            (false, true) => write!(f, "{}a", self.symbol),
            (true, false) => write!(f, "a{}", self.symbol),
            (false, false) => write!(f, "{}", self.symbol),
        }
    }
}

/// The ordered operator registry of one runtime instance.
///
/// Sorted by precedence (descending), then symbol length (descending), then
/// left-associative operators before the others.
#[derive(Debug, Clone, Default)]
pub struct OperatorTable {
    operators: Vec<Operator>,
}

impl OperatorTable {
    /// An empty table.
    pub fn new() -> Self {
        Self::default()
    }

    /// The operators every Menter runtime starts with.
    pub fn standard() -> Self {
        let mut table = Self::new();
        for op in [
            Operator::postfix("++", 150),
            Operator::postfix("--", 150),
            Operator::prefix("++", 140),
            Operator::prefix("--", 140),
            Operator::prefix("+", 140),
            Operator::prefix("-", 140),
            Operator::prefix("!", 140),
            Operator::postfix("!", 140),
            Operator::binary("*", 120),
            Operator::binary("/", 120),
            Operator::binary("%", 120),
            Operator::binary("%%", 120),
            Operator::binary("+", 110),
            Operator::binary("-", 110),
            Operator::binary("::", 105),
            Operator::binary("<<", 100),
            Operator::binary(">>", 100),
            Operator::binary("<", 90),
            Operator::binary("<=", 90),
            Operator::binary(">", 90),
            Operator::binary(">=", 90),
            Operator::binary("==", 80),
            Operator::binary("!=", 80),
            Operator::binary("&", 70),
            Operator::binary("^", 60),
            Operator::binary("^^", 60),
            Operator::binary("|", 50),
            Operator::binary("&&", 40),
            Operator::binary("||", 30),
            Operator::binary("=", 10).without_rule(),
            Operator::binary("|>", 5),
            Operator::binary(">|", 5),
            Operator::binary("->", 0).without_rule(),
        ] {
            table.register(op);
        }
        table
    }

    /// Add an operator, replacing an existing one with the same symbol and
    /// operand sides.
    pub fn register(&mut self, operator: Operator) {
        self.operators.retain(|o| {
            !(o.symbol == operator.symbol && o.left == operator.left && o.right == operator.right)
        });
        self.operators.push(operator);
        self.operators.sort_by(Operator::table_order);
    }

    pub fn iter(&self) -> impl Iterator<Item = &Operator> {
        self.operators.iter()
    }

    pub fn len(&self) -> usize {
        self.operators.len()
    }

    pub fn is_empty(&self) -> bool {
        self.operators.is_empty()
    }

    /// Whether any registered operator has exactly this symbol.
    pub fn is_symbol(&self, symbol: &str) -> bool {
        self.operators.iter().any(|o| o.symbol == symbol)
    }

    pub fn find(&self, symbol: &str, left: bool, right: bool) -> Option<&Operator> {
        self.operators
            .iter()
            .find(|o| o.symbol == symbol && o.left == left && o.right == right)
    }

    /// First operator (in table order) with this symbol and arity.
    pub fn find_by_arity(&self, symbol: &str, arity: usize) -> Option<&Operator> {
        self.operators
            .iter()
            .find(|o| o.symbol == symbol && o.arity() == arity)
    }

    /// Rule-generating binary operators grouped by precedence, highest first.
    pub fn double_sided_groups(&self) -> Vec<Vec<Operator>> {
        self.groups(|o| o.is_double_sided())
    }

    /// Rule-generating prefix and postfix operators grouped by precedence.
    pub fn single_sided_groups(&self) -> Vec<Vec<Operator>> {
        self.groups(|o| o.left != o.right)
    }

    fn groups(&self, filter: impl Fn(&Operator) -> bool) -> Vec<Vec<Operator>> {
        let mut groups: Vec<Vec<Operator>> = Vec::new();
        for op in self.operators.iter().filter(|o| o.creates_rule && filter(o)) {
            match groups.last_mut() {
                Some(group) if group[0].precedence == op.precedence => group.push(op.clone()),
                _ => groups.push(vec![op.clone()]),
            }
        }
        groups
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_standard_table_sorted_by_precedence() {
        let table = OperatorTable::standard();
        let precedences: Vec<i32> = table.iter().map(|o| o.precedence).collect();
        let mut sorted = precedences.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(precedences, sorted);
    }

    #[test]
    fn test_longer_symbols_first_within_precedence() {
        let table = OperatorTable::standard();
        let group: Vec<&str> = table
            .iter()
            .filter(|o| o.precedence == 90)
            .map(|o| o.symbol.as_str())
            .collect();
        assert!(group[..2].iter().all(|s| s.len() == 2));
        assert!(group[2..].iter().all(|s| s.len() == 1));
    }

    #[test]
    fn test_postfix_before_prefix_on_same_symbol() {
        let table = OperatorTable::standard();
        let bangs: Vec<&Operator> = table.iter().filter(|o| o.symbol == "!").collect();
        assert_eq!(bangs.len(), 2);
        assert!(bangs[0].left && !bangs[0].right);
        assert!(!bangs[1].left && bangs[1].right);
    }

    #[test]
    fn test_find_and_arity() {
        let table = OperatorTable::standard();
        assert_eq!(table.find("-", false, true).map(|o| o.precedence), Some(140));
        assert_eq!(table.find_by_arity("-", 2).map(|o| o.precedence), Some(110));
        assert!(table.is_symbol("|>"));
        assert!(!table.is_symbol(":"));
    }

    #[test]
    fn test_groups_exclude_structural_operators() {
        let table = OperatorTable::standard();
        let double = table.double_sided_groups();
        assert!(double.iter().flatten().all(|o| o.symbol != "=" && o.symbol != "->"));
        assert_eq!(double[0][0].precedence, 120);
        assert_eq!(double.last().map(|g| g[0].symbol.as_str()), Some("|>"));

        let single = table.single_sided_groups();
        assert_eq!(single.len(), 2);
        assert_eq!(single[0][0].precedence, 150);
    }

    #[test]
    fn test_register_replaces_same_shape() {
        let mut table = OperatorTable::standard();
        let before = table.len();
        table.register(Operator::binary("*", 125));
        assert_eq!(table.len(), before);
        assert_eq!(table.find("*", true, true).map(|o| o.precedence), Some(125));

        table.register(Operator::binary("<>", 80));
        assert_eq!(table.len(), before + 1);
    }

    #[test]
    fn test_display_shapes() {
        assert_eq!(Operator::binary("+", 1).to_string(), "a + b");
        assert_eq!(Operator::prefix("-", 1).to_string(), "-a");
        assert_eq!(Operator::postfix("!", 1).to_string(), "a!");
    }
}
