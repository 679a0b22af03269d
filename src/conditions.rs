//! Compilation of user-authored row conditions into typed predicates.
//!
//! Conditions reference design columns by name, for example
//! `alt1_price > alt2_price` or `if alt1_time > 20 then alt1_price < 3 & alt2_price >= 2`.
//! Names are resolved against the layout's column list when the condition is
//! compiled, so an unknown name fails before any search work begins. An
//! implication `if A then B` is stored as `!A | B`.
//!
//! Compiled predicates are evaluated either on one row (while the generator
//! fills an initial design) or across every row of a candidate matrix (while
//! the swapping optimizer screens a swap).

use nalgebra::DMatrix;

use crate::error::{DesignError, Result};

/// Relational operator of a comparison.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Comparison {
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    Equal,
    NotEqual,
}

impl Comparison {
    fn holds(self, lhs: f64, rhs: f64) -> bool {
        match self {
            Self::Less => lhs < rhs,
            Self::LessEqual => lhs <= rhs,
            Self::Greater => lhs > rhs,
            Self::GreaterEqual => lhs >= rhs,
            Self::Equal => lhs == rhs,
            Self::NotEqual => lhs != rhs,
        }
    }
}

/// Arithmetic operator inside an operand.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Arithmetic {
    Add,
    Subtract,
    Multiply,
    Divide,
}

/// Numeric side of a comparison.
#[derive(Clone, Debug, PartialEq)]
pub enum Operand {
    /// Value of a design column in the row being evaluated.
    Column(usize),
    Constant(f64),
    Negate(Box<Operand>),
    Binary {
        op: Arithmetic,
        lhs: Box<Operand>,
        rhs: Box<Operand>,
    },
}

impl Operand {
    fn value<F: Fn(usize) -> f64>(&self, cell: &F) -> f64 {
        match self {
            Self::Column(column) => cell(*column),
            Self::Constant(value) => *value,
            Self::Negate(inner) => -inner.value(cell),
            Self::Binary { op, lhs, rhs } => {
                let (lhs, rhs) = (lhs.value(cell), rhs.value(cell));
                match op {
                    Arithmetic::Add => lhs + rhs,
                    Arithmetic::Subtract => lhs - rhs,
                    Arithmetic::Multiply => lhs * rhs,
                    Arithmetic::Divide => lhs / rhs,
                }
            }
        }
    }

    fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            Self::Column(column) => out.push(*column),
            Self::Constant(_) => {}
            Self::Negate(inner) => inner.collect_columns(out),
            Self::Binary { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
        }
    }
}

/// Boolean expression tree over one design row.
#[derive(Clone, Debug, PartialEq)]
pub enum Predicate {
    Compare {
        lhs: Operand,
        op: Comparison,
        rhs: Operand,
    },
    Not(Box<Predicate>),
    All(Vec<Predicate>),
    Any(Vec<Predicate>),
}

impl Predicate {
    /// `if antecedent then consequent`, i.e. `!antecedent | consequent`.
    pub fn implication(antecedent: Predicate, consequent: Predicate) -> Self {
        Self::Any(vec![Self::Not(Box::new(antecedent)), consequent])
    }

    /// Evaluates the predicate with `cell(column)` supplying row values.
    pub fn holds<F: Fn(usize) -> f64>(&self, cell: &F) -> bool {
        match self {
            Self::Compare { lhs, op, rhs } => op.holds(lhs.value(cell), rhs.value(cell)),
            Self::Not(inner) => !inner.holds(cell),
            Self::All(parts) => parts.iter().all(|p| p.holds(cell)),
            Self::Any(parts) => parts.iter().any(|p| p.holds(cell)),
        }
    }

    fn collect_columns(&self, out: &mut Vec<usize>) {
        match self {
            Self::Compare { lhs, rhs, .. } => {
                lhs.collect_columns(out);
                rhs.collect_columns(out);
            }
            Self::Not(inner) => inner.collect_columns(out),
            Self::All(parts) | Self::Any(parts) => {
                parts.iter().for_each(|p| p.collect_columns(out));
            }
        }
    }
}

/// A compiled condition together with its source text.
#[derive(Clone, Debug)]
pub struct Condition {
    source: String,
    predicate: Predicate,
}

impl Condition {
    /// Parses `source`, resolving names against `columns`.
    pub fn compile(source: &str, columns: &[String]) -> Result<Self> {
        let tokens = tokenize(source)?;
        let mut parser = Parser {
            source,
            tokens,
            position: 0,
            columns,
        };
        let predicate = parser.condition()?;
        Ok(Self {
            source: source.to_string(),
            predicate,
        })
    }

    /// Original condition text.
    pub fn source(&self) -> &str {
        &self.source
    }

    /// Compiled predicate tree.
    pub fn predicate(&self) -> &Predicate {
        &self.predicate
    }

    /// Columns referenced by the condition, sorted and deduplicated.
    pub fn columns(&self) -> Vec<usize> {
        let mut columns = Vec::new();
        self.predicate.collect_columns(&mut columns);
        columns.sort_unstable();
        columns.dedup();
        columns
    }

    /// Evaluates the condition on a single row.
    pub fn holds_for_row(&self, design: &DMatrix<f64>, row: usize) -> bool {
        self.predicate.holds(&|column| design[(row, column)])
    }

    /// Evaluates the condition on every row.
    pub fn holds_for_design(&self, design: &DMatrix<f64>) -> bool {
        (0..design.nrows()).all(|row| self.holds_for_row(design, row))
    }
}

/// Ordered collection of compiled conditions; empty means unconstrained.
#[derive(Clone, Debug, Default)]
pub struct ConditionSet {
    conditions: Vec<Condition>,
}

impl ConditionSet {
    /// Compiles every source condition, preserving order.
    pub fn compile<S: AsRef<str>>(sources: &[S], columns: &[String]) -> Result<Self> {
        let conditions = sources
            .iter()
            .map(|source| Condition::compile(source.as_ref(), columns))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { conditions })
    }

    /// True when no conditions were supplied.
    pub fn is_empty(&self) -> bool {
        self.conditions.is_empty()
    }

    /// Number of compiled conditions.
    pub fn len(&self) -> usize {
        self.conditions.len()
    }

    /// Iterates over the compiled conditions in source order.
    pub fn iter(&self) -> impl Iterator<Item = &Condition> {
        self.conditions.iter()
    }

    /// Whether `row` satisfies every condition.
    pub fn row_satisfied(&self, design: &DMatrix<f64>, row: usize) -> bool {
        self.conditions.iter().all(|c| c.holds_for_row(design, row))
    }

    /// Whether every row satisfies every condition.
    pub fn design_satisfied(&self, design: &DMatrix<f64>) -> bool {
        self.conditions.iter().all(|c| c.holds_for_design(design))
    }
}

#[derive(Clone, Debug, PartialEq)]
enum Token {
    Ident(String),
    Number(f64),
    Compare(Comparison),
    Plus,
    Minus,
    Star,
    Slash,
    And,
    Or,
    Not,
    If,
    Then,
    Open,
    Close,
}

fn tokenize(source: &str) -> Result<Vec<(usize, Token)>> {
    let chars: Vec<(usize, char)> = source.char_indices().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let (offset, c) = chars[i];
        let next = chars.get(i + 1).map(|&(_, c)| c);

        if c.is_whitespace() {
            i += 1;
            continue;
        }

        if c.is_ascii_digit() || (c == '.' && next.is_some_and(|n| n.is_ascii_digit())) {
            let start = i;
            while i < chars.len() && (chars[i].1.is_ascii_digit() || chars[i].1 == '.') {
                i += 1;
            }
            let text: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| DesignError::syntax(source, offset, format!("bad number `{text}`")))?;
            tokens.push((offset, Token::Number(value)));
            continue;
        }

        if c.is_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].1.is_alphanumeric() || chars[i].1 == '_') {
                i += 1;
            }
            let word: String = chars[start..i].iter().map(|&(_, c)| c).collect();
            let token = match word.as_str() {
                "if" => Token::If,
                "then" => Token::Then,
                "and" => Token::And,
                "or" => Token::Or,
                "not" => Token::Not,
                _ => Token::Ident(word),
            };
            tokens.push((offset, token));
            continue;
        }

        let (token, width) = match (c, next) {
            ('<', Some('=')) => (Token::Compare(Comparison::LessEqual), 2),
            ('>', Some('=')) => (Token::Compare(Comparison::GreaterEqual), 2),
            ('=', Some('=')) => (Token::Compare(Comparison::Equal), 2),
            ('!', Some('=')) => (Token::Compare(Comparison::NotEqual), 2),
            ('&', Some('&')) => (Token::And, 2),
            ('|', Some('|')) => (Token::Or, 2),
            ('<', _) => (Token::Compare(Comparison::Less), 1),
            ('>', _) => (Token::Compare(Comparison::Greater), 1),
            ('=', _) => (Token::Compare(Comparison::Equal), 1),
            ('!', _) => (Token::Not, 1),
            ('&', _) => (Token::And, 1),
            ('|', _) => (Token::Or, 1),
            ('+', _) => (Token::Plus, 1),
            ('-', _) => (Token::Minus, 1),
            ('*', _) => (Token::Star, 1),
            ('/', _) => (Token::Slash, 1),
            ('(', _) => (Token::Open, 1),
            (')', _) => (Token::Close, 1),
            _ => {
                return Err(DesignError::syntax(
                    source,
                    offset,
                    format!("unexpected character `{c}`"),
                ))
            }
        };
        tokens.push((offset, token));
        i += width;
    }

    Ok(tokens)
}

/// Recursive-descent parser.
///
/// ```text
/// condition := "if" or "then" or | or
/// or        := and ("|" and)*
/// and       := unary ("&" unary)*
/// unary     := "!" unary | "(" or ")" | comparison
/// comparison:= sum cmp sum
/// sum       := term (("+" | "-") term)*
/// term      := factor (("*" | "/") factor)*
/// factor    := number | name | "-" factor | "(" sum ")"
/// ```
struct Parser<'a> {
    source: &'a str,
    tokens: Vec<(usize, Token)>,
    position: usize,
    columns: &'a [String],
}

impl Parser<'_> {
    fn peek(&self) -> Option<&Token> {
        self.tokens.get(self.position).map(|(_, token)| token)
    }

    fn offset(&self) -> usize {
        self.tokens
            .get(self.position)
            .map_or(self.source.len(), |(offset, _)| *offset)
    }

    fn error(&self, message: impl Into<String>) -> DesignError {
        DesignError::syntax(self.source, self.offset(), message)
    }

    fn eat(&mut self, token: &Token) -> bool {
        if self.peek() == Some(token) {
            self.position += 1;
            true
        } else {
            false
        }
    }

    fn condition(&mut self) -> Result<Predicate> {
        let predicate = if self.eat(&Token::If) {
            let antecedent = self.or()?;
            if !self.eat(&Token::Then) {
                return Err(self.error("expected `then`"));
            }
            let consequent = self.or()?;
            Predicate::implication(antecedent, consequent)
        } else {
            self.or()?
        };
        match self.peek() {
            None => Ok(predicate),
            Some(Token::Then) => Err(self.error("`then` without a leading `if`")),
            Some(_) => Err(self.error("unexpected trailing input")),
        }
    }

    fn or(&mut self) -> Result<Predicate> {
        let mut parts = vec![self.and()?];
        while self.eat(&Token::Or) {
            parts.push(self.and()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::Any(parts)
        })
    }

    fn and(&mut self) -> Result<Predicate> {
        let mut parts = vec![self.unary()?];
        while self.eat(&Token::And) {
            parts.push(self.unary()?);
        }
        Ok(if parts.len() == 1 {
            parts.remove(0)
        } else {
            Predicate::All(parts)
        })
    }

    fn unary(&mut self) -> Result<Predicate> {
        if self.eat(&Token::Not) {
            return Ok(Predicate::Not(Box::new(self.unary()?)));
        }
        if self.peek() == Some(&Token::Open) {
            // A parenthesis opens either a boolean group or an arithmetic operand.
            let start = self.position;
            self.position += 1;
            if let Ok(inner) = self.or() {
                if self.eat(&Token::Close) {
                    return Ok(inner);
                }
            }
            self.position = start;
        }
        self.comparison()
    }

    fn comparison(&mut self) -> Result<Predicate> {
        let lhs = self.sum()?;
        let op = match self.peek() {
            Some(Token::Compare(op)) => *op,
            _ => return Err(self.error("expected a comparison operator")),
        };
        self.position += 1;
        let rhs = self.sum()?;
        Ok(Predicate::Compare { lhs, op, rhs })
    }

    fn sum(&mut self) -> Result<Operand> {
        let mut lhs = self.term()?;
        loop {
            let op = match self.peek() {
                Some(Token::Plus) => Arithmetic::Add,
                Some(Token::Minus) => Arithmetic::Subtract,
                _ => return Ok(lhs),
            };
            self.position += 1;
            let rhs = self.term()?;
            lhs = Operand::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn term(&mut self) -> Result<Operand> {
        let mut lhs = self.factor()?;
        loop {
            let op = match self.peek() {
                Some(Token::Star) => Arithmetic::Multiply,
                Some(Token::Slash) => Arithmetic::Divide,
                _ => return Ok(lhs),
            };
            self.position += 1;
            let rhs = self.factor()?;
            lhs = Operand::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
            };
        }
    }

    fn factor(&mut self) -> Result<Operand> {
        let token = match self.peek() {
            Some(token) => token.clone(),
            None => return Err(self.error("unexpected end of condition")),
        };
        self.position += 1;
        match token {
            Token::Number(value) => Ok(Operand::Constant(value)),
            Token::Ident(name) => match self.columns.iter().position(|c| *c == name) {
                Some(column) => Ok(Operand::Column(column)),
                None => Err(DesignError::UnknownAttribute {
                    condition: self.source.to_string(),
                    name,
                }),
            },
            Token::Minus => Ok(Operand::Negate(Box::new(self.factor()?))),
            Token::Open => {
                let inner = self.sum()?;
                if !self.eat(&Token::Close) {
                    return Err(self.error("expected `)`"));
                }
                Ok(inner)
            }
            _ => {
                self.position -= 1;
                Err(self.error("expected a number or attribute name"))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn columns() -> Vec<String> {
        ["alt1_price", "alt1_time", "alt2_price", "alt2_time"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(values: [f64; 4]) -> DMatrix<f64> {
        DMatrix::from_row_slice(1, 4, &values)
    }

    #[test]
    fn compiles_simple_relation() {
        let condition = Condition::compile("alt1_price > alt2_price", &columns()).unwrap();
        assert_eq!(condition.columns(), vec![0, 2]);
        assert!(condition.holds_for_row(&row([3.0, 0.0, 2.0, 0.0]), 0));
        assert!(!condition.holds_for_row(&row([2.0, 0.0, 2.0, 0.0]), 0));
    }

    #[test]
    fn implication_is_vacuous_when_antecedent_fails() {
        let source = "if alt1_time > 20 then alt1_price < 3 & alt2_price >= 2";
        let condition = Condition::compile(source, &columns()).unwrap();
        // Antecedent false: holds regardless of prices.
        assert!(condition.holds_for_row(&row([9.0, 10.0, 0.0, 0.0]), 0));
        // Antecedent true, consequent true.
        assert!(condition.holds_for_row(&row([2.0, 30.0, 2.0, 0.0]), 0));
        // Antecedent true, second conjunct fails.
        assert!(!condition.holds_for_row(&row([2.0, 30.0, 1.0, 0.0]), 0));
    }

    #[test]
    fn arithmetic_and_parentheses() {
        let cols = columns();
        let sum = Condition::compile("(alt1_price + alt2_price) * 2 <= 10", &cols).unwrap();
        assert!(sum.holds_for_row(&row([2.0, 0.0, 3.0, 0.0]), 0));
        assert!(!sum.holds_for_row(&row([3.0, 0.0, 3.0, 0.0]), 0));

        let grouped =
            Condition::compile("!(alt1_time == alt2_time) | alt1_price != -1", &cols).unwrap();
        assert!(grouped.holds_for_row(&row([-1.0, 1.0, 0.0, 2.0]), 0));
        assert!(!grouped.holds_for_row(&row([-1.0, 1.0, 0.0, 1.0]), 0));
    }

    #[test]
    fn whole_design_requires_every_row() {
        let set = ConditionSet::compile(&["alt1_time < alt2_time"], &columns()).unwrap();
        let mut design = DMatrix::from_row_slice(2, 4, &[0.0, 1.0, 0.0, 2.0, 0.0, 1.0, 0.0, 3.0]);
        assert!(set.design_satisfied(&design));
        design[(1, 3)] = 0.0;
        assert!(set.row_satisfied(&design, 0));
        assert!(!set.design_satisfied(&design));
    }

    #[test]
    fn unknown_names_fail_at_compile_time() {
        let result = Condition::compile("alt1_price > alt3_price", &columns());
        match result {
            Err(DesignError::UnknownAttribute { name, .. }) => assert_eq!(name, "alt3_price"),
            other => panic!("expected unknown attribute, got {other:?}"),
        }
    }

    #[test]
    fn reports_syntax_errors() {
        let cols = columns();
        assert!(matches!(
            Condition::compile("alt1_price >", &cols),
            Err(DesignError::ConditionSyntax { .. })
        ));
        assert!(matches!(
            Condition::compile("alt1_price > 1 then alt2_price < 2", &cols),
            Err(DesignError::ConditionSyntax { .. })
        ));
        assert!(matches!(
            Condition::compile("alt1_price # 2", &cols),
            Err(DesignError::ConditionSyntax { position: 11, .. })
        ));
    }
}
