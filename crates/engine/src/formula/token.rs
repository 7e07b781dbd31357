//! Formula tokens and token sequences.
//!
//! A formula is edited as an ordered list of tokens. Variable and product
//! tokens carry two texts: the stable id that gets persisted (`raw_text`) and
//! the human name shown while editing (`display_text`). Renaming a variable
//! therefore never breaks a stored formula.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

use crate::catalog::ProductRef;

use super::refs;

static NEXT_TOKEN_ID: AtomicU64 = AtomicU64::new(1);

/// Process-local token identity. Only used to tell list entries apart.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenId(u64);

impl TokenId {
    pub fn next() -> Self {
        Self(NEXT_TOKEN_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn raw(&self) -> u64 {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenKind {
    Variable,
    Product,
    Operator,
    Number,
}

impl TokenKind {
    /// Variables, products and numbers are operands.
    pub fn is_operand(&self) -> bool {
        !matches!(self, TokenKind::Operator)
    }

    pub fn is_reference(&self) -> bool {
        matches!(self, TokenKind::Variable | TokenKind::Product)
    }

    /// Lowercase noun used in validation messages.
    pub fn noun(&self) -> &'static str {
        match self {
            TokenKind::Variable => "variable",
            TokenKind::Product => "product",
            TokenKind::Operator => "operator",
            TokenKind::Number => "number",
        }
    }
}

/// The operator vocabulary, parentheses included.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
    LParen,
    RParen,
}

impl Operator {
    pub const ALL: [Operator; 7] = [
        Operator::Add,
        Operator::Sub,
        Operator::Mul,
        Operator::Div,
        Operator::Pow,
        Operator::LParen,
        Operator::RParen,
    ];

    pub fn from_char(c: char) -> Option<Self> {
        match c {
            '+' => Some(Operator::Add),
            '-' => Some(Operator::Sub),
            '*' => Some(Operator::Mul),
            '/' => Some(Operator::Div),
            '^' => Some(Operator::Pow),
            '(' => Some(Operator::LParen),
            ')' => Some(Operator::RParen),
            _ => None,
        }
    }

    /// Parse a whole (trimmed) input as a single operator.
    pub fn from_text(text: &str) -> Option<Self> {
        let mut chars = text.trim().chars();
        match (chars.next(), chars.next()) {
            (Some(c), None) => Self::from_char(c),
            _ => None,
        }
    }

    pub fn as_char(&self) -> char {
        match self {
            Operator::Add => '+',
            Operator::Sub => '-',
            Operator::Mul => '*',
            Operator::Div => '/',
            Operator::Pow => '^',
            Operator::LParen => '(',
            Operator::RParen => ')',
        }
    }

    /// Binary arithmetic operators (parentheses excluded).
    pub fn is_arithmetic(&self) -> bool {
        !matches!(self, Operator::LParen | Operator::RParen)
    }
}

impl std::fmt::Display for Operator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_char())
    }
}

/// One lexical unit of a formula. Immutable once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Token {
    pub id: TokenId,
    pub kind: TokenKind,
    pub raw_text: String,
    pub display_text: String,
}

impl Token {
    fn new(kind: TokenKind, raw_text: String, display_text: String) -> Self {
        Self { id: TokenId::next(), kind, raw_text, display_text }
    }

    pub fn variable(id: impl Into<String>, name: impl Into<String>) -> Self {
        Self::new(TokenKind::Variable, id.into(), name.into())
    }

    pub fn product(id: impl Into<String>, title: impl Into<String>) -> Self {
        Self::new(TokenKind::Product, id.into(), title.into())
    }

    pub fn operator(op: Operator) -> Self {
        let text = op.as_char().to_string();
        Self::new(TokenKind::Operator, text.clone(), text)
    }

    pub fn number(literal: impl Into<String>) -> Self {
        let text = literal.into();
        Self::new(TokenKind::Number, text.clone(), text)
    }

    /// The operator this token stands for, if it is one.
    pub fn as_operator(&self) -> Option<Operator> {
        match self.kind {
            TokenKind::Operator => Operator::from_text(&self.raw_text),
            _ => None,
        }
    }

    pub fn is_operand(&self) -> bool {
        self.kind.is_operand()
    }

    pub fn is_op(&self, op: Operator) -> bool {
        self.as_operator() == Some(op)
    }

    /// True for binary arithmetic operators (parentheses excluded).
    pub fn is_arithmetic_operator(&self) -> bool {
        self.as_operator().is_some_and(|op| op.is_arithmetic())
    }

    /// Semantic equality: same kind and same stored text. Ids are ignored.
    pub fn same_as(&self, other: &Token) -> bool {
        self.kind == other.kind && self.raw_text == other.raw_text
    }

    /// A copy of this token with a fresh id and a new display text.
    pub fn with_display(&self, display_text: impl Into<String>) -> Self {
        Self::new(self.kind, self.raw_text.clone(), display_text.into())
    }

    fn write_to(&self, out: &mut String, text: &str) {
        if self.kind.is_reference() {
            out.push('{');
            out.push_str(text);
            out.push('}');
        } else {
            out.push_str(text);
        }
    }
}

/// An ordered token list. Order is the expression, left to right.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct FormulaSequence {
    tokens: Vec<Token>,
}

impl FormulaSequence {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_tokens(tokens: Vec<Token>) -> Self {
        Self { tokens }
    }

    pub fn tokens(&self) -> &[Token] {
        &self.tokens
    }

    pub fn len(&self) -> usize {
        self.tokens.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tokens.is_empty()
    }

    pub fn last(&self) -> Option<&Token> {
        self.tokens.last()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Token> {
        self.tokens.iter()
    }

    /// Append without validation. Callers that edit interactively go
    /// through `FormulaEditor`, which gates every append.
    pub fn push(&mut self, token: Token) {
        self.tokens.push(token);
    }

    /// Remove a token by id. Returns the removed token.
    pub fn remove(&mut self, id: TokenId) -> Option<Token> {
        let pos = self.tokens.iter().position(|t| t.id == id)?;
        Some(self.tokens.remove(pos))
    }

    pub fn clear(&mut self) {
        self.tokens.clear();
    }

    /// Storage form: references wrapped in braces around their ids.
    pub fn to_storage_string(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write_to(&mut out, &token.raw_text);
        }
        out
    }

    /// Editing form: references wrapped in braces around their names.
    pub fn to_display_string(&self) -> String {
        let mut out = String::new();
        for token in &self.tokens {
            token.write_to(&mut out, &token.display_text);
        }
        out
    }

    /// `(kind, raw_text)` pairs, for comparisons that ignore token ids.
    pub fn signature(&self) -> Vec<(TokenKind, &str)> {
        self.tokens.iter().map(|t| (t.kind, t.raw_text.as_str())).collect()
    }

    pub fn same_as(&self, other: &FormulaSequence) -> bool {
        self.len() == other.len() && self.iter().zip(other.iter()).all(|(a, b)| a.same_as(b))
    }

    /// True if the sequence references no variables or products.
    pub fn is_literal(&self) -> bool {
        self.tokens.iter().all(|t| !t.kind.is_reference())
    }
}

impl<'a> IntoIterator for &'a FormulaSequence {
    type Item = &'a Token;
    type IntoIter = std::slice::Iter<'a, Token>;

    fn into_iter(self) -> Self::IntoIter {
        self.tokens.iter()
    }
}

/// Tokenize a formula string.
///
/// `{...}` spans become references: a span naming a product (by title,
/// case-insensitive, or by id) becomes a `Product` token, anything else a
/// `Variable` token whose raw and display text are the span text. Name to id
/// mapping for variables is the resolver's job (`resolve::hydrate`).
///
/// Maximal digit/`.` runs become numbers, operator characters become
/// operators, whitespace separates, and anything else is dropped.
pub fn parse(formula: &str, products: &[ProductRef]) -> FormulaSequence {
    let mut tokens = Vec::new();
    let mut chars = formula.char_indices().peekable();

    while let Some(&(i, c)) = chars.peek() {
        match c {
            '{' => {
                match refs::span_at(formula, i) {
                    Some(span) => {
                        if !span.inner.trim().is_empty() {
                            tokens.push(reference_token(span.inner, products));
                        }
                        while chars.peek().is_some_and(|&(j, _)| j < span.end) {
                            chars.next();
                        }
                    }
                    // Unterminated brace: drop it and keep scanning
                    None => {
                        chars.next();
                    }
                }
            }
            '0'..='9' | '.' => {
                let mut literal = String::new();
                while let Some(&(_, d)) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        literal.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                tokens.push(Token::number(literal));
            }
            _ => {
                if let Some(op) = Operator::from_char(c) {
                    tokens.push(Token::operator(op));
                }
                chars.next();
            }
        }
    }

    FormulaSequence::from_tokens(tokens)
}

fn reference_token(text: &str, products: &[ProductRef]) -> Token {
    let text = text.trim();
    match products.iter().find(|p| p.id == text || p.title_matches(text)) {
        Some(product) => Token::product(product.id.clone(), product.title.clone()),
        None => Token::variable(text, text),
    }
}
