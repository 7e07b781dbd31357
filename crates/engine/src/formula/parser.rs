// Arithmetic parser - converts stored formula strings into an AST
// Supports: decimal literals, {id} references, + - * / ^, unary sign, parentheses

/// Arithmetic expression AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    /// Reference span, resolved to a number at evaluation time
    Ref(String),
    Neg(Box<Expr>),
    BinaryOp {
        op: Op,
        left: Box<Expr>,
        right: Box<Expr>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

pub const MAX_NESTING: usize = 256;
pub const MAX_TOKENS: usize = 4096;

/// Parse a formula string into an AST.
///
/// Grammar, loosest to tightest (all binary operators left-associative):
///
/// ```text
/// expr     := term (('+' | '-') term)*
/// term     := unary (('*' | '/') unary)*
/// unary    := ('+' | '-') unary | power
/// power    := primary ('^' exponent)*
/// exponent := ('+' | '-') exponent | primary
/// primary  := number | {ref} | '(' expr ')'
/// ```
///
/// Parentheses and sign prefixes nest at most `MAX_NESTING` deep, and a
/// formula holds at most `MAX_TOKENS` tokens; past either limit the formula
/// is rejected instead of exhausting the stack.
pub fn parse(formula: &str) -> Result<Expr, String> {
    let tokens = tokenize(formula)?;
    if tokens.is_empty() {
        return Err("Empty formula".to_string());
    }
    if tokens.len() > MAX_TOKENS {
        return Err("Formula too long".to_string());
    }
    let (expr, pos) = parse_add_sub(&tokens, 0, 0)?;
    match tokens.get(pos) {
        None => Ok(expr),
        Some(Token::RParen) => Err("Unmatched closing parenthesis".to_string()),
        Some(_) => Err(format!("Unexpected token at position {}", pos)),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Ref(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

fn tokenize(input: &str) -> Result<Vec<Token>, String> {
    let mut tokens = Vec::new();
    let mut chars = input.chars().peekable();

    while let Some(&c) = chars.peek() {
        match c {
            c if c.is_whitespace() => { chars.next(); }
            '+' => { tokens.push(Token::Plus); chars.next(); }
            '-' => { tokens.push(Token::Minus); chars.next(); }
            '*' => { tokens.push(Token::Star); chars.next(); }
            '/' => { tokens.push(Token::Slash); chars.next(); }
            '^' => { tokens.push(Token::Caret); chars.next(); }
            '(' => { tokens.push(Token::LParen); chars.next(); }
            ')' => { tokens.push(Token::RParen); chars.next(); }
            '{' => {
                chars.next(); // consume opening brace
                let mut id = String::new();
                loop {
                    match chars.next() {
                        Some('}') => break,
                        Some(ch) => id.push(ch),
                        None => return Err("Unterminated reference".to_string()),
                    }
                }
                if id.is_empty() {
                    return Err("Empty reference".to_string());
                }
                tokens.push(Token::Ref(id));
            }
            '0'..='9' | '.' => {
                let mut num_str = String::new();
                while let Some(&d) = chars.peek() {
                    if d.is_ascii_digit() || d == '.' {
                        num_str.push(d);
                        chars.next();
                    } else {
                        break;
                    }
                }
                let num: f64 = num_str.parse().map_err(|_| format!("Invalid number: {}", num_str))?;
                tokens.push(Token::Number(num));
            }
            _ => return Err(format!("Unexpected character: {}", c)),
        }
    }

    Ok(tokens)
}

fn parse_add_sub(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_mul_div(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Plus => Op::Add,
            Token::Minus => Op::Sub,
            _ => break,
        };
        let (right, new_pos) = parse_mul_div(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn parse_mul_div(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut left, mut pos) = parse_unary(tokens, pos, depth)?;

    while pos < tokens.len() {
        let op = match &tokens[pos] {
            Token::Star => Op::Mul,
            Token::Slash => Op::Div,
            _ => break,
        };
        let (right, new_pos) = parse_unary(tokens, pos + 1, depth)?;
        left = Expr::BinaryOp {
            op,
            left: Box::new(left),
            right: Box::new(right),
        };
        pos = new_pos;
    }

    Ok((left, pos))
}

fn deeper(depth: usize) -> Result<usize, String> {
    if depth >= MAX_NESTING {
        return Err("Formula nested too deeply".to_string());
    }
    Ok(depth + 1)
}

// Unary sign binds looser than ^, so -2^2 is -(2^2)
fn parse_unary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        Some(Token::Plus) => parse_unary(tokens, pos + 1, deeper(depth)?),
        Some(Token::Minus) => {
            let (expr, pos) = parse_unary(tokens, pos + 1, deeper(depth)?)?;
            Ok((Expr::Neg(Box::new(expr)), pos))
        }
        _ => parse_power(tokens, pos, depth),
    }
}

// Exponentiation (^) - left-associative like the other binary operators
fn parse_power(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    let (mut base, mut pos) = parse_primary(tokens, pos, depth)?;

    while let Some(Token::Caret) = tokens.get(pos) {
        let (exponent, new_pos) = parse_exponent(tokens, pos + 1, depth)?;
        base = Expr::BinaryOp {
            op: Op::Pow,
            left: Box::new(base),
            right: Box::new(exponent),
        };
        pos = new_pos;
    }

    Ok((base, pos))
}

fn parse_exponent(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    match tokens.get(pos) {
        Some(Token::Plus) => parse_exponent(tokens, pos + 1, deeper(depth)?),
        Some(Token::Minus) => {
            let (expr, pos) = parse_exponent(tokens, pos + 1, deeper(depth)?)?;
            Ok((Expr::Neg(Box::new(expr)), pos))
        }
        _ => parse_primary(tokens, pos, depth),
    }
}

fn parse_primary(tokens: &[Token], pos: usize, depth: usize) -> Result<(Expr, usize), String> {
    if pos >= tokens.len() {
        return Err("Unexpected end of expression".to_string());
    }

    match &tokens[pos] {
        Token::Number(n) => Ok((Expr::Number(*n), pos + 1)),
        Token::Ref(id) => Ok((Expr::Ref(id.clone()), pos + 1)),
        Token::LParen => {
            let (expr, pos) = parse_add_sub(tokens, pos + 1, deeper(depth)?)?;
            match tokens.get(pos) {
                Some(Token::RParen) => Ok((expr, pos + 1)),
                None => Err("Missing closing parenthesis".to_string()),
                Some(_) => Err("Expected closing parenthesis".to_string()),
            }
        }
        Token::RParen => Err("Empty parentheses".to_string()),
        _ => Err(format!("Unexpected token at position {}", pos)),
    }
}
