//! Arithmetic Expression Evaluation
//!
//! Evaluates `$((...))` expressions with the full C-style operator set:
//! arithmetic, comparison, bitwise, logical, power, ternary, assignments,
//! and pre/post increment/decrement. Numeric model is signed 64-bit with
//! wrapping semantics on `+ - * <<`, `~` and unary minus.
//!
//! Pipeline: tokenize -> normalize (fuse unary +/-, resolve `++`/`--`)
//! -> shunting-yard to RPN -> stack evaluation. Variable reads and writes
//! go through an injected [`ArithContext`]; writes surface readonly
//! failures to the caller.

use thiserror::Error;

/// Variable access for the evaluator. The interpreter supplies an adapter
/// over its variable manager.
pub trait ArithContext {
    fn read_variable(&mut self, name: &str) -> i64;
    fn write_variable(&mut self, name: &str, value: i64) -> Result<(), ArithmeticError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ArithmeticError {
    #[error("division by 0")]
    DivisionByZero,
    #[error("exponent less than 0")]
    NegativeExponent,
    #[error("invalid number: {0}")]
    InvalidNumber(String),
    #[error("{0}: readonly variable")]
    ReadonlyVariable(String),
    #[error("syntax error in arithmetic expression: {0}")]
    Syntax(String),
    #[error("attempted assignment to non-variable")]
    NotAnLvalue,
}

// ============================================================================
// Tokens
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Mod,
    Pow,
    Lt,
    Le,
    Gt,
    Ge,
    Eq,
    Ne,
    Not,
    BitNot,
    BitAnd,
    BitOr,
    BitXor,
    Shl,
    Shr,
    LogAnd,
    LogOr,
    UnaryPlus,
    UnaryMinus,
    Assign,
    AddAssign,
    SubAssign,
    MulAssign,
    DivAssign,
    ModAssign,
    Ternary,
}

impl ArithOp {
    /// Precedence, high binds tighter. Mirrors the C operator table.
    fn precedence(self) -> u8 {
        use ArithOp::*;
        match self {
            Not | BitNot | UnaryPlus | UnaryMinus => 13,
            Pow => 12,
            Mul | Div | Mod => 11,
            Add | Sub => 10,
            Shl | Shr => 9,
            Lt | Le | Gt | Ge => 8,
            Eq | Ne => 7,
            BitAnd => 6,
            BitXor => 5,
            BitOr => 4,
            LogAnd => 3,
            LogOr => 2,
            Ternary => 1,
            Assign | AddAssign | SubAssign | MulAssign | DivAssign | ModAssign => 0,
        }
    }

    fn is_right_associative(self) -> bool {
        use ArithOp::*;
        matches!(
            self,
            Pow | Ternary
                | Assign
                | AddAssign
                | SubAssign
                | MulAssign
                | DivAssign
                | ModAssign
                | Not
                | BitNot
                | UnaryPlus
                | UnaryMinus
        )
    }

    fn is_unary(self) -> bool {
        use ArithOp::*;
        matches!(self, Not | BitNot | UnaryPlus | UnaryMinus)
    }

    fn is_assignment(self) -> bool {
        use ArithOp::*;
        matches!(self, Assign | AddAssign | SubAssign | MulAssign | DivAssign | ModAssign)
    }
}

#[derive(Debug, Clone, PartialEq)]
enum ArithToken {
    Number(i64),
    Variable(String),
    Op(ArithOp),
    /// `++` / `--`, resolved during normalization.
    Incr(bool),
    LParen,
    RParen,
    TernaryQ,
    TernaryColon,
}

// ============================================================================
// Evaluator
// ============================================================================

/// Evaluator over an injected variable context.
pub struct ArithmeticEvaluator<'a> {
    ctx: &'a mut dyn ArithContext,
}

impl<'a> ArithmeticEvaluator<'a> {
    pub fn new(ctx: &'a mut dyn ArithContext) -> Self {
        Self { ctx }
    }

    /// Evaluate an expression. An empty expression evaluates to 0.
    pub fn evaluate(&mut self, expr: &str) -> Result<i64, ArithmeticError> {
        let mut tokens = tokenize(expr)?;
        if tokens.is_empty() {
            return Ok(0);
        }
        self.resolve_increments(&mut tokens)?;
        fuse_unary_operators(&mut tokens);
        let postfix = infix_to_postfix(tokens)?;
        self.evaluate_postfix(&postfix)
    }

    /// Resolve `++x`, `x++`, `--x`, `x--` in the token stream: read,
    /// compute, write back, and replace with the pre- or post-value.
    fn resolve_increments(&mut self, tokens: &mut Vec<ArithToken>) -> Result<(), ArithmeticError> {
        let mut i = 0;
        while i < tokens.len() {
            if let ArithToken::Incr(inc) = tokens[i] {
                let delta = if inc { 1i64 } else { -1i64 };
                // Postfix: VARIABLE ++  -> yields the old value.
                if i > 0 {
                    if let ArithToken::Variable(name) = tokens[i - 1].clone() {
                        let old = self.ctx.read_variable(&name);
                        self.ctx.write_variable(&name, old.wrapping_add(delta))?;
                        tokens[i - 1] = ArithToken::Number(old);
                        tokens.remove(i);
                        continue;
                    }
                }
                // Prefix: ++ VARIABLE  -> yields the new value.
                if i + 1 < tokens.len() {
                    if let ArithToken::Variable(name) = tokens[i + 1].clone() {
                        let new = self.ctx.read_variable(&name).wrapping_add(delta);
                        self.ctx.write_variable(&name, new)?;
                        tokens[i] = ArithToken::Number(new);
                        tokens.remove(i + 1);
                        continue;
                    }
                }
                return Err(ArithmeticError::Syntax(
                    if inc { "++ requires a variable" } else { "-- requires a variable" }.to_string(),
                ));
            }
            i += 1;
        }
        Ok(())
    }

    fn evaluate_postfix(&mut self, postfix: &[ArithToken]) -> Result<i64, ArithmeticError> {
        #[derive(Clone)]
        struct Operand {
            value: i64,
            lvalue: Option<String>,
        }

        let mut stack: Vec<Operand> = Vec::with_capacity(postfix.len() / 2 + 1);
        for token in postfix {
            match token {
                ArithToken::Number(n) => stack.push(Operand { value: *n, lvalue: None }),
                ArithToken::Variable(name) => {
                    let value = self.ctx.read_variable(name);
                    stack.push(Operand { value, lvalue: Some(name.clone()) });
                }
                ArithToken::Op(op) if op.is_unary() => {
                    let a = stack.pop().ok_or_else(|| missing_operand(*op))?;
                    stack.push(Operand { value: apply_unary(a.value, *op), lvalue: None });
                }
                ArithToken::Op(ArithOp::Ternary) => {
                    let false_val = stack.pop().ok_or_else(|| missing_operand(ArithOp::Ternary))?;
                    let true_val = stack.pop().ok_or_else(|| missing_operand(ArithOp::Ternary))?;
                    let cond = stack.pop().ok_or_else(|| missing_operand(ArithOp::Ternary))?;
                    let chosen = if cond.value != 0 { true_val } else { false_val };
                    stack.push(Operand { value: chosen.value, lvalue: None });
                }
                ArithToken::Op(op) if op.is_assignment() => {
                    let rhs = stack.pop().ok_or_else(|| missing_operand(*op))?;
                    let lhs = stack.pop().ok_or_else(|| missing_operand(*op))?;
                    let name = lhs.lvalue.ok_or(ArithmeticError::NotAnLvalue)?;
                    let result = apply_assignment(lhs.value, rhs.value, *op)?;
                    self.ctx.write_variable(&name, result)?;
                    stack.push(Operand { value: result, lvalue: Some(name) });
                }
                ArithToken::Op(op) => {
                    let b = stack.pop().ok_or_else(|| missing_operand(*op))?;
                    let a = stack.pop().ok_or_else(|| missing_operand(*op))?;
                    stack.push(Operand { value: apply_binary(a.value, b.value, *op)?, lvalue: None });
                }
                _ => {
                    return Err(ArithmeticError::Syntax("unbalanced expression".to_string()));
                }
            }
        }
        Ok(stack.last().map(|o| o.value).unwrap_or(0))
    }
}

fn missing_operand(op: ArithOp) -> ArithmeticError {
    ArithmeticError::Syntax(format!("missing operand for {:?}", op))
}

// ============================================================================
// Operator application
// ============================================================================

fn apply_unary(a: i64, op: ArithOp) -> i64 {
    match op {
        ArithOp::UnaryMinus => a.wrapping_neg(),
        ArithOp::UnaryPlus => a,
        ArithOp::Not => (a == 0) as i64,
        ArithOp::BitNot => !a,
        _ => a,
    }
}

fn apply_binary(a: i64, b: i64, op: ArithOp) -> Result<i64, ArithmeticError> {
    use ArithOp::*;
    Ok(match op {
        Add => a.wrapping_add(b),
        Sub => a.wrapping_sub(b),
        Mul => a.wrapping_mul(b),
        Div => {
            if b == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            a.wrapping_div(b)
        }
        Mod => {
            if b == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            a.wrapping_rem(b)
        }
        Pow => {
            if b < 0 {
                return Err(ArithmeticError::NegativeExponent);
            }
            wrapping_pow(a, b)
        }
        Shl => {
            if !(0..64).contains(&b) {
                0
            } else {
                a.wrapping_shl(b as u32)
            }
        }
        Shr => {
            if !(0..64).contains(&b) {
                // Arithmetic fill for out-of-range shifts.
                if a < 0 {
                    -1
                } else {
                    0
                }
            } else {
                a.wrapping_shr(b as u32)
            }
        }
        Lt => (a < b) as i64,
        Le => (a <= b) as i64,
        Gt => (a > b) as i64,
        Ge => (a >= b) as i64,
        Eq => (a == b) as i64,
        Ne => (a != b) as i64,
        BitAnd => a & b,
        BitOr => a | b,
        BitXor => a ^ b,
        LogAnd => ((a != 0) && (b != 0)) as i64,
        LogOr => ((a != 0) || (b != 0)) as i64,
        _ => return Err(ArithmeticError::Syntax(format!("unexpected operator {:?}", op))),
    })
}

fn apply_assignment(current: i64, value: i64, op: ArithOp) -> Result<i64, ArithmeticError> {
    use ArithOp::*;
    Ok(match op {
        Assign => value,
        AddAssign => current.wrapping_add(value),
        SubAssign => current.wrapping_sub(value),
        MulAssign => current.wrapping_mul(value),
        DivAssign => {
            if value == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            current.wrapping_div(value)
        }
        ModAssign => {
            if value == 0 {
                return Err(ArithmeticError::DivisionByZero);
            }
            current.wrapping_rem(value)
        }
        _ => return Err(ArithmeticError::Syntax(format!("unexpected assignment {:?}", op))),
    })
}

fn wrapping_pow(base: i64, exp: i64) -> i64 {
    let mut result = 1i64;
    let mut i = 0;
    while i < exp {
        result = result.wrapping_mul(base);
        i += 1;
    }
    result
}

// ============================================================================
// Tokenizer
// ============================================================================

fn tokenize(expr: &str) -> Result<Vec<ArithToken>, ArithmeticError> {
    let chars: Vec<char> = expr.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0usize;

    while i < chars.len() {
        let c = chars[i];
        if c.is_whitespace() {
            i += 1;
            continue;
        }
        if c.is_ascii_digit() {
            let start = i;
            while i < chars.len() && chars[i].is_ascii_alphanumeric() {
                i += 1;
            }
            let literal: String = chars[start..i].iter().collect();
            tokens.push(ArithToken::Number(parse_number(&literal)?));
            continue;
        }
        if c.is_ascii_alphabetic() || c == '_' {
            let start = i;
            while i < chars.len() && (chars[i].is_ascii_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let name: String = chars[start..i].iter().collect();
            tokens.push(ArithToken::Variable(name));
            continue;
        }

        // Operators, longest match first.
        let two: String = chars[i..].iter().take(2).collect();
        match two.as_str() {
            "++" => {
                tokens.push(ArithToken::Incr(true));
                i += 2;
                continue;
            }
            "--" => {
                tokens.push(ArithToken::Incr(false));
                i += 2;
                continue;
            }
            "**" => {
                tokens.push(ArithToken::Op(ArithOp::Pow));
                i += 2;
                continue;
            }
            "<<" => {
                tokens.push(ArithToken::Op(ArithOp::Shl));
                i += 2;
                continue;
            }
            ">>" => {
                tokens.push(ArithToken::Op(ArithOp::Shr));
                i += 2;
                continue;
            }
            "<=" => {
                tokens.push(ArithToken::Op(ArithOp::Le));
                i += 2;
                continue;
            }
            ">=" => {
                tokens.push(ArithToken::Op(ArithOp::Ge));
                i += 2;
                continue;
            }
            "==" => {
                tokens.push(ArithToken::Op(ArithOp::Eq));
                i += 2;
                continue;
            }
            "!=" => {
                tokens.push(ArithToken::Op(ArithOp::Ne));
                i += 2;
                continue;
            }
            "&&" => {
                tokens.push(ArithToken::Op(ArithOp::LogAnd));
                i += 2;
                continue;
            }
            "||" => {
                tokens.push(ArithToken::Op(ArithOp::LogOr));
                i += 2;
                continue;
            }
            "+=" => {
                tokens.push(ArithToken::Op(ArithOp::AddAssign));
                i += 2;
                continue;
            }
            "-=" => {
                tokens.push(ArithToken::Op(ArithOp::SubAssign));
                i += 2;
                continue;
            }
            "*=" => {
                tokens.push(ArithToken::Op(ArithOp::MulAssign));
                i += 2;
                continue;
            }
            "/=" => {
                tokens.push(ArithToken::Op(ArithOp::DivAssign));
                i += 2;
                continue;
            }
            "%=" => {
                tokens.push(ArithToken::Op(ArithOp::ModAssign));
                i += 2;
                continue;
            }
            _ => {}
        }
        let token = match c {
            '+' => ArithToken::Op(ArithOp::Add),
            '-' => ArithToken::Op(ArithOp::Sub),
            '*' => ArithToken::Op(ArithOp::Mul),
            '/' => ArithToken::Op(ArithOp::Div),
            '%' => ArithToken::Op(ArithOp::Mod),
            '<' => ArithToken::Op(ArithOp::Lt),
            '>' => ArithToken::Op(ArithOp::Gt),
            '!' => ArithToken::Op(ArithOp::Not),
            '~' => ArithToken::Op(ArithOp::BitNot),
            '&' => ArithToken::Op(ArithOp::BitAnd),
            '|' => ArithToken::Op(ArithOp::BitOr),
            '^' => ArithToken::Op(ArithOp::BitXor),
            '=' => ArithToken::Op(ArithOp::Assign),
            '(' => ArithToken::LParen,
            ')' => ArithToken::RParen,
            '?' => ArithToken::TernaryQ,
            ':' => ArithToken::TernaryColon,
            other => {
                return Err(ArithmeticError::Syntax(format!("unexpected character `{}'", other)))
            }
        };
        tokens.push(token);
        i += 1;
    }
    Ok(tokens)
}

/// Parse a numeric literal: decimal, `0x`/`0X` hex, leading-zero octal.
fn parse_number(literal: &str) -> Result<i64, ArithmeticError> {
    let invalid = || ArithmeticError::InvalidNumber(literal.to_string());
    if let Some(hex) = literal.strip_prefix("0x").or_else(|| literal.strip_prefix("0X")) {
        // Parse through u64 so all 64 bit patterns are expressible.
        return u64::from_str_radix(hex, 16).map(|v| v as i64).map_err(|_| invalid());
    }
    if literal.len() > 1 && literal.starts_with('0') {
        return u64::from_str_radix(&literal[1..], 8).map(|v| v as i64).map_err(|_| invalid());
    }
    literal.parse::<i64>().map_err(|_| invalid())
}

// ============================================================================
// Normalization and shunting-yard
// ============================================================================

/// Rewrite `+`/`-` tokens that appear in prefix position into their unary
/// forms. A token is in prefix position at the start of the expression or
/// after an operator, `(`, `?` or `:`.
fn fuse_unary_operators(tokens: &mut [ArithToken]) {
    for i in 0..tokens.len() {
        let is_prefix = if i == 0 {
            true
        } else {
            matches!(
                tokens[i - 1],
                ArithToken::Op(_) | ArithToken::LParen | ArithToken::TernaryQ | ArithToken::TernaryColon
            )
        };
        if is_prefix {
            match tokens[i] {
                ArithToken::Op(ArithOp::Add) => tokens[i] = ArithToken::Op(ArithOp::UnaryPlus),
                ArithToken::Op(ArithOp::Sub) => tokens[i] = ArithToken::Op(ArithOp::UnaryMinus),
                _ => {}
            }
        }
    }
}

fn infix_to_postfix(tokens: Vec<ArithToken>) -> Result<Vec<ArithToken>, ArithmeticError> {
    let mut output: Vec<ArithToken> = Vec::with_capacity(tokens.len());
    let mut stack: Vec<ArithToken> = Vec::new();

    for token in tokens {
        match token {
            ArithToken::Number(_) | ArithToken::Variable(_) => output.push(token),
            ArithToken::LParen => stack.push(token),
            ArithToken::RParen => {
                loop {
                    match stack.pop() {
                        Some(ArithToken::LParen) => break,
                        Some(op) => output.push(op),
                        None => {
                            return Err(ArithmeticError::Syntax("unbalanced parentheses".into()))
                        }
                    }
                }
            }
            ArithToken::Op(op) => {
                while let Some(ArithToken::Op(top)) = stack.last() {
                    let pops = if op.is_right_associative() {
                        top.precedence() > op.precedence()
                    } else {
                        top.precedence() >= op.precedence()
                    };
                    if pops {
                        output.push(stack.pop().unwrap());
                    } else {
                        break;
                    }
                }
                stack.push(ArithToken::Op(op));
            }
            ArithToken::TernaryQ => {
                while let Some(ArithToken::Op(top)) = stack.last() {
                    if top.precedence() > ArithOp::Ternary.precedence() {
                        output.push(stack.pop().unwrap());
                    } else {
                        break;
                    }
                }
                stack.push(ArithToken::TernaryQ);
            }
            ArithToken::TernaryColon => {
                loop {
                    match stack.last() {
                        Some(ArithToken::TernaryQ) => {
                            stack.pop();
                            // The fused ?: operator waits for the false branch.
                            stack.push(ArithToken::Op(ArithOp::Ternary));
                            break;
                        }
                        Some(_) => output.push(stack.pop().unwrap()),
                        None => {
                            return Err(ArithmeticError::Syntax("`:' without matching `?'".into()))
                        }
                    }
                }
            }
            ArithToken::Incr(_) => {
                return Err(ArithmeticError::Syntax("stray increment operator".into()))
            }
        }
    }

    while let Some(token) = stack.pop() {
        match token {
            ArithToken::LParen => {
                return Err(ArithmeticError::Syntax("unbalanced parentheses".into()))
            }
            ArithToken::TernaryQ => {
                return Err(ArithmeticError::Syntax("`?' without matching `:'".into()))
            }
            other => output.push(other),
        }
    }
    Ok(output)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    /// Plain map-backed context for tests.
    struct MapContext {
        vars: HashMap<String, i64>,
        readonly: Vec<String>,
    }

    impl MapContext {
        fn new() -> Self {
            Self { vars: HashMap::new(), readonly: Vec::new() }
        }

        fn with(vars: &[(&str, i64)]) -> Self {
            let mut ctx = Self::new();
            for (k, v) in vars {
                ctx.vars.insert((*k).to_string(), *v);
            }
            ctx
        }
    }

    impl ArithContext for MapContext {
        fn read_variable(&mut self, name: &str) -> i64 {
            self.vars.get(name).copied().unwrap_or(0)
        }

        fn write_variable(&mut self, name: &str, value: i64) -> Result<(), ArithmeticError> {
            if self.readonly.iter().any(|r| r == name) {
                return Err(ArithmeticError::ReadonlyVariable(name.to_string()));
            }
            self.vars.insert(name.to_string(), value);
            Ok(())
        }
    }

    fn eval(expr: &str) -> i64 {
        let mut ctx = MapContext::new();
        ArithmeticEvaluator::new(&mut ctx).evaluate(expr).unwrap()
    }

    fn eval_with(expr: &str, ctx: &mut MapContext) -> Result<i64, ArithmeticError> {
        ArithmeticEvaluator::new(ctx).evaluate(expr)
    }

    #[test]
    fn test_basic_arithmetic() {
        assert_eq!(eval("1 + 2"), 3);
        assert_eq!(eval("10 - 4 * 2"), 2);
        assert_eq!(eval("(10 - 4) * 2"), 12);
        assert_eq!(eval("7 / 2"), 3);
        assert_eq!(eval("7 % 3"), 1);
        assert_eq!(eval(""), 0);
    }

    #[test]
    fn test_power_right_associative() {
        assert_eq!(eval("2 ** 10"), 1024);
        assert_eq!(eval("2 ** 3 ** 2"), 512);
    }

    #[test]
    fn test_unary_operators() {
        assert_eq!(eval("-5"), -5);
        assert_eq!(eval("+5"), 5);
        assert_eq!(eval("!0"), 1);
        assert_eq!(eval("!7"), 0);
        assert_eq!(eval("~0"), -1);
        assert_eq!(eval("- -3"), 3);
        assert_eq!(eval("3 + -2"), 1);
    }

    #[test]
    fn test_comparisons_and_logic() {
        assert_eq!(eval("3 < 5"), 1);
        assert_eq!(eval("5 <= 4"), 0);
        assert_eq!(eval("3 == 3"), 1);
        assert_eq!(eval("3 != 3"), 0);
        assert_eq!(eval("1 && 2"), 1);
        assert_eq!(eval("1 && 0"), 0);
        assert_eq!(eval("0 || 3"), 1);
    }

    #[test]
    fn test_bit_operators() {
        assert_eq!(eval("6 & 3"), 2);
        assert_eq!(eval("6 | 3"), 7);
        assert_eq!(eval("6 ^ 3"), 5);
        assert_eq!(eval("1 << 4"), 16);
        assert_eq!(eval("-16 >> 2"), -4);
    }

    #[test]
    fn test_shift_out_of_range() {
        assert_eq!(eval("1 << 64"), 0);
        assert_eq!(eval("1 << 100"), 0);
        assert_eq!(eval("8 >> 64"), 0);
        assert_eq!(eval("-8 >> 64"), -1);
    }

    #[test]
    fn test_wrapping_semantics() {
        assert_eq!(eval("9223372036854775807 + 1"), i64::MIN);
        let mut ctx = MapContext::with(&[("min", i64::MIN)]);
        assert_eq!(eval_with("-min", &mut ctx).unwrap(), i64::MIN);
        assert_eq!(eval_with("min / -1", &mut ctx).unwrap(), i64::MIN);
        assert_eq!(eval_with("min % -1", &mut ctx).unwrap(), 0);
    }

    #[test]
    fn test_division_by_zero_errors() {
        let mut ctx = MapContext::new();
        assert_eq!(eval_with("1 / 0", &mut ctx), Err(ArithmeticError::DivisionByZero));
        assert_eq!(eval_with("1 % 0", &mut ctx), Err(ArithmeticError::DivisionByZero));
    }

    #[test]
    fn test_number_bases() {
        assert_eq!(eval("0x10"), 16);
        assert_eq!(eval("0XfF"), 255);
        assert_eq!(eval("010"), 8);
        assert_eq!(eval("0"), 0);
    }

    #[test]
    fn test_variables() {
        let mut ctx = MapContext::with(&[("x", 3)]);
        assert_eq!(eval_with("x * x + 1", &mut ctx).unwrap(), 10);
        // Unset variables read as 0.
        assert_eq!(eval_with("unset_var + 1", &mut ctx).unwrap(), 1);
    }

    #[test]
    fn test_assignment_operators() {
        let mut ctx = MapContext::with(&[("x", 10)]);
        assert_eq!(eval_with("x = 5", &mut ctx).unwrap(), 5);
        assert_eq!(ctx.vars["x"], 5);
        assert_eq!(eval_with("x += 3", &mut ctx).unwrap(), 8);
        assert_eq!(eval_with("x -= 2", &mut ctx).unwrap(), 6);
        assert_eq!(eval_with("x *= 4", &mut ctx).unwrap(), 24);
        assert_eq!(eval_with("x /= 5", &mut ctx).unwrap(), 4);
        assert_eq!(eval_with("x %= 3", &mut ctx).unwrap(), 1);
    }

    #[test]
    fn test_chained_assignment() {
        let mut ctx = MapContext::new();
        assert_eq!(eval_with("a = b = 3", &mut ctx).unwrap(), 3);
        assert_eq!(ctx.vars["a"], 3);
        assert_eq!(ctx.vars["b"], 3);
    }

    #[test]
    fn test_readonly_write_fails() {
        let mut ctx = MapContext::with(&[("x", 1)]);
        ctx.readonly.push("x".to_string());
        assert_eq!(
            eval_with("x = 2", &mut ctx),
            Err(ArithmeticError::ReadonlyVariable("x".to_string()))
        );
    }

    #[test]
    fn test_increment_decrement() {
        let mut ctx = MapContext::with(&[("i", 5)]);
        assert_eq!(eval_with("i++", &mut ctx).unwrap(), 5);
        assert_eq!(ctx.vars["i"], 6);
        assert_eq!(eval_with("++i", &mut ctx).unwrap(), 7);
        assert_eq!(eval_with("i--", &mut ctx).unwrap(), 7);
        assert_eq!(ctx.vars["i"], 6);
        assert_eq!(eval_with("--i", &mut ctx).unwrap(), 5);
    }

    #[test]
    fn test_ternary() {
        assert_eq!(eval("1 ? 10 : 20"), 10);
        assert_eq!(eval("0 ? 10 : 20"), 20);
        assert_eq!(eval("2 > 1 ? 2 > 3 ? 1 : 2 : 3"), 2);
    }

    #[test]
    fn test_syntax_errors() {
        let mut ctx = MapContext::new();
        assert!(eval_with("(1 + 2", &mut ctx).is_err());
        assert!(eval_with("1 ? 2", &mut ctx).is_err());
        assert!(eval_with("3 = 4", &mut ctx).is_err());
        assert!(eval_with("2 ** -1", &mut ctx).is_err());
    }

    #[test]
    fn test_precedence_table() {
        assert_eq!(eval("2 + 3 << 1"), 10);
        assert_eq!(eval("1 | 2 & 3"), 3);
        assert_eq!(eval("4 ^ 1 | 2"), 7);
        assert_eq!(eval("1 < 2 == 1"), 1);
    }
}
