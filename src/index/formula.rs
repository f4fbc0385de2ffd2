//! Boosting formula evaluator
//!
//! A small arithmetic language over named numeric variables: numbers,
//! identifiers, `+ - * / ^` (`**` is accepted for `^`), unary minus,
//! parentheses and a handful of functions. Formulas are compiled to
//! reverse Polish notation with the shunting-yard algorithm and evaluated
//! against a variable map.

use std::collections::HashMap;
use thiserror::Error;

/// Errors raised while compiling or evaluating a formula
#[derive(Debug, Clone, PartialEq, Error)]
pub enum FormulaError {
    #[error("Unexpected token: {0}")]
    UnexpectedToken(String),

    #[error("Unknown variable: {0}")]
    UnknownVariable(String),

    #[error("Unknown function: {0}")]
    UnknownFunction(String),

    #[error("Mismatched parentheses")]
    MismatchedParens,

    #[error("Empty formula")]
    Empty,

    #[error("Result is not a finite number")]
    NonFinite,
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Num(f64),
    Ident(String),
    Op(char),
    LParen,
    RParen,
    Comma,
}

#[derive(Debug, Clone, PartialEq)]
enum Rpn {
    Num(f64),
    Var(String),
    Binary(char),
    Neg,
    Call(Function, usize),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Function {
    Log,
    Ln,
    Log2,
    Log10,
    Sqrt,
    Exp,
    Abs,
    Min,
    Max,
    Pow,
}

impl Function {
    fn lookup(name: &str) -> Option<Self> {
        Some(match name {
            "log" => Self::Log,
            "ln" => Self::Ln,
            "log2" => Self::Log2,
            "log10" => Self::Log10,
            "sqrt" => Self::Sqrt,
            "exp" => Self::Exp,
            "abs" => Self::Abs,
            "min" => Self::Min,
            "max" => Self::Max,
            "pow" => Self::Pow,
            _ => return None,
        })
    }

    fn accepts(&self, argc: usize) -> bool {
        match self {
            // log(x) is natural, log(x, base) uses the given base
            Self::Log => argc == 1 || argc == 2,
            Self::Min | Self::Max => argc >= 1,
            Self::Pow => argc == 2,
            _ => argc == 1,
        }
    }

    fn apply(&self, args: &[f64]) -> f64 {
        match (self, args) {
            (Self::Log, [x]) | (Self::Ln, [x]) => x.ln(),
            (Self::Log, [x, base]) => x.ln() / base.ln(),
            (Self::Log2, [x]) => x.log2(),
            (Self::Log10, [x]) => x.log10(),
            (Self::Sqrt, [x]) => x.sqrt(),
            (Self::Exp, [x]) => x.exp(),
            (Self::Abs, [x]) => x.abs(),
            (Self::Pow, [x, y]) => x.powf(*y),
            (Self::Min, _) => args.iter().copied().fold(f64::INFINITY, f64::min),
            (Self::Max, _) => args.iter().copied().fold(f64::NEG_INFINITY, f64::max),
            _ => f64::NAN,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
enum StackItem {
    Op(char),
    Neg,
    LParen { call: bool },
    Func(Function),
}

fn precedence(item: &StackItem) -> u8 {
    match item {
        StackItem::Op('+') | StackItem::Op('-') => 1,
        StackItem::Op('*') | StackItem::Op('/') => 2,
        StackItem::Neg => 3,
        StackItem::Op('^') => 4,
        _ => 0,
    }
}

fn lex(src: &str) -> Result<Vec<Token>, FormulaError> {
    let chars: Vec<char> = src.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        match c {
            c if c.is_whitespace() => i += 1,
            '0'..='9' | '.' => {
                let start = i;
                while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                    i += 1;
                }
                let text: String = chars[start..i].iter().collect();
                let value = text
                    .parse::<f64>()
                    .map_err(|_| FormulaError::UnexpectedToken(text.clone()))?;
                tokens.push(Token::Num(value));
            }
            c if c.is_alphabetic() || c == '_' => {
                let start = i;
                while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                    i += 1;
                }
                tokens.push(Token::Ident(chars[start..i].iter().collect()));
            }
            '*' if chars.get(i + 1) == Some(&'*') => {
                tokens.push(Token::Op('^'));
                i += 2;
            }
            '+' | '-' | '*' | '/' | '^' => {
                tokens.push(Token::Op(c));
                i += 1;
            }
            '(' => {
                tokens.push(Token::LParen);
                i += 1;
            }
            ')' => {
                tokens.push(Token::RParen);
                i += 1;
            }
            ',' => {
                tokens.push(Token::Comma);
                i += 1;
            }
            other => return Err(FormulaError::UnexpectedToken(other.to_string())),
        }
    }

    Ok(tokens)
}

/// A compiled boosting formula
#[derive(Debug, Clone, PartialEq)]
pub struct Formula {
    rpn: Vec<Rpn>,
}

impl Formula {
    /// Compiles a formula
    pub fn parse(src: &str) -> Result<Self, FormulaError> {
        let tokens = lex(src)?;
        if tokens.is_empty() {
            return Err(FormulaError::Empty);
        }

        let mut output: Vec<Rpn> = Vec::new();
        let mut ops: Vec<StackItem> = Vec::new();
        let mut arities: Vec<usize> = Vec::new();
        let mut prev: Option<&Token> = None;

        for (idx, token) in tokens.iter().enumerate() {
            let operand_expected = matches!(
                prev,
                None | Some(Token::Op(_)) | Some(Token::LParen) | Some(Token::Comma)
            );

            match token {
                Token::Num(n) => output.push(Rpn::Num(*n)),
                Token::Ident(name) => {
                    if tokens.get(idx + 1) == Some(&Token::LParen) {
                        let func = Function::lookup(name)
                            .ok_or_else(|| FormulaError::UnknownFunction(name.clone()))?;
                        ops.push(StackItem::Func(func));
                    } else {
                        output.push(Rpn::Var(name.clone()));
                    }
                }
                Token::Op(op) if operand_expected => match op {
                    '-' => ops.push(StackItem::Neg),
                    '+' => {}
                    other => return Err(FormulaError::UnexpectedToken(other.to_string())),
                },
                Token::Op(op) => {
                    let incoming = StackItem::Op(*op);
                    let right_assoc = *op == '^';
                    while let Some(top) = ops.last() {
                        let top_prec = precedence(top);
                        let in_prec = precedence(&incoming);
                        let pops = matches!(top, StackItem::Op(_) | StackItem::Neg)
                            && (top_prec > in_prec || (top_prec == in_prec && !right_assoc));
                        if !pops {
                            break;
                        }
                        pop_operator(&mut ops, &mut output);
                    }
                    ops.push(incoming);
                }
                Token::LParen => {
                    let call = matches!(ops.last(), Some(StackItem::Func(_)))
                        && matches!(prev, Some(Token::Ident(_)));
                    if call {
                        if tokens.get(idx + 1) == Some(&Token::RParen) {
                            return Err(FormulaError::UnexpectedToken(")".to_string()));
                        }
                        arities.push(1);
                    }
                    ops.push(StackItem::LParen { call });
                }
                Token::Comma => {
                    drain_to_paren(&mut ops, &mut output)?;
                    match (ops.last(), arities.last_mut()) {
                        (Some(StackItem::LParen { call: true }), Some(count)) => *count += 1,
                        _ => return Err(FormulaError::UnexpectedToken(",".to_string())),
                    }
                }
                Token::RParen => {
                    drain_to_paren(&mut ops, &mut output)?;
                    if let Some(StackItem::LParen { call }) = ops.pop() {
                        if call {
                            let argc = arities.pop().ok_or(FormulaError::MismatchedParens)?;
                            match ops.pop() {
                                Some(StackItem::Func(func)) => {
                                    if !func.accepts(argc) {
                                        return Err(FormulaError::UnexpectedToken(format!(
                                            "{:?} with {} arguments",
                                            func, argc
                                        )));
                                    }
                                    output.push(Rpn::Call(func, argc));
                                }
                                _ => return Err(FormulaError::MismatchedParens),
                            }
                        }
                    }
                }
            }

            prev = Some(token);
        }

        while let Some(top) = ops.last() {
            if matches!(top, StackItem::LParen { .. } | StackItem::Func(_)) {
                return Err(FormulaError::MismatchedParens);
            }
            pop_operator(&mut ops, &mut output);
        }

        let formula = Self { rpn: output };
        formula.check_shape()?;
        Ok(formula)
    }

    /// Verifies every operator has its operands and one value remains
    fn check_shape(&self) -> Result<(), FormulaError> {
        let mut depth: usize = 0;
        for item in &self.rpn {
            let (needs, produces) = match item {
                Rpn::Num(_) | Rpn::Var(_) => (0, 1),
                Rpn::Neg => (1, 1),
                Rpn::Binary(_) => (2, 1),
                Rpn::Call(_, argc) => (*argc, 1),
            };
            if depth < needs {
                return Err(FormulaError::UnexpectedToken(format!("{:?}", item)));
            }
            depth = depth - needs + produces;
        }
        match depth {
            1 => Ok(()),
            0 => Err(FormulaError::Empty),
            _ => Err(FormulaError::UnexpectedToken("missing operator".to_string())),
        }
    }

    /// Names of every variable the formula reads
    pub fn variables(&self) -> impl Iterator<Item = &str> {
        self.rpn.iter().filter_map(|item| match item {
            Rpn::Var(name) => Some(name.as_str()),
            _ => None,
        })
    }

    /// Evaluates the formula
    ///
    /// # Arguments
    ///
    /// * `variables` - Value of every variable the formula reads
    pub fn evaluate(&self, variables: &HashMap<String, f64>) -> Result<f64, FormulaError> {
        let mut stack: Vec<f64> = Vec::with_capacity(self.rpn.len());

        for item in &self.rpn {
            match item {
                Rpn::Num(n) => stack.push(*n),
                Rpn::Var(name) => {
                    let value = variables
                        .get(name)
                        .ok_or_else(|| FormulaError::UnknownVariable(name.clone()))?;
                    stack.push(*value);
                }
                Rpn::Neg => {
                    let x = pop_value(&mut stack)?;
                    stack.push(-x);
                }
                Rpn::Binary(op) => {
                    let rhs = pop_value(&mut stack)?;
                    let lhs = pop_value(&mut stack)?;
                    stack.push(match op {
                        '+' => lhs + rhs,
                        '-' => lhs - rhs,
                        '*' => lhs * rhs,
                        '/' => lhs / rhs,
                        _ => lhs.powf(rhs),
                    });
                }
                Rpn::Call(func, argc) => {
                    if stack.len() < *argc {
                        return Err(FormulaError::UnexpectedToken(format!("{:?}", func)));
                    }
                    let args = stack.split_off(stack.len() - argc);
                    stack.push(func.apply(&args));
                }
            }
        }

        let result = pop_value(&mut stack)?;
        if result.is_finite() {
            Ok(result)
        } else {
            Err(FormulaError::NonFinite)
        }
    }
}

fn pop_value(stack: &mut Vec<f64>) -> Result<f64, FormulaError> {
    stack
        .pop()
        .ok_or_else(|| FormulaError::UnexpectedToken("missing operand".to_string()))
}

fn pop_operator(ops: &mut Vec<StackItem>, output: &mut Vec<Rpn>) {
    match ops.pop() {
        Some(StackItem::Op(op)) => output.push(Rpn::Binary(op)),
        Some(StackItem::Neg) => output.push(Rpn::Neg),
        _ => {}
    }
}

fn drain_to_paren(ops: &mut Vec<StackItem>, output: &mut Vec<Rpn>) -> Result<(), FormulaError> {
    loop {
        match ops.last() {
            Some(StackItem::LParen { .. }) => return Ok(()),
            Some(StackItem::Func(_)) | None => return Err(FormulaError::MismatchedParens),
            Some(_) => pop_operator(ops, output),
        }
    }
}

/// Evaluates a boosting formula, degrading every failure to a zero boost
pub fn evaluate_formula(src: &str, variables: &HashMap<String, f64>) -> f64 {
    match Formula::parse(src).and_then(|f| f.evaluate(variables)) {
        Ok(value) => value,
        Err(e) => {
            tracing::warn!("Boosting formula '{}' failed: {}", src, e);
            0.0
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn vars(pairs: &[(&str, f64)]) -> HashMap<String, f64> {
        pairs.iter().map(|(k, v)| (k.to_string(), *v)).collect()
    }

    fn eval(src: &str) -> f64 {
        Formula::parse(src).unwrap().evaluate(&HashMap::new()).unwrap()
    }

    #[test]
    fn test_precedence_and_associativity() {
        assert_eq!(eval("1 + 2 * 3"), 7.0);
        assert_eq!(eval("(1 + 2) * 3"), 9.0);
        assert_eq!(eval("2 ^ 3 ^ 2"), 512.0);
        assert_eq!(eval("2 ** 3"), 8.0);
        assert_eq!(eval("8 - 3 - 2"), 3.0);
        assert_eq!(eval("-2 ^ 2"), -4.0);
        assert_eq!(eval("-2 * 3"), -6.0);
        assert_eq!(eval("2 * -3"), -6.0);
    }

    #[test]
    fn test_functions() {
        assert!((eval("log(8, 2)") - 3.0).abs() < 1e-12);
        assert!((eval("log2(1024)") - 10.0).abs() < 1e-12);
        assert_eq!(eval("max(1, 5, 3) + min(4, 2)"), 7.0);
        assert_eq!(eval("pow(2, 4)"), 16.0);
        assert_eq!(eval("sqrt(abs(-16))"), 4.0);
    }

    #[test]
    fn test_variables() {
        let formula = Formula::parse("rating * 2 + log10(reviews)").unwrap();
        let names: Vec<_> = formula.variables().collect();
        assert_eq!(names, vec!["rating", "reviews"]);

        let value = formula
            .evaluate(&vars(&[("rating", 4.5), ("reviews", 100.0)]))
            .unwrap();
        assert!((value - 11.0).abs() < 1e-12);

        assert_eq!(
            formula.evaluate(&vars(&[("rating", 4.5)])),
            Err(FormulaError::UnknownVariable("reviews".to_string()))
        );
    }

    #[test]
    fn test_malformed_formulas() {
        assert_eq!(Formula::parse(""), Err(FormulaError::Empty));
        assert_eq!(Formula::parse("(1 + 2"), Err(FormulaError::MismatchedParens));
        assert_eq!(Formula::parse("1 + 2)"), Err(FormulaError::MismatchedParens));
        assert_eq!(
            Formula::parse("system(1)"),
            Err(FormulaError::UnknownFunction("system".to_string()))
        );
        assert!(matches!(
            Formula::parse("1 +"),
            Err(FormulaError::UnexpectedToken(_))
        ));
        assert!(matches!(
            Formula::parse("1 2"),
            Err(FormulaError::UnexpectedToken(_))
        ));
        assert!(matches!(
            Formula::parse("a; b"),
            Err(FormulaError::UnexpectedToken(_))
        ));
    }

    #[test]
    fn test_non_finite_result() {
        let formula = Formula::parse("1 / x").unwrap();
        assert_eq!(
            formula.evaluate(&vars(&[("x", 0.0)])),
            Err(FormulaError::NonFinite)
        );
    }

    #[test]
    fn test_evaluate_formula_degrades_to_zero() {
        assert_eq!(evaluate_formula("x +", &vars(&[("x", 1.0)])), 0.0);
        assert_eq!(evaluate_formula("missing * 2", &HashMap::new()), 0.0);
        assert_eq!(evaluate_formula("x * 2", &vars(&[("x", 1.5)])), 3.0);
    }
}
