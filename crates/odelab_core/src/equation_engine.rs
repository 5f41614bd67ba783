use crate::error::{EvalError, ExpressionError};
use crate::traits::Scalar;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;

/// OpCodes for the Stack-based Virtual Machine.
/// The VM operates on a stack of `Scalar` values.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum OpCode {
    /// Pushes a constant `f64` value onto the stack.
    LoadConst(f64),
    /// Pushes the value of a bound variable (by index) onto the stack.
    LoadVar(usize),
    /// Pops top two values (b, a), pushes (a + b).
    Add,
    /// Pops top two values (b, a), pushes (a - b).
    Sub,
    /// Pops top two values (b, a), pushes (a * b).
    Mul,
    /// Pops top two values (b, a), pushes (a / b). Fails on b == 0.
    Div,
    /// Pops top two values (b, a), pushes (a ^ b).
    Pow,
    Sin,
    Cos,
    Tan,
    /// Natural logarithm. Fails on a <= 0.
    Ln,
    Exp,
    /// Fails on a < 0.
    Sqrt,
    Abs,
    /// Pops top value (a), pushes -a.
    Neg,
}

/// Represents a compiled sequence of operations.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Bytecode {
    pub ops: Vec<OpCode>,
}

/// Stack-based Virtual Machine for evaluating expressions.
///
/// The VM is stateless; `execute` takes all necessary context:
/// - `bytecode`: Instructions to run.
/// - `vars`: Values of the bound variables (read-only).
/// - `stack`: A mutable buffer for intermediate computations.
///
/// Domain violations are reported as `EvalError` instead of leaking NaN.
pub struct VM;

impl VM {
    pub fn execute<T: Scalar>(
        bytecode: &Bytecode,
        vars: &[T],
        stack: &mut Vec<T>,
    ) -> Result<T, EvalError> {
        stack.clear();

        for op in &bytecode.ops {
            let value = match *op {
                OpCode::LoadConst(val) => T::lit(val),
                OpCode::LoadVar(idx) => *vars.get(idx).ok_or(EvalError::MalformedBytecode)?,
                OpCode::Add => {
                    let (a, b) = pop_pair(stack)?;
                    a + b
                }
                OpCode::Sub => {
                    let (a, b) = pop_pair(stack)?;
                    a - b
                }
                OpCode::Mul => {
                    let (a, b) = pop_pair(stack)?;
                    a * b
                }
                OpCode::Div => {
                    let (a, b) = pop_pair(stack)?;
                    if b == T::zero() {
                        return Err(EvalError::DivisionByZero);
                    }
                    a / b
                }
                OpCode::Pow => {
                    let (a, b) = pop_pair(stack)?;
                    if a == T::zero() && b < T::zero() {
                        return Err(EvalError::DivisionByZero);
                    }
                    let result = a.powf(b);
                    if result.is_nan() && !a.is_nan() && !b.is_nan() {
                        return Err(domain("^", a));
                    }
                    result
                }
                OpCode::Sin => pop(stack)?.sin(),
                OpCode::Cos => pop(stack)?.cos(),
                OpCode::Tan => pop(stack)?.tan(),
                OpCode::Ln => {
                    let a = pop(stack)?;
                    if a <= T::zero() {
                        return Err(domain("log", a));
                    }
                    a.ln()
                }
                OpCode::Exp => pop(stack)?.exp(),
                OpCode::Sqrt => {
                    let a = pop(stack)?;
                    if a < T::zero() {
                        return Err(domain("sqrt", a));
                    }
                    a.sqrt()
                }
                OpCode::Abs => pop(stack)?.abs(),
                OpCode::Neg => -pop(stack)?,
            };
            stack.push(value);
        }

        let result = pop(stack)?;
        if !stack.is_empty() {
            return Err(EvalError::MalformedBytecode);
        }
        if !result.is_finite() {
            return Err(EvalError::NonFinite);
        }
        Ok(result)
    }
}

fn pop<T: Scalar>(stack: &mut Vec<T>) -> Result<T, EvalError> {
    stack.pop().ok_or(EvalError::MalformedBytecode)
}

fn pop_pair<T: Scalar>(stack: &mut Vec<T>) -> Result<(T, T), EvalError> {
    let b = pop(stack)?;
    let a = pop(stack)?;
    Ok((a, b))
}

fn domain<T: Scalar>(function: &'static str, argument: T) -> EvalError {
    EvalError::Domain {
        function,
        argument: argument.to_f64().unwrap_or(f64::NAN),
    }
}

// --- AST & Parser ---

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Pow,
}

/// Abstract Syntax Tree nodes for expressions.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Number(f64),
    Variable(String),
    Binary(Box<Expr>, BinaryOp, Box<Expr>),
    Neg(Box<Expr>),
    Call(String, Box<Expr>),
}

/// Compiles an AST (`Expr`) into `Bytecode`.
/// Resolves variable names to indices; `pi` and `e` fold to constants.
pub struct Compiler {
    pub var_map: HashMap<String, usize>,
}

impl Compiler {
    pub fn new(var_names: &[String]) -> Self {
        let mut var_map = HashMap::new();
        for (i, name) in var_names.iter().enumerate() {
            var_map.insert(name.clone(), i);
        }
        Self { var_map }
    }

    pub fn compile(&self, expr: &Expr) -> Result<Bytecode, ExpressionError> {
        let mut ops = Vec::new();
        self.compile_recursive(expr, &mut ops)?;
        Ok(Bytecode { ops })
    }

    fn compile_recursive(&self, expr: &Expr, ops: &mut Vec<OpCode>) -> Result<(), ExpressionError> {
        match expr {
            Expr::Number(n) => ops.push(OpCode::LoadConst(*n)),
            Expr::Variable(name) => {
                if let Some(&idx) = self.var_map.get(name) {
                    ops.push(OpCode::LoadVar(idx));
                } else {
                    match name.as_str() {
                        "pi" => ops.push(OpCode::LoadConst(std::f64::consts::PI)),
                        "e" => ops.push(OpCode::LoadConst(std::f64::consts::E)),
                        _ => return Err(ExpressionError::UnknownVariable(name.clone())),
                    }
                }
            }
            Expr::Binary(left, op, right) => {
                self.compile_recursive(left, ops)?;
                self.compile_recursive(right, ops)?;
                ops.push(match op {
                    BinaryOp::Add => OpCode::Add,
                    BinaryOp::Sub => OpCode::Sub,
                    BinaryOp::Mul => OpCode::Mul,
                    BinaryOp::Div => OpCode::Div,
                    BinaryOp::Pow => OpCode::Pow,
                });
            }
            Expr::Neg(operand) => {
                self.compile_recursive(operand, ops)?;
                ops.push(OpCode::Neg);
            }
            Expr::Call(func, arg) => {
                self.compile_recursive(arg, ops)?;
                let code = match func.as_str() {
                    "sin" => OpCode::Sin,
                    "cos" => OpCode::Cos,
                    "tan" => OpCode::Tan,
                    "log" | "ln" => OpCode::Ln,
                    "exp" => OpCode::Exp,
                    "sqrt" => OpCode::Sqrt,
                    "abs" => OpCode::Abs,
                    _ => return Err(ExpressionError::UnknownFunction(func.clone())),
                };
                ops.push(code);
            }
        }
        Ok(())
    }
}

// --- Simple Parser ---

/// Parses a string expression into an AST.
pub fn parse(input: &str) -> Result<Expr, ExpressionError> {
    let tokens = tokenize(input)?;
    if tokens.is_empty() {
        return Err(ExpressionError::Empty);
    }
    let mut parser = Parser { tokens, pos: 0 };
    let expr = parser.parse_expression()?;
    match parser.peek() {
        Some((token, position)) => Err(ExpressionError::UnexpectedToken {
            token: token.to_string(),
            position,
        }),
        None => Ok(expr),
    }
}

#[derive(Debug, Clone, PartialEq)]
enum Token {
    Number(f64),
    Identifier(String),
    Plus,
    Minus,
    Star,
    Slash,
    Caret,
    LParen,
    RParen,
}

impl fmt::Display for Token {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Token::Number(n) => write!(f, "{n}"),
            Token::Identifier(name) => f.write_str(name),
            Token::Plus => f.write_str("+"),
            Token::Minus => f.write_str("-"),
            Token::Star => f.write_str("*"),
            Token::Slash => f.write_str("/"),
            Token::Caret => f.write_str("^"),
            Token::LParen => f.write_str("("),
            Token::RParen => f.write_str(")"),
        }
    }
}

fn tokenize(input: &str) -> Result<Vec<(Token, usize)>, ExpressionError> {
    let chars: Vec<char> = input.chars().collect();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < chars.len() {
        let c = chars[i];
        let start = i;
        if c.is_whitespace() {
            i += 1;
        } else if c.is_ascii_digit() || c == '.' {
            while i < chars.len() && (chars[i].is_ascii_digit() || chars[i] == '.') {
                i += 1;
            }
            // Exponent only when digits follow, so `2e` stays a malformed tail
            // rather than swallowing the constant `e`.
            if i < chars.len() && (chars[i] == 'e' || chars[i] == 'E') {
                let mut j = i + 1;
                if j < chars.len() && (chars[j] == '+' || chars[j] == '-') {
                    j += 1;
                }
                if j < chars.len() && chars[j].is_ascii_digit() {
                    i = j;
                    while i < chars.len() && chars[i].is_ascii_digit() {
                        i += 1;
                    }
                }
            }
            let text: String = chars[start..i].iter().collect();
            let value = text
                .parse::<f64>()
                .map_err(|_| ExpressionError::MalformedNumber {
                    text: text.clone(),
                    position: start,
                })?;
            tokens.push((Token::Number(value), start));
        } else if c.is_alphabetic() {
            while i < chars.len() && (chars[i].is_alphanumeric() || chars[i] == '_') {
                i += 1;
            }
            let ident: String = chars[start..i].iter().collect();
            tokens.push((Token::Identifier(ident), start));
        } else {
            let token = match c {
                '+' => Token::Plus,
                '-' => Token::Minus,
                '*' => Token::Star,
                '/' => Token::Slash,
                '^' => Token::Caret,
                '(' => Token::LParen,
                ')' => Token::RParen,
                _ => {
                    return Err(ExpressionError::UnexpectedCharacter {
                        ch: c,
                        position: start,
                    })
                }
            };
            tokens.push((token, start));
            i += 1;
        }
    }
    Ok(tokens)
}

struct Parser {
    tokens: Vec<(Token, usize)>,
    pos: usize,
}

impl Parser {
    fn peek(&self) -> Option<(Token, usize)> {
        self.tokens.get(self.pos).cloned()
    }

    fn consume(&mut self) -> Option<(Token, usize)> {
        let token = self.tokens.get(self.pos).cloned();
        if token.is_some() {
            self.pos += 1;
        }
        token
    }

    fn end_position(&self) -> usize {
        self.tokens.last().map(|(_, p)| p + 1).unwrap_or(0)
    }

    fn expect_rparen(&mut self) -> Result<(), ExpressionError> {
        match self.consume() {
            Some((Token::RParen, _)) => Ok(()),
            Some((_, position)) => Err(ExpressionError::UnclosedParen { position }),
            None => Err(ExpressionError::UnclosedParen {
                position: self.end_position(),
            }),
        }
    }

    fn parse_expression(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_term()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Plus => BinaryOp::Add,
                Token::Minus => BinaryOp::Sub,
                _ => break,
            };
            self.consume();
            let right = self.parse_term()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_term(&mut self) -> Result<Expr, ExpressionError> {
        let mut left = self.parse_unary()?;

        while let Some((token, _)) = self.peek() {
            let op = match token {
                Token::Star => BinaryOp::Mul,
                Token::Slash => BinaryOp::Div,
                _ => break,
            };
            self.consume();
            let right = self.parse_unary()?;
            left = Expr::Binary(Box::new(left), op, Box::new(right));
        }
        Ok(left)
    }

    fn parse_unary(&mut self) -> Result<Expr, ExpressionError> {
        match self.peek() {
            Some((Token::Minus, _)) => {
                self.consume();
                let expr = self.parse_unary()?;
                Ok(Expr::Neg(Box::new(expr)))
            }
            Some((Token::Plus, _)) => {
                self.consume();
                self.parse_unary()
            }
            _ => self.parse_power(),
        }
    }

    // Right-associative, and binds tighter than unary minus: -2^2 == -4.
    fn parse_power(&mut self) -> Result<Expr, ExpressionError> {
        let base = self.parse_primary()?;
        if let Some((Token::Caret, _)) = self.peek() {
            self.consume();
            let exponent = self.parse_unary()?;
            return Ok(Expr::Binary(Box::new(base), BinaryOp::Pow, Box::new(exponent)));
        }
        Ok(base)
    }

    fn parse_primary(&mut self) -> Result<Expr, ExpressionError> {
        match self.consume() {
            Some((Token::Number(n), _)) => Ok(Expr::Number(n)),
            Some((Token::Identifier(name), _)) => {
                if let Some((Token::LParen, _)) = self.peek() {
                    self.consume(); // eat '('
                    let arg = self.parse_expression()?;
                    self.expect_rparen()?;
                    Ok(Expr::Call(name, Box::new(arg)))
                } else {
                    Ok(Expr::Variable(name))
                }
            }
            Some((Token::LParen, _)) => {
                let expr = self.parse_expression()?;
                self.expect_rparen()?;
                Ok(expr)
            }
            Some((token, position)) => Err(ExpressionError::UnexpectedToken {
                token: token.to_string(),
                position,
            }),
            None => Err(ExpressionError::UnexpectedEnd),
        }
    }
}

// --- Expression ---

/// A user-supplied function of one free variable, compiled once and
/// evaluated many times.
#[derive(Debug, Clone)]
pub struct Expression {
    source: String,
    variable: String,
    bytecode: Bytecode,
    // Interior mutability for VM stack to avoid allocation in eval.
    // Note: This makes the expression !Sync; every solve owns its own copy.
    stack: RefCell<Vec<f64>>,
}

impl Expression {
    /// Parses and compiles `source` with `variable` as its only free variable.
    pub fn compile(source: &str, variable: &str) -> Result<Self, ExpressionError> {
        let parsed = parse(source)?;
        let compiler = Compiler::new(&[variable.to_string()]);
        let bytecode = compiler.compile(&parsed)?;
        Ok(Self {
            source: source.trim().to_string(),
            variable: variable.to_string(),
            bytecode,
            stack: RefCell::new(Vec::with_capacity(16)),
        })
    }

    /// An expression that ignores its variable.
    pub fn constant(value: f64, variable: &str) -> Self {
        Self {
            source: value.to_string(),
            variable: variable.to_string(),
            bytecode: Bytecode {
                ops: vec![OpCode::LoadConst(value)],
            },
            stack: RefCell::new(Vec::with_capacity(1)),
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn variable(&self) -> &str {
        &self.variable
    }

    /// Evaluates the expression with its free variable bound to `value`.
    pub fn eval(&self, value: f64) -> Result<f64, EvalError> {
        let mut stack = self.stack.borrow_mut();
        VM::execute(&self.bytecode, &[value], &mut stack)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn eval(source: &str, x: f64) -> f64 {
        Expression::compile(source, "x")
            .expect("expression should compile")
            .eval(x)
            .expect("expression should evaluate")
    }

    #[test]
    fn respects_operator_precedence() {
        assert_relative_eq!(eval("1 + 2 * 3", 0.0), 7.0);
        assert_relative_eq!(eval("(1 + 2) * 3", 0.0), 9.0);
        assert_relative_eq!(eval("10 - 4 - 3", 0.0), 3.0);
        assert_relative_eq!(eval("8 / 4 / 2", 0.0), 1.0);
    }

    #[test]
    fn power_is_right_associative_and_binds_tighter_than_negation() {
        assert_relative_eq!(eval("2^3^2", 0.0), 512.0);
        assert_relative_eq!(eval("-2^2", 0.0), -4.0);
        assert_relative_eq!(eval("2^-1", 0.0), 0.5);
        assert_relative_eq!(eval("x^2 + 1", 3.0), 10.0);
    }

    #[test]
    fn evaluates_function_vocabulary() {
        assert_relative_eq!(eval("sin(x)", 0.5), 0.5_f64.sin());
        assert_relative_eq!(eval("cos(x)", 0.5), 0.5_f64.cos());
        assert_relative_eq!(eval("tan(x)", 0.5), 0.5_f64.tan());
        assert_relative_eq!(eval("log(x)", 2.0), 2.0_f64.ln());
        assert_relative_eq!(eval("ln(x)", 2.0), 2.0_f64.ln());
        assert_relative_eq!(eval("exp(x)", 1.5), 1.5_f64.exp());
        assert_relative_eq!(eval("sqrt(x)", 9.0), 3.0);
        assert_relative_eq!(eval("abs(x)", -4.0), 4.0);
        assert_relative_eq!(eval("2*sin(pi/2) + e", 0.0), 2.0 + std::f64::consts::E);
    }

    #[test]
    fn parses_scientific_notation() {
        assert_relative_eq!(eval("1.5e3", 0.0), 1500.0);
        assert_relative_eq!(eval("2E-2 * x", 100.0), 2.0);
        assert_relative_eq!(eval("2*e", 0.0), 2.0 * std::f64::consts::E);
    }

    #[test]
    fn binds_only_the_declared_variable() {
        let g = Expression::compile("y * (1 - y)", "y").expect("compile");
        assert_relative_eq!(g.eval(0.25).expect("eval"), 0.1875);
        assert_eq!(
            Expression::compile("x + 1", "t").unwrap_err(),
            ExpressionError::UnknownVariable("x".to_string())
        );
    }

    #[test]
    fn rejects_malformed_input() {
        assert_eq!(parse("").unwrap_err(), ExpressionError::Empty);
        assert_eq!(parse("   ").unwrap_err(), ExpressionError::Empty);
        assert_eq!(parse("1 +").unwrap_err(), ExpressionError::UnexpectedEnd);
        assert_eq!(
            parse("x $ 2").unwrap_err(),
            ExpressionError::UnexpectedCharacter { ch: '$', position: 2 }
        );
        assert_eq!(
            parse("1.2.3").unwrap_err(),
            ExpressionError::MalformedNumber {
                text: "1.2.3".to_string(),
                position: 0
            }
        );
        assert!(matches!(
            parse("(x + 1").unwrap_err(),
            ExpressionError::UnclosedParen { .. }
        ));
        assert!(matches!(
            parse("2 x").unwrap_err(),
            ExpressionError::UnexpectedToken { position: 2, .. }
        ));
        assert!(matches!(
            parse("x ** 2").unwrap_err(),
            ExpressionError::UnexpectedToken { .. }
        ));
        assert_eq!(
            Expression::compile("foo(x)", "x").unwrap_err(),
            ExpressionError::UnknownFunction("foo".to_string())
        );
    }

    #[test]
    fn reports_domain_violations() {
        let inverse = Expression::compile("1 / x", "x").expect("compile");
        assert_eq!(inverse.eval(0.0), Err(EvalError::DivisionByZero));

        let log = Expression::compile("log(x)", "x").expect("compile");
        assert!(matches!(
            log.eval(-1.0),
            Err(EvalError::Domain { function: "log", .. })
        ));
        assert!(matches!(log.eval(0.0), Err(EvalError::Domain { .. })));

        let root = Expression::compile("sqrt(x)", "x").expect("compile");
        assert!(matches!(
            root.eval(-4.0),
            Err(EvalError::Domain { function: "sqrt", .. })
        ));

        let cube_root = Expression::compile("x^(1/3)", "x").expect("compile");
        assert!(matches!(
            cube_root.eval(-8.0),
            Err(EvalError::Domain { function: "^", .. })
        ));

        let reciprocal_power = Expression::compile("x^-1", "x").expect("compile");
        assert_eq!(reciprocal_power.eval(0.0), Err(EvalError::DivisionByZero));
    }

    #[test]
    fn reports_overflow_as_non_finite() {
        let huge = Expression::compile("exp(x)", "x").expect("compile");
        let err = huge.eval(1000.0).unwrap_err();
        assert_eq!(err, EvalError::NonFinite);
        assert!(err.is_overflow());
    }

    #[test]
    fn constant_expression_ignores_its_variable() {
        let c = Expression::constant(2.5, "t");
        assert_eq!(c.eval(-10.0), Ok(2.5));
        assert_eq!(c.eval(1e6), Ok(2.5));
        assert_eq!(c.variable(), "t");
    }

    #[test]
    fn vm_executes_generically_and_rejects_bad_bytecode() {
        let parsed = parse("x * 2 + 1").expect("parse");
        let code = Compiler::new(&["x".to_string()]).compile(&parsed).expect("compile");
        let mut stack: Vec<f32> = Vec::new();
        assert_eq!(VM::execute(&code, &[1.5f32], &mut stack), Ok(4.0f32));

        let broken = Bytecode { ops: vec![OpCode::Add] };
        let mut stack: Vec<f64> = Vec::new();
        assert_eq!(
            VM::execute(&broken, &[], &mut stack),
            Err(EvalError::MalformedBytecode)
        );
        let unbound = Bytecode { ops: vec![OpCode::LoadVar(3)] };
        assert_eq!(
            VM::execute(&unbound, &[1.0], &mut stack),
            Err(EvalError::MalformedBytecode)
        );
    }
}
