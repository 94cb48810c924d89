//! The AST: an immutable, cycle-free tree owned by exactly one
//! `CompiledRule`. Every node kind is represented here as a closed sum
//! type rather than a dynamic value carrier, so the evaluator can match
//! exhaustively instead of probing a tag at runtime.

use std::fmt;

/// A literal value appearing directly in rule text.
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Bool(bool),
    Str(String),
    Num(f64),
}

impl fmt::Display for Literal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Literal::Bool(b) => write!(f, "{b}"),
            Literal::Str(s) => write!(f, "\"{}\"", s.replace('"', "\\\"")),
            Literal::Num(n) => write!(f, "{n}"),
        }
    }
}

/// `not` is the only unary operator in the DSL.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
}

impl fmt::Display for UnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("not")
    }
}

/// Comparison, logical, membership, and regex-style binary operators.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    LtEq,
    Gt,
    GtEq,
    In,
    Matches,
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            BinaryOp::And => "and",
            BinaryOp::Or => "or",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::LtEq => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::GtEq => ">=",
            BinaryOp::In => "in",
            BinaryOp::Matches => "matches",
        };
        f.write_str(s)
    }
}

/// One node of the AST. Boxed children keep the enum a fixed size and
/// make ownership obviously tree-shaped: no `Rc`/`Arc` needed since a
/// `CompiledRule` is the single owner of its whole AST.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Literal(Literal),
    /// `root.fields[0].fields[1]...`, e.g. root="span", fields=["status"].
    FieldAccess { root: String, fields: Vec<String> },
    /// `object[index]`.
    IndexAccess { object: Box<Expr>, index: Box<Expr> },
    Unary { op: UnaryOp, expr: Box<Expr> },
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// Dotted function name plus its argument list, e.g. `trace.has(x)`.
    Call { function: String, args: Vec<Expr> },
}

impl Expr {
    pub fn field_access(root: impl Into<String>, fields: Vec<String>) -> Self {
        Expr::FieldAccess {
            root: root.into(),
            fields,
        }
    }

    pub fn index(object: Expr, index: Expr) -> Self {
        Expr::IndexAccess {
            object: Box::new(object),
            index: Box::new(index),
        }
    }

    pub fn unary(op: UnaryOp, expr: Expr) -> Self {
        Expr::Unary {
            op,
            expr: Box::new(expr),
        }
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    pub fn call(function: impl Into<String>, args: Vec<Expr>) -> Self {
        Expr::Call {
            function: function.into(),
            args,
        }
    }
}

/// Renders the AST back into DSL text. Every sub-expression is fully
/// parenthesized so re-lexing/re-parsing the printed form always yields a
/// structurally equivalent tree regardless of operator precedence; the
/// round-trip law only requires equivalence, not a minimal rendering.
impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::Literal(lit) => write!(f, "{lit}"),
            Expr::FieldAccess { root, fields } => {
                write!(f, "{root}")?;
                for field in fields {
                    write!(f, ".{field}")?;
                }
                Ok(())
            }
            Expr::IndexAccess { object, index } => write!(f, "{object}[{index}]"),
            Expr::Unary { op, expr } => write!(f, "({op} {expr})"),
            Expr::Binary { op, left, right } => write!(f, "({left} {op} {right})"),
            Expr::Call { function, args } => {
                write!(f, "{function}(")?;
                for (i, arg) in args.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{arg}")?;
                }
                write!(f, ")")
            }
        }
    }
}
