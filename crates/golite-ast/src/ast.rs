//! Abstract Syntax Tree definitions for golite.
//!
//! The node set is closed: the engine dispatches over [`NodeKind`] with
//! exhaustive matches. Trees are shared through [`NodeRef`] so the engine can
//! index any subtree by id without copying it.

use std::fmt;
use std::rc::Rc;

use num_enum::{IntoPrimitive, TryFromPrimitive};
use serde::{Deserialize, Serialize};

/// Unique id of a syntax-tree node.
pub type AstId = u32;

/// Shared handle to a node.
pub type NodeRef = Rc<Node>;

/// Source position reported with diagnostics.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Location {
    pub line: u32,
    pub column: u32,
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Nodes
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    pub id: AstId,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loc: Option<Location>,
    #[serde(flatten)]
    pub kind: NodeKind,
}

/// Function parameter. The declared type is informational only.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Param {
    pub name: String,
    #[serde(default, rename = "type", skip_serializing_if = "Option::is_none")]
    pub ty: Option<TypeExpr>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all_fields = "camelCase")]
pub enum NodeKind {
    // === Statements ===
    SourceFile {
        declarations: Vec<NodeRef>,
    },
    Block {
        statements: Vec<NodeRef>,
    },
    VariableDeclaration {
        names: Vec<String>,
        #[serde(default)]
        var_type: Option<TypeExpr>,
        #[serde(default)]
        values: Vec<NodeRef>,
    },
    FunctionDeclaration {
        name: String,
        params: Vec<Param>,
        body: NodeRef,
    },
    ReturnStatement {
        #[serde(default)]
        value: Option<NodeRef>,
    },
    IfStatement {
        #[serde(default)]
        init: Option<NodeRef>,
        condition: NodeRef,
        consequent: NodeRef,
        #[serde(default)]
        alternative: Option<NodeRef>,
    },
    ForStatement {
        #[serde(default)]
        init: Option<NodeRef>,
        #[serde(default)]
        condition: Option<NodeRef>,
        #[serde(default)]
        post: Option<NodeRef>,
        body: NodeRef,
    },
    BreakStatement,
    ContinueStatement,
    ExpressionStatement {
        expression: NodeRef,
    },
    GoStatement {
        call: NodeRef,
    },
    SendStatement {
        channel: NodeRef,
        value: NodeRef,
    },
    EmptyStatement,
    Assignment {
        left: Vec<NodeRef>,
        /// Set for compound assignment (`x += v`).
        #[serde(default)]
        operator: Option<BinaryOperator>,
        right: Vec<NodeRef>,
    },

    // === Expressions ===
    UnaryExpression {
        operator: UnaryOperator,
        argument: NodeRef,
    },
    BinaryExpression {
        operator: BinaryOperator,
        left: NodeRef,
        right: NodeRef,
    },
    Identifier {
        name: String,
    },
    Literal {
        value: LiteralValue,
    },
    FunctionLiteral {
        params: Vec<Param>,
        body: NodeRef,
    },
    TypeLiteral {
        #[serde(rename = "value")]
        ty: TypeExpr,
    },
    CallExpression {
        callee: NodeRef,
        #[serde(default)]
        args: Vec<NodeRef>,
    },
    /// `operand.selector`, used for methods on sync primitives.
    SelectorExpression {
        operand: NodeRef,
        selector: String,
    },
}

impl Node {
    /// Node kind name as it appears in the serialized tree.
    pub fn kind_name(&self) -> &'static str {
        match &self.kind {
            NodeKind::SourceFile { .. } => "SourceFile",
            NodeKind::Block { .. } => "Block",
            NodeKind::VariableDeclaration { .. } => "VariableDeclaration",
            NodeKind::FunctionDeclaration { .. } => "FunctionDeclaration",
            NodeKind::ReturnStatement { .. } => "ReturnStatement",
            NodeKind::IfStatement { .. } => "IfStatement",
            NodeKind::ForStatement { .. } => "ForStatement",
            NodeKind::BreakStatement => "BreakStatement",
            NodeKind::ContinueStatement => "ContinueStatement",
            NodeKind::ExpressionStatement { .. } => "ExpressionStatement",
            NodeKind::GoStatement { .. } => "GoStatement",
            NodeKind::SendStatement { .. } => "SendStatement",
            NodeKind::EmptyStatement => "EmptyStatement",
            NodeKind::Assignment { .. } => "Assignment",
            NodeKind::UnaryExpression { .. } => "UnaryExpression",
            NodeKind::BinaryExpression { .. } => "BinaryExpression",
            NodeKind::Identifier { .. } => "Identifier",
            NodeKind::Literal { .. } => "Literal",
            NodeKind::FunctionLiteral { .. } => "FunctionLiteral",
            NodeKind::TypeLiteral { .. } => "TypeLiteral",
            NodeKind::CallExpression { .. } => "CallExpression",
            NodeKind::SelectorExpression { .. } => "SelectorExpression",
        }
    }

    /// Direct children, in source order.
    pub fn children(&self) -> Vec<&NodeRef> {
        let mut out = Vec::new();
        match &self.kind {
            NodeKind::SourceFile { declarations } => out.extend(declarations),
            NodeKind::Block { statements } => out.extend(statements),
            NodeKind::VariableDeclaration { values, .. } => out.extend(values),
            NodeKind::FunctionDeclaration { body, .. } | NodeKind::FunctionLiteral { body, .. } => {
                out.push(body)
            }
            NodeKind::ReturnStatement { value } => out.extend(value),
            NodeKind::IfStatement { init, condition, consequent, alternative } => {
                out.extend(init);
                out.push(condition);
                out.push(consequent);
                out.extend(alternative);
            }
            NodeKind::ForStatement { init, condition, post, body } => {
                out.extend(init);
                out.extend(condition);
                out.extend(post);
                out.push(body);
            }
            NodeKind::ExpressionStatement { expression } => out.push(expression),
            NodeKind::GoStatement { call } => out.push(call),
            NodeKind::SendStatement { channel, value } => {
                out.push(channel);
                out.push(value);
            }
            NodeKind::Assignment { left, right, .. } => {
                out.extend(left);
                out.extend(right);
            }
            NodeKind::UnaryExpression { argument, .. } => out.push(argument),
            NodeKind::BinaryExpression { left, right, .. } => {
                out.push(left);
                out.push(right);
            }
            NodeKind::CallExpression { callee, args } => {
                out.push(callee);
                out.extend(args);
            }
            NodeKind::SelectorExpression { operand, .. } => out.push(operand),
            NodeKind::BreakStatement
            | NodeKind::ContinueStatement
            | NodeKind::EmptyStatement
            | NodeKind::Identifier { .. }
            | NodeKind::Literal { .. }
            | NodeKind::TypeLiteral { .. } => {}
        }
        out
    }

    /// Short source-like rendering of an expression, used in messages.
    pub fn describe(&self) -> String {
        match &self.kind {
            NodeKind::Identifier { name } => name.clone(),
            NodeKind::Literal { value } => value.to_string(),
            NodeKind::SelectorExpression { operand, selector } => {
                format!("{}.{}", operand.describe(), selector)
            }
            NodeKind::CallExpression { callee, .. } => format!("{}(...)", callee.describe()),
            NodeKind::FunctionLiteral { .. } => "func literal".to_string(),
            NodeKind::TypeLiteral { ty } => ty.to_string(),
            NodeKind::UnaryExpression { operator, argument } => {
                format!("{}{}", operator.symbol(), argument.describe())
            }
            NodeKind::BinaryExpression { operator, left, right } => {
                format!("{} {} {}", left.describe(), operator.symbol(), right.describe())
            }
            _ => self.kind_name().to_string(),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Literals and types
// ═══════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum LiteralValue {
    Number(f64),
    String(String),
}

impl fmt::Display for LiteralValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LiteralValue::Number(n) => write!(f, "{}", n),
            LiteralValue::String(s) => write!(f, "{:?}", s),
        }
    }
}

/// Type expression as written in declarations, `make` and `new`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind")]
pub enum TypeExpr {
    /// `int`, `float64`, `bool`, ...
    Basic { name: String },
    Channel { element: Box<TypeExpr> },
    WaitGroup,
    Mutex,
    Function,
}

impl TypeExpr {
    pub fn is_bool(&self) -> bool {
        matches!(self, TypeExpr::Basic { name } if name == "bool")
    }
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TypeExpr::Basic { name } => f.write_str(name),
            TypeExpr::Channel { element } => write!(f, "chan {}", element),
            TypeExpr::WaitGroup => f.write_str("sync.WaitGroup"),
            TypeExpr::Mutex => f.write_str("sync.Mutex"),
            TypeExpr::Function => f.write_str("func"),
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════
// Operators
// ═══════════════════════════════════════════════════════════════════════════

/// Unary operators. The `u8` value is the heap encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum UnaryOperator {
    #[serde(rename = "+")]
    Plus = 0,
    #[serde(rename = "-")]
    Minus = 1,
    #[serde(rename = "!")]
    Not = 2,
    #[serde(rename = "^")]
    Complement = 3,
    #[serde(rename = "<-")]
    Receive = 4,
}

impl UnaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            UnaryOperator::Plus => "+",
            UnaryOperator::Minus => "-",
            UnaryOperator::Not => "!",
            UnaryOperator::Complement => "^",
            UnaryOperator::Receive => "<-",
        }
    }
}

/// Binary operators. The `u8` value is the heap encoding.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, IntoPrimitive, TryFromPrimitive,
)]
#[repr(u8)]
pub enum BinaryOperator {
    #[serde(rename = "+")]
    Add = 0,
    #[serde(rename = "-")]
    Sub = 1,
    #[serde(rename = "*")]
    Mul = 2,
    #[serde(rename = "/")]
    Div = 3,
    #[serde(rename = "%")]
    Rem = 4,
    #[serde(rename = "&")]
    BitAnd = 5,
    #[serde(rename = "|")]
    BitOr = 6,
    #[serde(rename = "^")]
    BitXor = 7,
    #[serde(rename = "&^")]
    BitClear = 8,
    #[serde(rename = "<<")]
    Shl = 9,
    #[serde(rename = ">>")]
    Shr = 10,
    #[serde(rename = "==")]
    Eq = 11,
    #[serde(rename = "!=")]
    Ne = 12,
    #[serde(rename = "<")]
    Lt = 13,
    #[serde(rename = "<=")]
    Le = 14,
    #[serde(rename = ">")]
    Gt = 15,
    #[serde(rename = ">=")]
    Ge = 16,
    #[serde(rename = "&&")]
    LogicalAnd = 17,
    #[serde(rename = "||")]
    LogicalOr = 18,
}

impl BinaryOperator {
    pub fn symbol(self) -> &'static str {
        match self {
            BinaryOperator::Add => "+",
            BinaryOperator::Sub => "-",
            BinaryOperator::Mul => "*",
            BinaryOperator::Div => "/",
            BinaryOperator::Rem => "%",
            BinaryOperator::BitAnd => "&",
            BinaryOperator::BitOr => "|",
            BinaryOperator::BitXor => "^",
            BinaryOperator::BitClear => "&^",
            BinaryOperator::Shl => "<<",
            BinaryOperator::Shr => ">>",
            BinaryOperator::Eq => "==",
            BinaryOperator::Ne => "!=",
            BinaryOperator::Lt => "<",
            BinaryOperator::Le => "<=",
            BinaryOperator::Gt => ">",
            BinaryOperator::Ge => ">=",
            BinaryOperator::LogicalAnd => "&&",
            BinaryOperator::LogicalOr => "||",
        }
    }

    #[inline]
    pub fn is_logical(self) -> bool {
        matches!(self, BinaryOperator::LogicalAnd | BinaryOperator::LogicalOr)
    }

    #[inline]
    pub fn is_comparison(self) -> bool {
        matches!(
            self,
            BinaryOperator::Eq
                | BinaryOperator::Ne
                | BinaryOperator::Lt
                | BinaryOperator::Le
                | BinaryOperator::Gt
                | BinaryOperator::Ge
        )
    }
}
