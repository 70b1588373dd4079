//! # golite-ast
//!
//! Syntax tree handed to the golite engine by an external parser.
//!
//! Every node carries a unique, monotonically increasing [`AstId`]. Parsers
//! number children before their parents, so the root of a tree has the
//! largest id and `root.id + 1` is free for ids minted later.
//!
//! - [`ast`] - node shapes, operators and type expressions
//! - [`build`] - [`AstBuilder`], a programmatic way to assemble trees

pub mod ast;
pub mod build;

pub use ast::{
    AstId, BinaryOperator, Location, LiteralValue, Node, NodeKind, NodeRef, Param, TypeExpr,
    UnaryOperator,
};
pub use build::AstBuilder;
