//! Programmatic construction of syntax trees.
//!
//! [`AstBuilder`] hands out ids in creation order. Since a parent can only be
//! built from children that already exist, every parent gets a larger id than
//! its descendants and the root ends up with the largest id, matching what the
//! external parser produces.

use std::rc::Rc;

use crate::ast::{
    AstId, BinaryOperator, LiteralValue, Location, Node, NodeKind, NodeRef, Param, TypeExpr,
    UnaryOperator,
};

#[derive(Debug, Default)]
pub struct AstBuilder {
    next_id: AstId,
}

impl AstBuilder {
    pub fn new() -> Self {
        Self { next_id: 0 }
    }

    /// Builder whose first node gets `first_id`.
    pub fn starting_at(first_id: AstId) -> Self {
        Self { next_id: first_id }
    }

    /// Id the next node will receive.
    pub fn next_id(&self) -> AstId {
        self.next_id
    }

    fn node(&mut self, kind: NodeKind) -> NodeRef {
        let id = self.next_id;
        self.next_id += 1;
        Rc::new(Node { id, loc: None, kind })
    }

    /// Attach a source location to a freshly built node.
    pub fn at(node: NodeRef, line: u32, column: u32) -> NodeRef {
        let mut inner = Rc::unwrap_or_clone(node);
        inner.loc = Some(Location { line, column });
        Rc::new(inner)
    }

    // === Expressions ===

    pub fn ident(&mut self, name: &str) -> NodeRef {
        self.node(NodeKind::Identifier { name: name.to_string() })
    }

    pub fn number(&mut self, value: f64) -> NodeRef {
        self.node(NodeKind::Literal { value: LiteralValue::Number(value) })
    }

    pub fn string(&mut self, value: &str) -> NodeRef {
        self.node(NodeKind::Literal { value: LiteralValue::String(value.to_string()) })
    }

    pub fn unary(&mut self, operator: UnaryOperator, argument: NodeRef) -> NodeRef {
        self.node(NodeKind::UnaryExpression { operator, argument })
    }

    /// `<-ch`
    pub fn recv(&mut self, channel: NodeRef) -> NodeRef {
        self.unary(UnaryOperator::Receive, channel)
    }

    pub fn binary(&mut self, operator: BinaryOperator, left: NodeRef, right: NodeRef) -> NodeRef {
        self.node(NodeKind::BinaryExpression { operator, left, right })
    }

    pub fn call(&mut self, callee: NodeRef, args: Vec<NodeRef>) -> NodeRef {
        self.node(NodeKind::CallExpression { callee, args })
    }

    /// Call of a function referred to by name.
    pub fn call_named(&mut self, name: &str, args: Vec<NodeRef>) -> NodeRef {
        let callee = self.ident(name);
        self.call(callee, args)
    }

    pub fn func_lit(&mut self, params: &[&str], body: Vec<NodeRef>) -> NodeRef {
        let body = self.block(body);
        self.node(NodeKind::FunctionLiteral { params: params_of(params), body })
    }

    pub fn type_lit(&mut self, ty: TypeExpr) -> NodeRef {
        self.node(NodeKind::TypeLiteral { ty })
    }

    /// `chan int` type literal.
    pub fn chan_type(&mut self) -> NodeRef {
        self.type_lit(TypeExpr::Channel {
            element: Box::new(TypeExpr::Basic { name: "int".to_string() }),
        })
    }

    pub fn selector(&mut self, operand: NodeRef, selector: &str) -> NodeRef {
        self.node(NodeKind::SelectorExpression { operand, selector: selector.to_string() })
    }

    /// `recv.method(args...)` where `recv` is a variable.
    pub fn method_call(&mut self, receiver: &str, method: &str, args: Vec<NodeRef>) -> NodeRef {
        let operand = self.ident(receiver);
        let callee = self.selector(operand, method);
        self.call(callee, args)
    }

    // === Statements ===

    pub fn block(&mut self, statements: Vec<NodeRef>) -> NodeRef {
        self.node(NodeKind::Block { statements })
    }

    pub fn var_decl(
        &mut self,
        names: &[&str],
        var_type: Option<TypeExpr>,
        values: Vec<NodeRef>,
    ) -> NodeRef {
        self.node(NodeKind::VariableDeclaration {
            names: names.iter().map(|n| n.to_string()).collect(),
            var_type,
            values,
        })
    }

    /// `name := value`
    pub fn define(&mut self, name: &str, value: NodeRef) -> NodeRef {
        self.var_decl(&[name], None, vec![value])
    }

    pub fn func_decl(&mut self, name: &str, params: &[&str], body: Vec<NodeRef>) -> NodeRef {
        let body = self.block(body);
        self.node(NodeKind::FunctionDeclaration {
            name: name.to_string(),
            params: params_of(params),
            body,
        })
    }

    /// `name = value`
    pub fn assign(&mut self, name: &str, value: NodeRef) -> NodeRef {
        let target = self.ident(name);
        self.node(NodeKind::Assignment { left: vec![target], operator: None, right: vec![value] })
    }

    /// `a, b = x, y`
    pub fn assign_many(&mut self, names: &[&str], values: Vec<NodeRef>) -> NodeRef {
        let left = names.iter().map(|n| self.ident(n)).collect();
        self.node(NodeKind::Assignment { left, operator: None, right: values })
    }

    /// `name op= value`
    pub fn op_assign(&mut self, name: &str, operator: BinaryOperator, value: NodeRef) -> NodeRef {
        let target = self.ident(name);
        self.node(NodeKind::Assignment {
            left: vec![target],
            operator: Some(operator),
            right: vec![value],
        })
    }

    pub fn expr_stmt(&mut self, expression: NodeRef) -> NodeRef {
        self.node(NodeKind::ExpressionStatement { expression })
    }

    pub fn go(&mut self, call: NodeRef) -> NodeRef {
        self.node(NodeKind::GoStatement { call })
    }

    pub fn send(&mut self, channel: NodeRef, value: NodeRef) -> NodeRef {
        self.node(NodeKind::SendStatement { channel, value })
    }

    pub fn ret(&mut self, value: Option<NodeRef>) -> NodeRef {
        self.node(NodeKind::ReturnStatement { value })
    }

    pub fn if_else(
        &mut self,
        init: Option<NodeRef>,
        condition: NodeRef,
        consequent: Vec<NodeRef>,
        alternative: Option<NodeRef>,
    ) -> NodeRef {
        let consequent = self.block(consequent);
        self.node(NodeKind::IfStatement { init, condition, consequent, alternative })
    }

    pub fn for_loop(
        &mut self,
        init: Option<NodeRef>,
        condition: Option<NodeRef>,
        post: Option<NodeRef>,
        body: Vec<NodeRef>,
    ) -> NodeRef {
        let body = self.block(body);
        self.node(NodeKind::ForStatement { init, condition, post, body })
    }

    pub fn brk(&mut self) -> NodeRef {
        self.node(NodeKind::BreakStatement)
    }

    pub fn cont(&mut self) -> NodeRef {
        self.node(NodeKind::ContinueStatement)
    }

    pub fn empty(&mut self) -> NodeRef {
        self.node(NodeKind::EmptyStatement)
    }

    /// `println(args...)` as a statement.
    pub fn println(&mut self, args: Vec<NodeRef>) -> NodeRef {
        let call = self.call_named("println", args);
        self.expr_stmt(call)
    }

    pub fn source_file(&mut self, declarations: Vec<NodeRef>) -> NodeRef {
        self.node(NodeKind::SourceFile { declarations })
    }
}

fn params_of(names: &[&str]) -> Vec<Param> {
    names.iter().map(|n| Param { name: n.to_string(), ty: None }).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn max_id(node: &Node) -> AstId {
        node.children().into_iter().map(|c| max_id(c)).fold(node.id, AstId::max)
    }

    #[test]
    fn test_root_has_largest_id() {
        let mut b = AstBuilder::new();
        let x = b.number(1.0);
        let decl = b.define("x", x);
        let arg = b.ident("x");
        let print = b.println(vec![arg]);
        let main = b.func_decl("main", &[], vec![decl, print]);
        let file = b.source_file(vec![main]);

        assert_eq!(max_id(&file), file.id);
        assert_eq!(b.next_id(), file.id + 1);
    }

    #[test]
    fn test_location_keeps_id() {
        let mut b = AstBuilder::starting_at(10);
        let n = b.ident("ch");
        let located = AstBuilder::at(n, 3, 7);
        assert_eq!(located.id, 10);
        assert_eq!(located.loc.map(|l| l.to_string()), Some("3:7".to_string()));
    }

    #[test]
    fn test_builder_output_serializes_like_parser_input() {
        let mut b = AstBuilder::new();
        let ch = b.ident("ch");
        let recv = b.recv(ch);
        let json = serde_json::to_value(&*recv).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "id": 1,
                "type": "UnaryExpression",
                "operator": "<-",
                "argument": { "id": 0, "type": "Identifier", "name": "ch" }
            })
        );
    }
}
