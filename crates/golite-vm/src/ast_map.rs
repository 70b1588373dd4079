//! Registry of syntax-tree nodes by id.
//!
//! Heap records refer to nodes by [`AstId`]; this map turns ids back into
//! nodes. It also owns the nodes the engine synthesizes at run time
//! (desugared loops and ifs, the `main()` call, predeclared type literals),
//! numbering them after the largest id of the parsed tree.

use std::rc::Rc;

use golite_ast::{AstId, LiteralValue, Location, Node, NodeKind, NodeRef, Param, TypeExpr};
use hashbrown::HashMap;

use crate::error::RuntimeError;

pub struct AstMap {
    nodes: HashMap<AstId, NodeRef>,
    next_id: AstId,
    desugared: HashMap<AstId, NodeRef>,
    main_call: Option<NodeRef>,
    root: NodeRef,
}

/// Parameters and body of a function node.
pub struct FunctionParts {
    pub params: Vec<Param>,
    pub body: NodeRef,
}

impl AstMap {
    pub fn new(root: NodeRef) -> Result<Self, RuntimeError> {
        let mut nodes = HashMap::new();
        let mut max_id = root.id;
        let mut pending = vec![Rc::clone(&root)];
        while let Some(node) = pending.pop() {
            max_id = max_id.max(node.id);
            pending.extend(node.children().into_iter().cloned());
            if nodes.insert(node.id, node.clone()).is_some() {
                return Err(RuntimeError::Internal(format!("duplicate syntax node id {}", node.id)));
            }
        }
        Ok(Self {
            nodes,
            next_id: max_id + 1,
            desugared: HashMap::new(),
            main_call: None,
            root,
        })
    }

    pub fn root(&self) -> &NodeRef {
        &self.root
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Id the next minted node will get.
    pub fn next_id(&self) -> AstId {
        self.next_id
    }

    pub fn get(&self, id: AstId) -> Result<NodeRef, RuntimeError> {
        self.nodes
            .get(&id)
            .cloned()
            .ok_or_else(|| RuntimeError::Internal(format!("no syntax node with id {}", id)))
    }

    /// Register a new node with a fresh id.
    pub fn mint(&mut self, kind: NodeKind, loc: Option<Location>) -> NodeRef {
        let node = Rc::new(Node { id: self.next_id, loc, kind });
        self.next_id += 1;
        self.nodes.insert(node.id, Rc::clone(&node));
        node
    }

    /// Rewrite of `node` if it needs one: a `for` or `if` with an init
    /// statement becomes a block holding the init followed by the statement
    /// without it. Rewrites are built once per node.
    pub fn desugared(&mut self, node: &Node) -> Option<NodeRef> {
        if let Some(done) = self.desugared.get(&node.id) {
            return Some(Rc::clone(done));
        }
        let (init, rest) = match &node.kind {
            NodeKind::ForStatement { init: Some(init), condition, post, body } => (
                Rc::clone(init),
                NodeKind::ForStatement {
                    init: None,
                    condition: condition.clone(),
                    post: post.clone(),
                    body: Rc::clone(body),
                },
            ),
            NodeKind::IfStatement { init: Some(init), condition, consequent, alternative } => (
                Rc::clone(init),
                NodeKind::IfStatement {
                    init: None,
                    condition: Rc::clone(condition),
                    consequent: Rc::clone(consequent),
                    alternative: alternative.clone(),
                },
            ),
            _ => return None,
        };
        let rest = self.mint(rest, node.loc);
        let block = self.mint(NodeKind::Block { statements: vec![init, rest] }, node.loc);
        self.desugared.insert(node.id, Rc::clone(&block));
        Some(block)
    }

    /// The synthetic `main()` call that starts a program.
    pub fn main_call(&mut self) -> NodeRef {
        if let Some(call) = &self.main_call {
            return Rc::clone(call);
        }
        let callee = self.mint(NodeKind::Identifier { name: "main".to_string() }, None);
        let call = self.mint(NodeKind::CallExpression { callee, args: Vec::new() }, None);
        self.main_call = Some(Rc::clone(&call));
        call
    }

    /// A type literal node for a predeclared type.
    pub fn type_literal(&mut self, ty: TypeExpr) -> NodeRef {
        self.mint(NodeKind::TypeLiteral { ty }, None)
    }

    /// Parameters and body of a function declaration or literal.
    pub fn function(&self, id: AstId) -> Result<FunctionParts, RuntimeError> {
        let node = self.get(id)?;
        match &node.kind {
            NodeKind::FunctionDeclaration { params, body, .. }
            | NodeKind::FunctionLiteral { params, body } => {
                Ok(FunctionParts { params: params.clone(), body: Rc::clone(body) })
            }
            _ => Err(RuntimeError::Internal(format!(
                "closure refers to {} node {}",
                node.kind_name(),
                id
            ))),
        }
    }

    /// Text of a string literal node.
    pub fn string_literal(&self, id: AstId) -> Option<String> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::Literal { value: LiteralValue::String(s) } => Some(s.clone()),
            _ => None,
        }
    }

    /// Type of a type literal node.
    pub fn type_of(&self, id: AstId) -> Option<TypeExpr> {
        match &self.nodes.get(&id)?.kind {
            NodeKind::TypeLiteral { ty } => Some(ty.clone()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use golite_ast::AstBuilder;
    use pretty_assertions::assert_eq;

    fn counting_loop(b: &mut AstBuilder) -> NodeRef {
        let zero = b.number(0.0);
        let init = b.define("i", zero);
        let i = b.ident("i");
        let three = b.number(3.0);
        let cond = b.binary(golite_ast::BinaryOperator::Lt, i, three);
        let one = b.number(1.0);
        let post = b.op_assign("i", golite_ast::BinaryOperator::Add, one);
        b.for_loop(Some(init), Some(cond), Some(post), vec![])
    }

    #[test]
    fn test_registers_every_node() {
        let mut b = AstBuilder::new();
        let lp = counting_loop(&mut b);
        let main = b.func_decl("main", &[], vec![lp]);
        let file = b.source_file(vec![main]);
        let map = AstMap::new(file.clone()).unwrap();
        assert_eq!(map.len() as u32, file.id + 1);
        assert_eq!(map.next_id(), file.id + 1);
        assert_eq!(map.get(0).unwrap().kind_name(), "Literal");
        assert!(map.get(file.id + 1).is_err());
    }

    #[test]
    fn test_rejects_duplicate_ids() {
        let mut b = AstBuilder::new();
        let x = b.ident("x");
        let mut again = AstBuilder::new();
        let y = again.ident("y");
        let first = b.expr_stmt(x);
        let second = again.expr_stmt(y);
        assert_eq!(first.id, second.id);
        let block = b.block(vec![first, second]);
        assert!(AstMap::new(block).is_err());
    }

    #[test]
    fn test_for_with_init_is_desugared_once() {
        let mut b = AstBuilder::new();
        let lp = counting_loop(&mut b);
        let mut map = AstMap::new(lp.clone()).unwrap();
        let first = map.desugared(&lp).unwrap();
        let second = map.desugared(&lp).unwrap();
        assert!(Rc::ptr_eq(&first, &second));
        let NodeKind::Block { statements } = &first.kind else {
            panic!("expected a block");
        };
        assert_eq!(statements[0].kind_name(), "VariableDeclaration");
        assert!(matches!(statements[1].kind, NodeKind::ForStatement { init: None, .. }));
        assert!(statements[1].id > lp.id);
        assert!(map.desugared(&statements[1]).is_none());
    }

    #[test]
    fn test_main_call_is_minted_once() {
        let mut b = AstBuilder::new();
        let file = b.source_file(vec![]);
        let mut map = AstMap::new(file).unwrap();
        let call = map.main_call();
        assert_eq!(call.id, 2);
        assert_eq!(map.main_call().id, 2);
        assert_eq!(call.describe(), "main(...)");
    }
}
