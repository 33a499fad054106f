//! Lowering of syntax trees into the bound expression arena, and the
//! compiled-expression entry points.

use std::collections::HashMap;
use std::rc::Rc;

use tracing::debug;

use crate::ast::{self, BinaryOp, Literal, NameTest, PathStart, Step, WildcardName};
use crate::consts::CODEPOINT_URI;
use crate::engine::binder::{BindInfo, bind};
use crate::engine::context::{ContextProvider, Focus};
use crate::engine::cursor::{BoxCursor, Value};
use crate::engine::eval::execute;
use crate::engine::expr::{self, ExprId, ExprKind, ExprTree, PathExpr};
use crate::engine::node_test::{self, KindTest, NsTest};
use crate::engine::pool::DataPool;
use crate::engine::steps::{StepDescriptor, StepKind};
use crate::model::{QName, XPathNavigator};
use crate::runtime::{DynamicContext, Error, ErrorCode, StaticContext};
use crate::xdm::{AtomicValue, ExpandedName, Sequence, XPathResultType};

struct Lowerer<N> {
    tree: ExprTree<N>,
}

impl<N: XPathNavigator> Lowerer<N> {
    fn resolve_prefix(&self, prefix: &str) -> Result<String, Error> {
        self.tree
            .static_context()
            .namespaces
            .resolve(prefix)
            .map(str::to_string)
            .ok_or_else(|| Error::format(ErrorCode::XPST0081, &[&prefix]))
    }

    fn expanded(&self, q: &QName) -> Result<ExpandedName, Error> {
        if q.ns_uri.is_some() {
            return Ok(ExpandedName::new(q.ns_uri.clone(), q.local.clone()));
        }
        match q.prefix.as_deref() {
            Some(p) if !p.is_empty() => Ok(ExpandedName::new(Some(self.resolve_prefix(p)?), q.local.clone())),
            _ => Ok(ExpandedName::local(q.local.clone())),
        }
    }

    fn name_test(&self, q: &QName) -> Result<node_test::NameTest, Error> {
        let e = self.expanded(q)?;
        Ok(node_test::NameTest { ns: NsTest::Uri(e.ns_uri), local: Some(e.local) })
    }

    fn node_test(&self, t: &ast::NodeTest) -> Result<node_test::NodeTest, Error> {
        Ok(match t {
            ast::NodeTest::Name(NameTest::QName(q)) => node_test::NodeTest::Name(self.name_test(q)?),
            ast::NodeTest::Name(NameTest::Wildcard(w)) => node_test::NodeTest::Name(match w {
                WildcardName::Any => node_test::NameTest::any(),
                WildcardName::NsWildcard(p) => {
                    node_test::NameTest { ns: NsTest::Uri(Some(self.resolve_prefix(p)?)), local: None }
                }
                WildcardName::LocalWildcard(l) => node_test::NameTest { ns: NsTest::Any, local: Some(l.clone()) },
            }),
            ast::NodeTest::Kind(k) => node_test::NodeTest::Kind(match k {
                ast::KindTest::AnyKind => KindTest::AnyKind,
                ast::KindTest::Document => KindTest::Document,
                ast::KindTest::Text => KindTest::Text,
                ast::KindTest::Comment => KindTest::Comment,
                ast::KindTest::ProcessingInstruction(t) => KindTest::ProcessingInstruction(t.clone()),
                ast::KindTest::Element(q) => KindTest::Element(q.as_ref().map(|q| self.name_test(q)).transpose()?),
                ast::KindTest::Attribute(q) => {
                    KindTest::Attribute(q.as_ref().map(|q| self.name_test(q)).transpose()?)
                }
                ast::KindTest::NamespaceNode => KindTest::NamespaceNode,
            }),
        })
    }

    fn lower(&mut self, e: &ast::Expr) -> Result<ExprId, Error> {
        match e {
            ast::Expr::Literal(l) => Ok(match l {
                Literal::Integer(i) => self.tree.add(ExprKind::Literal(AtomicValue::Integer(*i))),
                Literal::Decimal(d) => self.tree.add(ExprKind::Literal(AtomicValue::Decimal(*d))),
                Literal::Double(d) => self.tree.add(ExprKind::Literal(AtomicValue::Double(*d))),
                Literal::String(s) => self.tree.add(ExprKind::Literal(AtomicValue::String(s.clone()))),
                Literal::Boolean(b) => self.tree.add(ExprKind::Literal(AtomicValue::Boolean(*b))),
                Literal::Typed(v) => self.tree.add(ExprKind::Literal(v.clone())),
                Literal::EmptySequence => self.tree.add(ExprKind::Sequence),
            }),
            ast::Expr::ContextItem => Ok(self.tree.add(ExprKind::ContextItem)),
            ast::Expr::VarRef(q) => {
                let name = self.expanded(q)?;
                Ok(self.tree.add(ExprKind::VarRef { name, binding: None }))
            }
            ast::Expr::FunctionCall { name, args } => {
                let name = self.expanded(name)?;
                let ids = self.lower_all(args)?;
                self.tree.add_with(ExprKind::FunctionCall { name, function: None }, &ids)
            }
            ast::Expr::Sequence(items) => {
                let ids = self.lower_all(items)?;
                self.tree.add_with(ExprKind::Sequence, &ids)
            }
            ast::Expr::Binary { left, op, right } => {
                let l = self.lower(left)?;
                let r = self.lower(right)?;
                let kind = match op {
                    BinaryOp::Arith(a) => ExprKind::Arithmetic(*a),
                    BinaryOp::And => ExprKind::And,
                    BinaryOp::Or => ExprKind::Or,
                    BinaryOp::Compare(c, o) => ExprKind::Compare(*c, *o),
                    BinaryOp::Union => ExprKind::Union,
                    BinaryOp::Range => ExprKind::Range,
                };
                self.tree.add_with(kind, &[l, r])
            }
            ast::Expr::Negate(inner) => {
                let id = self.lower(inner)?;
                self.tree.add_with(ExprKind::Negate, &[id])
            }
            ast::Expr::IfThenElse { cond, then_expr, else_expr } => {
                let ids = [self.lower(cond)?, self.lower(then_expr)?, self.lower(else_expr)?];
                self.tree.add_with(ExprKind::If, &ids)
            }
            ast::Expr::For { bindings, return_expr } => self.lower_bindings(bindings, return_expr, None),
            ast::Expr::Quantified { kind, bindings, satisfies } => self.lower_bindings(bindings, satisfies, Some(*kind)),
            ast::Expr::Path(p) => self.lower_path(p),
            ast::Expr::Filter { base, predicates } => {
                let source = self.lower(base)?;
                if predicates.is_empty() {
                    return Ok(source);
                }
                let preds = self.lower_all(predicates)?;
                let steps = preds.iter().map(|&p| StepDescriptor::new(StepKind::Predicate(p))).collect();
                let mut children = vec![source];
                children.extend(preds);
                self.tree.add_with(ExprKind::Filter { steps: StepDescriptor::link(steps) }, &children)
            }
        }
    }

    fn lower_all(&mut self, items: &[ast::Expr]) -> Result<Vec<ExprId>, Error> {
        items.iter().map(|e| self.lower(e)).collect()
    }

    /// Multiple bindings nest: `for $a in A, $b in B return R` is
    /// `for $a in A return for $b in B return R`.
    fn lower_bindings(
        &mut self,
        bindings: &[ast::VarBinding],
        body: &ast::Expr,
        quantifier: Option<ast::Quantifier>,
    ) -> Result<ExprId, Error> {
        let Some((first, rest)) = bindings.split_first() else {
            return Err(Error::format(ErrorCode::XPST0003, &[&"binding expression without variables"]));
        };
        let source = self.lower(&first.in_expr)?;
        let inner = if rest.is_empty() { self.lower(body)? } else { self.lower_bindings(rest, body, quantifier)? };
        let var = self.expanded(&first.var)?;
        let kind = match quantifier {
            None => ExprKind::For { var, binding: None },
            Some(q) => ExprKind::Quantified { quantifier: q, var, binding: None },
        };
        self.tree.add_with(kind, &[source, inner])
    }

    fn lower_path(&mut self, p: &ast::PathExpr) -> Result<ExprId, Error> {
        let mut children = Vec::new();
        let mut steps = Vec::new();
        let start = match &p.start {
            PathStart::Root => expr::PathStart::Root,
            PathStart::RootDescendant => {
                steps.push(StepDescriptor::axis(ast::Axis::DescendantOrSelf, node_test::NodeTest::any_node()));
                expr::PathStart::Root
            }
            PathStart::Relative => expr::PathStart::Context,
            PathStart::Expr(e) => {
                let id = self.lower(e)?;
                children.push(id);
                expr::PathStart::Expr(id)
            }
        };
        for step in &p.steps {
            match step {
                Step::Axis { axis, test, predicates } => {
                    steps.push(StepDescriptor::axis(*axis, self.node_test(test)?));
                    for pred in predicates {
                        let id = self.lower(pred)?;
                        children.push(id);
                        steps.push(StepDescriptor::new(StepKind::Predicate(id)));
                    }
                }
                Step::Expr(e) => {
                    let id = self.lower(e)?;
                    children.push(id);
                    steps.push(StepDescriptor::new(StepKind::Expr { expr: id, nodes_only: false }));
                }
            }
        }
        if steps.is_empty() {
            return match start {
                expr::PathStart::Root => Ok(self.tree.add(ExprKind::Root)),
                expr::PathStart::Context => Ok(self.tree.add(ExprKind::ContextItem)),
                expr::PathStart::Expr(id) => Ok(id),
            };
        }
        let path = PathExpr {
            start,
            steps: StepDescriptor::link(steps),
            ordered: false,
            sort: true,
            start_nodes_only: false,
        };
        self.tree.add_with(ExprKind::Path(path), &children)
    }
}

/// A bound, immutable expression ready to run any number of times.
pub struct CompiledExpr<N> {
    tree: Rc<ExprTree<N>>,
    root: ExprId,
    info: BindInfo,
}

impl<N> Clone for CompiledExpr<N> {
    fn clone(&self) -> Self {
        Self { tree: self.tree.clone(), root: self.root, info: self.info }
    }
}

/// Lower `expr` against `static_ctx` and bind it.
pub fn compile<N: XPathNavigator>(expr: &ast::Expr, static_ctx: &StaticContext<N>) -> Result<CompiledExpr<N>, Error> {
    if static_ctx.default_collation != CODEPOINT_URI {
        return Err(Error::format(ErrorCode::FOCH0002, &[&static_ctx.default_collation]));
    }
    let mut lowerer = Lowerer { tree: ExprTree::new(static_ctx.clone()) };
    let root = lowerer.lower(expr)?;
    let mut tree = lowerer.tree;
    let info = bind(&mut tree, root)?;
    debug!(nodes = tree.len(), pool_size = info.pool_size, "expression compiled");
    Ok(CompiledExpr { tree: Rc::new(tree), root, info })
}

impl<N: XPathNavigator> CompiledExpr<N> {
    pub fn tree(&self) -> &Rc<ExprTree<N>> {
        &self.tree
    }

    pub fn root(&self) -> ExprId {
        self.root
    }

    pub fn pool_size(&self) -> usize {
        self.info.pool_size
    }

    /// Fresh data pool with the external variables filled in. Every declared
    /// external variable must have a value.
    pub fn create_pool(&self, variables: &HashMap<ExpandedName, Sequence<N>>) -> Result<DataPool<N>, Error> {
        let pool = DataPool::new(self.info.pool_size);
        for (slot, name) in self.tree.static_context().in_scope_variables.iter().enumerate() {
            let value = variables
                .get(name)
                .ok_or_else(|| Error::format(ErrorCode::XPDY0002, &[&format!("external variable ${name}")]))?;
            pool.set(slot, Rc::from(value.clone()));
        }
        Ok(pool)
    }

    /// Run the root expression with an explicit focus and pool.
    pub fn execute(&self, provider: &dyn ContextProvider<N>, pool: &DataPool<N>) -> Result<Value<N>, Error> {
        execute(&self.tree, self.root, provider, pool)
    }

    /// Lazily evaluated result.
    pub fn evaluate_stream(&self, dyn_ctx: &DynamicContext<N>) -> Result<BoxCursor<N>, Error> {
        let pool = self.create_pool(&dyn_ctx.variables)?;
        let focus = Focus::new(dyn_ctx.context_item.clone());
        Ok(self.execute(&focus, &pool)?.into_cursor())
    }

    /// Fully materialized result.
    pub fn evaluate(&self, dyn_ctx: &DynamicContext<N>) -> Result<Sequence<N>, Error> {
        let pool = self.create_pool(&dyn_ctx.variables)?;
        let focus = Focus::new(dyn_ctx.context_item.clone());
        self.execute(&focus, &pool)?.into_sequence()
    }

    pub fn return_type(&self) -> XPathResultType {
        self.tree.return_type(self.root)
    }

    pub fn is_context_sensitive(&self) -> bool {
        self.tree.is_context_sensitive(self.root)
    }

    /// Whether the root is a path statically known to deliver document
    /// order without re-sorting.
    pub fn is_ordered_path(&self) -> bool {
        matches!(self.tree.kind(self.root), ExprKind::Path(p) if p.ordered)
    }

    /// Whether the root path's result is re-materialized in document order.
    pub fn sorts_result(&self) -> bool {
        matches!(self.tree.kind(self.root), ExprKind::Path(p) if p.sort)
    }

    /// Rendered step chain of a root path or filter, e.g.
    /// `["Descendant(b)", "PositionFilter(2)"]`.
    pub fn describe_steps(&self) -> Vec<String> {
        let chain = match self.tree.kind(self.root) {
            ExprKind::Path(p) => p.steps.as_deref(),
            ExprKind::Filter { steps } => steps.as_deref(),
            _ => None,
        };
        chain.into_iter().flat_map(StepDescriptor::iter).map(ToString::to_string).collect()
    }
}
