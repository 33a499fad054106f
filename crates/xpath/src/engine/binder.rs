//! Static pass over a freshly built expression tree.
//!
//! Resolves variables to pool slots and function calls to registry entries,
//! derives the context-sensitivity flags, rewrites step chains and decides
//! which paths need document-order materialization.

use tracing::debug;

use crate::engine::expr::{ExprId, ExprKind, ExprTree, PathStart};
use crate::engine::pool::Binding;
use crate::engine::steps::{StepDescriptor, StepKind, is_ordered, rewrite_chain};
use crate::functions::ResolveError;
use crate::model::XPathNavigator;
use crate::runtime::{DocumentOrderPolicy, Error, ErrorCode};
use crate::xdm::{AtomicValue, ExpandedName, XPathResultType};

/// Outcome of binding a tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BindInfo {
    /// Slots needed by one evaluation: external variables plus the deepest
    /// nesting of local bindings.
    pub pool_size: usize,
    pub external_count: usize,
}

/// Local slots are handed out by depth. Sibling scopes reuse a depth once the
/// earlier sibling is finished; a scope that runs while another expression is
/// still streaming (the `in` source of its variable, the source of a
/// predicate or step, an earlier function argument) starts above every depth
/// that expression used.
struct Binder<'a, N> {
    tree: &'a mut ExprTree<N>,
    externals: Vec<ExpandedName>,
    locals: Vec<Binding>,
    depth: usize,
    max_depth: usize,
}

pub fn bind<N: XPathNavigator>(tree: &mut ExprTree<N>, root: ExprId) -> Result<BindInfo, Error> {
    let externals = tree.static_context().in_scope_variables.clone();
    let mut binder = Binder { tree, externals, locals: Vec::new(), depth: 0, max_depth: 0 };
    binder.bind(root)?;
    let info = BindInfo {
        pool_size: binder.externals.len() + binder.max_depth,
        external_count: binder.externals.len(),
    };
    debug!(pool_size = info.pool_size, externals = info.external_count, "expression bound");
    Ok(info)
}

/// Position denoted by a literal predicate, if it can be turned into a
/// position filter.
fn literal_position<N>(tree: &ExprTree<N>, e: ExprId) -> Option<usize> {
    match tree.kind(e) {
        ExprKind::Literal(AtomicValue::Integer(i)) if *i >= 1 => usize::try_from(*i).ok(),
        ExprKind::Literal(AtomicValue::Decimal(d) | AtomicValue::Double(d))
            if *d >= 1.0 && d.fract() == 0.0 && *d < usize::MAX as f64 =>
        {
            Some(*d as usize)
        }
        _ => None,
    }
}

impl<N: XPathNavigator> Binder<'_, N> {
    /// Bind `id` and its subtree at the current depth. Returns the highest
    /// depth the subtree occupies while it runs.
    fn bind(&mut self, id: ExprId) -> Result<usize, Error> {
        let children = self.tree.children(id).to_vec();
        let mut reached = self.depth;
        match self.tree.kind(id) {
            ExprKind::For { var, .. } | ExprKind::Quantified { var, .. } => {
                let var = var.clone();
                let [source, body] = children[..] else {
                    return Err(Error::format(ErrorCode::XPST0003, &[&"binding expression needs a source and a body"]));
                };
                let used = self.bind(source)?;
                let binding = Binding {
                    name: var,
                    slot: self.externals.len() + used,
                    item_type: self.tree.item_type(source),
                };
                match &mut self.tree.node_mut(id).kind {
                    ExprKind::For { binding: b, .. } | ExprKind::Quantified { binding: b, .. } => {
                        *b = Some(binding.clone())
                    }
                    _ => {}
                }
                self.locals.push(binding);
                let saved = self.depth;
                self.depth = used + 1;
                self.max_depth = self.max_depth.max(self.depth);
                let res = self.bind(body);
                self.depth = saved;
                self.locals.pop();
                reached = res?;
            }
            ExprKind::VarRef { name, .. } => {
                let binding = self.resolve_variable(name)?;
                if let ExprKind::VarRef { binding: b, .. } = &mut self.tree.node_mut(id).kind {
                    *b = Some(binding);
                }
            }
            ExprKind::FunctionCall { name, .. } => {
                let name = name.clone();
                reached = self.bind_staggered(&children)?;
                let entry = {
                    let sc = self.tree.static_context();
                    match sc.functions.resolve(&name, children.len(), sc.default_function_namespace.as_deref()) {
                        Ok(entry) => entry.clone(),
                        Err(ResolveError::Unknown(n)) => {
                            return Err(Error::format(ErrorCode::XPST0017, &[&format!("{n}#{}", children.len())]));
                        }
                        Err(ResolveError::WrongArity { name, available }) => {
                            let arities: Vec<String> = available.iter().map(ToString::to_string).collect();
                            return Err(Error::from_code(
                                ErrorCode::XPST0017,
                                format!(
                                    "function {name} does not accept {} arguments (available arities: {})",
                                    children.len(),
                                    arities.join(", ")
                                ),
                            ));
                        }
                    }
                };
                if let ExprKind::FunctionCall { function, .. } = &mut self.tree.node_mut(id).kind {
                    *function = Some(entry);
                }
            }
            ExprKind::Path(_) => {
                reached = self.bind_staggered(&children)?;
                self.finish_path(id);
            }
            ExprKind::Filter { .. } => {
                reached = self.bind_staggered(&children)?;
                let chain = match &mut self.tree.node_mut(id).kind {
                    ExprKind::Filter { steps } => steps.take(),
                    _ => None,
                };
                let tree = &*self.tree;
                let steps = rewrite_chain(StepDescriptor::unlink(chain), |e| literal_position(tree, e));
                if let ExprKind::Filter { steps: s } = &mut self.tree.node_mut(id).kind {
                    *s = StepDescriptor::link(steps);
                }
            }
            _ => {
                for &c in &children {
                    reached = reached.max(self.bind(c)?);
                }
            }
        }
        let cs = self.context_sensitivity(id, &children);
        let flags = &mut self.tree.node_mut(id).flags;
        flags.context_sensitive = cs;
        flags.bound = true;
        Ok(reached)
    }

    /// Bind children that may stream side by side: each one starts above the
    /// depths used by the ones before it.
    fn bind_staggered(&mut self, children: &[ExprId]) -> Result<usize, Error> {
        let saved = self.depth;
        let mut reached = saved;
        let mut res = Ok(());
        for &c in children {
            self.depth = reached;
            match self.bind(c) {
                Ok(r) => reached = reached.max(r),
                Err(e) => {
                    res = Err(e);
                    break;
                }
            }
        }
        self.depth = saved;
        res.map(|()| reached)
    }

    fn resolve_variable(&self, name: &ExpandedName) -> Result<Binding, Error> {
        if let Some(b) = self.locals.iter().rev().find(|b| b.name == *name) {
            return Ok(b.clone());
        }
        if let Some(slot) = self.externals.iter().position(|n| n == name) {
            return Ok(Binding { name: name.clone(), slot, item_type: XPathResultType::Any });
        }
        Err(Error::format(ErrorCode::XPST0008, &[name]))
    }

    /// Rewrite the chain, then decide on orderedness and node checks.
    fn finish_path(&mut self, id: ExprId) {
        let (start, chain) = match &mut self.tree.node_mut(id).kind {
            ExprKind::Path(p) => (p.start, p.steps.take()),
            _ => return,
        };
        let tree = &*self.tree;
        let mut steps = rewrite_chain(StepDescriptor::unlink(chain), |e| literal_position(tree, e));

        let navigates = |from: usize, steps: &[StepDescriptor]| steps[from..].iter().any(|s| !s.kind.is_filter());
        for i in 0..steps.len() {
            let later = navigates(i + 1, &steps);
            if let StepKind::Expr { nodes_only, .. } = &mut steps[i].kind {
                *nodes_only = later;
            }
        }
        let (o, d, s) = match start {
            PathStart::Context | PathStart::Root => (true, true, true),
            PathStart::Expr(e) => match tree.kind(e) {
                ExprKind::Path(_) | ExprKind::Union => (true, false, false),
                _ => (false, false, false),
            },
        };
        let ordered = is_ordered(&steps, o, d, s);
        let force = tree.static_context().document_order == DocumentOrderPolicy::Always;
        let start_nodes_only = matches!(start, PathStart::Expr(_)) && navigates(0, &steps);
        debug!(
            steps = %steps.iter().map(ToString::to_string).collect::<Vec<_>>().join("/"),
            ordered,
            sort = !ordered || force,
            "path compiled"
        );
        if let ExprKind::Path(p) = &mut self.tree.node_mut(id).kind {
            p.steps = StepDescriptor::link(steps);
            p.ordered = ordered;
            p.sort = !ordered || force;
            p.start_nodes_only = start_nodes_only;
        }
    }

    fn context_sensitivity(&self, id: ExprId, children: &[ExprId]) -> bool {
        let any_child = || children.iter().any(|&c| self.tree.is_context_sensitive(c));
        match self.tree.kind(id) {
            ExprKind::ContextItem | ExprKind::Root => true,
            ExprKind::Path(p) => match p.start {
                PathStart::Context | PathStart::Root => true,
                PathStart::Expr(e) => self.tree.is_context_sensitive(e),
            },
            ExprKind::Filter { .. } => children.first().is_some_and(|&c| self.tree.is_context_sensitive(c)),
            ExprKind::FunctionCall { function, .. } => {
                function.as_ref().is_some_and(|f| f.context_sensitive) || any_child()
            }
            _ => any_child(),
        }
    }
}
