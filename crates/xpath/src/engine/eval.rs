use std::rc::Rc;
use std::sync::Arc;

use crate::ast::{Comparison, Quantifier};
use crate::engine::arith::{arithmetic, negate};
use crate::engine::atomic::{atomize_optional, cast_untyped, ebv, general_compare_pair, value_compare};
use crate::engine::context::{ContextProvider, Focus};
use crate::engine::cursor::{BoxCursor, BufferedCursor, FlattenCursor, NodeCheckCursor, RangeCursor, SequenceCursor, Value};
use crate::engine::expr::{ExprId, ExprKind, ExprTree, PathExpr, PathStart};
use crate::engine::join::ForCursor;
use crate::engine::order::{DocumentOrderCursor, sort_document_order};
use crate::engine::pool::DataPool;
use crate::engine::steps::build_chain;
use crate::functions::CallCtx;
use crate::model::XPathNavigator;
use crate::runtime::{Error, ErrorCode};
use crate::xdm::{AtomicValue, Item};

fn missing_context() -> Error {
    Error::format(ErrorCode::XPDY0002, &[&"context item"])
}

fn unbound(what: &str) -> Error {
    Error::format(ErrorCode::XPST0003, &[&format!("{what} was not bound")])
}

fn context_node<N: XPathNavigator>(ctx: &dyn ContextProvider<N>, what: &str) -> Result<N, Error> {
    match ctx.context_item() {
        Some(Item::Node(n)) => Ok(n.clone()),
        Some(Item::Atomic(_)) => Err(Error::format(ErrorCode::XPTY0020, &[&what])),
        None => Err(missing_context()),
    }
}

fn root_of<N: XPathNavigator>(ctx: &dyn ContextProvider<N>) -> Result<N, Error> {
    let mut n = context_node(ctx, "root")?;
    n.move_to_root();
    Ok(n)
}

/// Arithmetic errors surface as type errors of the operator; the original
/// error stays available as the source.
fn reraise_arithmetic(e: Error) -> Error {
    match e.code_enum() {
        ErrorCode::FOAR0001 | ErrorCode::FOAR0002 => {
            let msg = format!("arithmetic operation failed: {}", e.message);
            let source: Arc<dyn std::error::Error + Send + Sync> = Arc::new(e);
            Error::from_code(ErrorCode::XPTY0004, msg).with_source(Some(source))
        }
        _ => e,
    }
}

fn numeric_operand(a: AtomicValue) -> Result<AtomicValue, Error> {
    match a {
        AtomicValue::UntypedAtomic(s) => cast_untyped(&s, &AtomicValue::Double(0.0)),
        other => Ok(other),
    }
}

fn untyped_as_string(a: AtomicValue) -> AtomicValue {
    match a {
        AtomicValue::UntypedAtomic(s) => AtomicValue::String(s),
        other => other,
    }
}

/// Execute one expression node.
///
/// Given equal focus and pool contents the result is the same; sequences are
/// returned as lazy cursors wherever the expression allows it.
pub fn execute<N: XPathNavigator>(
    tree: &Rc<ExprTree<N>>,
    id: ExprId,
    ctx: &dyn ContextProvider<N>,
    pool: &DataPool<N>,
) -> Result<Value<N>, Error> {
    let children = tree.children(id);
    let child = |i: usize| children.get(i).copied().ok_or_else(|| unbound("operand"));
    match tree.kind(id) {
        ExprKind::Literal(v) => Ok(Value::atomic(v.clone())),
        ExprKind::ContextItem => ctx.context_item().cloned().map(Value::Item).ok_or_else(missing_context),
        ExprKind::Root => Ok(Value::Item(Item::Node(root_of(ctx)?))),
        ExprKind::VarRef { binding, name } => {
            let b = binding.as_ref().ok_or_else(|| unbound(&format!("${name}")))?;
            Ok(Value::from_items(b.get(pool)?))
        }
        ExprKind::FunctionCall { name, function } => {
            let f = function.as_ref().ok_or_else(|| unbound(&format!("{name}()")))?;
            let args = children.iter().map(|&c| execute(tree, c, ctx, pool)).collect::<Result<Vec<_>, _>>()?;
            let call = CallCtx { static_ctx: tree.static_context(), focus: ctx };
            (f.func)(&call, args)
        }
        ExprKind::Path(p) => execute_path(tree, p, ctx, pool),
        ExprKind::Filter { steps } => {
            let source = execute(tree, child(0)?, ctx, pool)?.into_cursor();
            let flat: BoxCursor<N> = Box::new(FlattenCursor::single(source));
            Ok(Value::Cursor(build_chain(steps.as_deref(), flat, tree, pool, false)))
        }
        ExprKind::Arithmetic(op) => {
            let l = atomize_optional(execute(tree, child(0)?, ctx, pool)?, "arithmetic")?;
            let r = atomize_optional(execute(tree, child(1)?, ctx, pool)?, "arithmetic")?;
            let (Some(l), Some(r)) = (l, r) else {
                return Ok(Value::empty());
            };
            let (l, r) = (numeric_operand(l)?, numeric_operand(r)?);
            arithmetic(*op, &l, &r).map(Value::atomic).map_err(reraise_arithmetic)
        }
        ExprKind::Negate => match atomize_optional(execute(tree, child(0)?, ctx, pool)?, "unary minus")? {
            Some(a) => negate(&numeric_operand(a)?).map(Value::atomic).map_err(reraise_arithmetic),
            None => Ok(Value::empty()),
        },
        ExprKind::And => {
            let v = ebv(execute(tree, child(0)?, ctx, pool)?)? && ebv(execute(tree, child(1)?, ctx, pool)?)?;
            Ok(Value::boolean(v))
        }
        ExprKind::Or => {
            let v = ebv(execute(tree, child(0)?, ctx, pool)?)? || ebv(execute(tree, child(1)?, ctx, pool)?)?;
            Ok(Value::boolean(v))
        }
        ExprKind::Compare(Comparison::Value, op) => {
            let l = atomize_optional(execute(tree, child(0)?, ctx, pool)?, "value comparison")?;
            let r = atomize_optional(execute(tree, child(1)?, ctx, pool)?, "value comparison")?;
            match (l, r) {
                (Some(l), Some(r)) => {
                    Ok(Value::boolean(value_compare(*op, &untyped_as_string(l), &untyped_as_string(r))?))
                }
                _ => Ok(Value::empty()),
            }
        }
        ExprKind::Compare(Comparison::General, op) => {
            let left = execute(tree, child(0)?, ctx, pool)?.into_sequence()?;
            let right = BufferedCursor::new(execute(tree, child(1)?, ctx, pool)?.into_cursor());
            for l in &left {
                let l = l.typed_value();
                let mut r = right.clone_instance();
                while r.move_next()? {
                    if let Some(it) = r.current()
                        && general_compare_pair(*op, &l, &it.typed_value())?
                    {
                        return Ok(Value::boolean(true));
                    }
                }
            }
            Ok(Value::boolean(false))
        }
        ExprKind::If => {
            let branch = if ebv(execute(tree, child(0)?, ctx, pool)?)? { child(1)? } else { child(2)? };
            execute(tree, branch, ctx, pool)
        }
        ExprKind::For { binding, .. } => {
            let binding = binding.clone().ok_or_else(|| unbound("for variable"))?;
            let body = child(1)?;
            let source = execute(tree, child(0)?, ctx, pool)?.into_cursor();
            let focus = Focus::snapshot(ctx, tree.is_context_sensitive(body));
            Ok(Value::Cursor(Box::new(ForCursor::new(tree.clone(), body, binding, source, focus, pool.clone()))))
        }
        ExprKind::Quantified { quantifier, binding, .. } => {
            let binding = binding.as_ref().ok_or_else(|| unbound("quantified variable"))?;
            let body = child(1)?;
            let mut source = execute(tree, child(0)?, ctx, pool)?.into_cursor();
            let every = *quantifier == Quantifier::Every;
            while source.move_next()? {
                let Some(item) = source.current().cloned() else { continue };
                binding.set(pool, Rc::from(vec![item]));
                if ebv(execute(tree, body, ctx, pool)?)? != every {
                    return Ok(Value::boolean(!every));
                }
            }
            Ok(Value::boolean(every))
        }
        ExprKind::Sequence => {
            let parts = children
                .iter()
                .map(|&c| execute(tree, c, ctx, pool).map(Value::into_cursor))
                .collect::<Result<Vec<_>, _>>()?;
            Ok(Value::Cursor(Box::new(FlattenCursor::new(parts))))
        }
        ExprKind::Range => {
            let from = atomize_optional(execute(tree, child(0)?, ctx, pool)?, "range")?;
            let to = atomize_optional(execute(tree, child(1)?, ctx, pool)?, "range")?;
            match (from.map(range_bound).transpose()?, to.map(range_bound).transpose()?) {
                (Some(a), Some(b)) => Ok(Value::Cursor(Box::new(RangeCursor::new(a, b)))),
                _ => Ok(Value::empty()),
            }
        }
        ExprKind::Union => {
            let mut nodes = Vec::new();
            for &c in children {
                for it in execute(tree, c, ctx, pool)?.into_sequence()? {
                    match it {
                        Item::Node(n) => nodes.push(n),
                        Item::Atomic(a) => {
                            return Err(Error::format(
                                ErrorCode::XPTY0004,
                                &[&format!("union operand contains {}", a.type_name())],
                            ));
                        }
                    }
                }
            }
            sort_document_order(&mut nodes, true);
            Ok(Value::from_items(nodes.into_iter().map(Item::Node).collect::<Vec<_>>()))
        }
    }
}

fn range_bound(a: AtomicValue) -> Result<i64, Error> {
    match a {
        AtomicValue::Integer(i) => Ok(i),
        AtomicValue::UntypedAtomic(s) => s
            .trim()
            .parse()
            .map_err(|_| Error::format(ErrorCode::FORG0001, &[&s, &"xs:integer"])),
        AtomicValue::Decimal(d) | AtomicValue::Double(d) if d.fract() == 0.0 && d.is_finite() => Ok(d as i64),
        other => Err(Error::format(
            ErrorCode::XPTY0004,
            &[&format!("range bound must be an integer, got {}", other.type_name())],
        )),
    }
}

fn execute_path<N: XPathNavigator>(
    tree: &Rc<ExprTree<N>>,
    p: &PathExpr,
    ctx: &dyn ContextProvider<N>,
    pool: &DataPool<N>,
) -> Result<Value<N>, Error> {
    let start: BoxCursor<N> = match p.start {
        PathStart::Context => {
            let item = ctx.context_item().cloned().ok_or_else(missing_context)?;
            Value::Item(item).into_cursor()
        }
        PathStart::Root => Value::Item(Item::Node(root_of(ctx)?)).into_cursor(),
        PathStart::Expr(e) => {
            let c = execute(tree, e, ctx, pool)?.into_cursor();
            if p.start_nodes_only { Box::new(NodeCheckCursor::new(c)) } else { c }
        }
    };
    let cursor = build_chain(p.steps.as_deref(), start, tree, pool, true);
    if p.sort {
        let dedup = tree.static_context().remove_duplicates;
        Ok(Value::Cursor(Box::new(DocumentOrderCursor::new(cursor, dedup))))
    } else {
        Ok(Value::Cursor(cursor))
    }
}
