//! Function registry and the core function library.
//!
//! Calls are resolved once at bind time; evaluation invokes the stored
//! handle with the argument values.

use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::ast::ArithOp;
use crate::consts::FNS;
use crate::engine::arith::arithmetic;
use crate::engine::atomic::{atomize, atomize_optional, ebv, to_double};
use crate::engine::context::ContextProvider;
use crate::engine::cursor::{SequenceCursor, Value};
use crate::model::XPathNavigator;
use crate::runtime::{Error, ErrorCode, StaticContext};
use crate::xdm::{AtomicValue, ExpandedName, Item, XPathResultType};

pub type Arity = usize;

pub struct CallCtx<'a, N> {
    pub static_ctx: &'a StaticContext<N>,
    pub focus: &'a dyn ContextProvider<N>,
}

impl<N> CallCtx<'_, N> {
    pub fn context_item(&self) -> Result<&Item<N>, Error> {
        self.focus.context_item().ok_or_else(|| Error::format(ErrorCode::XPDY0002, &[&"context item"]))
    }
}

pub type FunctionImpl<N> = Arc<dyn Fn(&CallCtx<N>, Vec<Value<N>>) -> Result<Value<N>, Error> + Send + Sync>;

/// One registration: an arity range plus static properties of the function.
pub struct FunctionEntry<N> {
    pub min_arity: Arity,
    /// `None` is variadic.
    pub max_arity: Option<Arity>,
    /// Reads the focus (`position()`, `last()`, zero-argument `string()`).
    pub context_sensitive: bool,
    pub return_type: XPathResultType,
    pub func: FunctionImpl<N>,
}

impl<N> Clone for FunctionEntry<N> {
    fn clone(&self) -> Self {
        Self {
            min_arity: self.min_arity,
            max_arity: self.max_arity,
            context_sensitive: self.context_sensitive,
            return_type: self.return_type,
            func: self.func.clone(),
        }
    }
}

impl<N> fmt::Debug for FunctionEntry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FunctionEntry")
            .field("min_arity", &self.min_arity)
            .field("max_arity", &self.max_arity)
            .field("context_sensitive", &self.context_sensitive)
            .field("return_type", &self.return_type)
            .finish_non_exhaustive()
    }
}

impl<N> FunctionEntry<N> {
    pub fn new<F>(min_arity: Arity, max_arity: Option<Arity>, f: F) -> Self
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, Vec<Value<N>>) -> Result<Value<N>, Error>,
    {
        Self { min_arity, max_arity, context_sensitive: false, return_type: XPathResultType::Any, func: Arc::new(f) }
    }

    pub fn returns(mut self, t: XPathResultType) -> Self {
        self.return_type = t;
        self
    }

    pub fn context_sensitive(mut self) -> Self {
        self.context_sensitive = true;
        self
    }

    fn accepts(&self, arity: Arity) -> bool {
        arity >= self.min_arity && self.max_arity.is_none_or(|m| arity <= m)
    }
}

/// Error type returned by function resolution.
#[derive(Debug, Clone)]
pub enum ResolveError {
    /// No function with the (possibly default-namespace resolved) name exists.
    Unknown(ExpandedName),
    /// Function exists, but not for the requested arity. Provides known arities.
    WrongArity { name: ExpandedName, available: Vec<Arity> },
}

pub struct FunctionRegistry<N> {
    // Entries per name, kept sorted so that the most specific range wins:
    // higher minimum first, then smaller maximum (variadic last).
    fns: HashMap<ExpandedName, Vec<FunctionEntry<N>>>,
}

impl<N> Default for FunctionRegistry<N> {
    fn default() -> Self {
        Self { fns: HashMap::new() }
    }
}

impl<N> fmt::Debug for FunctionRegistry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<String> = self.fns.keys().map(ToString::to_string).collect();
        names.sort();
        f.debug_struct("FunctionRegistry").field("functions", &names).finish()
    }
}

impl<N> FunctionRegistry<N> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: ExpandedName, entry: FunctionEntry<N>) {
        let v = self.fns.entry(name).or_default();
        v.push(entry);
        v.sort_by(|a, b| {
            b.min_arity.cmp(&a.min_arity).then_with(|| match (a.max_arity, b.max_arity) {
                (Some(x), Some(y)) => x.cmp(&y),
                (Some(_), None) => core::cmp::Ordering::Less,
                (None, Some(_)) => core::cmp::Ordering::Greater,
                (None, None) => core::cmp::Ordering::Equal,
            })
        });
    }

    /// Convenience: register an exact-arity function in a namespace.
    pub fn register_ns<F>(&mut self, ns_uri: &str, local: &str, arity: Arity, ret: XPathResultType, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, Vec<Value<N>>) -> Result<Value<N>, Error>,
    {
        let name = ExpandedName::new(Some(ns_uri.to_string()), local);
        self.register(name, FunctionEntry::new(arity, Some(arity), f).returns(ret));
    }

    /// Convenience: register a variadic function in a namespace.
    pub fn register_ns_variadic<F>(&mut self, ns_uri: &str, local: &str, min_arity: Arity, ret: XPathResultType, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, Vec<Value<N>>) -> Result<Value<N>, Error>,
    {
        let name = ExpandedName::new(Some(ns_uri.to_string()), local);
        self.register(name, FunctionEntry::new(min_arity, None, f).returns(ret));
    }

    /// Convenience: register an exact-arity function without a namespace.
    pub fn register_local<F>(&mut self, local: &str, arity: Arity, ret: XPathResultType, f: F)
    where
        F: 'static + Send + Sync + Fn(&CallCtx<N>, Vec<Value<N>>) -> Result<Value<N>, Error>,
    {
        self.register(ExpandedName::local(local), FunctionEntry::new(arity, Some(arity), f).returns(ret));
    }

    /// Resolve a function by name/arity with optional default function namespace fallback.
    pub fn resolve(
        &self,
        name: &ExpandedName,
        arity: Arity,
        default_ns: Option<&str>,
    ) -> Result<&FunctionEntry<N>, ResolveError> {
        // Locally registered no-namespace functions take precedence over the default namespace.
        if let Some(e) = self.fns.get(name).and_then(|c| c.iter().find(|e| e.accepts(arity))) {
            return Ok(e);
        }
        let effective_buf = match (&name.ns_uri, default_ns) {
            (None, Some(ns)) => Some(ExpandedName::new(Some(ns.to_string()), name.local.clone())),
            _ => None,
        };
        let effective = effective_buf.as_ref().unwrap_or(name);
        let Some(cands) = self.fns.get(effective).or_else(|| self.fns.get(name)) else {
            return Err(ResolveError::Unknown(effective.clone()));
        };
        if let Some(e) = cands.iter().find(|e| e.accepts(arity)) {
            return Ok(e);
        }
        let mut available: Vec<Arity> = Vec::new();
        for e in cands {
            match e.max_arity {
                Some(m) => available.extend(e.min_arity..=m),
                None => available.push(e.min_arity),
            }
        }
        available.sort_unstable();
        available.dedup();
        Err(ResolveError::WrongArity { name: effective.clone(), available })
    }
}

fn string_arg<N: XPathNavigator>(v: Value<N>, what: &str) -> Result<String, Error> {
    Ok(atomize_optional(v, what)?.map(|a| a.lexical()).unwrap_or_default())
}

fn focus_or_arg<N: XPathNavigator>(ctx: &CallCtx<N>, args: Vec<Value<N>>) -> Result<Option<Item<N>>, Error> {
    match args.into_iter().next() {
        Some(v) => {
            let mut items = v.take(2)?;
            if items.len() > 1 {
                return Err(Error::format(ErrorCode::XPTY0004, &[&"expected at most one item"]));
            }
            Ok(items.pop())
        }
        None => ctx.context_item().cloned().map(Some),
    }
}

fn node_name<N: XPathNavigator>(item: Option<Item<N>>, local_only: bool) -> Result<String, Error> {
    match item {
        None => Ok(String::new()),
        Some(Item::Node(n)) => Ok(match n.name() {
            Some(q) if local_only => q.local,
            Some(q) => q.to_string(),
            None => String::new(),
        }),
        Some(Item::Atomic(a)) => {
            Err(Error::format(ErrorCode::XPTY0004, &[&format!("expected a node, got {}", a.type_name())]))
        }
    }
}

/// The functions every static context starts with, in the `fn` namespace.
pub fn core_functions<N: XPathNavigator>() -> FunctionRegistry<N> {
    use XPathResultType as T;
    let mut reg = FunctionRegistry::new();
    let fname = |l: &str| ExpandedName::new(Some(FNS.to_string()), l);

    reg.register(
        fname("position"),
        FunctionEntry::new(0, Some(0), |ctx: &CallCtx<N>, _| {
            ctx.context_item()?;
            Ok(Value::atomic(AtomicValue::Integer(ctx.focus.position() as i64)))
        })
        .returns(T::Number)
        .context_sensitive(),
    );
    reg.register(
        fname("last"),
        FunctionEntry::new(0, Some(0), |ctx: &CallCtx<N>, _| {
            Ok(Value::atomic(AtomicValue::Integer(ctx.focus.last()? as i64)))
        })
        .returns(T::Number)
        .context_sensitive(),
    );
    reg.register_ns(FNS, "count", 1, T::Number, |_, args| {
        let mut n = 0i64;
        for v in args {
            let mut c = v.into_cursor();
            while c.move_next()? {
                n += 1;
            }
        }
        Ok(Value::atomic(AtomicValue::Integer(n)))
    });
    reg.register_ns(FNS, "true", 0, T::Boolean, |_, _| Ok(Value::boolean(true)));
    reg.register_ns(FNS, "false", 0, T::Boolean, |_, _| Ok(Value::boolean(false)));
    reg.register_ns(FNS, "boolean", 1, T::Boolean, |_, mut args| match args.pop() {
        Some(v) => Ok(Value::boolean(ebv(v)?)),
        None => Ok(Value::boolean(false)),
    });
    reg.register_ns(FNS, "not", 1, T::Boolean, |_, mut args| match args.pop() {
        Some(v) => Ok(Value::boolean(!ebv(v)?)),
        None => Ok(Value::boolean(true)),
    });
    reg.register_ns(FNS, "empty", 1, T::Boolean, |_, mut args| match args.pop() {
        Some(v) => Ok(Value::boolean(v.take(1)?.is_empty())),
        None => Ok(Value::boolean(true)),
    });
    reg.register_ns(FNS, "exists", 1, T::Boolean, |_, mut args| match args.pop() {
        Some(v) => Ok(Value::boolean(!v.take(1)?.is_empty())),
        None => Ok(Value::boolean(false)),
    });

    reg.register(
        fname("string"),
        FunctionEntry::new(0, Some(0), |ctx: &CallCtx<N>, _| {
            Ok(Value::atomic(AtomicValue::String(ctx.context_item()?.value())))
        })
        .returns(T::Atomic)
        .context_sensitive(),
    );
    reg.register_ns(FNS, "string", 1, T::Atomic, |_, args| {
        let s = match args.into_iter().next() {
            Some(v) => v.take(2)?,
            None => Vec::new(),
        };
        match s.as_slice() {
            [] => Ok(Value::atomic(AtomicValue::String(String::new()))),
            [it] => Ok(Value::atomic(AtomicValue::String(it.value()))),
            _ => Err(Error::format(ErrorCode::XPTY0004, &[&"fn:string expects at most one item"])),
        }
    });
    reg.register(
        fname("number"),
        FunctionEntry::new(0, Some(0), |ctx: &CallCtx<N>, _| {
            Ok(Value::atomic(AtomicValue::Double(to_double(&ctx.context_item()?.typed_value()))))
        })
        .returns(T::Number)
        .context_sensitive(),
    );
    reg.register_ns(FNS, "number", 1, T::Number, |_, mut args| {
        let a = match args.pop() {
            Some(v) => atomize_optional(v, "fn:number")?,
            None => None,
        };
        Ok(Value::atomic(AtomicValue::Double(a.as_ref().map_or(f64::NAN, to_double))))
    });
    reg.register(
        fname("string-length"),
        FunctionEntry::new(0, Some(0), |ctx: &CallCtx<N>, _| {
            let n = ctx.context_item()?.value().chars().count();
            Ok(Value::atomic(AtomicValue::Integer(n as i64)))
        })
        .returns(T::Number)
        .context_sensitive(),
    );
    reg.register_ns(FNS, "string-length", 1, T::Number, |_, mut args| {
        let s = match args.pop() {
            Some(v) => string_arg(v, "fn:string-length")?,
            None => String::new(),
        };
        Ok(Value::atomic(AtomicValue::Integer(s.chars().count() as i64)))
    });
    for (local, local_only) in [("name", false), ("local-name", true)] {
        reg.register(
            fname(local),
            FunctionEntry::new(0, Some(0), move |ctx: &CallCtx<N>, args| {
                Ok(Value::atomic(AtomicValue::String(node_name(focus_or_arg(ctx, args)?, local_only)?)))
            })
            .returns(T::Atomic)
            .context_sensitive(),
        );
        reg.register_ns(FNS, local, 1, T::Atomic, move |ctx, args| {
            Ok(Value::atomic(AtomicValue::String(node_name(focus_or_arg(ctx, args)?, local_only)?)))
        });
    }
    reg.register_ns_variadic(FNS, "concat", 2, T::Atomic, |_, args| {
        let mut out = String::new();
        for v in args {
            out.push_str(&string_arg(v, "fn:concat")?);
        }
        Ok(Value::atomic(AtomicValue::String(out)))
    });
    reg.register_ns(FNS, "sum", 1, T::Number, |_, mut args| {
        let values = match args.pop() {
            Some(v) => atomize(v)?,
            None => Vec::new(),
        };
        let mut total = AtomicValue::Integer(0);
        for (i, a) in values.into_iter().enumerate() {
            let a = match a {
                AtomicValue::UntypedAtomic(s) => AtomicValue::Double(to_double(&AtomicValue::String(s))),
                other => other,
            };
            total = if i == 0 { a } else { arithmetic(ArithOp::Add, &total, &a)? };
        }
        Ok(Value::atomic(total))
    });
    reg
}
