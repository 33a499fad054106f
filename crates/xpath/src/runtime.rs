use core::fmt;
use std::collections::HashMap;
use std::sync::Arc;

use crate::consts::{CODEPOINT_URI, ERR_NS, FNS, XML_URI};
use crate::functions::{FunctionRegistry, core_functions};
use crate::model::XPathNavigator;
use crate::xdm::{ExpandedName, Item, Sequence};

/// Error codes the engine emits.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Arithmetic
    FOAR0001, // divide by zero
    FOAR0002, // numeric overflow
    // Collations
    FOCH0002, // unsupported collation
    FORG0001, // invalid lexical form / casting failure
    FORG0006, // invalid effective boolean value
    // Dynamic type errors
    XPTY0004, // operand type error
    XPTY0018, // path result mixes nodes and atomic values
    XPTY0019, // intermediate path step result is not a node
    XPTY0020, // axis step context item is not a node
    XPDY0002, // context item / variable value undefined
    // Static errors
    XPST0003, // malformed expression tree
    XPST0008, // undeclared variable
    XPST0017, // unknown function
    XPST0081, // undeclared namespace prefix
    // Fallback / unknown (kept last)
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::FOAR0001 => "err:FOAR0001",
            ErrorCode::FOAR0002 => "err:FOAR0002",
            ErrorCode::FOCH0002 => "err:FOCH0002",
            ErrorCode::FORG0001 => "err:FORG0001",
            ErrorCode::FORG0006 => "err:FORG0006",
            ErrorCode::XPTY0004 => "err:XPTY0004",
            ErrorCode::XPTY0018 => "err:XPTY0018",
            ErrorCode::XPTY0019 => "err:XPTY0019",
            ErrorCode::XPTY0020 => "err:XPTY0020",
            ErrorCode::XPDY0002 => "err:XPDY0002",
            ErrorCode::XPST0003 => "err:XPST0003",
            ErrorCode::XPST0008 => "err:XPST0008",
            ErrorCode::XPST0017 => "err:XPST0017",
            ErrorCode::XPST0081 => "err:XPST0081",
            ErrorCode::Unknown => "err:UNKNOWN",
        }
    }

    pub fn from_code(s: &str) -> Self {
        use ErrorCode::*;
        match s {
            "err:FOAR0001" => FOAR0001,
            "err:FOAR0002" => FOAR0002,
            "err:FOCH0002" => FOCH0002,
            "err:FORG0001" => FORG0001,
            "err:FORG0006" => FORG0006,
            "err:XPTY0004" => XPTY0004,
            "err:XPTY0018" => XPTY0018,
            "err:XPTY0019" => XPTY0019,
            "err:XPTY0020" => XPTY0020,
            "err:XPDY0002" => XPDY0002,
            "err:XPST0003" => XPST0003,
            "err:XPST0008" => XPST0008,
            "err:XPST0017" => XPST0017,
            "err:XPST0081" => XPST0081,
            _ => Unknown,
        }
    }

    /// QName of the code in the `err:` namespace.
    pub fn qname(&self) -> ExpandedName {
        let local = self.as_str().trim_start_matches("err:");
        ExpandedName { ns_uri: Some(ERR_NS.to_string()), local: local.to_string() }
    }

    /// Message template; `{0}`, `{1}` … are replaced by `Error::format`.
    pub fn template(&self) -> &'static str {
        match self {
            ErrorCode::FOAR0001 => "division by zero in {0}",
            ErrorCode::FOAR0002 => "numeric overflow in {0}",
            ErrorCode::FOCH0002 => "unknown collation URI: {0}",
            ErrorCode::FORG0001 => "cannot convert '{0}' to {1}",
            ErrorCode::FORG0006 => "effective boolean value is not defined for {0}",
            ErrorCode::XPTY0004 => "{0}",
            ErrorCode::XPTY0018 => "result of path step mixes nodes and atomic values",
            ErrorCode::XPTY0019 => "intermediate path step returned {0}, expected a node",
            ErrorCode::XPTY0020 => "axis {0} requires a node as context item",
            ErrorCode::XPDY0002 => "{0} is undefined",
            ErrorCode::XPST0003 => "malformed expression: {0}",
            ErrorCode::XPST0008 => "variable ${0} is not declared",
            ErrorCode::XPST0017 => "unknown function {0}",
            ErrorCode::XPST0081 => "namespace prefix '{0}' is not declared",
            ErrorCode::Unknown => "{0}",
        }
    }

    pub fn is_static(&self) -> bool {
        self.as_str().starts_with("err:XPST")
    }
}

#[derive(Debug, Clone, thiserror::Error)]
pub struct Error {
    pub code: ExpandedName,
    pub message: String,
    #[source]
    pub source: Option<Arc<dyn std::error::Error + Send + Sync>>, // optional chained cause
}

impl Error {
    pub fn new_qname(code: ExpandedName, msg: impl Into<String>) -> Self {
        Self { code, message: msg.into(), source: None }
    }

    pub fn from_code(code: ErrorCode, msg: impl Into<String>) -> Self {
        Self::new_qname(code.qname(), msg)
    }

    /// Build an error from the code's message template.
    pub fn format(code: ErrorCode, args: &[&dyn fmt::Display]) -> Self {
        let mut msg = code.template().to_string();
        for (i, arg) in args.iter().enumerate() {
            msg = msg.replace(&format!("{{{i}}}"), &arg.to_string());
        }
        Self::from_code(code, msg)
    }

    pub fn code_enum(&self) -> ErrorCode {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            ErrorCode::from_code(&format!("err:{}", self.code.local))
        } else {
            ErrorCode::Unknown
        }
    }

    /// Format the code as a human-readable string (err:LOCAL or Q{ns}local).
    pub fn format_code(&self) -> String {
        if self.code.ns_uri.as_deref() == Some(ERR_NS) {
            format!("err:{}", self.code.local)
        } else if let Some(ns) = &self.code.ns_uri {
            format!("Q{{{}}}{}", ns, self.code.local)
        } else {
            self.code.local.clone()
        }
    }

    pub fn is_static(&self) -> bool {
        self.code_enum().is_static()
    }

    /// Compose an error with a source cause.
    pub fn with_source(mut self, source: impl Into<Option<Arc<dyn std::error::Error + Send + Sync>>>) -> Self {
        self.source = source.into();
        self
    }

    /// Code of the chained cause when it is an engine error.
    pub fn source_code(&self) -> Option<ErrorCode> {
        self.source.as_ref().and_then(|s| s.downcast_ref::<Error>()).map(Error::code_enum)
    }
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "error: {} ({})", self.message, self.format_code())
    }
}

#[derive(Debug, Clone, Default)]
pub struct NamespaceBindings {
    pub by_prefix: HashMap<String, String>,
}

impl NamespaceBindings {
    pub fn resolve(&self, prefix: &str) -> Option<&str> {
        self.by_prefix.get(prefix).map(String::as_str)
    }
}

/// When path results are re-materialized in document order.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum DocumentOrderPolicy {
    /// Wrap only paths whose orderedness cannot be proven statically.
    #[default]
    Auto,
    /// Wrap every path. Results are identical; useful for diagnostics.
    Always,
}

#[derive(Clone)]
pub struct StaticContext<N> {
    pub default_function_namespace: Option<String>,
    pub default_collation: String,
    pub namespaces: NamespaceBindings,
    /// External variables in declaration order; they occupy the lowest pool slots.
    pub in_scope_variables: Vec<ExpandedName>,
    pub functions: Arc<FunctionRegistry<N>>,
    pub document_order: DocumentOrderPolicy,
    /// Drop adjacent same-position nodes after a document-order sort.
    pub remove_duplicates: bool,
}

impl<N> fmt::Debug for StaticContext<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StaticContext")
            .field("default_function_namespace", &self.default_function_namespace)
            .field("default_collation", &self.default_collation)
            .field("namespaces", &self.namespaces)
            .field("in_scope_variables", &self.in_scope_variables)
            .field("functions", &self.functions)
            .field("document_order", &self.document_order)
            .field("remove_duplicates", &self.remove_duplicates)
            .finish()
    }
}

impl<N: XPathNavigator> Default for StaticContext<N> {
    fn default() -> Self {
        let mut ns = NamespaceBindings::default();
        // Ensure implicit xml namespace binding (cannot be overridden)
        ns.by_prefix.insert("xml".to_string(), XML_URI.to_string());
        ns.by_prefix.insert("fn".to_string(), FNS.to_string());
        Self {
            default_function_namespace: Some(FNS.to_string()),
            default_collation: CODEPOINT_URI.to_string(),
            namespaces: ns,
            in_scope_variables: Vec::new(),
            functions: Arc::new(core_functions()),
            document_order: DocumentOrderPolicy::Auto,
            remove_duplicates: true,
        }
    }
}

/// Builder for `StaticContext`: explicit namespace registrations and
/// compile-time options while preserving the implicit bindings.
///
/// The built context is captured by the compiled expression; changing it
/// afterwards has no effect on already compiled expressions.
pub struct StaticContextBuilder<N> {
    ctx: StaticContext<N>,
}

impl<N: XPathNavigator> Default for StaticContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N: XPathNavigator> StaticContextBuilder<N> {
    pub fn new() -> Self {
        Self { ctx: StaticContext::default() }
    }

    pub fn with_default_function_namespace(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_function_namespace = Some(uri.into());
        self
    }

    pub fn with_default_collation(mut self, uri: impl Into<String>) -> Self {
        self.ctx.default_collation = uri.into();
        self
    }

    /// Register a namespace prefix → URI mapping. Attempts to override the
    /// reserved `xml` prefix are ignored.
    pub fn with_namespace(mut self, prefix: impl Into<String>, uri: impl Into<String>) -> Self {
        let p = prefix.into();
        if p == "xml" {
            return self;
        }
        self.ctx.namespaces.by_prefix.insert(p, uri.into());
        self
    }

    /// Declare an external variable that expressions may reference.
    pub fn with_variable(mut self, name: ExpandedName) -> Self {
        if !self.ctx.in_scope_variables.contains(&name) {
            self.ctx.in_scope_variables.push(name);
        }
        self
    }

    pub fn with_functions(mut self, reg: Arc<FunctionRegistry<N>>) -> Self {
        self.ctx.functions = reg;
        self
    }

    pub fn with_document_order(mut self, policy: DocumentOrderPolicy) -> Self {
        self.ctx.document_order = policy;
        self
    }

    pub fn with_duplicate_removal(mut self, enabled: bool) -> Self {
        self.ctx.remove_duplicates = enabled;
        self
    }

    pub fn build(self) -> StaticContext<N> {
        self.ctx
    }
}

/// Per-evaluation inputs: the initial context item and external variable values.
#[derive(Clone)]
pub struct DynamicContext<N> {
    pub context_item: Option<Item<N>>,
    pub variables: HashMap<ExpandedName, Sequence<N>>,
}

impl<N> Default for DynamicContext<N> {
    fn default() -> Self {
        Self { context_item: None, variables: HashMap::new() }
    }
}

pub struct DynamicContextBuilder<N> {
    ctx: DynamicContext<N>,
}

impl<N> Default for DynamicContextBuilder<N> {
    fn default() -> Self {
        Self::new()
    }
}

impl<N> DynamicContextBuilder<N> {
    pub fn new() -> Self {
        Self { ctx: DynamicContext::default() }
    }

    pub fn with_context_item(mut self, item: impl Into<Item<N>>) -> Self {
        self.ctx.context_item = Some(item.into());
        self
    }

    pub fn with_context_node(mut self, node: N) -> Self {
        self.ctx.context_item = Some(Item::Node(node));
        self
    }

    pub fn with_variable(mut self, name: ExpandedName, value: impl Into<Sequence<N>>) -> Self {
        self.ctx.variables.insert(name, value.into());
        self
    }

    pub fn build(self) -> DynamicContext<N> {
        self.ctx
    }
}
