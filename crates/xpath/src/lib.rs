pub mod ast;
pub mod compiler;
pub mod consts;
pub mod engine;
pub mod functions;
pub mod model;
pub mod runtime;
pub mod simple_node;
pub mod xdm;

pub use compiler::{CompiledExpr, compile};
pub use engine::{BoxCursor, ContextProvider, DataPool, Focus, SequenceCursor, Value};
pub use functions::{CallCtx, FunctionEntry, FunctionRegistry};
pub use model::{NodeKind, NodeOrder, QName, XPathNavigator};
pub use runtime::{
    DocumentOrderPolicy, DynamicContext, DynamicContextBuilder, Error, ErrorCode, StaticContext, StaticContextBuilder,
};
pub use simple_node::{SimpleDocument, SimpleNavigator, SimpleNodeBuilder};
pub use xdm::{AtomicValue, ExpandedName, Item, Sequence, XPathResultType};
