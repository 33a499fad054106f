//! Evaluation core: expression arena, binder, cursors and the evaluator.

pub mod arith;
pub mod atomic;
pub mod axis;
pub mod binder;
pub mod context;
pub mod cursor;
pub mod eval;
pub mod expr;
pub mod filter;
pub mod fused;
pub mod join;
pub mod order;
pub mod pool;
pub mod steps;

pub use axis::{Axis, AxisCursor};
pub use context::{ContextProvider, Focus};
pub use cursor::{BoxCursor, SequenceCursor, Value};
pub use eval::execute;
pub use expr::{ExprId, ExprKind, ExprTree};
pub use node_test::{KindTest, NameTest, NodeTest, NsTest};
pub use order::{DocumentOrderCursor, sort_document_order};
pub use pool::DataPool;
pub use steps::{StepDescriptor, StepKind};
