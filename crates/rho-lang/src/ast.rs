pub mod display;
pub mod dispose;
pub mod error;
pub mod node;
pub mod parser;

pub use dispose::TreeHandle;
pub use node::{IndexRange, Node, NodeKind, Operand, RangeEndpoint, StagedResult, StrExpr};
