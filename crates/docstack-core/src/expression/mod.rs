//! Expression compilation: placeholder sessions, partial updates and
//! conditions.

pub mod condition;
pub mod names;
pub mod reserved;
pub mod update;

pub use condition::Condition;
pub use names::NameSession;
pub use update::{FieldUpdate, MutationPlan, Updates, compile, compile_guarded};
