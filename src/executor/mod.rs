pub mod child;
pub mod cold;
pub mod kind;
pub mod warm;

pub use child::{ChildProcess, LaunchSpec, LogSinks};
pub use cold::ColdExecutor;
pub use kind::{resolve, slot_index, ModelKind, MODEL_KINDS};
pub use warm::WarmExecutor;
