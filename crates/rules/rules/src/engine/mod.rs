pub mod activation;
pub mod context;
pub mod dispatch;
pub mod eval;
pub mod program;
pub mod stdlib;
pub mod value;

pub use activation::{Activation, MapActivation};
pub use context::EvalContext;
pub use dispatch::{Dispatcher, Implementation};
pub use program::Program;
pub use value::Value;
