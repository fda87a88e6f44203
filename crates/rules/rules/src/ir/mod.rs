pub mod expr;
pub mod macros;
pub mod operators;
pub mod optimize;
