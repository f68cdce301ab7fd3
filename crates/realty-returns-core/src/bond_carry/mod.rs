pub mod carry;

pub use carry::*;
