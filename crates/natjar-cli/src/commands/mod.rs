pub mod compile;
pub mod probe;
