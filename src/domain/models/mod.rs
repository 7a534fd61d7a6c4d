pub mod sequence;
pub mod types;
