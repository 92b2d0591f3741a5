pub mod adjust;
pub mod builder;
pub mod decay;
pub mod table;
