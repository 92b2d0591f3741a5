pub mod base_image;
pub mod engine;
pub mod mapping;
pub mod transforms;
