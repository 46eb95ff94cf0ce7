pub mod normalize;
pub mod timestamp;
