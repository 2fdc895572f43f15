pub mod composite;
pub mod input;
pub mod model;

pub use composite::RgbaBuffer;
pub use model::{Intent, Sketch, Stroke};
