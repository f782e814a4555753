pub mod heading;
pub mod position;

pub use heading::HeadingFuser;
pub use position::{AccuracyGate, PositionFilter};
