pub mod action;
pub mod sample;
pub mod sink;

pub use action::*;
pub use sample::*;
pub use sink::*;
