pub mod controller;
pub mod test;

pub use controller::{ControllerEvent, ControllerState, RunProgress, TestController};
pub use test::{TestInstance, TestState, ABORTED_MESSAGE};
