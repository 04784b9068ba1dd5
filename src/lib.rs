#![no_std]

pub mod board;
pub mod counter;
pub mod device;
mod error;
pub mod hardware;
pub mod pulse_width;

pub use device::{Device, Registry};
pub use error::Error;
