//! Shared types for the tabtrail tab history engine.

mod bridge;
mod command;
mod message;
mod tab;

pub use bridge::*;
pub use command::*;
pub use message::*;
pub use tab::*;
