//! Shared protocol definitions for the chatlink wire format.

pub mod close;
pub mod codec;
pub mod event;
pub mod frame;
pub mod id;
