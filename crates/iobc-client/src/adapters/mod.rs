//! Adapters connecting the client to the bus.

pub mod bus;

pub use bus::ReplyConsumer;
