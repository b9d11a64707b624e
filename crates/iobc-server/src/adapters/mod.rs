//! Adapters connecting the server to the bus.

pub mod bus;

pub use bus::RequestConsumer;
