//! Integration flows between `iobc-client`, `iobc-server` and the bus.

#[cfg(test)]
mod flows;
#[cfg(test)]
mod listeners;
#[cfg(test)]
mod support;
