//! Domain types and the ports the dispatch layer depends on.

pub mod delivery;
pub mod envelope;
pub mod order;
pub mod ports;
