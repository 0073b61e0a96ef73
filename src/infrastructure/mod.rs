//! Implementations of the wallet client port.

pub mod http;
pub mod in_memory;
