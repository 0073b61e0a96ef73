//! Domain layer: protocol value types and the ports the application drives.

pub mod amount;
pub mod failure;
pub mod grant;
pub mod payment;
pub mod ports;
pub mod wallet;
