//! Application layer: the transfer workflow and the pieces it is built from.
//!
//! [`pipeline::PaymentPipeline`] drives a run step by step. Every network call
//! goes through [`executor::execute`] for its deadline, and grant handling is
//! delegated to [`negotiator::GrantNegotiator`].

pub mod executor;
pub mod negotiator;
pub mod pipeline;
