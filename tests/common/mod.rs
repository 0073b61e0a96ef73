#![allow(dead_code)]

use grantflow::application::pipeline::PaymentPipeline;
use grantflow::config::{StepTimeouts, TransferConfig};
use grantflow::domain::ports::ConsentGateRef;
use grantflow::infrastructure::in_memory::{
    AutoConsentGate, InMemoryWalletClient, Operation, RecordedCall,
};
use std::sync::Arc;
use std::time::Duration;

pub const PAYER: &str = "https://wallet.test/alice";
pub const PAYEE: &str = "https://bank.test/bob";
pub const PAYER_AUTH: &str = "https://wallet.test/auth";
pub const PAYEE_AUTH: &str = "https://bank.test/auth";

pub fn network() -> InMemoryWalletClient {
    InMemoryWalletClient::simulated(&[PAYER, PAYEE])
}

/// Short uniform deadlines so timeout scenarios finish quickly.
pub fn config(amount: &str) -> TransferConfig {
    TransferConfig::new(PAYER, PAYEE, amount)
        .unwrap()
        .with_timeouts(StepTimeouts::uniform(Duration::from_millis(500)))
}

pub fn pipeline_with(
    network: &InMemoryWalletClient,
    consent: ConsentGateRef,
    amount: &str,
) -> PaymentPipeline {
    PaymentPipeline::new(Arc::new(network.clone()), consent, config(amount))
}

pub fn auto_pipeline(
    network: &InMemoryWalletClient,
    amount: &str,
) -> (PaymentPipeline, AutoConsentGate) {
    let gate = AutoConsentGate::new();
    (pipeline_with(network, Arc::new(gate.clone()), amount), gate)
}

pub fn operations(calls: &[RecordedCall]) -> Vec<Operation> {
    calls.iter().map(|c| c.operation).collect()
}

pub fn position(calls: &[RecordedCall], operation: Operation) -> Option<usize> {
    calls.iter().position(|c| c.operation == operation)
}
