use super::grant::{ContinueRequest, Grant, GrantRequest};
use super::payment::{
    CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment, OutgoingPayment,
    Quote,
};
use super::wallet::WalletDescriptor;
use crate::error::{ClientError, ConsentError};
use async_trait::async_trait;
use std::sync::Arc;

/// The wallet/payment protocol client. Request signing and wire encoding are
/// the implementation's concern; callers see only these operations.
///
/// Implementations are shared between concurrent runs and must be safe for
/// concurrent use.
#[async_trait]
pub trait WalletClient: Send + Sync {
    async fn resolve_wallet(&self, url: &str) -> Result<WalletDescriptor, ClientError>;

    async fn request_grant(
        &self,
        auth_server: &str,
        body: &GrantRequest,
    ) -> Result<Grant, ClientError>;

    async fn continue_grant(
        &self,
        continuation_uri: &str,
        access_token: &str,
        body: &ContinueRequest,
    ) -> Result<Grant, ClientError>;

    async fn create_incoming_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, ClientError>;

    async fn create_quote(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateQuote,
    ) -> Result<Quote, ClientError>;

    async fn create_outgoing_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, ClientError>;
}

pub type WalletClientRef = Arc<dyn WalletClient>;

/// Evidence that the out-of-band consent step was completed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct InteractionProof {
    /// `interact_ref` from the finish redirect, if the flow surfaced one.
    pub interact_ref: Option<String>,
}

impl InteractionProof {
    pub fn with_reference(interact_ref: impl Into<String>) -> Self {
        Self {
            interact_ref: Some(interact_ref.into()),
        }
    }
}

/// Suspension point for the human consent step.
///
/// `present_and_await` hands the redirect URL to whoever can complete consent
/// and resolves once they report back. There is no deadline; an abort is
/// reported as [`ConsentError::Aborted`].
#[async_trait]
pub trait ConsentGate: Send + Sync {
    async fn present_and_await(&self, redirect_url: &str) -> Result<InteractionProof, ConsentError>;
}

pub type ConsentGateRef = Arc<dyn ConsentGate>;
