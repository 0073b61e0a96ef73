use super::executor::{execute, execute_raw};
use crate::domain::failure::{Failure, FailureKind};
use crate::domain::grant::{
    AccessScope, ContinueRequest, FinalizedGrant, Grant, GrantRequest, InteractFinish,
    InteractRequest, PendingGrant,
};
use crate::domain::ports::WalletClientRef;
use std::time::Duration;

/// Requests and continues grants on behalf of one client wallet.
pub struct GrantNegotiator {
    client: WalletClientRef,
    client_wallet: String,
}

impl GrantNegotiator {
    /// # Arguments
    ///
    /// * `client` - The protocol client used for every call.
    /// * `client_wallet` - Wallet address identifying this client to authorization servers.
    pub fn new(client: WalletClientRef, client_wallet: impl Into<String>) -> Self {
        Self {
            client,
            client_wallet: client_wallet.into(),
        }
    }

    /// Requests a grant for `scope`.
    ///
    /// Non-interactive requests must come back finalized; a pending answer is
    /// `UnexpectedInteractionRequired`. Interactive requests may come back
    /// pending or finalized (auto-approval). An invalid shape is always
    /// `MalformedGrant`, so the returned grant is never `Grant::Invalid`.
    pub async fn request_grant(
        &self,
        label: &str,
        deadline: Duration,
        auth_server: &str,
        scope: AccessScope,
        interactive: bool,
        finish: Option<InteractFinish>,
    ) -> Result<Grant, Failure> {
        let interact = interactive.then(|| InteractRequest::redirect(finish));
        let body = GrantRequest::new(self.client_wallet.clone(), scope, interact);

        let grant = execute(label, deadline, self.client.request_grant(auth_server, &body))
            .await
            .map_err(|f| f.at(auth_server))?;
        tracing::debug!(operation = label, shape = grant.kind(), "Grant response received");

        match grant {
            Grant::Invalid(reason) => {
                Err(Failure::new(FailureKind::MalformedGrant, label, reason).at(auth_server))
            }
            Grant::Pending(_) if !interactive => Err(Failure::new(
                FailureKind::UnexpectedInteractionRequired,
                label,
                "authorization server asked for interaction on a non-interactive grant",
            )
            .at(auth_server)),
            grant => Ok(grant),
        }
    }

    /// Requests a non-interactive grant and returns its token.
    pub async fn request_access(
        &self,
        label: &str,
        deadline: Duration,
        auth_server: &str,
        scope: AccessScope,
    ) -> Result<FinalizedGrant, Failure> {
        match self
            .request_grant(label, deadline, auth_server, scope, false, None)
            .await?
        {
            Grant::Finalized(grant) => Ok(grant),
            other => Err(Failure::new(
                FailureKind::MalformedGrant,
                label,
                format!("expected a finalized grant, got {}", other.kind()),
            )
            .at(auth_server)),
        }
    }

    /// Continues a pending grant after consent.
    ///
    /// A grant that is still pending, or an explicit denial from the server,
    /// is `GrantNotAccepted`. Any other non-finalized answer is
    /// `GrantFinalizationFailed`.
    pub async fn continue_grant(
        &self,
        label: &str,
        deadline: Duration,
        pending: &PendingGrant,
        interact_ref: Option<&str>,
    ) -> Result<FinalizedGrant, Failure> {
        let uri = pending.continuation.uri.as_str();
        let body = ContinueRequest {
            interact_ref: interact_ref.map(str::to_string),
        };

        let response = execute_raw(
            label,
            deadline,
            self.client
                .continue_grant(uri, &pending.continuation.access_token, &body),
        )
        .await
        .map_err(|f| f.at(uri))?;

        match response {
            Ok(Grant::Finalized(grant)) => Ok(grant),
            Ok(Grant::Pending(_)) => Err(Failure::new(
                FailureKind::GrantNotAccepted,
                label,
                "grant is still pending; consent has not been given",
            )
            .at(uri)),
            Ok(Grant::Invalid(reason)) => {
                Err(Failure::new(FailureKind::GrantFinalizationFailed, label, reason).at(uri))
            }
            Err(error) => Err(Failure::classify_continuation(label, &error).at(uri)),
        }
    }
}
