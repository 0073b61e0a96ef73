use super::executor::execute;
use super::negotiator::GrantNegotiator;
use crate::config::TransferConfig;
use crate::domain::failure::{Failure, FailureKind};
use crate::domain::grant::{
    AccessAction, AccessScope, AccessType, FinalizedGrant, Grant, InteractFinish, PendingGrant,
};
use crate::domain::payment::{
    CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment, OutgoingPayment,
    Quote,
};
use crate::domain::ports::{ConsentGateRef, InteractionProof, WalletClientRef};
use crate::domain::wallet::WalletDescriptor;
use crate::error::{ConsentError, TransferError};
use chrono::{SecondsFormat, TimeDelta, Utc};
use serde::Serialize;
use std::fmt;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

/// States of a run, in the only order they can be reached.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
pub enum PipelineStep {
    Init,
    WalletsResolved,
    IncomingGrantObtained,
    IncomingPaymentCreated,
    QuoteGrantObtained,
    QuoteCreated,
    OutgoingGrantPending,
    ConsentCompleted,
    OutgoingGrantFinalized,
    OutgoingPaymentCreated,
}

impl PipelineStep {
    pub const ALL: [PipelineStep; 10] = [
        PipelineStep::Init,
        PipelineStep::WalletsResolved,
        PipelineStep::IncomingGrantObtained,
        PipelineStep::IncomingPaymentCreated,
        PipelineStep::QuoteGrantObtained,
        PipelineStep::QuoteCreated,
        PipelineStep::OutgoingGrantPending,
        PipelineStep::ConsentCompleted,
        PipelineStep::OutgoingGrantFinalized,
        PipelineStep::OutgoingPaymentCreated,
    ];

    pub fn next(self) -> Option<PipelineStep> {
        let index = Self::ALL.iter().position(|s| *s == self)?;
        Self::ALL.get(index + 1).copied()
    }

    pub fn is_terminal(self) -> bool {
        self == PipelineStep::OutgoingPaymentCreated
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum RunState {
    /// Last step reached successfully.
    Reached(PipelineStep),
    /// `step` is the step that was being attempted.
    Failed { step: PipelineStep, failure: Failure },
}

/// Everything one transfer attempt has obtained so far. Never shared between runs.
#[derive(Debug, Clone)]
pub struct PipelineRun {
    pub id: Uuid,
    /// Finish nonce sent with the interactive grant request.
    pub nonce: String,
    pub state: RunState,
    pub history: Vec<PipelineStep>,
    pub payer: Option<WalletDescriptor>,
    pub payee: Option<WalletDescriptor>,
    pub incoming_grant: Option<FinalizedGrant>,
    pub incoming_payment: Option<IncomingPayment>,
    pub quote_grant: Option<FinalizedGrant>,
    pub quote: Option<Quote>,
    /// Scope requested for the outgoing-payment grant.
    pub outgoing_scope: Option<AccessScope>,
    pub pending_grant: Option<PendingGrant>,
    pub interaction: Option<InteractionProof>,
    /// True when the interactive grant was issued without a consent step.
    pub auto_approved: bool,
    pub outgoing_grant: Option<FinalizedGrant>,
    pub outgoing_payment: Option<OutgoingPayment>,
}

impl PipelineRun {
    pub fn new() -> Self {
        Self {
            id: Uuid::new_v4(),
            nonce: Uuid::new_v4().to_string(),
            state: RunState::Reached(PipelineStep::Init),
            history: vec![PipelineStep::Init],
            payer: None,
            payee: None,
            incoming_grant: None,
            incoming_payment: None,
            quote_grant: None,
            quote: None,
            outgoing_scope: None,
            pending_grant: None,
            interaction: None,
            auto_approved: false,
            outgoing_grant: None,
            outgoing_payment: None,
        }
    }

    /// The last step reached successfully.
    pub fn step(&self) -> PipelineStep {
        self.history.last().copied().unwrap_or(PipelineStep::Init)
    }

    pub fn is_complete(&self) -> bool {
        self.state == RunState::Reached(PipelineStep::OutgoingPaymentCreated)
    }

    fn reach(&mut self, step: PipelineStep) {
        debug_assert_eq!(
            self.step().next(),
            Some(step),
            "pipeline steps must be reached in order"
        );
        self.history.push(step);
        self.state = RunState::Reached(step);
        info!(run = %self.id, step = %step, "Step reached");
    }

    fn fail(&mut self, failure: Failure) -> PipelineStep {
        let step = self.step().next().unwrap_or(PipelineStep::OutgoingPaymentCreated);
        self.state = RunState::Failed {
            step,
            failure,
        };
        step
    }
}

impl Default for PipelineRun {
    fn default() -> Self {
        Self::new()
    }
}

/// A run that ended in `Failed`. Resources already created are left on the
/// remote servers to expire.
#[derive(Debug, Error)]
#[error("run {id} failed at {step}: {failure}", id = .run.id)]
pub struct RunFailure {
    pub step: PipelineStep,
    pub failure: Failure,
    pub run: Box<PipelineRun>,
}

impl From<RunFailure> for TransferError {
    fn from(value: RunFailure) -> Self {
        let guidance = value.failure.guidance().map(str::to_string);
        TransferError::RunFailed {
            step: value.step,
            failure: value.failure,
            guidance,
        }
    }
}

/// Drives one payer-to-payee transfer through grant negotiation, quoting,
/// consent and payment creation.
///
/// Steps run strictly one after another; each consumes the previous step's
/// output. Any failure ends the run.
pub struct PaymentPipeline {
    client: WalletClientRef,
    negotiator: GrantNegotiator,
    consent: ConsentGateRef,
    config: TransferConfig,
}

impl PaymentPipeline {
    /// Creates a new `PaymentPipeline`.
    ///
    /// # Arguments
    ///
    /// * `client` - Protocol client; may be shared with other pipelines.
    /// * `consent` - Where the interactive grant's redirect is presented.
    /// * `config` - Wallets, amount and deadlines for every run of this pipeline.
    pub fn new(client: WalletClientRef, consent: ConsentGateRef, config: TransferConfig) -> Self {
        let negotiator = GrantNegotiator::new(client.clone(), config.payer.clone());
        Self {
            client,
            negotiator,
            consent,
            config,
        }
    }

    pub fn config(&self) -> &TransferConfig {
        &self.config
    }

    /// Executes a fresh run. Every call creates new remote resources.
    pub async fn run(&self) -> Result<PipelineRun, RunFailure> {
        let mut run = PipelineRun::new();
        info!(
            run = %run.id,
            payer = %self.config.payer,
            payee = %self.config.payee,
            amount = %self.config.amount,
            "Starting transfer"
        );

        match self.drive(&mut run).await {
            Ok(()) => Ok(run),
            Err(failure) => {
                let step = run.fail(failure.clone());
                warn!(
                    run = %run.id,
                    step = %step,
                    kind = %failure.kind,
                    "Transfer failed: {}",
                    failure
                );
                Err(RunFailure {
                    step,
                    failure,
                    run: Box::new(run),
                })
            }
        }
    }

    async fn drive(&self, run: &mut PipelineRun) -> Result<(), Failure> {
        let timeouts = &self.config.timeouts;

        // 1. wallets
        let payer = execute(
            "payer wallet",
            timeouts.wallet,
            self.client.resolve_wallet(&self.config.payer),
        )
        .await
        .map_err(|f| f.at(&self.config.payer))?;
        let payee = execute(
            "payee wallet",
            timeouts.wallet,
            self.client.resolve_wallet(&self.config.payee),
        )
        .await
        .map_err(|f| f.at(&self.config.payee))?;
        info!(payer = %payer.id, payee = %payee.id, "Resolved wallets");
        run.payer = Some(payer.clone());
        run.payee = Some(payee.clone());
        run.reach(PipelineStep::WalletsResolved);

        // 2. incoming-payment grant on the payee's side
        let incoming_scope = AccessScope::new(
            AccessType::IncomingPayment,
            [
                AccessAction::Read,
                AccessAction::Create,
                AccessAction::Complete,
                AccessAction::List,
                AccessAction::ReadAll,
            ],
        );
        let incoming_grant = self
            .negotiator
            .request_access(
                "incoming payment grant",
                timeouts.incoming_grant,
                &payee.auth_server,
                incoming_scope,
            )
            .await?;
        run.incoming_grant = Some(incoming_grant.clone());
        run.reach(PipelineStep::IncomingGrantObtained);

        // 3. incoming payment
        let expires_at = Utc::now()
            + TimeDelta::seconds(self.config.incoming_payment_ttl.as_secs() as i64);
        let body = CreateIncomingPayment {
            wallet_address: payee.id.clone(),
            incoming_amount: payee.amount(self.config.amount),
            expires_at: expires_at.to_rfc3339_opts(SecondsFormat::Millis, true),
        };
        let incoming_payment = execute(
            "incoming payment",
            timeouts.incoming_payment,
            self.client.create_incoming_payment(
                &payee.resource_server,
                &incoming_grant.access_token,
                &body,
            ),
        )
        .await
        .map_err(|f| f.at(&payee.resource_server))?;
        info!(id = %incoming_payment.id, "Incoming payment created");
        run.incoming_payment = Some(incoming_payment.clone());
        run.reach(PipelineStep::IncomingPaymentCreated);

        // 4. quote grant on the payer's side
        let quote_grant = self
            .negotiator
            .request_access(
                "quote grant",
                timeouts.quote_grant,
                &payer.auth_server,
                AccessScope::new(AccessType::Quote, [AccessAction::Create, AccessAction::Read]),
            )
            .await?;
        run.quote_grant = Some(quote_grant.clone());
        run.reach(PipelineStep::QuoteGrantObtained);

        // 5. quote
        let body = CreateQuote {
            wallet_address: payer.id.clone(),
            receiver: incoming_payment.id.clone(),
            method: self.config.quote_method.clone(),
        };
        let quote = execute(
            "quote",
            timeouts.quote,
            self.client
                .create_quote(&payer.resource_server, &quote_grant.access_token, &body),
        )
        .await
        .map_err(|f| f.at(&payer.resource_server))?;
        if let Err(e) = quote.debit_amount.minor_units() {
            return Err(Failure::new(
                FailureKind::UnknownRemoteError,
                "quote",
                format!("unusable debit amount: {e}"),
            )
            .at(&payer.resource_server));
        }
        if quote.debit_amount.asset_code != payer.asset_code
            || quote.debit_amount.asset_scale != payer.asset_scale
        {
            warn!(
                debit = %quote.debit_amount,
                payer_asset = %payer.asset_code,
                "Quote debit asset differs from the payer wallet asset"
            );
        }
        info!(
            id = %quote.id,
            debit = %quote.debit_amount,
            receive = %quote.receive_amount,
            "Quote created"
        );
        run.quote = Some(quote.clone());
        run.reach(PipelineStep::QuoteCreated);

        // 6. interactive outgoing-payment grant, limited to exactly what the quote debits
        let outgoing_scope = AccessScope::new(
            AccessType::OutgoingPayment,
            [AccessAction::Read, AccessAction::Create, AccessAction::List],
        )
        .with_debit_limit(quote.debit_amount.clone())
        .with_identifier(payer.id.clone());
        run.outgoing_scope = Some(outgoing_scope.clone());
        let finish = InteractFinish::redirect(self.config.finish_uri.clone(), run.nonce.clone());
        let grant = self
            .negotiator
            .request_grant(
                "outgoing payment grant",
                timeouts.outgoing_grant,
                &payer.auth_server,
                outgoing_scope,
                true,
                Some(finish),
            )
            .await?;

        let outgoing_grant = match grant {
            Grant::Pending(pending) => {
                run.pending_grant = Some(pending.clone());
                run.reach(PipelineStep::OutgoingGrantPending);

                // 7. consent
                info!(redirect = %pending.redirect, "Awaiting consent");
                let proof = self
                    .consent
                    .present_and_await(&pending.redirect)
                    .await
                    .map_err(|e| consent_failure(&e).at(&pending.redirect))?;
                run.interaction = Some(proof.clone());
                run.reach(PipelineStep::ConsentCompleted);

                // 8. continuation
                self.negotiator
                    .continue_grant(
                        "grant continuation",
                        timeouts.continuation,
                        &pending,
                        proof.interact_ref.as_deref(),
                    )
                    .await?
            }
            Grant::Finalized(grant) => {
                warn!("Outgoing payment grant was approved without interaction");
                run.auto_approved = true;
                run.reach(PipelineStep::OutgoingGrantPending);
                run.reach(PipelineStep::ConsentCompleted);
                grant
            }
            Grant::Invalid(reason) => {
                return Err(Failure::new(
                    FailureKind::MalformedGrant,
                    "outgoing payment grant",
                    reason,
                )
                .at(&payer.auth_server));
            }
        };
        run.outgoing_grant = Some(outgoing_grant.clone());
        run.reach(PipelineStep::OutgoingGrantFinalized);

        // 9. outgoing payment
        let body = CreateOutgoingPayment {
            wallet_address: payer.id.clone(),
            quote_id: quote.id.clone(),
        };
        let outgoing_payment = execute(
            "outgoing payment",
            timeouts.outgoing_payment,
            self.client.create_outgoing_payment(
                &payer.resource_server,
                &outgoing_grant.access_token,
                &body,
            ),
        )
        .await
        .map_err(|f| f.at(&payer.resource_server))?;
        info!(
            id = %outgoing_payment.id,
            state = outgoing_payment.reported_state(),
            debit = %outgoing_payment.debit_amount,
            "Outgoing payment created"
        );
        run.outgoing_payment = Some(outgoing_payment);
        run.reach(PipelineStep::OutgoingPaymentCreated);

        Ok(())
    }
}

/// Every way out of the consent gate other than confirmation is an abort.
fn consent_failure(error: &ConsentError) -> Failure {
    Failure::new(FailureKind::GrantNotAccepted, "consent", error.to_string())
}
