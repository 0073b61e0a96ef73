use crate::domain::amount::Amount;
use crate::domain::grant::{
    AccessScope, AccessTokenResponse, AccessType, ContinueRequest, ContinueResponse, Grant,
    GrantRequest, GrantResponse, InteractResponse, TokenValue,
};
use crate::domain::payment::{
    CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment, OutgoingPayment,
    Quote,
};
use crate::domain::ports::{ConsentGate, InteractionProof, WalletClient};
use crate::domain::wallet::WalletDescriptor;
use crate::error::{ClientError, ConsentError};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use uuid::Uuid;

pub const SIMULATED_ASSET_CODE: &str = "USD";
pub const SIMULATED_ASSET_SCALE: u8 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operation {
    ResolveWallet,
    RequestGrant,
    ContinueGrant,
    CreateIncomingPayment,
    CreateQuote,
    CreateOutgoingPayment,
}

/// Where an injected fault or delay applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FaultPoint {
    Operation(Operation),
    /// Grant requests for one access type only.
    Grant(AccessType),
}

/// How the simulated authorization server treats interactive grants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum InteractionPolicy {
    /// Continuation succeeds.
    #[default]
    Approve,
    /// Continuation is refused with `request_denied`.
    Deny,
    /// Continuation answers with the grant still pending.
    LeavePending,
    /// Grant and continuation responses carry neither a token nor an interaction.
    Malformed,
    /// Interactive grants are issued immediately without interaction.
    AutoFinalize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCall {
    pub operation: Operation,
    pub target: String,
    pub access_type: Option<AccessType>,
}

#[derive(Debug, Clone)]
struct IssuedToken {
    access_type: AccessType,
    debit_limit: Option<Amount>,
}

#[derive(Debug, Clone)]
struct PendingInteraction {
    continue_token: String,
    redirect: String,
    finish: String,
    scope: AccessScope,
}

#[derive(Debug, Default)]
struct Network {
    wallets: HashMap<String, WalletDescriptor>,
    tokens: HashMap<String, IssuedToken>,
    pending: HashMap<String, PendingInteraction>,
    incoming_payments: Vec<IncomingPayment>,
    quotes: Vec<Quote>,
    outgoing_payments: Vec<OutgoingPayment>,
    calls: Vec<RecordedCall>,
    faults: HashMap<FaultPoint, ClientError>,
    delays: HashMap<FaultPoint, Duration>,
    policy: InteractionPolicy,
    quote_fee: u128,
    require_interact_ref: bool,
}

impl Network {
    fn is_auth_server(&self, url: &str) -> bool {
        self.wallets.values().any(|w| w.auth_server == url)
    }

    fn issue(&mut self, auth_server: &str, scope: &AccessScope) -> GrantResponse {
        let value = Uuid::new_v4().to_string();
        self.tokens.insert(
            value.clone(),
            IssuedToken {
                access_type: scope.access_type,
                debit_limit: scope.debit_limit().cloned(),
            },
        );
        GrantResponse {
            access_token: Some(AccessTokenResponse {
                manage: Some(format!("{auth_server}/token/{value}")),
                value,
                expires_in: Some(600),
                access: vec![scope.clone()],
            }),
            continuation: Some(ContinueResponse {
                access_token: Some(TokenValue {
                    value: Uuid::new_v4().to_string(),
                }),
                uri: Some(format!("{auth_server}/continue/{}", Uuid::new_v4())),
                wait: None,
            }),
            interact: None,
        }
    }

    fn authorize(&self, token: &str, access_type: AccessType) -> Result<&IssuedToken, ClientError> {
        let issued = self
            .tokens
            .get(token)
            .ok_or_else(|| {
                ClientError::status_with_code(401, "invalid_token", "unknown access token")
            })?;
        if issued.access_type != access_type {
            return Err(ClientError::status_with_code(
                403,
                "insufficient_grant",
                "token does not cover this resource",
            ));
        }
        Ok(issued)
    }

    fn wallet_at(
        &self,
        resource_server: &str,
        wallet_address: &str,
    ) -> Result<&WalletDescriptor, ClientError> {
        self.wallets
            .get(wallet_address)
            .filter(|w| w.resource_server == resource_server)
            .ok_or_else(|| {
                ClientError::status(
                    404,
                    format!("no wallet {wallet_address} at {resource_server}"),
                )
            })
    }
}

fn pending_response(uri: &str, interaction: &PendingInteraction) -> GrantResponse {
    GrantResponse {
        access_token: None,
        continuation: Some(ContinueResponse {
            access_token: Some(TokenValue {
                value: interaction.continue_token.clone(),
            }),
            uri: Some(uri.to_string()),
            wait: Some(5),
        }),
        interact: Some(InteractResponse {
            redirect: Some(interaction.redirect.clone()),
            finish: Some(interaction.finish.clone()),
        }),
    }
}

/// A simulated wallet network held in memory.
///
/// Behaves like a set of wallets with their authorization and resource
/// servers: tokens are scoped to their grant's access type, outgoing payments
/// must stay within the grant's debit limit, and every created resource gets
/// a fresh identifier. Faults, delays and the interaction policy can be
/// injected to exercise failure paths.
///
/// Clones share the same network.
#[derive(Default, Clone)]
pub struct InMemoryWalletClient {
    network: Arc<RwLock<Network>>,
}

impl InMemoryWalletClient {
    /// Creates an empty network with no wallets.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a network hosting a USD wallet at each of `wallet_urls`.
    ///
    /// Each wallet's authorization server is `<origin>/auth` and its resource
    /// server is `<origin>`.
    pub fn simulated(wallet_urls: &[&str]) -> Self {
        let wallets = wallet_urls
            .iter()
            .map(|url| (url.to_string(), simulated_wallet(url)))
            .collect();
        Self {
            network: Arc::new(RwLock::new(Network {
                wallets,
                ..Network::default()
            })),
        }
    }

    pub async fn add_wallet(&self, wallet: WalletDescriptor) {
        let mut network = self.network.write().await;
        network.wallets.insert(wallet.id.clone(), wallet);
    }

    pub async fn fail_at(&self, point: FaultPoint, error: ClientError) {
        self.network.write().await.faults.insert(point, error);
    }

    pub async fn delay_at(&self, point: FaultPoint, delay: Duration) {
        self.network.write().await.delays.insert(point, delay);
    }

    pub async fn set_interaction_policy(&self, policy: InteractionPolicy) {
        self.network.write().await.policy = policy;
    }

    /// Extra minor units the payer is debited on top of what the payee receives.
    pub async fn set_quote_fee(&self, fee: u128) {
        self.network.write().await.quote_fee = fee;
    }

    /// Makes continuation fail with `invalid_request` unless an interaction reference is sent.
    pub async fn require_interact_ref(&self, required: bool) {
        self.network.write().await.require_interact_ref = required;
    }

    pub async fn calls(&self) -> Vec<RecordedCall> {
        self.network.read().await.calls.clone()
    }

    pub async fn incoming_payments(&self) -> Vec<IncomingPayment> {
        self.network.read().await.incoming_payments.clone()
    }

    pub async fn quotes(&self) -> Vec<Quote> {
        self.network.read().await.quotes.clone()
    }

    pub async fn outgoing_payments(&self) -> Vec<OutgoingPayment> {
        self.network.read().await.outgoing_payments.clone()
    }

    /// Records the call, then applies any delay and fault configured for it.
    /// The lock is released before sleeping.
    async fn enter(
        &self,
        operation: Operation,
        target: &str,
        access_type: Option<AccessType>,
    ) -> Result<(), ClientError> {
        let (delay, fault) = {
            let mut network = self.network.write().await;
            network.calls.push(RecordedCall {
                operation,
                target: target.to_string(),
                access_type,
            });
            let points: Vec<FaultPoint> = [
                access_type.map(FaultPoint::Grant),
                Some(FaultPoint::Operation(operation)),
            ]
            .into_iter()
            .flatten()
            .collect();
            let delay = points.iter().find_map(|p| network.delays.get(p).copied());
            let fault = points.iter().find_map(|p| network.faults.get(p).cloned());
            (delay, fault)
        };

        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        match fault {
            Some(error) => Err(error),
            None => Ok(()),
        }
    }
}

fn simulated_wallet(url: &str) -> WalletDescriptor {
    let parsed = reqwest::Url::parse(url).ok();
    let origin = parsed
        .as_ref()
        .map(|u| u.origin().ascii_serialization())
        .unwrap_or_else(|| url.trim_end_matches('/').to_string());
    let name = parsed
        .as_ref()
        .and_then(|u| u.path_segments())
        .and_then(|mut segments| segments.next_back().map(str::to_string))
        .filter(|s| !s.is_empty());

    WalletDescriptor {
        id: url.to_string(),
        public_name: name,
        asset_code: SIMULATED_ASSET_CODE.to_string(),
        asset_scale: SIMULATED_ASSET_SCALE,
        auth_server: format!("{origin}/auth"),
        resource_server: origin,
    }
}

#[async_trait]
impl WalletClient for InMemoryWalletClient {
    async fn resolve_wallet(&self, url: &str) -> Result<WalletDescriptor, ClientError> {
        self.enter(Operation::ResolveWallet, url, None).await?;
        let network = self.network.read().await;
        network
            .wallets
            .get(url)
            .cloned()
            .ok_or_else(|| ClientError::status(404, format!("wallet address {url} not found")))
    }

    async fn request_grant(
        &self,
        auth_server: &str,
        body: &GrantRequest,
    ) -> Result<Grant, ClientError> {
        let scope = body.scope().cloned();
        self.enter(
            Operation::RequestGrant,
            auth_server,
            scope.as_ref().map(|s| s.access_type),
        )
        .await?;

        let mut network = self.network.write().await;
        if !network.is_auth_server(auth_server) {
            return Err(ClientError::status(
                404,
                format!("no authorization server at {auth_server}"),
            ));
        }
        let scope = scope.ok_or_else(|| {
            ClientError::status_with_code(400, "invalid_request", "no access requested")
        })?;

        let response = match (scope.access_type, network.policy) {
            (_, InteractionPolicy::Malformed) => GrantResponse::default(),
            (AccessType::OutgoingPayment, InteractionPolicy::AutoFinalize)
            | (AccessType::IncomingPayment | AccessType::Quote, _) => {
                network.issue(auth_server, &scope)
            }
            (AccessType::OutgoingPayment, _) => {
                let id = Uuid::new_v4();
                let uri = format!("{auth_server}/continue/{id}");
                let interaction = PendingInteraction {
                    continue_token: Uuid::new_v4().to_string(),
                    redirect: format!("{auth_server}/interact/{id}"),
                    finish: Uuid::new_v4().to_string(),
                    scope,
                };
                let response = pending_response(&uri, &interaction);
                network.pending.insert(uri, interaction);
                response
            }
        };
        Ok(Grant::classify(response))
    }

    async fn continue_grant(
        &self,
        continuation_uri: &str,
        access_token: &str,
        body: &ContinueRequest,
    ) -> Result<Grant, ClientError> {
        self.enter(Operation::ContinueGrant, continuation_uri, None).await?;

        let mut network = self.network.write().await;
        let interaction = network
            .pending
            .get(continuation_uri)
            .cloned()
            .ok_or_else(|| {
                ClientError::status(404, format!("no grant to continue at {continuation_uri}"))
            })?;
        if interaction.continue_token != access_token {
            return Err(ClientError::status_with_code(
                401,
                "invalid_continuation",
                "continuation token does not match",
            ));
        }
        if network.require_interact_ref && body.interact_ref.is_none() {
            return Err(ClientError::status_with_code(
                400,
                "invalid_request",
                "interact_ref is required",
            ));
        }

        let response = match network.policy {
            InteractionPolicy::Approve | InteractionPolicy::AutoFinalize => {
                network.pending.remove(continuation_uri);
                let auth_server = continuation_uri
                    .split("/continue/")
                    .next()
                    .unwrap_or(continuation_uri)
                    .to_string();
                network.issue(&auth_server, &interaction.scope)
            }
            InteractionPolicy::Deny => {
                network.pending.remove(continuation_uri);
                return Err(ClientError::status_with_code(
                    401,
                    "request_denied",
                    "grant request was denied",
                ));
            }
            InteractionPolicy::LeavePending => pending_response(continuation_uri, &interaction),
            InteractionPolicy::Malformed => GrantResponse::default(),
        };
        Ok(Grant::classify(response))
    }

    async fn create_incoming_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, ClientError> {
        self.enter(Operation::CreateIncomingPayment, resource_server, None).await?;

        let mut network = self.network.write().await;
        network.authorize(access_token, AccessType::IncomingPayment)?;
        let wallet = network.wallet_at(resource_server, &body.wallet_address)?;
        if !body.incoming_amount.same_asset(&wallet.amount(0)) {
            return Err(ClientError::status_with_code(
                400,
                "invalid_request",
                "incoming amount asset does not match the wallet",
            ));
        }

        let payment = IncomingPayment {
            id: format!("{resource_server}/incoming-payments/{}", Uuid::new_v4()),
            wallet_address: body.wallet_address.clone(),
            incoming_amount: Some(body.incoming_amount.clone()),
            received_amount: Some(wallet.amount(0)),
            completed: false,
            expires_at: Some(body.expires_at.clone()),
        };
        network.incoming_payments.push(payment.clone());
        Ok(payment)
    }

    async fn create_quote(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateQuote,
    ) -> Result<Quote, ClientError> {
        self.enter(Operation::CreateQuote, resource_server, None).await?;

        let mut network = self.network.write().await;
        network.authorize(access_token, AccessType::Quote)?;
        let payer = network.wallet_at(resource_server, &body.wallet_address)?.clone();
        let receive_amount = network
            .incoming_payments
            .iter()
            .find(|p| p.id == body.receiver)
            .ok_or_else(|| {
                ClientError::status(404, format!("receiver {} not found", body.receiver))
            })?
            .incoming_amount
            .clone()
            .ok_or_else(|| {
                ClientError::status_with_code(
                    400,
                    "invalid_receiver",
                    "receiver has no incoming amount",
                )
            })?;
        let receive_units = receive_amount
            .minor_units()
            .map_err(|e| ClientError::status_with_code(400, "invalid_receiver", e.to_string()))?;

        let quote = Quote {
            id: format!("{resource_server}/quotes/{}", Uuid::new_v4()),
            wallet_address: payer.id.clone(),
            receiver: body.receiver.clone(),
            debit_amount: payer.amount(receive_units + network.quote_fee),
            receive_amount,
            method: Some(body.method.clone()),
            expires_at: None,
        };
        network.quotes.push(quote.clone());
        Ok(quote)
    }

    async fn create_outgoing_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, ClientError> {
        self.enter(Operation::CreateOutgoingPayment, resource_server, None).await?;

        let mut network = self.network.write().await;
        let limit = network
            .authorize(access_token, AccessType::OutgoingPayment)?
            .debit_limit
            .clone();
        network.wallet_at(resource_server, &body.wallet_address)?;
        let quote = network
            .quotes
            .iter()
            .find(|q| q.id == body.quote_id && q.wallet_address == body.wallet_address)
            .cloned()
            .ok_or_else(|| ClientError::status(404, format!("quote {} not found", body.quote_id)))?;

        if let Some(limit) = limit {
            let within = match (quote.debit_amount.minor_units(), limit.minor_units()) {
                (Ok(debit), Ok(max)) => quote.debit_amount.same_asset(&limit) && debit <= max,
                _ => false,
            };
            if !within {
                return Err(ClientError::status_with_code(
                    403,
                    "insufficient_grant",
                    format!("debit {} exceeds grant limit {}", quote.debit_amount, limit),
                ));
            }
        }

        let payment = OutgoingPayment {
            id: format!("{resource_server}/outgoing-payments/{}", Uuid::new_v4()),
            wallet_address: body.wallet_address.clone(),
            quote_id: Some(quote.id.clone()),
            debit_amount: quote.debit_amount.clone(),
            receive_amount: quote.receive_amount.clone(),
            sent_amount: None,
            state: None,
            failed: false,
        };
        network.outgoing_payments.push(payment.clone());
        Ok(payment)
    }
}

/// Confirms consent immediately, optionally with a fixed interaction reference.
#[derive(Default, Clone)]
pub struct AutoConsentGate {
    interact_ref: Option<String>,
    presented: Arc<RwLock<Vec<String>>>,
}

impl AutoConsentGate {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reference(interact_ref: impl Into<String>) -> Self {
        Self {
            interact_ref: Some(interact_ref.into()),
            ..Self::default()
        }
    }

    /// Redirect URLs presented so far.
    pub async fn presented(&self) -> Vec<String> {
        self.presented.read().await.clone()
    }
}

#[async_trait]
impl ConsentGate for AutoConsentGate {
    async fn present_and_await(
        &self,
        redirect_url: &str,
    ) -> Result<InteractionProof, ConsentError> {
        self.presented.write().await.push(redirect_url.to_string());
        Ok(InteractionProof {
            interact_ref: self.interact_ref.clone(),
        })
    }
}
