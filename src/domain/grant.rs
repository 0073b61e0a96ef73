//! Access scopes, grant request/response wire shapes, and the [`Grant`]
//! tagged union the rest of the crate works with.
//!
//! Authorization servers answer a grant request with a loosely shaped JSON
//! object. [`Grant::classify`] is the single place that decides whether such a
//! response is finalized, pending interaction, or unusable.

use super::amount::Amount;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessType {
    IncomingPayment,
    Quote,
    OutgoingPayment,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AccessAction {
    Read,
    Create,
    List,
    Complete,
    ReadAll,
    ListAll,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Limits {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debit_amount: Option<Amount>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub receive_amount: Option<Amount>,
}

/// Exactly what a grant authorizes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessScope {
    #[serde(rename = "type")]
    pub access_type: AccessType,
    pub actions: BTreeSet<AccessAction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub limits: Option<Limits>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,
}

impl AccessScope {
    pub fn new(access_type: AccessType, actions: impl IntoIterator<Item = AccessAction>) -> Self {
        Self {
            access_type,
            actions: actions.into_iter().collect(),
            limits: None,
            identifier: None,
        }
    }

    pub fn with_debit_limit(mut self, debit_amount: Amount) -> Self {
        self.limits = Some(Limits {
            debit_amount: Some(debit_amount),
            receive_amount: None,
        });
        self
    }

    pub fn with_identifier(mut self, identifier: impl Into<String>) -> Self {
        self.identifier = Some(identifier.into());
        self
    }

    pub fn debit_limit(&self) -> Option<&Amount> {
        self.limits.as_ref().and_then(|l| l.debit_amount.as_ref())
    }
}

/// Where the authorization server sends the user once consent is given.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractFinish {
    pub method: String,
    pub uri: String,
    pub nonce: String,
}

impl InteractFinish {
    pub fn redirect(uri: impl Into<String>, nonce: impl Into<String>) -> Self {
        Self {
            method: "redirect".to_string(),
            uri: uri.into(),
            nonce: nonce.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractRequest {
    pub start: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<InteractFinish>,
}

impl InteractRequest {
    pub fn redirect(finish: Option<InteractFinish>) -> Self {
        Self {
            start: vec!["redirect".to_string()],
            finish,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenRequest {
    pub access: Vec<AccessScope>,
}

/// Body POSTed to an authorization server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantRequest {
    pub access_token: AccessTokenRequest,
    pub client: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractRequest>,
}

impl GrantRequest {
    pub fn new(
        client: impl Into<String>,
        scope: AccessScope,
        interact: Option<InteractRequest>,
    ) -> Self {
        Self {
            access_token: AccessTokenRequest {
                access: vec![scope],
            },
            client: client.into(),
            interact,
        }
    }

    pub fn scope(&self) -> Option<&AccessScope> {
        self.access_token.access.first()
    }
}

/// Body POSTed to a grant's continuation URI.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueRequest {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact_ref: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenValue {
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AccessTokenResponse {
    pub value: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub manage: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expires_in: Option<u64>,
    #[serde(default)]
    pub access: Vec<AccessScope>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContinueResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<TokenValue>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub uri: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct InteractResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redirect: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub finish: Option<String>,
}

/// Raw grant response as returned by an authorization server.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GrantResponse {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub access_token: Option<AccessTokenResponse>,
    #[serde(rename = "continue", default, skip_serializing_if = "Option::is_none")]
    pub continuation: Option<ContinueResponse>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub interact: Option<InteractResponse>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Continuation {
    pub uri: String,
    pub access_token: String,
    /// Seconds the server asks the client to wait before continuing.
    pub wait: Option<u64>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FinalizedGrant {
    pub access_token: String,
    pub manage_uri: Option<String>,
    pub continuation: Option<Continuation>,
    pub access: Vec<AccessScope>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingGrant {
    pub continuation: Continuation,
    pub redirect: String,
    /// Server-side nonce used to verify the finish redirect hash.
    pub finish_nonce: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Grant {
    Finalized(FinalizedGrant),
    Pending(PendingGrant),
    /// The response could not be used; carries the reason.
    Invalid(String),
}

impl Grant {
    /// Finalized iff a usable token and no interaction block; Pending iff a
    /// continuation (URI and token) and an interaction redirect; otherwise
    /// Invalid.
    pub fn classify(response: GrantResponse) -> Grant {
        let GrantResponse {
            access_token,
            continuation,
            interact,
        } = response;

        let continuation = continuation.and_then(|c| match (c.uri, c.access_token) {
            (Some(uri), Some(token)) if !uri.is_empty() && !token.value.is_empty() => {
                Some(Continuation {
                    uri,
                    access_token: token.value,
                    wait: c.wait,
                })
            }
            _ => None,
        });

        match (access_token, interact) {
            (Some(token), None) if !token.value.is_empty() => Grant::Finalized(FinalizedGrant {
                access_token: token.value,
                manage_uri: token.manage,
                continuation,
                access: token.access,
            }),
            (_, Some(interact)) => match (continuation, interact.redirect) {
                (Some(continuation), Some(redirect)) if !redirect.is_empty() => {
                    Grant::Pending(PendingGrant {
                        continuation,
                        redirect,
                        finish_nonce: interact.finish,
                    })
                }
                (None, _) => Grant::Invalid(
                    "interaction requested without a usable continuation".to_string(),
                ),
                (_, _) => Grant::Invalid("interaction block without a redirect".to_string()),
            },
            (Some(_), None) => Grant::Invalid("empty access token".to_string()),
            (None, None) => {
                Grant::Invalid("neither an access token nor an interaction block".to_string())
            }
        }
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Grant::Finalized(_) => "finalized",
            Grant::Pending(_) => "pending",
            Grant::Invalid(_) => "invalid",
        }
    }
}

impl From<GrantResponse> for Grant {
    fn from(response: GrantResponse) -> Self {
        Grant::classify(response)
    }
}
