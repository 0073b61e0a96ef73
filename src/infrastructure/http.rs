use crate::domain::grant::{ContinueRequest, Grant, GrantRequest, GrantResponse};
use crate::domain::payment::{
    CreateIncomingPayment, CreateOutgoingPayment, CreateQuote, IncomingPayment, OutgoingPayment,
    Quote,
};
use crate::domain::ports::WalletClient;
use crate::domain::wallet::WalletDescriptor;
use crate::error::ClientError;
use async_trait::async_trait;
use reqwest::header::{ACCEPT, AUTHORIZATION};
use reqwest::{Client, Method, Request, Response};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Adds authentication to an outgoing request before it is sent.
///
/// HTTP message signatures for the payer's key live behind this hook; the
/// client itself never sees key material.
pub trait RequestSigner: Send + Sync {
    fn sign(&self, request: &mut Request) -> Result<(), ClientError>;
}

/// Sends requests as they are. Servers that require signatures will answer 401.
#[derive(Debug, Default, Clone, Copy)]
pub struct UnsignedRequests;

impl RequestSigner for UnsignedRequests {
    fn sign(&self, _request: &mut Request) -> Result<(), ClientError> {
        Ok(())
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(error: reqwest::Error) -> Self {
        if error.is_timeout() {
            ClientError::Timeout
        } else if let Some(status) = error.status() {
            ClientError::status(status.as_u16(), error.to_string())
        } else if error.is_decode() {
            ClientError::Protocol(error.to_string())
        } else {
            ClientError::Transport(error.to_string())
        }
    }
}

#[derive(serde::Deserialize)]
struct ErrorBody {
    error: ErrorDetail,
}

/// GNAP sends `error` either as a bare code or as an object.
#[derive(serde::Deserialize)]
#[serde(untagged)]
enum ErrorDetail {
    Code(String),
    Object {
        #[serde(default)]
        code: Option<String>,
        #[serde(default)]
        description: Option<String>,
    },
}

impl ErrorDetail {
    fn into_parts(self) -> (Option<String>, Option<String>) {
        match self {
            ErrorDetail::Code(code) => (Some(code), None),
            ErrorDetail::Object { code, description } => (code, description),
        }
    }
}

/// Open Payments client over HTTP.
///
/// Grant requests are POSTed to the authorization server URL itself, and
/// resources to `<resource server>/incoming-payments`, `/quotes` and
/// `/outgoing-payments`. Resource and continuation calls carry the grant
/// token as `Authorization: GNAP <token>`.
#[derive(Clone)]
pub struct HttpWalletClient {
    client: Client,
    signer: Arc<dyn RequestSigner>,
}

impl HttpWalletClient {
    pub fn new(signer: Arc<dyn RequestSigner>) -> Self {
        Self::with_client(Client::new(), signer)
    }

    /// Uses a caller-configured reqwest client (proxies, TLS, pooling).
    pub fn with_client(client: Client, signer: Arc<dyn RequestSigner>) -> Self {
        Self { client, signer }
    }

    /// Sends a HEAD request to `url` and returns the status it answered with.
    pub async fn probe(&self, url: &str, deadline: Duration) -> Result<u16, ClientError> {
        let response = self
            .client
            .head(url)
            .timeout(deadline)
            .send()
            .await?;
        Ok(response.status().as_u16())
    }

    async fn send<B, T>(
        &self,
        method: Method,
        url: &str,
        token: Option<&str>,
        body: Option<&B>,
    ) -> Result<T, ClientError>
    where
        B: Serialize + ?Sized,
        T: DeserializeOwned,
    {
        let mut builder = self
            .client
            .request(method.clone(), url)
            .header(ACCEPT, "application/json");
        if let Some(token) = token {
            builder = builder.header(AUTHORIZATION, format!("GNAP {token}"));
        }
        if let Some(body) = body {
            builder = builder.json(body);
        }
        let mut request = builder.build()?;
        self.signer.sign(&mut request)?;

        tracing::debug!(%method, url, "Sending request");
        let response = self.client.execute(request).await?;
        Self::handle_response(response).await
    }

    async fn handle_response<T: DeserializeOwned>(response: Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            let bytes = response.bytes().await?;
            return serde_json::from_slice(&bytes).map_err(|e| ClientError::Protocol(e.to_string()));
        }

        let text = response.text().await.unwrap_or_default();
        match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => {
                let (code, description) = body.error.into_parts();
                Err(ClientError::Status {
                    status: status.as_u16(),
                    message: description.unwrap_or_else(|| status.to_string()),
                    code,
                })
            }
            Err(_) => Err(ClientError::status(
                status.as_u16(),
                if text.is_empty() { status.to_string() } else { text },
            )),
        }
    }

    fn resource_url(resource_server: &str, collection: &str) -> String {
        format!("{}/{}", resource_server.trim_end_matches('/'), collection)
    }
}

#[async_trait]
impl WalletClient for HttpWalletClient {
    async fn resolve_wallet(&self, url: &str) -> Result<WalletDescriptor, ClientError> {
        self.send::<(), _>(Method::GET, url, None, None).await
    }

    async fn request_grant(
        &self,
        auth_server: &str,
        body: &GrantRequest,
    ) -> Result<Grant, ClientError> {
        let response: GrantResponse = self
            .send(Method::POST, auth_server, None, Some(body))
            .await?;
        Ok(Grant::classify(response))
    }

    async fn continue_grant(
        &self,
        continuation_uri: &str,
        access_token: &str,
        body: &ContinueRequest,
    ) -> Result<Grant, ClientError> {
        let response: GrantResponse = self
            .send(Method::POST, continuation_uri, Some(access_token), Some(body))
            .await?;
        Ok(Grant::classify(response))
    }

    async fn create_incoming_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateIncomingPayment,
    ) -> Result<IncomingPayment, ClientError> {
        let url = Self::resource_url(resource_server, "incoming-payments");
        self.send(Method::POST, &url, Some(access_token), Some(body)).await
    }

    async fn create_quote(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateQuote,
    ) -> Result<Quote, ClientError> {
        let url = Self::resource_url(resource_server, "quotes");
        self.send(Method::POST, &url, Some(access_token), Some(body)).await
    }

    async fn create_outgoing_payment(
        &self,
        resource_server: &str,
        access_token: &str,
        body: &CreateOutgoingPayment,
    ) -> Result<OutgoingPayment, ClientError> {
        let url = Self::resource_url(resource_server, "outgoing-payments");
        self.send(Method::POST, &url, Some(access_token), Some(body)).await
    }
}
