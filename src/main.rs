use clap::Parser;
use grantflow::application::pipeline::PaymentPipeline;
use grantflow::config::{DEFAULT_FINISH_URI, KeyReference, StepTimeouts, TransferConfig};
use grantflow::domain::failure::FailureKind;
use grantflow::domain::ports::{ConsentGateRef, WalletClientRef};
use grantflow::error::TransferError;
use grantflow::infrastructure::http::{HttpWalletClient, UnsignedRequests};
use grantflow::infrastructure::in_memory::InMemoryWalletClient;
use grantflow::interfaces::console::LineConsentGate;
use grantflow::interfaces::report::{ReportWriter, RunReport};
use miette::Result;
use std::io;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::io::BufReader;
use tracing::{info, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Wallet address that pays (also identifies this client)
    #[arg(long, env = "GRANTFLOW_PAYER")]
    payer: String,

    /// Wallet address that receives
    #[arg(long, env = "GRANTFLOW_PAYEE")]
    payee: String,

    /// Amount the payee receives, in minor units of the payee's asset
    #[arg(long, env = "GRANTFLOW_AMOUNT")]
    amount: String,

    /// Id of the key registered for the payer wallet
    #[arg(long, env = "GRANTFLOW_KEY_ID")]
    key_id: Option<String>,

    /// Path to the payer wallet's private key
    #[arg(long, env = "GRANTFLOW_PRIVATE_KEY")]
    private_key: Option<PathBuf>,

    /// Where the authorization server redirects after consent
    #[arg(long, env = "GRANTFLOW_FINISH_URI", default_value = DEFAULT_FINISH_URI)]
    finish_uri: String,

    /// Deadline in seconds applied to every network step, replacing the defaults
    #[arg(long)]
    step_timeout: Option<u64>,

    /// Lifetime of the created incoming payment in seconds (at most 600)
    #[arg(long, default_value_t = 600)]
    incoming_expiry: u64,

    /// Print the final report as JSON
    #[arg(long)]
    json: bool,

    /// Run against an in-memory simulated wallet network instead of HTTP
    #[arg(long)]
    simulate: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| "grantflow=info".into()))
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    let cli = Cli::parse();

    let mut config = TransferConfig::new(cli.payer.as_str(), cli.payee.as_str(), &cli.amount)?
        .with_finish_uri(cli.finish_uri)
        .with_incoming_payment_ttl(Duration::from_secs(cli.incoming_expiry));
    if let Some(secs) = cli.step_timeout {
        config = config.with_timeouts(StepTimeouts::uniform(Duration::from_secs(secs)));
    }

    let (client, http): (WalletClientRef, Option<HttpWalletClient>) = if cli.simulate {
        info!("Using the simulated wallet network");
        let network = InMemoryWalletClient::simulated(&[cli.payer.as_str(), cli.payee.as_str()]);
        (Arc::new(network), None)
    } else {
        let key = match (cli.key_id, cli.private_key) {
            (Some(key_id), Some(private_key)) => KeyReference {
                key_id,
                private_key,
            },
            _ => {
                return Err(TransferError::Config(
                    "--key-id and --private-key are required unless --simulate is set".to_string(),
                )
                .into());
            }
        };
        key.validate()?;
        info!(key_id = %key.key_id, "Using payer key");
        warn!("No request signer is installed; requests are sent unsigned");
        let http = HttpWalletClient::new(Arc::new(UnsignedRequests));
        (Arc::new(http.clone()), Some(http))
    };

    // keep stdout clean for the JSON report
    let consent: ConsentGateRef = if cli.json {
        Arc::new(LineConsentGate::new(BufReader::new(tokio::io::stdin()), tokio::io::stderr()))
    } else {
        Arc::new(LineConsentGate::new(BufReader::new(tokio::io::stdin()), tokio::io::stdout()))
    };

    let pipeline = PaymentPipeline::new(client, consent, config);
    match pipeline.run().await {
        Ok(run) => {
            let stdout = io::stdout();
            let mut writer = ReportWriter::new(stdout.lock(), cli.json);
            writer.write_report(&RunReport::from(&run))?;
            Ok(())
        }
        Err(failure) => {
            if let Some(http) = &http
                && matches!(
                    failure.failure.kind,
                    FailureKind::Timeout | FailureKind::TransportError
                )
                && let Some(endpoint) = failure.failure.endpoint.as_deref()
            {
                info!(endpoint, "Testing direct connection to the failing endpoint");
                match http.probe(endpoint, PROBE_TIMEOUT).await {
                    Ok(status) => info!(endpoint, status, "Endpoint answered"),
                    Err(e) => warn!(endpoint, error = %e, "Cannot connect to endpoint"),
                }
            }
            Err(TransferError::from(failure).into())
        }
    }
}
