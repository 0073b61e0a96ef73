use crate::domain::ports::{ConsentGate, InteractionProof};
use crate::error::ConsentError;
use async_trait::async_trait;
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tokio::sync::Mutex;

const ABORT_WORDS: [&str; 5] = ["abort", "cancel", "no", "n", "q"];

/// Consent gate driven by an operator typing into a line-oriented stream.
///
/// The redirect URL is written to `output`; the gate then waits for one line
/// on `input`:
/// - empty: consent completed, no interaction reference;
/// - `abort`, `cancel`, `no`, `n` or `q`: aborted;
/// - a URL carrying an `interact_ref` query parameter: that reference;
/// - anything else: taken as the interaction reference itself.
///
/// End of input counts as an abort.
///
/// One prompt is shown at a time: concurrent runs sharing this gate queue
/// for the streams, and each answer applies to the URL printed just before
/// it. Use [`ChannelConsentGate`](super::consent::ChannelConsentGate) when
/// runs must wait independently.
pub struct LineConsentGate<R, W> {
    io: Mutex<(R, W)>,
}

impl<R, W> LineConsentGate<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    pub fn new(input: R, output: W) -> Self {
        Self {
            io: Mutex::new((input, output)),
        }
    }

    /// Releases the underlying streams.
    pub fn into_inner(self) -> (R, W) {
        self.io.into_inner()
    }
}

/// Interprets one line of operator input.
pub fn parse_response(line: &str) -> Result<InteractionProof, ConsentError> {
    let answer = line.trim();
    if answer.is_empty() {
        return Ok(InteractionProof::default());
    }
    if ABORT_WORDS.contains(&answer.to_ascii_lowercase().as_str()) {
        return Err(ConsentError::Aborted(format!("operator answered '{answer}'")));
    }
    if let Ok(url) = reqwest::Url::parse(answer)
        && let Some((_, reference)) = url.query_pairs().find(|(key, _)| key == "interact_ref")
    {
        return Ok(InteractionProof::with_reference(reference.into_owned()));
    }
    Ok(InteractionProof::with_reference(answer))
}

#[async_trait]
impl<R, W> ConsentGate for LineConsentGate<R, W>
where
    R: AsyncBufRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send,
{
    async fn present_and_await(
        &self,
        redirect_url: &str,
    ) -> Result<InteractionProof, ConsentError> {
        // held until the answer is read so prompt and answer stay paired
        let mut io = self.io.lock().await;
        let (input, output) = &mut *io;

        let prompt = format!(
            "Please navigate to the following URL to accept the grant:\n{redirect_url}\n\
             After accepting, press Enter (or paste the finish URL / interaction reference; \
             type 'abort' to cancel): "
        );
        output.write_all(prompt.as_bytes()).await?;
        output.flush().await?;

        let mut line = String::new();
        let read = input.read_line(&mut line).await?;
        if read == 0 {
            return Err(ConsentError::Aborted("input closed".to_string()));
        }
        parse_response(&line)
    }
}
