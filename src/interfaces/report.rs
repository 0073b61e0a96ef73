use crate::application::pipeline::PipelineRun;
use crate::domain::amount::Amount;
use crate::error::Result;
use serde::Serialize;
use std::io::Write;

/// Summary of a completed run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RunReport {
    pub run_id: String,
    pub payer: Option<String>,
    pub payee: Option<String>,
    pub incoming_payment: Option<String>,
    pub quote: Option<String>,
    pub debit_amount: Option<Amount>,
    pub receive_amount: Option<Amount>,
    pub outgoing_payment: Option<String>,
    pub state: Option<String>,
    pub auto_approved: bool,
}

impl From<&PipelineRun> for RunReport {
    fn from(run: &PipelineRun) -> Self {
        Self {
            run_id: run.id.to_string(),
            payer: run.payer.as_ref().map(|w| w.id.clone()),
            payee: run.payee.as_ref().map(|w| w.id.clone()),
            incoming_payment: run.incoming_payment.as_ref().map(|p| p.id.clone()),
            quote: run.quote.as_ref().map(|q| q.id.clone()),
            debit_amount: run.quote.as_ref().map(|q| q.debit_amount.clone()),
            receive_amount: run.quote.as_ref().map(|q| q.receive_amount.clone()),
            outgoing_payment: run.outgoing_payment.as_ref().map(|p| p.id.clone()),
            state: run
                .outgoing_payment
                .as_ref()
                .map(|p| p.reported_state().to_string()),
            auto_approved: run.auto_approved,
        }
    }
}

/// Writes run reports in either human-readable or JSON form.
pub struct ReportWriter<W: Write> {
    writer: W,
    json: bool,
}

impl<W: Write> ReportWriter<W> {
    pub fn new(writer: W, json: bool) -> Self {
        Self { writer, json }
    }

    pub fn write_report(&mut self, report: &RunReport) -> Result<()> {
        if self.json {
            serde_json::to_writer_pretty(&mut self.writer, report)?;
            writeln!(self.writer)?;
            return Ok(());
        }

        writeln!(self.writer, "Transfer completed (run {})", report.run_id)?;
        let or_dash = |value: &Option<String>| value.as_deref().unwrap_or("-").to_string();
        writeln!(self.writer, "  Outgoing payment: {}", or_dash(&report.outgoing_payment))?;
        writeln!(self.writer, "  State:            {}", or_dash(&report.state))?;
        if let Some(debit) = &report.debit_amount {
            writeln!(self.writer, "  Debit amount:     {} {}", debit.value, debit.asset_code)?;
        }
        if let Some(receive) = &report.receive_amount {
            writeln!(self.writer, "  Receive amount:   {} {}", receive.value, receive.asset_code)?;
        }
        writeln!(self.writer, "  Incoming payment: {}", or_dash(&report.incoming_payment))?;
        writeln!(self.writer, "  Quote:            {}", or_dash(&report.quote))?;
        if report.auto_approved {
            writeln!(self.writer, "  (outgoing payment grant was approved without interaction)")?;
        }
        self.writer.flush()?;
        Ok(())
    }
}
