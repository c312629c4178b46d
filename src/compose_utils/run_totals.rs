use crate::utils::time_delta_to_str;
use std::time::Duration;

/// Result of one composed transaction.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TxReport {
    pub tx_id: String,
    pub fee: u64,
    pub inputs: usize,
    /// Not counting the change output.
    pub outputs: usize,
    pub submitted: bool,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunTotals {
    pub transactions: u64,
    pub fees: u64,
    pub inputs: u64,
    pub outputs: u64,
}

impl RunTotals {
    pub fn record(&mut self, report: &TxReport) {
        self.transactions += 1;
        self.fees += report.fee;
        self.inputs += report.inputs as u64;
        self.outputs += report.outputs as u64;
    }

    pub fn summary_lines(&self, live: bool, elapsed: Duration) -> Vec<String> {
        let (done, fees) = if live {
            ("submitted", "submitted")
        } else {
            ("prepared", "estimated")
        };
        vec![
            format!("{:<36}{}", format!("Total transactions {done}:"), self.transactions),
            format!("{:<36}{}", format!("Total fees {fees} (lovelace):"), self.fees),
            format!("{:<36}{}", format!("Total inputs {done}:"), self.inputs),
            format!(
                "{:<36}{:<15} (not including change_addr)",
                format!("Total outputs {done}:"),
                self.outputs
            ),
            format!(
                "{:<36}{:<16}(hh:mm:ss)",
                "Elapsed runtime:",
                time_delta_to_str(elapsed, false)
            ),
        ]
    }

    pub fn log_summary(&self, title: &str, live: bool, elapsed: Duration) {
        tracing::info!("{}", title);
        for line in self.summary_lines(live, elapsed) {
            tracing::info!("{}", line);
        }
    }
}
