//! `status` command: read a status file written by a headless run

use chrono::Utc;
use clap::Args;
use std::path::PathBuf;

use super::CliError;
use crate::status::{load_snapshot, Liveness, DEFAULT_STATUS_FILE};

/// Arguments of the `status` command
#[derive(Args, Debug, Clone)]
pub struct StatusArgs {
    /// Status file to read
    #[arg(long, env = "STATUS_FILE", default_value = DEFAULT_STATUS_FILE)]
    pub status_file: PathBuf,

    /// Print the raw snapshot as JSON
    #[arg(long, default_value_t = false)]
    pub json: bool,
}

impl StatusArgs {
    /// Execute the command; returns the text that was printed
    pub fn execute(&self) -> Result<String, CliError> {
        let output = self.render()?;
        println!("{output}");
        Ok(output)
    }

    fn render(&self) -> Result<String, CliError> {
        let Some(snapshot) = load_snapshot(&self.status_file)? else {
            return Ok(format!(
                "No status file at {} (no headless run has started)",
                self.status_file.display()
            ));
        };

        if self.json {
            return serde_json::to_string_pretty(&snapshot)
                .map_err(|e| CliError::InvalidArgument(format!("cannot encode snapshot: {e}")));
        }

        let liveness = snapshot.liveness(Utc::now());
        let state = match liveness {
            Liveness::Stale => format!(
                "{} (stale: no update since {})",
                snapshot.status,
                snapshot.timestamp.to_rfc3339()
            ),
            _ => format!("{} ({liveness})", snapshot.status),
        };

        Ok(format!("{} {}", snapshot.summary_line(), state))
    }
}
