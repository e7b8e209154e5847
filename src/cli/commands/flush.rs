//! Flush command - write every cached path

use crate::cache::FlushReport;
use crate::cli::output;
use crate::error::{VaultError, VaultResult};
use crate::Vault;

/// Execute the flush command
pub async fn execute(vault: &Vault) -> VaultResult<()> {
    let report = vault.flush().await;
    print_report(&report);

    if !report.is_clean() {
        return Err(VaultError::User(format!(
            "{} path(s) could not be flushed",
            report.failed.len()
        )));
    }
    Ok(())
}

pub fn print_report(report: &FlushReport) {
    for path in &report.flushed {
        output::step_ok(path);
    }
    for failure in &report.failed {
        output::step_error_detail(&failure.path, &failure.error);
    }
}
