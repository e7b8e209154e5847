//! Backup command - snapshot every cached path

use crate::cli::output;
use crate::error::{VaultError, VaultResult};
use crate::Vault;

/// Execute the backup command
pub async fn execute(vault: &Vault) -> VaultResult<()> {
    let report = vault.create_backup().await?;

    output::intro(&format!("Backup {}", report.timestamp));
    for path in &report.written {
        output::step_ok(path);
    }
    for failure in &report.failed {
        output::step_error_detail(&failure.path, &failure.error);
    }

    if !report.failed.is_empty() {
        return Err(VaultError::User(format!(
            "{} path(s) were not backed up",
            report.failed.len()
        )));
    }
    Ok(())
}
