//! Set command - store a JSON value and flush it

use crate::cli::args::SetArgs;
use crate::cli::output;
use crate::error::{VaultError, VaultResult};
use crate::Vault;
use serde_json::Value;

/// Execute the set command
pub async fn execute(args: SetArgs, vault: &Vault) -> VaultResult<()> {
    let value = parse_value(&args.value)?;
    let receipt = vault.cache().set_and_flush(&args.path, value).await?;

    let mut detail = format!("fingerprint {}", receipt.fingerprint);
    if receipt.conflicts > 0 {
        detail.push_str(&format!(", {} conflict(s) resolved", receipt.conflicts));
    }
    output::step_ok_detail(&format!("Saved {}", args.path), &detail);
    Ok(())
}

fn parse_value(raw: &str) -> VaultResult<Value> {
    serde_json::from_str(raw)
        .map_err(|e| VaultError::User(format!("Value is not valid JSON: {}", e)))
}
