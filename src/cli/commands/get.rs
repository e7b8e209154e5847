//! Get command - print the value at a path

use crate::cache::decode_content;
use crate::cli::args::GetArgs;
use crate::error::{VaultError, VaultResult};
use crate::Vault;

/// Execute the get command.
///
/// Uncached paths are read straight from the remote and never created.
pub async fn execute(args: GetArgs, vault: &Vault) -> VaultResult<()> {
    let cache = vault.cache();
    let value = match cache.get(&args.path).await {
        Some(value) => value,
        None => {
            let object = cache
                .client()
                .read(&args.path)
                .await?
                .ok_or_else(|| VaultError::User(format!("Nothing stored at {}", args.path)))?;
            decode_content(&args.path, &object.content)?
        }
    };
    println!("{}", serde_json::to_string_pretty(&value)?);
    Ok(())
}
