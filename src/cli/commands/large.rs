//! Large command - chunked object storage

use crate::cli::args::{LargeAction, LargeArgs};
use crate::cli::output;
use crate::error::{VaultError, VaultResult};
use crate::large::LargeLayout;
use crate::Vault;
use serde::de::IgnoredAny;
use tokio::fs;

/// Execute the large command
pub async fn execute(args: LargeArgs, vault: &Vault) -> VaultResult<()> {
    let store = vault.large();

    match args.action {
        LargeAction::Put { name, file } => {
            let payload = fs::read(&file)
                .await
                .map_err(|e| VaultError::io(format!("reading {}", file.display()), e))?;
            serde_json::from_slice::<IgnoredAny>(&payload).map_err(|e| {
                VaultError::User(format!("{} is not valid JSON: {}", file.display(), e))
            })?;

            match store.encode_bytes(&name, &payload).await? {
                LargeLayout::Single => {
                    output::step_ok_detail(&format!("Stored {}", name), "single object")
                }
                LargeLayout::Chunked { chunks } => output::step_ok_detail(
                    &format!("Stored {}", name),
                    &format!("{} chunks", chunks),
                ),
            }
        }
        LargeAction::Get { name, output: target } => {
            let payload = store
                .decode_bytes(&name)
                .await?
                .ok_or_else(|| VaultError::User(format!("No large object named {}", name)))?;

            match target {
                Some(path) => {
                    fs::write(&path, &payload)
                        .await
                        .map_err(|e| VaultError::io(format!("writing {}", path.display()), e))?;
                    output::step_ok_detail(
                        &format!("Wrote {}", path.display()),
                        &format!("{} bytes", payload.len()),
                    );
                }
                None => println!("{}", String::from_utf8_lossy(&payload)),
            }
        }
        LargeAction::Rm { name } => {
            if store.remove(&name).await? {
                output::step_ok(&format!("Removed {}", name));
            } else {
                output::step_warn(&format!("No large object named {}", name));
            }
        }
    }

    Ok(())
}
