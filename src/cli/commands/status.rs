//! Status command - cache and data statistics

use crate::cli::output;
use crate::config::{Backend, Config};
use crate::error::VaultResult;
use crate::Vault;

/// Execute the status command
pub async fn execute(vault: &Vault, config: &Config) -> VaultResult<()> {
    let stats = vault.stats().await;

    output::intro("gitvault Status");

    output::section("Remote:");
    match config.remote.backend {
        Backend::Github => output::step_ok_detail(
            "GitHub",
            &format!(
                "{}/{}@{}",
                config.remote.owner.as_deref().unwrap_or("?"),
                config.remote.repo.as_deref().unwrap_or("?"),
                config.remote.branch
            ),
        ),
        Backend::Memory => output::step_warn("In-memory store, nothing is persisted"),
    }

    output::section("Cache:");
    output::key_value("Files", stats.total_files);
    if stats.dirty_files == 0 {
        output::step_ok("All changes saved");
    } else {
        output::step_warn(&format!("{} file(s) waiting to be flushed", stats.dirty_files));
    }

    output::section("Collections:");
    if stats.collections.is_empty() {
        output::key_value("(none)", "");
    }
    for (name, size) in &stats.collections {
        output::key_value(name, size);
    }

    output::section("Data:");
    output::key_value("Sessions", stats.sessions_count);
    output::key_value(
        "Memories",
        format!(
            "{} in {} categories",
            stats.total_memories, stats.memory_categories
        ),
    );
    output::key_value("Users", stats.users_count);

    Ok(())
}
