//! `chartcache partitions` command implementation.

use chartcache_sw::CacheStorage;
use clap::Args;

use crate::host::Host;

/// Arguments for the partitions command.
#[derive(Args)]
pub(crate) struct PartitionsArgs {}

impl PartitionsArgs {
    /// List stored partitions. The activated version and partitions the next
    /// activation would delete are marked.
    pub(crate) async fn execute(self, host: &mut Host) -> anyhow::Result<()> {
        let names = host.storage.keys().await?;
        let active = host.storage.active_version().await?;
        if names.is_empty() {
            println!("No partitions");
            return Ok(());
        }

        for name in names {
            let entries = host.storage.entry_count(&name).await?;
            let marker = if active.as_deref() == Some(name.as_str()) {
                "  (active)"
            } else if host.config.cache.is_allowed(&name) {
                ""
            } else {
                "  (stale)"
            };
            println!("{name:<24} {entries:>6} entries{marker}");
        }
        Ok(())
    }
}
