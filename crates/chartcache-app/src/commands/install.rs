//! `chartcache install` command implementation.

use chartcache_sw::ServiceWorkerEvent;
use clap::Args;

use crate::host::Host;

/// Arguments for the install command.
#[derive(Args)]
pub(crate) struct InstallArgs {}

impl InstallArgs {
    /// Precache the manifest and activate the configured version.
    pub(crate) async fn execute(self, host: &mut Host) -> anyhow::Result<()> {
        let worker = host.install().await?;
        let precached = host.storage.entry_count(worker.version()).await?;

        for event in host.flush_events() {
            if let ServiceWorkerEvent::StateChange {
                version, new_state, ..
            } = event
            {
                println!("  {version}: {new_state}");
            }
        }
        println!(
            "Installed {} with {} precached entries",
            worker.version(),
            precached
        );
        Ok(())
    }
}
