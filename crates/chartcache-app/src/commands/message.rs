//! `chartcache message` and `chartcache clear-songs` command implementations.

use anyhow::Context;
use chartcache_sw::{ControlMessage, MessageOutcome, ServiceWorkerEvent, WorkerSlot};
use clap::{Args, ValueEnum};
use serde_json::Value;

use crate::host::Host;

/// Worker slot a message is posted to.
#[derive(Clone, Copy, Debug, ValueEnum)]
pub(crate) enum Target {
    Active,
    Waiting,
}

impl From<Target> for WorkerSlot {
    fn from(target: Target) -> Self {
        match target {
            Target::Active => WorkerSlot::Active,
            Target::Waiting => WorkerSlot::Waiting,
        }
    }
}

/// Arguments for the message command.
#[derive(Args)]
pub(crate) struct MessageArgs {
    /// JSON payload, e.g. '{"type":"CLEAR_SONGS_CACHE"}'.
    payload: String,

    /// Worker to deliver to.
    #[arg(long, value_enum, default_value = "active")]
    target: Target,
}

impl MessageArgs {
    pub(crate) async fn execute(self, host: &mut Host) -> anyhow::Result<()> {
        let payload: Value =
            serde_json::from_str(&self.payload).context("payload is not valid JSON")?;
        post(host, self.target.into(), &payload).await
    }
}

/// Arguments for the clear-songs command.
#[derive(Args)]
pub(crate) struct ClearSongsArgs {}

impl ClearSongsArgs {
    /// Shorthand for posting `CLEAR_SONGS_CACHE` to the active worker.
    pub(crate) async fn execute(self, host: &mut Host) -> anyhow::Result<()> {
        post(
            host,
            WorkerSlot::Active,
            &ControlMessage::ClearSongsCache.to_value(),
        )
        .await
    }
}

async fn post(host: &mut Host, slot: WorkerSlot, payload: &Value) -> anyhow::Result<()> {
    host.start().await?;
    let outcome = host.registration.post_message(slot, payload).await?;

    match outcome {
        MessageOutcome::SkipWaitingRequested => println!("Skip-waiting requested"),
        MessageOutcome::Purged { removed } => println!("Removed {removed} songs-list entries"),
        MessageOutcome::Ignored => println!("Message ignored"),
    }
    for event in host.flush_events() {
        if let ServiceWorkerEvent::ControllerChange { client_id, worker_id } = event {
            println!("  {client_id} now controlled by {worker_id}");
        }
    }
    Ok(())
}
