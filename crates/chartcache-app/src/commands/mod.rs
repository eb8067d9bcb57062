//! Subcommand implementations.

mod fetch;
mod install;
mod message;
mod partitions;

pub(crate) use fetch::FetchArgs;
pub(crate) use install::InstallArgs;
pub(crate) use message::{ClearSongsArgs, MessageArgs};
pub(crate) use partitions::PartitionsArgs;
