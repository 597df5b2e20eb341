//! CLI command definitions.
//!
//! This module defines the structure of all CLI subcommands.

use std::path::PathBuf;

use clap::{Args, Subcommand, ValueEnum};

use crate::registry::ChannelName;

/// Monitor command arguments.
#[derive(Debug, Args)]
pub struct MonitorCommand {
    /// Channels to attach (defaults to all)
    #[arg(short = 'n', long = "channel", value_enum)]
    pub channels: Vec<ChannelArg>,

    /// History window in seconds for the vitals view
    #[arg(short, long)]
    pub window: Option<u64>,

    /// Stop after this many seconds (runs until interrupted by default)
    #[arg(short, long)]
    pub duration: Option<u64>,
}

impl MonitorCommand {
    /// The channels to attach, defaulting to all of them.
    #[must_use]
    pub fn selected_channels(&self) -> Vec<ChannelName> {
        if self.channels.is_empty() {
            ChannelName::ALL.to_vec()
        } else {
            let mut names: Vec<ChannelName> =
                self.channels.iter().copied().map(ChannelName::from).collect();
            names.dedup();
            names
        }
    }
}

/// Status command arguments.
#[derive(Debug, Args)]
pub struct StatusCommand {
    /// Output as JSON
    #[arg(short, long)]
    pub json: bool,
}

/// Configuration commands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    /// Show current configuration
    Show {
        /// Output as JSON
        #[arg(short, long)]
        json: bool,
    },

    /// Show the configuration file path
    Path,

    /// Validate configuration
    Validate {
        /// Path to configuration file to validate
        #[arg(short, long)]
        file: Option<PathBuf>,
    },
}

/// Channel argument for selecting streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ChannelArg {
    /// Sensor telemetry stream
    Telemetry,
    /// Sensor log stream
    Logs,
    /// Test-run stream
    Tests,
}

impl From<ChannelArg> for ChannelName {
    fn from(arg: ChannelArg) -> Self {
        match arg {
            ChannelArg::Telemetry => Self::Telemetry,
            ChannelArg::Logs => Self::Logs,
            ChannelArg::Tests => Self::Tests,
        }
    }
}
