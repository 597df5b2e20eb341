//! Channel registry.
//!
//! The dashboard speaks to a small fixed set of named streams. The
//! registry owns one transport channel per name so that application setup
//! can build it once and inject it into consumers; there is no hidden
//! global connection state. Each channel connects and disconnects
//! independently, so a failure on one never affects another.

use crate::channel::{ReconnectPolicy, TransportChannel};

/// The fixed set of named streams.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelName {
    /// Sensor telemetry: frames, points, vitals, device status.
    Telemetry,
    /// Sensor log stream.
    Logs,
    /// Test-run stream.
    Tests,
}

impl ChannelName {
    /// All channel names, in display order.
    pub const ALL: [Self; 3] = [Self::Telemetry, Self::Logs, Self::Tests];

    /// The name segment used in the endpoint path.
    #[must_use]
    pub fn wire_name(self) -> &'static str {
        match self {
            Self::Telemetry => "telemetry",
            Self::Logs => "logs",
            Self::Tests => "tests",
        }
    }

    fn index(self) -> usize {
        match self {
            Self::Telemetry => 0,
            Self::Logs => 1,
            Self::Tests => 2,
        }
    }
}

impl std::fmt::Display for ChannelName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.wire_name())
    }
}

/// Resolve the endpoint URL for a named channel.
///
/// The scheme follows the configured transport security; it is never
/// hardcoded.
#[must_use]
pub fn endpoint_url(host: &str, secure: bool, name: ChannelName) -> String {
    let scheme = if secure { "wss" } else { "ws" };
    format!("{scheme}://{host}/ws/{}", name.wire_name())
}

/// The set of transport channels owned by one dashboard session.
#[derive(Debug)]
pub struct ChannelRegistry {
    channels: [TransportChannel; ChannelName::ALL.len()],
}

impl ChannelRegistry {
    /// Build a registry with one idle channel per name.
    #[must_use]
    pub fn new(host: &str, secure: bool, policy: &ReconnectPolicy) -> Self {
        let channels = ChannelName::ALL.map(|name| {
            let url = endpoint_url(host, secure, name);
            TransportChannel::new(name.wire_name(), url, policy.clone())
        });
        Self { channels }
    }

    /// The channel registered under a name.
    #[must_use]
    pub fn channel(&self, name: ChannelName) -> &TransportChannel {
        &self.channels[name.index()]
    }

    /// Start the connection driver for one channel.
    pub fn connect(&self, name: ChannelName) {
        self.channel(name).connect();
    }

    /// Terminate one channel.
    pub fn disconnect(&self, name: ChannelName) {
        self.channel(name).disconnect();
    }

    /// Start every channel.
    pub fn connect_all(&self) {
        for channel in &self.channels {
            channel.connect();
        }
    }

    /// Terminate every channel.
    pub fn disconnect_all(&self) {
        for channel in &self.channels {
            channel.disconnect();
        }
    }

    /// Number of registered channels.
    #[must_use]
    pub fn len(&self) -> usize {
        self.channels.len()
    }

    /// Whether the registry is empty. Always false for a built registry.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.channels.is_empty()
    }

    /// Iterate over the registered channels in display order.
    pub fn iter(&self) -> impl Iterator<Item = (ChannelName, &TransportChannel)> {
        ChannelName::ALL.into_iter().zip(self.channels.iter())
    }
}
