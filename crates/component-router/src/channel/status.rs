use std::fmt;

/// Lifecycle of a channel.
///
/// `None → Connecting → Connected → Disconnecting → Disconnected`, with
/// `Failed` reachable from `Connecting`/`Connected` on transport errors. A
/// channel is single-use once it reaches `Disconnected` or `Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ChannelStatus {
    None,
    Connecting,
    Connected,
    Disconnecting,
    Disconnected,
    Failed,
}

impl ChannelStatus {
    /// Sends are accepted only while connecting or connected.
    pub fn accepts_sends(self) -> bool {
        matches!(self, Self::Connecting | Self::Connected)
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Disconnected | Self::Failed)
    }
}

impl fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::None => "none",
            Self::Connecting => "connecting",
            Self::Connected => "connected",
            Self::Disconnecting => "disconnecting",
            Self::Disconnected => "disconnected",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}
