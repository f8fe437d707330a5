//! Common data types used across the data_capture subsystem.

use std::fmt;
use std::ops::Range;

/// One of the two traffic sources observed for the lifetime of the program.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feed {
    /// Traffic exchanged with the community server.
    Community,
    /// Inbound traffic from the game servers.
    Game,
}

impl Feed {
    pub const ALL: [Feed; 2] = [Feed::Community, Feed::Game];

    pub fn name(&self) -> &'static str {
        match self {
            Feed::Community => "community",
            Feed::Game => "game",
        }
    }

    /// The feed whose capture process is torn down when this one fails.
    pub fn sibling(&self) -> Feed {
        match self {
            Feed::Community => Feed::Game,
            Feed::Game => Feed::Community,
        }
    }

    /// Position of the event signature inside a record, in hex characters.
    ///
    /// These are fixed protocol positions, not parsed values.
    pub fn signature_window(&self) -> Range<usize> {
        match self {
            Feed::Community => 12..18,
            Feed::Game => 0..8,
        }
    }
}

impl fmt::Display for Feed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// One captured payload, carried as lowercase hex text.
///
/// Records are produced by [`PacketFramer`](super::PacketFramer) and are never
/// empty; the hex string always has an even length.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketRecord {
    hex: String,
}

impl PacketRecord {
    /// Encodes a raw payload. Returns `None` for an empty payload.
    pub fn from_payload(payload: &[u8]) -> Option<Self> {
        let hex = hex::encode(payload);
        if hex.is_empty() {
            return None;
        }
        Some(Self { hex })
    }

    pub fn as_hex(&self) -> &str {
        &self.hex
    }

    /// Decodes the record back into its payload bytes.
    pub fn to_bytes(&self) -> Vec<u8> {
        // Records are only ever built from hex::encode output.
        hex::decode(&self.hex).unwrap_or_default()
    }

    /// Returns the hex characters at `window`, or `None` if the record is too short.
    pub fn window(&self, window: Range<usize>) -> Option<&str> {
        self.hex.get(window)
    }
}
