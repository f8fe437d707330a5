use std::fmt;

/// Event kinds recognised in captured traffic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    /// A video link posted in a tribe house (community server).
    PlayVidTribehouse,
    /// A video queued in the music room (game server).
    PlayVidMusicroom,
}

impl EventKind {
    pub const ALL: [EventKind; 2] = [EventKind::PlayVidTribehouse, EventKind::PlayVidMusicroom];

    /// Name under which handlers are registered for this event.
    pub fn name(&self) -> &'static str {
        match self {
            EventKind::PlayVidTribehouse => "play_vid_tribehouse",
            EventKind::PlayVidMusicroom => "play_vid_musicroom",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Fixed byte prefix identifying an [`EventKind`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Signature {
    bytes: &'static [u8],
    kind: EventKind,
}

impl Signature {
    pub const fn new(bytes: &'static [u8], kind: EventKind) -> Self {
        Self { bytes, kind }
    }

    pub fn bytes(&self) -> &'static [u8] {
        self.bytes
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}

impl fmt::Display for Signature {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{}", hex::encode(self.bytes))
    }
}

/// Every signature the decoder knows about.
pub const SIGNATURES: &[Signature] = &[
    // community
    Signature::new(&[0x1a, 0x0c, 0x01], EventKind::PlayVidTribehouse),
    // game
    Signature::new(&[0x05, 0x48], EventKind::PlayVidMusicroom),
];

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn signatures_are_unique_and_non_empty() {
        for (i, a) in SIGNATURES.iter().enumerate() {
            assert!((2..=3).contains(&a.len()));
            for b in &SIGNATURES[i + 1..] {
                assert_ne!(a.bytes(), b.bytes());
                assert_ne!(a.kind(), b.kind());
            }
        }
    }

    #[test]
    fn signature_prints_as_hex() {
        assert_eq!(SIGNATURES[0].to_string(), "0x1a0c01");
        assert_eq!(SIGNATURES[1].to_string(), "0x0548");
    }

    #[test]
    fn every_kind_has_a_signature() {
        for kind in EventKind::ALL {
            assert!(SIGNATURES.iter().any(|s| s.kind() == kind), "{}", kind);
        }
    }
}
