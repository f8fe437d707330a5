//! Field extraction for packets carrying a known signature.
//!
//! Decoding never fails outright: a payload that does not fit the expected
//! layout yields an empty [`DecodedEvent`], and the musicroom layout may yield
//! a partial one when only its trailing nickname is unreadable.

use std::fmt;
use std::ops::Range;

use log::{debug, error};

use crate::data_capture::types::PacketRecord;

use super::signature::{EventKind, SIGNATURES};

/// First link byte of a tribehouse event (`b'h'` of `https://`).
const TRIBEHOUSE_SENTINEL: u8 = 104;
/// Length of a full `https://www.youtube.com/watch?v=<id>` link.
const TRIBEHOUSE_LINK_LEN: usize = 43;
/// Field marker opening a musicroom event; it doubles as the link length.
const MUSICROOM_LINK_MARKER: [u8; 2] = [0x00, 0x0b];

/// Ordered string fields extracted from one packet.
///
/// Empty means the signature matched but the payload did not conform.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DecodedEvent {
    fields: Vec<String>,
}

impl DecodedEvent {
    pub fn new(fields: Vec<String>) -> Self {
        Self { fields }
    }

    pub fn empty() -> Self {
        Self::default()
    }

    pub fn fields(&self) -> &[String] {
        &self.fields
    }

    pub fn get(&self, index: usize) -> Option<&str> {
        self.fields.get(index).map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }
}

/// A signature found inside a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SignatureMatch {
    pub kind: EventKind,
    /// Byte offset just past the signature.
    pub end: usize,
}

/// Signature-indexed decoder. Stateless: decoding the same record twice gives
/// the same result.
#[derive(Debug, Default, Clone, Copy)]
pub struct SignatureDecoder;

impl SignatureDecoder {
    pub fn new() -> Self {
        Self
    }

    /// Looks for a known signature at the start of `window` (hex character range).
    pub fn locate(&self, record: &PacketRecord, window: Range<usize>) -> Option<SignatureMatch> {
        if window.start % 2 != 0 {
            return None;
        }
        let located = hex::decode(record.window(window.clone())?).ok()?;
        SIGNATURES
            .iter()
            .find(|signature| located.starts_with(signature.bytes()))
            .map(|signature| SignatureMatch {
                kind: signature.kind(),
                end: window.start / 2 + signature.len(),
            })
    }

    /// Extracts the fields for `matched` from `record`.
    pub fn decode(&self, record: &PacketRecord, matched: &SignatureMatch) -> DecodedEvent {
        let bytes = record.to_bytes();
        match matched.kind {
            EventKind::PlayVidTribehouse => decode_tribehouse(&bytes, matched.end),
            EventKind::PlayVidMusicroom => decode_musicroom(&bytes, matched.end),
        }
    }
}

impl fmt::Display for SignatureDecoder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for signature in SIGNATURES {
            writeln!(f, "{}, {}", signature, signature.kind())?;
        }
        Ok(())
    }
}

/// Tribehouse layout: a fixed-length ASCII link right after the signature.
///
/// All or nothing: anything unexpected gives an empty event.
pub fn decode_tribehouse(bytes: &[u8], start: usize) -> DecodedEvent {
    match bytes.get(start) {
        Some(&TRIBEHOUSE_SENTINEL) => {}
        Some(_) => return DecodedEvent::empty(),
        None => {
            debug!("{} ended right after the tribehouse signature", hex::encode(bytes));
            return DecodedEvent::empty();
        }
    }

    let Some(raw) = bytes.get(start..start + TRIBEHOUSE_LINK_LEN) else {
        debug!(
            "{} is too short for a tribehouse link ({} bytes after offset {})",
            hex::encode(bytes),
            bytes.len() - start,
            start
        );
        return DecodedEvent::empty();
    };
    match ascii(raw, "link") {
        Ok(link) => DecodedEvent::new(vec![link.trim().to_string()]),
        Err(e) => {
            debug!("{} line failed with: {}", hex::encode(bytes), e);
            DecodedEvent::empty()
        }
    }
}

/// Musicroom layout: marker/link length, link, name length, name, two shorts
/// where the second is the nickname length, nickname.
///
/// Link and name are required. The nickname is optional: when it cannot be
/// located the `(link, name)` pair is returned.
pub fn decode_musicroom(bytes: &[u8], start: usize) -> DecodedEvent {
    if bytes.get(start..start + 2) != Some(&MUSICROOM_LINK_MARKER[..]) {
        return DecodedEvent::empty();
    }
    match musicroom_fields(bytes, start) {
        Ok(fields) => DecodedEvent::new(fields),
        Err(e @ FieldError::NotAscii(_)) => {
            debug!("{} line failed with: {}", hex::encode(bytes), e);
            DecodedEvent::empty()
        }
        Err(e) => {
            error!("{} line failed with: {}", hex::encode(bytes), e);
            DecodedEvent::empty()
        }
    }
}

fn musicroom_fields(bytes: &[u8], start: usize) -> Result<Vec<String>, FieldError> {
    let link_len = read_u16(bytes, start, "link length")? as usize;
    let link_start = start + 2;
    let link = ascii(read_field(bytes, link_start, link_len, "link")?, "link")?;

    let name_len_at = link_start + link_len;
    let name_len = read_u16(bytes, name_len_at, "name length")? as usize;
    let name_start = name_len_at + 2;
    let name = utf8(read_field(bytes, name_start, name_len, "name")?, "name")?;

    let name_end = name_start + name_len;
    let nick_raw = read_u16(bytes, name_end + 2, "nickname length")
        .and_then(|len| read_field(bytes, name_end + 4, len as usize, "nickname"));
    let nick = match nick_raw {
        Ok(raw) => ascii(raw, "nickname")?,
        Err(e) => {
            debug!("Musicroom event without nickname: {}", e);
            return Ok(vec![link, name]);
        }
    };

    debug!("Data in musicroom: {} {} {}", link, name, nick);
    Ok(vec![link, name, nick])
}

#[derive(Debug, PartialEq, Eq)]
enum FieldError {
    Truncated {
        field: &'static str,
        needed: usize,
        available: usize,
    },
    NotAscii(&'static str),
    NotUtf8(&'static str),
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldError::Truncated {
                field,
                needed,
                available,
            } => write!(
                f,
                "{} needs {} bytes but only {} remain",
                field, needed, available
            ),
            FieldError::NotAscii(field) => write!(f, "{} is not ASCII", field),
            FieldError::NotUtf8(field) => write!(f, "{} is not valid UTF-8", field),
        }
    }
}

fn read_field<'a>(
    bytes: &'a [u8],
    start: usize,
    len: usize,
    field: &'static str,
) -> Result<&'a [u8], FieldError> {
    bytes
        .get(start..start + len)
        .ok_or(FieldError::Truncated {
            field,
            needed: len,
            available: bytes.len().saturating_sub(start),
        })
}

fn read_u16(bytes: &[u8], at: usize, field: &'static str) -> Result<u16, FieldError> {
    let raw = read_field(bytes, at, 2, field)?;
    Ok(u16::from_be_bytes([raw[0], raw[1]]))
}

fn ascii(raw: &[u8], field: &'static str) -> Result<String, FieldError> {
    if !raw.is_ascii() {
        return Err(FieldError::NotAscii(field));
    }
    Ok(String::from_utf8_lossy(raw).into_owned())
}

fn utf8(raw: &[u8], field: &'static str) -> Result<String, FieldError> {
    std::str::from_utf8(raw)
        .map(str::to_string)
        .map_err(|_| FieldError::NotUtf8(field))
}
