use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout};

/// MySQL packet header (zero-copy)
///
/// Layout matches MySQL wire protocol:
/// - length: 3 bytes (little-endian, payload length)
/// - sequence_id: 1 byte
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable, IntoBytes)]
pub struct PacketHeader {
    pub length: [u8; 3],
    pub sequence_id: u8,
}

impl PacketHeader {
    pub fn encode(length: usize, sequence_id: u8) -> Self {
        let len = u32::to_le_bytes(length as u32);
        Self {
            length: [len[0], len[1], len[2]],
            sequence_id,
        }
    }

    pub fn length(&self) -> usize {
        let [low, mid, high] = self.length;
        u32::from_le_bytes([low, mid, high, 0]) as usize
    }
}

/// Semantic type of a packet, derived from its leading byte
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PacketKind {
    Ok,
    Error,
    EndOfFile,
    /// Column count, column definition or text row
    ResultSet,
    Unknown,
}

impl PacketKind {
    /// Classify a payload.
    ///
    /// Must run before any length-encoded parsing of the same payload: `0xFE`
    /// is both the EOF marker and the prefix of an 8-byte length-encoded
    /// integer, and only the payload size tells them apart.
    pub fn classify(payload: &[u8]) -> Self {
        match payload.first() {
            None => Self::Unknown,
            Some(0x00) => Self::Ok,
            Some(0xFF) => Self::Error,
            Some(0xFE) if payload.len() <= 5 => Self::EndOfFile,
            Some(_) => Self::ResultSet,
        }
    }
}

/// A single framed unit received from the server
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Packet {
    pub sequence_id: u8,
    pub payload: Vec<u8>,
}

impl Packet {
    pub fn new(sequence_id: u8, payload: Vec<u8>) -> Self {
        Self {
            sequence_id,
            payload,
        }
    }

    pub fn kind(&self) -> PacketKind {
        PacketKind::classify(&self.payload)
    }

}

/// OK packet payload (minimal header only)
///
/// Layout: 0x00 (or 0xFE for EOF) followed by variable-length fields:
/// - affected_rows: length-encoded integer
/// - last_insert_id: length-encoded integer
/// - status_flags: 2 bytes
/// - warnings: 2 bytes
/// - info: variable-length string
#[derive(Debug, Clone, Copy)]
pub struct OkPayloadBytes<'a>(pub &'a [u8]);

impl<'a> OkPayloadBytes<'a> {
    pub fn bytes(&self) -> &'a [u8] {
        self.0
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ErrPayloadBytes<'a>(pub &'a [u8]);
