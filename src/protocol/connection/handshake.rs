use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::constant::{
    CHARSET_LATIN1, CLIENT_CAPABILITIES, CapabilityFlags, MAX_PACKET_SIZE, PROTOCOL_VERSION,
    SCRAMBLE_LENGTH, ServerStatusFlags,
};
use crate::error::{Error, Result, eyre};
use crate::protocol::packet::PacketKind;
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes};

/// Name of the only authentication plugin this client speaks
pub const MYSQL_NATIVE_PASSWORD: &str = "mysql_native_password";

/// Fixed-width part of the protocol-10 greeting that follows the server version
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
#[repr(C, packed)]
struct HandshakeFixedFields {
    connection_id: U32LE,
    auth_data_part1: [u8; 8],
    filler: u8,
    capability_flags_lower: U16LE,
    charset: u8,
    status_flags: U16LE,
    capability_flags_upper: U16LE,
    auth_data_len: u8,
    reserved: [u8; 10],
}

/// Length of the seed tail that follows the reserved span
const AUTH_DATA_PART2_LEN: usize = SCRAMBLE_LENGTH - 8;

#[derive(Debug, Clone)]
pub struct InitialHandshake {
    pub protocol_version: u8,
    pub server_version: String,
    pub connection_id: u32,
    pub seed: [u8; SCRAMBLE_LENGTH],
    pub capability_flags: CapabilityFlags,
    pub charset: u8,
    pub status_flags: ServerStatusFlags,
    pub auth_plugin_name: Option<String>,
}

/// Read initial handshake packet from server
pub fn read_initial_handshake(payload: &[u8]) -> Result<InitialHandshake> {
    let (protocol_version, data) = read_int_1(payload)?;

    if protocol_version == 0xFF {
        // the server refused the connection before the handshake
        Err(ErrPayloadBytes(payload))?
    }
    if protocol_version != PROTOCOL_VERSION {
        return Err(Error::InvalidPacket);
    }

    let (server_version, data) = read_string_null(data)?;

    let (fixed, rest) =
        HandshakeFixedFields::read_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    let (auth_data_part2, rest) = read_string_fix(rest, AUTH_DATA_PART2_LEN)?;

    let mut seed = [0u8; SCRAMBLE_LENGTH];
    seed[..8].copy_from_slice(&fixed.auth_data_part1);
    seed[8..].copy_from_slice(auth_data_part2);

    let cap_bits = (u32::from(fixed.capability_flags_upper.get()) << 16)
        | u32::from(fixed.capability_flags_lower.get());
    let capability_flags = CapabilityFlags::from_bits_retain(cap_bits);

    // NUL after the seed, then the plugin name (some servers omit its terminator)
    let auth_plugin_name = match rest.split_first() {
        Some((&0, name)) if capability_flags.contains(CapabilityFlags::CLIENT_PLUGIN_AUTH) => {
            let name = match read_string_null(name) {
                Ok((name, _rest)) => name,
                Err(_) => name,
            };
            Some(to_string_lossy(name))
        }
        _ => None,
    };

    Ok(InitialHandshake {
        protocol_version,
        server_version: to_string_lossy(server_version),
        connection_id: fixed.connection_id.get(),
        seed,
        capability_flags,
        charset: fixed.charset,
        status_flags: ServerStatusFlags::from_bits_truncate(fixed.status_flags.get()),
        auth_plugin_name,
    })
}

/// Handshake response packet sent by client (HandshakeResponse41)
#[derive(Debug, Clone)]
pub struct HandshakeResponse41<'a> {
    pub capability_flags: CapabilityFlags,
    pub max_packet_size: u32,
    pub charset: u8,
    pub username: &'a str,
    pub auth_response: &'a [u8],
    pub database: Option<&'a str>,
}

/// Write handshake response packet (HandshakeResponse41)
pub fn write_handshake_response(out: &mut Vec<u8>, response: &HandshakeResponse41<'_>) {
    // capability flags (4 bytes)
    write_int_4(out, response.capability_flags.bits());

    // max packet size (4 bytes)
    write_int_4(out, response.max_packet_size);

    // charset (1 byte)
    write_int_1(out, response.charset);

    // reserved (23 bytes of 0x00)
    write_bytes_fix(out, &[0u8; 23]);

    // username (null-terminated)
    write_string_null(out, response.username);

    // 1-byte length + scramble, a lone 0x00 when there is no password
    write_int_1(out, response.auth_response.len() as u8);
    write_bytes_fix(out, response.auth_response);

    // database name (null-terminated), a lone 0x00 when none is selected
    write_string_null(out, response.database.unwrap_or(""));
}

// ============================================================================
// mysql_native_password
// ============================================================================

/// The 20-byte `mysql_native_password` token
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct Scramble([u8; SCRAMBLE_LENGTH]);

impl Scramble {
    pub fn as_bytes(&self) -> &[u8; SCRAMBLE_LENGTH] {
        &self.0
    }
}

impl std::fmt::Debug for Scramble {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("Scramble(..)")
    }
}

/// mysql_native_password authentication
///
/// Formula: SHA1(password) XOR SHA1(seed + SHA1(SHA1(password)))
///
/// Returns `None` for an empty password, which is sent as an empty auth
/// response.
pub fn scramble_password(password: &str, seed: &[u8; SCRAMBLE_LENGTH]) -> Option<Scramble> {
    use sha1::{Digest, Sha1};

    if password.is_empty() {
        return None;
    }

    // stage1_hash = SHA1(password)
    let stage1_hash = Sha1::digest(password.as_bytes());

    // stage2_hash = SHA1(stage1_hash)
    let stage2_hash = Sha1::digest(stage1_hash);

    // token_hash = SHA1(seed + stage2_hash)
    let mut hasher = Sha1::new();
    hasher.update(seed);
    hasher.update(stage2_hash);
    let token_hash = hasher.finalize();

    let mut result = [0u8; SCRAMBLE_LENGTH];
    for (out, (a, b)) in result.iter_mut().zip(stage1_hash.iter().zip(token_hash.iter())) {
        *out = a ^ b;
    }

    Some(Scramble(result))
}

/// Auth switch request from server
#[derive(Debug, Clone)]
pub struct AuthSwitchRequest<'a> {
    pub plugin_name: &'a [u8],
    pub plugin_data: &'a [u8],
}

/// Read auth switch request (0xFE followed by plugin name and data)
pub fn read_auth_switch_request(payload: &[u8]) -> Result<AuthSwitchRequest<'_>> {
    let (header, data) = read_int_1(payload)?;
    if header != 0xFE {
        return Err(Error::InvalidPacket);
    }

    if data.is_empty() {
        // pre-4.1 "old password" request
        return Ok(AuthSwitchRequest {
            plugin_name: b"mysql_old_password",
            plugin_data: &[],
        });
    }

    let (plugin_name, data) = read_string_null(data)?;
    let plugin_data = data.strip_suffix(&[0]).unwrap_or(data);
    Ok(AuthSwitchRequest {
        plugin_name,
        plugin_data,
    })
}

// ============================================================================
// State Machine API for Handshake
// ============================================================================

/// Credentials for the handshake
pub struct HandshakeConfig {
    pub username: String,
    pub password: String,
    pub database: Option<String>,
}

impl std::fmt::Debug for HandshakeConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HandshakeConfig")
            .field("username", &self.username)
            .field("database", &self.database)
            .finish_non_exhaustive()
    }
}

/// Result of driving the handshake state machine
#[derive(Debug)]
pub enum HandshakeResult {
    /// Greeting parsed - write the response payload to the server
    InitialHandshake {
        handshake_response: Vec<u8>,
        initial_handshake: InitialHandshake,
    },
    /// Write this payload to the server, then read the next packet
    Write(Vec<u8>),
    /// Handshake complete, connection established
    Connected,
}

/// State machine for the MySQL handshake
///
/// Pure parsing and packet generation without I/O.
#[derive(Debug)]
pub enum Handshake {
    /// Waiting for the greeting
    Start { config: HandshakeConfig },
    /// Sent handshake response, waiting for the auth result
    WaitingAuthResult { config: HandshakeConfig },
    /// Sent auth switch response, waiting for the final auth result
    WaitingFinalAuthResult,
    /// Connected (terminal state)
    Connected,
}

impl Handshake {
    pub fn new(username: String, password: String, database: Option<String>) -> Self {
        Self::Start {
            config: HandshakeConfig {
                username,
                password,
                database,
            },
        }
    }

    /// Drive the state machine with the next payload
    pub fn drive(&mut self, payload: &[u8]) -> Result<HandshakeResult> {
        match std::mem::replace(self, Self::Connected) {
            Self::Start { config } => {
                let handshake = read_initial_handshake(payload)?;

                let scramble = scramble_password(&config.password, &handshake.seed);
                let auth_response: &[u8] = match &scramble {
                    Some(scramble) => scramble.as_bytes(),
                    None => &[],
                };

                let response = HandshakeResponse41 {
                    capability_flags: CLIENT_CAPABILITIES,
                    max_packet_size: MAX_PACKET_SIZE,
                    charset: CHARSET_LATIN1,
                    username: &config.username,
                    auth_response,
                    database: config.database.as_deref(),
                };

                let mut handshake_response = Vec::new();
                write_handshake_response(&mut handshake_response, &response);

                *self = Self::WaitingAuthResult { config };
                Ok(HandshakeResult::InitialHandshake {
                    handshake_response,
                    initial_handshake: handshake,
                })
            }

            Self::WaitingAuthResult { config } => match PacketKind::classify(payload) {
                PacketKind::Ok => Ok(HandshakeResult::Connected),
                PacketKind::Error => Err(read_auth_error(payload)),
                _ if payload.first() == Some(&0xFE) => {
                    let auth_switch = read_auth_switch_request(payload)?;
                    if auth_switch.plugin_name != MYSQL_NATIVE_PASSWORD.as_bytes() {
                        return Err(Error::UnsupportedAuthPlugin(to_string_lossy(
                            auth_switch.plugin_name,
                        )));
                    }

                    let seed: &[u8; SCRAMBLE_LENGTH] = auth_switch
                        .plugin_data
                        .try_into()
                        .map_err(|_| Error::InvalidPacket)?;
                    let auth_response = scramble_password(&config.password, seed)
                        .map(|s| s.as_bytes().to_vec())
                        .unwrap_or_default();

                    *self = Self::WaitingFinalAuthResult;
                    Ok(HandshakeResult::Write(auth_response))
                }
                _ => Err(Error::InvalidPacket),
            },

            Self::WaitingFinalAuthResult => match PacketKind::classify(payload) {
                PacketKind::Ok => Ok(HandshakeResult::Connected),
                PacketKind::Error => Err(read_auth_error(payload)),
                _ => Err(Error::InvalidPacket),
            },

            Self::Connected => Err(Error::LibraryBug(eyre!(
                "handshake driven after the connection was established"
            ))),
        }
    }
}

/// Turn a rejected login into `Error::AuthError`
fn read_auth_error(payload: &[u8]) -> Error {
    match ErrPayload::try_from(ErrPayloadBytes(payload)) {
        Ok(err) => Error::AuthError(err),
        Err(err) => err,
    }
}
