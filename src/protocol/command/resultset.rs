use tracing::debug;
use zerocopy::byteorder::little_endian::{U16 as U16LE, U32 as U32LE};
use zerocopy::{FromBytes, Immutable, KnownLayout};

use crate::col::Field;
use crate::constant::{ColumnFlags, ColumnType};
use crate::error::{Error, Result};
use crate::protocol::packet::{Packet, PacketKind};
use crate::protocol::primitive::*;
use crate::protocol::response::{ErrPayloadBytes, OkPayload, OkPayloadBytes, read_eof_packet};
use crate::row::Row;
use crate::table::Table;

/// Length announced before the fixed-size tail of a column definition
const COLUMN_DEFINITION_TAIL_LEN: u64 = 0x0c;

/// Fixed-size tail of Column Definition packet (12 bytes)
#[repr(C, packed)]
#[derive(Debug, Clone, Copy, FromBytes, KnownLayout, Immutable)]
pub struct ColumnDefinitionTail {
    charset: U16LE,
    column_length: U32LE,
    column_type: u8,
    flags: U16LE,
    decimals: u8,
    reserved: U16LE,
}

impl ColumnDefinitionTail {
    pub fn charset(&self) -> u16 {
        self.charset.get()
    }

    pub fn column_length(&self) -> u32 {
        self.column_length.get()
    }

    pub fn column_type(&self) -> Option<ColumnType> {
        ColumnType::from_u8(self.column_type)
    }

    pub fn flags(&self) -> ColumnFlags {
        ColumnFlags::from_bits_truncate(self.flags.get())
    }

    pub fn decimals(&self) -> u8 {
        self.decimals
    }
}

/// Read the column count that opens a result set
///
/// A count of zero or the NULL marker is not a result set.
pub fn read_column_count(payload: &[u8]) -> Result<usize> {
    let (count, _rest) = read_int_lenenc(payload)?;
    match usize::try_from(count) {
        Ok(0) | Err(_) => Err(Error::InvalidPacket),
        Ok(count) => Ok(count),
    }
}

/// Split a column definition packet into its names and fixed tail
pub fn read_column_definition_tail(payload: &[u8]) -> Result<(&[u8], &[u8], &ColumnDefinitionTail)> {
    let (_catalog, data) = read_string_lenenc(payload)?;
    let (_schema, data) = read_string_lenenc(data)?;
    let (_table, data) = read_string_lenenc(data)?;
    let (_org_table, data) = read_string_lenenc(data)?;
    let (name, data) = read_string_lenenc(data)?;
    let (org_name, data) = read_string_lenenc(data)?;

    let (tail_len, data) = read_int_lenenc(data)?;
    if tail_len != COLUMN_DEFINITION_TAIL_LEN {
        return Err(Error::InvalidPacket);
    }
    let (tail, _rest) =
        ColumnDefinitionTail::ref_from_prefix(data).map_err(|_| Error::UnexpectedEof)?;
    Ok((name, org_name, tail))
}

/// Decode one column definition packet into a [`Field`]
pub fn read_column_definition(payload: &[u8]) -> Result<Field> {
    let (name, org_name, tail) = read_column_definition_tail(payload)?;
    Ok(Field {
        name: to_string_lossy(name),
        org_name: to_string_lossy(org_name),
        size: tail.column_length(),
        column_type: tail.column_type,
    })
}

/// Decode one text row of exactly `field_count` values
pub fn read_text_row(payload: &[u8], field_count: usize) -> Result<Row> {
    let mut values = Vec::with_capacity(field_count);
    let mut data = payload;
    while !data.is_empty() {
        let (value, rest) = read_string_lenenc_nullable(data)?;
        values.push(value.map(to_string_lossy));
        data = rest;
    }
    if values.len() != field_count {
        return Err(Error::ColumnCountMismatch {
            expected: field_count,
            actual: values.len(),
        });
    }
    Ok(Row::new(values))
}

/// Decode a complete COM_QUERY response from its buffered packets
///
/// An OK reply gives an empty table carrying the OK counters. An ERR packet,
/// first or after some rows, is returned as the server error and whatever was
/// decoded before it is dropped.
pub fn decode_text_resultset(packets: &[Packet]) -> Result<Table> {
    let mut packets = packets.iter();
    let first = packets.next().ok_or(Error::UnexpectedEof)?;

    let field_count = match first.kind() {
        PacketKind::Ok => {
            let ok = OkPayload::try_from(OkPayloadBytes(&first.payload))?;
            return Ok(Table::from_ok(ok.affected_rows, ok.last_insert_id, ok.warnings));
        }
        PacketKind::Error => Err(ErrPayloadBytes(&first.payload))?,
        PacketKind::ResultSet => read_column_count(&first.payload)?,
        PacketKind::EndOfFile | PacketKind::Unknown => return Err(Error::InvalidPacket),
    };

    let mut fields = Vec::with_capacity(field_count);
    loop {
        let packet = packets.next().ok_or(Error::UnexpectedEof)?;
        match packet.kind() {
            PacketKind::EndOfFile => break,
            PacketKind::Error => Err(ErrPayloadBytes(&packet.payload))?,
            _ => fields.push(read_column_definition(&packet.payload)?),
        }
    }
    if fields.len() != field_count {
        return Err(Error::ColumnCountMismatch {
            expected: field_count,
            actual: fields.len(),
        });
    }

    // 0x00 leads a row whose first value is the empty string, so only EOF
    // and ERR end the row phase
    let mut rows = Vec::new();
    let warnings = loop {
        let packet = packets.next().ok_or(Error::UnexpectedEof)?;
        match packet.kind() {
            PacketKind::EndOfFile => break read_eof_packet(&packet.payload)?.warnings(),
            PacketKind::Error => Err(ErrPayloadBytes(&packet.payload))?,
            _ => rows.push(read_text_row(&packet.payload, field_count)?),
        }
    };

    debug!(fields = field_count, rows = rows.len(), "decoded result set");

    let mut table = Table::new(fields, rows)?;
    table.set_warnings(warnings);
    Ok(table)
}
