use tracing::{debug, warn};

use crate::constant::{CommandByte, ServerStatusFlags};
use crate::error::{Error, Result, eyre};
use crate::protocol::command::resultset::read_column_count;
use crate::protocol::packet::PacketKind;
use crate::protocol::primitive::*;
use crate::protocol::response::{
    ErrPayload, ErrPayloadBytes, OkPayload, OkPayloadBytes, read_eof_packet,
};

/// Bytes a COM_QUERY packet adds around the SQL text (header + command byte)
pub const QUERY_OVERHEAD: usize = 5;

/// Write COM_QUERY command
pub fn write_query(out: &mut Vec<u8>, sql: &str) {
    write_int_1(out, CommandByte::Query as u8);
    out.extend_from_slice(sql.as_bytes());
}

/// How a COM_QUERY exchange ended
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryOutcome {
    /// Statement without a result set
    Ok(OkPayload),
    /// The server rejected the statement, before or during the result set
    Err(ErrPayload),
    /// A complete text result set has been received
    ResultSet { field_count: usize, warnings: u16 },
}

/// What the caller must do after feeding a packet to [`Query::drive`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum QueryStep {
    NeedPacket,
    Finished(QueryOutcome),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QueryState {
    FirstPacket,
    Columns { field_count: usize, received: usize },
    Rows { field_count: usize },
    Finished,
}

/// State machine for the response to COM_QUERY (text protocol)
///
/// Only tracks where the exchange is; the caller keeps the packets and hands
/// them to [`decode_text_resultset`](super::decode_text_resultset) once the
/// result set is complete.
#[derive(Debug)]
pub struct Query {
    state: QueryState,
}

impl Default for Query {
    fn default() -> Self {
        Self::new()
    }
}

impl Query {
    pub fn new() -> Self {
        Self {
            state: QueryState::FirstPacket,
        }
    }

    pub fn is_finished(&self) -> bool {
        self.state == QueryState::Finished
    }

    /// Drive the state machine with the next payload
    pub fn drive(&mut self, payload: &[u8]) -> Result<QueryStep> {
        let kind = PacketKind::classify(payload);
        match self.state {
            QueryState::FirstPacket => match kind {
                PacketKind::Ok => {
                    let ok = OkPayload::try_from(OkPayloadBytes(payload))?;
                    if ok
                        .status_flags
                        .contains(ServerStatusFlags::SERVER_MORE_RESULTS_EXISTS)
                    {
                        warn!("server announced more results; only the first is read");
                    }
                    self.finish(QueryOutcome::Ok(ok))
                }
                PacketKind::Error => self.finish_with_error(payload),
                PacketKind::ResultSet => {
                    let field_count = read_column_count(payload)?;
                    self.state = QueryState::Columns {
                        field_count,
                        received: 0,
                    };
                    Ok(QueryStep::NeedPacket)
                }
                PacketKind::EndOfFile | PacketKind::Unknown => Err(Error::InvalidPacket),
            },

            // The decoder checks the column count once the result set is
            // complete, so a miscounted header still drains the response
            QueryState::Columns {
                field_count,
                received,
            } => match kind {
                PacketKind::EndOfFile => {
                    if received != field_count {
                        debug!(field_count, received, "column count mismatch");
                    }
                    self.state = QueryState::Rows { field_count };
                    Ok(QueryStep::NeedPacket)
                }
                PacketKind::Error => self.finish_with_error(payload),
                _ => {
                    self.state = QueryState::Columns {
                        field_count,
                        received: received + 1,
                    };
                    Ok(QueryStep::NeedPacket)
                }
            },

            // A row whose first value is the empty string starts with 0x00,
            // so only EOF and ERR end this phase
            QueryState::Rows { field_count } => match kind {
                PacketKind::EndOfFile => {
                    let eof = read_eof_packet(payload)?;
                    self.finish(QueryOutcome::ResultSet {
                        field_count,
                        warnings: eof.warnings(),
                    })
                }
                PacketKind::Error => self.finish_with_error(payload),
                _ => Ok(QueryStep::NeedPacket),
            },

            QueryState::Finished => Err(Error::LibraryBug(eyre!(
                "query driven after its response was complete"
            ))),
        }
    }

    /// Account for a packet whose payload was dropped unread
    ///
    /// Only a column definition or a row can be skipped; anything else leaves
    /// no way to tell where the response ends.
    pub fn skip(&mut self) -> Result<()> {
        match self.state {
            QueryState::Columns {
                field_count,
                received,
            } => {
                self.state = QueryState::Columns {
                    field_count,
                    received: received + 1,
                };
                Ok(())
            }
            QueryState::Rows { .. } => Ok(()),
            QueryState::FirstPacket => Err(Error::InvalidPacket),
            QueryState::Finished => Err(Error::LibraryBug(eyre!(
                "query skipped after its response was complete"
            ))),
        }
    }

    fn finish(&mut self, outcome: QueryOutcome) -> Result<QueryStep> {
        self.state = QueryState::Finished;
        Ok(QueryStep::Finished(outcome))
    }

    fn finish_with_error(&mut self, payload: &[u8]) -> Result<QueryStep> {
        let err = ErrPayload::try_from(ErrPayloadBytes(payload))?;
        self.finish(QueryOutcome::Err(err))
    }
}
