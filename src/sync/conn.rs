use std::thread;

use tracing::{debug, info, warn};

use crate::buffer::BufferSet;
use crate::error::{Error, Result};
use crate::opts::Opts;
use crate::protocol::command::{
    QUERY_OVERHEAD, Query, QueryOutcome, QueryStep, decode_text_resultset, write_ping,
    write_query, write_quit,
};
use crate::protocol::connection::{Handshake, HandshakeResult, InitialHandshake};
use crate::protocol::packet::PacketKind;
use crate::protocol::response::{ErrPayload, ErrPayloadBytes};
use crate::sync::stream::{TcpTransport, Transport, read_packet, write_payload};
use crate::table::Table;

/// Where a session is in its lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Disconnected,
    /// Opening the byte stream
    Connecting,
    /// Stream is open, waiting for the greeting
    AwaitingHandshake,
    /// Handshake response sent, waiting for the verdict
    Authenticating,
    /// Authenticated and idle
    Ready,
}

/// A synchronous MySQL session over a [`Transport`]
///
/// One command runs at a time; every method blocks until the exchange is
/// complete or a read times out.
pub struct Conn<T: Transport = TcpTransport> {
    transport: T,
    opts: Opts,
    buffer_set: BufferSet,
    state: SessionState,
    initial_handshake: Option<InitialHandshake>,
    last_error: Option<ErrPayload>,
}

impl Conn<TcpTransport> {
    /// Open a TCP session and log in with the credentials in `opts`
    pub fn new<O: TryInto<Opts>>(opts: O) -> Result<Self>
    where
        Error: From<O::Error>,
    {
        let opts: Opts = opts.try_into()?;
        let transport = TcpTransport::new(opts.tcp_nodelay);
        let user = opts.user.clone();
        let password = opts.password.clone();
        let db = opts.db.clone();

        let mut conn = Self::with_transport(transport, opts);
        conn.connect(&user, &password, db.as_deref())?;
        Ok(conn)
    }
}

impl<T: Transport> Conn<T> {
    /// Build a disconnected session; nothing is sent until [`Conn::connect`]
    pub fn with_transport(transport: T, opts: Opts) -> Self {
        let buffer_set = BufferSet::new(opts.buffer_capacity);
        Self {
            transport,
            opts,
            buffer_set,
            state: SessionState::Disconnected,
            initial_handshake: None,
            last_error: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_connected(&self) -> bool {
        self.state == SessionState::Ready && self.transport.is_connected()
    }

    pub fn opts(&self) -> &Opts {
        &self.opts
    }

    /// Server version from the greeting, `None` before the first handshake
    pub fn server_version(&self) -> Option<&str> {
        self.initial_handshake
            .as_ref()
            .map(|handshake| handshake.server_version.as_str())
    }

    /// Get the connection ID assigned by the server
    pub fn connection_id(&self) -> Option<u32> {
        self.initial_handshake
            .as_ref()
            .map(|handshake| handshake.connection_id)
    }

    /// Last error reported by the server
    pub fn last_error(&self) -> Option<&ErrPayload> {
        self.last_error.as_ref()
    }

    /// SQLSTATE of the last error reported by the server
    pub fn last_sql_state(&self) -> Option<&str> {
        self.last_error.as_ref().map(|err| err.sql_state.as_str())
    }

    /// Open the stream and authenticate
    ///
    /// The TCP connect is retried `opts.connect_retries` times with
    /// `opts.retry_delay` in between. Any failure leaves the session
    /// disconnected. A connected session is closed first.
    #[tracing::instrument(skip_all, fields(host = %self.opts.host, port = self.opts.port))]
    pub fn connect(&mut self, user: &str, password: &str, database: Option<&str>) -> Result<()> {
        if self.state != SessionState::Disconnected {
            self.disconnect();
        }
        self.last_error = None;
        self.initial_handshake = None;

        self.state = SessionState::Connecting;
        self.open_transport()?;

        let result = self
            .transport
            .set_read_timeout(self.opts.read_timeout)
            .map_err(Error::from)
            .and_then(|()| self.authenticate(user, password, database));

        match result {
            Ok(()) => {
                self.state = SessionState::Ready;
                info!(
                    server_version = self.server_version().unwrap_or_default(),
                    connection_id = self.connection_id().unwrap_or_default(),
                    "connected"
                );
                Ok(())
            }
            Err(err) => {
                self.record(&err);
                self.close();
                Err(err)
            }
        }
    }

    fn open_transport(&mut self) -> Result<()> {
        let attempts = self.opts.connect_retries.max(1);
        for attempt in 1..=attempts {
            match self.transport.connect(&self.opts.host, self.opts.port) {
                Ok(()) => return Ok(()),
                Err(err) => {
                    warn!(attempt, attempts, error = %err, "connect failed");
                    if attempt < attempts {
                        thread::sleep(self.opts.retry_delay);
                    }
                }
            }
        }

        self.close();
        Err(Error::ConnectError {
            host: self.opts.host.clone(),
            port: self.opts.port,
            attempts,
        })
    }

    fn authenticate(&mut self, user: &str, password: &str, database: Option<&str>) -> Result<()> {
        self.state = SessionState::AwaitingHandshake;
        let mut handshake = Handshake::new(
            user.to_string(),
            password.to_string(),
            database.map(ToString::to_string),
        );

        loop {
            let packet = read_packet(&mut self.transport, self.buffer_set.capacity())?;
            let next_sequence_id = packet.sequence_id.wrapping_add(1);

            match handshake.drive(&packet.payload)? {
                HandshakeResult::InitialHandshake {
                    handshake_response,
                    initial_handshake,
                } => {
                    debug!(
                        server_version = %initial_handshake.server_version,
                        plugin = ?initial_handshake.auth_plugin_name,
                        "greeting"
                    );
                    self.initial_handshake = Some(initial_handshake);
                    self.state = SessionState::Authenticating;
                    self.send(next_sequence_id, &handshake_response)?;
                }
                HandshakeResult::Write(auth_response) => {
                    debug!("auth switch");
                    self.send(next_sequence_id, &auth_response)?;
                }
                HandshakeResult::Connected => return Ok(()),
            }
        }
    }

    /// Send COM_QUIT if possible and close the stream
    ///
    /// Always ends disconnected and may be called any number of times.
    /// Returns whether the quit command was written.
    #[tracing::instrument(skip_all)]
    pub fn disconnect(&mut self) -> bool {
        let mut sent = false;
        if self.state == SessionState::Ready && self.transport.is_connected() {
            write_quit(self.buffer_set.new_write_buffer());
            sent = match write_payload(&mut self.transport, 0, self.buffer_set.write_buffer_mut()) {
                Ok(()) => true,
                Err(err) => {
                    warn!(error = %err, "failed to send quit");
                    false
                }
            };
            info!("disconnected");
        }
        self.close();
        sent
    }

    fn close(&mut self) {
        self.transport.close();
        self.buffer_set.clear_packets();
        self.state = SessionState::Disconnected;
    }

    fn ensure_ready(&self) -> Result<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(Error::NotConnected)
        }
    }

    fn send(&mut self, sequence_id: u8, payload: &[u8]) -> Result<()> {
        self.buffer_set.new_write_buffer().extend_from_slice(payload);
        write_payload(
            &mut self.transport,
            sequence_id,
            self.buffer_set.write_buffer_mut(),
        )
    }

    fn record(&mut self, err: &Error) {
        if let Some(server) = err.server_error() {
            warn!(
                code = server.error_code,
                sql_state = %server.sql_state,
                message = %server.message,
                "server error"
            );
            self.last_error = Some(server.clone());
        }
    }

    /// Record `err` and close the session when the stream can no longer be
    /// trusted: a transport failure, or an error raised before the server
    /// finished its response.
    fn fail(&mut self, err: Error, response_complete: bool) -> Error {
        self.record(&err);
        if err.is_transport() || !response_complete {
            warn!(error = %err, "closing connection");
            self.close();
        }
        err
    }

    /// Run one text query and collect its result
    ///
    /// Statements without a result set return an empty table carrying the
    /// affected-row count. Server errors and malformed results leave the
    /// session ready; transport failures disconnect it.
    #[tracing::instrument(skip_all)]
    pub fn query(&mut self, sql: &str) -> Result<Table> {
        self.ensure_ready()?;

        let length = sql.len() + QUERY_OVERHEAD;
        if length > self.buffer_set.capacity() {
            return Err(Error::QueryTooLarge {
                length,
                capacity: self.buffer_set.capacity(),
            });
        }

        self.last_error = None;
        self.buffer_set.clear_packets();

        write_query(self.buffer_set.new_write_buffer(), sql);
        if let Err(err) = write_payload(&mut self.transport, 0, self.buffer_set.write_buffer_mut())
        {
            return Err(self.fail(err, false));
        }

        let (outcome, dropped) = match self.receive_query_response() {
            Ok(received) => received,
            Err(err) => return Err(self.fail(err, false)),
        };

        let result = match (outcome, dropped) {
            (_, Some(err)) => Err(err),
            (outcome, None) => Self::build_table(outcome, &self.buffer_set),
        };
        self.buffer_set.clear_packets();

        result.map_err(|err| self.fail(err, true))
    }

    fn build_table(outcome: QueryOutcome, buffer_set: &BufferSet) -> Result<Table> {
        match outcome {
            QueryOutcome::Ok(ok) => Ok(Table::from_ok(
                ok.affected_rows,
                ok.last_insert_id,
                ok.warnings,
            )),
            QueryOutcome::Err(err) => Err(Error::ServerError(err)),
            QueryOutcome::ResultSet { field_count, .. } => {
                debug!(
                    field_count,
                    packets = buffer_set.packets.len(),
                    "result set complete"
                );
                decode_text_resultset(&buffer_set.packets)
            }
        }
    }

    /// Read packets until the response is complete
    ///
    /// An oversized column definition or row is dropped and the rest of the
    /// response is still drained; the first such error is handed back with
    /// the outcome.
    fn receive_query_response(&mut self) -> Result<(QueryOutcome, Option<Error>)> {
        let mut query = Query::new();
        let mut dropped = None;
        loop {
            let packet = match read_packet(&mut self.transport, self.buffer_set.capacity()) {
                Ok(packet) => packet,
                Err(err @ Error::PacketTooLarge { .. }) => {
                    if query.skip().is_err() {
                        return Err(err);
                    }
                    dropped.get_or_insert(err);
                    continue;
                }
                Err(err) => return Err(err),
            };
            let step = query.drive(&packet.payload)?;
            if dropped.is_none() {
                self.buffer_set.packets.push(packet);
            }
            if let QueryStep::Finished(outcome) = step {
                return Ok((outcome, dropped));
            }
        }
    }

    /// Send a ping to the server to check if the connection is alive
    ///
    /// This sends a COM_PING command to the MySQL server and waits for an OK response.
    #[tracing::instrument(skip_all)]
    pub fn ping(&mut self) -> Result<()> {
        self.ensure_ready()?;

        write_ping(self.buffer_set.new_write_buffer());
        let result = write_payload(&mut self.transport, 0, self.buffer_set.write_buffer_mut())
            .and_then(|()| read_packet(&mut self.transport, self.buffer_set.capacity()));
        let packet = match result {
            Ok(packet) => packet,
            Err(err) => return Err(self.fail(err, false)),
        };

        let result = match packet.kind() {
            PacketKind::Ok => Ok(()),
            PacketKind::Error => Err(Error::from(ErrPayloadBytes(&packet.payload))),
            _ => Err(Error::InvalidPacket),
        };
        result.map_err(|err| self.fail(err, true))
    }
}

impl<T: Transport> Drop for Conn<T> {
    fn drop(&mut self) {
        self.disconnect();
    }
}

impl<T: Transport> std::fmt::Debug for Conn<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Conn")
            .field("state", &self.state)
            .field("opts", &self.opts)
            .field("server_version", &self.server_version())
            .finish_non_exhaustive()
    }
}
