//! Scripted in-memory server for driving `Conn` without a network

#![allow(dead_code)]

use std::cell::RefCell;
use std::collections::VecDeque;
use std::io;
use std::rc::Rc;
use std::time::Duration;

use nano_mysql::Opts;
use nano_mysql::protocol::primitive::*;
use nano_mysql::sync::{Conn, Transport};

pub const SEED: [u8; 20] = [
    0x3d, 0x21, 0x5c, 0x4f, 0x6b, 0x2a, 0x71, 0x58, 0x1e, 0x33, 0x47, 0x62, 0x25, 0x6e, 0x3a,
    0x50, 0x19, 0x77, 0x2f, 0x44,
];

#[derive(Debug, Default)]
pub struct Script {
    /// Bytes the server will send, in order
    pub incoming: VecDeque<u8>,
    /// Everything the client wrote
    pub written: Vec<u8>,
    pub write_calls: usize,
    pub connected: bool,
    /// Number of connect attempts that fail before one succeeds
    pub connect_failures: u32,
    pub connect_calls: u32,
    pub fail_writes: bool,
    pub read_timeout: Option<Duration>,
    pub close_calls: u32,
}

/// Handle to a shared [`Script`]; clones observe the same state
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport(pub Rc<RefCell<Script>>);

impl ScriptedTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_packet(&self, sequence_id: u8, payload: &[u8]) {
        let mut script = self.0.borrow_mut();
        let len = (payload.len() as u32).to_le_bytes();
        script.incoming.extend([len[0], len[1], len[2], sequence_id]);
        script.incoming.extend(payload.iter().copied());
    }

    /// Queue a packet sequence numbered from `first_sequence_id`
    pub fn push_packets(&self, first_sequence_id: u8, payloads: &[Vec<u8>]) {
        for (i, payload) in payloads.iter().enumerate() {
            self.push_packet(first_sequence_id.wrapping_add(i as u8), payload);
        }
    }

    pub fn written(&self) -> Vec<u8> {
        self.0.borrow().written.clone()
    }

    pub fn written_len(&self) -> usize {
        self.0.borrow().written.len()
    }

    pub fn pending(&self) -> usize {
        self.0.borrow().incoming.len()
    }
}

impl Transport for ScriptedTransport {
    fn connect(&mut self, _host: &str, _port: u16) -> io::Result<()> {
        let mut script = self.0.borrow_mut();
        script.connect_calls += 1;
        if script.connect_failures > 0 {
            script.connect_failures -= 1;
            return Err(io::Error::new(
                io::ErrorKind::ConnectionRefused,
                "connection refused",
            ));
        }
        script.connected = true;
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.0.borrow_mut().read_timeout = timeout;
        Ok(())
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        let mut script = self.0.borrow_mut();
        if !script.connected {
            return Err(io::Error::new(io::ErrorKind::NotConnected, "closed"));
        }
        let n = buf.len();
        if script.incoming.len() < n {
            return Err(io::Error::new(io::ErrorKind::TimedOut, "read timed out"));
        }
        for (dst, src) in buf.iter_mut().zip(script.incoming.drain(..n)) {
            *dst = src;
        }
        Ok(())
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        let mut script = self.0.borrow_mut();
        if !script.connected || script.fail_writes {
            return Err(io::Error::new(io::ErrorKind::BrokenPipe, "broken pipe"));
        }
        script.write_calls += 1;
        script.written.extend_from_slice(buf);
        Ok(())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }

    fn is_connected(&self) -> bool {
        self.0.borrow().connected
    }

    fn close(&mut self) {
        let mut script = self.0.borrow_mut();
        script.connected = false;
        script.close_calls += 1;
    }
}

pub fn opts() -> Opts {
    Opts {
        user: "root".to_string(),
        password: "secret".to_string(),
        db: Some("shop".to_string()),
        retry_delay: Duration::ZERO,
        ..Opts::default()
    }
}

// ─── Server packets ─────────────────────────────────────────────────────

pub fn greeting(version: &str) -> Vec<u8> {
    let mut out = vec![10];
    write_string_null(&mut out, version);
    write_int_4(&mut out, 1234);
    write_bytes_fix(&mut out, &SEED[..8]);
    write_int_1(&mut out, 0);
    write_int_2(&mut out, 0xF7FF);
    write_int_1(&mut out, 8);
    write_int_2(&mut out, 0x0002);
    write_int_2(&mut out, 0x0008);
    write_int_1(&mut out, 21);
    write_bytes_fix(&mut out, &[0; 10]);
    write_bytes_fix(&mut out, &SEED[8..]);
    write_int_1(&mut out, 0);
    write_string_null(&mut out, "mysql_native_password");
    out
}

pub fn ok(affected_rows: u64, last_insert_id: u64) -> Vec<u8> {
    let mut out = vec![0x00];
    write_int_lenenc(&mut out, affected_rows);
    write_int_lenenc(&mut out, last_insert_id);
    write_int_2(&mut out, 0x0002);
    write_int_2(&mut out, 0);
    out
}

pub fn err(code: u16, sql_state: &str, message: &str) -> Vec<u8> {
    let mut out = vec![0xFF];
    write_int_2(&mut out, code);
    out.push(b'#');
    out.extend_from_slice(sql_state.as_bytes());
    out.extend_from_slice(message.as_bytes());
    out
}

pub fn eof() -> Vec<u8> {
    vec![0xFE, 0x00, 0x00, 0x02, 0x00]
}

pub fn column_count(count: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_int_lenenc(&mut out, count);
    out
}

pub fn column(name: &str, size: u32) -> Vec<u8> {
    let mut out = Vec::new();
    write_bytes_lenenc(&mut out, b"def");
    write_bytes_lenenc(&mut out, b"shop");
    write_bytes_lenenc(&mut out, b"people");
    write_bytes_lenenc(&mut out, b"people");
    write_bytes_lenenc(&mut out, name.as_bytes());
    write_bytes_lenenc(&mut out, name.as_bytes());
    write_int_lenenc(&mut out, 0x0c);
    write_int_2(&mut out, 8);
    write_int_4(&mut out, size);
    write_int_1(&mut out, 0xfd);
    write_int_2(&mut out, 0);
    write_int_1(&mut out, 0);
    write_int_2(&mut out, 0);
    out
}

pub fn row(values: &[Option<&str>]) -> Vec<u8> {
    let mut out = Vec::new();
    for value in values {
        match value {
            Some(value) => write_bytes_lenenc(&mut out, value.as_bytes()),
            None => write_int_1(&mut out, LENENC_NULL),
        }
    }
    out
}

/// A full text result set starting at sequence id 1
pub fn push_result_set(transport: &ScriptedTransport, columns: &[(&str, u32)], rows: &[&[Option<&str>]]) {
    let mut payloads = vec![column_count(columns.len() as u64)];
    payloads.extend(columns.iter().map(|(name, size)| column(name, *size)));
    payloads.push(eof());
    payloads.extend(rows.iter().map(|values| row(values)));
    payloads.push(eof());
    transport.push_packets(1, &payloads);
}

/// Queue the greeting and the OK that completes the login
pub fn push_login(transport: &ScriptedTransport) {
    transport.push_packet(0, &greeting("8.0.36"));
    transport.push_packet(2, &ok(0, 0));
}

/// Route session logs to the test harness output
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .with_test_writer()
        .try_init();
}

/// A session that has completed the login
pub fn connected() -> (Conn<ScriptedTransport>, ScriptedTransport) {
    init_tracing();
    let transport = ScriptedTransport::new();
    push_login(&transport);
    let mut conn = Conn::with_transport(transport.clone(), opts());
    conn.connect("root", "secret", Some("shop"))
        .expect("scripted login");
    (conn, transport)
}
