use std::io::{self, BufReader, Read, Write};
use std::net::{Shutdown, TcpStream};
use std::time::Duration;

use auto_impl::auto_impl;
use tracing::debug;
use zerocopy::{FromZeros, IntoBytes};

use crate::constant::MAX_PAYLOAD_LENGTH;
use crate::error::{Error, Result, eyre};
use crate::protocol::packet::{Packet, PacketHeader, PacketKind};

/// Blocking byte stream between the session and the server
///
/// A read that times out must fail with an error rather than return short.
#[auto_impl(&mut, Box)]
pub trait Transport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()>;

    /// Bound every subsequent read, `None` blocks forever
    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()>;

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()>;

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()>;

    fn flush(&mut self) -> io::Result<()>;

    fn is_connected(&self) -> bool;

    /// Close the stream. Closing a closed stream does nothing.
    fn close(&mut self);
}

fn not_connected() -> io::Error {
    io::Error::new(io::ErrorKind::NotConnected, "transport is closed")
}

/// [`Transport`] over a buffered TCP stream
#[derive(Debug, Default)]
pub struct TcpTransport {
    stream: Option<BufReader<TcpStream>>,
    tcp_nodelay: bool,
}

impl TcpTransport {
    pub fn new(tcp_nodelay: bool) -> Self {
        Self {
            stream: None,
            tcp_nodelay,
        }
    }

    fn stream(&mut self) -> io::Result<&mut BufReader<TcpStream>> {
        self.stream.as_mut().ok_or_else(not_connected)
    }
}

impl Transport for TcpTransport {
    fn connect(&mut self, host: &str, port: u16) -> io::Result<()> {
        self.close();
        let stream = TcpStream::connect((host, port))?;
        stream.set_nodelay(self.tcp_nodelay)?;
        self.stream = Some(BufReader::new(stream));
        Ok(())
    }

    fn set_read_timeout(&mut self, timeout: Option<Duration>) -> io::Result<()> {
        self.stream()?.get_ref().set_read_timeout(timeout)
    }

    fn read_exact(&mut self, buf: &mut [u8]) -> io::Result<()> {
        self.stream()?.read_exact(buf)
    }

    fn write_all(&mut self, buf: &[u8]) -> io::Result<()> {
        self.stream()?.get_mut().write_all(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.stream()?.get_mut().flush()
    }

    fn is_connected(&self) -> bool {
        self.stream.is_some()
    }

    fn close(&mut self) {
        if let Some(stream) = self.stream.take() {
            // the peer may already be gone
            let _ = stream.get_ref().shutdown(Shutdown::Both);
        }
    }
}

/// Read one packet: exactly the 4-byte header, then exactly the payload
///
/// A packet larger than `capacity` (header included) is rejected. Its payload
/// is read and dropped so the stream stays on a packet boundary.
#[tracing::instrument(skip_all)]
pub fn read_packet<T: Transport + ?Sized>(transport: &mut T, capacity: usize) -> Result<Packet> {
    let mut header = PacketHeader::new_zeroed();
    transport.read_exact(header.as_mut_bytes())?;

    let length = header.length();
    if length + 4 > capacity {
        debug!(
            sequence_id = header.sequence_id,
            length, capacity, "discarding oversized packet"
        );
        discard(transport, length)?;
        return Err(Error::PacketTooLarge {
            length: length + 4,
            capacity,
        });
    }

    let mut payload = vec![0; length];
    transport.read_exact(&mut payload)?;

    debug!(
        sequence_id = header.sequence_id,
        length,
        kind = ?PacketKind::classify(&payload),
        "received packet"
    );
    Ok(Packet::new(header.sequence_id, payload))
}

fn discard<T: Transport + ?Sized>(transport: &mut T, mut remaining: usize) -> Result<()> {
    let mut scratch = [0; 256];
    while remaining > 0 {
        let n = remaining.min(scratch.len());
        let (chunk, _) = scratch.split_at_mut(n);
        transport.read_exact(chunk)?;
        remaining -= n;
    }
    Ok(())
}

/// Fill in the header reserved at the front of `buffer` and send it
///
/// `buffer` is laid out as `[4-byte header space][payload]`.
#[tracing::instrument(skip_all)]
pub fn write_payload<T: Transport + ?Sized>(
    transport: &mut T,
    sequence_id: u8,
    buffer: &mut [u8],
) -> Result<()> {
    let length = buffer.len().saturating_sub(4);
    if length > MAX_PAYLOAD_LENGTH {
        return Err(Error::QueryTooLarge {
            length: buffer.len(),
            capacity: MAX_PAYLOAD_LENGTH + 4,
        });
    }
    let header = PacketHeader::encode(length, sequence_id);
    let Some(space) = buffer.get_mut(..4) else {
        return Err(Error::LibraryBug(eyre!("write buffer has no header space")));
    };
    space.copy_from_slice(header.as_bytes());

    debug!(sequence_id, length, "sending packet");
    transport.write_all(buffer)?;
    transport.flush()?;
    Ok(())
}
