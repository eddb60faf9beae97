use crate::protocol::packet::Packet;

/// The buffers owned by one session
///
/// `Conn` uses a single `BufferSet` for all its operations and never shares it.
#[derive(Debug)]
pub struct BufferSet {
    /// General-purpose write buffer
    /// It always has at least 4 bytes which is reserved for the packet header.
    /// Layout: [4-byte header space][payload]
    /// Bytes are valid during an operation.
    write_buffer: Vec<u8>,

    /// Packets received for the command in flight
    /// Cleared at the start and end of every command and on every error.
    pub packets: Vec<Packet>,

    /// Largest packet, header included, that may be sent or received
    capacity: usize,
}

impl BufferSet {
    /// Create a new empty buffer set
    pub fn new(capacity: usize) -> Self {
        Self {
            write_buffer: vec![0; 4],
            packets: Vec::new(),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Clear the write buffer, reserve 4 bytes for the header, and return mutable access.
    #[inline]
    pub fn new_write_buffer(&mut self) -> &mut Vec<u8> {
        self.write_buffer.clear();
        self.write_buffer.extend_from_slice(&[0u8; 4]);
        &mut self.write_buffer
    }

    /// Get mutable access to the write buffer.
    #[inline]
    pub fn write_buffer_mut(&mut self) -> &mut Vec<u8> {
        &mut self.write_buffer
    }

    /// Drop the packets of the previous command, keeping their allocation
    pub fn clear_packets(&mut self) {
        self.packets.clear();
    }
}
