mod conn;
mod stream;

pub use conn::{Conn, SessionState};
pub use stream::{TcpTransport, Transport, read_packet, write_payload};
