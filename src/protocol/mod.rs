pub mod command;
pub mod connection;
pub mod packet;
pub mod primitive;
pub mod response;

pub use packet::{Packet, PacketHeader, PacketKind};
