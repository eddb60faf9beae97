mod handshake;

pub use handshake::AuthSwitchRequest;
pub use handshake::Handshake;
pub use handshake::HandshakeConfig;
pub use handshake::HandshakeResponse41;
pub use handshake::HandshakeResult;
pub use handshake::InitialHandshake;
pub use handshake::MYSQL_NATIVE_PASSWORD;
pub use handshake::Scramble;
pub use handshake::read_auth_switch_request;
pub use handshake::read_initial_handshake;
pub use handshake::scramble_password;
pub use handshake::write_handshake_response;
