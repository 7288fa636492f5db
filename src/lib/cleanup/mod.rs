pub mod cleanup;
pub mod sockets;
pub mod types;
