mod common;

mod handshake;
mod heartbeat;
mod retransmit;
