mod common;

mod blocking;
mod edge;
mod handshake;
mod resumption;
mod tls13;
