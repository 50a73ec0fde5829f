//! Handshake message model.
//!
//! Every message is an owned struct with a nom `parse` and a `serialize`
//! that writes through [`WireWrite`](crate::codec::WireWrite). Messages whose
//! layout depends on negotiated state take that state as a parse argument.

mod alert;
mod certificate;
mod certificate_request;
pub(crate) mod client_hello;
mod digitally_signed;
mod encrypted_extensions;
mod extensions;
mod finished;
pub(crate) mod handshake;
mod heartbeat;
mod hello_verify_request;
mod key_exchange;
mod key_update;
mod new_session_ticket;
pub(crate) mod random;
mod server_hello;

pub use alert::Alert;
pub use certificate::{Certificate, CertificateEntry};
pub use certificate_request::{CertificateRequest, CertificateRequest13};
pub use client_hello::ClientHello;
pub use digitally_signed::DigitallySigned;
pub use encrypted_extensions::EncryptedExtensions;
pub use extensions::{Extension, Extensions, KeyShareEntry};
pub use finished::Finished;
pub use handshake::{HandshakeHeader, DTLS_HEADER_LEN, TLS_HEADER_LEN};
pub(crate) use handshake::{encode_dtls, encode_dtls_fragment, encode_tls};
pub use heartbeat::HeartbeatMessage;
pub use hello_verify_request::HelloVerifyRequest;
pub use key_exchange::{ClientKeyExchange, ServerDhParams, ServerEcdhParams};
pub use key_exchange::{ServerKeyExchange, ServerKeyParams};
pub use key_update::KeyUpdate;
pub use new_session_ticket::{NewSessionTicket, NewSessionTicket13};
pub use random::Random;
pub use server_hello::ServerHello;
