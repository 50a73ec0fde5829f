use std::io;

use thiserror::Error;

use crate::types::AlertDescription;

/// Errors surfaced by a [`Connection`](crate::Connection).
///
/// Every protocol failure is classified into the alert that goes on the wire.
/// Timeouts and local conditions are kept separate since they never produce
/// an alert.
#[derive(Debug, Error)]
pub enum Error {
    /// A locally detected fatal condition. The description is sent to the peer.
    #[error("fatal alert {description}: {reason}")]
    Alert {
        description: AlertDescription,
        reason: String,
    },

    /// The peer sent a fatal alert.
    #[error("peer sent fatal alert {0}")]
    PeerAlert(AlertDescription),

    /// Handshake or heartbeat timer expired.
    #[error("timeout: {0}")]
    Timeout(&'static str),

    /// The connection is closed, either gracefully or after a failure.
    #[error("connection is closed")]
    Closed,

    /// Invalid configuration.
    #[error("config error: {0}")]
    Config(String),

    /// Transport error in blocking mode.
    #[error("transport: {0}")]
    Io(#[from] io::Error),

    /// Too many buffered incoming datagrams.
    #[error("receive queue full")]
    ReceiveQueueFull,

    /// Too much outgoing data buffered.
    #[error("transmit queue full")]
    TransmitQueueFull,
}

macro_rules! alert_ctor {
    ($(#[$m:meta])* $fn:ident, $desc:ident) => {
        $(#[$m])*
        pub(crate) fn $fn(reason: impl Into<String>) -> Error {
            Error::Alert {
                description: AlertDescription::$desc,
                reason: reason.into(),
            }
        }
    };
}

impl Error {
    alert_ctor!(decode, DecodeError);
    alert_ctor!(unexpected, UnexpectedMessage);
    alert_ctor!(illegal_parameter, IllegalParameter);
    alert_ctor!(handshake_failure, HandshakeFailure);
    alert_ctor!(
        /// A bug in the state machine or its caller, not a peer fault.
        internal,
        InternalError
    );
    alert_ctor!(bad_record_mac, BadRecordMac);
    alert_ctor!(record_overflow, RecordOverflow);
    alert_ctor!(decrypt_error, DecryptError);
    alert_ctor!(bad_certificate, BadCertificate);
    alert_ctor!(insufficient_security, InsufficientSecurity);
    alert_ctor!(unknown_psk_identity, UnknownPskIdentity);
    alert_ctor!(protocol_version, ProtocolVersion);
    alert_ctor!(missing_extension, MissingExtension);
    alert_ctor!(unsupported_extension, UnsupportedExtension);

    /// The alert to send to the peer for this error, if any.
    pub fn alert(&self) -> Option<AlertDescription> {
        match self {
            Error::Alert { description, .. } => Some(*description),
            _ => None,
        }
    }

    /// Whether the error is a timeout rather than a protocol failure.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Error::Timeout(_))
    }
}

impl<I> From<nom::Err<nom::error::Error<I>>> for Error {
    fn from(value: nom::Err<nom::error::Error<I>>) -> Self {
        let kind = match value {
            nom::Err::Incomplete(_) => "incomplete".to_string(),
            nom::Err::Error(e) | nom::Err::Failure(e) => format!("{:?}", e.code),
        };
        Error::decode(format!("parse failed: {kind}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nom_errors_are_decode_errors() {
        let r: nom::IResult<&[u8], u16> = nom::number::complete::be_u16(&[1u8][..]);
        let err: Error = r.unwrap_err().into();
        assert_eq!(err.alert(), Some(AlertDescription::DecodeError));
    }

    #[test]
    fn timeout_carries_no_alert() {
        let err = Error::Timeout("handshake");
        assert!(err.is_timeout());
        assert_eq!(err.alert(), None);
    }
}
