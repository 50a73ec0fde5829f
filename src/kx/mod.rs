//! Key exchange.
//!
//! A [`KeyExchange`] agrees the premaster secret for one legacy handshake.
//! The state machine asks it which optional messages the negotiated suite
//! needs and feeds it the peer's contributions. Operations an exchange does
//! not take fail the way a misuse of it should: `internal_error` when our
//! own state machine calls it, `unexpected_message` when the peer sent the
//! element.
//!
//! Signatures over the server parameters are the state machine's business.
//! The exchanges only see the key material.

use std::collections::HashMap;
use std::hash::BuildHasher;

use crate::crypto::Secret;
use crate::message::{ClientKeyExchange, ServerKeyExchange};
use crate::types::{KeyExchangeAlgorithm, NamedGroup};
use crate::{Config, Error};

mod dhe;
mod ecdhe;
mod psk;

pub(crate) use dhe::DheKeyExchange;
pub(crate) use ecdhe::EcdheKeyExchange;
pub(crate) use psk::PskKeyExchange;

/// Server side lookup of pre-shared keys by identity.
pub trait PskStore: Send + Sync {
    fn psk(&self, identity: &[u8]) -> Option<Vec<u8>>;
}

impl<S: BuildHasher + Send + Sync> PskStore for HashMap<Vec<u8>, Vec<u8>, S> {
    fn psk(&self, identity: &[u8]) -> Option<Vec<u8>> {
        self.get(identity).cloned()
    }
}

pub(crate) trait KeyExchange: Send {
    fn algorithm(&self) -> KeyExchangeAlgorithm;

    /// The server sends no Certificate (anonymous and PSK suites).
    fn skip_server_credentials(&mut self) -> Result<(), Error> {
        Err(Error::internal(format!(
            "{:?} needs server credentials",
            self.algorithm()
        )))
    }

    fn process_server_certificate(&mut self, _chain: &[Vec<u8>]) -> Result<(), Error> {
        Err(Error::unexpected(format!(
            "{:?} takes no server certificate",
            self.algorithm()
        )))
    }

    fn requires_server_key_exchange(&self) -> bool {
        false
    }

    /// The unsigned ServerKeyExchange.
    fn generate_server_key_exchange(&mut self) -> Result<ServerKeyExchange, Error> {
        Err(Error::internal(format!(
            "{:?} has no server key exchange",
            self.algorithm()
        )))
    }

    fn process_server_key_exchange(&mut self, _ske: &ServerKeyExchange) -> Result<(), Error> {
        Err(Error::unexpected(format!(
            "{:?} takes no server key exchange",
            self.algorithm()
        )))
    }

    /// The server sent ServerHelloDone without a ServerKeyExchange.
    fn skip_server_key_exchange(&mut self) -> Result<(), Error> {
        if self.requires_server_key_exchange() {
            return Err(Error::unexpected(format!(
                "{:?} requires a server key exchange",
                self.algorithm()
            )));
        }
        Ok(())
    }

    /// Whether a client certificate can be proven with CertificateVerify.
    fn requires_certificate_verify(&self) -> bool {
        false
    }

    fn generate_client_key_exchange(&mut self) -> Result<ClientKeyExchange, Error> {
        Err(Error::internal(format!(
            "{:?} cannot generate a client key exchange",
            self.algorithm()
        )))
    }

    fn process_client_key_exchange(&mut self, _cke: &ClientKeyExchange) -> Result<(), Error> {
        Err(Error::unexpected(format!(
            "{:?} takes no client key exchange",
            self.algorithm()
        )))
    }

    /// Consumes the ephemeral state.
    fn generate_pre_master_secret(&mut self) -> Result<Secret, Error> {
        Err(Error::internal(format!(
            "{:?} has no premaster secret",
            self.algorithm()
        )))
    }
}

/// Client side exchange for a suite the server selected.
pub(crate) fn client(kx: KeyExchangeAlgorithm, config: &Config) -> Result<Box<dyn KeyExchange>, Error> {
    use KeyExchangeAlgorithm::*;
    let provider = config.crypto_provider().clone();
    let exchange: Box<dyn KeyExchange> = match kx {
        EcdheEcdsa | EcdhAnon => Box::new(EcdheKeyExchange::client(
            provider,
            kx,
            config.named_groups().to_vec(),
        )),
        DheRsa | DhAnon => Box::new(DheKeyExchange::client(provider, kx)),
        Psk | DhePsk | EcdhePsk => Box::new(PskKeyExchange::client(provider, kx, config)?),
        Tls13 => return Err(Error::internal("TLS 1.3 has no legacy key exchange")),
    };
    Ok(exchange)
}

/// Server side exchange. `group` is the ECDHE group agreed through the
/// client's supported_groups, when the suite needs one.
pub(crate) fn server(
    kx: KeyExchangeAlgorithm,
    config: &Config,
    group: Option<NamedGroup>,
) -> Result<Box<dyn KeyExchange>, Error> {
    use KeyExchangeAlgorithm::*;
    let provider = config.crypto_provider().clone();
    let ecdhe_group = || group.ok_or_else(|| Error::internal("no ECDHE group chosen"));
    let exchange: Box<dyn KeyExchange> = match kx {
        EcdheEcdsa | EcdhAnon => Box::new(EcdheKeyExchange::server(provider, kx, ecdhe_group()?)),
        DheRsa | DhAnon => Box::new(DheKeyExchange::server(provider, kx, config.dh_group())),
        Psk | DhePsk => Box::new(PskKeyExchange::server(provider, kx, config, None)?),
        EcdhePsk => Box::new(PskKeyExchange::server(provider, kx, config, Some(ecdhe_group()?))?),
        Tls13 => return Err(Error::internal("TLS 1.3 has no legacy key exchange")),
    };
    Ok(exchange)
}

/// Map a provider failure during agreement. Bad peer values are the peer's fault.
fn agreement_failed(e: String) -> Error {
    Error::illegal_parameter(format!("key agreement failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::certificate::generate_self_signed_certificate;
    use crate::types::{AlertDescription, CipherSuite};

    #[test]
    fn hash_map_is_a_psk_store() {
        let mut m = HashMap::new();
        m.insert(b"id".to_vec(), vec![1, 2, 3]);
        let store: &dyn PskStore = &m;
        assert_eq!(store.psk(b"id"), Some(vec![1, 2, 3]));
        assert_eq!(store.psk(b"other"), None);
    }

    #[test]
    fn signed_exchange_rejects_peer_misuse() {
        let cert = generate_self_signed_certificate().unwrap();
        let config = Config::builder()
            .cipher_suites([CipherSuite::TLS_ECDHE_ECDSA_WITH_AES_128_GCM_SHA256])
            .certificate(cert.certificate, cert.private_key)
            .build()
            .unwrap();
        let mut kx = client(KeyExchangeAlgorithm::EcdheEcdsa, &config).unwrap();

        // A signed suite without a server Certificate is the peer's fault.
        let err = kx.skip_server_credentials().unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));

        let err = kx
            .process_client_key_exchange(&ClientKeyExchange::default())
            .unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));

        let err = kx.skip_server_key_exchange().unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::UnexpectedMessage));
    }

    /// Takes nothing, so every call lands on a default body.
    struct Bare;

    impl KeyExchange for Bare {
        fn algorithm(&self) -> KeyExchangeAlgorithm {
            KeyExchangeAlgorithm::EcdheEcdsa
        }
    }

    #[test]
    fn default_operations_classify_misuse() {
        let mut kx = Bare;
        let internal = Some(AlertDescription::InternalError);
        let unexpected = Some(AlertDescription::UnexpectedMessage);

        // Local calls the exchange cannot serve.
        assert_eq!(kx.skip_server_credentials().unwrap_err().alert(), internal);
        assert_eq!(kx.generate_server_key_exchange().unwrap_err().alert(), internal);
        assert_eq!(kx.generate_client_key_exchange().unwrap_err().alert(), internal);
        assert_eq!(kx.generate_pre_master_secret().unwrap_err().alert(), internal);

        // Peer elements it does not take.
        assert_eq!(kx.process_server_certificate(&[]).unwrap_err().alert(), unexpected);
        assert_eq!(
            kx.process_server_key_exchange(&ServerKeyExchange {
                psk_identity_hint: None,
                params: None,
                signature: None,
            })
                .unwrap_err()
                .alert(),
            unexpected
        );
        assert_eq!(
            kx.process_client_key_exchange(&ClientKeyExchange::default())
                .unwrap_err()
                .alert(),
            unexpected
        );

        assert!(!kx.requires_server_key_exchange());
        assert!(!kx.requires_certificate_verify());
        assert!(kx.skip_server_key_exchange().is_ok());
    }
}
