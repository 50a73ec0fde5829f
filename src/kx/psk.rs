use std::sync::Arc;

use crate::crypto::{CryptoProvider, Secret};
use crate::message::{ClientKeyExchange, ServerKeyExchange};
use crate::types::{KeyExchangeAlgorithm, NamedGroup};
use crate::{Config, Error};

use super::{DheKeyExchange, EcdheKeyExchange, KeyExchange, PskStore};

/// The ephemeral half of DHE_PSK and ECDHE_PSK.
enum Ephemeral {
    None,
    Dh(DheKeyExchange),
    Ecdh(EcdheKeyExchange),
}

/// Pre-shared key exchanges (RFC 4279, RFC 5489).
///
/// premaster = `opaque other<..> || opaque psk<..>` where `other` is the
/// (EC)DH shared secret, or zeroes as long as the key for plain PSK.
pub(crate) struct PskKeyExchange {
    algorithm: KeyExchangeAlgorithm,
    ephemeral: Ephemeral,
    /// Client: our identity and key.
    identity: Option<Vec<u8>>,
    psk: Option<Secret>,
    /// Server: lookup and the hint we send.
    store: Option<Arc<dyn PskStore>>,
    hint: Option<Vec<u8>>,
}

impl PskKeyExchange {
    pub fn client(provider: CryptoProvider, algorithm: KeyExchangeAlgorithm, config: &Config) -> Result<Self, Error> {
        let (Some(identity), Some(psk)) = (config.psk_identity(), config.psk()) else {
            return Err(Error::internal("PSK suite without a configured key"));
        };
        let ephemeral = match algorithm {
            KeyExchangeAlgorithm::DhePsk => Ephemeral::Dh(DheKeyExchange::client(provider, algorithm)),
            KeyExchangeAlgorithm::EcdhePsk => Ephemeral::Ecdh(EcdheKeyExchange::client(
                provider,
                algorithm,
                config.named_groups().to_vec(),
            )),
            _ => Ephemeral::None,
        };
        Ok(PskKeyExchange {
            algorithm,
            ephemeral,
            identity: Some(identity.to_vec()),
            psk: Some(psk.clone()),
            store: None,
            hint: None,
        })
    }

    pub fn server(
        provider: CryptoProvider,
        algorithm: KeyExchangeAlgorithm,
        config: &Config,
        group: Option<NamedGroup>,
    ) -> Result<Self, Error> {
        let store = config
            .psk_store()
            .cloned()
            .ok_or_else(|| Error::internal("PSK suite without a key store"))?;
        let ephemeral = match (algorithm, group) {
            (KeyExchangeAlgorithm::DhePsk, _) => {
                Ephemeral::Dh(DheKeyExchange::server(provider, algorithm, config.dh_group()))
            }
            (KeyExchangeAlgorithm::EcdhePsk, Some(g)) => {
                Ephemeral::Ecdh(EcdheKeyExchange::server(provider, algorithm, g))
            }
            (KeyExchangeAlgorithm::EcdhePsk, None) => {
                return Err(Error::internal("ECDHE_PSK without a group"))
            }
            _ => Ephemeral::None,
        };
        Ok(PskKeyExchange {
            algorithm,
            ephemeral,
            identity: None,
            psk: None,
            store: Some(store),
            hint: config.psk_identity_hint().map(|h| h.to_vec()),
        })
    }
}

impl KeyExchange for PskKeyExchange {
    fn algorithm(&self) -> KeyExchangeAlgorithm {
        self.algorithm
    }

    fn skip_server_credentials(&mut self) -> Result<(), Error> {
        Ok(())
    }

    /// Plain PSK only sends one to carry a hint.
    fn requires_server_key_exchange(&self) -> bool {
        !matches!(self.ephemeral, Ephemeral::None) || self.hint.is_some()
    }

    fn generate_server_key_exchange(&mut self) -> Result<ServerKeyExchange, Error> {
        let params = match &mut self.ephemeral {
            Ephemeral::None => None,
            Ephemeral::Dh(d) => Some(d.server_params()?),
            Ephemeral::Ecdh(e) => Some(e.server_params()?),
        };
        Ok(ServerKeyExchange {
            psk_identity_hint: Some(self.hint.clone().unwrap_or_default()),
            params,
            signature: None,
        })
    }

    fn process_server_key_exchange(&mut self, ske: &ServerKeyExchange) -> Result<(), Error> {
        if let Some(hint) = &ske.psk_identity_hint {
            if !hint.is_empty() {
                debug!("PSK identity hint of {} bytes", hint.len());
            }
        }
        match &mut self.ephemeral {
            Ephemeral::None => Ok(()),
            Ephemeral::Dh(d) => d.accept_server_params(ske.params.as_ref()),
            Ephemeral::Ecdh(e) => e.accept_server_params(ske.params.as_ref()),
        }
    }

    fn generate_client_key_exchange(&mut self) -> Result<ClientKeyExchange, Error> {
        let public = match &mut self.ephemeral {
            Ephemeral::None => None,
            Ephemeral::Dh(d) => Some(d.client_public()?),
            Ephemeral::Ecdh(e) => Some(e.start()?),
        };
        Ok(ClientKeyExchange {
            psk_identity: self.identity.clone(),
            public,
        })
    }

    fn process_client_key_exchange(&mut self, cke: &ClientKeyExchange) -> Result<(), Error> {
        let identity = cke
            .psk_identity
            .as_ref()
            .ok_or_else(|| Error::decode("missing PSK identity"))?;
        let store = self
            .store
            .as_ref()
            .ok_or_else(|| Error::internal("client side PSK exchange got a client key exchange"))?;
        let key = store.psk(identity).ok_or_else(|| {
            Error::unknown_psk_identity(format!(
                "unknown identity {}",
                String::from_utf8_lossy(identity)
            ))
        })?;
        self.identity = Some(identity.clone());
        self.psk = Some(Secret::new(key));

        match &mut self.ephemeral {
            Ephemeral::None => Ok(()),
            Ephemeral::Dh(d) => d.accept_client_public(cke.public.as_ref()),
            Ephemeral::Ecdh(e) => e.accept_client_point(cke.public.as_ref()),
        }
    }

    fn generate_pre_master_secret(&mut self) -> Result<Secret, Error> {
        let mut psk = self
            .psk
            .take()
            .ok_or_else(|| Error::internal("PSK not established"))?;
        let key = psk.expose()?;

        let mut other = match &mut self.ephemeral {
            Ephemeral::None => Secret::new(vec![0; key.len()]),
            Ephemeral::Dh(d) => Secret::new(d.agree()?),
            Ephemeral::Ecdh(e) => Secret::new(e.agree()?),
        };

        let mut pms = Vec::with_capacity(4 + other.len() + key.len());
        let other_bytes = other.expose()?;
        pms.extend_from_slice(&(other_bytes.len() as u16).to_be_bytes());
        pms.extend_from_slice(other_bytes);
        pms.extend_from_slice(&(key.len() as u16).to_be_bytes());
        pms.extend_from_slice(key);

        other.destroy();
        psk.destroy();
        Ok(Secret::new(pms))
    }
}
