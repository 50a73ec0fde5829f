use crate::crypto::dh_groups::{self, DhGroup};
use crate::crypto::{CryptoProvider, FiniteFieldExchange, Secret};
use crate::message::{ClientKeyExchange, ServerDhParams, ServerKeyExchange, ServerKeyParams};
use crate::types::KeyExchangeAlgorithm;
use crate::Error;

use super::{agreement_failed, KeyExchange};

/// Ephemeral finite field Diffie-Hellman, signed (DHE_RSA) or anonymous
/// (DH_anon). Clients only accept groups from the built-in table.
pub(crate) struct DheKeyExchange {
    provider: CryptoProvider,
    algorithm: KeyExchangeAlgorithm,
    group: Option<&'static DhGroup>,
    local: Option<Box<dyn FiniteFieldExchange>>,
    peer_public: Option<Vec<u8>>,
}

impl DheKeyExchange {
    pub fn client(provider: CryptoProvider, algorithm: KeyExchangeAlgorithm) -> Self {
        DheKeyExchange {
            provider,
            algorithm,
            group: None,
            local: None,
            peer_public: None,
        }
    }

    pub fn server(provider: CryptoProvider, algorithm: KeyExchangeAlgorithm, group: &'static DhGroup) -> Self {
        DheKeyExchange {
            provider,
            algorithm,
            group: Some(group),
            local: None,
            peer_public: None,
        }
    }

    fn is_signed(&self) -> bool {
        self.algorithm.requires_server_certificate()
    }

    fn start(&mut self) -> Result<Vec<u8>, Error> {
        let group = self.group.ok_or_else(|| Error::internal("DH group not agreed"))?;
        let local = self
            .provider
            .dh
            .start_exchange(&group.prime, &group.generator)
            .map_err(Error::internal)?;
        let public = local.pub_key().to_vec();
        self.local = Some(local);
        Ok(public)
    }

    pub(super) fn server_params(&mut self) -> Result<ServerKeyParams, Error> {
        let ys = self.start()?;
        let group = self.group.ok_or_else(|| Error::internal("DH group not agreed"))?;
        Ok(ServerKeyParams::Dh(ServerDhParams {
            p: group.prime.clone(),
            g: group.generator.clone(),
            ys,
        }))
    }

    pub(super) fn accept_server_params(&mut self, params: Option<&ServerKeyParams>) -> Result<(), Error> {
        let Some(ServerKeyParams::Dh(p)) = params else {
            return Err(Error::illegal_parameter("expected DH server params"));
        };
        let group = dh_groups::find(&p.p, &p.g).ok_or_else(|| {
            Error::insufficient_security(format!(
                "server DH group ({} bit prime) not in the allow-list",
                p.p.len() * 8
            ))
        })?;
        debug!("Server DH group {}", group.name);
        self.group = Some(group);
        self.peer_public = Some(p.ys.clone());
        Ok(())
    }

    pub(super) fn accept_client_public(&mut self, public: Option<&Vec<u8>>) -> Result<(), Error> {
        let yc = public.ok_or_else(|| Error::decode("client key exchange without Yc"))?;
        self.peer_public = Some(yc.clone());
        Ok(())
    }

    pub(super) fn agree(&mut self) -> Result<Vec<u8>, Error> {
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::internal("DH key not generated"))?;
        let peer = self
            .peer_public
            .take()
            .ok_or_else(|| Error::internal("DH peer value missing"))?;
        local.complete(&peer).map_err(agreement_failed)
    }

    pub(super) fn client_public(&mut self) -> Result<Vec<u8>, Error> {
        self.start()
    }
}

impl KeyExchange for DheKeyExchange {
    fn algorithm(&self) -> KeyExchangeAlgorithm {
        self.algorithm
    }

    fn skip_server_credentials(&mut self) -> Result<(), Error> {
        if self.is_signed() {
            return Err(Error::unexpected("server certificate required"));
        }
        Ok(())
    }

    fn process_server_certificate(&mut self, chain: &[Vec<u8>]) -> Result<(), Error> {
        if !self.is_signed() {
            return Err(Error::unexpected("anonymous suite got a certificate"));
        }
        if chain.is_empty() {
            return Err(Error::bad_certificate("empty server certificate"));
        }
        Ok(())
    }

    fn requires_server_key_exchange(&self) -> bool {
        true
    }

    fn generate_server_key_exchange(&mut self) -> Result<ServerKeyExchange, Error> {
        Ok(ServerKeyExchange {
            psk_identity_hint: None,
            params: Some(self.server_params()?),
            signature: None,
        })
    }

    fn process_server_key_exchange(&mut self, ske: &ServerKeyExchange) -> Result<(), Error> {
        self.accept_server_params(ske.params.as_ref())
    }

    fn requires_certificate_verify(&self) -> bool {
        self.is_signed()
    }

    fn generate_client_key_exchange(&mut self) -> Result<ClientKeyExchange, Error> {
        Ok(ClientKeyExchange {
            psk_identity: None,
            public: Some(self.client_public()?),
        })
    }

    fn process_client_key_exchange(&mut self, cke: &ClientKeyExchange) -> Result<(), Error> {
        self.accept_client_public(cke.public.as_ref())
    }

    fn generate_pre_master_secret(&mut self) -> Result<Secret, Error> {
        Ok(Secret::new(self.agree()?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crypto::rust_crypto::default_provider;
    use crate::types::AlertDescription;

    #[test]
    fn anonymous_agreement() {
        let alg = KeyExchangeAlgorithm::DhAnon;
        let mut server = DheKeyExchange::server(default_provider(), alg, dh_groups::ffdhe2048());
        let mut client = DheKeyExchange::client(default_provider(), alg);

        let ske = server.generate_server_key_exchange().unwrap();
        client.process_server_key_exchange(&ske).unwrap();
        let cke = client.generate_client_key_exchange().unwrap();
        server.process_client_key_exchange(&cke).unwrap();

        let a = client.generate_pre_master_secret().unwrap();
        let b = server.generate_pre_master_secret().unwrap();
        assert_eq!(a.expose().unwrap(), b.expose().unwrap());
    }

    #[test]
    fn unknown_group_is_insufficient_security() {
        let mut client = DheKeyExchange::client(default_provider(), KeyExchangeAlgorithm::DheRsa);
        let ske = ServerKeyExchange {
            psk_identity_hint: None,
            params: Some(ServerKeyParams::Dh(ServerDhParams {
                p: vec![0xfb; 256],
                g: vec![2],
                ys: vec![3; 256],
            })),
            signature: None,
        };
        let err = client.process_server_key_exchange(&ske).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::InsufficientSecurity));
    }
}
