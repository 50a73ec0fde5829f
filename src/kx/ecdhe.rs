use crate::crypto::{ActiveKeyExchange, CryptoProvider, Secret};
use crate::message::{ClientKeyExchange, ServerEcdhParams, ServerKeyExchange, ServerKeyParams};
use crate::types::{KeyExchangeAlgorithm, NamedGroup};
use crate::Error;

use super::{agreement_failed, KeyExchange};

/// Ephemeral elliptic curve Diffie-Hellman, signed (ECDHE_ECDSA) or
/// anonymous (ECDH_anon).
pub(crate) struct EcdheKeyExchange {
    provider: CryptoProvider,
    algorithm: KeyExchangeAlgorithm,
    /// Client: groups we accept from the server.
    acceptable: Vec<NamedGroup>,
    group: Option<NamedGroup>,
    local: Option<Box<dyn ActiveKeyExchange>>,
    peer_point: Option<Vec<u8>>,
}

impl EcdheKeyExchange {
    pub fn client(
        provider: CryptoProvider,
        algorithm: KeyExchangeAlgorithm,
        acceptable: Vec<NamedGroup>,
    ) -> Self {
        EcdheKeyExchange {
            provider,
            algorithm,
            acceptable,
            group: None,
            local: None,
            peer_point: None,
        }
    }

    pub fn server(provider: CryptoProvider, algorithm: KeyExchangeAlgorithm, group: NamedGroup) -> Self {
        EcdheKeyExchange {
            provider,
            algorithm,
            acceptable: vec![group],
            group: Some(group),
            local: None,
            peer_point: None,
        }
    }

    fn is_signed(&self) -> bool {
        self.algorithm.requires_server_certificate()
    }

    /// Generate our ephemeral key on the agreed group, returning the public point.
    pub(super) fn start(&mut self) -> Result<Vec<u8>, Error> {
        let group = self
            .group
            .ok_or_else(|| Error::internal("ECDHE group not agreed"))?;
        let kx_group = self
            .provider
            .kx_group(group)
            .ok_or_else(|| Error::internal(format!("provider lacks {}", group)))?;
        let local = kx_group.start_exchange().map_err(Error::internal)?;
        let point = local.pub_key().to_vec();
        self.local = Some(local);
        Ok(point)
    }

    pub(super) fn server_params(&mut self) -> Result<ServerKeyParams, Error> {
        let point = self.start()?;
        let group = self
            .group
            .ok_or_else(|| Error::internal("ECDHE group not agreed"))?;
        Ok(ServerKeyParams::Ecdh(ServerEcdhParams { group, point }))
    }

    pub(super) fn accept_server_params(&mut self, params: Option<&ServerKeyParams>) -> Result<(), Error> {
        let Some(ServerKeyParams::Ecdh(p)) = params else {
            return Err(Error::illegal_parameter("expected ECDH server params"));
        };
        if !self.acceptable.contains(&p.group) || self.provider.kx_group(p.group).is_none() {
            return Err(Error::illegal_parameter(format!(
                "server chose unoffered group {}",
                p.group
            )));
        }
        self.group = Some(p.group);
        self.peer_point = Some(p.point.clone());
        Ok(())
    }

    pub(super) fn accept_client_point(&mut self, public: Option<&Vec<u8>>) -> Result<(), Error> {
        let point = public.ok_or_else(|| Error::decode("client key exchange without point"))?;
        self.peer_point = Some(point.clone());
        Ok(())
    }

    /// The raw shared secret.
    pub(super) fn agree(&mut self) -> Result<Vec<u8>, Error> {
        let local = self
            .local
            .take()
            .ok_or_else(|| Error::internal("ECDHE key not generated"))?;
        let peer = self
            .peer_point
            .take()
            .ok_or_else(|| Error::internal("ECDHE peer point missing"))?;
        local.complete(&peer).map_err(agreement_failed)
    }
}

impl KeyExchange for EcdheKeyExchange {
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
            public: Some(self.start()?),
        })
    }

    fn process_client_key_exchange(&mut self, cke: &ClientKeyExchange) -> Result<(), Error> {
        self.accept_client_point(cke.public.as_ref())
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

    fn agree(group: NamedGroup) {
        let alg = KeyExchangeAlgorithm::EcdhAnon;
        let mut server = EcdheKeyExchange::server(default_provider(), alg, group);
        let mut client = EcdheKeyExchange::client(default_provider(), alg, vec![group]);

        server.skip_server_credentials().unwrap();
        client.skip_server_credentials().unwrap();

        let ske = server.generate_server_key_exchange().unwrap();
        client.process_server_key_exchange(&ske).unwrap();
        let cke = client.generate_client_key_exchange().unwrap();
        server.process_client_key_exchange(&cke).unwrap();

        let a = client.generate_pre_master_secret().unwrap();
        let b = server.generate_pre_master_secret().unwrap();
        assert_eq!(a.expose().unwrap(), b.expose().unwrap());
    }

    #[test]
    fn anonymous_agreement_on_every_group() {
        agree(NamedGroup::X25519);
        agree(NamedGroup::Secp256r1);
        agree(NamedGroup::Secp384r1);
    }

    #[test]
    fn unoffered_group_rejected() {
        let alg = KeyExchangeAlgorithm::EcdheEcdsa;
        let mut server = EcdheKeyExchange::server(default_provider(), alg, NamedGroup::Secp384r1);
        let mut client = EcdheKeyExchange::client(default_provider(), alg, vec![NamedGroup::X25519]);
        let ske = server.generate_server_key_exchange().unwrap();
        let err = client.process_server_key_exchange(&ske).unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::IllegalParameter));
    }

    #[test]
    fn signed_requires_certificate() {
        let mut client = EcdheKeyExchange::client(
            default_provider(),
            KeyExchangeAlgorithm::EcdheEcdsa,
            vec![NamedGroup::X25519],
        );
        assert!(client.skip_server_credentials().is_err());
        assert!(client.process_server_certificate(&[]).is_err());
        client.process_server_certificate(&[vec![0x30]]).unwrap();
        assert!(client.requires_certificate_verify());
    }

    #[test]
    fn garbage_point_is_illegal_parameter() {
        let alg = KeyExchangeAlgorithm::EcdhAnon;
        let mut server = EcdheKeyExchange::server(default_provider(), alg, NamedGroup::Secp256r1);
        server.generate_server_key_exchange().unwrap();
        server
            .process_client_key_exchange(&ClientKeyExchange {
                psk_identity: None,
                public: Some(vec![4, 1, 2, 3]),
            })
            .unwrap();
        let err = server.generate_pre_master_secret().unwrap_err();
        assert_eq!(err.alert(), Some(AlertDescription::IllegalParameter));
    }
}
