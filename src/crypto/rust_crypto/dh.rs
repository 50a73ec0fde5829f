//! Finite field Diffie-Hellman using num-bigint.

use num_bigint::{BigUint, RandBigInt};
use rand::rngs::OsRng;

use crate::crypto::provider::{DhProvider, FiniteFieldExchange};

/// Private exponent size. Comfortably above the 225 bits RFC 7919 asks
/// for with 2048-bit groups.
const EXPONENT_BITS: u64 = 256;

struct DhExchange {
    prime: BigUint,
    private: BigUint,
    public_key: Vec<u8>,
}

impl std::fmt::Debug for DhExchange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DhExchange")
            .field("prime_bits", &self.prime.bits())
            .finish_non_exhaustive()
    }
}

impl FiniteFieldExchange for DhExchange {
    fn pub_key(&self) -> &[u8] {
        &self.public_key
    }

    fn complete(self: Box<Self>, peer_pub: &[u8]) -> Result<Vec<u8>, String> {
        let y = BigUint::from_bytes_be(peer_pub);
        let one = BigUint::from(1u8);
        let p_minus_one = &self.prime - &one;
        // Reject 0, 1 and p-1 which would force a predictable secret.
        if y <= one || y >= p_minus_one {
            return Err("DH public value out of range".to_string());
        }
        let z = y.modpow(&self.private, &self.prime);
        if z <= one {
            return Err("DH shared secret is degenerate".to_string());
        }
        Ok(z.to_bytes_be())
    }
}

#[derive(Debug)]
pub(super) struct RustCryptoDhProvider;

impl DhProvider for RustCryptoDhProvider {
    fn start_exchange(
        &self,
        prime: &[u8],
        generator: &[u8],
    ) -> Result<Box<dyn FiniteFieldExchange>, String> {
        let p = BigUint::from_bytes_be(prime);
        let g = BigUint::from_bytes_be(generator);
        if p.bits() < 512 || g <= BigUint::from(1u8) || g >= p {
            return Err("Invalid DH parameters".to_string());
        }

        let bits = EXPONENT_BITS.min(p.bits() - 1);
        let private = OsRng.gen_biguint(bits) | BigUint::from(1u8) << (bits - 1);
        let public_key = g.modpow(&private, &p).to_bytes_be();

        Ok(Box::new(DhExchange {
            prime: p,
            private,
            public_key,
        }))
    }
}

pub(super) static DH_PROVIDER: RustCryptoDhProvider = RustCryptoDhProvider;
