//! Finite field groups for DHE.
//!
//! The table is built once on first use and never changes. A client only
//! accepts server parameters that match an entry.

use once_cell::sync::Lazy;

use crate::types::NamedGroup;

/// A prime-order finite field group.
#[derive(Debug, PartialEq, Eq)]
pub struct DhGroup {
    pub name: &'static str,
    /// Codepoint when the group is also an RFC 7919 named group.
    pub named_group: Option<NamedGroup>,
    pub prime: Vec<u8>,
    pub generator: Vec<u8>,
}

const FFDHE2048_P: &str = "
    FFFFFFFF FFFFFFFF ADF85458 A2BB4A9A AFDC5620 273D3CF1
    D8B9C583 CE2D3695 A9E13641 146433FB CC939DCE 249B3EF9
    7D2FE363 630C75D8 F681B202 AEC4617A D3DF1ED5 D5FD6561
    2433F51F 5F066ED0 85636555 3DED1AF3 B557135E 7F57C935
    984F0C70 E0E68B77 E2A689DA F3EFE872 1DF158A1 36ADE735
    30ACCA4F 483A797A BC0AB182 B324FB61 D108A94B B2C8E3FB
    B96ADAB7 60D7F468 1D4F42A3 DE394DF4 AE56EDE7 6372BB19
    0B07A7C8 EE0A6D70 9E02FCE1 CDF7E2EC C03404CD 28342F61
    9172FE9C E98583FF 8E4F1232 EEF28183 C3FE3B1B 4C6FAD73
    3BB5FCBC 2EC22005 C58EF183 7D1683B2 C6F34A26 C1B2EFFA
    886B4238 61285C97 FFFFFFFF FFFFFFFF";

const MODP2048_P: &str = "
    FFFFFFFF FFFFFFFF C90FDAA2 2168C234 C4C6628B 80DC1CD1
    29024E08 8A67CC74 020BBEA6 3B139B22 514A0879 8E3404DD
    EF9519B3 CD3A431B 302B0A6D F25F1437 4FE1356D 6D51C245
    E485B576 625E7EC6 F44C42E9 A637ED6B 0BFF5CB6 F406B7ED
    EE386BFB 5A899FA5 AE9F2411 7C4B1FE6 49286651 ECE45B3D
    C2007CB8 A163BF05 98DA4836 1C55D39A 69163FA8 FD24CF5F
    83655D23 DCA3AD96 1C62F356 208552BB 9ED52907 7096966D
    670C354E 4ABC9804 F1746C08 CA18217C 32905E46 2E36CE3B
    E39E772C 180E8603 9B2783A2 EC07A28F B5C55DF0 6F4C52C9
    DE2BCBF6 95581718 3995497C EA956AE5 15D22618 98FA0510
    15728E5A 8AACAA68 FFFFFFFF FFFFFFFF";

fn decode_hex(s: &str) -> Vec<u8> {
    fn nibble(c: u8) -> u8 {
        match c {
            b'0'..=b'9' => c - b'0',
            b'A'..=b'F' => c - b'A' + 10,
            b'a'..=b'f' => c - b'a' + 10,
            _ => 0,
        }
    }
    let digits: Vec<u8> = s.bytes().filter(|c| c.is_ascii_hexdigit()).collect();
    digits
        .chunks(2)
        .map(|pair| (nibble(pair[0]) << 4) | nibble(*pair.get(1).unwrap_or(&b'0')))
        .collect()
}

static GROUPS: Lazy<Vec<DhGroup>> = Lazy::new(|| {
    vec![
        DhGroup {
            name: "ffdhe2048",
            named_group: Some(NamedGroup::Ffdhe2048),
            prime: decode_hex(FFDHE2048_P),
            generator: vec![2],
        },
        DhGroup {
            name: "modp2048",
            named_group: None,
            prime: decode_hex(MODP2048_P),
            generator: vec![2],
        },
    ]
});

/// All groups we offer and accept. The first one is what a server uses.
pub fn default_groups() -> &'static [DhGroup] {
    &GROUPS
}

/// RFC 7919 ffdhe2048.
pub fn ffdhe2048() -> &'static DhGroup {
    &GROUPS[0]
}

/// Look up server supplied parameters in the allow-list.
///
/// Leading zero bytes are not significant.
pub fn find(prime: &[u8], generator: &[u8]) -> Option<&'static DhGroup> {
    let p = trim_leading_zeros(prime);
    let g = trim_leading_zeros(generator);
    GROUPS
        .iter()
        .find(|grp| grp.prime == p && grp.generator == g)
}

fn trim_leading_zeros(v: &[u8]) -> &[u8] {
    let first = v.iter().position(|b| *b != 0).unwrap_or(v.len());
    &v[first..]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primes_are_2048_bits() {
        for g in default_groups() {
            assert_eq!(g.prime.len(), 256, "{}", g.name);
            assert_eq!(g.prime[0], 0xff);
            assert_eq!(g.prime[255], 0xff);
        }
    }

    #[test]
    fn allow_list_lookup() {
        let g = ffdhe2048();
        let mut padded = vec![0u8];
        padded.extend_from_slice(&g.prime);
        assert_eq!(find(&padded, &[2]), Some(g));
        assert_eq!(find(&g.prime, &[5]), None);
        assert_eq!(find(&[23], &[2]), None);
    }
}
