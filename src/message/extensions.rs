//! Hello extension container and the typed extension bodies the engine uses.
//!
//! Unknown extensions are carried as opaque bytes and serialize back unchanged.

use nom::combinator::{all_consuming, verify};
use nom::multi::{length_data, many0};
use nom::number::complete::{be_u16, be_u8};
use nom::IResult;

use crate::codec::{opaque16, opaque8, parse_all, WireWrite};
use crate::types::{ExtensionType, HeartbeatMode, MaxFragmentLength, NamedGroup};
use crate::types::{ProtocolVersion, SignatureScheme};
use crate::Error;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Extension {
    pub extension_type: ExtensionType,
    pub data: Vec<u8>,
}

impl Extension {
    pub fn parse(input: &[u8]) -> IResult<&[u8], Extension> {
        let (input, extension_type) = ExtensionType::parse(input)?;
        let (input, data) = opaque16(input)?;
        Ok((
            input,
            Extension {
                extension_type,
                data: data.to_vec(),
            },
        ))
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.extension_type.serialize(out);
        out.put_opaque16(&self.data)
    }
}

/// One client key share (RFC 8446 4.2.8).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyShareEntry {
    pub group: NamedGroup,
    pub key_exchange: Vec<u8>,
}

impl KeyShareEntry {
    pub fn parse(input: &[u8]) -> IResult<&[u8], KeyShareEntry> {
        let (input, group) = NamedGroup::parse(input)?;
        let (input, key_exchange) = opaque16(input)?;
        Ok((
            input,
            KeyShareEntry {
                group,
                key_exchange: key_exchange.to_vec(),
            },
        ))
    }

    fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        self.group.serialize(out);
        out.put_opaque16(&self.key_exchange)
    }
}

const HOST_NAME: u8 = 0;

/// Ordered extension list without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Extensions(Vec<Extension>);

impl Extensions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Extension> {
        self.0.iter()
    }

    pub fn get(&self, t: ExtensionType) -> Option<&[u8]> {
        self.0
            .iter()
            .find(|e| e.extension_type == t)
            .map(|e| e.data.as_slice())
    }

    pub fn contains(&self, t: ExtensionType) -> bool {
        self.get(t).is_some()
    }

    /// Add an extension, replacing any earlier one of the same type.
    pub fn push(&mut self, t: ExtensionType, data: Vec<u8>) {
        if let Some(e) = self.0.iter_mut().find(|e| e.extension_type == t) {
            e.data = data;
        } else {
            self.0.push(Extension {
                extension_type: t,
                data,
            });
        }
    }

    /// `Extension extensions<0..2^16-1>`. Duplicate types fail the parse.
    pub fn parse(input: &[u8]) -> IResult<&[u8], Extensions> {
        let (input, block) = opaque16(input)?;
        let (_, list) = verify(all_consuming(many0(Extension::parse)), |l: &Vec<Extension>| {
            no_duplicates(l)
        })(block)?;
        Ok((input, Extensions(list)))
    }

    /// Hellos may omit the extension block entirely.
    pub fn parse_optional(input: &[u8]) -> IResult<&[u8], Extensions> {
        if input.is_empty() {
            return Ok((input, Extensions::new()));
        }
        Self::parse(input)
    }

    pub fn serialize(&self, out: &mut Vec<u8>) -> Result<(), Error> {
        out.put_vec16(|o| {
            for e in &self.0 {
                e.serialize(o)?;
            }
            Ok(())
        })
    }

    fn typed<'a, T>(
        &'a self,
        t: ExtensionType,
        parser: impl FnOnce(&'a [u8]) -> IResult<&'a [u8], T>,
    ) -> Result<Option<T>, Error> {
        match self.get(t) {
            Some(data) => Ok(Some(parse_all(data, "extension", parser)?)),
            None => Ok(None),
        }
    }

    pub fn set_flag(&mut self, t: ExtensionType) {
        self.push(t, Vec::new());
    }

    pub fn set_supported_groups(&mut self, groups: &[NamedGroup]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec16(|o| {
            groups.iter().for_each(|g| g.serialize(o));
            Ok(())
        })?;
        self.push(ExtensionType::SupportedGroups, d);
        Ok(())
    }

    pub fn supported_groups(&self) -> Result<Option<Vec<NamedGroup>>, Error> {
        self.typed(ExtensionType::SupportedGroups, |i| {
            u16_list(i, NamedGroup::parse)
        })
    }

    /// Only the uncompressed format is ever offered.
    pub fn set_ec_point_formats(&mut self) {
        self.push(ExtensionType::EcPointFormats, vec![1, 0]);
    }

    pub fn ec_point_formats(&self) -> Result<Option<Vec<u8>>, Error> {
        self.typed(ExtensionType::EcPointFormats, |i| {
            let (i, v) = verify(opaque8, |v: &[u8]| !v.is_empty())(i)?;
            Ok((i, v.to_vec()))
        })
    }

    pub fn set_signature_algorithms(&mut self, schemes: &[SignatureScheme]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec16(|o| {
            schemes.iter().for_each(|s| s.serialize(o));
            Ok(())
        })?;
        self.push(ExtensionType::SignatureAlgorithms, d);
        Ok(())
    }

    pub fn signature_algorithms(&self) -> Result<Option<Vec<SignatureScheme>>, Error> {
        self.typed(ExtensionType::SignatureAlgorithms, |i| {
            u16_list(i, SignatureScheme::parse)
        })
    }

    /// ClientHello form: a list of versions.
    pub fn set_supported_versions(&mut self, versions: &[ProtocolVersion]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec8(|o| {
            versions.iter().for_each(|v| v.serialize(o));
            Ok(())
        })?;
        self.push(ExtensionType::SupportedVersions, d);
        Ok(())
    }

    pub fn supported_versions(&self) -> Result<Option<Vec<ProtocolVersion>>, Error> {
        self.typed(ExtensionType::SupportedVersions, |i| {
            let (i, block) = verify(opaque8, |b: &[u8]| !b.is_empty() && b.len() % 2 == 0)(i)?;
            let (_, list) = all_consuming(many0(ProtocolVersion::parse))(block)?;
            Ok((i, list))
        })
    }

    /// ServerHello form: the single selected version.
    pub fn set_selected_version(&mut self, version: ProtocolVersion) {
        let mut d = Vec::new();
        version.serialize(&mut d);
        self.push(ExtensionType::SupportedVersions, d);
    }

    pub fn selected_version(&self) -> Result<Option<ProtocolVersion>, Error> {
        self.typed(ExtensionType::SupportedVersions, ProtocolVersion::parse)
    }

    /// ClientHello form.
    pub fn set_key_shares(&mut self, shares: &[KeyShareEntry]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec16(|o| {
            for s in shares {
                s.serialize(o)?;
            }
            Ok(())
        })?;
        self.push(ExtensionType::KeyShare, d);
        Ok(())
    }

    pub fn key_shares(&self) -> Result<Option<Vec<KeyShareEntry>>, Error> {
        self.typed(ExtensionType::KeyShare, |i| {
            let (i, block) = opaque16(i)?;
            let (_, list) = all_consuming(many0(KeyShareEntry::parse))(block)?;
            Ok((i, list))
        })
    }

    /// ServerHello form.
    pub fn set_key_share(&mut self, share: &KeyShareEntry) -> Result<(), Error> {
        let mut d = Vec::new();
        share.serialize(&mut d)?;
        self.push(ExtensionType::KeyShare, d);
        Ok(())
    }

    pub fn key_share(&self) -> Result<Option<KeyShareEntry>, Error> {
        self.typed(ExtensionType::KeyShare, KeyShareEntry::parse)
    }

    /// HelloRetryRequest form: just the group.
    pub fn set_selected_group(&mut self, group: NamedGroup) {
        let mut d = Vec::new();
        group.serialize(&mut d);
        self.push(ExtensionType::KeyShare, d);
    }

    pub fn selected_group(&self) -> Result<Option<NamedGroup>, Error> {
        self.typed(ExtensionType::KeyShare, NamedGroup::parse)
    }

    pub fn set_cookie(&mut self, cookie: &[u8]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_opaque16(cookie)?;
        self.push(ExtensionType::Cookie, d);
        Ok(())
    }

    pub fn cookie(&self) -> Result<Option<Vec<u8>>, Error> {
        self.typed(ExtensionType::Cookie, |i| {
            let (i, c) = verify(opaque16, |c: &[u8]| !c.is_empty())(i)?;
            Ok((i, c.to_vec()))
        })
    }

    pub fn set_server_name(&mut self, host: &str) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec16(|o| {
            o.put_u8(HOST_NAME);
            o.put_opaque16(host.as_bytes())
        })?;
        self.push(ExtensionType::ServerName, d);
        Ok(())
    }

    /// The first host_name entry.
    pub fn server_name(&self) -> Result<Option<String>, Error> {
        let names = self.typed(ExtensionType::ServerName, |i| {
            let (i, block) = opaque16(i)?;
            let (_, list) = all_consuming(many0(server_name_entry))(block)?;
            Ok((i, list))
        })?;
        Ok(names.and_then(|list| {
            list.into_iter()
                .find(|(t, _)| *t == HOST_NAME)
                .map(|(_, n)| String::from_utf8_lossy(n).into_owned())
        }))
    }

    pub fn set_max_fragment_length(&mut self, mfl: MaxFragmentLength) {
        self.push(ExtensionType::MaxFragmentLength, vec![mfl.value()]);
    }

    pub fn max_fragment_length(&self) -> Result<Option<MaxFragmentLength>, Error> {
        self.typed(ExtensionType::MaxFragmentLength, MaxFragmentLength::parse)
    }

    pub fn set_heartbeat(&mut self, mode: HeartbeatMode) {
        self.push(ExtensionType::Heartbeat, vec![mode.value()]);
    }

    pub fn heartbeat(&self) -> Result<Option<HeartbeatMode>, Error> {
        self.typed(ExtensionType::Heartbeat, HeartbeatMode::parse)
    }

    pub fn set_alpn(&mut self, protocols: &[Vec<u8>]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_vec16(|o| {
            for p in protocols {
                o.put_opaque8(p)?;
            }
            Ok(())
        })?;
        self.push(ExtensionType::ApplicationLayerProtocolNegotiation, d);
        Ok(())
    }

    pub fn alpn(&self) -> Result<Option<Vec<Vec<u8>>>, Error> {
        self.typed(ExtensionType::ApplicationLayerProtocolNegotiation, |i| {
            let (i, block) = verify(opaque16, |b: &[u8]| !b.is_empty())(i)?;
            let name = verify(opaque8, |n: &[u8]| !n.is_empty());
            let (_, list) = all_consuming(many0(name))(block)?;
            Ok((i, list.into_iter().map(|n| n.to_vec()).collect()))
        })
    }

    pub fn set_renegotiation_info(&mut self, verify_data: &[u8]) -> Result<(), Error> {
        let mut d = Vec::new();
        d.put_opaque8(verify_data)?;
        self.push(ExtensionType::RenegotiationInfo, d);
        Ok(())
    }

    pub fn renegotiation_info(&self) -> Result<Option<Vec<u8>>, Error> {
        self.typed(ExtensionType::RenegotiationInfo, |i| {
            let (i, v) = opaque8(i)?;
            Ok((i, v.to_vec()))
        })
    }
}

fn no_duplicates(list: &[Extension]) -> bool {
    list.iter().enumerate().all(|(n, e)| {
        list[..n]
            .iter()
            .all(|prev| prev.extension_type != e.extension_type)
    })
}

fn server_name_entry(input: &[u8]) -> IResult<&[u8], (u8, &[u8])> {
    let (input, name_type) = be_u8(input)?;
    let (input, name) = opaque16(input)?;
    Ok((input, (name_type, name)))
}

/// A non-empty `T list<2..2^16-2>` of two-byte values.
fn u16_list<T>(
    input: &[u8],
    item: impl FnMut(&[u8]) -> IResult<&[u8], T>,
) -> IResult<&[u8], Vec<T>> {
    let (input, block) = verify(length_data(be_u16), |b: &[u8]| {
        !b.is_empty() && b.len() % 2 == 0
    })(input)?;
    let (_, list) = all_consuming(many0(item))(block)?;
    Ok((input, list))
}
