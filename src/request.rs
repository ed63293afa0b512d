//! Certificate-issuance request decoding.
//!
//! A request is a fixed sequence of wire fields; decoding is all-or-nothing
//! and no field is retried or defaulted. Two request formats exist (see
//! [`Protocol`]) and differ only in the authority-key-identifier field and
//! in how results are emitted.

use std::io::{Read, Write};

use log::error;

use crate::cert::extensions::{ExtKeyUsageSet, KeyUsageMask, SanEntry, SanType};
use crate::error::CertForgeError;
use crate::key::{DigestType, KeyType};
use crate::wire::{WireError, WireReader, WireWriter};

/// Request/response format variant.
///
/// The two variants coexist and diverge on purpose: `V1` always derives the
/// authority key identifier from the signing key (and omits it entirely for
/// self-signed certificates), emitting the certificate as raw PEM text.
/// `V2` carries explicit authority-key-identifier bytes in the request, has
/// no self-signed special case, and emits a structured binary response.
///
/// Serial numbers are one deliberate point of unification: both variants
/// draw 16 random bytes and trim leading zeros, so `V1` consumers must not
/// expect the fixed-width 20-byte serials its historical producer emitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Protocol {
    /// Legacy format: PEM output, derived authority key identifier.
    V1,
    /// Current format: DER synthesis, explicit authority-key-identifier
    /// bytes, structured response record.
    #[default]
    V2,
}

/// A decoded certificate-issuance request.
#[derive(Debug, Clone, PartialEq)]
pub struct CertRequest {
    pub protocol: Protocol,
    /// Issuer distinguished name; empty means the attribute is omitted.
    pub issuer: String,
    /// Subject distinguished name; empty means the attribute is omitted.
    pub subject: String,
    pub is_ca: bool,
    pub self_signed: bool,
    /// Explicit authority-key-identifier bytes (`V2` only). Empty means the
    /// identifier is derived from the signing key instead.
    pub authority_key_id: Vec<u8>,
    pub san: Vec<SanEntry>,
    pub key_type: KeyType,
    pub digest: DigestType,
    pub not_before: String,
    pub not_after: String,
    pub key_usage: KeyUsageMask,
    pub ext_key_usage: ExtKeyUsageSet,
}

fn input_err(what: &str, err: impl std::fmt::Display) -> CertForgeError {
    error!("Couldn't read {what}.");
    CertForgeError::ReadInput(format!("couldn't read {what}: {err}"))
}

fn read_text<R: Read>(r: &mut WireReader<R>, what: &str) -> Result<String, CertForgeError> {
    let bytes = r.read_string().map_err(|e| input_err(what, e))?;
    String::from_utf8(bytes).map_err(|e| input_err(what, e))
}

fn decode_san_list<R: Read>(r: &mut WireReader<R>) -> Result<Vec<SanEntry>, CertForgeError> {
    let count = r.read_uint().map_err(|e| input_err("SAN list count", e))?;

    let mut entries = Vec::new();
    for _ in 0..count {
        let raw_kind = r.read_uint().map_err(|e| input_err("SAN entry type", e))?;
        let kind = SanType::from_wire(raw_kind)
            .ok_or_else(|| input_err("SAN entry type", format!("unknown value {raw_kind}")))?;
        let value = r
            .read_string()
            .map_err(|e| input_err("SAN entry value", e))?;

        let value = match kind {
            SanType::Ip => SanEntry::parse_ip(&value).ok_or_else(|| {
                input_err("SAN entry value", "malformed IP address literal")
            })?,
            _ => value,
        };

        entries.push(SanEntry { kind, value });
    }

    Ok(entries)
}

impl CertRequest {
    /// Decodes a full request in strict field order. Any failure aborts the
    /// whole request with no partial side effects.
    pub fn decode<R: Read>(
        r: &mut WireReader<R>,
        protocol: Protocol,
    ) -> Result<Self, CertForgeError> {
        let issuer = read_text(r, "issuer string")?;
        let subject = read_text(r, "subject string")?;
        let is_ca = r.read_bool().map_err(|e| input_err("is-CA flag", e))?;
        let self_signed = r
            .read_bool()
            .map_err(|e| input_err("self-signed flag", e))?;

        let authority_key_id = match protocol {
            Protocol::V1 => Vec::new(),
            Protocol::V2 => r
                .read_string()
                .map_err(|e| input_err("authority key identifier", e))?,
        };

        let san = decode_san_list(r)?;

        let raw_key_type = r.read_uint().map_err(|e| input_err("key type", e))?;
        let key_type = KeyType::from_wire(raw_key_type)
            .ok_or_else(|| input_err("key type", format!("unknown value {raw_key_type}")))?;

        let raw_digest = r
            .read_uint()
            .map_err(|e| input_err("message digest type", e))?;
        let digest = DigestType::from_wire(raw_digest).ok_or_else(|| {
            input_err("message digest type", format!("unknown value {raw_digest}"))
        })?;

        let not_before = read_text(r, "notBefore string")?;
        let not_after = read_text(r, "notAfter string")?;

        let raw_ku = r.read_uint().map_err(|e| input_err("key usage", e))?;
        let key_usage = KeyUsageMask::from_wire(raw_ku)
            .ok_or_else(|| input_err("key usage", format!("invalid bits {raw_ku:#x}")))?;

        let raw_eku = r
            .read_uint()
            .map_err(|e| input_err("extended key usage", e))?;
        let ext_key_usage = ExtKeyUsageSet::from_wire(raw_eku)
            .ok_or_else(|| input_err("extended key usage", format!("invalid bits {raw_eku:#x}")))?;

        Ok(CertRequest {
            protocol,
            issuer,
            subject,
            is_ca,
            self_signed,
            authority_key_id,
            san,
            key_type,
            digest,
            not_before,
            not_after,
            key_usage,
            ext_key_usage,
        })
    }

    /// Encodes the request in the same field order the decoder expects.
    /// Binary IP addresses are written back as textual literals.
    pub fn encode<W: Write>(&self, w: &mut WireWriter<W>) -> Result<(), WireError> {
        w.write_string(&self.issuer)?;
        w.write_string(&self.subject)?;
        w.write_bool(self.is_ca)?;
        w.write_bool(self.self_signed)?;

        if self.protocol == Protocol::V2 {
            w.write_bytelen(&self.authority_key_id)?;
        }

        w.write_uint(self.san.len() as u32)?;
        for entry in &self.san {
            w.write_uint(entry.kind.to_wire())?;
            match entry.kind {
                SanType::Ip => {
                    let literal = match entry.value.len() {
                        4 => {
                            let mut octets = [0u8; 4];
                            octets.copy_from_slice(&entry.value);
                            std::net::IpAddr::from(octets).to_string()
                        }
                        16 => {
                            let mut octets = [0u8; 16];
                            octets.copy_from_slice(&entry.value);
                            std::net::IpAddr::from(octets).to_string()
                        }
                        len => {
                            return Err(WireError::Io(std::io::Error::new(
                                std::io::ErrorKind::InvalidInput,
                                format!("invalid binary IP length {len}"),
                            )));
                        }
                    };
                    w.write_string(&literal)?;
                }
                _ => w.write_bytelen(&entry.value)?,
            }
        }

        w.write_uint(self.key_type.to_wire())?;
        w.write_uint(self.digest.to_wire())?;
        w.write_string(&self.not_before)?;
        w.write_string(&self.not_after)?;
        w.write_uint(self.key_usage.bits())?;
        w.write_uint(self.ext_key_usage.bits())?;

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample(protocol: Protocol) -> CertRequest {
        CertRequest {
            protocol,
            issuer: "CN=Test CA,O=Example".to_string(),
            subject: "CN=server.example.com".to_string(),
            is_ca: false,
            self_signed: false,
            authority_key_id: match protocol {
                Protocol::V1 => Vec::new(),
                Protocol::V2 => vec![0x01, 0x02, 0x03],
            },
            san: vec![
                SanEntry {
                    kind: SanType::Dns,
                    value: b"server.example.com".to_vec(),
                },
                SanEntry {
                    kind: SanType::Ip,
                    value: vec![10, 1, 2, 3],
                },
                SanEntry {
                    kind: SanType::Email,
                    value: b"hostmaster@example.com".to_vec(),
                },
            ],
            key_type: KeyType::EcP384,
            digest: DigestType::Sha384,
            not_before: "20240101000000".to_string(),
            not_after: "20340101000000".to_string(),
            key_usage: KeyUsageMask::from_wire(
                KeyUsageMask::DIGITAL_SIGNATURE | KeyUsageMask::KEY_ENCIPHERMENT,
            )
            .unwrap(),
            ext_key_usage: ExtKeyUsageSet::from_wire(
                ExtKeyUsageSet::SERVER_AUTH | ExtKeyUsageSet::CLIENT_AUTH,
            )
            .unwrap(),
        }
    }

    fn encode_to_vec(request: &CertRequest) -> Vec<u8> {
        let mut w = WireWriter::new(Vec::new());
        request.encode(&mut w).unwrap();
        w.into_inner()
    }

    #[test]
    fn roundtrip_both_protocols() {
        for protocol in [Protocol::V1, Protocol::V2] {
            let request = sample(protocol);
            let buf = encode_to_vec(&request);
            let mut r = WireReader::new(&buf[..]);
            let decoded = CertRequest::decode(&mut r, protocol).unwrap();
            assert_eq!(decoded, request);
        }
    }

    #[test]
    fn roundtrip_with_empty_optional_fields() {
        let request = CertRequest {
            protocol: Protocol::V2,
            issuer: String::new(),
            subject: String::new(),
            is_ca: true,
            self_signed: true,
            authority_key_id: Vec::new(),
            san: Vec::new(),
            key_type: KeyType::EcP256,
            digest: DigestType::Sha256,
            not_before: "20240101000000".to_string(),
            not_after: "20340101000000".to_string(),
            key_usage: KeyUsageMask::default(),
            ext_key_usage: ExtKeyUsageSet::default(),
        };

        let buf = encode_to_vec(&request);
        let mut r = WireReader::new(&buf[..]);
        let decoded = CertRequest::decode(&mut r, Protocol::V2).unwrap();
        assert_eq!(decoded, request);
    }

    #[test]
    fn ipv6_san_roundtrip() {
        let mut request = sample(Protocol::V2);
        request.san = vec![SanEntry {
            kind: SanType::Ip,
            value: std::net::Ipv6Addr::LOCALHOST.octets().to_vec(),
        }];

        let buf = encode_to_vec(&request);
        let mut r = WireReader::new(&buf[..]);
        let decoded = CertRequest::decode(&mut r, Protocol::V2).unwrap();
        assert_eq!(decoded.san, request.san);
    }

    #[test]
    fn decode_is_all_or_nothing() {
        let request = sample(Protocol::V2);
        let buf = encode_to_vec(&request);

        // Every strict prefix must fail; only the full encoding decodes.
        for len in 0..buf.len() {
            let mut r = WireReader::new(&buf[..len]);
            assert!(
                CertRequest::decode(&mut r, Protocol::V2).is_err(),
                "prefix of {len} bytes unexpectedly decoded"
            );
        }

        let mut r = WireReader::new(&buf[..]);
        assert!(CertRequest::decode(&mut r, Protocol::V2).is_ok());
    }

    #[test]
    fn v1_does_not_consume_an_authority_key_id() {
        let request = sample(Protocol::V1);
        let buf = encode_to_vec(&request);

        // The same bytes decode differently under V2: the SAN count gets
        // consumed as the identifier length, desynchronizing the stream.
        let mut r = WireReader::new(&buf[..]);
        assert!(CertRequest::decode(&mut r, Protocol::V1).is_ok());
        let mut r = WireReader::new(&buf[..]);
        assert!(CertRequest::decode(&mut r, Protocol::V2).is_err());
    }

    #[test]
    fn unknown_enum_values_are_rejected() {
        let mut request = sample(Protocol::V2);
        request.san = Vec::new();
        let mut buf = encode_to_vec(&request);

        // key_usage and ext_key_usage are the last two uint32 fields; poke an
        // invalid bit into the extended-key-usage word.
        let len = buf.len();
        buf[len - 4..].copy_from_slice(&(1u32 << 7).to_le_bytes());
        let mut r = WireReader::new(&buf[..]);
        assert!(CertRequest::decode(&mut r, Protocol::V2).is_err());
    }

    #[test]
    fn encode_rejects_invalid_binary_ip_lengths() {
        let mut request = sample(Protocol::V2);
        request.san = vec![SanEntry {
            kind: SanType::Ip,
            value: vec![1, 2, 3],
        }];

        let mut w = WireWriter::new(Vec::new());
        assert!(matches!(
            request.encode(&mut w),
            Err(WireError::Io(_))
        ));
    }

    #[test]
    fn malformed_ip_literal_aborts_the_list() {
        let mut w = WireWriter::new(Vec::new());
        w.write_string("").unwrap();
        w.write_string("CN=x").unwrap();
        w.write_bool(false).unwrap();
        w.write_bool(true).unwrap();
        w.write_bytelen(&[]).unwrap();
        w.write_uint(1).unwrap(); // one SAN entry
        w.write_uint(1).unwrap(); // ip type
        w.write_string("999.999.999.999").unwrap();
        let buf = w.into_inner();

        let mut r = WireReader::new(&buf[..]);
        assert!(CertRequest::decode(&mut r, Protocol::V2).is_err());
    }
}
