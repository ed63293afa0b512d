//! In-memory models for the extensions carried by an issuance request, and
//! their encoded X.509 forms.
//!
//! Key usage and extended key usage arrive as fixed bitmasks validated
//! against their defined bits; the extended-key-usage mask materializes into
//! an ordered OID sequence whose order is the literal extension encoding
//! order. SAN entries arrive typed, with IP literals parsed to their 4- or
//! 16-byte binary form at decode time.

use const_oid::AssociatedOid;
use der::{
    Encode,
    asn1::{Ia5String, OctetString},
    flagset::FlagSet,
    oid::ObjectIdentifier,
};
use x509_cert::ext::Extension;
use x509_cert::ext::pkix::name::GeneralName;
use x509_cert::ext::pkix::{KeyUsage as X509KeyUsage, KeyUsages};

use crate::error::{CertField, CertForgeError};

/// OID for the anyExtendedKeyUsage purpose (2.5.29.37.0).
pub const ANY_EXTENDED_KEY_USAGE: ObjectIdentifier =
    ObjectIdentifier::new_unwrap("2.5.29.37.0");

/// Trait for encoding a model into an X.509 extension value.
///
/// Mirrors the shape of `x509_cert::ext::AsExtension` but reports failures
/// through the per-field error taxonomy instead of raw DER errors.
pub trait ToX509Extension {
    /// The Object Identifier (OID) for the extension.
    const OID: ObjectIdentifier;

    /// The certificate field this extension maps to when encoding fails.
    const FIELD: CertField;

    /// Encodes the extension into a DER-encoded byte vector.
    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError>;

    /// Builds the full extension record with the given criticality.
    fn to_extension(&self, critical: bool) -> Result<Extension, CertForgeError> {
        let value = self.to_extension_value()?;
        Ok(Extension {
            extn_id: Self::OID,
            critical,
            extn_value: OctetString::new(value)
                .map_err(|e| CertForgeError::field(Self::FIELD, e))?,
        })
    }
}

/// Key-usage bitmask as it appears on the wire.
///
/// The bit values are the historical ones carried by the request format;
/// decoding rejects any bit outside the nine defined here. A zero mask means
/// the extension is omitted, not that all usages are denied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct KeyUsageMask(u32);

impl KeyUsageMask {
    pub const DIGITAL_SIGNATURE: u32 = 0x80;
    pub const NON_REPUDIATION: u32 = 0x40;
    pub const KEY_ENCIPHERMENT: u32 = 0x20;
    pub const DATA_ENCIPHERMENT: u32 = 0x10;
    pub const KEY_AGREEMENT: u32 = 0x08;
    pub const KEY_CERT_SIGN: u32 = 0x04;
    pub const CRL_SIGN: u32 = 0x02;
    pub const ENCIPHER_ONLY: u32 = 0x01;
    pub const DECIPHER_ONLY: u32 = 0x8000;

    const VALID_BITS: u32 = Self::DIGITAL_SIGNATURE
        | Self::NON_REPUDIATION
        | Self::KEY_ENCIPHERMENT
        | Self::DATA_ENCIPHERMENT
        | Self::KEY_AGREEMENT
        | Self::KEY_CERT_SIGN
        | Self::CRL_SIGN
        | Self::ENCIPHER_ONLY
        | Self::DECIPHER_ONLY;

    /// Validates a raw wire value. Returns `None` if any undefined bit is set.
    pub fn from_wire(raw: u32) -> Option<Self> {
        if raw & !Self::VALID_BITS != 0 {
            return None;
        }
        Some(Self(raw))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    fn flags(self) -> FlagSet<KeyUsages> {
        let pairs = [
            (Self::DIGITAL_SIGNATURE, KeyUsages::DigitalSignature),
            (Self::NON_REPUDIATION, KeyUsages::NonRepudiation),
            (Self::KEY_ENCIPHERMENT, KeyUsages::KeyEncipherment),
            (Self::DATA_ENCIPHERMENT, KeyUsages::DataEncipherment),
            (Self::KEY_AGREEMENT, KeyUsages::KeyAgreement),
            (Self::KEY_CERT_SIGN, KeyUsages::KeyCertSign),
            (Self::CRL_SIGN, KeyUsages::CRLSign),
            (Self::ENCIPHER_ONLY, KeyUsages::EncipherOnly),
            (Self::DECIPHER_ONLY, KeyUsages::DecipherOnly),
        ];

        pairs
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .fold(FlagSet::default(), |acc, (_, flag)| acc | *flag)
    }
}

impl ToX509Extension for KeyUsageMask {
    const OID: ObjectIdentifier = <X509KeyUsage as AssociatedOid>::OID;
    const FIELD: CertField = CertField::KeyUsage;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        X509KeyUsage(self.flags())
            .to_der()
            .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}

/// Extended-key-usage bitmask as it appears on the wire.
///
/// A non-zero mask materializes into OID entries in the fixed enumeration
/// order below; that order becomes the literal encoding order of the
/// extension. A zero mask materializes to "no extension".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExtKeyUsageSet(u32);

impl ExtKeyUsageSet {
    pub const SERVER_AUTH: u32 = 1 << 0;
    pub const CLIENT_AUTH: u32 = 1 << 1;
    pub const CODE_SIGNING: u32 = 1 << 2;
    pub const EMAIL_PROTECTION: u32 = 1 << 3;
    pub const TIME_STAMPING: u32 = 1 << 4;
    pub const OCSP_SIGNING: u32 = 1 << 5;
    pub const ANY: u32 = 1 << 6;

    const VALID_BITS: u32 = Self::SERVER_AUTH
        | Self::CLIENT_AUTH
        | Self::CODE_SIGNING
        | Self::EMAIL_PROTECTION
        | Self::TIME_STAMPING
        | Self::OCSP_SIGNING
        | Self::ANY;

    /// Purposes in materialization order, ending with anyExtendedKeyUsage.
    const ORDER: [(u32, ObjectIdentifier); 7] = [
        (Self::SERVER_AUTH, const_oid::db::rfc5912::ID_KP_SERVER_AUTH),
        (Self::CLIENT_AUTH, const_oid::db::rfc5912::ID_KP_CLIENT_AUTH),
        (Self::CODE_SIGNING, const_oid::db::rfc5912::ID_KP_CODE_SIGNING),
        (
            Self::EMAIL_PROTECTION,
            const_oid::db::rfc5912::ID_KP_EMAIL_PROTECTION,
        ),
        (Self::TIME_STAMPING, const_oid::db::rfc5912::ID_KP_TIME_STAMPING),
        (Self::OCSP_SIGNING, const_oid::db::rfc5912::ID_KP_OCSP_SIGNING),
        (Self::ANY, ANY_EXTENDED_KEY_USAGE),
    ];

    /// Validates a raw wire value. Returns `None` if any undefined bit is set.
    pub fn from_wire(raw: u32) -> Option<Self> {
        if raw & !Self::VALID_BITS != 0 {
            return None;
        }
        Some(Self(raw))
    }

    pub fn bits(self) -> u32 {
        self.0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Materializes the set bits into their OID sequence, in fixed order.
    pub fn materialize(self) -> Vec<ObjectIdentifier> {
        Self::ORDER
            .iter()
            .filter(|(bit, _)| self.0 & bit != 0)
            .map(|(_, oid)| *oid)
            .collect()
    }
}

impl ToX509Extension for ExtKeyUsageSet {
    const OID: ObjectIdentifier = <x509_cert::ext::pkix::ExtendedKeyUsage as AssociatedOid>::OID;
    const FIELD: CertField = CertField::ExtKeyUsage;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        x509_cert::ext::pkix::ExtendedKeyUsage(self.materialize())
            .to_der()
            .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}

/// Kind of identity a SAN entry binds to the certificate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SanType {
    Dns,
    Ip,
    Email,
}

impl SanType {
    pub fn from_wire(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(SanType::Dns),
            1 => Some(SanType::Ip),
            2 => Some(SanType::Email),
            _ => None,
        }
    }

    pub fn to_wire(self) -> u32 {
        match self {
            SanType::Dns => 0,
            SanType::Ip => 1,
            SanType::Email => 2,
        }
    }
}

/// One subject-alternative-name entry.
///
/// For `Ip` entries the value holds the parsed 4- or 16-byte binary address;
/// DNS and email values keep the raw bytes read off the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanEntry {
    pub kind: SanType,
    pub value: Vec<u8>,
}

impl SanEntry {
    /// Parses a textual IP literal into its binary form.
    pub fn parse_ip(text: &[u8]) -> Option<Vec<u8>> {
        let text = std::str::from_utf8(text).ok()?;
        match text.parse::<std::net::IpAddr>().ok()? {
            std::net::IpAddr::V4(v4) => Some(v4.octets().to_vec()),
            std::net::IpAddr::V6(v6) => Some(v6.octets().to_vec()),
        }
    }

    fn to_general_name(&self) -> Result<GeneralName, CertForgeError> {
        let field_err = |e: &dyn std::fmt::Display| {
            CertForgeError::field(CertField::San, format!("{e}"))
        };

        match self.kind {
            SanType::Ip => {
                if self.value.len() != 4 && self.value.len() != 16 {
                    return Err(CertForgeError::field(
                        CertField::San,
                        format!("invalid binary IP address length {}", self.value.len()),
                    ));
                }
                let octets = OctetString::new(self.value.clone())
                    .map_err(|e| field_err(&e))?;
                Ok(GeneralName::IpAddress(octets))
            }
            SanType::Dns | SanType::Email => {
                let text = String::from_utf8(self.value.clone())
                    .map_err(|e| field_err(&e))?;
                let name = Ia5String::try_from(text).map_err(|e| field_err(&e))?;
                Ok(match self.kind {
                    SanType::Dns => GeneralName::DnsName(name),
                    _ => GeneralName::Rfc822Name(name),
                })
            }
        }
    }
}

/// Owned subject-alternative-name list, released into certificate synthesis.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubjectAltNames(pub Vec<SanEntry>);

impl ToX509Extension for SubjectAltNames {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::SubjectAltName as AssociatedOid>::OID;
    const FIELD: CertField = CertField::San;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        let names = self
            .0
            .iter()
            .map(SanEntry::to_general_name)
            .collect::<Result<Vec<_>, _>>()?;

        x509_cert::ext::pkix::SubjectAltName(names)
            .to_der()
            .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}

/// Basic-constraints extension; path length is always unconstrained here.
#[derive(Debug, Clone, Copy, Default)]
pub struct BasicConstraintsExt {
    pub is_ca: bool,
}

impl ToX509Extension for BasicConstraintsExt {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::BasicConstraints as AssociatedOid>::OID;
    const FIELD: CertField = CertField::BasicConstraints;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        x509_cert::ext::pkix::BasicConstraints {
            ca: self.is_ca,
            path_len_constraint: None,
        }
        .to_der()
        .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}

/// Subject-key-identifier extension built from derived key-hash bytes.
#[derive(Debug, Clone)]
pub struct SubjectKeyId(pub Vec<u8>);

impl ToX509Extension for SubjectKeyId {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::SubjectKeyIdentifier as AssociatedOid>::OID;
    const FIELD: CertField = CertField::SubjectKeyId;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        let octets = OctetString::new(self.0.clone())
            .map_err(|e| CertForgeError::field(Self::FIELD, e))?;
        x509_cert::ext::pkix::SubjectKeyIdentifier(octets)
            .to_der()
            .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}

/// Authority-key-identifier extension carrying only the keyIdentifier field.
///
/// The bytes are either derived from the signing key or supplied verbatim by
/// the caller; the structured `x509_cert` builder replaces any manual
/// tag/length/value assembly.
#[derive(Debug, Clone)]
pub struct AuthorityKeyId(pub Vec<u8>);

impl ToX509Extension for AuthorityKeyId {
    const OID: ObjectIdentifier =
        <x509_cert::ext::pkix::AuthorityKeyIdentifier as AssociatedOid>::OID;
    const FIELD: CertField = CertField::AuthorityKeyId;

    fn to_extension_value(&self) -> Result<Vec<u8>, CertForgeError> {
        let octets = OctetString::new(self.0.clone())
            .map_err(|e| CertForgeError::field(Self::FIELD, e))?;
        x509_cert::ext::pkix::AuthorityKeyIdentifier {
            key_identifier: Some(octets),
            authority_cert_issuer: None,
            authority_cert_serial_number: None,
        }
        .to_der()
        .map_err(|e| CertForgeError::field(Self::FIELD, e))
    }
}
