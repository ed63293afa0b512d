//! Certificate synthesis: turns a decoded request plus a signing key into a
//! signed X.509v3 certificate and a fresh subject key pair.

use std::str::FromStr;

use der::Encode;
use der::asn1::{BitString, GeneralizedTime, UtcTime};
use log::debug;
use rand_core::RngCore;
use sha1::{Digest, Sha1};
use time::PrimitiveDateTime;
use time::macros::format_description;
use x509_cert::certificate::{CertificateInner, TbsCertificateInner, Version};
use x509_cert::name::RdnSequence;
use x509_cert::serial_number::SerialNumber;
use x509_cert::time::{Time, Validity};

use crate::cert::Certificate;
use crate::cert::extensions::{
    AuthorityKeyId, BasicConstraintsExt, SubjectAltNames, SubjectKeyId, ToX509Extension,
};
use crate::error::{CertField, CertForgeError};
use crate::key::KeyPair;
use crate::request::{CertRequest, Protocol};

/// Number of random bytes drawn for a serial number before trimming.
const SERIAL_BYTES: usize = 16;

/// The products of one issuance: the signed certificate and the subject's
/// newly generated key pair.
pub struct IssuedCertificate {
    pub certificate: Certificate,
    pub key: KeyPair,
}

/// Trims leading zero bytes off a raw serial, keeping at least one byte so
/// the INTEGER encoding stays valid.
pub(crate) fn trim_serial(raw: &[u8]) -> &[u8] {
    let start = raw
        .iter()
        .position(|&b| b != 0)
        .unwrap_or(raw.len().saturating_sub(1));
    &raw[start..]
}

fn random_serial() -> Result<Vec<u8>, CertForgeError> {
    let mut raw = [0u8; SERIAL_BYTES];
    rand_core::OsRng
        .try_fill_bytes(&mut raw)
        .map_err(|e| CertForgeError::field(CertField::Serial, e))?;
    Ok(trim_serial(&raw).to_vec())
}

/// Parses a `YYYYMMDDHHMMSS` timestamp, tolerating one trailing `Z`. Dates
/// before 2050 encode as UTCTime, later ones as GeneralizedTime.
pub(crate) fn parse_validity_time(text: &str) -> Result<Time, CertForgeError> {
    let trimmed = text.strip_suffix('Z').unwrap_or(text);
    let format = format_description!("[year][month][day][hour][minute][second]");
    let parsed = PrimitiveDateTime::parse(trimmed, &format)
        .map_err(|e| CertForgeError::field(CertField::Validity, e))?;
    let stamp = parsed.assume_utc();

    let unix = u64::try_from(stamp.unix_timestamp())
        .map_err(|e| CertForgeError::field(CertField::Validity, e))?;
    let duration = std::time::Duration::from_secs(unix);

    if stamp.year() < 2050 {
        Ok(Time::UtcTime(
            UtcTime::from_unix_duration(duration)
                .map_err(|e| CertForgeError::field(CertField::Validity, e))?,
        ))
    } else {
        Ok(Time::GeneralTime(
            GeneralizedTime::from_unix_duration(duration)
                .map_err(|e| CertForgeError::field(CertField::Validity, e))?,
        ))
    }
}

/// Parses a textual distinguished name. An empty string means the name is
/// omitted and yields an empty RDN sequence.
fn parse_name(text: &str, field: CertField) -> Result<RdnSequence, CertForgeError> {
    if text.is_empty() {
        return Ok(RdnSequence::default());
    }
    RdnSequence::from_str(text).map_err(|e| CertForgeError::field(field, e))
}

/// SHA-1 over the raw subject-public-key bits, the conventional key
/// identifier derivation.
fn key_identifier(key: &KeyPair, field: CertField) -> Result<Vec<u8>, CertForgeError> {
    let spki = key.spki().map_err(|e| CertForgeError::field(field, e))?;
    Ok(Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec())
}

/// Issues a certificate for the request.
///
/// A fresh subject key pair is always generated. Self-signed requests sign
/// with that new key; otherwise `authority` must hold the signing key.
pub fn issue(
    request: &CertRequest,
    authority: Option<&KeyPair>,
) -> Result<IssuedCertificate, CertForgeError> {
    debug!("issuing certificate for subject {:?}", request.subject);

    let key = KeyPair::generate(request.key_type)?;

    let signer: &KeyPair = if request.self_signed {
        &key
    } else {
        authority.ok_or_else(|| {
            CertForgeError::GenerateCert("no authority key available for signing".to_string())
        })?
    };

    let serial = random_serial()?;
    let serial_number = SerialNumber::new(&serial)
        .map_err(|e| CertForgeError::field(CertField::Serial, e))?;

    let validity = Validity {
        not_before: parse_validity_time(&request.not_before)?,
        not_after: parse_validity_time(&request.not_after)?,
    };

    let issuer = parse_name(&request.issuer, CertField::Issuer)?;
    let subject = parse_name(&request.subject, CertField::Subject)?;

    let spki = key
        .spki()
        .map_err(|e| CertForgeError::GenerateCert(e.to_string()))?;
    let subject_key_id = Sha1::digest(spki.subject_public_key.raw_bytes()).to_vec();

    let authority_key_id = match request.protocol {
        // The legacy format derives the identifier from the signing key and
        // leaves it out entirely on self-signed certificates.
        Protocol::V1 => {
            if request.self_signed {
                None
            } else {
                Some(key_identifier(signer, CertField::AuthorityKeyId)?)
            }
        }
        // The current format takes the caller's bytes verbatim when present
        // and otherwise derives from the signing key, self-signed or not.
        Protocol::V2 => {
            if request.authority_key_id.is_empty() {
                Some(key_identifier(signer, CertField::AuthorityKeyId)?)
            } else {
                Some(request.authority_key_id.clone())
            }
        }
    };

    let mut extensions = Vec::new();
    extensions.push(
        BasicConstraintsExt {
            is_ca: request.is_ca,
        }
        .to_extension(true)?,
    );
    if !request.key_usage.is_empty() {
        extensions.push(request.key_usage.to_extension(true)?);
    }
    if !request.ext_key_usage.is_empty() {
        extensions.push(request.ext_key_usage.to_extension(true)?);
    }
    extensions.push(SubjectKeyId(subject_key_id).to_extension(false)?);
    if let Some(bytes) = authority_key_id {
        extensions.push(AuthorityKeyId(bytes).to_extension(false)?);
    }
    if !request.san.is_empty() {
        extensions.push(SubjectAltNames(request.san.clone()).to_extension(false)?);
    }

    let signature_algorithm = signer.signature_algorithm(request.digest);

    let tbs = TbsCertificateInner {
        version: Version::V3,
        serial_number,
        signature: signature_algorithm.clone(),
        issuer,
        validity,
        subject,
        subject_public_key_info: spki,
        issuer_unique_id: None,
        subject_unique_id: None,
        extensions: Some(extensions),
    };

    let tbs_der = tbs
        .to_der()
        .map_err(|e| CertForgeError::GenerateCert(e.to_string()))?;
    let signature = signer.sign(request.digest, &tbs_der)?;
    let signature = BitString::from_bytes(&signature)
        .map_err(|e| CertForgeError::GenerateCert(e.to_string()))?;

    let inner = CertificateInner {
        tbs_certificate: tbs,
        signature_algorithm,
        signature,
    };

    Ok(IssuedCertificate {
        certificate: Certificate { inner },
        key,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cert::extensions::{ExtKeyUsageSet, KeyUsageMask, SanEntry, SanType};
    use crate::key::{DigestType, KeyType};
    use const_oid::AssociatedOid;

    fn base_request() -> CertRequest {
        CertRequest {
            protocol: Protocol::V2,
            issuer: "CN=Test CA".to_string(),
            subject: "CN=test".to_string(),
            is_ca: false,
            self_signed: true,
            authority_key_id: Vec::new(),
            san: Vec::new(),
            key_type: KeyType::EcP256,
            digest: DigestType::Sha256,
            not_before: "20240101000000".to_string(),
            not_after: "20340101000000".to_string(),
            key_usage: KeyUsageMask::from_wire(KeyUsageMask::DIGITAL_SIGNATURE).unwrap(),
            ext_key_usage: ExtKeyUsageSet::from_wire(ExtKeyUsageSet::SERVER_AUTH).unwrap(),
        }
    }

    #[test]
    fn serial_trimming_keeps_at_least_one_byte() {
        assert_eq!(trim_serial(&[0, 0, 1, 2]), &[1, 2]);
        assert_eq!(trim_serial(&[9, 0, 0]), &[9, 0, 0]);
        assert_eq!(trim_serial(&[0, 0, 0, 0]), &[0]);
        assert_eq!(trim_serial(&[7]), &[7]);
    }

    #[test]
    fn validity_parsing_picks_the_encoding_by_year() {
        assert!(matches!(
            parse_validity_time("20240101000000").unwrap(),
            Time::UtcTime(_)
        ));
        assert!(matches!(
            parse_validity_time("20551231235959Z").unwrap(),
            Time::GeneralTime(_)
        ));
        assert!(parse_validity_time("2024-01-01").is_err());
        assert!(parse_validity_time("20241301000000").is_err());
        assert!(parse_validity_time("").is_err());
    }

    #[test]
    fn self_signed_issuance_produces_a_v3_certificate() {
        let request = base_request();
        let issued = issue(&request, None).unwrap();

        let tbs = &issued.certificate.inner.tbs_certificate;
        assert_eq!(tbs.version, Version::V3);
        assert_eq!(tbs.subject.to_string(), "CN=test");
        assert!(issued.key.matches_certificate(&issued.certificate.inner));

        let serial = tbs.serial_number.as_bytes();
        assert!(!serial.is_empty());
        assert!(serial.len() <= SERIAL_BYTES + 1);
    }

    #[test]
    fn extensions_appear_in_assembly_order() {
        let mut request = base_request();
        request.san = vec![SanEntry {
            kind: SanType::Dns,
            value: b"test.example".to_vec(),
        }];
        let issued = issue(&request, None).unwrap();

        let extensions = issued
            .certificate
            .inner
            .tbs_certificate
            .extensions
            .as_ref()
            .unwrap();
        let oids: Vec<_> = extensions.iter().map(|e| e.extn_id).collect();
        assert_eq!(
            oids,
            vec![
                x509_cert::ext::pkix::BasicConstraints::OID,
                x509_cert::ext::pkix::KeyUsage::OID,
                x509_cert::ext::pkix::ExtendedKeyUsage::OID,
                x509_cert::ext::pkix::SubjectKeyIdentifier::OID,
                x509_cert::ext::pkix::AuthorityKeyIdentifier::OID,
                x509_cert::ext::pkix::SubjectAltName::OID,
            ]
        );

        // Criticality follows the fixed policy.
        let critical: Vec<_> = extensions.iter().map(|e| e.critical).collect();
        assert_eq!(critical, vec![true, true, true, false, false, false]);
    }

    #[test]
    fn empty_masks_omit_their_extensions() {
        let mut request = base_request();
        request.key_usage = KeyUsageMask::default();
        request.ext_key_usage = ExtKeyUsageSet::default();
        let issued = issue(&request, None).unwrap();

        let extensions = issued
            .certificate
            .inner
            .tbs_certificate
            .extensions
            .as_ref()
            .unwrap();
        assert!(
            !extensions
                .iter()
                .any(|e| e.extn_id == x509_cert::ext::pkix::KeyUsage::OID)
        );
        assert!(
            !extensions
                .iter()
                .any(|e| e.extn_id == x509_cert::ext::pkix::ExtendedKeyUsage::OID)
        );
    }

    #[test]
    fn v2_explicit_authority_key_id_is_used_verbatim() {
        use der::Decode;

        let mut request = base_request();
        request.authority_key_id = vec![0xca, 0xfe, 0xba, 0xbe];
        let issued = issue(&request, None).unwrap();

        let extensions = issued
            .certificate
            .inner
            .tbs_certificate
            .extensions
            .as_ref()
            .unwrap();
        let akid_ext = extensions
            .iter()
            .find(|e| e.extn_id == x509_cert::ext::pkix::AuthorityKeyIdentifier::OID)
            .unwrap();
        let akid = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(
            akid_ext.extn_value.as_bytes(),
        )
        .unwrap();
        assert_eq!(
            akid.key_identifier.unwrap().as_bytes(),
            &[0xca, 0xfe, 0xba, 0xbe]
        );
    }

    #[test]
    fn v1_self_signed_omits_the_authority_key_id() {
        let mut request = base_request();
        request.protocol = Protocol::V1;
        let issued = issue(&request, None).unwrap();

        let extensions = issued
            .certificate
            .inner
            .tbs_certificate
            .extensions
            .as_ref()
            .unwrap();
        assert!(
            !extensions
                .iter()
                .any(|e| e.extn_id == x509_cert::ext::pkix::AuthorityKeyIdentifier::OID)
        );
    }

    #[test]
    fn v2_self_signed_derives_matching_key_ids() {
        use der::Decode;

        let request = base_request();
        let issued = issue(&request, None).unwrap();

        let extensions = issued
            .certificate
            .inner
            .tbs_certificate
            .extensions
            .as_ref()
            .unwrap();
        let find = |oid| {
            extensions
                .iter()
                .find(|e| e.extn_id == oid)
                .unwrap()
                .extn_value
                .as_bytes()
        };

        let skid = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(find(
            x509_cert::ext::pkix::SubjectKeyIdentifier::OID,
        ))
        .unwrap();
        let akid = x509_cert::ext::pkix::AuthorityKeyIdentifier::from_der(find(
            x509_cert::ext::pkix::AuthorityKeyIdentifier::OID,
        ))
        .unwrap();
        assert_eq!(
            skid.0.as_bytes(),
            akid.key_identifier.unwrap().as_bytes()
        );
    }

    #[test]
    fn signing_without_an_authority_key_fails() {
        let mut request = base_request();
        request.self_signed = false;
        assert!(issue(&request, None).is_err());
    }

    #[test]
    fn empty_names_yield_empty_rdn_sequences() {
        let mut request = base_request();
        request.subject = String::new();
        request.issuer = String::new();
        let issued = issue(&request, None).unwrap();

        let tbs = &issued.certificate.inner.tbs_certificate;
        assert_eq!(tbs.subject.to_string(), "");
        assert_eq!(tbs.issuer.to_string(), "");
    }
}
