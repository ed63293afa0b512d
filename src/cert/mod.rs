pub mod extensions;

use const_oid::AssociatedOid;
use der::{Decode, Encode};
use x509_cert::certificate::CertificateInner;

use crate::error::CertForgeError;
use crate::pem_utils::{der_to_pem, has_pem_marker};

/// Starting size for the serialization buffer.
pub const INITIAL_ENCODE_BUFFER: usize = 8196;

/// Growth cap for the serialization buffer. No supported certificate comes
/// near this; hitting it is reported as a generation failure rather than
/// growing without bound.
pub const MAX_ENCODE_BUFFER: usize = 1 << 20;

/// Upper bound on the formatted subject DN reported by introspection.
pub const MAX_DN_LENGTH: usize = 1024;

/// Encodes through a fixed buffer, doubling it on a buffer-too-small signal
/// until the value fits or the cap is reached.
pub(crate) fn encode_with_growth<F>(mut encode: F) -> Result<Vec<u8>, CertForgeError>
where
    F: FnMut(&mut [u8]) -> der::Result<usize>,
{
    let mut size = INITIAL_ENCODE_BUFFER;
    loop {
        let mut buf = vec![0u8; size];
        match encode(&mut buf) {
            Ok(len) => {
                buf.truncate(len);
                return Ok(buf);
            }
            Err(e) if e.kind() == der::ErrorKind::Overlength && size < MAX_ENCODE_BUFFER => {
                size = (size * 2).min(MAX_ENCODE_BUFFER);
            }
            Err(e) => return Err(CertForgeError::GenerateCert(e.to_string())),
        }
    }
}

/// Reportable attributes extracted from a certificate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertInfo {
    /// Subject distinguished name as formatted text, at most
    /// [`MAX_DN_LENGTH`] bytes.
    pub subject: String,
    /// True only if the basic-constraints extension is present and asserts
    /// the CA flag.
    pub is_ca: bool,
    /// Raw subject-key-identifier bytes; empty when the extension is absent.
    pub key_id: Vec<u8>,
}

/// An X.509 certificate, wrapping the parsed inner representation.
#[derive(Debug, Clone)]
pub struct Certificate {
    pub inner: CertificateInner,
}

impl Certificate {
    pub fn from_der(der: &[u8]) -> Result<Self, CertForgeError> {
        let inner = CertificateInner::from_der(der)
            .map_err(|e| CertForgeError::ReadCert(e.to_string()))?;
        Ok(Self { inner })
    }

    /// Encodes the certificate into DER through the growth-retry buffer.
    pub fn to_der(&self) -> Result<Vec<u8>, CertForgeError> {
        encode_with_growth(|buf| {
            let encoded = self.inner.encode_to_slice(buf)?;
            Ok(encoded.len())
        })
    }

    /// Encodes the certificate into PEM format.
    pub fn to_pem(&self) -> Result<String, CertForgeError> {
        Ok(der_to_pem(&self.to_der()?, "CERTIFICATE"))
    }

    /// Loads a certificate chain from stored bytes, auto-detecting PEM by
    /// the `-----BEGIN ` marker. PEM input may carry multiple certificate
    /// blocks, first followed by its signers; DER input holds exactly one
    /// certificate.
    pub fn load_chain(data: &[u8]) -> Result<Vec<Certificate>, CertForgeError> {
        if has_pem_marker(data) {
            let blocks = pem::parse_many(data)
                .map_err(|e| CertForgeError::ReadCert(e.to_string()))?;
            let chain = blocks
                .iter()
                .filter(|block| block.tag() == "CERTIFICATE")
                .map(|block| Certificate::from_der(block.contents()))
                .collect::<Result<Vec<_>, _>>()?;
            if chain.is_empty() {
                return Err(CertForgeError::ReadCert(
                    "no certificate blocks in PEM input".to_string(),
                ));
            }
            Ok(chain)
        } else {
            Ok(vec![Certificate::from_der(data)?])
        }
    }

    /// Extracts the reportable attributes of this certificate.
    pub fn info(&self) -> Result<CertInfo, CertForgeError> {
        let subject = self.inner.tbs_certificate.subject.to_string();
        if subject.len() > MAX_DN_LENGTH {
            return Err(CertForgeError::CertInfo(format!(
                "subject name length {} exceeds {} bytes",
                subject.len(),
                MAX_DN_LENGTH
            )));
        }

        let mut is_ca = false;
        let mut key_id = Vec::new();

        if let Some(extensions) = &self.inner.tbs_certificate.extensions {
            for ext in extensions {
                if ext.extn_id == x509_cert::ext::pkix::BasicConstraints::OID {
                    let bc =
                        x509_cert::ext::pkix::BasicConstraints::from_der(ext.extn_value.as_bytes())
                            .map_err(|e| CertForgeError::CertInfo(e.to_string()))?;
                    is_ca = bc.ca;
                } else if ext.extn_id == x509_cert::ext::pkix::SubjectKeyIdentifier::OID {
                    let skid = x509_cert::ext::pkix::SubjectKeyIdentifier::from_der(
                        ext.extn_value.as_bytes(),
                    )
                    .map_err(|e| CertForgeError::CertInfo(e.to_string()))?;
                    key_id = skid.0.as_bytes().to_vec();
                }
            }
        }

        Ok(CertInfo {
            subject,
            is_ca,
            key_id,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn growth_loop_doubles_until_the_value_fits() {
        let needed = 20_000;
        let mut attempts = Vec::new();
        let out = encode_with_growth(|buf| {
            attempts.push(buf.len());
            if buf.len() < needed {
                Err(der::ErrorKind::Overlength.at(der::Length::ZERO))
            } else {
                buf[..needed].fill(0xab);
                Ok(needed)
            }
        })
        .unwrap();

        assert_eq!(out.len(), needed);
        assert!(out.iter().all(|&b| b == 0xab));
        assert_eq!(attempts, vec![8196, 16392, 32784]);
    }

    #[test]
    fn growth_loop_is_capped() {
        let err = encode_with_growth(|_| {
            Err::<usize, _>(der::ErrorKind::Overlength.at(der::Length::ZERO))
        })
        .unwrap_err();
        assert!(matches!(err, CertForgeError::GenerateCert(_)));
    }

    #[test]
    fn hard_encode_errors_are_not_retried() {
        let mut calls = 0;
        let err = encode_with_growth(|_| {
            calls += 1;
            Err::<usize, _>(der::ErrorKind::Failed.at(der::Length::ZERO))
        })
        .unwrap_err();
        assert!(matches!(err, CertForgeError::GenerateCert(_)));
        assert_eq!(calls, 1);
    }

    #[test]
    fn oversized_subject_dn_is_a_cert_info_error() {
        use crate::cert::extensions::{ExtKeyUsageSet, KeyUsageMask};
        use crate::issue::issue;
        use crate::key::{DigestType, KeyType};
        use crate::request::{CertRequest, Protocol};

        let request = CertRequest {
            protocol: Protocol::V2,
            issuer: String::new(),
            subject: format!("CN={}", "a".repeat(MAX_DN_LENGTH + 8)),
            is_ca: false,
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

        let issued = issue(&request, None).unwrap();
        let err = issued.certificate.info().unwrap_err();
        assert!(matches!(err, CertForgeError::CertInfo(_)));
        assert_eq!(err.code(), 402);
    }

    #[test]
    fn chain_load_rejects_unparsable_input() {
        assert!(Certificate::load_chain(b"\x01\x02\x03").is_err());
        // PEM without any CERTIFICATE block.
        let pem = crate::pem_utils::der_to_pem(&[1, 2, 3], "PRIVATE KEY");
        assert!(Certificate::load_chain(pem.as_bytes()).is_err());
    }
}
