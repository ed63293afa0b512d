//! Introspection over stored certificates: attribute reporting and
//! key-to-certificate matching.

use log::debug;

use crate::cert::{CertInfo, Certificate};
use crate::error::CertForgeError;
use crate::key::KeyPair;

/// Selects the effective certificate in a chain: the last entry, which for
/// leaf-first chains is the top-most signer.
pub fn last_certificate(chain: &[Certificate]) -> Result<&Certificate, CertForgeError> {
    chain.last().ok_or_else(|| {
        CertForgeError::CertInfo("certificate chain is empty".to_string())
    })
}

/// Reports the attributes of the effective certificate in a chain.
pub fn chain_info(chain: &[Certificate]) -> Result<CertInfo, CertForgeError> {
    last_certificate(chain)?.info()
}

/// Finds the first certificate in the chain whose public key pairs with the
/// given private key.
pub fn find_matching<'a>(
    chain: &'a [Certificate],
    key: &KeyPair,
) -> Result<&'a Certificate, CertForgeError> {
    for (index, cert) in chain.iter().enumerate() {
        if key.matches_certificate(&cert.inner) {
            debug!("private key pairs with chain entry {index}");
            return Ok(cert);
        }
    }
    Err(CertForgeError::KeyMismatch)
}
