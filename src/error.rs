use thiserror::Error;

/// Certificate field targeted by a failed setter.
///
/// Each field maps to its own result code so callers can tell exactly which
/// part of the certificate could not be populated.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CertField {
    Serial,
    Validity,
    Issuer,
    Subject,
    KeyUsage,
    ExtKeyUsage,
    SubjectKeyId,
    AuthorityKeyId,
    San,
    BasicConstraints,
}

impl CertField {
    fn as_str(self) -> &'static str {
        match self {
            CertField::Serial => "serial number",
            CertField::Validity => "validity range",
            CertField::Issuer => "issuer name",
            CertField::Subject => "subject name",
            CertField::KeyUsage => "key usage",
            CertField::ExtKeyUsage => "extended key usage",
            CertField::SubjectKeyId => "subject key identifier",
            CertField::AuthorityKeyId => "authority key identifier",
            CertField::San => "subject alternative name",
            CertField::BasicConstraints => "basic constraints",
        }
    }
}

impl std::fmt::Display for CertField {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Represents errors that can occur in the certforge pipelines.
///
/// Every run terminates with at most one of these; [`CertForgeError::code`]
/// gives the stable integer reported to the caller.
#[derive(Debug, Error)]
pub enum CertForgeError {
    /// The binary request could not be read or decoded.
    #[error("Failed to read request input: {0}")]
    ReadInput(String),

    /// The stored certificate artifact could not be loaded or parsed.
    #[error("Failed to load certificate: {0}")]
    ReadCert(String),

    /// The stored private key artifact could not be loaded or parsed.
    #[error("Failed to load private key: {0}")]
    ReadKey(String),

    /// The certificate artifact could not be written.
    #[error("Failed to write certificate: {0}")]
    WriteCert(String),

    /// The introspection result record could not be written.
    #[error("Failed to write certificate info: {0}")]
    WriteCertInfo(String),

    /// The private key artifact could not be written.
    #[error("Failed to write private key: {0}")]
    WriteKey(String),

    /// A certificate field setter failed.
    #[error("Failed to set certificate {field}: {reason}")]
    CertField { field: CertField, reason: String },

    /// Certificate serialization or assembly failed.
    #[error("Failed to generate certificate: {0}")]
    GenerateCert(String),

    /// Subject key generation failed.
    #[error("Key generation error: {0}")]
    GenerateKey(String),

    /// Reportable attributes could not be extracted from a certificate.
    #[error("Certificate info error: {0}")]
    CertInfo(String),

    /// No certificate in the loaded chain matches the supplied private key.
    #[error("No certificate in the chain matches the given key")]
    KeyMismatch,
}

impl CertForgeError {
    /// Stable integer result code for this error, grouped by phase:
    /// 100s input, 200s output, 300s certificate field setters,
    /// 400s generation and introspection. Success is 0 by convention.
    pub fn code(&self) -> i32 {
        match self {
            CertForgeError::ReadInput(_) => 100,
            CertForgeError::ReadCert(_) => 101,
            CertForgeError::ReadKey(_) => 102,

            CertForgeError::WriteCert(_) => 200,
            CertForgeError::WriteCertInfo(_) => 201,
            CertForgeError::WriteKey(_) => 202,

            CertForgeError::CertField { field, .. } => match field {
                CertField::Serial => 300,
                CertField::Validity => 301,
                CertField::Issuer => 302,
                CertField::Subject => 303,
                CertField::KeyUsage => 304,
                CertField::ExtKeyUsage => 305,
                CertField::SubjectKeyId => 306,
                CertField::AuthorityKeyId => 307,
                CertField::San => 308,
                CertField::BasicConstraints => 309,
            },

            CertForgeError::GenerateCert(_) => 400,
            CertForgeError::GenerateKey(_) => 401,
            CertForgeError::CertInfo(_) => 402,
            CertForgeError::KeyMismatch => 403,
        }
    }

    pub(crate) fn field(field: CertField, err: impl std::fmt::Display) -> Self {
        CertForgeError::CertField {
            field,
            reason: err.to_string(),
        }
    }
}
