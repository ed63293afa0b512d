//! Entry operations over the artifact directory.
//!
//! Each operation exchanges data through fixed-name files in one directory:
//! `input` carries the encoded request, `cert` and `key` carry stored or
//! produced credentials, and `result` carries the legacy introspection
//! record. Stored `cert`/`key` artifacts are length-prefixed; produced PEM
//! artifacts are written as plain text.

use std::fs::{self, File};
use std::io::{BufReader, BufWriter, Write};
use std::path::{Path, PathBuf};

use log::{debug, error};

use crate::cert::{CertInfo, Certificate};
use crate::error::CertForgeError;
use crate::inspect::{find_matching, last_certificate};
use crate::issue::issue;
use crate::key::KeyPair;
use crate::request::{CertRequest, Protocol};
use crate::wire::{WireError, WireReader, WireWriter};

pub const INPUT_ARTIFACT: &str = "input";
pub const CERT_ARTIFACT: &str = "cert";
pub const KEY_ARTIFACT: &str = "key";
pub const RESULT_ARTIFACT: &str = "result";

/// One artifact directory plus the protocol variant its files speak.
pub struct Workspace {
    dir: PathBuf,
    protocol: Protocol,
}

impl Workspace {
    pub fn new(dir: impl Into<PathBuf>, protocol: Protocol) -> Self {
        Workspace {
            dir: dir.into(),
            protocol,
        }
    }

    pub fn protocol(&self) -> Protocol {
        self.protocol
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.join(name)
    }

    /// Reads one length-prefixed artifact in full.
    fn read_artifact(
        &self,
        name: &str,
        wrap: fn(String) -> CertForgeError,
    ) -> Result<Vec<u8>, CertForgeError> {
        let file = File::open(self.path(name)).map_err(|e| {
            error!("Couldn't open {name} file.");
            wrap(e.to_string())
        })?;
        let mut reader = WireReader::new(BufReader::new(file));
        reader.read_string().map_err(|e| {
            error!("Couldn't read {name} data.");
            wrap(e.to_string())
        })
    }

    fn load_chain(&self) -> Result<Vec<Certificate>, CertForgeError> {
        let data = self.read_artifact(CERT_ARTIFACT, CertForgeError::ReadCert)?;
        Certificate::load_chain(&data)
    }

    fn load_key(&self) -> Result<KeyPair, CertForgeError> {
        let data = self.read_artifact(KEY_ARTIFACT, CertForgeError::ReadKey)?;
        KeyPair::from_stored(&data)
    }

    /// Issues a certificate from the `input` request, writing the produced
    /// certificate and the new subject key back into the directory.
    pub fn issue(&self) -> Result<(), CertForgeError> {
        let file = File::open(self.path(INPUT_ARTIFACT)).map_err(|e| {
            error!("Couldn't open input file.");
            CertForgeError::ReadInput(e.to_string())
        })?;
        let mut reader = WireReader::new(BufReader::new(file));
        let request = CertRequest::decode(&mut reader, self.protocol)?;

        let authority = if request.self_signed {
            None
        } else {
            Some(self.load_key()?)
        };

        let issued = issue(&request, authority.as_ref())?;

        match self.protocol {
            Protocol::V1 => self.write_cert_pem(&issued.certificate)?,
            Protocol::V2 => {
                // The produced DER must survive a parse of its own before it
                // leaves the process.
                let der = issued.certificate.to_der()?;
                let reparsed = Certificate::from_der(&der).map_err(|e| {
                    CertForgeError::GenerateCert(format!(
                        "produced certificate failed to re-parse: {e}"
                    ))
                })?;
                self.write_cert_record(&reparsed)?;
            }
        }

        self.write_key_pem(&issued.key)?;
        debug!("issued certificate written to {:?}", self.path(CERT_ARTIFACT));
        Ok(())
    }

    /// Reports the effective certificate of the stored chain: the legacy
    /// `result` record plus a rewritten `cert` artifact.
    pub fn cert_info(&self) -> Result<(), CertForgeError> {
        let chain = self.load_chain()?;
        let cert = last_certificate(&chain)?;
        self.respond_with(cert)
    }

    /// Finds the chain certificate pairing with the stored key, then reports
    /// it and rewrites both credential artifacts.
    pub fn cert_key_info(&self) -> Result<(), CertForgeError> {
        let chain = self.load_chain()?;
        let key = self.load_key()?;
        let cert = find_matching(&chain, &key)?;
        self.respond_with(cert)?;
        self.write_key_pem(&key)
    }

    fn respond_with(&self, cert: &Certificate) -> Result<(), CertForgeError> {
        match self.protocol {
            Protocol::V1 => {
                let info = cert.info()?;
                self.write_result(&info)?;
                self.write_cert_pem(cert)
            }
            Protocol::V2 => self.write_cert_record(cert),
        }
    }

    fn write_cert_pem(&self, cert: &Certificate) -> Result<(), CertForgeError> {
        let pem = cert.to_pem()?;
        fs::write(self.path(CERT_ARTIFACT), pem).map_err(|e| {
            error!("Couldn't open cert file.");
            CertForgeError::WriteCert(e.to_string())
        })
    }

    /// Writes the structured certificate record: the PEM text followed by
    /// the CA flag, the formatted subject name, and the raw subject key
    /// identifier, each length-prefixed.
    fn write_cert_record(&self, cert: &Certificate) -> Result<(), CertForgeError> {
        let info = cert.info()?;
        let pem = cert.to_pem()?;

        let wrap = |e: WireError| {
            error!("Couldn't write cert record.");
            CertForgeError::WriteCert(e.to_string())
        };

        let file = File::create(self.path(CERT_ARTIFACT)).map_err(|e| {
            error!("Couldn't open cert file.");
            CertForgeError::WriteCert(e.to_string())
        })?;
        let mut writer = WireWriter::new(BufWriter::new(file));
        writer.write_bytelen(pem.as_bytes()).map_err(wrap)?;
        writer.write_bool(info.is_ca).map_err(wrap)?;
        writer.write_bytelen(info.subject.as_bytes()).map_err(wrap)?;
        writer.write_bytelen(&info.key_id).map_err(wrap)?;
        writer
            .into_inner()
            .flush()
            .map_err(|e| CertForgeError::WriteCert(e.to_string()))
    }

    /// Writes the legacy introspection record: one CA-flag byte followed by
    /// the raw subject name bytes.
    fn write_result(&self, info: &CertInfo) -> Result<(), CertForgeError> {
        let mut record = Vec::with_capacity(info.subject.len() + 1);
        record.push(u8::from(info.is_ca));
        record.extend_from_slice(info.subject.as_bytes());
        fs::write(self.path(RESULT_ARTIFACT), record).map_err(|e| {
            error!("Couldn't open results file.");
            CertForgeError::WriteCertInfo(e.to_string())
        })
    }

    fn write_key_pem(&self, key: &KeyPair) -> Result<(), CertForgeError> {
        let pem = key.to_pkcs8_pem()?;
        fs::write(self.path(KEY_ARTIFACT), pem).map_err(|e| {
            error!("Couldn't open key file.");
            CertForgeError::WriteKey(e.to_string())
        })
    }
}

/// Helper for preparing stored artifacts: wraps raw bytes in the length
/// prefix the readers expect.
pub fn store_artifact(dir: &Path, name: &str, data: &[u8]) -> std::io::Result<()> {
    let file = File::create(dir.join(name))?;
    let mut writer = WireWriter::new(BufWriter::new(file));
    writer
        .write_bytelen(data)
        .map_err(|e| std::io::Error::other(e.to_string()))?;
    writer.into_inner().flush()
}
