//! X.509v3 certificate issuance and introspection driven by a compact
//! binary request format, built on the pure-Rust RustCrypto stack.
//!
//! A request arrives as a fixed sequence of length-prefixed wire fields
//! ([`wire`], [`request`]) naming the subject, validity window, key and
//! digest algorithms, and the extension content. Issuance ([`issue`])
//! generates a fresh subject key pair, assembles the v3 extension set, and
//! signs with either the new key or a stored authority key. Introspection
//! ([`inspect`]) reports the attributes of stored certificates and matches
//! private keys against certificate chains.
//!
//! File-based entry operations over an artifact directory live in [`ops`];
//! the `certforge` binary is a thin CLI over those. Two protocol variants
//! exist side by side ([`request::Protocol`]): a legacy PEM-emitting form
//! and the current form with explicit authority-key-identifier bytes and a
//! structured response record.

pub mod cert;
pub mod error;
pub mod inspect;
pub mod issue;
pub mod key;
pub mod ops;
pub mod pem_utils;
pub mod request;
pub mod wire;

pub use error::CertForgeError;
