//! Root CA and leaf certificate issuance.
//!
//! The root is a self-signed RSA-4096 CA valid for ten years. Its key is
//! persisted as a PKCS#1 `RSA PRIVATE KEY` PEM block; keys in PKCS#8 form
//! are accepted on load as well. Leaves are issued per target URL and carry
//! the URL as a URI SAN plus the host as a DNS or IP SAN.

use std::fmt;
use std::fs;
use std::net::IpAddr;
use std::path::{Path, PathBuf};

use pkcs8::der::asn1::AnyRef;
use pkcs8::der::{Decode, Encode};
use pkcs8::{AlgorithmIdentifierRef, ObjectIdentifier, PrivateKeyInfo};
use rcgen::string::Ia5String;
use rcgen::{
    BasicConstraints, CertificateParams, DistinguishedName, DnType, ExtendedKeyUsagePurpose, IsCa,
    Issuer, KeyPair, KeyUsagePurpose, RsaKeySize, SanType, PKCS_RSA_SHA256,
};
use rustls::pki_types::{CertificateDer, PrivateKeyDer, PrivatePkcs8KeyDer};
use time::{Duration, OffsetDateTime};
use url::{Host, Url};

use passive_core::settings::{CA_CERT_FILENAME, CA_KEY_FILENAME};

pub use crate::error::CaError;

/// Validity of both root and leaf certificates.
const VALIDITY_DAYS: i64 = 3650;

const ROOT_COMMON_NAME: &str = "Passive Scanner Root CA";
const ROOT_ORGANIZATION: &str = "PassiveScanner";

const PKCS1_PEM_TAG: &str = "RSA PRIVATE KEY";
const PKCS8_PEM_TAG: &str = "PRIVATE KEY";
const CERT_PEM_TAG: &str = "CERTIFICATE";

/// rsaEncryption (PKCS #1).
const RSA_ENCRYPTION: ObjectIdentifier = ObjectIdentifier::new_unwrap("1.2.840.113549.1.1.1");

/// A certificate and its private key, both PEM encoded.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PemPair {
    /// `CERTIFICATE` block.
    pub cert_pem: String,
    /// `RSA PRIVATE KEY` block.
    pub key_pem: String,
}

impl PemPair {
    /// Writes `ca.pem` and `caprikey.pem` into `dir`.
    ///
    /// Returns the certificate and key paths.
    pub fn write_to(&self, dir: &Path) -> Result<(PathBuf, PathBuf), CaError> {
        let cert_path = dir.join(CA_CERT_FILENAME);
        let key_path = dir.join(CA_KEY_FILENAME);

        fs::write(&cert_path, &self.cert_pem)
            .map_err(|e| CaError::Write(format!("{}: {}", cert_path.display(), e)))?;
        fs::write(&key_path, &self.key_pem)
            .map_err(|e| CaError::Write(format!("{}: {}", key_path.display(), e)))?;

        tracing::info!("Generated new CA certificate at {:?}", cert_path);
        Ok((cert_path, key_path))
    }
}

/// A leaf certificate issued for one target.
#[derive(Debug)]
pub struct IssuedLeaf {
    /// Leaf certificate, PEM.
    pub cert_pem: String,
    /// Leaf key, PKCS#1 PEM.
    pub key_pem: String,
    /// Leaf certificate, DER.
    pub cert_der: CertificateDer<'static>,
    /// Leaf key, PKCS#8 DER.
    pub key_der: PrivateKeyDer<'static>,
}

/// Generates a new self-signed root CA.
///
/// RSA-4096 key generation is slow; call this off the async runtime.
pub fn generate_root() -> Result<PemPair, CaError> {
    let key_pair = generate_rsa_key()?;

    let mut params = CertificateParams::default();
    params.distinguished_name = root_name();
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::DigitalSignature,
        KeyUsagePurpose::KeyCertSign,
    ];
    params.extended_key_usages = vec![
        ExtendedKeyUsagePurpose::ClientAuth,
        ExtendedKeyUsagePurpose::ServerAuth,
    ];
    set_validity(&mut params);

    let cert = params
        .self_signed(&key_pair)
        .map_err(|e| CaError::Crypto(e.to_string()))?;

    Ok(PemPair {
        cert_pem: cert.pem(),
        key_pem: pkcs1_pem(&key_pair)?,
    })
}

/// A loaded root CA able to sign leaves.
pub struct CertificateAuthority {
    issuer: Issuer<'static, KeyPair>,
    root_der: CertificateDer<'static>,
}

impl fmt::Debug for CertificateAuthority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CertificateAuthority")
            .field("root_der_len", &self.root_der.len())
            .finish()
    }
}

impl CertificateAuthority {
    /// Parses a root certificate and key from PEM text.
    pub fn from_pem(cert_pem: &str, key_pem: &str) -> Result<Self, CaError> {
        let cert = pem::parse(cert_pem).map_err(|e| CaError::Parse(e.to_string()))?;
        if cert.tag() != CERT_PEM_TAG {
            return Err(CaError::Parse(format!(
                "expected a {} block, found {}",
                CERT_PEM_TAG,
                cert.tag()
            )));
        }

        let key_pair = KeyPair::from_pem(&pkcs8_pem(key_pem)?)
            .map_err(|e| CaError::Parse(e.to_string()))?;
        let issuer = Issuer::from_ca_cert_pem(cert_pem, key_pair)
            .map_err(|e| CaError::Parse(e.to_string()))?;

        Ok(Self {
            issuer,
            root_der: CertificateDer::from(cert.into_contents()),
        })
    }

    /// Reads the root certificate and key from disk.
    pub fn load(cert_path: &Path, key_path: &Path) -> Result<Self, CaError> {
        let cert_pem = fs::read_to_string(cert_path)?;
        let key_pem = fs::read_to_string(key_path)?;
        let authority = Self::from_pem(&cert_pem, &key_pem)?;
        tracing::debug!("Loaded CA certificate from {:?}", cert_path);
        Ok(authority)
    }

    /// DER encoding of the root certificate.
    pub fn root_der(&self) -> &CertificateDer<'static> {
        &self.root_der
    }

    /// Issues a leaf certificate for `target`, e.g. `https://example.com:443`.
    ///
    /// The leaf gets a fresh RSA-4096 key, the target URL as a URI SAN and
    /// the target host as a DNS (or IP) SAN. Like [`generate_root`] this is
    /// CPU heavy.
    pub fn issue_leaf(&self, target: &str) -> Result<IssuedLeaf, CaError> {
        let url = Url::parse(target).map_err(|e| CaError::InvalidUrl(format!("{}: {}", target, e)))?;
        let host_san = match url.host() {
            Some(Host::Domain(domain)) => SanType::DnsName(
                Ia5String::try_from(domain.to_string())
                    .map_err(|e| CaError::InvalidUrl(format!("{}: {}", target, e)))?,
            ),
            Some(Host::Ipv4(ip)) => SanType::IpAddress(IpAddr::V4(ip)),
            Some(Host::Ipv6(ip)) => SanType::IpAddress(IpAddr::V6(ip)),
            None => return Err(CaError::InvalidUrl(format!("{}: no host", target))),
        };
        let uri_san = Ia5String::try_from(target.to_string())
            .map_err(|e| CaError::InvalidUrl(format!("{}: {}", target, e)))?;

        let mut name = DistinguishedName::new();
        name.push(DnType::OrganizationName, target);
        name.push(DnType::CountryName, "CN");
        if let Some(host) = url.host_str() {
            name.push(DnType::CommonName, host);
        }

        let mut params = CertificateParams::default();
        params.distinguished_name = name;
        params.is_ca = IsCa::NoCa;
        params.use_authority_key_identifier_extension = true;
        params.subject_alt_names = vec![SanType::URI(uri_san), host_san];
        params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
        params.extended_key_usages = vec![
            ExtendedKeyUsagePurpose::ClientAuth,
            ExtendedKeyUsagePurpose::ServerAuth,
        ];
        set_validity(&mut params);

        let key_pair = generate_rsa_key()?;
        let cert = params
            .signed_by(&key_pair, &self.issuer)
            .map_err(|e| CaError::Crypto(e.to_string()))?;

        Ok(IssuedLeaf {
            cert_pem: cert.pem(),
            key_pem: pkcs1_pem(&key_pair)?,
            cert_der: cert.der().clone(),
            key_der: PrivateKeyDer::from(PrivatePkcs8KeyDer::from(key_pair.serialize_der())),
        })
    }
}

fn generate_rsa_key() -> Result<KeyPair, CaError> {
    KeyPair::generate_rsa_for(&PKCS_RSA_SHA256, RsaKeySize::_4096)
        .map_err(|e| CaError::Crypto(e.to_string()))
}

fn root_name() -> DistinguishedName {
    let mut name = DistinguishedName::new();
    name.push(DnType::CommonName, ROOT_COMMON_NAME);
    name.push(DnType::OrganizationName, ROOT_ORGANIZATION);
    name.push(DnType::CountryName, "CN");
    name
}

fn set_validity(params: &mut CertificateParams) {
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + Duration::days(VALIDITY_DAYS);
}

/// Serializes an RSA key pair as a PKCS#1 PEM block.
fn pkcs1_pem(key_pair: &KeyPair) -> Result<String, CaError> {
    let pkcs1 = pkcs8_to_pkcs1(&key_pair.serialize_der())?;
    Ok(pem::encode(&pem::Pem::new(PKCS1_PEM_TAG, pkcs1)))
}

/// Rewrites a PKCS#1 PEM key as PKCS#8 so rcgen can load it. Other PEM
/// blocks pass through untouched.
fn pkcs8_pem(key_pem: &str) -> Result<String, CaError> {
    let block = pem::parse(key_pem).map_err(|e| CaError::Parse(e.to_string()))?;
    if block.tag() != PKCS1_PEM_TAG {
        return Ok(key_pem.to_string());
    }
    let pkcs8 = pkcs1_to_pkcs8(block.contents())?;
    Ok(pem::encode(&pem::Pem::new(PKCS8_PEM_TAG, pkcs8)))
}

/// Extracts the `RSAPrivateKey` from a PKCS#8 `PrivateKeyInfo`.
fn pkcs8_to_pkcs1(der: &[u8]) -> Result<Vec<u8>, CaError> {
    let info = PrivateKeyInfo::from_der(der).map_err(|e| CaError::Crypto(e.to_string()))?;
    if info.algorithm.oid != RSA_ENCRYPTION {
        return Err(CaError::Crypto(format!(
            "expected an RSA key, found {}",
            info.algorithm.oid
        )));
    }
    Ok(info.private_key.to_vec())
}

/// Wraps an `RSAPrivateKey` into a PKCS#8 `PrivateKeyInfo`.
fn pkcs1_to_pkcs8(pkcs1: &[u8]) -> Result<Vec<u8>, CaError> {
    let algorithm = AlgorithmIdentifierRef {
        oid: RSA_ENCRYPTION,
        parameters: Some(AnyRef::NULL),
    };
    PrivateKeyInfo::new(algorithm, pkcs1)
        .to_der()
        .map_err(|e| CaError::Parse(e.to_string()))
}
