//! PEM to PKCS#12 bundle conversion.
//!
//! Key Vault only imports certificates as PKCS#12 (PFX) or as a single PEM
//! with an unencrypted key, so the material returned by the CA is repacked
//! here, in memory, into a password-protected PFX.

use std::fmt;

use base64::Engine;
use rsa::pkcs1::DecodeRsaPrivateKey;
use rsa::pkcs8::{DecodePrivateKey, EncodePrivateKey};
use rsa::RsaPrivateKey;
use thiserror::Error;
use tracing::debug;
use x509_parser::certificate::X509Certificate;
use x509_parser::prelude::FromDer;

use vaultcert_common::SecretString;

/// Friendly name used when the leaf has no common name
const DEFAULT_FRIENDLY_NAME: &str = "certificate";

/// Why PEM material could not be turned into a bundle
#[derive(Debug, Error)]
pub enum ConversionError {
    /// The key input holds no decodable PEM block
    #[error("Failed to decode private key PEM: {0}")]
    MalformedKey(String),

    /// The key is neither PKCS#1 nor PKCS#8 RSA
    #[error("Unsupported private key format: {0}")]
    UnsupportedKeyFormat(String),

    /// The certificate input holds no PEM blocks
    #[error("No certificates found in PEM data")]
    NoCertificatesFound,

    /// A PEM block is not a valid X.509 certificate
    #[error("Failed to parse certificate #{index}: {reason}")]
    MalformedCertificate { index: usize, reason: String },

    /// PKCS#12 encoding failed
    #[error("Failed to encode PKCS#12 bundle: {0}")]
    Encoding(String),
}

/// Password-protected PKCS#12 bundle
#[derive(Clone)]
pub struct Bundle {
    der: Vec<u8>,
    password: SecretString,
}

impl Bundle {
    /// Raw DER bytes
    pub fn der(&self) -> &[u8] {
        &self.der
    }

    /// Password protecting the bundle; may be empty
    pub fn password(&self) -> &SecretString {
        &self.password
    }

    /// Standard base64 of the DER bytes, as the import API expects
    pub fn to_base64(&self) -> String {
        base64::engine::general_purpose::STANDARD.encode(&self.der)
    }
}

impl fmt::Debug for Bundle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Bundle")
            .field("len", &self.der.len())
            .field("password", &self.password)
            .finish()
    }
}

/// Convert a PEM chain and private key into a PKCS#12 bundle.
///
/// The first certificate in `cert_pem` is the leaf; every following one is
/// added as a CA certificate in the order it appears. Nothing is written on
/// failure.
pub fn convert(
    cert_pem: &str,
    key_pem: &str,
    password: &SecretString,
) -> Result<Bundle, ConversionError> {
    let key = decode_private_key(key_pem)?;
    let certs = decode_certificates(cert_pem)?;

    let key_der = key
        .to_pkcs8_der()
        .map_err(|e| ConversionError::Encoding(format!("re-encoding key: {}", e)))?;

    let (leaf, chain) = certs
        .split_first()
        .ok_or(ConversionError::NoCertificatesFound)?;
    let chain: Vec<&[u8]> = chain.iter().map(Vec::as_slice).collect();
    let friendly_name = friendly_name(leaf);

    let pfx = p12::PFX::new_with_cas(
        leaf,
        key_der.as_bytes(),
        &chain,
        password.expose(),
        &friendly_name,
    )
    .ok_or_else(|| ConversionError::Encoding("PKCS#12 encoder rejected input".to_string()))?;

    let der = pfx.to_der();
    debug!(
        certificates = certs.len(),
        bytes = der.len(),
        "Converted certificate chain to PKCS#12"
    );

    Ok(Bundle {
        der,
        password: password.clone(),
    })
}

/// Read the first PEM block and accept PKCS#1 or PKCS#8 RSA keys
fn decode_private_key(key_pem: &str) -> Result<RsaPrivateKey, ConversionError> {
    let block = pem::parse(key_pem).map_err(|e| ConversionError::MalformedKey(e.to_string()))?;
    let der = block.contents();

    match RsaPrivateKey::from_pkcs1_der(der) {
        Ok(key) => Ok(key),
        Err(pkcs1_err) => RsaPrivateKey::from_pkcs8_der(der).map_err(|pkcs8_err| {
            ConversionError::UnsupportedKeyFormat(format!(
                "PKCS#1: {}, PKCS#8: {}",
                pkcs1_err, pkcs8_err
            ))
        }),
    }
}

/// Decode every PEM block as an X.509 certificate, keeping source order
fn decode_certificates(cert_pem: &str) -> Result<Vec<Vec<u8>>, ConversionError> {
    let blocks = pem::parse_many(cert_pem).map_err(|e| ConversionError::MalformedCertificate {
        index: 0,
        reason: e.to_string(),
    })?;

    if blocks.is_empty() {
        return Err(ConversionError::NoCertificatesFound);
    }

    blocks
        .into_iter()
        .enumerate()
        .map(|(index, block)| {
            X509Certificate::from_der(block.contents()).map_err(|e| {
                ConversionError::MalformedCertificate {
                    index,
                    reason: e.to_string(),
                }
            })?;
            Ok(block.into_contents())
        })
        .collect()
}

fn friendly_name(leaf_der: &[u8]) -> String {
    X509Certificate::from_der(leaf_der)
        .ok()
        .and_then(|(_, cert)| {
            cert.subject()
                .iter_common_name()
                .next()
                .and_then(|cn| cn.as_str().ok())
                .map(str::to_string)
        })
        .unwrap_or_else(|| DEFAULT_FRIENDLY_NAME.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{ca_certificate, leaf_certificate, rsa_pkcs1_pem, rsa_pkcs8_pem, RSA_KEY};

    fn parse_bundle(bundle: &Bundle, password: &str) -> (Vec<Vec<u8>>, Vec<Vec<u8>>) {
        let pfx = p12::PFX::parse(bundle.der()).unwrap();
        assert!(pfx.verify_mac(password));
        (
            pfx.key_bags(password).unwrap(),
            pfx.cert_x509_bags(password).unwrap(),
        )
    }

    #[test]
    fn test_round_trip_recovers_leaf_and_key() {
        let leaf = leaf_certificate(&["example.com", "www.example.com"]);
        let password = SecretString::new("hunter2");

        let bundle = convert(&leaf.pem(), &rsa_pkcs8_pem(), &password).unwrap();
        let (keys, certs) = parse_bundle(&bundle, "hunter2");

        assert_eq!(keys.len(), 1);
        let recovered = RsaPrivateKey::from_pkcs8_der(&keys[0]).unwrap();
        assert_eq!(recovered, *RSA_KEY);

        assert_eq!(certs, vec![leaf.der().to_vec()]);
        assert_eq!(bundle.password().expose(), "hunter2");
    }

    #[test]
    fn test_wrong_password_fails_mac() {
        let leaf = leaf_certificate(&["example.com"]);
        let bundle = convert(&leaf.pem(), &rsa_pkcs8_pem(), &SecretString::new("right")).unwrap();

        let pfx = p12::PFX::parse(bundle.der()).unwrap();
        assert!(!pfx.verify_mac("wrong"));
    }

    #[test]
    fn test_empty_password_is_preserved() {
        let leaf = leaf_certificate(&["example.com"]);
        let bundle = convert(&leaf.pem(), &rsa_pkcs8_pem(), &SecretString::new("")).unwrap();

        assert!(bundle.password().is_empty());
        let (keys, certs) = parse_bundle(&bundle, "");
        assert_eq!(keys.len(), 1);
        assert_eq!(certs.len(), 1);
    }

    #[test]
    fn test_pkcs1_key_is_accepted() {
        let leaf = leaf_certificate(&["example.com"]);
        let bundle = convert(&leaf.pem(), &rsa_pkcs1_pem(), &SecretString::new("pw")).unwrap();

        let (keys, _) = parse_bundle(&bundle, "pw");
        assert_eq!(RsaPrivateKey::from_pkcs8_der(&keys[0]).unwrap(), *RSA_KEY);
    }

    #[test]
    fn test_chain_order_is_preserved() {
        let leaf = leaf_certificate(&["example.com"]);
        let intermediate1 = ca_certificate("Intermediate 1");
        let intermediate2 = ca_certificate("Intermediate 2");
        let chain_pem = format!("{}{}{}", leaf.pem(), intermediate1.pem(), intermediate2.pem());

        let bundle = convert(&chain_pem, &rsa_pkcs8_pem(), &SecretString::new("pw")).unwrap();
        let (_, certs) = parse_bundle(&bundle, "pw");

        assert_eq!(
            certs,
            vec![
                leaf.der().to_vec(),
                intermediate1.der().to_vec(),
                intermediate2.der().to_vec(),
            ]
        );
    }

    #[test]
    fn test_base64_encoding() {
        let leaf = leaf_certificate(&["example.com"]);
        let bundle = convert(&leaf.pem(), &rsa_pkcs8_pem(), &SecretString::new("pw")).unwrap();

        let decoded = base64::engine::general_purpose::STANDARD
            .decode(bundle.to_base64())
            .unwrap();
        assert_eq!(decoded, bundle.der());
    }

    #[test]
    fn test_malformed_key() {
        let leaf = leaf_certificate(&["example.com"]);
        let err = convert(&leaf.pem(), "not a pem at all", &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedKey(_)));
    }

    #[test]
    fn test_unsupported_key_format() {
        let leaf = leaf_certificate(&["example.com"]);

        // ECDSA keys parse as PKCS#8 but are not RSA
        let ec_key = rcgen::KeyPair::generate().unwrap();
        let err = convert(&leaf.pem(), &ec_key.serialize_pem(), &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedKeyFormat(_)));

        let garbage = pem::encode(&pem::Pem::new("PRIVATE KEY", vec![1u8, 2, 3, 4]));
        let err = convert(&leaf.pem(), &garbage, &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::UnsupportedKeyFormat(_)));
    }

    #[test]
    fn test_no_certificates_found() {
        let err = convert("", &rsa_pkcs8_pem(), &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::NoCertificatesFound));

        let err = convert("just some text\n", &rsa_pkcs8_pem(), &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::NoCertificatesFound));
    }

    #[test]
    fn test_malformed_certificate_fails_whole_chain() {
        let leaf = leaf_certificate(&["example.com"]);
        let bogus = pem::encode(&pem::Pem::new("CERTIFICATE", vec![0x30, 0x03, 0x02, 0x01, 0x01]));
        let chain_pem = format!("{}{}", leaf.pem(), bogus);

        let err = convert(&chain_pem, &rsa_pkcs8_pem(), &SecretString::default()).unwrap_err();
        assert!(matches!(err, ConversionError::MalformedCertificate { index: 1, .. }));
    }

    #[test]
    fn test_friendly_name_uses_common_name() {
        let leaf = leaf_certificate(&["example.com"]);
        assert_eq!(friendly_name(leaf.der()), "example.com");
        assert_eq!(friendly_name(&[1, 2, 3]), DEFAULT_FRIENDLY_NAME);
    }

    #[test]
    fn test_debug_hides_password() {
        let leaf = leaf_certificate(&["example.com"]);
        let bundle = convert(&leaf.pem(), &rsa_pkcs8_pem(), &SecretString::new("s3cret")).unwrap();
        assert!(!format!("{:?}", bundle).contains("s3cret"));
    }
}
