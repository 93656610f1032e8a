//! Certificate fixtures generated at test time.

use once_cell::sync::Lazy;
use rcgen::{CertificateParams, DnType, KeyPair, PKCS_RSA_SHA256};
use rsa::pkcs1::EncodeRsaPrivateKey;
use rsa::pkcs8::{EncodePrivateKey, LineEnding};
use rsa::RsaPrivateKey;

/// One RSA key shared by every test; generating them is slow
pub static RSA_KEY: Lazy<RsaPrivateKey> = Lazy::new(|| {
    RsaPrivateKey::new(&mut rand::thread_rng(), 2048).expect("generate RSA key")
});

pub fn rsa_pkcs8_pem() -> String {
    RSA_KEY
        .to_pkcs8_pem(LineEnding::LF)
        .expect("encode PKCS#8")
        .to_string()
}

pub fn rsa_pkcs1_pem() -> String {
    RSA_KEY
        .to_pkcs1_pem(LineEnding::LF)
        .expect("encode PKCS#1")
        .to_string()
}

/// Leaf certificate for `domains`, self-signed with [`RSA_KEY`]
pub fn leaf_certificate(domains: &[&str]) -> rcgen::Certificate {
    let key_pair = KeyPair::from_pem_and_sign_algo(&rsa_pkcs8_pem(), &PKCS_RSA_SHA256)
        .expect("load RSA key into rcgen");
    let names: Vec<String> = domains.iter().map(|d| d.to_string()).collect();
    let mut params = CertificateParams::new(names).expect("leaf params");
    params
        .distinguished_name
        .push(DnType::CommonName, domains[0]);
    params.self_signed(&key_pair).expect("self-sign leaf")
}

/// Stand-in CA certificate with the given common name
pub fn ca_certificate(common_name: &str) -> rcgen::Certificate {
    let key_pair = KeyPair::generate().expect("generate CA key");
    let mut params = CertificateParams::new(Vec::<String>::new()).expect("CA params");
    params
        .distinguished_name
        .push(DnType::CommonName, common_name);
    params.is_ca = rcgen::IsCa::Ca(rcgen::BasicConstraints::Unconstrained);
    params.self_signed(&key_pair).expect("self-sign CA")
}
