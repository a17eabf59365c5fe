use rcgen::{
    BasicConstraints, Certificate, CertificateParams, DistinguishedName, DnType,
    ExtendedKeyUsagePurpose, IsCa, KeyPair, KeyUsagePurpose, SanType, SerialNumber,
    PKCS_RSA_SHA256,
};
use time::{Duration, OffsetDateTime};

use crate::types::TlsBundle;

const CA_COMMON_NAME: &str = "controlplane-ca";
const CA_VALIDITY: Duration = Duration::days(10 * 365);
const SERVER_VALIDITY: Duration = Duration::days(5 * 365);

/// Issue a self-signed root and a server certificate for `host`.
///
/// Keys are 2048-bit RSA. The server certificate carries `host` as its
/// common name and only DNS name.
pub fn generate_tls_bundle(host: &str) -> Result<TlsBundle, rcgen::Error> {
    let (ca_cert, ca_key) = generate_ca()?;
    let (server_cert, server_key) = generate_server_cert(host, &ca_cert, &ca_key)?;

    Ok(TlsBundle {
        ca_cert: ca_cert.pem().into_bytes(),
        ca_key: ca_key.serialize_pem().into_bytes(),
        server_cert: server_cert.into_bytes(),
        server_key: server_key.into_bytes(),
    })
}

fn generate_key_pair() -> Result<KeyPair, rcgen::Error> {
    KeyPair::generate_for(&PKCS_RSA_SHA256)
}

fn generate_ca() -> Result<(Certificate, KeyPair), rcgen::Error> {
    let key_pair = generate_key_pair()?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, CA_COMMON_NAME);
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from_slice(&[1]));
    params.is_ca = IsCa::Ca(BasicConstraints::Unconstrained);
    params.key_usages = vec![
        KeyUsagePurpose::KeyCertSign,
        KeyUsagePurpose::DigitalSignature,
    ];
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + CA_VALIDITY;

    let cert = params.self_signed(&key_pair)?;
    Ok((cert, key_pair))
}

fn generate_server_cert(
    host: &str,
    ca_cert: &Certificate,
    ca_key: &KeyPair,
) -> Result<(String, String), rcgen::Error> {
    let key_pair = generate_key_pair()?;

    let mut params = CertificateParams::default();
    let mut dn = DistinguishedName::new();
    dn.push(DnType::CommonName, host);
    params.distinguished_name = dn;
    params.serial_number = Some(SerialNumber::from_slice(&[2]));
    params.is_ca = IsCa::NoCa;
    params.key_usages = vec![KeyUsagePurpose::DigitalSignature];
    params.extended_key_usages = vec![ExtendedKeyUsagePurpose::ServerAuth];
    params.subject_alt_names = vec![SanType::DnsName(host.to_string().try_into()?)];
    let now = OffsetDateTime::now_utc();
    params.not_before = now;
    params.not_after = now + SERVER_VALIDITY;

    let cert = params.signed_by(&key_pair, ca_cert, ca_key)?;
    Ok((cert.pem(), key_pair.serialize_pem()))
}
