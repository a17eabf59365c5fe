use tracing::info;

use crate::error::{ControlPlaneError, Result};
use crate::registry::{cert_key, CertEntry, Registry};
use crate::types::StoredCertificates;

/// Write root cert, server cert and server key for `cluster`.
///
/// Entries are written one by one; a failure leaves earlier entries behind.
pub async fn save(registry: &Registry, cluster: &str, certs: &StoredCertificates) -> Result<()> {
    for entry in CertEntry::ALL {
        let value = match entry {
            CertEntry::CaCert => &certs.ca_cert,
            CertEntry::ServerCert => &certs.server_cert,
            CertEntry::ServerKey => &certs.server_key,
        };
        registry
            .put_bytes(&cert_key(cluster, entry), value.clone())
            .await?;
    }

    info!("Stored TLS material for cluster {}", cluster);
    Ok(())
}

/// Read all three entries. Any missing entry fails the whole load.
pub async fn load(registry: &Registry, cluster: &str) -> Result<StoredCertificates> {
    let ca_cert = read(registry, cluster, CertEntry::CaCert).await?;
    let server_cert = read(registry, cluster, CertEntry::ServerCert).await?;
    let server_key = read(registry, cluster, CertEntry::ServerKey).await?;

    Ok(StoredCertificates {
        ca_cert,
        server_cert,
        server_key,
    })
}

async fn read(registry: &Registry, cluster: &str, entry: CertEntry) -> Result<Vec<u8>> {
    registry
        .get_bytes(&cert_key(cluster, entry))
        .await?
        .ok_or_else(|| ControlPlaneError::MissingCertificate(entry.file_name().to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use std::sync::Arc;

    fn certs() -> StoredCertificates {
        StoredCertificates {
            ca_cert: b"ca".to_vec(),
            server_cert: b"cert".to_vec(),
            server_key: b"key".to_vec(),
        }
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let registry = Registry::new(Arc::new(MemoryStore::new()));
        save(&registry, "east1", &certs()).await.unwrap();

        let loaded = load(&registry, "east1").await.unwrap();
        assert!(loaded == certs());
        assert!(load(&registry, "west1").await.is_err());
    }

    #[tokio::test]
    async fn test_load_fails_closed_on_any_missing_entry() {
        for missing in CertEntry::ALL {
            let store = Arc::new(MemoryStore::new());
            let registry = Registry::new(store.clone());
            save(&registry, "east1", &certs()).await.unwrap();

            assert!(store.delete(&cert_key("east1", missing)).await);

            match load(&registry, "east1").await {
                Err(ControlPlaneError::MissingCertificate(name)) => {
                    assert_eq!(name, missing.file_name());
                }
                Err(e) => panic!("unexpected error: {}", e),
                Ok(_) => panic!("load succeeded without {}", missing.file_name()),
            }
        }
    }
}
