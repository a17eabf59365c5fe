use std::path::PathBuf;
use std::time::Duration;
use tracing::debug;

use crate::error::Result;

pub const PROVIDER_BAREMETAL: &str = "baremetal";
pub const PROVIDER_AWS: &str = "aws";
pub const PROVIDER_GCP: &str = "gcp";
pub const UNKNOWN: &str = "unknown";

const OS_RELEASE_PATH: &str = "/etc/os-release";
const AWS_METADATA_ENDPOINT: &str = "http://169.254.169.254";
const GCP_METADATA_ENDPOINT: &str = "http://metadata.google.internal";
const GCP_METADATA_HEADER: (&str, &str) = ("Metadata-Flavor", "Google");
const PROBE_TIMEOUT: Duration = Duration::from_millis(500);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeMetadata {
    pub provider: String,
    pub location: String,
    pub node_id: String,
    pub os_name: String,
    pub os_version: String,
}

impl Default for NodeMetadata {
    fn default() -> Self {
        Self {
            provider: PROVIDER_BAREMETAL.to_string(),
            location: UNKNOWN.to_string(),
            node_id: String::new(),
            os_name: std::env::consts::OS.to_string(),
            os_version: UNKNOWN.to_string(),
        }
    }
}

/// Probes the OS release file, then the AWS and GCP metadata services.
///
/// When both clouds answer, GCP wins because it is probed last.
#[derive(Debug, Clone)]
pub struct MetadataDetector {
    os_release: PathBuf,
    aws_endpoint: String,
    gcp_endpoint: String,
    client: reqwest::Client,
}

impl MetadataDetector {
    pub fn new() -> Result<Self> {
        Self::with_endpoints(OS_RELEASE_PATH, AWS_METADATA_ENDPOINT, GCP_METADATA_ENDPOINT)
    }

    pub fn with_endpoints(
        os_release: impl Into<PathBuf>,
        aws_endpoint: impl Into<String>,
        gcp_endpoint: impl Into<String>,
    ) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(PROBE_TIMEOUT).build()?;

        Ok(Self {
            os_release: os_release.into(),
            aws_endpoint: aws_endpoint.into(),
            gcp_endpoint: gcp_endpoint.into(),
            client,
        })
    }

    pub async fn detect(&self) -> NodeMetadata {
        let mut meta = NodeMetadata::default();

        match tokio::fs::read_to_string(&self.os_release).await {
            Ok(content) => {
                let (name, version) = parse_os_release(&content);
                if let Some(name) = name {
                    meta.os_name = name;
                }
                if let Some(version) = version {
                    meta.os_version = version;
                }
            }
            Err(e) => debug!("Cannot read {:?}: {}", self.os_release, e),
        }

        if self.is_reachable(&self.aws_endpoint).await {
            meta.provider = PROVIDER_AWS.to_string();
            meta.location = self
                .try_get(
                    &format!("{}/latest/meta-data/placement/region", self.aws_endpoint),
                    None,
                )
                .await;
            meta.node_id = self
                .try_get(
                    &format!("{}/latest/meta-data/instance-id", self.aws_endpoint),
                    None,
                )
                .await;
        }

        if self.is_reachable(&self.gcp_endpoint).await {
            meta.provider = PROVIDER_GCP.to_string();
            meta.location = self
                .try_get(
                    &format!("{}/computeMetadata/v1/instance/zone", self.gcp_endpoint),
                    Some(GCP_METADATA_HEADER),
                )
                .await;
            meta.node_id = self
                .try_get(
                    &format!("{}/computeMetadata/v1/instance/id", self.gcp_endpoint),
                    Some(GCP_METADATA_HEADER),
                )
                .await;
        }

        debug!("Detected node metadata: {:?}", meta);
        meta
    }

    /// Any HTTP answer counts as reachable.
    async fn is_reachable(&self, url: &str) -> bool {
        match self.client.get(url).send().await {
            Ok(_) => true,
            Err(e) => {
                debug!("Metadata endpoint {} unreachable: {}", url, e);
                false
            }
        }
    }

    async fn try_get(&self, url: &str, header: Option<(&str, &str)>) -> String {
        let mut req = self.client.get(url);
        if let Some((name, value)) = header {
            req = req.header(name, value);
        }

        let resp = match req.send().await.and_then(|r| r.error_for_status()) {
            Ok(resp) => resp,
            Err(e) => {
                debug!("Metadata request {} failed: {}", url, e);
                return String::new();
            }
        };

        match resp.text().await {
            Ok(body) => body.trim().to_string(),
            Err(e) => {
                debug!("Failed to read metadata response {}: {}", url, e);
                String::new()
            }
        }
    }
}

/// Extract `NAME` and `VERSION_ID` from os-release content.
pub fn parse_os_release(content: &str) -> (Option<String>, Option<String>) {
    let mut name = None;
    let mut version = None;

    for line in content.lines() {
        let line = line.trim();
        if let Some(value) = line.strip_prefix("NAME=") {
            name = Some(value.trim_matches('"').to_string());
        } else if let Some(value) = line.strip_prefix("VERSION_ID=") {
            version = Some(value.trim_matches('"').to_string());
        }
    }

    (name, version)
}
