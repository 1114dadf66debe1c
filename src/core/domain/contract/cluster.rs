use crate::core::domain::model::{
    client_config::ClientConfig, cluster_detection::ClusterDetection,
    cluster_endpoint::ClusterEndpoint,
};
use async_trait::async_trait;

/// Classifies a PVE endpoint as standalone or clustered.
///
/// Probing never fails outright: unreachable or non-clustered endpoints yield
/// [`ClusterDetection::standalone`].
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait ClusterProbe: Send + Sync {
    /// `existing` carries the endpoints already stored for the instance so operator
    /// overrides and pinned fingerprints survive a re-probe.
    async fn probe(
        &self,
        config: &ClientConfig,
        instance_name: &str,
        existing: &[ClusterEndpoint],
    ) -> ClusterDetection;
}
