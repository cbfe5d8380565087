//! Kubernetes node access.
//!
//! The reconciler reads nodes through [`NodeStore`] so tests can substitute
//! a mock for the API server.

use async_trait::async_trait;
use k8s_openapi::api::core::v1::Node;
use kube::Api;

#[cfg(test)]
use mockall::automock;

/// Label and taint keys that mark a control-plane node
pub const CONTROL_PLANE_ROLE_KEYS: [&str; 2] = [
    "node-role.kubernetes.io/control-plane",
    "node-role.kubernetes.io/master",
];

/// Read access to cluster nodes.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait NodeStore: Send + Sync {
    /// Fetches a node by name; `None` if it no longer exists.
    async fn get_node(&self, name: &str) -> Result<Option<Node>, kube::Error>;
}

#[async_trait]
impl NodeStore for Api<Node> {
    async fn get_node(&self, name: &str) -> Result<Option<Node>, kube::Error> {
        self.get_opt(name).await
    }
}

/// Returns true if the node carries a control-plane role label or taint.
pub fn is_control_plane(node: &Node) -> bool {
    let labelled = node.metadata.labels.as_ref().is_some_and(|labels| {
        CONTROL_PLANE_ROLE_KEYS
            .iter()
            .any(|key| labels.contains_key(*key))
    });

    let tainted = node
        .spec
        .as_ref()
        .and_then(|spec| spec.taints.as_ref())
        .is_some_and(|taints| {
            taints
                .iter()
                .any(|taint| CONTROL_PLANE_ROLE_KEYS.contains(&taint.key.as_str()))
        });

    labelled || tainted
}

/// The hardware UUID the kubelet reported, if any.
pub fn system_uuid(node: &Node) -> Option<&str> {
    node.status
        .as_ref()
        .and_then(|status| status.node_info.as_ref())
        .map(|info| info.system_uuid.trim())
        .filter(|uuid| !uuid.is_empty())
}
