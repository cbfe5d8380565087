//! Unit tests for the node reconciler

#[cfg(test)]
mod tests {
    use crate::error::ControllerError;
    use crate::node::fixtures::{with_label, with_taint, worker};
    use crate::node::MockNodeStore;
    use crate::reconciler::{Reconciler, RequeueIntervals};
    use k8s_openapi::api::core::v1::Node;
    use kube_runtime::controller::Action;
    use proxmox_client::{MockHypervisorClient, RenameCall};
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    fn store_with(node: Node) -> MockNodeStore {
        let mut store = MockNodeStore::new();
        store
            .expect_get_node()
            .returning(move |_| Ok(Some(node.clone())));
        store
    }

    fn reconciler(
        hypervisor: &MockHypervisorClient,
        node: Node,
    ) -> Reconciler<MockHypervisorClient, MockNodeStore> {
        Reconciler::new(hypervisor.clone(), store_with(node))
    }

    fn intervals() -> RequeueIntervals {
        RequeueIntervals::default()
    }

    #[tokio::test]
    async fn test_matching_name_needs_no_rename() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(100, "worker-01", "pve1", "uuid-1");
        let reconciler = reconciler(&hypervisor, worker("worker-01", "uuid-1"));

        let action = reconciler
            .reconcile_node("worker-01", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(intervals().in_sync));
        assert!(hypervisor.renames().is_empty());
    }

    #[tokio::test]
    async fn test_drifted_name_is_renamed() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(200, "old-name", "pve2", "uuid-2");
        let reconciler = reconciler(&hypervisor, worker("k8s-node-02", "uuid-2"));

        let action = reconciler
            .reconcile_node("k8s-node-02", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(intervals().renamed));
        assert_eq!(
            hypervisor.renames(),
            vec![RenameCall {
                hypervisor_node: "pve2".to_string(),
                vmid: 200,
                new_name: "k8s-node-02".to_string(),
            }]
        );
        assert_eq!(hypervisor.guests()[0].name, "k8s-node-02");
    }

    #[tokio::test]
    async fn test_second_pass_after_rename_is_a_no_op() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(200, "old-name", "pve2", "uuid-2");
        let reconciler = reconciler(&hypervisor, worker("k8s-node-02", "uuid-2"));
        let cancel = CancellationToken::new();

        let first = reconciler.reconcile_node("k8s-node-02", &cancel).await.unwrap();
        let second = reconciler.reconcile_node("k8s-node-02", &cancel).await.unwrap();

        assert_eq!(first, Action::requeue(intervals().renamed));
        assert_eq!(second, Action::requeue(intervals().in_sync));
        assert_eq!(hypervisor.renames().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_identity_requeues_without_rename() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(100, "worker-01", "pve1", "uuid-1");
        let reconciler = reconciler(&hypervisor, worker("worker-03", "uuid-3"));

        let action = reconciler
            .reconcile_node("worker-03", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(intervals().guest_not_found));
        assert!(hypervisor.renames().is_empty());
    }

    #[tokio::test]
    async fn test_similar_guest_names_do_not_influence_matching() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(100, "web-backup", "pve1", "uuid-9");
        hypervisor.add_guest(101, "unnamed", "pve1", "uuid-1");
        let reconciler = reconciler(&hypervisor, worker("web", "uuid-1"));

        reconciler
            .reconcile_node("web", &CancellationToken::new())
            .await
            .unwrap();

        let renames = hypervisor.renames();
        assert_eq!(renames.len(), 1);
        assert_eq!(renames[0].vmid, 101);
    }

    #[tokio::test]
    async fn test_discovery_failure_is_surfaced() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.fail_discovery("all endpoints down");
        let reconciler = reconciler(&hypervisor, worker("worker-01", "uuid-1"));

        let err = reconciler
            .reconcile_node("worker-01", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Discovery));
        assert_eq!(reconciler.error_action(&err), Action::requeue(intervals().error));
        assert!(hypervisor.renames().is_empty());
    }

    #[tokio::test]
    async fn test_rename_failure_is_surfaced() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(200, "old-name", "pve2", "uuid-2");
        hypervisor.fail_mutation("VM is locked (backup)");
        let reconciler = reconciler(&hypervisor, worker("k8s-node-02", "uuid-2"));

        let err = reconciler
            .reconcile_node("k8s-node-02", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Mutation));
        assert_eq!(reconciler.error_action(&err), Action::requeue(intervals().error));
        assert_eq!(hypervisor.guests()[0].name, "old-name");
    }

    #[tokio::test]
    async fn test_control_plane_nodes_are_skipped() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(100, "old-cp", "pve1", "uuid-1");

        for node in [
            with_label(worker("cp-1", "uuid-1"), "node-role.kubernetes.io/control-plane"),
            with_taint(worker("cp-1", "uuid-1"), "node-role.kubernetes.io/master"),
        ] {
            let reconciler = reconciler(&hypervisor, node);
            let action = reconciler
                .reconcile_node("cp-1", &CancellationToken::new())
                .await
                .unwrap();
            assert_eq!(action, Action::requeue(intervals().control_plane));
        }

        assert_eq!(hypervisor.resolve_calls(), 0);
        assert!(hypervisor.renames().is_empty());
    }

    #[tokio::test]
    async fn test_deleted_node_awaits_change() {
        let hypervisor = MockHypervisorClient::new();
        let mut store = MockNodeStore::new();
        store
            .expect_get_node()
            .times(1)
            .returning(|_| Ok(None));
        let reconciler = Reconciler::new(hypervisor.clone(), store);

        let action = reconciler
            .reconcile_node("gone", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(action, Action::await_change());
        assert_eq!(hypervisor.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn test_node_without_system_uuid_requeues() {
        let hypervisor = MockHypervisorClient::new();
        let reconciler = reconciler(&hypervisor, worker("worker-01", ""));

        let action = reconciler
            .reconcile_node("worker-01", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(action, Action::requeue(intervals().guest_not_found));
        assert_eq!(hypervisor.resolve_calls(), 0);
    }

    #[tokio::test]
    async fn test_node_read_failure_is_kube_error() {
        let hypervisor = MockHypervisorClient::new();
        let mut store = MockNodeStore::new();
        store
            .expect_get_node()
            .returning(|_| Err(kube::Error::Service("connection refused".into())));
        let reconciler = Reconciler::new(hypervisor.clone(), store);

        let err = reconciler
            .reconcile_node("worker-01", &CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, ControllerError::Kube(_)));
        assert_eq!(reconciler.error_action(&err), Action::requeue(intervals().error));
    }

    #[tokio::test]
    async fn test_cancelled_reconciliation_touches_nothing() {
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(200, "old-name", "pve2", "uuid-2");
        let mut store = MockNodeStore::new();
        store.expect_get_node().never();
        let reconciler = Reconciler::new(hypervisor.clone(), store);

        let cancel = CancellationToken::new();
        cancel.cancel();
        let err = reconciler.reconcile_node("k8s-node-02", &cancel).await.unwrap_err();

        assert!(matches!(err, ControllerError::Cancelled));
        assert_eq!(hypervisor.resolve_calls(), 0);
        assert!(hypervisor.renames().is_empty());
    }

    #[tokio::test]
    async fn test_custom_requeue_intervals() {
        let custom = RequeueIntervals {
            in_sync: Duration::from_secs(42),
            ..RequeueIntervals::default()
        };
        let hypervisor = MockHypervisorClient::new();
        hypervisor.add_guest(100, "worker-01", "pve1", "uuid-1");
        let reconciler =
            reconciler(&hypervisor, worker("worker-01", "uuid-1")).with_requeue_intervals(custom);

        let action = reconciler
            .reconcile_node("worker-01", &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(reconciler.requeue_intervals(), custom);
        assert_eq!(action, Action::requeue(Duration::from_secs(42)));
    }

    #[test]
    fn test_default_intervals() {
        let defaults = RequeueIntervals::default();
        assert_eq!(defaults.control_plane, Duration::from_secs(300));
        assert_eq!(defaults.guest_not_found, Duration::from_secs(600));
        assert_eq!(defaults.in_sync, Duration::from_secs(1800));
        assert_eq!(defaults.renamed, Duration::from_secs(300));
        assert_eq!(defaults.error, Duration::from_secs(120));
    }
}
