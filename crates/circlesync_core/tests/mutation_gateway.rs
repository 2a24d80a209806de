use circlesync_core::{
    CommitPayload, InMemoryLedger, Mutation, MutationGateway, NodeKind, OperationKind,
    OperationStatus, Synchronizer, TreeBuilder, ROOT_ID,
};
use std::sync::Arc;
use std::time::Duration;

fn setup() -> (Arc<InMemoryLedger>, Arc<MutationGateway>) {
    let ledger = Arc::new(InMemoryLedger::new("Anchor"));
    let sync = Arc::new(Synchronizer::new(ledger.clone(), TreeBuilder::default()));
    let gateway = Arc::new(MutationGateway::new(ledger.clone(), sync));
    (ledger, gateway)
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[tokio::test]
async fn confirmed_create_refreshes_the_view() {
    let (_, gateway) = setup();
    let operation = gateway
        .submit(Mutation::Create {
            parent_id: ROOT_ID,
            label: "  Ops  ".to_string(),
            kind: NodeKind::Implementation,
        })
        .await;

    assert_eq!(operation.status, OperationStatus::Confirmed);
    assert_eq!(operation.created_id().as_deref(), Some("1"));
    assert!(!gateway.is_pending());

    let sync = gateway.synchronizer();
    assert_eq!(sync.completed_passes(), 1);
    assert_eq!(sync.label_of(1).as_deref(), Some("Ops"));
    assert_eq!(gateway.operations(), vec![operation]);
}

#[tokio::test]
async fn edit_and_move_apply_through_the_ledger() {
    let (ledger, gateway) = setup();
    let ops = ledger.seed(ROOT_ID, "Ops", NodeKind::Policy);
    let finance = ledger.seed(ROOT_ID, "Finance", NodeKind::Policy);

    let edited = gateway
        .submit(Mutation::Edit {
            id: ops,
            label: "Operations".to_string(),
            kind: NodeKind::Implementation,
        })
        .await;
    assert!(edited.is_confirmed());

    let moved = gateway
        .submit(Mutation::Move {
            id: finance,
            new_parent_id: ops,
        })
        .await;
    assert!(moved.is_confirmed());

    let tree = gateway.synchronizer().current_tree().unwrap();
    let ops_view = tree.find(ops).unwrap();
    assert_eq!(ops_view.label, "Operations");
    assert_eq!(ops_view.meta.kind, NodeKind::Implementation);
    assert_eq!(ops_view.children[0].meta.id, finance);
}

#[tokio::test]
async fn remote_failure_message_is_surfaced_verbatim() {
    let (ledger, gateway) = setup();
    ledger.reject_writes("execution reverted: caller is not a circle member");

    let operation = gateway
        .submit(Mutation::Create {
            parent_id: ROOT_ID,
            label: "Ops".to_string(),
            kind: NodeKind::Policy,
        })
        .await;

    assert_eq!(operation.status, OperationStatus::Failed);
    assert_eq!(
        operation.error.as_deref(),
        Some("execution reverted: caller is not a circle member")
    );
    assert!(!gateway.is_pending());
    assert_eq!(gateway.synchronizer().completed_passes(), 0);
    assert!(ledger.node(1).is_none());
}

#[tokio::test]
async fn cyclic_move_is_rejected_by_the_ledger() {
    let (ledger, gateway) = setup();
    let ops = ledger.seed(ROOT_ID, "Ops", NodeKind::Policy);
    let infra = ledger.seed(ops, "Infra", NodeKind::Policy);

    let operation = gateway
        .submit(Mutation::Move {
            id: ops,
            new_parent_id: infra,
        })
        .await;
    assert!(operation.is_failed());
    assert!(operation.error.unwrap().contains("cycle"));
    assert_eq!(ledger.node(ops).unwrap().parent_id, ROOT_ID);
}

#[tokio::test]
async fn prechecks_fail_without_reaching_the_ledger() {
    let (ledger, gateway) = setup();
    let mutations = [
        Mutation::Create {
            parent_id: ROOT_ID,
            label: " ".to_string(),
            kind: NodeKind::Policy,
        },
        Mutation::Edit {
            id: ROOT_ID,
            label: "Renamed".to_string(),
            kind: NodeKind::Policy,
        },
        Mutation::Move {
            id: 3,
            new_parent_id: 3,
        },
    ];

    for mutation in mutations {
        let operation = gateway.submit(mutation).await;
        assert!(operation.is_failed());
    }
    assert_eq!(ledger.node(ROOT_ID).unwrap().label, "Anchor");
    assert!(ledger.node(1).is_none());
    assert_eq!(gateway.operations().len(), 3);
    assert_eq!(gateway.synchronizer().completed_passes(), 0);
}

#[tokio::test(flavor = "current_thread")]
async fn pending_flag_spans_the_whole_submission() {
    let (ledger, gateway) = setup();
    ledger.hold_reads();

    let task = tokio::spawn({
        let gateway = Arc::clone(&gateway);
        async move {
            gateway
                .submit(Mutation::Commit(CommitPayload {
                    members: Vec::new(),
                    anchor_purpose: "P".to_string(),
                    roles: Vec::new(),
                    assignments: Vec::new(),
                }))
                .await
        }
    });
    settle().await;

    assert!(gateway.is_pending());
    assert!(gateway.is_commit_pending());
    let in_flight = gateway.in_flight();
    assert_eq!(in_flight.len(), 1);
    assert_eq!(in_flight[0].kind, OperationKind::Commit);
    assert!(gateway.synchronizer().is_loading());

    ledger.open_reads();
    let operation = task.await.unwrap();
    assert!(operation.is_confirmed());
    assert!(!gateway.is_pending());
    assert!(!gateway.is_commit_pending());
    assert_eq!(ledger.organizations().len(), 1);
}

#[tokio::test(flavor = "current_thread")]
async fn confirmation_during_a_running_refresh_waits_for_the_covering_pass() {
    let (ledger, gateway) = setup();
    let sync = Arc::clone(gateway.synchronizer());
    ledger.hold_reads();
    let leader = tokio::spawn({
        let sync = Arc::clone(&sync);
        async move { sync.refresh().await }
    });
    settle().await;

    let task = tokio::spawn({
        let gateway = Arc::clone(&gateway);
        async move {
            gateway
                .submit(Mutation::Create {
                    parent_id: ROOT_ID,
                    label: "Ops".to_string(),
                    kind: NodeKind::Policy,
                })
                .await
        }
    });
    settle().await;
    assert!(gateway.is_pending());
    assert!(!task.is_finished());

    ledger.open_reads();
    let operation = task.await.unwrap();
    leader.await.unwrap();

    assert!(operation.is_confirmed());
    assert_eq!(sync.label_of(1).as_deref(), Some("Ops"));
    assert!(!gateway.is_pending());
}

#[tokio::test(flavor = "current_thread")]
async fn abandoned_submission_leaves_nothing_pending() {
    let (ledger, gateway) = setup();
    ledger.hold_reads();

    let result = tokio::time::timeout(
        Duration::from_millis(10),
        gateway.submit(Mutation::Create {
            parent_id: ROOT_ID,
            label: "Ops".to_string(),
            kind: NodeKind::Policy,
        }),
    )
    .await;
    assert!(result.is_err());

    assert!(!gateway.is_pending());
    assert!(gateway.in_flight().is_empty());
    let operations = gateway.operations();
    assert_eq!(operations.len(), 1);
    assert!(operations[0].is_confirmed());
    assert!(!gateway.synchronizer().is_loading());
    ledger.open_reads();
}
