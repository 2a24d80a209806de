use circlesync_core::{
    CoreConfig, HierarchyContext, Identity, InMemoryLedger, Initiative, RoleField,
    ValidationError, WorkflowEngine, WorkflowError, WorkflowStep,
};
use serde_json::json;
use std::sync::Arc;

const ALICE: &str = "0x1111111111111111111111111111111111111111";
const BOB: &str = "0x2222222222222222222222222222222222222222";

fn context() -> (Arc<InMemoryLedger>, HierarchyContext) {
    let ledger = Arc::new(InMemoryLedger::new("Anchor"));
    let context = HierarchyContext::create(ledger.clone(), ledger.clone(), CoreConfig::default());
    (ledger, context)
}

/// Fills the draft used by the commit scenarios and walks to review.
fn fill_to_review(engine: &mut WorkflowEngine) {
    let first = engine.append_member().unwrap();
    engine.set_member(first, ALICE).unwrap();
    let second = engine.append_member().unwrap();
    engine.set_member(second, BOB).unwrap();
    engine.set_consent(true).unwrap();
    engine.set_anchor_purpose("P").unwrap();

    let role = engine.add_role().unwrap();
    engine.set_role_name(role, "R1").unwrap();
    engine.set_role_purpose(role, "Pu").unwrap();
    let domain = engine.append_role_entry(role, RoleField::Domains).unwrap();
    engine
        .set_role_entry(role, RoleField::Domains, domain, "d1")
        .unwrap();
    engine.assign(role, Identity::new(ALICE)).unwrap();

    while !engine.step().is_terminal() {
        engine.try_advance().unwrap();
    }
}

async fn settle() {
    for _ in 0..16 {
        tokio::task::yield_now().await;
    }
}

#[test]
fn members_gate_leaves_draft_unchanged() {
    let (_, context) = context();
    let mut engine = context.new_workflow().unwrap();

    let empty = engine.draft().clone();
    assert!(!engine.advance());
    assert_eq!(engine.draft(), &empty);
    assert_eq!(engine.step(), WorkflowStep::Members);

    let index = engine.append_member().unwrap();
    engine.set_member(index, "0xnot-an-address").unwrap();
    let invalid = engine.draft().clone();
    assert_eq!(
        engine.try_advance(),
        Err(WorkflowError::Validation(ValidationError::MalformedMember {
            index: 0,
            value: "0xnot-an-address".to_string(),
        }))
    );
    assert_eq!(engine.draft(), &invalid);
    assert!(engine.view().message.unwrap().contains("not a valid address"));
}

#[test]
fn each_gate_blocks_until_satisfied() {
    let (_, context) = context();
    let mut engine = context.new_workflow().unwrap();
    let index = engine.append_member().unwrap();
    engine.set_member(index, ALICE).unwrap();
    assert!(engine.advance());

    assert!(!engine.advance());
    engine.set_consent(true).unwrap();
    assert!(engine.advance());

    engine.set_anchor_purpose("   ").unwrap();
    assert!(!engine.advance());
    engine.set_anchor_purpose("Grow food").unwrap();
    assert!(engine.advance());

    assert_eq!(
        engine.try_advance(),
        Err(WorkflowError::Validation(ValidationError::NoRoles))
    );
    let role = engine.add_role().unwrap();
    engine.set_role_name(role, "Gardener").unwrap();
    assert_eq!(
        engine.try_advance(),
        Err(WorkflowError::Validation(ValidationError::RolePurposeRequired {
            index: 0
        }))
    );
    engine.set_role_purpose(role, "Tend beds").unwrap();
    assert!(engine.advance());

    assert_eq!(engine.step(), WorkflowStep::Assignments);
    assert!(engine.advance());
    let view = engine.view();
    assert_eq!(view.step, WorkflowStep::Review);
    assert_eq!((view.index, view.total), (5, 6));
    assert!(view.can_commit);
    assert!(!view.can_advance);
}

#[tokio::test]
async fn commit_serializes_filtered_draft() {
    let (ledger, context) = context();
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);

    let receipt = engine.commit().await.unwrap();
    assert_eq!(receipt.created_id, "org-1");
    assert!(engine.is_committed());
    assert!(engine.draft().members.is_empty());

    let organizations = ledger.organizations();
    assert_eq!(organizations.len(), 1);
    let committed = serde_json::to_value(&organizations[0]).unwrap();
    assert_eq!(
        committed,
        json!({
            "members": [ALICE, BOB],
            "anchorPurpose": "P",
            "roles": [{
                "name": "R1",
                "purpose": "Pu",
                "domains": ["d1"],
                "accountabilities": []
            }],
            "assignments": [{ "roleIndex": 0, "assignedTo": ALICE }]
        })
    );
}

#[tokio::test]
async fn committed_engine_rejects_further_work() {
    let (ledger, context) = context();
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);
    engine.commit().await.unwrap();

    assert_eq!(engine.commit().await, Err(WorkflowError::AlreadyCommitted));
    assert_eq!(engine.add_role(), Err(WorkflowError::AlreadyCommitted));
    assert!(!engine.retreat());
    assert!(engine.view().committed);
    assert_eq!(ledger.organizations().len(), 1);
}

#[tokio::test]
async fn failed_commit_keeps_draft_for_retry() {
    let (ledger, context) = context();
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);
    let before = engine.draft().clone();

    ledger.reject_writes("user rejected the request");
    assert_eq!(
        engine.commit().await,
        Err(WorkflowError::CommitFailed("user rejected the request".to_string()))
    );
    assert_eq!(engine.draft(), &before);
    assert_eq!(engine.step(), WorkflowStep::Review);
    assert_eq!(engine.last_error(), Some("user rejected the request"));
    assert!(!context.gateway().is_pending());

    ledger.clear_faults();
    let receipt = engine.commit().await.unwrap();
    assert_eq!(receipt.created_id, "org-1");
}

#[tokio::test]
async fn missing_created_id_falls_back_to_placeholder() {
    let (ledger, context) = context();
    ledger.set_commit_metadata(json!({ "tx": "0xabc" }));
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);

    let receipt = engine.commit().await.unwrap();
    assert_eq!(receipt.created_id, "unknown");
    assert!(receipt.operation.is_confirmed());
}

#[tokio::test]
async fn organization_key_is_accepted() {
    let (ledger, context) = context();
    ledger.set_commit_metadata(json!({ "organization": 77 }));
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);

    assert_eq!(engine.commit().await.unwrap().created_id, "77");
}

#[tokio::test]
async fn commit_rechecks_fields_edited_after_their_step() {
    let (ledger, context) = context();
    let mut engine = context.new_workflow().unwrap();
    fill_to_review(&mut engine);
    engine.set_anchor_purpose("").unwrap();

    assert_eq!(
        engine.commit().await,
        Err(WorkflowError::Validation(ValidationError::BlankAnchorPurpose))
    );
    assert!(ledger.organizations().is_empty());
}

#[tokio::test(flavor = "current_thread")]
async fn review_is_gated_while_another_commit_is_in_flight() {
    let (ledger, context) = context();
    let mut first = context.new_workflow().unwrap();
    let mut second = context.new_workflow().unwrap();
    fill_to_review(&mut first);
    fill_to_review(&mut second);

    ledger.hold_reads();
    let task = tokio::spawn(async move { first.commit().await });
    settle().await;

    assert!(!second.can_commit());
    assert_eq!(
        second.commit().await,
        Err(WorkflowError::Validation(ValidationError::CommitInFlight))
    );

    ledger.open_reads();
    assert!(task.await.unwrap().is_ok());
    assert!(second.can_commit());
}

#[test]
fn removing_a_role_shifts_later_assignments() {
    let (_, context) = context();
    let mut engine = context.new_workflow().unwrap();
    for name in ["A", "B", "C"] {
        let role = engine.add_role().unwrap();
        engine.set_role_name(role, name).unwrap();
    }
    engine.assign(0, Identity::new(ALICE)).unwrap();
    engine.assign(2, Identity::new(BOB)).unwrap();

    let removed = engine.remove_role(0).unwrap();
    assert_eq!(removed.name, "A");
    let assignments: Vec<_> = engine.draft().assignments.iter().collect();
    assert_eq!(assignments, vec![(&1, &Identity::new(BOB))]);
    assert_eq!(engine.remove_role(5), Err(WorkflowError::RoleOutOfRange(5)));
}

#[test]
fn founder_workflow_locks_first_member() {
    let (_, context) = context();
    let mut engine = context.founding_workflow(Identity::new(ALICE)).unwrap();
    assert_eq!(engine.draft().members.as_slice(), [Identity::new(ALICE)]);
    assert_eq!(engine.remove_member(0), Err(WorkflowError::FounderLocked));
    assert!(engine.set_member(0, ALICE).is_ok());
    assert!(engine.advance());

    engine.cancel();
    assert_eq!(engine.step(), WorkflowStep::Members);
    assert_eq!(engine.draft().members.as_slice(), [Identity::new(ALICE)]);
}

#[test]
fn initiative_partners_seed_members_without_blanks() {
    let (_, context) = context();
    let mut initiative = Initiative::new("Garden");
    initiative.partners.set(0, Identity::new(ALICE)).unwrap();
    initiative.partners.append();
    let last = initiative.partners.append();
    initiative.partners.set(last, Identity::new(BOB)).unwrap();
    assert_eq!(initiative.partners.len(), 3);

    let mut engine = context.initiative_workflow(&initiative).unwrap();
    assert_eq!(
        engine.draft().members.as_slice(),
        [Identity::new(ALICE), Identity::new(BOB)]
    );
    assert!(engine.remove_member(0).is_ok());
    assert!(engine.advance());
    assert_eq!(engine.step(), WorkflowStep::Consent);
    assert_eq!(initiative.partners.len(), 3);
}
