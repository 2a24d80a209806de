//! CLI demo entry point.
//!
//! # Responsibility
//! - Exercise `circlesync_core` end to end against the in-memory ledger.
//! - Keep output deterministic for quick local sanity checks.

use circlesync_core::{
    init_logging, CoreConfig, HierarchyContext, Identity, InMemoryLedger, Mutation, NodeKind,
    RoleField, ROOT_ID,
};
use log::info;
use std::error::Error;
use std::sync::Arc;

const FOUNDER: &str = "0x00000000000000000000000000000000000000f0";
const PARTNER: &str = "0x00000000000000000000000000000000000000a1";

#[tokio::main(flavor = "current_thread")]
async fn main() -> Result<(), Box<dyn Error>> {
    let config = CoreConfig::from_env();
    if let Some(log_dir) = config.log_dir.as_deref() {
        init_logging(&config.log_level, log_dir)?;
    }
    println!("circlesync_core version={}", circlesync_core::core_version());

    let ledger = Arc::new(InMemoryLedger::new("Anchor Circle"));
    let ops = ledger.seed(ROOT_ID, "Operations", NodeKind::Implementation);
    ledger.seed(ops, "Infrastructure", NodeKind::Policy);
    let finance = ledger.seed(ROOT_ID, "Finance", NodeKind::Policy);

    let context = HierarchyContext::create(ledger.clone(), ledger, config);
    context
        .start(Arc::new(|snapshot| {
            info!(
                "event=view_changed module=cli status=ok generation={} nodes={}",
                snapshot.generation,
                snapshot.nodes.len()
            );
        }))
        .await?;
    print_outline(&context, "initial hierarchy");

    let created = context
        .submit(Mutation::Create {
            parent_id: finance,
            label: "Budget".to_string(),
            kind: NodeKind::Implementation,
        })
        .await?;
    println!(
        "create status={:?} created_id={}",
        created.status,
        created.created_id().unwrap_or_default()
    );

    let moved = context
        .submit(Mutation::Move {
            id: finance,
            new_parent_id: ops,
        })
        .await?;
    println!("move status={:?}", moved.status);
    print_outline(&context, "after create and move");

    let rejected = context
        .submit(Mutation::Move {
            id: ops,
            new_parent_id: finance,
        })
        .await?;
    println!(
        "cyclic move status={:?} error={}",
        rejected.status,
        rejected.error.unwrap_or_default()
    );

    let mut workflow = context.founding_workflow(Identity::new(FOUNDER))?;
    let partner = workflow.append_member()?;
    workflow.set_member(partner, PARTNER)?;
    workflow.set_consent(true)?;
    workflow.set_anchor_purpose("Steward the shared workshop")?;
    let role = workflow.add_role()?;
    workflow.set_role_name(role, "Facilitator")?;
    workflow.set_role_purpose(role, "Run governance meetings")?;
    workflow.set_role_entry(role, RoleField::Domains, 0, "Meeting agenda")?;
    workflow.assign(role, Identity::new(PARTNER))?;

    while !workflow.step().is_terminal() {
        workflow.try_advance()?;
        println!("step {}/{}: {}", workflow.view().index + 1, workflow.view().total, workflow.step());
    }

    let receipt = workflow.commit().await?;
    println!("organization created_id={}", receipt.created_id);

    context.dispose();
    Ok(())
}

fn print_outline(context: &HierarchyContext, title: &str) {
    println!("-- {title} --");
    match context.synchronizer().current_tree() {
        Some(tree) => print!("{}", tree.outline()),
        None => println!("(root unavailable)"),
    }
}
