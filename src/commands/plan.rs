//! `trinity plan` - add, list, and inspect work items.

use crate::backlog::{generate_item_id, validate_item_id, BacklogStore, WorkItem};
use crate::cli::{PlanAddArgs, PlanCommand, PlanShowArgs};
use crate::context::{require_initialized_project, ProjectContext};
use crate::error::{Result, TrinityError};
use crate::events::{append_event, Event, EventAction};
use crate::ledger::AttemptLedger;
use std::fmt::Write;

pub fn execute(command: PlanCommand) -> Result<()> {
    let ctx = require_initialized_project()?;
    match command {
        PlanCommand::Add(args) => {
            let id = add_item(&ctx, &args)?;
            println!("Added {}", id);
            Ok(())
        }
        PlanCommand::List => {
            let store = BacklogStore::load(ctx.backlog_path())?;
            print!("{}", render_list(&store));
            Ok(())
        }
        PlanCommand::Show(args) => {
            print!("{}", show_item(&ctx, &args)?);
            Ok(())
        }
    }
}

pub(crate) fn add_item(ctx: &ProjectContext, args: &PlanAddArgs) -> Result<String> {
    if args.description.trim().is_empty() {
        return Err(TrinityError::UserError(
            "item description must not be empty".to_string(),
        ));
    }

    let mut store = BacklogStore::load(ctx.backlog_path())?;

    let id = match &args.id {
        Some(id) => validate_item_id(id)?,
        None => generate_item_id(store.next_number()),
    };

    let mut depends_on = Vec::new();
    for dep in &args.depends_on {
        depends_on.push(validate_item_id(dep)?);
    }

    let item = WorkItem::new(&id, &args.description).with_depends_on(depends_on.clone());
    store.insert(item)?;
    store.persist(ctx.backlog_path())?;

    append_event(
        ctx,
        &Event::new(EventAction::PlanAdd)
            .with_item(&id)
            .with_details(serde_json::json!({ "depends_on": depends_on })),
    );
    Ok(id)
}

pub(crate) fn render_list(store: &BacklogStore) -> String {
    if store.is_empty() {
        return "Backlog is empty. Add items with `trinity plan add`.\n".to_string();
    }

    let mut out = String::new();
    let _ = writeln!(
        out,
        "{:<10} {:<12} {:>8}  {}",
        "ID", "STATE", "ATTEMPTS", "DESCRIPTION"
    );
    for item in store.all_items() {
        let mut description: String = item.description.chars().take(60).collect();
        if item.description.chars().count() > 60 {
            description.push_str("...");
        }
        let _ = writeln!(
            out,
            "{:<10} {:<12} {:>8}  {}",
            item.id, item.state, item.attempt_count, description
        );
        if !item.depends_on.is_empty() {
            let _ = writeln!(out, "{:<10} depends on: {}", "", item.depends_on.join(", "));
        }
    }
    out
}

pub(crate) fn show_item(ctx: &ProjectContext, args: &PlanShowArgs) -> Result<String> {
    let id = validate_item_id(&args.id)?;
    let store = BacklogStore::load(ctx.backlog_path())?;
    let item = store.get(&id).ok_or_else(|| {
        TrinityError::UserError(format!("item '{}' not found in the backlog", id))
    })?;

    let ledger = AttemptLedger::open(ctx.ledger_path())?;
    let history = ledger.history(&id)?;

    let mut out = String::new();
    let _ = writeln!(out, "{}: {}", item.id, item.state);
    let _ = writeln!(out, "  attempts: {}", item.attempt_count);
    if !item.depends_on.is_empty() {
        let _ = writeln!(out, "  depends on: {}", item.depends_on.join(", "));
    }
    if let Some(created_at) = item.created_at {
        let _ = writeln!(out, "  created: {}", created_at.to_rfc3339());
    }
    let _ = writeln!(out, "\n{}", item.description);

    if !history.is_empty() {
        let _ = writeln!(out, "\nAttempt history:");
        for attempt in &history {
            let _ = writeln!(
                out,
                "  {} {} -> {}",
                attempt.sequence,
                attempt.started_at.to_rfc3339(),
                attempt.outcome.label()
            );
        }
    }
    Ok(out)
}
