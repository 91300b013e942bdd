//! Session state subcommands.
//!
//! Reads go through `SessionManager::get_state`; edits go through the request
//! middleware so they are diff-checked exactly like handler writes.

use anyhow::{Context, Result, bail};
use comfy_table::{Cell, Color, ContentArrangement, Table, presets};
use console::style;
use serde_json::{Map, Value};
use sessiontier_core::session::PersistOutcome;
use sessiontier_core::storage::durable_store::DurableStore;
use sessiontier_types::state::StateBlob;
use sessiontier_types::subject::Subject;

use crate::state::AppState;

/// Entry point label used for CLI edits.
const CLI_ENTRY_POINT: &str = "cli";

fn print_json(value: &Value) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn outcome_label(outcome: PersistOutcome) -> &'static str {
    match outcome {
        PersistOutcome::Saved => "saved",
        PersistOutcome::Unchanged => "unchanged",
        PersistOutcome::SkippedPartial => "skipped_partial",
        PersistOutcome::Failed => "failed",
    }
}

/// Parse a JSON object argument into its fields.
fn parse_fields(raw: &str) -> Result<Map<String, Value>> {
    let value: Value = serde_json::from_str(raw).context("state must be valid JSON")?;
    match value {
        Value::Object(map) => Ok(map),
        _ => bail!("state must be a JSON object"),
    }
}

/// Keys of `before` that `after` no longer has.
fn removed_fields(before: &StateBlob, after: &StateBlob) -> Vec<String> {
    before
        .keys()
        .filter(|k| !after.contains_key(k))
        .cloned()
        .collect()
}

fn print_state(subject: &str, state: &StateBlob) -> Result<()> {
    println!();
    if state.is_empty() {
        println!(
            "  {} No state for '{}'",
            style("i").blue().bold(),
            style(subject).cyan(),
        );
    } else {
        println!("  State for '{}'", style(subject).cyan());
        println!();
        for line in serde_json::to_string_pretty(state.fields())?.lines() {
            println!("  {line}");
        }
    }
    println!();
    Ok(())
}

pub async fn get(state: &AppState, subject: &str, json: bool) -> Result<()> {
    let blob = state.manager.get_state(&Subject::from(subject)).await;

    if json {
        return print_json(&serde_json::json!({
            "subject": subject,
            "state": blob.fields(),
        }));
    }
    print_state(subject, &blob)
}

pub async fn set(state: &AppState, subject: &str, raw: &str, merge: bool, json: bool) -> Result<()> {
    let fields = parse_fields(raw)?;

    let mut ctx = state.middleware.begin(Subject::from(subject), CLI_ENTRY_POINT).await;
    if merge {
        let blob = ctx.upgrade_to_full().await;
        for (key, value) in fields {
            blob.insert(key, value);
        }
    } else {
        *ctx.upgrade_to_full().await = StateBlob::from_fields(fields);
    }
    let result = ctx.state().clone();
    let outcome = state.middleware.finish(ctx).await;
    if outcome == PersistOutcome::Failed {
        bail!("failed to save state for '{subject}'");
    }

    if json {
        return print_json(&serde_json::json!({
            "subject": subject,
            "outcome": outcome_label(outcome),
            "state": result.fields(),
        }));
    }
    println!();
    println!(
        "  {} State for '{}' {}",
        style("ok").green(),
        style(subject).cyan(),
        outcome_label(outcome),
    );
    println!();
    Ok(())
}

pub async fn reset(state: &AppState, subject: &str, json: bool) -> Result<()> {
    let blob = state
        .manager
        .reset_state(&Subject::from(subject))
        .await
        .with_context(|| format!("failed to reset '{subject}'"))?;

    if json {
        return print_json(&serde_json::json!({
            "subject": subject,
            "state": blob.fields(),
        }));
    }
    println!();
    println!(
        "  {} Reset '{}' ({} field(s) retained)",
        style("ok").green(),
        style(subject).cyan(),
        blob.len(),
    );
    println!();
    Ok(())
}

pub async fn transition(state: &AppState, subject: &str, event: &str, json: bool) -> Result<()> {
    let mut ctx = state.middleware.begin(Subject::from(subject), CLI_ENTRY_POINT).await;
    ctx.upgrade_to_full().await;
    let before = ctx.state().clone();
    ctx.transition(event);
    let removed = removed_fields(&before, ctx.state());
    let outcome = state.middleware.finish(ctx).await;
    if outcome == PersistOutcome::Failed {
        bail!("failed to save state for '{subject}'");
    }

    if json {
        return print_json(&serde_json::json!({
            "subject": subject,
            "event": event,
            "removed": removed,
            "outcome": outcome_label(outcome),
        }));
    }
    println!();
    if removed.is_empty() {
        println!(
            "  {} No fields matched cleanup rules for '{}'",
            style("i").blue().bold(),
            style(event).cyan(),
        );
    } else {
        println!(
            "  {} Removed {} from '{}'",
            style("ok").green(),
            style(removed.join(", ")).yellow(),
            style(subject).cyan(),
        );
    }
    println!();
    Ok(())
}

pub async fn peek(state: &AppState, subject: &str, json: bool) -> Result<()> {
    let blob = state.fast_path.load(&Subject::from(subject)).await;

    if json {
        return print_json(&serde_json::json!({
            "subject": subject,
            "partial": blob.is_partial(),
            "projection": blob.fields(),
        }));
    }
    println!();
    println!(
        "  tenant id:   {}",
        style(blob.tenant_id().unwrap_or("-")).cyan()
    );
    println!(
        "  tenant name: {}",
        style(blob.tenant_name().unwrap_or("-")).cyan()
    );
    println!();
    Ok(())
}

pub async fn list(state: &AppState, limit: u32, json: bool) -> Result<()> {
    let rows = state
        .manager
        .store()
        .list_recent(limit)
        .await
        .context("failed to list subjects")?;

    if json {
        return print_json(&serde_json::json!({
            "subjects": rows,
            "count": rows.len(),
        }));
    }

    if rows.is_empty() {
        println!();
        println!("  {} No persisted subjects yet.", style("i").blue().bold());
        println!();
        return Ok(());
    }

    let mut table = Table::new();
    table.load_preset(presets::UTF8_FULL_CONDENSED);
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(vec![
        Cell::new("Subject").fg(Color::White),
        Cell::new("Tenant").fg(Color::White),
        Cell::new("Name").fg(Color::White),
        Cell::new("Updated").fg(Color::White),
    ]);
    for row in &rows {
        table.add_row(vec![
            Cell::new(row.subject.as_str()).fg(Color::Cyan),
            Cell::new(row.tenant_id.as_deref().unwrap_or("-")),
            Cell::new(row.tenant_name.as_deref().unwrap_or("-")),
            Cell::new(row.updated_at.format("%Y-%m-%d %H:%M:%S").to_string()).fg(Color::DarkGrey),
        ]);
    }

    println!();
    println!("{table}");
    println!();
    Ok(())
}
