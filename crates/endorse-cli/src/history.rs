//! Read-only history inspection commands.

use clap::Subcommand;
use endorse_core::{compute_cumulative_snapshot, EndorsementHistory};
use endorse_history::HistoryService;
use uuid::Uuid;

/// Sub-commands available under `history`.
#[derive(Debug, Subcommand)]
pub enum HistoryCommands {
    /// List a user's endorsement histories with live totals
    Show {
        /// User whose histories to list
        #[arg(long)]
        user: String,
        /// Print the stored documents as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
    /// Check stored totals against the periods
    Verify {
        /// Only check this history (defaults to every history)
        #[arg(long)]
        history_id: Option<Uuid>,
    },
}

pub(crate) async fn run(service: &HistoryService, command: HistoryCommands) -> anyhow::Result<()> {
    match command {
        HistoryCommands::Show { user, json } => run_show(service, &user, json).await,
        HistoryCommands::Verify { history_id } => run_verify(service, history_id).await,
    }
}

async fn run_show(service: &HistoryService, user: &str, json: bool) -> anyhow::Result<()> {
    let histories = service.get_user_endorsement_history(user).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&histories)?);
        return Ok(());
    }
    if histories.is_empty() {
        println!("no endorsement histories found for user '{user}'");
        return Ok(());
    }

    let now = service.now();
    println!(
        "{:<38}{:<10}{:<25}{:<8}{:<7}{:<7}{:<8}POS",
        "HISTORY", "TYPE", "ENTITY", "DAYS", "TOP5", "TOP10", "ACTIVE"
    );
    for history in &histories {
        print_row(history, now);
    }
    Ok(())
}

fn print_row(history: &EndorsementHistory, now: chrono::DateTime<chrono::Utc>) {
    let snapshot = compute_cumulative_snapshot(history, now);
    let position = snapshot
        .current_position
        .map_or_else(|| "-".to_string(), |p| p.to_string());
    println!(
        "{:<38}{:<10}{:<25}{:<8}{:<7}{:<7}{:<8}{}",
        history.id.to_string(),
        history.entity_type.as_str(),
        history.entity_name,
        snapshot.total_days_endorsed,
        snapshot.total_days_in_top5,
        snapshot.total_days_in_top10,
        if snapshot.is_currently_endorsed { "yes" } else { "no" },
        position
    );
}

async fn run_verify(service: &HistoryService, history_id: Option<Uuid>) -> anyhow::Result<()> {
    let reports = match history_id {
        Some(id) => match service.admin().verify(id).await {
            Ok(()) => Vec::new(),
            Err(endorse_history::HistoryError::Integrity(report)) => vec![report],
            Err(e) => return Err(e.into()),
        },
        None => service.admin().verify_all().await?,
    };

    if reports.is_empty() {
        println!("all checked histories are consistent");
        return Ok(());
    }
    for report in &reports {
        println!("history {}:", report.history_id);
        for violation in &report.violations {
            println!("  - {violation}");
        }
    }
    anyhow::bail!("{} inconsistent histories", reports.len())
}
