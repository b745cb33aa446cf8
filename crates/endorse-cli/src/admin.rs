//! Admin correction commands. Every change is also logged by the service.

use clap::Subcommand;
use endorse_core::{EndorsementHistory, EntityType, HistoryKey};
use endorse_history::{parse_admin_date, BackdatedPeriod, HistoryService, TotalsOverride};
use uuid::Uuid;

/// Sub-commands available under `admin`.
#[derive(Debug, Subcommand)]
pub enum AdminCommands {
    /// Overwrite one or more stored totals
    OverwriteTotals {
        #[arg(long)]
        history_id: Uuid,
        #[arg(long)]
        total_days_endorsed: Option<i64>,
        #[arg(long)]
        total_days_in_top5: Option<i64>,
        #[arg(long)]
        total_days_in_top10: Option<i64>,
    },
    /// Insert a period in the past
    Backdate {
        #[arg(long)]
        user: String,
        /// brand, business, place or value
        #[arg(long)]
        entity_type: EntityType,
        #[arg(long)]
        entity_id: String,
        #[arg(long)]
        entity_name: String,
        /// RFC 3339 timestamp or YYYY-MM-DD
        #[arg(long)]
        start: String,
        /// Omit to leave the period open
        #[arg(long)]
        end: Option<String>,
        #[arg(long, default_value = "1")]
        position: i32,
    },
    /// Remove a period and recompute totals
    DeletePeriod {
        #[arg(long)]
        history_id: Uuid,
        #[arg(long)]
        period_id: Uuid,
    },
}

pub(crate) async fn run(service: &HistoryService, command: AdminCommands) -> anyhow::Result<()> {
    let admin = service.admin();
    let history = match command {
        AdminCommands::OverwriteTotals {
            history_id,
            total_days_endorsed,
            total_days_in_top5,
            total_days_in_top10,
        } => {
            let totals = TotalsOverride {
                total_days_endorsed,
                total_days_in_top5,
                total_days_in_top10,
            };
            admin.overwrite_totals(history_id, totals).await?
        }
        AdminCommands::Backdate {
            user,
            entity_type,
            entity_id,
            entity_name,
            start,
            end,
            position,
        } => {
            let period = BackdatedPeriod {
                start_date: parse_admin_date(&start)?,
                end_date: end.as_deref().map(parse_admin_date).transpose()?,
                start_position: position,
            };
            let key = HistoryKey::new(user, entity_type, entity_id);
            admin
                .insert_backdated_period(&key, &entity_name, period)
                .await?
        }
        AdminCommands::DeletePeriod {
            history_id,
            period_id,
        } => admin.delete_period(history_id, period_id).await?,
    };

    tracing::info!(history_id = %history.id, version = history.version, "admin correction saved");
    print_summary(&history);
    Ok(())
}

fn print_summary(history: &EndorsementHistory) {
    println!(
        "history {} ({} {}): {} periods, {} days endorsed, {} in top 5, {} in top 10",
        history.id,
        history.entity_type,
        history.entity_id,
        history.periods.len(),
        history.total_days_endorsed,
        history.total_days_in_top5,
        history.total_days_in_top10
    );
}
