//! Roster/ledger consistency commands.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use rollcall_core::engine::{find_divergences, Divergence, Reconciler};
use rollcall_core::snapshot::load_snapshot;

use crate::context::{resolve_event, SharedStore};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ReconcileArgs {
    /// Event id (defaults to the current event)
    #[arg(short, long)]
    event: Option<String>,
}

#[derive(Tabled, Serialize)]
struct DivergenceDisplay {
    #[tabled(rename = "Participant")]
    participant: String,
    #[tabled(rename = "Roster")]
    roster: String,
    #[tabled(rename = "Ledger")]
    expected: String,
    #[tabled(rename = "Reason")]
    reason: String,
}

impl From<&Divergence> for DivergenceDisplay {
    fn from(d: &Divergence) -> Self {
        Self {
            participant: d.participant_id.to_string(),
            roster: d.roster.to_string(),
            expected: d.expected.to_string(),
            reason: format!("{:?}", d.reason),
        }
    }
}

/// Report divergences without repairing them. Exits non-zero on conflict.
pub async fn verify(args: ReconcileArgs, store: &SharedStore, format: OutputFormat) -> Result<()> {
    let event = resolve_event(store, args.event.as_deref()).await?;
    let snapshot = load_snapshot(store.as_ref(), event.id).await?;
    let divergences = find_divergences(&snapshot.participants, &snapshot.activities, &snapshot.ledger);

    if format != OutputFormat::Table {
        output::print_item(&divergences, format)?;
    } else if divergences.is_empty() {
        output::print_success(&format!(
            "Roster and ledger agree for all {} participants",
            snapshot.participants.len()
        ));
    } else {
        output::print_header("Divergences");
        let rows: Vec<DivergenceDisplay> = divergences.iter().map(DivergenceDisplay::from).collect();
        output::print_table(&rows);
    }

    // Surface the same Conflict error the engine raises.
    Reconciler::new(store.clone()).verify(event.id).await?;
    Ok(())
}

pub async fn reconcile(args: ReconcileArgs, store: &SharedStore, format: OutputFormat) -> Result<()> {
    let event = resolve_event(store, args.event.as_deref()).await?;
    let report = Reconciler::new(store.clone()).reconcile(event.id).await?;

    if format != OutputFormat::Table {
        return output::print_item(&report, format);
    }

    if report.repaired.is_empty() {
        output::print_success(&format!("Nothing to repair ({} participants checked)", report.checked));
    } else {
        output::print_header("Repaired");
        let rows: Vec<DivergenceDisplay> = report.repaired.iter().map(DivergenceDisplay::from).collect();
        output::print_table(&rows);
        output::print_warning(&format!(
            "Repaired {} of {} participants",
            report.repaired.len(),
            report.checked
        ));
    }
    Ok(())
}
