//! List events.

use anyhow::Result;
use serde::Serialize;
use tabled::Tabled;

use rollcall_core::model::select_current_event;

use crate::context::SharedStore;
use crate::output::{self, OutputFormat};

#[derive(Tabled, Serialize)]
struct EventDisplay {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Starts")]
    start: String,
    #[tabled(rename = "Ends")]
    end: String,
    #[tabled(rename = "Active")]
    active: bool,
    #[tabled(rename = "Current")]
    current: bool,
}

pub async fn list(store: &SharedStore, format: OutputFormat) -> Result<()> {
    let mut events = store.fetch_events().await?;
    events.sort_by(|a, b| b.start_date.cmp(&a.start_date).then_with(|| a.id.cmp(&b.id)));
    let current = select_current_event(&events).map(|e| e.id);

    let rows: Vec<EventDisplay> = events
        .iter()
        .map(|e| EventDisplay {
            id: e.id.to_string(),
            name: e.name.clone(),
            start: e.start_date.format("%Y-%m-%d %H:%M").to_string(),
            end: e.end_date.format("%Y-%m-%d %H:%M").to_string(),
            active: e.active,
            current: Some(e.id) == current,
        })
        .collect();

    match format {
        OutputFormat::Table => output::print_table(&rows),
        _ => output::print_item(&rows, format)?,
    }
    Ok(())
}
