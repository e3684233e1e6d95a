//! Store and event resolution shared by every command.

use anyhow::{bail, Context, Result};
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use rollcall_core::config::{Config, StoreBackend};
use rollcall_core::model::{Event, EventId};
use rollcall_core::snapshot::current_event;
use rollcall_core::store::{AttendanceStore, InMemoryStore, PgStore, SeedData};

pub type SharedStore = Arc<dyn AttendanceStore>;

/// Open the store: a seed file when given, otherwise the configured backend.
pub async fn open_store(seed: Option<&Path>, config: &Config) -> Result<SharedStore> {
    if let Some(path) = seed {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read seed file {}", path.display()))?;
        let data: SeedData = serde_json::from_str(&raw)
            .with_context(|| format!("{} is not a valid seed file", path.display()))?;
        let store = InMemoryStore::from_seed(data)?;
        return Ok(Arc::new(store));
    }

    match config.store.backend {
        StoreBackend::Postgres => {
            let store = PgStore::connect(&config.store).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::Memory => {
            bail!("no seed file given and store.backend is memory; pass --seed <PATH>")
        }
    }
}

/// The event named on the command line, or the current event.
pub async fn resolve_event(store: &SharedStore, event: Option<&str>) -> Result<Event> {
    match event {
        Some(raw) => {
            let id = EventId::from_str(raw.trim()).with_context(|| format!("invalid event id: {}", raw))?;
            let event = store.fetch_event(id).await?;
            event.with_context(|| format!("event {} not found", id))
        }
        None => current_event(store.as_ref())
            .await?
            .context("no active event; pass --event <ID>"),
    }
}
