//! Dashboard views: the full report, live occupancy and engagement ranking.

use anyhow::Result;
use clap::Args;
use serde::Serialize;
use tabled::Tabled;

use rollcall_core::engine::{EngagementRow, GroupRow, LocationRow, MemberList, ReportView, SearchFilter};
use rollcall_core::model::Participant;
use rollcall_core::snapshot::load_snapshot;

use crate::context::{resolve_event, SharedStore};
use crate::output::{self, OutputFormat};

#[derive(Args)]
pub struct ReportArgs {
    /// Event id (defaults to the current event)
    #[arg(short, long)]
    event: Option<String>,

    /// Only list participants whose name or group contains this text
    #[arg(short, long)]
    filter: Option<String>,
}

#[derive(Args)]
pub struct EngagementArgs {
    /// Event id (defaults to the current event)
    #[arg(short, long)]
    event: Option<String>,
}

#[derive(Tabled, Serialize)]
struct LocationDisplay {
    #[tabled(rename = "Activity")]
    name: String,
    #[tabled(rename = "Location")]
    location: String,
    #[tabled(rename = "Here now")]
    count: String,
}

impl From<&LocationRow> for LocationDisplay {
    fn from(row: &LocationRow) -> Self {
        Self {
            name: row.name.clone(),
            location: row.location.clone(),
            count: row.members.count_label(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct MemberDisplay {
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Category")]
    category: String,
}

impl From<&Participant> for MemberDisplay {
    fn from(p: &Participant) -> Self {
        Self {
            name: p.name.clone(),
            group: p.group.clone(),
            category: p.category.to_string(),
        }
    }
}

#[derive(Tabled, Serialize)]
struct EngagementDisplay {
    #[tabled(rename = "#")]
    rank: usize,
    #[tabled(rename = "Activity")]
    name: String,
    #[tabled(rename = "Check-ins")]
    count: u64,
}

fn engagement_rows(rows: &[EngagementRow]) -> Vec<EngagementDisplay> {
    rows.iter()
        .enumerate()
        .map(|(i, row)| EngagementDisplay {
            rank: i + 1,
            name: row.name.clone(),
            count: row.count,
        })
        .collect()
}

#[derive(Tabled, Serialize)]
struct GroupDisplay {
    #[tabled(rename = "Group")]
    group: String,
    #[tabled(rename = "Participants")]
    count: usize,
}

impl From<&GroupRow> for GroupDisplay {
    fn from(row: &GroupRow) -> Self {
        Self {
            group: row.group.clone(),
            count: row.count,
        }
    }
}

fn print_members(title: &str, list: &MemberList) {
    output::print_header(&format!("{} ({})", title, list.count_label()));
    let rows: Vec<MemberDisplay> = list.members.iter().map(MemberDisplay::from).collect();
    output::print_table(&rows);
}

async fn build_view(store: &SharedStore, event: Option<&str>, filter: Option<&str>) -> Result<(String, ReportView)> {
    let event = resolve_event(store, event).await?;
    let snapshot = load_snapshot(store.as_ref(), event.id).await?;
    Ok((event.name, snapshot.report(&SearchFilter::from(filter))))
}

pub async fn report(args: ReportArgs, store: &SharedStore, format: OutputFormat) -> Result<()> {
    let (event_name, view) = build_view(store, args.event.as_deref(), args.filter.as_deref()).await?;

    if format != OutputFormat::Table {
        return output::print_item(&view, format);
    }

    output::print_header(&format!("Attendance report: {}", event_name));
    output::print_detail("Participants", view.summary.participants);
    output::print_detail("Students", view.summary.students);
    output::print_detail("Leaders", view.summary.leaders);
    output::print_detail("Activities", view.summary.activities);
    output::print_detail("In an activity", view.summary.in_activities);
    output::print_detail("Not in an activity", view.summary.unassigned);

    output::print_header("Locations");
    let locations: Vec<LocationDisplay> = view.locations.iter().map(LocationDisplay::from).collect();
    output::print_table(&locations);

    output::print_header("Engagement");
    output::print_table(&engagement_rows(&view.engagement));

    output::print_header("Groups");
    let groups: Vec<GroupDisplay> = view.groups.iter().map(GroupDisplay::from).collect();
    output::print_table(&groups);

    Ok(())
}

pub async fn occupancy(args: ReportArgs, store: &SharedStore, format: OutputFormat) -> Result<()> {
    let (_, view) = build_view(store, args.event.as_deref(), args.filter.as_deref()).await?;

    if format != OutputFormat::Table {
        #[derive(Serialize)]
        struct Occupancy<'a> {
            locations: &'a [LocationRow],
            unassigned: &'a MemberList,
        }
        return output::print_item(
            &Occupancy {
                locations: &view.locations,
                unassigned: &view.unassigned,
            },
            format,
        );
    }

    for row in &view.locations {
        print_members(&format!("{} @ {}", row.name, row.location), &row.members);
    }
    print_members("Not in an activity", &view.unassigned);
    Ok(())
}

pub async fn engagement(args: EngagementArgs, store: &SharedStore, format: OutputFormat) -> Result<()> {
    let (event_name, view) = build_view(store, args.event.as_deref(), None).await?;
    let rows = engagement_rows(&view.engagement);

    if format != OutputFormat::Table {
        return output::print_item(&rows, format);
    }

    output::print_header(&format!("Engagement: {}", event_name));
    output::print_table(&rows);
    Ok(())
}
