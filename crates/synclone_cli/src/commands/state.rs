use chrono::{DateTime, Utc};
use console::style;
use tabled::Tabled;

use synclone::{RunState, StateStore, TargetId};

use crate::StateAction;
use crate::commands::shared::{OutputFormat, open_store, parse_id, print_json, print_table};
use crate::config::Config;

#[derive(Tabled)]
struct RunRow {
    #[tabled(rename = "ID")]
    id: String,
    #[tabled(rename = "Provider")]
    provider: String,
    #[tabled(rename = "Organization")]
    organization: String,
    #[tabled(rename = "Root")]
    root: String,
    #[tabled(rename = "Done")]
    done: String,
    #[tabled(rename = "Failed")]
    failed: usize,
    #[tabled(rename = "Pending")]
    pending: usize,
    #[tabled(rename = "Updated")]
    updated_at: String,
}

impl From<&RunState> for RunRow {
    fn from(state: &RunState) -> Self {
        let counts = state.counts();
        Self {
            id: state.id.to_string(),
            provider: state.target.provider.to_string(),
            organization: state.target.organization.clone(),
            root: state.target.root.display().to_string(),
            done: format!("{}/{}", counts.success + counts.skipped, counts.total()),
            failed: counts.failed,
            pending: counts.pending + counts.running,
            updated_at: state.updated_at.format("%Y-%m-%d %H:%M").to_string(),
        }
    }
}

#[derive(Tabled)]
struct OutcomeRow {
    #[tabled(rename = "Repository")]
    repository: String,
    #[tabled(rename = "Status")]
    status: &'static str,
    #[tabled(rename = "Detail")]
    detail: String,
}

/// Runs whose last update is older than `cutoff`.
fn stale_ids(states: &[RunState], cutoff: DateTime<Utc>) -> Vec<TargetId> {
    states
        .iter()
        .filter(|state| state.updated_at < cutoff)
        .map(|state| state.id.clone())
        .collect()
}

fn outcome_rows(state: &RunState, failed_only: bool) -> Vec<OutcomeRow> {
    state
        .outcomes
        .iter()
        .filter(|(_, outcome)| !failed_only || outcome.is_failed())
        .map(|(key, outcome)| OutcomeRow {
            repository: key.to_string(),
            status: outcome.label(),
            detail: outcome.detail().unwrap_or_default(),
        })
        .collect()
}

/// Handle `synclone state`.
pub(crate) async fn handle_state(
    action: StateAction,
    config: &Config,
) -> Result<(), Box<dyn std::error::Error>> {
    let store = open_store(config)?;

    match action {
        StateAction::List { output } => {
            let states = store.list().await?;
            match output {
                OutputFormat::Json => {
                    let summaries: Vec<_> = states
                        .iter()
                        .map(|s| {
                            serde_json::json!({
                                "id": s.id,
                                "target": s.target,
                                "created_at": s.created_at,
                                "updated_at": s.updated_at,
                                "counts": s.counts(),
                            })
                        })
                        .collect();
                    print_json(&summaries)?;
                }
                OutputFormat::Table if states.is_empty() => {
                    println!("No saved runs in {}", store.dir().display());
                }
                OutputFormat::Table => print_table(states.iter().map(RunRow::from)),
            }
        }

        StateAction::Show { id, failed, output } => {
            let id = parse_id(&id)?;
            let state = store
                .load(&id)
                .await?
                .ok_or_else(|| format!("No saved run '{id}'"))?;

            match output {
                OutputFormat::Json if failed => {
                    let failures: std::collections::BTreeMap<_, _> = state
                        .outcomes
                        .iter()
                        .filter(|(_, o)| o.is_failed())
                        .collect();
                    print_json(&failures)?;
                }
                OutputFormat::Json => print_json(&state)?,
                OutputFormat::Table => {
                    let row = RunRow::from(&state);
                    println!(
                        "{} {} {} -> {} ({} done, {} failed, {} pending)",
                        style(&row.id).bold(),
                        row.provider,
                        row.organization,
                        row.root,
                        row.done,
                        row.failed,
                        row.pending
                    );
                    let rows = outcome_rows(&state, failed);
                    if !rows.is_empty() {
                        print_table(rows);
                    }
                }
            }
        }

        StateAction::Clear { all: true, .. } => {
            let cleared = store.clear_all().await?;
            tracing::debug!(cleared, dir = %store.dir().display(), "Cleared all run state");
            println!("Cleared {cleared} saved run(s)");
        }

        StateAction::Clear {
            ids, older_than, ..
        } => {
            let ids = match older_than {
                Some(age) => stale_ids(&store.list().await?, Utc::now() - age),
                None => ids
                    .iter()
                    .map(|id| parse_id(id))
                    .collect::<Result<Vec<_>, _>>()?,
            };

            let mut cleared = 0;
            for id in &ids {
                if store.clear(id).await? {
                    cleared += 1;
                    tracing::debug!(id = %id, "Cleared run state");
                } else {
                    eprintln!("{} No saved run '{}'", style("⚠").yellow(), id);
                }
            }
            println!("Cleared {cleared} saved run(s)");
        }
    }

    Ok(())
}
