use anyhow::{bail, Context, Result};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use rollcall_core::{
    Coordinator, EuclideanMatcher, FeatureVector, Identity, Ledger, LedgerDisposition,
    RecordFilter, UnknownObservation,
};
use rollcall_store::Store;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

mod config;

use config::Config;

#[derive(Parser)]
#[command(name = "rollcall", about = "Face-vector attendance ledger")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Enroll an identity from its registration photograph's face vectors
    Enroll {
        /// Unique roll number
        #[arg(short, long)]
        roll: String,
        /// Display name
        #[arg(short, long)]
        name: String,
        /// JSON file with the extractor output: an array of face vectors
        #[arg(short, long)]
        vectors: PathBuf,
    },
    /// Remove an enrolled identity (attendance history is kept)
    Remove {
        roll: String,
    },
    /// List enrolled identities
    Roster,
    /// Mark attendance from one photograph's face vectors
    Mark {
        /// JSON file with the extractor output: an array of face vectors
        #[arg(short, long)]
        vectors: PathBuf,
        /// Attendance date (YYYY-MM-DD), defaults to today
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Override the configured match threshold
        #[arg(short, long)]
        threshold: Option<f32>,
        /// Print the full report as JSON
        #[arg(long)]
        json: bool,
    },
    /// List attendance records
    Records {
        #[arg(short, long)]
        roll: Option<String>,
        #[arg(short, long)]
        date: Option<NaiveDate>,
        /// Print records as JSON
        #[arg(long)]
        json: bool,
    },
    /// Show configuration and database counts
    Status,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = Config::load()?;
    let store = Store::open(&config.db_path)
        .with_context(|| format!("opening database {}", config.db_path.display()))?;

    match cli.command {
        Commands::Enroll {
            roll,
            name,
            vectors,
        } => {
            let identity = Identity::new(roll, name);
            let mut faces = read_vectors(&vectors)?;
            if faces.len() > 1 {
                bail!(
                    "{} faces found in registration vectors for {identity}; expected exactly one",
                    faces.len()
                );
            }
            let vector = faces.pop();
            store.roster().enroll(&identity, vector.as_ref())?;
            match vector {
                Some(_) => println!("Enrolled {identity}"),
                None => println!(
                    "Enrolled {identity} WITHOUT a reference encoding (no face found); \
                     they cannot be recognized until re-enrolled"
                ),
            }
        }
        Commands::Remove { roll } => {
            if store.roster().remove(&roll)? {
                println!("Removed {roll}");
            } else {
                println!("No identity with roll {roll}");
            }
        }
        Commands::Roster => {
            let entries = store.roster().entries()?;
            if entries.is_empty() {
                println!("No identities enrolled");
            }
            for entry in entries {
                let reference = match &entry.vector {
                    Some(v) => format!("{}-d reference", v.dim()),
                    None => "NO REFERENCE".to_string(),
                };
                println!("{}\t{}\t{}", entry.identity.roll, entry.identity.display_name, reference);
            }
        }
        Commands::Mark {
            vectors,
            date,
            threshold,
            json,
        } => {
            let threshold = threshold.unwrap_or(config.match_threshold);
            config::validate_threshold(threshold)?;
            let today = date.unwrap_or_else(|| chrono::Local::now().date_naive());

            let observations = UnknownObservation::from_vectors(read_vectors(&vectors)?);
            let coordinator = Coordinator::new(store.ledger(), EuclideanMatcher);
            let roll_call = coordinator.process_roster(
                store.roster().entries()?,
                observations,
                threshold,
                today,
            )?;

            if json {
                println!("{}", serde_json::to_string_pretty(&roll_call)?);
                return Ok(());
            }

            for o in &roll_call.outcomes {
                let face = o.observation.source_index;
                let distance = o
                    .outcome
                    .distance
                    .map(|d| format!("{d:.3}"))
                    .unwrap_or_else(|| "-".to_string());
                match (&o.outcome.identity, o.ledger_outcome) {
                    (Some(id), LedgerDisposition::Inserted) => {
                        println!("face {face}: {id} marked present (distance {distance})")
                    }
                    (Some(id), _) => {
                        println!("face {face}: {id} already present (distance {distance})")
                    }
                    (None, _) => println!("face {face}: unrecognized (nearest {distance})"),
                }
            }
            for id in &roll_call.unreferenced {
                println!("warning: {id} has no reference encoding");
            }
            let s = roll_call.summary();
            println!(
                "{today}: {} faces, {} newly present, {} already present, {} unrecognized",
                s.faces, s.inserted, s.already_present, s.unrecognized
            );
        }
        Commands::Records { roll, date, json } => {
            let records = store.ledger().list_records(&RecordFilter { roll, date })?;
            if json {
                println!("{}", serde_json::to_string_pretty(&records)?);
                return Ok(());
            }
            for r in records {
                println!(
                    "{}\t{}\t{}\t{}",
                    r.date, r.identity.roll, r.identity.display_name, r.status
                );
            }
        }
        Commands::Status => {
            let stats = store.stats()?;
            let status = serde_json::json!({
                "version": env!("CARGO_PKG_VERSION"),
                "config": config.source.as_ref().map(|p| p.display().to_string()),
                "database": config.db_path.display().to_string(),
                "match_threshold": config.match_threshold,
                "identities": stats.identities,
                "unreferenced": stats.unreferenced,
                "records": stats.records,
            });
            println!("{status}");
        }
    }

    Ok(())
}

/// Read extractor output: a JSON array of face vectors.
fn read_vectors(path: &Path) -> Result<Vec<FeatureVector>> {
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("reading vectors {}", path.display()))?;
    let vectors: Vec<FeatureVector> = serde_json::from_str(&text)
        .with_context(|| format!("parsing vectors {}", path.display()))?;
    tracing::debug!(path = %path.display(), faces = vectors.len(), "vectors loaded");
    Ok(vectors)
}
