use std::{fs, path::{Path, PathBuf}};

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use kiln_core::trajectory::{estimate_cost, segment_slopes};
use serde::Serialize;
use shared::{
    config::KilnConfig,
    domain::{Profile, RunId, TimeScale},
    protocol::LogEntry,
};
use storage::{Storage, StoredRun};
use uuid::Uuid;

#[derive(Parser, Debug)]
#[command(about = "Maintenance commands for the kiln profile store and run journal")]
struct Cli {
    #[arg(long, default_value = "sqlite://./data/kiln.db")]
    database_url: String,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Lists stored profiles with their steepest ramp and a worst-case cost.
    ListProfiles {
        #[arg(long, default_value_t = 3850.0)]
        heater_watts: f64,
        #[arg(long, default_value_t = 0.20)]
        kwh_rate: f64,
    },
    /// Loads a profile from a `.json` or `.toml` file.
    Import {
        path: PathBuf,
        #[arg(long)]
        force: bool,
    },
    /// Writes a profile to stdout, or to `--output` in the format its extension names.
    Export {
        name: String,
        #[arg(long)]
        output: Option<PathBuf>,
    },
    Delete {
        name: String,
    },
    ListRuns {
        #[arg(long, default_value_t = 20)]
        limit: u32,
    },
    /// Dumps a journaled run with its full log as JSON.
    ExportRun {
        run_id: Uuid,
        #[arg(long)]
        output: Option<PathBuf>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ProfileFormat {
    Json,
    Toml,
}

impl ProfileFormat {
    fn for_path(path: &Path) -> Result<Self> {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Ok(Self::Json),
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Ok(Self::Toml),
            _ => bail!(
                "cannot tell the format of '{}'; use a .json or .toml extension",
                path.display()
            ),
        }
    }
}

#[derive(Debug, Serialize)]
struct RunExport {
    id: RunId,
    profile: Profile,
    mode: &'static str,
    started_at: String,
    finished_at: Option<String>,
    final_state: Option<&'static str>,
    energy_kwh: Option<f64>,
    cost: Option<f64>,
    log: Vec<LogEntry>,
}

impl RunExport {
    fn new(run: StoredRun, log: Vec<LogEntry>) -> Self {
        Self {
            id: run.id,
            profile: run.profile,
            mode: run.mode.as_str(),
            started_at: run.started_at.to_rfc3339(),
            finished_at: run.finished_at.map(|t| t.to_rfc3339()),
            final_state: run.final_state.map(|s| s.as_str()),
            energy_kwh: run.energy_kwh,
            cost: run.cost,
            log,
        }
    }
}

fn profile_summary(profile: &Profile, config: &KilnConfig) -> String {
    let (low, high) = profile.temperature_bounds().unwrap_or_default();
    let steepest = segment_slopes(profile, TimeScale::Hours)
        .into_iter()
        .fold(0.0_f64, |max, slope| if slope.abs() > max.abs() { slope } else { max });
    format!(
        "{}\tpoints={}\tduration={}s\trange={low}..{high}\tsteepest={steepest:.1}/h\test={}{:.2}",
        profile.name,
        profile.data.len(),
        profile.duration_seconds(),
        config.currency_type,
        estimate_cost(profile, config)
    )
}

fn parse_profile(text: &str, format: ProfileFormat) -> Result<Profile> {
    let profile: Profile = match format {
        ProfileFormat::Json => serde_json::from_str(text).context("invalid JSON profile")?,
        ProfileFormat::Toml => toml::from_str(text).context("invalid TOML profile")?,
    };
    profile.validate()?;
    Ok(profile)
}

fn render_profile(profile: &Profile, format: ProfileFormat) -> Result<String> {
    Ok(match format {
        ProfileFormat::Json => serde_json::to_string_pretty(profile)?,
        ProfileFormat::Toml => toml::to_string(profile)?,
    })
}

fn write_output(output: Option<&Path>, text: &str) -> Result<()> {
    match output {
        Some(path) => fs::write(path, text)
            .with_context(|| format!("failed to write '{}'", path.display())),
        None => {
            println!("{text}");
            Ok(())
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let storage = Storage::new(&cli.database_url).await?;

    match cli.command {
        Command::ListProfiles {
            heater_watts,
            kwh_rate,
        } => {
            let config = KilnConfig {
                heater_power_watts: heater_watts,
                kwh_rate,
                ..KilnConfig::default()
            };
            for profile in storage.list_profiles().await? {
                println!("{}", profile_summary(&profile, &config));
            }
        }
        Command::Import { path, force } => {
            let format = ProfileFormat::for_path(&path)?;
            let text = fs::read_to_string(&path)
                .with_context(|| format!("failed to read '{}'", path.display()))?;
            let profile = parse_profile(&text, format)?;
            let profiles = storage.put_profile(&profile, force).await?;
            println!("imported '{}' ({} profiles stored)", profile.name, profiles.len());
        }
        Command::Export { name, output } => {
            let Some(profile) = storage.find_profile(&name).await? else {
                bail!("profile '{name}' not found");
            };
            let format = match &output {
                Some(path) => ProfileFormat::for_path(path)?,
                None => ProfileFormat::Json,
            };
            write_output(output.as_deref(), &render_profile(&profile, format)?)?;
        }
        Command::Delete { name } => {
            let remaining = storage.delete_profile(&name).await?;
            println!("deleted '{name}' ({} profiles left)", remaining.len());
        }
        Command::ListRuns { limit } => {
            for run in storage.list_runs(limit).await? {
                println!(
                    "{}\t{}\t{}\t{}\t{}\tcost={:.2}",
                    run.id,
                    run.started_at.to_rfc3339(),
                    run.mode.as_str(),
                    run.profile.name,
                    run.final_state.map(|s| s.as_str()).unwrap_or("RUNNING"),
                    run.cost.unwrap_or_default()
                );
            }
        }
        Command::ExportRun { run_id, output } => {
            let run_id = RunId(run_id);
            let Some(run) = storage.load_run(run_id).await? else {
                bail!("run {run_id} not found");
            };
            let log = storage.load_run_log(run_id).await?;
            let export = RunExport::new(run, log);
            write_output(output.as_deref(), &serde_json::to_string_pretty(&export)?)?;
        }
    }

    Ok(())
}

#[cfg(test)]
#[path = "tests/main_tests.rs"]
mod tests;
