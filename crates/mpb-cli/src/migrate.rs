//! `mpb migrate` subcommands.

use std::io::Write;

use serde::Serialize;
use tabwriter::TabWriter;

use crate::{flag_value, write_json, CommandOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationStatus {
    pub version: i32,
    pub description: String,
    pub applied: bool,
    pub applied_at: String,
}

pub trait MigrationBackend {
    fn migrate_up(&mut self) -> Result<usize, String>;
    fn migrate_down(&mut self, steps: i32) -> Result<usize, String>;
    fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, String>;
    fn schema_version(&mut self) -> Result<i32, String>;
}

#[derive(Debug)]
pub struct SqliteMigrationBackend {
    db: mpb_db::Db,
}

impl SqliteMigrationBackend {
    /// Opens the database without applying migrations.
    pub fn open(cfg: mpb_db::Config) -> Result<Self, String> {
        let db = mpb_db::Db::open(cfg).map_err(|err| format!("open database: {err}"))?;
        Ok(Self { db })
    }
}

impl MigrationBackend for SqliteMigrationBackend {
    fn migrate_up(&mut self) -> Result<usize, String> {
        self.db.migrate_up().map_err(|err| err.to_string())
    }

    fn migrate_down(&mut self, steps: i32) -> Result<usize, String> {
        self.db.migrate_down(steps).map_err(|err| err.to_string())
    }

    fn migration_status(&mut self) -> Result<Vec<MigrationStatus>, String> {
        let status = self.db.migration_status().map_err(|err| err.to_string())?;
        Ok(status
            .into_iter()
            .map(|row| MigrationStatus {
                version: row.version,
                description: row.description,
                applied: row.applied,
                applied_at: row.applied_at,
            })
            .collect())
    }

    fn schema_version(&mut self) -> Result<i32, String> {
        self.db.schema_version().map_err(|err| err.to_string())
    }
}

pub fn run_for_test(args: &[&str], backend: &mut dyn MigrationBackend) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_backend(&owned_args, backend, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

pub fn run_with_backend(
    args: &[String],
    backend: &mut dyn MigrationBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match execute(args, backend, stdout, stderr) {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

fn execute(
    args: &[String],
    backend: &mut dyn MigrationBackend,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> Result<(), String> {
    let parsed = parse_args(args)?;
    match parsed.command {
        Command::Help => write_help(stdout).map_err(|err| err.to_string()),
        Command::Up => {
            let applied = backend
                .migrate_up()
                .map_err(|err| format!("migration failed: {err}"))?;
            if parsed.json {
                return write_json(stdout, &serde_json::json!({ "applied": applied }));
            }
            if applied == 0 {
                writeln!(stderr, "No pending migrations").map_err(|err| err.to_string())?;
            } else {
                writeln!(stderr, "Applied {applied} migration(s)").map_err(|err| err.to_string())?;
            }
            Ok(())
        }
        Command::Down { steps } => {
            let rolled_back = backend
                .migrate_down(steps)
                .map_err(|err| format!("rollback failed: {err}"))?;
            if parsed.json {
                return write_json(stdout, &serde_json::json!({ "rolled_back": rolled_back }));
            }
            if rolled_back == 0 {
                writeln!(stderr, "No migrations to roll back").map_err(|err| err.to_string())?;
            } else {
                writeln!(stderr, "Rolled back {rolled_back} migration(s)")
                    .map_err(|err| err.to_string())?;
            }
            Ok(())
        }
        Command::Status => {
            let status = backend
                .migration_status()
                .map_err(|err| format!("failed to get migration status: {err}"))?;
            if parsed.json {
                return write_json(stdout, &status);
            }

            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "VERSION\tDESCRIPTION\tSTATUS\tAPPLIED AT").map_err(|err| err.to_string())?;
            for row in status {
                let (state, applied_at) = if row.applied {
                    ("applied", row.applied_at)
                } else {
                    ("pending", "-".to_string())
                };
                writeln!(tw, "{}\t{}\t{}\t{}", row.version, row.description, state, applied_at)
                    .map_err(|err| err.to_string())?;
            }
            tw.flush().map_err(|err| err.to_string())
        }
        Command::Version => {
            let version = backend
                .schema_version()
                .map_err(|err| format!("failed to get schema version: {err}"))?;
            if parsed.json {
                return write_json(stdout, &serde_json::json!({ "version": version }));
            }
            writeln!(stdout, "Schema version: {version}").map_err(|err| err.to_string())
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    Up,
    Down { steps: i32 },
    Status,
    Version,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedArgs {
    json: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut index = 0usize;
    if args.get(index).is_some_and(|arg| arg == "migrate") {
        index += 1;
    }

    let mut json = false;
    let mut command = None;
    let mut steps = 1;
    while let Some(token) = args.get(index) {
        match token.as_str() {
            "--json" => {
                json = true;
                index += 1;
            }
            "--help" | "-h" => {
                return Ok(ParsedArgs {
                    json,
                    command: Command::Help,
                });
            }
            "--steps" | "-n" => {
                let value = flag_value(args, index, token)?;
                steps = value
                    .parse::<i32>()
                    .map_err(|_| format!("error: invalid value '{value}' for {token}"))?;
                index += 2;
            }
            "up" | "down" | "status" | "version" if command.is_none() => {
                command = Some(token.clone());
                index += 1;
            }
            unknown => {
                return Err(format!(
                    "error: unknown migrate argument '{unknown}' (expected one of: up, down, status, version)"
                ));
            }
        }
    }

    let command = match command.as_deref() {
        None => Command::Help,
        Some("up") => Command::Up,
        Some("down") => Command::Down { steps },
        Some("status") => Command::Status,
        Some(_) => Command::Version,
    };
    if steps != 1 && !matches!(command, Command::Down { .. }) {
        return Err("error: --steps only applies to migrate down".to_string());
    }
    Ok(ParsedArgs { json, command })
}

fn write_help(stdout: &mut dyn Write) -> std::io::Result<()> {
    writeln!(stdout, "Usage: mpb migrate <up|down|status|version> [--json]")?;
    writeln!(stdout)?;
    writeln!(stdout, "  up                 Apply all pending migrations")?;
    writeln!(stdout, "  down [--steps N]   Roll back N migrations (default 1)")?;
    writeln!(stdout, "  status             List migrations and whether they are applied")?;
    writeln!(stdout, "  version            Print the current schema version")?;
    Ok(())
}
