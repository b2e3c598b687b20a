//! mpb-cli: operator commands over the profile store and slot registry.

pub mod migrate;
pub mod profile;
pub mod slots;

use std::env;
use std::io::Write;

use mpb_core::config::{load_config, Config};
use mpb_core::logging::init_logging;
use mpb_core::store::SqliteStore;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

/// Stable crate label used for bootstrap smoke tests.
pub fn crate_label() -> &'static str {
    "mpb-cli"
}

pub fn run_from_env() -> i32 {
    let args: Vec<String> = env::args().skip(1).collect();
    let mut stdout = std::io::stdout();
    let mut stderr = std::io::stderr();
    run(&args, &mut stdout, &mut stderr, true)
}

pub fn run_for_test(args: &[&str]) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run(&owned_args, &mut stdout, &mut stderr, false);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

fn run(args: &[String], stdout: &mut dyn Write, stderr: &mut dyn Write, logging: bool) -> i32 {
    let globals = match parse_globals(args) {
        Ok(globals) => globals,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            return 1;
        }
    };

    let Some(command) = globals.rest.first().map(String::as_str) else {
        let _ = write_help(stdout);
        return 0;
    };
    if matches!(command, "help" | "--help" | "-h") {
        let _ = write_help(stdout);
        return 0;
    }

    let cfg = match resolve_config(&globals) {
        Ok(cfg) => cfg,
        Err(message) => {
            let _ = writeln!(stderr, "error: {message}");
            return 1;
        }
    };
    if logging {
        if let Err(err) = init_logging(&cfg.logging) {
            let _ = writeln!(stderr, "warning: {err}");
        }
    }

    let mut rest = globals.rest.clone();
    if globals.json {
        rest.push("--json".to_string());
    }

    match command {
        "migrate" => {
            let mut backend = match migrate::SqliteMigrationBackend::open(cfg.db_config()) {
                Ok(backend) => backend,
                Err(message) => {
                    let _ = writeln!(stderr, "error: {message}");
                    return 1;
                }
            };
            migrate::run_with_backend(&rest, &mut backend, stdout, stderr)
        }
        "profile" | "slots" | "window" | "active" => {
            let store = match SqliteStore::open(cfg.db_config()) {
                Ok(store) => store,
                Err(err) => {
                    let _ = writeln!(stderr, "error: open database: {err}");
                    return 1;
                }
            };
            if command == "profile" {
                profile::run_with_store(&rest, &store, stdout, stderr)
            } else {
                slots::run_with_store(&rest, &store, &store, stdout, stderr)
            }
        }
        unknown => {
            let _ = writeln!(
                stderr,
                "error: unknown command '{unknown}' (expected one of: profile, slots, window, active, migrate)"
            );
            1
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Globals {
    config: Option<String>,
    db: Option<String>,
    json: bool,
    rest: Vec<String>,
}

/// Consumes leading global flags; everything from the command word on is kept.
fn parse_globals(args: &[String]) -> Result<Globals, String> {
    let mut globals = Globals::default();
    let mut index = 0usize;
    while let Some(token) = args.get(index) {
        match token.as_str() {
            "--config" => {
                globals.config = Some(flag_value(args, index, "--config")?.to_string());
                index += 2;
            }
            "--db" => {
                globals.db = Some(flag_value(args, index, "--db")?.to_string());
                index += 2;
            }
            "--json" => {
                globals.json = true;
                index += 1;
            }
            _ => break,
        }
    }
    globals.rest = args[index..].to_vec();
    Ok(globals)
}

fn resolve_config(globals: &Globals) -> Result<Config, String> {
    let (mut cfg, _) = load_config(globals.config.as_deref())?;
    if let Some(db) = &globals.db {
        cfg.database.path = Some(db.into());
    }
    Ok(cfg)
}

/// Value following the flag at `index`.
pub(crate) fn flag_value<'a>(args: &'a [String], index: usize, flag: &str) -> Result<&'a str, String> {
    args.get(index + 1)
        .map(String::as_str)
        .ok_or_else(|| format!("error: missing value for {flag}"))
}

pub(crate) fn write_json<T: serde::Serialize>(stdout: &mut dyn Write, value: &T) -> Result<(), String> {
    serde_json::to_writer_pretty(&mut *stdout, value).map_err(|err| err.to_string())?;
    writeln!(stdout).map_err(|err| err.to_string())
}

fn write_help(stdout: &mut dyn Write) -> std::io::Result<()> {
    writeln!(stdout, "Usage: mpb [--config PATH] [--db PATH] [--json] <command>")?;
    writeln!(stdout)?;
    writeln!(stdout, "Commands:")?;
    writeln!(stdout, "  profile list|add|edit|rm|show|presets  Manage profiles")?;
    writeln!(stdout, "  slots                                  Show the slot registry")?;
    writeln!(stdout, "  window <profile-id>                    Preview the lifecycle window")?;
    writeln!(stdout, "  active [<profile-id>|--clear]          Show or change the active profile")?;
    writeln!(stdout, "  migrate up|down|status|version         Manage the database schema")?;
    Ok(())
}
