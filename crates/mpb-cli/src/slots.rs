//! `mpb slots`, `mpb window` and `mpb active`.

use std::collections::HashMap;
use std::io::Write;

use mpb_core::store::{ProfileStore, SlotRegistry};
use mpb_core::window;
use serde::Serialize;
use tabwriter::TabWriter;

use crate::{write_json, CommandOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SlotRow {
    pub slot: String,
    pub profile_id: Option<String>,
    pub profile_name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WindowView {
    pub focused: String,
    pub safe: Vec<String>,
    pub doomed: Vec<String>,
}

pub fn run_for_test(
    args: &[&str],
    profiles: &dyn ProfileStore,
    registry: &dyn SlotRegistry,
) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_store(&owned_args, profiles, registry, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

pub fn run_with_store(
    args: &[String],
    profiles: &dyn ProfileStore,
    registry: &dyn SlotRegistry,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match execute(args, profiles, registry, stdout) {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

fn execute(
    args: &[String],
    profiles: &dyn ProfileStore,
    registry: &dyn SlotRegistry,
    stdout: &mut dyn Write,
) -> Result<(), String> {
    let parsed = parse_args(args)?;
    let io = |err: std::io::Error| err.to_string();
    let db = |err: mpb_db::DbError| format!("error: {err}");

    match parsed.command {
        Command::Slots => {
            let names: HashMap<String, String> = profiles
                .list()
                .map_err(db)?
                .into_iter()
                .map(|p| (p.id, p.name))
                .collect();
            let rows: Vec<SlotRow> = registry
                .entries()
                .map_err(db)?
                .into_iter()
                .map(|entry| SlotRow {
                    slot: entry.slot.as_str().to_string(),
                    profile_name: entry
                        .profile_id
                        .as_ref()
                        .and_then(|id| names.get(id).cloned()),
                    profile_id: entry.profile_id,
                })
                .collect();
            if parsed.json {
                return write_json(stdout, &rows);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "SLOT\tPROFILE\tNAME").map_err(io)?;
            for row in rows {
                writeln!(
                    tw,
                    "{}\t{}\t{}",
                    row.slot,
                    row.profile_id.as_deref().unwrap_or("-"),
                    row.profile_name.as_deref().unwrap_or("-"),
                )
                .map_err(io)?;
            }
            tw.flush().map_err(io)
        }
        Command::Window { profile_id } => {
            let ordered: Vec<String> = profiles
                .list()
                .map_err(db)?
                .into_iter()
                .map(|p| p.id)
                .collect();
            if !ordered.contains(&profile_id) {
                return Err(format!("error: profile not found: {profile_id}"));
            }
            let entries = registry.entries().map_err(db)?;
            let plan = window::plan(&ordered, &entries, &profile_id);
            let view = WindowView {
                focused: plan.focused,
                safe: plan.safe,
                doomed: plan.doomed,
            };
            if parsed.json {
                return write_json(stdout, &view);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "Focused:\t{}", view.focused).map_err(io)?;
            writeln!(tw, "Safe:\t{}", view.safe.join(", ")).map_err(io)?;
            let doomed = if view.doomed.is_empty() {
                "-".to_string()
            } else {
                view.doomed.join(", ")
            };
            writeln!(tw, "Doomed:\t{doomed}").map_err(io)?;
            tw.flush().map_err(io)
        }
        Command::Active { change } => {
            match change {
                ActiveChange::Show => {}
                ActiveChange::Clear => profiles.set_active(None).map_err(db)?,
                ActiveChange::Set(id) => {
                    if profiles.get(&id).map_err(db)?.is_none() {
                        return Err(format!("error: profile not found: {id}"));
                    }
                    profiles.set_active(Some(&id)).map_err(db)?;
                }
            }
            let active = profiles.get_active().map_err(db)?;
            if parsed.json {
                return write_json(stdout, &serde_json::json!({ "active": active }));
            }
            writeln!(stdout, "{}", active.as_deref().unwrap_or("none")).map_err(io)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum ActiveChange {
    Show,
    Clear,
    Set(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Slots,
    Window { profile_id: String },
    Active { change: ActiveChange },
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedArgs {
    json: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let Some(name) = args.first() else {
        return Err("error: missing command".to_string());
    };
    let mut json = false;
    let mut clear = false;
    let mut positionals: Vec<String> = Vec::new();
    for token in &args[1..] {
        match token.as_str() {
            "--json" => json = true,
            "--clear" if name == "active" => clear = true,
            flag if flag.starts_with("--") => {
                return Err(format!("error: unknown flag for {name}: '{flag}'"));
            }
            value => positionals.push(value.to_string()),
        }
    }

    let command = match name.as_str() {
        "slots" => {
            if !positionals.is_empty() {
                return Err("error: slots takes no arguments".to_string());
            }
            Command::Slots
        }
        "window" => match positionals.as_slice() {
            [id] => Command::Window {
                profile_id: id.clone(),
            },
            _ => return Err("error: window requires exactly one profile id".to_string()),
        },
        "active" => {
            let change = match (clear, positionals.as_slice()) {
                (false, []) => ActiveChange::Show,
                (true, []) => ActiveChange::Clear,
                (false, [id]) => ActiveChange::Set(id.clone()),
                _ => {
                    return Err(
                        "error: active takes either a profile id or --clear".to_string()
                    )
                }
            };
            Command::Active { change }
        }
        unknown => return Err(format!("error: unknown command '{unknown}'")),
    };
    Ok(ParsedArgs { json, command })
}
