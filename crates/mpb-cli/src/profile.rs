//! `mpb profile` subcommands.

use std::io::Write;

use mpb_core::store::ProfileStore;
use mpb_db::profile_repository::{find_preset, Profile, PRESETS};
use mpb_db::DbError;
use serde::Serialize;
use tabwriter::TabWriter;

use crate::{flag_value, write_json, CommandOutput};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ProfileView {
    pub id: String,
    pub name: String,
    pub url: String,
    pub position: i64,
    pub active: bool,
    pub created_at: String,
    pub updated_at: String,
}

impl ProfileView {
    fn new(profile: Profile, active: Option<&str>) -> Self {
        let is_active = active == Some(profile.id.as_str());
        Self {
            id: profile.id,
            name: profile.name,
            url: profile.url,
            position: profile.position,
            active: is_active,
            created_at: profile.created_at,
            updated_at: profile.updated_at,
        }
    }
}

pub fn run_for_test(args: &[&str], store: &dyn ProfileStore) -> CommandOutput {
    let owned_args: Vec<String> = args.iter().map(|arg| (*arg).to_string()).collect();
    let mut stdout = Vec::new();
    let mut stderr = Vec::new();
    let exit_code = run_with_store(&owned_args, store, &mut stdout, &mut stderr);
    CommandOutput {
        stdout: String::from_utf8_lossy(&stdout).into_owned(),
        stderr: String::from_utf8_lossy(&stderr).into_owned(),
        exit_code,
    }
}

pub fn run_with_store(
    args: &[String],
    store: &dyn ProfileStore,
    stdout: &mut dyn Write,
    stderr: &mut dyn Write,
) -> i32 {
    match execute(args, store, stdout) {
        Ok(()) => 0,
        Err(message) => {
            let _ = writeln!(stderr, "{message}");
            1
        }
    }
}

fn store_error(id: &str, err: DbError) -> String {
    match err {
        DbError::ProfileNotFound => format!("error: profile not found: {id}"),
        other => format!("error: {other}"),
    }
}

fn lookup(store: &dyn ProfileStore, id: &str) -> Result<Profile, String> {
    store
        .get(id)
        .map_err(|err| store_error(id, err))?
        .ok_or_else(|| format!("error: profile not found: {id}"))
}

fn active_id(store: &dyn ProfileStore) -> Result<Option<String>, String> {
    store.get_active().map_err(|err| format!("error: {err}"))
}

fn execute(args: &[String], store: &dyn ProfileStore, stdout: &mut dyn Write) -> Result<(), String> {
    let parsed = parse_args(args)?;
    let io = |err: std::io::Error| err.to_string();
    match parsed.command {
        Command::Help => write_help(stdout).map_err(io),
        Command::List => {
            let active = active_id(store)?;
            let views: Vec<ProfileView> = store
                .list()
                .map_err(|err| format!("error: {err}"))?
                .into_iter()
                .map(|profile| ProfileView::new(profile, active.as_deref()))
                .collect();
            if parsed.json {
                return write_json(stdout, &views);
            }
            if views.is_empty() {
                return writeln!(stdout, "No profiles").map_err(io);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "ID\tNAME\tURL\tACTIVE").map_err(io)?;
            for view in &views {
                let marker = if view.active { "*" } else { "" };
                writeln!(tw, "{}\t{}\t{}\t{}", view.id, view.name, view.url, marker).map_err(io)?;
            }
            tw.flush().map_err(io)
        }
        Command::Add { name, url, preset } => {
            let preset = match preset.as_deref() {
                Some(key) => Some(
                    find_preset(key).ok_or_else(|| format!("error: unknown preset '{key}'"))?,
                ),
                None => None,
            };
            let name = name.or_else(|| preset.map(|p| p.name.to_string())).unwrap_or_default();
            let url = url.or_else(|| preset.map(|p| p.url.to_string())).unwrap_or_default();
            let profile = store
                .create(&name, &url)
                .map_err(|err| format!("error: {err}"))?;
            if parsed.json {
                return write_json(stdout, &ProfileView::new(profile, None));
            }
            writeln!(stdout, "Created profile {} ({})", profile.name, profile.id).map_err(io)
        }
        Command::Edit { id, name, url } => {
            let current = lookup(store, &id)?;
            let name = name.unwrap_or(current.name);
            let url = url.unwrap_or(current.url);
            let profile = store
                .update(&id, &name, &url)
                .map_err(|err| store_error(&id, err))?;
            if parsed.json {
                let active = active_id(store)?;
                return write_json(stdout, &ProfileView::new(profile, active.as_deref()));
            }
            writeln!(stdout, "Updated profile {} ({})", profile.name, profile.id).map_err(io)
        }
        Command::Remove { id } => {
            store.delete(&id).map_err(|err| store_error(&id, err))?;
            if parsed.json {
                return write_json(stdout, &serde_json::json!({ "removed": id }));
            }
            writeln!(stdout, "Removed profile {id}").map_err(io)
        }
        Command::Show { id } => {
            let active = active_id(store)?;
            let view = ProfileView::new(lookup(store, &id)?, active.as_deref());
            if parsed.json {
                return write_json(stdout, &view);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "ID:\t{}", view.id).map_err(io)?;
            writeln!(tw, "Name:\t{}", view.name).map_err(io)?;
            writeln!(tw, "URL:\t{}", view.url).map_err(io)?;
            writeln!(tw, "Position:\t{}", view.position).map_err(io)?;
            writeln!(tw, "Active:\t{}", if view.active { "yes" } else { "no" }).map_err(io)?;
            writeln!(tw, "Created:\t{}", view.created_at).map_err(io)?;
            writeln!(tw, "Updated:\t{}", view.updated_at).map_err(io)?;
            tw.flush().map_err(io)
        }
        Command::Presets => {
            if parsed.json {
                let rows: Vec<serde_json::Value> = PRESETS
                    .iter()
                    .map(|p| serde_json::json!({ "key": p.key, "name": p.name, "url": p.url }))
                    .collect();
                return write_json(stdout, &rows);
            }
            let mut tw = TabWriter::new(&mut *stdout).padding(2);
            writeln!(tw, "KEY\tNAME\tURL").map_err(io)?;
            for preset in PRESETS {
                writeln!(tw, "{}\t{}\t{}", preset.key, preset.name, preset.url).map_err(io)?;
            }
            tw.flush().map_err(io)
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Command {
    Help,
    List,
    Add {
        name: Option<String>,
        url: Option<String>,
        preset: Option<String>,
    },
    Edit {
        id: String,
        name: Option<String>,
        url: Option<String>,
    },
    Remove { id: String },
    Show { id: String },
    Presets,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct ParsedArgs {
    json: bool,
    command: Command,
}

fn parse_args(args: &[String]) -> Result<ParsedArgs, String> {
    let mut index = 0usize;
    if args.get(index).is_some_and(|arg| arg == "profile") {
        index += 1;
    }

    let mut json = false;
    let mut subcommand: Option<String> = None;
    let mut positionals: Vec<String> = Vec::new();
    let mut name = None;
    let mut url = None;
    let mut preset = None;

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
            "--name" => {
                name = Some(flag_value(args, index, "--name")?.to_string());
                index += 2;
            }
            "--url" => {
                url = Some(flag_value(args, index, "--url")?.to_string());
                index += 2;
            }
            "--preset" => {
                preset = Some(flag_value(args, index, "--preset")?.to_string());
                index += 2;
            }
            flag if flag.starts_with("--") => {
                return Err(format!("error: unknown flag for profile: '{flag}'"));
            }
            value => {
                if subcommand.is_none() {
                    subcommand = Some(value.to_string());
                } else {
                    positionals.push(value.to_string());
                }
                index += 1;
            }
        }
    }

    let Some(subcommand) = subcommand else {
        return Ok(ParsedArgs {
            json,
            command: Command::Help,
        });
    };

    let sub = subcommand.as_str();
    let flags_used = name.is_some() || url.is_some() || preset.is_some();
    let command = match sub {
        "list" | "ls" => {
            expect_positionals(sub, &positionals, 0)?;
            reject_flags(sub, flags_used)?;
            Command::List
        }
        "presets" => {
            expect_positionals(sub, &positionals, 0)?;
            reject_flags(sub, flags_used)?;
            Command::Presets
        }
        "add" => {
            if positionals.len() > 2 {
                return Err("error: profile add accepts at most NAME and URL".to_string());
            }
            let mut positionals = positionals.into_iter();
            Command::Add {
                name: name.or_else(|| positionals.next()),
                url: url.or_else(|| positionals.next()),
                preset,
            }
        }
        "edit" => {
            expect_positionals(sub, &positionals, 1)?;
            if preset.is_some() {
                return Err("error: --preset only applies to profile add".to_string());
            }
            if name.is_none() && url.is_none() {
                return Err("error: profile edit needs --name or --url".to_string());
            }
            Command::Edit {
                id: positionals.remove(0),
                name,
                url,
            }
        }
        "rm" | "remove" => {
            expect_positionals(sub, &positionals, 1)?;
            reject_flags(sub, flags_used)?;
            Command::Remove {
                id: positionals.remove(0),
            }
        }
        "show" => {
            expect_positionals(sub, &positionals, 1)?;
            reject_flags(sub, flags_used)?;
            Command::Show {
                id: positionals.remove(0),
            }
        }
        unknown => {
            return Err(format!(
                "error: unknown profile command '{unknown}' (expected one of: list, add, edit, rm, show, presets)"
            ));
        }
    };
    Ok(ParsedArgs { json, command })
}

fn expect_positionals(sub: &str, positionals: &[String], count: usize) -> Result<(), String> {
    if positionals.len() == count {
        return Ok(());
    }
    if count == 0 {
        Err(format!("error: profile {sub} takes no arguments"))
    } else {
        Err(format!("error: profile {sub} requires a profile id"))
    }
}

fn reject_flags(sub: &str, used: bool) -> Result<(), String> {
    if used {
        Err(format!("error: profile {sub} does not accept --name, --url or --preset"))
    } else {
        Ok(())
    }
}

fn write_help(stdout: &mut dyn Write) -> std::io::Result<()> {
    writeln!(stdout, "Usage: mpb profile <command> [--json]")?;
    writeln!(stdout)?;
    writeln!(stdout, "  list                              List profiles in order")?;
    writeln!(stdout, "  add NAME URL | --preset KEY       Create a profile")?;
    writeln!(stdout, "  edit ID [--name N] [--url U]      Change name or address")?;
    writeln!(stdout, "  rm ID                             Delete a profile")?;
    writeln!(stdout, "  show ID                           Show one profile")?;
    writeln!(stdout, "  presets                           List quick-fill templates")?;
    Ok(())
}
