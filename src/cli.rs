use std::fs;
use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::config::AppConfig;
use crate::error::{ClanError, Result};
use crate::extract::{GeminiExtractor, StatExtractor};
use crate::ledger::{Ledger, Scope};
use crate::power::{
    total_power_full, total_power_lite, CalcMode, LiteBreakdown, Member, Mode, MultiplierTable,
    Roster,
};
use crate::server;
use crate::stats::{format_stat, parse_stat, ImportMode};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    Serve,
    Power,
    Parse,
    Format,
    Members,
    Clans,
    Extract,
}

pub fn parse_command(args: &[String]) -> Option<Command> {
    match args.get(1).map(String::as_str) {
        Some("serve") => Some(Command::Serve),
        Some("power") => Some(Command::Power),
        Some("parse") => Some(Command::Parse),
        Some("format") => Some(Command::Format),
        Some("members") => Some(Command::Members),
        Some("clans") => Some(Command::Clans),
        Some("extract") => Some(Command::Extract),
        _ => None,
    }
}

pub fn run_with_args(args: &[String]) -> i32 {
    match parse_command(args) {
        Some(Command::Serve) => handle_serve(),
        Some(Command::Power) => handle_power(args),
        Some(Command::Parse) => handle_parse(args),
        Some(Command::Format) => handle_format(args),
        Some(Command::Members) => handle_members(args),
        Some(Command::Clans) => handle_clans(args),
        Some(Command::Extract) => handle_extract(args),
        None => {
            eprintln!("usage: clanstats <serve|power|parse|format|members|clans|extract>");
            2
        }
    }
}

fn load_config() -> Option<AppConfig> {
    match AppConfig::from_env() {
        Ok(config) => Some(config),
        Err(err) => {
            eprintln!("configuration error: {err}");
            None
        }
    }
}

fn runtime() -> Option<tokio::runtime::Runtime> {
    match tokio::runtime::Runtime::new() {
        Ok(rt) => Some(rt),
        Err(err) => {
            eprintln!("failed to start async runtime: {err}");
            None
        }
    }
}

/// Prints `value` as pretty JSON, or the error, and maps to an exit code.
fn emit<T: Serialize>(result: Result<T>, action: &str) -> i32 {
    let value = match result {
        Ok(value) => value,
        Err(err) => {
            eprintln!("{action} failed: {err}");
            return 1;
        }
    };
    match serde_json::to_string_pretty(&value) {
        Ok(payload) => {
            println!("{payload}");
            0
        }
        Err(err) => {
            eprintln!("failed to serialize {action} result: {err}");
            1
        }
    }
}

fn handle_serve() -> i32 {
    let Some(config) = load_config() else {
        return 1;
    };
    let Some(rt) = runtime() else {
        return 1;
    };
    match rt.block_on(server::run_server(config)) {
        Ok(()) => 0,
        Err(err) => {
            eprintln!("server error: {err}");
            1
        }
    }
}

#[derive(Debug, Serialize)]
struct PowerReport {
    mode: Mode,
    calc_mode: CalcMode,
    member_count: usize,
    total: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    lite: Option<LiteBreakdown>,
}

/// Accepts either a bare member array or `{members, clan_total_power}`.
fn read_roster(path: &Path) -> Result<Roster> {
    let raw = fs::read_to_string(path).map_err(|err| ClanError::storage(path, err))?;
    let value: serde_json::Value = serde_json::from_str(&raw)?;
    let roster = if value.is_array() {
        Roster::from_members(serde_json::from_value::<Vec<Member>>(value)?)
    } else {
        serde_json::from_value::<Roster>(value)?
    };
    Ok(roster)
}

fn power_report(
    roster: &Roster,
    mode: Mode,
    lite_total: Option<u64>,
    table: &MultiplierTable,
) -> PowerReport {
    match lite_total {
        None => PowerReport {
            mode,
            calc_mode: CalcMode::Full,
            member_count: roster.len(),
            total: total_power_full(roster, mode, table),
            lite: None,
        },
        Some(clan_total) => {
            let breakdown = total_power_lite(roster, mode, clan_total, table);
            PowerReport {
                mode,
                calc_mode: CalcMode::Lite,
                member_count: roster.len(),
                total: breakdown.total,
                lite: Some(breakdown),
            }
        }
    }
}

fn handle_power(args: &[String]) -> i32 {
    let Some(path) = args.get(2) else {
        eprintln!("usage: clanstats power <roster.json> [--mode atk|def] [--lite <clan_total>]");
        return 2;
    };
    let mode = match flag_value(args, "--mode") {
        None => Mode::Atk,
        Some(raw) => match Mode::parse(raw) {
            Some(mode) => mode,
            None => {
                eprintln!("invalid mode '{raw}', expected atk or def");
                return 2;
            }
        },
    };
    let lite_total = flag_value(args, "--lite").map(parse_stat);

    let Some(config) = load_config() else {
        return 1;
    };
    let result = read_roster(Path::new(path))
        .map(|roster| power_report(&roster, mode, lite_total, &config.multipliers));
    emit(result, "power")
}

fn handle_parse(args: &[String]) -> i32 {
    let values = &args[2.min(args.len())..];
    if values.is_empty() {
        eprintln!("usage: clanstats parse <value>...");
        return 2;
    }
    for value in values {
        println!("{}", parse_stat(value.as_str()));
    }
    0
}

fn handle_format(args: &[String]) -> i32 {
    let values = &args[2.min(args.len())..];
    if values.is_empty() {
        eprintln!("usage: clanstats format <value>...");
        return 2;
    }
    for value in values {
        println!("{}", format_stat(parse_stat(value.as_str())));
    }
    0
}

const MEMBERS_USAGE: &str = concat!(
    "usage: clanstats members <list|totals|add <name> [atk] [def]|delete <name> <secret>",
    "|clear <secret>|import <file> [--replace <secret>]|export [dir]>"
);

fn handle_members(args: &[String]) -> i32 {
    let sub = args.get(2).map(String::as_str);
    let arg = |i: usize| args.get(i).map(String::as_str);

    // Check arity before touching configuration or files.
    let ready = match sub {
        Some("list") | Some("totals") | Some("export") => true,
        Some("add") | Some("import") | Some("clear") => arg(3).is_some(),
        Some("delete") => arg(4).is_some(),
        _ => false,
    };
    if !ready {
        eprintln!("{MEMBERS_USAGE}");
        return 2;
    }

    let Some(config) = load_config() else {
        return 1;
    };
    let ledger = Ledger::from_config(&config);
    let scope = Scope::Default;

    match (sub, arg(3), arg(4)) {
        (Some("list"), _, _) => emit(
            ledger
                .members(scope)
                .map(|store| server::api::members_payload(&store)),
            "list",
        ),
        (Some("totals"), _, _) => match ledger.members(scope) {
            Ok(store) => {
                let totals = store.totals();
                println!(
                    "members={} atk={} ({}) def={} ({})",
                    totals.member_count,
                    totals.total_atk,
                    totals.formatted_atk(),
                    totals.total_def,
                    totals.formatted_def()
                );
                0
            }
            Err(err) => {
                eprintln!("totals failed: {err}");
                1
            }
        },
        (Some("add"), Some(name), atk) => {
            let atk = atk.map(parse_stat).unwrap_or(0);
            let def = arg(5).map(parse_stat).unwrap_or(0);
            emit(ledger.upsert(scope, name, atk, def), "add")
        }
        (Some("delete"), Some(name), secret) => {
            emit(ledger.delete(scope, name, secret), "delete")
        }
        (Some("clear"), secret, _) => match ledger.clear(scope, secret) {
            Ok(cleared) => {
                println!("cleared {cleared} member(s)");
                0
            }
            Err(err) => {
                eprintln!("clear failed: {err}");
                1
            }
        },
        (Some("import"), Some(file), _) => {
            let (mode, secret) = match flag_value(args, "--replace") {
                Some(secret) => (ImportMode::Replace, Some(secret)),
                None => (ImportMode::Merge, None),
            };
            let result = read_json_value(Path::new(file))
                .and_then(|payload| ledger.import(scope, payload, mode, secret));
            emit(result, "import")
        }
        (Some("export"), dir, _) => {
            let dir = PathBuf::from(dir.unwrap_or("."));
            match export_to(&ledger, &dir) {
                Ok(path) => {
                    println!("{}", path.display());
                    0
                }
                Err(err) => {
                    eprintln!("export failed: {err}");
                    1
                }
            }
        }
        _ => {
            eprintln!("{MEMBERS_USAGE}");
            2
        }
    }
}

fn read_json_value(path: &Path) -> Result<serde_json::Value> {
    let raw = fs::read_to_string(path).map_err(|err| ClanError::storage(path, err))?;
    serde_json::from_str(&raw).map_err(|err| {
        ClanError::validation(format!("{} is not valid JSON: {err}", path.display()))
    })
}

fn export_to(ledger: &Ledger, dir: &Path) -> Result<PathBuf> {
    let export = ledger.export(Scope::Default)?;
    fs::create_dir_all(dir).map_err(|err| ClanError::storage(dir, err))?;
    let path = dir.join(&export.file_name);
    fs::write(&path, export.body).map_err(|err| ClanError::storage(&path, err))?;
    Ok(path)
}

const CLANS_USAGE: &str =
    "usage: clanstats clans <list|create <name> <pin>|delete <name> <secret>>";

fn handle_clans(args: &[String]) -> i32 {
    let sub = args.get(2).map(String::as_str);
    let (name, value) = (args.get(3), args.get(4));
    let ready = match sub {
        Some("list") => true,
        Some("create") | Some("delete") => name.is_some() && value.is_some(),
        _ => false,
    };
    if !ready {
        eprintln!("{CLANS_USAGE}");
        return 2;
    }

    let Some(config) = load_config() else {
        return 1;
    };
    let ledger = Ledger::from_config(&config);

    match (sub, name, value) {
        (Some("list"), _, _) => emit(ledger.list_clans(), "list"),
        (Some("create"), Some(name), Some(pin)) => emit(ledger.create_clan(name, pin), "create"),
        (Some("delete"), Some(name), Some(secret)) => match ledger.delete_clan(name, Some(secret)) {
            Ok(deleted) => {
                println!("deleted clan '{deleted}'");
                0
            }
            Err(err) => {
                eprintln!("delete failed: {err}");
                1
            }
        },
        _ => {
            eprintln!("{CLANS_USAGE}");
            2
        }
    }
}

fn mime_type_for(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_ascii_lowercase();
    match ext.as_str() {
        "png" => Some("image/png"),
        "jpg" | "jpeg" => Some("image/jpeg"),
        "webp" => Some("image/webp"),
        _ => None,
    }
}

fn handle_extract(args: &[String]) -> i32 {
    let Some(path) = args.get(2).map(PathBuf::from) else {
        eprintln!("usage: clanstats extract <image.png|jpg|jpeg|webp>");
        return 2;
    };
    let Some(mime_type) = mime_type_for(&path) else {
        eprintln!("unsupported image type: {} (expected png, jpg, jpeg or webp)", path.display());
        return 2;
    };
    let Some(config) = load_config() else {
        return 1;
    };
    let Some(rt) = runtime() else {
        return 1;
    };

    let result = fs::read(&path)
        .map_err(|err| ClanError::storage(&path, err))
        .and_then(|image| {
            let extractor = GeminiExtractor::new(&config.extract)?;
            rt.block_on(async { extractor.extract(&image, mime_type).await })
        });
    emit(result, "extract")
}

fn flag_value<'a>(args: &'a [String], flag: &str) -> Option<&'a str> {
    args.iter()
        .position(|arg| arg == flag)
        .and_then(|idx| args.get(idx + 1))
        .map(String::as_str)
}
