//! CLI de operador sobre el Checkpoint Store en Postgres.
//!
//! ```text
//! sync-cli latest --job <ID> [--table <T>] [--type <batch|table|job|transaction>]
//! sync-cli list [--job <ID>]
//! sync-cli prune --days <N>
//! ```
//! Códigos de salida: 0 ok, 2 uso, 4 sin resultados, 5 error de backend.
use chrono::Utc;
use sync_core::{retention_cutoff, CheckpointKind, CheckpointStore};
use sync_persistence::{build_dev_pool_from_env, PgCheckpointStore, PoolProvider};

const USAGE: &str = "Uso:
  sync-cli latest --job <ID> [--table <T>] [--type <batch|table|job|transaction>]
  sync-cli list [--job <ID>]
  sync-cli prune --days <N>";

#[derive(Debug, PartialEq)]
enum Command {
    Latest {
        job: String,
        table: Option<String>,
        kind: Option<CheckpointKind>,
    },
    List {
        job: Option<String>,
    },
    Prune {
        days: i64,
    },
}

/// Valor que sigue a `flag`, si existe.
fn flag_value(args: &[String], flag: &str) -> Option<String> {
    args.iter().position(|a| a == flag).and_then(|i| args.get(i + 1)).cloned()
}

fn parse(args: &[String]) -> Result<Command, String> {
    let (cmd, rest) = args.split_first().ok_or("falta el subcomando")?;
    match cmd.as_str() {
        "latest" => {
            let job = flag_value(rest, "--job").ok_or("latest requiere --job")?;
            let kind = match flag_value(rest, "--type") {
                Some(k) => Some(k.parse::<CheckpointKind>().map_err(|e| e.to_string())?),
                None => None,
            };
            Ok(Command::Latest { job,
                                 table: flag_value(rest, "--table"),
                                 kind })
        }
        "list" => Ok(Command::List { job: flag_value(rest, "--job") }),
        "prune" => {
            let days = flag_value(rest, "--days").and_then(|d| d.parse::<i64>().ok())
                                                 .filter(|d| retention_cutoff(Utc::now(), *d).is_some())
                                                 .ok_or("prune requiere --days <N> (N > 0 y representable)")?;
            Ok(Command::Prune { days })
        }
        other => Err(format!("subcomando desconocido '{other}'")),
    }
}

fn run(cmd: Command, store: &dyn CheckpointStore) -> Result<i32, String> {
    match cmd {
        Command::Latest { job, table, kind } => match store.latest(&job, table.as_deref(), kind).map_err(|e| e.to_string())? {
            Some(cp) => {
                println!("{}", serde_json::to_string_pretty(&cp).map_err(|e| e.to_string())?);
                Ok(0)
            }
            None => {
                eprintln!("[sync-cli] sin checkpoints para job '{job}'");
                Ok(4)
            }
        },
        Command::List { job } => {
            let rows = store.list(job.as_deref()).map_err(|e| e.to_string())?;
            for cp in &rows {
                println!("{}  {:<11} {:<24} {:<16} {}",
                         cp.created_at.to_rfc3339(),
                         cp.kind.as_str(),
                         cp.job_id,
                         cp.table.as_deref().unwrap_or("-"),
                         cp.position);
            }
            Ok(if rows.is_empty() { 4 } else { 0 })
        }
        Command::Prune { days } => {
            let cutoff = retention_cutoff(Utc::now(), days).ok_or_else(|| format!("--days {days} fuera de rango"))?;
            let removed = store.prune_older_than(cutoff).map_err(|e| e.to_string())?;
            println!("eliminados: {removed}");
            Ok(0)
        }
    }
}

fn main() {
    // Cargar .env si existe para obtener DATABASE_URL
    let _ = dotenvy::dotenv();
    let args: Vec<String> = std::env::args().skip(1).collect();
    let cmd = match parse(&args) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("[sync-cli] {e}\n{USAGE}");
            std::process::exit(2);
        }
    };
    let pool = match build_dev_pool_from_env() {
        Ok(p) => p,
        Err(e) => {
            eprintln!("[sync-cli] pool error: {e}");
            std::process::exit(5);
        }
    };
    let store = PgCheckpointStore::new(PoolProvider::new(pool));
    match run(cmd, &store) {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("[sync-cli] error: {e}");
            std::process::exit(5);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use sync_core::{Checkpoint, InMemoryCheckpointStore};

    fn args(s: &str) -> Vec<String> {
        s.split_whitespace().map(str::to_string).collect()
    }

    #[test]
    fn parses_subcommands() {
        assert_eq!(parse(&args("latest --job j1 --type table --table orders")).unwrap(),
                   Command::Latest { job: "j1".into(),
                                     table: Some("orders".into()),
                                     kind: Some(CheckpointKind::Table) });
        assert_eq!(parse(&args("list")).unwrap(), Command::List { job: None });
        assert_eq!(parse(&args("prune --days 30")).unwrap(), Command::Prune { days: 30 });
    }

    #[test]
    fn rejects_bad_input() {
        assert!(parse(&[]).is_err());
        assert!(parse(&args("latest")).is_err());
        assert!(parse(&args("latest --job j --type weird")).is_err());
        assert!(parse(&args("prune --days -1")).is_err());
        assert!(parse(&args("prune --days 0")).is_err());
        assert!(parse(&args("prune --days 1000000000")).is_err());
        assert!(parse(&args("explode")).is_err());
    }

    #[test]
    fn run_against_memory_store() {
        let store = InMemoryCheckpointStore::new();
        assert_eq!(run(Command::Latest { job: "j".into(), table: None, kind: None }, &store).unwrap(), 4);
        store.append(Checkpoint::new(CheckpointKind::Job, "j", None, json!({}))).unwrap();
        assert_eq!(run(Command::Latest { job: "j".into(), table: None, kind: None }, &store).unwrap(), 0);
        assert_eq!(run(Command::List { job: Some("j".into()) }, &store).unwrap(), 0);
        assert_eq!(run(Command::Prune { days: 1 }, &store).unwrap(), 0);
        // Un valor fuera de rango no llega a podar (ni a entrar en pánico).
        assert!(run(Command::Prune { days: 1_000_000_000 }, &store).is_err());
        assert!(run(Command::Prune { days: 0 }, &store).is_err());
        assert_eq!(run(Command::Latest { job: "j".into(), table: None, kind: None }, &store).unwrap(), 0);
    }
}
