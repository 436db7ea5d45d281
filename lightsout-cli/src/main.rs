use clap::{Parser, Subcommand, ValueEnum};
use lightsout::document::document_url;
use lightsout::{
    DeleteOutcome, EntityKind, FormInput, ListQuery, Store, Submission, WriteOutcome,
};
use std::process;

/// Lights Out CLI: inspect and edit a movie catalog store from the command line
#[derive(Parser)]
#[command(name = "lightsout", version, about)]
struct Cli {
    /// Connection string of the catalog database
    #[arg(long, env = "LIGHTSOUT_DATABASE_URL", default_value = "sqlite://lightsout.db")]
    database_url: String,

    /// Output format
    #[arg(long, default_value = "yaml")]
    format: OutputFormat,

    #[command(subcommand)]
    command: Command,
}

#[derive(Clone, ValueEnum)]
enum OutputFormat {
    Yaml,
    Json,
}

#[derive(Subcommand)]
enum Command {
    /// Show document counts per collection
    Status,

    /// List documents of a kind, in list-page order
    List {
        /// Entity kind (movie, director, writer, cast, genre, movieinstance)
        kind: EntityKind,
        /// Field filters (e.g. --filter status=Available)
        #[arg(long = "filter", value_parser = parse_key_value)]
        filters: Vec<(String, String)>,
    },

    /// Get a single document by ID
    Get {
        kind: EntityKind,
        id: String,
        /// Replace reference ids with the referenced documents
        #[arg(long)]
        populate: bool,
    },

    /// Create a document through the form validation pipeline
    Insert {
        kind: EntityKind,
        /// Field values, repeatable for lists (e.g. --field genre_ids=01h..)
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Replace a document through the form validation pipeline
    Update {
        kind: EntityKind,
        id: String,
        #[arg(long = "field", value_parser = parse_key_value)]
        fields: Vec<(String, String)>,
    },

    /// Delete a document unless other documents reference it
    Delete {
        kind: EntityKind,
        id: String,
        /// Show what would be deleted without actually deleting
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the documents referencing a document
    Dependents { kind: EntityKind, id: String },
}

fn parse_key_value(s: &str) -> Result<(String, String), String> {
    let pos = s
        .find('=')
        .ok_or_else(|| format!("Invalid key=value pair: no '=' found in '{s}'"))?;
    Ok((s[..pos].to_string(), s[pos + 1..].to_string()))
}

fn main() {
    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("ERROR:{e}");
        process::exit(1);
    }
}

fn run(cli: Cli) -> Result<(), Box<dyn std::error::Error>> {
    let store = Store::open(&cli.database_url)?;

    match cli.command {
        Command::Status => {
            print_output(&store.status()?, &cli.format)?;
        }

        Command::List { kind, filters } => {
            let mut query = ListQuery::for_listing(store.definition(kind));
            query.fields = None;
            for (field, value) in filters {
                query = query.filter(&field, filter_value(&value));
            }
            let docs: Vec<_> = store
                .list(kind, &query)?
                .iter()
                .map(|d| d.to_json())
                .collect();
            print_output(&serde_json::Value::Array(docs), &cli.format)?;
        }

        Command::Get { kind, id, populate } => {
            let doc = if populate {
                store.get_populated(kind, &id)?
            } else {
                store.get(kind, &id)?
            };
            print_output(&doc.to_json(), &cli.format)?;
        }

        Command::Insert { kind, fields } => {
            let outcome = store.submit(kind, &Submission::Create, &FormInput::from_pairs(fields))?;
            print_output(&outcome_json(kind, outcome)?, &cli.format)?;
        }

        Command::Update { kind, id, fields } => {
            let outcome = store.submit(
                kind,
                &Submission::Update(id),
                &FormInput::from_pairs(fields),
            )?;
            print_output(&outcome_json(kind, outcome)?, &cli.format)?;
        }

        Command::Delete { kind, id, dry_run } => {
            if dry_run {
                let doc = store.get(kind, &id)?;
                let blocking = dependents_json(&store.dependents(kind, &id)?);
                print_output(
                    &serde_json::json!({
                        "dry_run": true,
                        "would_delete": blocking.is_empty(),
                        "document": doc.to_json(),
                        "blocked_by": blocking,
                    }),
                    &cli.format,
                )?;
            } else {
                match store.guarded_delete(kind, &id)? {
                    DeleteOutcome::Deleted => {
                        print_output(&serde_json::json!({ "ok": true, "deleted": id }), &cli.format)?;
                    }
                    DeleteOutcome::Blocked(dependents) => {
                        print_output(
                            &serde_json::json!({
                                "ok": false,
                                "blocked_by": dependents_json(&dependents),
                            }),
                            &cli.format,
                        )?;
                        return Err(format!("{kind} {id} is still referenced").into());
                    }
                }
            }
        }

        Command::Dependents { kind, id } => {
            store.get(kind, &id)?;
            let dependents = store.dependents(kind, &id)?;
            print_output(&serde_json::Value::Array(dependents_json(&dependents)), &cli.format)?;
        }
    }

    Ok(())
}

/// Numbers and booleans given to `--filter` match stored numbers and booleans.
fn filter_value(raw: &str) -> serde_json::Value {
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(v @ (serde_json::Value::Number(_) | serde_json::Value::Bool(_))) => v,
        _ => serde_json::Value::String(raw.to_string()),
    }
}

fn outcome_json(
    kind: EntityKind,
    outcome: WriteOutcome,
) -> Result<serde_json::Value, Box<dyn std::error::Error>> {
    match outcome {
        WriteOutcome::Saved { id } => Ok(serde_json::json!({
            "ok": true,
            "id": id,
            "url": document_url("", kind, &id),
        })),
        WriteOutcome::Existing { id } => Ok(serde_json::json!({
            "ok": true,
            "existing": true,
            "id": id,
        })),
        WriteOutcome::Invalid(draft) => {
            let messages: Vec<String> = draft
                .errors
                .iter()
                .map(|e| format!("{}: {}", e.field, e.message))
                .collect();
            Err(format!("validation failed: {}", messages.join("; ")).into())
        }
    }
}

fn dependents_json(dependents: &[lightsout::Dependent]) -> Vec<serde_json::Value> {
    dependents
        .iter()
        .map(|d| {
            serde_json::json!({
                "kind": d.kind,
                "id": d.document.id,
                "document": d.document.to_json(),
            })
        })
        .collect()
}

fn print_output(
    value: &serde_json::Value,
    format: &OutputFormat,
) -> Result<(), Box<dyn std::error::Error>> {
    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(value)?),
        OutputFormat::Yaml => print!("{}", serde_yaml::to_string(value)?),
    }
    Ok(())
}
