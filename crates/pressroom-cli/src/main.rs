use std::fs::{self, File};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand};
use walkdir::WalkDir;

use pressroom_core::{Manifest, Transaction};
use pressroom_storage::{default_store_root, website_root_from_env, Publisher, TransactionStore};

mod render;

use render::print_status;

#[derive(Parser, Debug)]
#[command(name = "pressroom")]
#[command(about = "Transactional publishing for static website trees", long_about = None)]
struct Cli {
    /// Store root holding per-transaction staging directories.
    #[arg(long)]
    store: Option<PathBuf>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Open a new transaction and print its id.
    Begin,
    /// Stage one file into a transaction.
    Add {
        txid: String,
        uri: String,
        file: PathBuf,
    },
    /// Stage every file under a local directory as one batch.
    AddDir {
        txid: String,
        base_uri: String,
        dir: PathBuf,
    },
    /// Stage deletions of published uris.
    Delete { txid: String, uris: Vec<String> },
    /// Stage the copies and deletions described by a manifest file.
    Apply {
        txid: String,
        manifest: PathBuf,
        #[arg(long)]
        website: Option<PathBuf>,
    },
    /// Commit a transaction into the website root.
    Commit {
        txid: String,
        #[arg(long)]
        website: Option<PathBuf>,
    },
    /// Roll back a transaction, discarding its staged content.
    Rollback { txid: String },
    /// Print the persisted record of a transaction.
    Status {
        txid: String,
        #[arg(long)]
        errors_only: bool,
    },
    /// Print the record for one uri in a transaction.
    Uri { txid: String, uri: String },
    /// List the files staged in a transaction.
    Files { txid: String },
    /// Print the staged path for a uri.
    Path { txid: String, uri: String },
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    let store_root = match cli.store {
        Some(path) => path,
        None => default_store_root()?,
    };
    let store = Arc::new(TransactionStore::open(store_root)?);
    let publisher = Publisher::new(store.clone());

    match cli.command {
        Commands::Begin => {
            let transaction = store.create()?;
            print_status("ok", &format!("transaction {}", transaction.id()));
        }
        Commands::Add { txid, uri, file } => {
            let transaction = lookup(&store, &txid)?;
            let started_at = Utc::now();
            let mut payload =
                File::open(&file).with_context(|| format!("failed to open {}", file.display()))?;
            let sha256 = publisher.stage_file(&transaction, &uri, &mut payload, started_at)?;
            print_status("ok", &format!("staged {sha256} {uri}"));
        }
        Commands::AddDir {
            txid,
            base_uri,
            dir,
        } => {
            let transaction = lookup(&store, &txid)?;
            let payloads = collect_payloads(&dir)?;
            let count = payloads.len();
            let all_staged = publisher.stage_many(&transaction, &base_uri, payloads)?;
            if !all_staged {
                return Err(anyhow!(
                    "one or more payloads failed to stage; see `pressroom status {txid}`"
                ));
            }
            print_status("ok", &format!("staged {count} files under {base_uri}"));
        }
        Commands::Delete { txid, uris } => {
            let transaction = lookup(&store, &txid)?;
            let count = publisher.stage_deletes(&transaction, &uris)?;
            print_status("ok", &format!("staged {count} deletions"));
        }
        Commands::Apply {
            txid,
            manifest,
            website,
        } => {
            let transaction = lookup(&store, &txid)?;
            let raw = fs::read_to_string(&manifest)
                .with_context(|| format!("failed to read {}", manifest.display()))?;
            let manifest = Manifest::from_json_str(&raw)?;
            let website = resolve_website(website)?;
            let (copied, deleted) = publisher.apply_manifest(&transaction, &manifest, &website)?;
            print_status(
                "ok",
                &format!("staged {copied} copies and {deleted} deletions"),
            );
        }
        Commands::Commit { txid, website } => {
            let transaction = lookup(&store, &txid)?;
            let website = resolve_website(website)?;
            publisher.commit(&transaction, &website)?;
            if transaction.has_errors() {
                for error in transaction.errors().iter() {
                    eprintln!("{error}");
                }
                return Err(anyhow!(
                    "commit finished with errors (status={})",
                    transaction.status()
                ));
            }
            print_status("ok", &format!("committed transaction {}", transaction.id()));
        }
        Commands::Rollback { txid } => {
            let transaction = lookup(&store, &txid)?;
            if !publisher.rollback(&transaction)? {
                return Err(anyhow!(
                    "rollback failed (status={})",
                    transaction.status()
                ));
            }
            print_status("ok", &format!("rolled back transaction {}", transaction.id()));
        }
        Commands::Status { txid, errors_only } => {
            let transaction = lookup(&store, &txid)?;
            let record = transaction.record();
            let record = if errors_only {
                record.errors_only()
            } else {
                record
            };
            let rendered = serde_json::to_string_pretty(&record)
                .context("failed to render transaction record")?;
            println!("{rendered}");
        }
        Commands::Uri { txid, uri } => {
            let transaction = lookup(&store, &txid)?;
            let info = transaction.uri_info(&uri);
            let rendered =
                serde_json::to_string_pretty(&info).context("failed to render uri record")?;
            println!("{rendered}");
        }
        Commands::Files { txid } => {
            let transaction = lookup(&store, &txid)?;
            for path in publisher.list_files(&transaction)? {
                println!("{}", path.display());
            }
        }
        Commands::Path { txid, uri } => {
            let transaction = lookup(&store, &txid)?;
            match publisher.get_file(&transaction, &uri)? {
                Some(path) => println!("{}", path.display()),
                None => return Err(anyhow!("no staged file at '{uri}'")),
            }
        }
    }

    Ok(())
}

fn lookup(store: &TransactionStore, txid: &str) -> Result<Arc<Transaction>> {
    store
        .get(txid)
        .ok_or_else(|| anyhow!("unknown transaction: {txid}"))
}

fn resolve_website(flag: Option<PathBuf>) -> Result<PathBuf> {
    match flag {
        Some(path) => Ok(path),
        None => website_root_from_env(),
    }
}

fn collect_payloads(dir: &PathBuf) -> Result<Vec<(String, File)>> {
    let mut payloads = Vec::new();
    for entry in WalkDir::new(dir).sort_by_file_name() {
        let entry = entry.with_context(|| format!("failed to walk {}", dir.display()))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let name = entry
            .path()
            .strip_prefix(dir)
            .with_context(|| format!("failed to relativize {}", entry.path().display()))?
            .to_string_lossy()
            .replace('\\', "/");
        let file = File::open(entry.path())
            .with_context(|| format!("failed to open {}", entry.path().display()))?;
        payloads.push((name, file));
    }
    Ok(payloads)
}
