//! Resolver CLI
//!
//! Run with:
//! ```bash
//! cargo run -p denuncia-client --bin denuncia -- resolve QmYwAPJzv5CZsnA625s3Xf2nemtYgPpHdWEz79ojWnPbdG
//! cargo run -p denuncia-client --bin denuncia -- list --contract 0x... --previews
//! ```

use std::path::PathBuf;
use std::time::Duration;

use clap::{Parser, Subcommand};
use denuncia_client::{BatchRecordFetcher, ContentPipeline, RecordListing, RecordState};
use denuncia_core::{encrypt_package, ContentId, ResolverConfig};
use denuncia_ledger::LedgerRpcClient;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(name = "denuncia")]
#[command(about = "Resolve, inspect and decrypt ledger-indexed records")]
struct Args {
    /// JSON configuration file (defaults are used when omitted)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Gateway base URL; repeat to set the full ordered list
    #[arg(long = "gateway", global = true)]
    gateways: Vec<String>,

    /// Per-attempt timeout in milliseconds
    #[arg(long, global = true)]
    timeout_ms: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Fetch a content id and decrypt it if a passphrase is given
    Resolve {
        content_id: String,

        #[arg(long, env = "DENUNCIA_PASSPHRASE")]
        password: Option<String>,

        /// Print the normalized content instead of decrypting
        #[arg(long)]
        raw: bool,
    },

    /// Classify a local file the way fetched content is classified
    Inspect { file: PathBuf },

    /// Encrypt a local file into a package
    Encrypt {
        file: PathBuf,

        #[arg(long, env = "DENUNCIA_PASSPHRASE")]
        password: String,

        /// Wrap the package as a string under this field
        #[arg(long)]
        field: Option<String>,
    },

    /// Enumerate ledger records, newest first
    List {
        #[arg(long)]
        rpc_url: Option<String>,

        #[arg(long)]
        contract: Option<String>,

        /// Also resolve each record for a preview
        #[arg(long)]
        previews: bool,

        /// Concurrent resolutions when previewing
        #[arg(long, default_value = "4")]
        concurrency: usize,
    },
}

fn load_config(args: &Args) -> anyhow::Result<ResolverConfig> {
    let mut config = match &args.config {
        Some(path) => ResolverConfig::load(path)?,
        None => ResolverConfig::default(),
    };
    if !args.gateways.is_empty() {
        config = config.with_gateways(args.gateways.iter().cloned());
    }
    if let Some(ms) = args.timeout_ms {
        config = config.with_attempt_timeout(Duration::from_millis(ms));
    }
    config.validate()?;
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive("denuncia=info".parse()?))
        .with_writer(std::io::stderr)
        .init();

    let args = Args::parse();
    let mut config = load_config(&args)?;

    match args.command {
        Command::Resolve {
            content_id,
            password,
            raw,
        } => {
            let cid = ContentId::parse(content_id)?;
            let pipeline = ContentPipeline::new(&config)?;

            if raw {
                let normalized = pipeline.fetch_normalized(&cid).await?;
                println!("[OK] {} ({})", cid, normalized.shape());
                println!("{}", normalized.as_str());
                return Ok(());
            }

            let content = pipeline
                .resolve_and_maybe_decrypt(&cid, password.as_deref())
                .await;
            match (&content.state, &content.plaintext) {
                (RecordState::Plain | RecordState::Decrypted, Some(text)) => println!("{}", text),
                (RecordState::AwaitingPassphrase, _) => {
                    println!("[LOCKED] {} is encrypted; pass --password to decrypt", cid)
                }
                _ => {
                    println!("{}", serde_json::to_string_pretty(&content)?);
                    anyhow::bail!("could not open {}", cid);
                }
            }
        }

        Command::Inspect { file } => {
            let raw = std::fs::read_to_string(&file)?;
            let normalizer = denuncia_core::ContentNormalizer::new(config.wrapped_fields.iter().cloned())?;
            let normalized = normalizer.normalize(&raw);
            println!("[OK] {} is {}", file.display(), normalized.shape());
            if normalized.is_encrypted() {
                println!("{}", normalized.as_str());
            }
        }

        Command::Encrypt {
            file,
            password,
            field,
        } => {
            let plaintext = std::fs::read_to_string(&file)?;
            let package = encrypt_package(&plaintext, &password).to_json();
            match field {
                Some(field) => {
                    let mut wrapper = serde_json::Map::new();
                    wrapper.insert(field, serde_json::Value::String(package));
                    println!("{}", serde_json::Value::Object(wrapper));
                }
                None => println!("{}", package),
            }
        }

        Command::List {
            rpc_url,
            contract,
            previews,
            concurrency,
        } => {
            if let Some(url) = rpc_url {
                config.ledger.rpc_url = url;
            }
            if let Some(address) = contract {
                config.ledger.contract_address = address;
            }

            let ledger = LedgerRpcClient::connect(&config.ledger).await?;
            let fetcher = BatchRecordFetcher::new(config.batch.clone());

            let report = match fetcher.list_records(&ledger).await? {
                RecordListing::NoRecordsYet => {
                    println!("[OK] No records yet");
                    return Ok(());
                }
                RecordListing::Listed(report) => report,
            };

            println!(
                "[OK] {} records via {:?} ({} dropped, {} batches skipped)",
                report.records.len(),
                report.source,
                report.dropped.len(),
                report.skipped_batches.len()
            );

            if previews {
                let pipeline = ContentPipeline::new(&config)?;
                for row in pipeline.preview_all(&report.records, concurrency).await {
                    println!(
                        "  #{} {} [{:?}] {}",
                        row.record.index,
                        row.record.created_at.to_rfc3339(),
                        row.state,
                        row.preview.as_deref().unwrap_or("-")
                    );
                }
            } else {
                for record in &report.records {
                    println!(
                        "  #{} {} {} {}",
                        record.index,
                        record.created_at.to_rfc3339(),
                        record.author_ref,
                        record.content_id
                    );
                }
            }
        }
    }

    Ok(())
}
