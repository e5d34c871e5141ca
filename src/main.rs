use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use vast_runner::config::Settings;
use vast_runner::fetch::{HttpFetcher, TagFetcher};
use vast_runner::{parser, ResolutionChain, ResolutionRecord, Resolver};

/// VAST chain resolver
#[derive(Parser)]
#[command(version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse a VAST file or URL and print it as JSON
    Parse {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// Pretty print the output
        #[arg(short, long)]
        pretty: bool,
    },

    /// Follow the wrapper chain of a VAST file or URL
    Resolve {
        /// Path to the VAST file or URL
        #[arg(short, long)]
        input: String,

        /// JSON settings file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// How many further candidates to try after the first
        #[arg(short = 'n', long, default_value_t = 0)]
        candidates: usize,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match &cli.command {
        Commands::Parse { input, pretty } => {
            let fetched = HttpFetcher::new()?.fetch(input).await?;
            let vast = parser::parse_vast(&fetched.body)?;

            if *pretty {
                println!("{}", serde_json::to_string_pretty(&vast)?);
            } else {
                println!("{}", serde_json::to_string(&vast)?);
            }
        }
        Commands::Resolve {
            input,
            config,
            candidates,
        } => {
            let settings = match config {
                Some(path) => Settings::load(path)?,
                None => Settings::default(),
            };
            let resolver = Resolver::http()?;

            let mut chain = resolver.request_ad(input, &settings.request).await;
            print_chain(0, &chain);

            for attempt in 1..=*candidates {
                if !chain.has_remaining_candidates(&settings.request) {
                    break;
                }
                chain = resolver.request_next_ad(&chain, &settings.request).await?;
                print_chain(attempt, &chain);
            }
        }
    }

    Ok(())
}

/// One line per record, from the first request down to the head
fn print_chain(attempt: usize, chain: &ResolutionChain) {
    println!("candidate {}", attempt);
    let records: Vec<&ResolutionRecord> = chain.iter().collect();

    for (depth, record) in records.iter().rev().enumerate() {
        let kind = match record.ad() {
            Some(ad) if ad.is_wrapper() => "wrapper",
            Some(ad) if ad.is_inline() => "inline",
            Some(_) => "unknown",
            None => "-",
        };
        let ad_id = record.ad().and_then(|ad| ad.id.as_deref()).unwrap_or("-");
        let code = record
            .error_code()
            .map_or_else(|| "-".to_string(), |code| code.to_string());

        println!("  {} {} ad={} kind={} error={}", depth, record.request_tag(), ad_id, kind, code);
    }
}
