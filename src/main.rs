use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use dhcpd_leases::{Config, DhcpdLeases, Result};

#[derive(Parser)]
#[command(name = "dhcpd-leases")]
#[command(author, version, about = "Resolve MAC-to-IP bindings from dhcpd lease files", long_about = None)]
struct Cli {
    #[arg(short, long, default_value = "config.json")]
    config: PathBuf,

    /// Lease file to read instead of the configured one.
    #[arg(short = 'f', long)]
    leases: Option<PathBuf>,

    #[arg(short, long, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Print every resolved binding.
    List {
        #[arg(long)]
        json: bool,
    },
    /// Print the IP address bound to a MAC address.
    Lookup { mac: String },
    /// Load the file and report records that could not be resolved.
    Check,
    ShowConfig,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    let mut config = Config::load_or_create(&cli.config)?;
    if let Some(leases) = cli.leases {
        config.leases_file = Some(leases);
        config.validate()?;
    }

    let command = cli.command.unwrap_or(Commands::List { json: false });
    if let Commands::ShowConfig = command {
        println!("{}", serde_json::to_string_pretty(&config)?);
        return Ok(());
    }

    info!("Reading leases from {}", config.leases_path().display());
    let mut leases = DhcpdLeases::from_config(&config)?;
    leases.load()?;

    match command {
        Commands::List { json: true } => {
            println!("{}", serde_json::to_string_pretty(&*leases.snapshot())?);
        }
        Commands::List { json: false } => {
            if leases.is_empty() {
                println!("No leases.");
            } else {
                println!("{:<20} {:<16}", "MAC Address", "IP Address");
                println!("{}", "-".repeat(36));
                for (mac, ip) in leases.iter() {
                    println!("{:<20} {:<16}", mac, ip);
                }
            }
        }
        Commands::Lookup { mac } => match leases.get(&mac) {
            Some(ip) => println!("{}", ip),
            None => {
                eprintln!("No lease for {}", mac);
                std::process::exit(1);
            }
        },
        Commands::Check => {
            println!(
                "{}: {} binding(s), {} incomplete record(s)",
                leases.path().display(),
                leases.len(),
                leases.skipped().len()
            );
            for record in leases.skipped() {
                println!(
                    "  lease {} (bytes {}..{}): missing {} clause",
                    record.ip_address, record.span.start, record.span.end, record.missing
                );
            }
        }
        Commands::ShowConfig => {}
    }

    Ok(())
}
