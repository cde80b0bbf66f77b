use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "era5-metprep")]
#[command(about = "Retrieve ERA5 reanalysis data and encode AERMET-ready surface and profile files")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    #[arg(
        short,
        long,
        global = true,
        help = "Configuration file [default: metprep.toml]"
    )]
    pub config: Option<PathBuf>,

    #[arg(long, global = true, help = "Override the configured data directory")]
    pub data_dir: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose logging")]
    pub verbose: bool,

    #[arg(long, global = true, help = "Log file path")]
    pub log_file: Option<PathBuf>,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Download raw ERA5 archives for every configured station and year
    Download {
        #[arg(long, help = "Delete existing raw data and download again")]
        overwrite: bool,

        #[arg(short = 'y', long, help = "Keep existing raw data without asking")]
        yes: bool,

        #[arg(short, long, help = "Only this station id")]
        station: Option<String>,
    },

    /// Extract and correct downloaded archives
    Process {
        #[arg(long, help = "Redo extraction and correction")]
        overwrite: bool,

        #[arg(short, long, help = "Only this station id")]
        station: Option<String>,
    },

    /// Encode corrected series into SFC and PFL files
    Encode {
        #[arg(long, help = "Encode again even if output exists")]
        overwrite: bool,

        #[arg(short, long, help = "Only this station id")]
        station: Option<String>,
    },

    /// Download, process and encode in one go
    Run {
        #[arg(long, help = "Delete every artifact of each unit and start over")]
        overwrite: bool,

        #[arg(short = 'y', long, help = "Keep existing raw data without asking")]
        yes: bool,

        #[arg(short, long, help = "Only this station id")]
        station: Option<String>,
    },

    /// Decode an SFC, PFL or IGRA file (or list a raw archive) and summarize it
    Verify {
        #[arg(short, long)]
        file: PathBuf,
    },
}
