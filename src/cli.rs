use clap::{Args, Parser, Subcommand};

#[derive(Parser, Debug)]
#[command(name = "zipline")]
#[command(version)]
#[command(about = "Create and extract ZIP archives with progress and cancellation", long_about = None)]
#[command(after_help = "Examples:\n  \
  zipline create site.zip ./public -t \"$PWD/\"     store paths relative to the current directory\n  \
  zipline extract site.zip -d /srv/www            extract into /srv/www\n  \
  zipline inspect -v site.zip                     list entries with sizes and dates\n  \
  zipline --timeout 30 extract big.zip            give up after 30 seconds")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Quiet mode (-qq => quieter)
    #[arg(short = 'q', global = true, action = clap::ArgAction::Count)]
    pub quiet: u8,

    /// Cancel the operation after this many seconds
    #[arg(long, global = true, value_name = "SECS")]
    pub timeout: Option<u64>,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Create an archive from files and directories
    Create(CreateArgs),
    /// Extract an archive
    Extract(ExtractArgs),
    /// Show entry count and, optionally, the entries of an archive
    Inspect(InspectArgs),
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    /// Archive to write
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Files and directories to add
    #[arg(value_name = "PATHS", required = true)]
    pub paths: Vec<String>,

    /// Strip this prefix from absolute paths; first match wins
    #[arg(short = 't', long = "trim", value_name = "PREFIX")]
    pub trim: Vec<String>,

    /// Store entries without compression
    #[arg(long)]
    pub store: bool,

    /// Deflate level (0-9)
    #[arg(long, default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
    pub level: u32,
}

#[derive(Args, Debug)]
pub struct ExtractArgs {
    /// Archive to read
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// Extract files into exdir
    #[arg(short = 'd', value_name = "DIR", default_value = ".")]
    pub extract_dir: String,

    /// Permission bits for created directories, in octal
    #[arg(long, value_name = "MODE", default_value = "755", value_parser = parse_mode)]
    pub dir_mode: u32,
}

#[derive(Args, Debug)]
pub struct InspectArgs {
    /// Archive to read
    #[arg(value_name = "ARCHIVE")]
    pub archive: String,

    /// List entries (short format)
    #[arg(short = 'l')]
    pub list: bool,

    /// List entries verbosely
    #[arg(short = 'v')]
    pub verbose: bool,
}

impl Cli {
    pub fn is_quiet(&self) -> bool {
        self.quiet > 0
    }

    pub fn is_very_quiet(&self) -> bool {
        self.quiet > 1
    }
}

fn parse_mode(value: &str) -> Result<u32, String> {
    let digits = value.trim_start_matches("0o");
    match u32::from_str_radix(digits, 8) {
        Ok(mode) if mode <= 0o7777 => Ok(mode),
        _ => Err(format!("'{value}' is not an octal permission mode")),
    }
}
