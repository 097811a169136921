use clap::{Parser, Subcommand};
use encoding_rs::Encoding;
use std::path::PathBuf;

#[derive(Parser, Debug)]
#[command(name = "inzip")]
#[command(version)]
#[command(about = "Edit ZIP archives in place: list, read, add, delete and defragment entries", long_about = None)]
#[command(after_help = "Examples:\n  \
  inzip add backup.zip notes.txt docs/       append files and directories\n  \
  inzip rm backup.zip docs/old.txt           delete an entry\n  \
  inzip defrag backup.zip                    reclaim space left by deletions\n  \
  inzip --encoding cp866 list -l legacy.zip  list an archive with DOS names")]
pub struct Cli {
    /// Decode names without the UTF-8 flag with this encoding instead of guessing
    #[arg(long, global = true, value_name = "LABEL", value_parser = parse_encoding)]
    pub encoding: Option<&'static Encoding>,

    /// More log output (-vv => debug, -vvv => trace)
    #[arg(short = 'v', long = "verbose", global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// List entries
    List {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Show sizes, compression ratio and timestamps
        #[arg(short = 'l', long = "long")]
        long: bool,
    },

    /// Write entry contents to stdout
    Cat {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },

    /// Extract entries to disk
    Extract {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        /// Entries to extract, `*` and `?` allowed (default: all)
        #[arg(value_name = "PATTERN")]
        patterns: Vec<String>,

        /// Extract files into exdir
        #[arg(short = 'd', value_name = "DIR")]
        extract_dir: Option<PathBuf>,

        /// Exclude files that follow
        #[arg(short = 'x', value_name = "PATTERN", num_args = 1..)]
        exclude: Vec<String>,

        /// Never overwrite existing files
        #[arg(short = 'n', conflicts_with = "overwrite")]
        never_overwrite: bool,

        /// Overwrite files WITHOUT prompting
        #[arg(short = 'o')]
        overwrite: bool,

        /// Junk paths (do not make directories)
        #[arg(short = 'j')]
        junk_paths: bool,

        /// Quiet mode
        #[arg(short = 'q')]
        quiet: bool,
    },

    /// Add files or directories, creating the archive if needed
    Add {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "FILE", required = true)]
        files: Vec<PathBuf>,

        /// Store without compression
        #[arg(long)]
        store: bool,

        /// Entry name for a single file
        #[arg(long = "as", value_name = "NAME")]
        name: Option<String>,

        /// Deflate level, 0-9
        #[arg(long, value_name = "LEVEL", default_value_t = 6, value_parser = clap::value_parser!(u32).range(0..=9))]
        level: u32,
    },

    /// Delete entries
    Rm {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },

    /// Set entry timestamps to now
    Touch {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,

        #[arg(value_name = "NAME", required = true)]
        names: Vec<String>,
    },

    /// Close gaps left by deleted entries
    Defrag {
        #[arg(value_name = "ARCHIVE")]
        archive: PathBuf,
    },
}

fn parse_encoding(label: &str) -> Result<&'static Encoding, String> {
    Encoding::for_label(label.as_bytes()).ok_or_else(|| format!("unknown encoding: {label}"))
}
