use std::path::{Path, PathBuf};

use anyhow::{anyhow, Context, Result};
use clap::{Parser, Subcommand};
use tracing::debug;
use tracing_subscriber::EnvFilter;

use ebml_tags::config::Config;
use ebml_tags::{MatroskaFile, TagValue};

/// Read and edit the file-level tags of Matroska and WebM files
#[derive(Parser, Debug)]
#[command(name = "mkvtags", version, about, long_about = None)]
struct Cli {
    /// Configuration file (TOML)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// More logging, repeat for more detail
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the file-level tags
    Show {
        file: PathBuf,
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
    /// Print stream information
    Info {
        file: PathBuf,
        #[arg(long)]
        json: bool,
    },
    /// Set tags and save the file
    Set {
        file: PathBuf,
        /// Tags to set, as NAME=VALUE
        #[arg(required = true, value_parser = parse_assignment)]
        tags: Vec<(String, String)>,
        /// Language of the new values
        #[arg(short, long)]
        language: Option<String>,
    },
}

fn parse_assignment(arg: &str) -> Result<(String, String), String> {
    match arg.split_once('=') {
        Some((name, value)) if !name.trim().is_empty() => Ok((name.to_owned(), value.to_owned())),
        _ => Err(format!("expected NAME=VALUE, got {:?}", arg)),
    }
}

fn init_tracing(config: &Config, verbose: u8) {
    let default_filter = match verbose {
        0 => config.log_filter.clone().unwrap_or_else(|| String::from("warn")),
        1 => String::from("info"),
        2 => String::from("debug"),
        _ => String::from("trace"),
    };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter));

    tracing_subscriber::fmt().with_env_filter(env_filter).with_writer(std::io::stderr).init();
}

fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path).with_context(|| format!("failed to load configuration from {:?}", path)),
        None => Ok(Config::default()),
    }
}

fn open(file: &Path, config: &Config) -> Result<MatroskaFile> {
    MatroskaFile::open_with(file, config.parse_options()).with_context(|| format!("failed to read {:?}", file))
}

fn run(cli: Cli, config: Config) -> Result<()> {
    match cli.command {
        Command::Show { file, json } => {
            let file = open(&file, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(file.tags())?);
            } else {
                for (name, value) in file.tags().iter() {
                    println!("{}={}", name, value);
                }
            }
        },
        Command::Info { file, json } => {
            let file = open(&file, &config)?;
            if json {
                println!("{}", serde_json::to_string_pretty(file.info())?);
            } else {
                println!("{}", file.info());
            }
        },
        Command::Set { file: path, tags, language } => {
            let mut file = open(&path, &config)?;
            let language = language.unwrap_or_else(|| config.default_language.clone());
            if config.clear_existing_tags {
                file.tags_mut().clear();
            }
            for (name, value) in tags {
                file.tags_mut().insert(&name, TagValue::string(value).with_language(language.as_str()));
            }

            let summary = file.save_with_summary().with_context(|| format!("failed to save {:?}", path))?;
            debug!(?summary, "save finished");
            if summary.rearrange.shifted_elements > 0 {
                eprintln!(
                    "warning: {} clusters or cues moved, seeking in players may be affected",
                    summary.rearrange.shifted_elements
                );
            }
            println!(
                "{}: {} updated, {} added, {} unchanged",
                path.display(),
                summary.sync.updated,
                summary.sync.appended,
                summary.sync.unchanged
            );
        },
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;
    init_tracing(&config, cli.verbose);

    if config.default_language.trim().is_empty() {
        return Err(anyhow!("default_language must not be empty"));
    }
    run(cli, config)
}
