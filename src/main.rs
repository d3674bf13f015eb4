//! `mdict-lookup`: query, list and inspect MDict dictionaries from the shell.
//!
//! ```text
//! mdict-lookup lookup oald.mdx co-operate
//! mdict-lookup keys oald.mdx --limit 20
//! mdict-lookup resource oald.mdx img/logo.png -o logo.png
//! mdict-lookup rebuild oald.mdx
//! mdict-lookup inspect oald.mdx
//! ```

use std::io::{self, Write};
use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Args, Parser, Subcommand};
use mdict_index::{Dictionary, IndexStore, MdictError, OpenOptions, ResourceSource, SchemaReport};

#[derive(Parser, Debug)]
#[command(name = "mdict-lookup", version, about = "Indexed lookup in MDict dictionaries")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Print the definition of a headword.
    Lookup {
        #[command(flatten)]
        open: OpenArgs,
        word: String,
        /// Print every matching entry instead of the first.
        #[arg(long)]
        all: bool,
    },
    /// List headwords in on-disk order.
    Keys {
        #[command(flatten)]
        open: OpenArgs,
        #[arg(long)]
        limit: Option<usize>,
        /// List resource paths instead of headwords.
        #[arg(long)]
        resources: bool,
    },
    /// Extract a resource (image, stylesheet, audio) from the companion `.mdd`.
    Resource {
        #[command(flatten)]
        open: OpenArgs,
        path: String,
        /// Write to this file instead of stdout.
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
    /// Rebuild the side-car indexes from scratch.
    Rebuild {
        #[command(flatten)]
        open: OpenArgs,
    },
    /// Show header fields, counts and side-car status.
    Inspect {
        #[command(flatten)]
        open: OpenArgs,
    },
}

#[derive(Args, Debug)]
struct OpenArgs {
    /// Path to the `.mdx` file.
    dict: PathBuf,
    /// Registration code and e-mail, as `<REG_CODE_HEX>,<EMAIL>`.
    #[arg(long, value_parser = parse_passcode)]
    passcode: Option<(String, String)>,
    /// Override the key and record encoding (e.g. `GBK`, `UTF-16`).
    #[arg(long)]
    encoding: Option<String>,
    /// Directory for side-car index files.
    #[arg(long)]
    cache_dir: Option<PathBuf>,
    /// Companion resource file; defaults to `<dict>.mdd` when present.
    #[arg(long, conflicts_with = "no_resources")]
    mdd: Option<PathBuf>,
    #[arg(long)]
    no_resources: bool,
    /// Do not read or write side-car files.
    #[arg(long)]
    no_persist: bool,
}

impl OpenArgs {
    fn options(&self) -> OpenOptions {
        let mut options = OpenOptions::new().persist_index(!self.no_persist);
        if let Some((reg_code, email)) = &self.passcode {
            options = options.passcode(reg_code.clone(), email.clone());
        }
        if let Some(label) = &self.encoding {
            options = options.encoding(label);
        }
        if let Some(dir) = &self.cache_dir {
            options = options.cache_dir(dir.clone());
        }
        let resources = match (&self.mdd, self.no_resources) {
            (_, true) => ResourceSource::Disabled,
            (Some(path), false) => ResourceSource::Path(path.clone()),
            (None, false) => ResourceSource::Auto,
        };
        options.resources(resources)
    }

    fn open(&self) -> Result<Dictionary, MdictError> {
        self.options().open(&self.dict)
    }
}

fn parse_passcode(value: &str) -> Result<(String, String), String> {
    match value.split_once(',') {
        Some((reg_code, email)) if !reg_code.is_empty() && !email.is_empty() => {
            Ok((reg_code.trim().to_string(), email.trim().to_string()))
        }
        _ => Err("expected <REG_CODE_HEX>,<EMAIL>".to_string()),
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli.command) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("ERROR: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn run(command: Command) -> Result<ExitCode, MdictError> {
    match command {
        Command::Lookup { open, word, all } => {
            let dict = open.open()?;
            let found = if all {
                dict.lookup_all(&word)?
            } else {
                dict.lookup(&word)?.into_iter().collect()
            };
            if found.is_empty() {
                eprintln!("'{}' not found", word);
                return Ok(ExitCode::from(2));
            }
            for (i, definition) in found.iter().enumerate() {
                if i > 0 {
                    println!("{}", "-".repeat(60));
                }
                println!("{}", definition);
            }
        }
        Command::Keys {
            open,
            limit,
            resources,
        } => {
            let dict = open.open()?;
            let keys = if resources {
                dict.list_resource_keys()
            } else {
                dict.list_keys()
            };
            let stdout = io::stdout();
            let mut out = stdout.lock();
            for key in keys.take(limit.unwrap_or(usize::MAX)) {
                writeln!(out, "{}", key)?;
            }
        }
        Command::Resource { open, path, output } => {
            let dict = open.open()?;
            let Some(bytes) = dict.resolve_resource(&path)? else {
                eprintln!("resource '{}' not found", path);
                return Ok(ExitCode::from(2));
            };
            match output {
                Some(file) => {
                    std::fs::write(&file, &bytes)?;
                    eprintln!("Wrote {} bytes to {}", bytes.len(), file.display());
                }
                None => io::stdout().lock().write_all(&bytes)?,
            }
        }
        Command::Rebuild { open } => {
            let dict = open
                .options()
                .force_rebuild(true)
                .on_progress(|percent, message| eprintln!("[{:3}%] {}", percent, message))
                .open(&open.dict)?;
            println!("Indexed {} entries from {}", dict.entry_count(), dict.path().display());
            if let Some(path) = dict.resource_path() {
                println!(
                    "Indexed {} resources from {}",
                    dict.resource_index_entries().len(),
                    path.display()
                );
            }
        }
        Command::Inspect { open } => {
            let dict = open.open()?;
            print_summary(&dict);
            print_store("Index", &dict.index_store())?;
            if let Some(store) = dict.resource_index_store() {
                print_store("Resource index", &store)?;
            }
        }
    }
    Ok(ExitCode::SUCCESS)
}

fn print_summary(dict: &Dictionary) {
    let header = dict.header();
    println!("Dictionary: {}", dict.path().display());
    println!("  Title: {}", header.title);
    println!("  Format: {} (engine {})", header.version, header.engine_version);
    println!("  Encoding: {}", header.encoding);
    println!("  Encrypted: {:?}", header.encryption_flags);
    if let Some(desc) = &header.description {
        println!("  Description: {}", desc);
    }
    println!("  Entries: {}", dict.entry_count());
    println!("  Index origin: {:?}", dict.index_origin());

    if let (Some(path), Some(header)) = (dict.resource_path(), dict.resource_header()) {
        println!("Resources: {}", path.display());
        println!("  Format: {} (engine {})", header.version, header.engine_version);
        println!("  Entries: {}", dict.resource_index_entries().len());
        if let Some(origin) = dict.resource_index_origin() {
            println!("  Index origin: {:?}", origin);
        }
    }
}

fn print_store(label: &str, store: &IndexStore) -> Result<(), MdictError> {
    let SchemaReport {
        path,
        exists,
        format_version,
        columns,
        row_count,
        matches,
        problem,
    } = store.inspect()?;
    println!("{}: {}", label, path.display());
    if !exists {
        println!("  (not written)");
        return Ok(());
    }
    if let Some(v) = format_version {
        println!("  Format version: {}", v);
    }
    println!("  Columns: {}", columns.join(", "));
    if let Some(n) = row_count {
        println!("  Rows: {}", n);
    }
    match problem {
        None if matches => println!("  Schema: ok"),
        None => println!("  Schema: mismatch"),
        Some(reason) => println!("  Schema: mismatch ({})", reason),
    }
    Ok(())
}
