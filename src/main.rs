use anyhow::{Context, Result, bail};
use camino::{Utf8Path, Utf8PathBuf};
use clap::{Parser, Subcommand};
use keyedarchive::generator::{generate_all, write_plist};
use keyedarchive::logging::init_logger;
use keyedarchive::parser::{ArchiveSource, Format, FsSource, parse_plist, unarchive};
use rayon::prelude::*;
use tracing::{debug, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Generate, decode & check NSKeyedArchiver archives", long_about = None)]
struct Cli {
    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Write the fixture archives as <name>.bin and <name>.xml
    Generate {
        /// Directory receiving the fixture files
        #[arg(long, value_name = "DIR", default_value = "fixtures")]
        out_dir: Utf8PathBuf,
        /// Only generate the named fixture set (repeatable)
        #[arg(long, value_name = "NAME")]
        only: Vec<String>,
        /// Do not write the deliberately invalid archives
        #[arg(long)]
        skip_invalid: bool,
    },
    /// Unarchive a keyed archive and print its objects as JSON
    Decode {
        #[arg(value_name = "ARCHIVE")]
        file: Utf8PathBuf,
        /// Single-line JSON instead of pretty-printed
        #[arg(long)]
        compact: bool,
    },
    /// Print any binary or XML plist as XML
    Dump {
        #[arg(value_name = "PLIST")]
        file: Utf8PathBuf,
    },
    /// Re-encode a plist in another format
    Convert {
        #[arg(value_name = "PLIST")]
        file: Utf8PathBuf,
        /// Target format
        #[arg(long, value_enum)]
        to: Format,
        /// Output path (default: input with the target format's extension)
        #[arg(short, long, value_name = "OUT")]
        output: Option<Utf8PathBuf>,
    },
    /// Unarchive every .bin/.xml/.plist file below a directory
    Check {
        #[arg(value_name = "DIR")]
        dir: Utf8PathBuf,
    },
}

fn read(path: &Utf8Path) -> Result<Vec<u8>> {
    FsSource.read_bytes(path)
}

fn run_generate(out_dir: &Utf8Path, only: &[String], skip_invalid: bool) -> Result<bool> {
    let report = generate_all(out_dir, only, !skip_invalid)?;
    for path in &report.written {
        println!("{}", path);
    }
    if !report.is_success() {
        eprintln!("Failed fixture sets: {}", report.failed.join(", "));
    }
    Ok(report.is_success())
}

fn run_decode(file: &Utf8Path, compact: bool) -> Result<()> {
    let bytes = read(file)?;
    let objects = unarchive(&bytes).with_context(|| format!("Failed to unarchive {}", file))?;
    let json = if compact {
        serde_json::to_string(&objects)?
    } else {
        serde_json::to_string_pretty(&objects)?
    };
    println!("{}", json);
    Ok(())
}

fn run_dump(file: &Utf8Path) -> Result<()> {
    let bytes = read(file)?;
    let value = parse_plist(&bytes).with_context(|| format!("Failed to parse {}", file))?;
    print!("{}", String::from_utf8_lossy(&write_plist(&value, Format::Xml)));
    Ok(())
}

fn run_convert(file: &Utf8Path, to: Format, output: Option<Utf8PathBuf>) -> Result<()> {
    let bytes = read(file)?;
    let from = Format::detect(&bytes);
    let value = parse_plist(&bytes).with_context(|| format!("Failed to parse {}", file))?;
    let output = output.unwrap_or_else(|| file.with_extension(to.extension()));
    if output.as_path() == file {
        bail!("Refusing to overwrite input {}; pass --output", file);
    }
    std::fs::write(&output, write_plist(&value, to))
        .with_context(|| format!("Failed to write {}", output))?;
    info!("Converted {} ({:?}) to {} ({:?})", file, from, output, to);
    println!("{}", output);
    Ok(())
}

fn run_check(dir: &Utf8Path) -> Result<bool> {
    let files = FsSource.list_archives(dir)?;
    debug!("Checking {} archives below {}", files.len(), dir);
    let results: Vec<(Utf8PathBuf, std::result::Result<usize, String>)> = files
        .par_iter()
        .map(|path| {
            let outcome = read(path)
                .map_err(|e| format!("{:#}", e))
                .and_then(|bytes| unarchive(&bytes).map_err(|e| e.to_string()))
                .map(|objects| objects.len());
            (path.clone(), outcome)
        })
        .collect();

    let mut ok = true;
    for (path, outcome) in results {
        match outcome {
            Ok(count) => println!("ok    {} ({} objects)", path, count),
            Err(e) => {
                ok = false;
                println!("FAIL  {}: {}", path, e);
            }
        }
    }
    Ok(ok)
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logger(cli.verbose);

    let success = match cli.command {
        Command::Generate {
            out_dir,
            only,
            skip_invalid,
        } => run_generate(&out_dir, &only, skip_invalid)?,
        Command::Decode { file, compact } => run_decode(&file, compact).map(|_| true)?,
        Command::Dump { file } => run_dump(&file).map(|_| true)?,
        Command::Convert { file, to, output } => run_convert(&file, to, output).map(|_| true)?,
        Command::Check { dir } => run_check(&dir)?,
    };

    if !success {
        std::process::exit(1);
    }
    Ok(())
}
