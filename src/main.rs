use std::{
    ffi::OsString,
    io::{self, BufWriter, ErrorKind, IsTerminal, Write},
    os::unix::ffi::OsStrExt,
    path::PathBuf,
    process::ExitCode,
};

use clap::Parser;
use logcut::{
    path_utils::default_cache_file, CacheError, CacheStore, Config, ConfigError, EofScanner,
    Position, PositionedReader, ReadError,
};
use thiserror::Error;
use tracing::{debug, error};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

// sysexits.h
const EX_USAGE: u8 = 64;
const EX_DATAERR: u8 = 65;
const EX_NOINPUT: u8 = 66;
const EX_OSERR: u8 = 71;
const EX_OSFILE: u8 = 72;
const EX_CANTCREAT: u8 = 73;
const EX_IOERR: u8 = 74;
const EX_NOPERM: u8 = 77;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Print lines appended to a log file since the previous run",
    long_about = None
)]
struct Cli {
    /// Log file to read.
    logfile: PathBuf,

    /// File keeping positions of read logs [default: ./.logcut if it exists, ~/.logcut otherwise].
    #[arg(short, long)]
    cache_file: Option<PathBuf>,

    /// Separator of fields in cache records [default: ##].
    #[arg(long)]
    cache_delimiter: Option<String>,

    /// Offset of the last read line. Together with --last-line disables the cache.
    #[arg(long)]
    offset: Option<u64>,

    /// Content of the last read line. Together with --offset disables the cache.
    #[arg(long)]
    last_line: Option<OsString>,

    /// Do not print what is already in a log seen for the first time, only remember its end.
    #[arg(long, conflicts_with_all = ["offset", "last_line"])]
    from_end: bool,

    /// TOML file overriding default settings.
    #[arg(long)]
    config: Option<PathBuf>,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Error, Debug)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Read(#[from] ReadError),

    #[error(transparent)]
    Cache(#[from] CacheError),

    #[error("failed to resolve {}: {source}", .path.display())]
    Resolve { path: PathBuf, source: io::Error },

    #[error("failed to write output: {0}")]
    Output(io::Error),
}

impl CliError {
    /// Log faults and cache faults never share a code.
    fn exit_code(&self) -> u8 {
        match self {
            CliError::Config(_) => EX_USAGE,
            CliError::Read(err) => match err.io_error().kind() {
                ErrorKind::NotFound => EX_NOINPUT,
                ErrorKind::PermissionDenied => EX_NOPERM,
                _ => EX_IOERR,
            },
            CliError::Cache(err) if err.is_format() => EX_DATAERR,
            CliError::Cache(CacheError::Write { .. }) => EX_CANTCREAT,
            CliError::Cache(_) => EX_OSFILE,
            CliError::Resolve { .. } => EX_OSERR,
            CliError::Output(_) => EX_IOERR,
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("LOGCUT_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose { "logcut=debug,warn" } else { "warn" })
    });

    tracing_subscriber::registry()
        .with(filter)
        .with(
            fmt::layer()
                .compact()
                .without_time()
                .with_target(false)
                .with_ansi(io::stderr().is_terminal())
                .with_writer(io::stderr),
        )
        .init();
}

fn load_config(cli: &Cli) -> Result<Config, ConfigError> {
    let mut config = match &cli.config {
        Some(path) => Config::load(path)?,
        None => Config::default(),
    };
    if let Some(delimiter) = &cli.cache_delimiter {
        config.cache_delimiter = delimiter.clone();
    }
    config.validate()?;
    Ok(config)
}

fn run(cli: &Cli) -> Result<(), CliError> {
    let config = load_config(cli)?;

    let explicit = Position::new(
        cli.offset.unwrap_or_default(),
        cli.last_line
            .as_ref()
            .map(|line| line.as_bytes().to_vec())
            .unwrap_or_default(),
    );
    let mut reader =
        PositionedReader::new(&cli.logfile, explicit).map_err(|source| CliError::Resolve {
            path: cli.logfile.clone(),
            source,
        })?;

    let cache = if cli.offset.is_some() && cli.last_line.is_some() {
        None
    } else {
        let file = cli
            .cache_file
            .clone()
            .unwrap_or_else(|| default_cache_file(&config.cache_filename));
        debug!(cache = %file.display(), "using cache");
        Some(CacheStore::with_delimiter(file, config.cache_delimiter.clone()))
    };

    if let Some(cache) = &cache {
        let cached = cache.lookup(reader.path())?;
        if !cached.is_start() {
            reader.set_position(cached);
        }
    }
    let initial = reader.position().clone();

    // the log is seen for the first time, so the baseline is saved even if nothing follows it
    if cli.from_end && initial.is_start() {
        let end = EofScanner::with_chunk_size(config.chunk_size)
            .scan_path(reader.path())
            .map_err(|source| ReadError::Open {
                path: reader.path().to_path_buf(),
                source,
            })?;
        debug!(offset = end.offset, "starting from the end of file");
        reader.set_position(end);
    }

    let mut out = BufWriter::new(io::stdout().lock());
    let mut session = reader.open()?;
    for line in session.by_ref() {
        out.write_all(&line?).map_err(CliError::Output)?;
    }
    session.close();
    out.flush().map_err(CliError::Output)?;

    match &cache {
        Some(cache) if reader.position() != &initial => {
            cache.save(reader.path(), reader.position())?;
        }
        Some(_) => debug!("nothing new was read"),
        None => {}
    }
    Ok(())
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            error!("{err}");
            ExitCode::from(err.exit_code())
        }
    }
}
