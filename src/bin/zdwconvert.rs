use std::collections::BTreeMap;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use zdw::compress::Compression;
use zdw::error::{Error, Result};
use zdw::schema::Schema;
use zdw::writer::convert::{convert_sql_file, convert_stream, ConvertOptions};
use zdw::writer::load_metadata_file;

#[derive(Parser)]
#[command(
    name = "zdwconvert",
    version,
    about = "Convert tab-separated .sql exports into the ZDW columnar archive format"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input .sql files (with <base>.desc.sql side-cars). With -i, a single
    /// name used as the output basename.
    #[arg(required = true)]
    files: Vec<String>,

    /// Compress the .zdw output with bzip2 instead of gzip.
    #[arg(short = 'b', conflicts_with = "xz")]
    bzip2: bool,

    /// Compress the .zdw output with xz instead of gzip.
    #[arg(short = 'J')]
    xz: bool,

    /// Write outputs into this directory.
    #[arg(short = 'd', value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Read row data from standard input; the positional argument names
    /// the output.
    #[arg(short = 'i')]
    stdin_input: bool,

    /// Suppress progress output.
    #[arg(short = 'q')]
    quiet: bool,

    /// Delete the source .sql and .desc.sql after a successful conversion.
    #[arg(short = 'r')]
    remove_sources: bool,

    /// Trim trailing spaces from every field.
    #[arg(short = 't')]
    trim: bool,

    /// Validate by decoding the new file and comparing it to the source.
    #[arg(short = 'v')]
    validate: bool,

    /// Extra arguments passed to the external compressor (xz).
    #[arg(long = "zargs", value_name = "ARGS")]
    zargs: Option<String>,

    /// Writer RAM ceiling in MB (default 3072).
    #[arg(long = "mem-limit", value_name = "MB")]
    mem_limit: Option<f64>,

    /// Store a key=value pair as file metadata (repeatable).
    #[arg(long = "metadata", value_name = "KEY=VALUE")]
    metadata: Vec<String>,

    /// Load metadata key=value pairs from a file.
    #[arg(long = "metadata-file", value_name = "PATH")]
    metadata_file: Option<PathBuf>,

    /// Emit the v11 format (metadata block in the header).
    #[arg(long = "version11")]
    version11: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("ZDW conversion failed. Error code={} ({err})", err.code());
            ExitCode::from(err.code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    if let Some(mb) = cli.mem_limit {
        if !zdw::memory::set_memory_limit_mb(mb) {
            return Err(Error::BadParameter {
                details: format!("--mem-limit={mb} is not a positive size").into(),
            });
        }
    }

    let options = ConvertOptions {
        compression: if cli.bzip2 {
            Compression::Bzip2
        } else if cli.xz {
            Compression::Xz
        } else {
            Compression::Gzip
        },
        output_dir: cli.output_dir.clone(),
        validate: cli.validate,
        remove_sources: cli.remove_sources,
        trim_trailing_spaces: cli.trim,
        quiet: cli.quiet,
        version11: cli.version11,
        metadata: collect_metadata(cli)?,
        zargs: cli
            .zargs
            .as_deref()
            .map(|s| s.split_whitespace().map(str::to_owned).collect())
            .unwrap_or_default(),
    };

    if cli.stdin_input {
        let [name] = cli.files.as_slice() else {
            return Err(if cli.files.is_empty() {
                Error::NoInputFiles
            } else {
                Error::TooManyInputFiles
            });
        };
        return convert_from_stdin(name, &options);
    }

    for file in &cli.files {
        convert_sql_file(Path::new(file), &options)?;
    }
    Ok(())
}

/// Streaming mode: rows arrive on stdin; the positional `<base>.sql` names
/// the description side-car and the output basename.
fn convert_from_stdin(name: &str, options: &ConvertOptions) -> Result<()> {
    let Some(stub) = name.strip_suffix(".sql") else {
        return Err(Error::BadParameter {
            details: format!("'{name}' must have a .sql extension").into(),
        });
    };
    let desc_path = PathBuf::from(format!("{stub}.desc.sql"));
    let desc = std::fs::File::open(&desc_path).map_err(|_| Error::FileOpen { path: desc_path })?;
    let schema = Schema::parse_desc(BufReader::new(desc))?;

    let base = Path::new(stub)
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "stdin".to_owned());

    let stdin = std::io::stdin();
    convert_stream(stdin.lock(), &schema, &base, options)?;
    Ok(())
}

fn collect_metadata(cli: &Cli) -> Result<BTreeMap<String, String>> {
    let mut metadata = match &cli.metadata_file {
        Some(path) => load_metadata_file(path)?,
        None => BTreeMap::new(),
    };
    for pair in &cli.metadata {
        let Some(eq) = pair.find('=') else {
            return Err(Error::BadMetadataParam {
                details: format!("'{pair}' is not of the form key=value").into(),
            });
        };
        metadata.insert(pair[..eq].to_owned(), pair[eq + 1..].to_owned());
    }
    Ok(metadata)
}
