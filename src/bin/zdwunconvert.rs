use std::fs::File;
use std::io::{BufWriter, Read, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use clap::Parser;

use zdw::compress;
use zdw::error::{Error, Result};
use zdw::logger;
use zdw::reader::{ColumnSelection, InclusionRule, ReadOptions, ZdwReader};
use zdw::schema;
use zdw::sinks::{OrderedTsvSink, TsvSink};

#[derive(Parser)]
#[command(
    name = "zdwunconvert",
    version,
    about = "Unpack ZDW columnar archives back into tab-separated text"
)]
#[allow(clippy::struct_excessive_bools)]
struct Cli {
    /// Input .zdw[.gz|.bz2|.xz] files. A lone '-' directs output to
    /// standard output. With -i, a single name used as the output basename.
    files: Vec<String>,

    /// Append this string to output file names.
    #[arg(short = 'a', value_name = "SUFFIX")]
    suffix: Option<String>,

    /// Output only these columns, in this order; absent or duplicate names
    /// are errors.
    #[arg(short = 'c', value_name = "CSV", group = "selection")]
    columns_fail: Option<String>,

    /// Like -c, but absent and duplicate names are ignored.
    #[arg(long = "ci", value_name = "CSV", group = "selection")]
    columns_skip: Option<String>,

    /// Like -c, but absent names are emitted as empty text columns.
    #[arg(long = "ce", value_name = "CSV", group = "selection")]
    columns_fill: Option<String>,

    /// Output all columns except these.
    #[arg(long = "cx", value_name = "CSV", group = "selection")]
    columns_exclude: Option<String>,

    /// Write outputs into this directory.
    #[arg(short = 'd', value_name = "DIR")]
    output_dir: Option<PathBuf>,

    /// Read ZDW data from standard input; a positional argument names the
    /// output.
    #[arg(short = 'i')]
    stdin_input: bool,

    /// Write only the description side-car, then exit.
    #[arg(short = 'o')]
    desc_only: bool,

    /// Suppress all status output (overrides -v).
    #[arg(short = 'q')]
    quiet: bool,

    /// Show row-count progress during conversion.
    #[arg(short = 'v')]
    verbose: bool,

    /// Show per-block statistics without materializing rows.
    #[arg(short = 's')]
    statistics: bool,

    /// Test file integrity without producing output.
    #[arg(short = 't')]
    test_only: bool,

    /// Give output files no extension (default is .sql).
    #[arg(short = 'w')]
    no_extension: bool,

    /// Direct output to standard output (no .desc side-car is written).
    #[arg(long = "stdout")]
    to_stdout: bool,

    /// Print the file's metadata pairs and exit.
    #[arg(long = "metadata")]
    metadata: bool,

    /// Print only the metadata keys and exit.
    #[arg(long = "metadata-keys")]
    metadata_keys: bool,

    /// Print the metadata values for these keys and exit.
    #[arg(long = "metadata-values", value_name = "CSV")]
    metadata_values: Option<String>,

    /// Emit statistics as JSON (with -s).
    #[arg(long = "json", requires = "statistics")]
    json: bool,
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(&cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error code={} ({err})", err.code());
            ExitCode::from(err.code())
        }
    }
}

fn run(cli: &Cli) -> Result<()> {
    let mut to_stdout = cli.to_stdout;
    let inputs: Vec<&String> = cli
        .files
        .iter()
        .filter(|f| {
            if f.as_str() == "-" {
                to_stdout = true;
                false
            } else {
                true
            }
        })
        .collect();

    if cli.stdin_input {
        if inputs.len() > 1 {
            return Err(Error::TooManyInputFiles);
        }
        let basename = inputs.first().map(|s| strip_zdw_suffix(s));
        // Reading from stdin with no output name forces stdout.
        let to_stdout = to_stdout || basename.is_none();
        let stdin = std::io::stdin();
        return process_one(
            cli,
            Input::Stream(Box::new(stdin.lock())),
            basename.as_deref().unwrap_or("stdin"),
            None,
            to_stdout,
        );
    }

    if inputs.is_empty() {
        return Err(Error::NoInputFiles);
    }
    for file in inputs {
        let path = Path::new(file);
        let basename = strip_zdw_suffix(
            &path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_default(),
        );
        process_one(
            cli,
            Input::File(path.to_path_buf()),
            &basename,
            path.parent().map(Path::to_path_buf),
            to_stdout,
        )?;
    }
    Ok(())
}

enum Input {
    File(PathBuf),
    Stream(Box<dyn Read>),
}

impl Input {
    fn open(self) -> Result<(Box<dyn Read>, Option<PathBuf>)> {
        match self {
            Self::File(path) => Ok((compress::open_reader(&path)?, Some(path))),
            Self::Stream(reader) => Ok((reader, None)),
        }
    }
}

/// Cuts everything from the last `.zdw` onward, like the output naming of
/// the original archives expects.
fn strip_zdw_suffix(name: &str) -> String {
    match name.rfind(".zdw") {
        Some(pos) => name[..pos].to_owned(),
        None => name.to_owned(),
    }
}

fn selection(cli: &Cli) -> Option<ColumnSelection> {
    let (csv, rule) = if let Some(csv) = &cli.columns_fail {
        (csv, InclusionRule::FailOnInvalid)
    } else if let Some(csv) = &cli.columns_skip {
        (csv, InclusionRule::SkipInvalid)
    } else if let Some(csv) = &cli.columns_fill {
        (csv, InclusionRule::FillMissing)
    } else if let Some(csv) = &cli.columns_exclude {
        (csv, InclusionRule::Exclude)
    } else {
        return None;
    };
    Some(ColumnSelection::from_csv(csv, rule))
}

fn process_one(
    cli: &Cli,
    input: Input,
    basename: &str,
    source_dir: Option<PathBuf>,
    to_stdout: bool,
) -> Result<()> {
    let _context = logger::push_context(basename.to_owned());
    let (stream, source_path) = input.open()?;

    let mut options = ReadOptions::new();
    if let Some(sel) = selection(cli) {
        options = options.with_selection(sel);
    }
    if let Some(path) = &source_path {
        options = options.with_source_path(path);
    }
    let mut reader = ZdwReader::with_options(stream, options);

    if cli.statistics {
        return show_statistics(cli, reader);
    }

    reader.read_header()?;

    if cli.metadata || cli.metadata_keys || cli.metadata_values.is_some() {
        return show_metadata(cli, &reader);
    }

    if cli.test_only {
        let rows = reader.test_integrity()?;
        if !cli.quiet {
            logger::log_info(&format!("tested good ({rows} rows)"));
        }
        return Ok(());
    }

    let out_dir = cli
        .output_dir
        .clone()
        .or(source_dir)
        .unwrap_or_else(|| PathBuf::from("."));
    let extension = data_extension(cli);

    if cli.desc_only {
        let columns = reader.output_columns()?;
        if to_stdout {
            let mut stdout = std::io::stdout().lock();
            return schema::write_desc(&columns, &mut stdout);
        }
        let desc_path = out_dir.join(format!("{basename}.desc{extension}"));
        return write_desc_file(&columns, &desc_path);
    }

    if !to_stdout {
        let columns = reader.output_columns()?;
        let desc_path = out_dir.join(format!("{basename}.desc{extension}"));
        write_desc_file(&columns, &desc_path)?;
    }

    if to_stdout {
        let stdout = std::io::stdout().lock();
        process_rows(cli, &mut reader, stdout)?;
    } else {
        let out_path = out_dir.join(format!("{basename}{extension}"));
        let file = File::create(&out_path).map_err(|_| Error::FileCreate {
            path: out_path.clone(),
        })?;
        process_rows(cli, &mut reader, BufWriter::new(file))?;
        if !cli.quiet {
            logger::log_info(&format!("{} written", out_path.display()));
        }
    }
    reader.close();
    Ok(())
}

fn data_extension(cli: &Cli) -> String {
    let mut extension = if cli.no_extension {
        String::new()
    } else {
        ".sql".to_owned()
    };
    if let Some(suffix) = &cli.suffix {
        extension.push_str(suffix);
    }
    extension
}

fn write_desc_file(columns: &[zdw::Column], path: &Path) -> Result<()> {
    let file = File::create(path).map_err(|_| Error::FileCreate {
        path: path.to_path_buf(),
    })?;
    let mut out = BufWriter::new(file);
    schema::write_desc(columns, &mut out)?;
    out.flush()?;
    Ok(())
}

fn process_rows<R: Read, W: Write>(
    cli: &Cli,
    reader: &mut ZdwReader<R>,
    mut out: W,
) -> Result<u64> {
    // Row-count progress only appears in verbose mode; -q overrides -v.
    let progress = logger::Progress::rows(!cli.verbose || cli.quiet);
    let mut rows = 0u64;
    match reader.output_order() {
        Some(order) => {
            let mut sink =
                OrderedTsvSink::new(&mut out, &order).ok_or(Error::BadRequestedColumn {
                    details: "column ordering is not a valid permutation".into(),
                })?;
            while reader.next_row_into(&mut sink)? {
                rows += 1;
                progress.tick(rows);
            }
        }
        None => {
            let mut sink = TsvSink::new(&mut out);
            while reader.next_row_into(&mut sink)? {
                rows += 1;
                progress.tick(rows);
            }
        }
    }
    progress.finish(rows);
    out.flush()?;
    Ok(rows)
}

fn show_statistics<R: Read>(cli: &Cli, reader: ZdwReader<R>) -> Result<()> {
    let stats = reader.read_statistics()?;
    let mut stdout = std::io::stdout().lock();
    if cli.json {
        serde_json::to_writer_pretty(&mut stdout, &stats).map_err(|err| Error::Processing {
            details: err.to_string().into(),
        })?;
        writeln!(stdout)?;
        return Ok(());
    }

    writeln!(
        stdout,
        "File version {}  columns {}  rows {}",
        stats.version, stats.column_count, stats.rows
    )?;
    for (index, block) in stats.blocks.iter().enumerate() {
        let flag_bits = u64::from(block.rows) * (block.used_columns.div_ceil(8) as u64) * 8;
        let percent = if flag_bits == 0 {
            0.0
        } else {
            block.delta_bits_set as f64 * 100.0 / flag_bits as f64
        };
        writeln!(
            stdout,
            "Block {index}: rows={} max_row_size={} dictionary={} bytes \
             non-empty columns={} delta bits set={} ({percent:.1}%){}",
            block.rows,
            block.max_row_size,
            block.dictionary_size,
            block.used_columns,
            block.delta_bits_set,
            if block.is_final { " [final]" } else { "" },
        )?;
        if !block.delta_bits_per_column.is_empty() {
            let counts: Vec<String> = block
                .delta_bits_per_column
                .iter()
                .map(u64::to_string)
                .collect();
            writeln!(stdout, "  bits per column: {}", counts.join(" "))?;
        }
    }
    Ok(())
}

fn show_metadata<R: Read>(cli: &Cli, reader: &ZdwReader<R>) -> Result<()> {
    let metadata = reader.metadata();
    let mut stdout = std::io::stdout().lock();
    if let Some(csv) = &cli.metadata_values {
        for key in csv.split(',').filter(|k| !k.is_empty()) {
            let Some((_, value)) = metadata.iter().find(|(k, _)| k.as_str() == key) else {
                return Err(Error::BadParameter {
                    details: format!("metadata key '{key}' is not present").into(),
                });
            };
            writeln!(stdout, "{value}")?;
        }
        return Ok(());
    }
    for (key, value) in metadata {
        if cli.metadata_keys {
            writeln!(stdout, "{key}")?;
        } else {
            writeln!(stdout, "{key}={value}")?;
        }
    }
    Ok(())
}
