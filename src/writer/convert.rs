//! Path-level conversion: locate the description side-car, stream the
//! rows into a (compressed) `.zdw` file under a temporary name, optionally
//! validate the result by decoding it back, then rename into place.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::{Path, PathBuf};

use crate::compress::{self, Compression};
use crate::error::{Error, Result};
use crate::io::{split_fields, LineReader};
use crate::logger;
use crate::reader::ZdwReader;
use crate::schema::Schema;
use crate::sinks::TsvSink;
use crate::writer::{
    load_metadata_file, write_seekable, write_streaming, SpillFile, WriterOptions,
};

/// Options for one conversion run.
#[derive(Debug, Clone, Default)]
pub struct ConvertOptions {
    pub compression: Compression,
    pub output_dir: Option<PathBuf>,
    pub validate: bool,
    pub remove_sources: bool,
    pub trim_trailing_spaces: bool,
    pub quiet: bool,
    pub version11: bool,
    pub metadata: BTreeMap<String, String>,
    pub zargs: Vec<String>,
}

impl ConvertOptions {
    fn writer_options(&self, metadata: BTreeMap<String, String>) -> WriterOptions {
        WriterOptions::new()
            .with_version11(self.version11)
            .with_trim_trailing_spaces(self.trim_trailing_spaces)
            .with_quiet(self.quiet)
            .with_metadata(metadata)
    }
}

/// Result of a successful conversion.
#[derive(Debug, Clone)]
pub struct ConvertSummary {
    pub output_path: PathBuf,
    pub rows: u64,
    pub blocks: u32,
}

/// Converts `<base>.sql` (with its `<base>.desc.sql` side-car) into
/// `<base>.zdw[.gz|.bz2|.xz]`.
///
/// # Errors
///
/// Surfaces schema, metadata, I/O, and validation failures; on any error
/// the partially written temporary file is removed.
pub fn convert_sql_file(input: &Path, options: &ConvertOptions) -> Result<ConvertSummary> {
    let input_str = input.to_string_lossy();
    let Some(stub) = input_str.strip_suffix(".sql") else {
        return Err(Error::BadParameter {
            details: format!("input file '{input_str}' must have a .sql extension").into(),
        });
    };

    let desc_path = PathBuf::from(format!("{stub}.desc.sql"));
    let desc = File::open(&desc_path).map_err(|_| Error::FileOpen { path: desc_path })?;
    let schema = Schema::parse_desc(BufReader::new(desc))?;

    let metadata = if options.metadata.is_empty() {
        let metadata_path = PathBuf::from(format!("{stub}.metadata"));
        if metadata_path.exists() {
            load_metadata_file(&metadata_path)?
        } else {
            BTreeMap::new()
        }
    } else {
        options.metadata.clone()
    };

    let _context = logger::push_context(input.display().to_string());

    let stub_path = PathBuf::from(stub);
    let base = stub_path
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| "output".to_owned());
    let out_dir = options
        .output_dir
        .clone()
        .or_else(|| stub_path.parent().map(Path::to_path_buf))
        .unwrap_or_else(|| PathBuf::from("."));
    let (temp_path, final_path) = output_paths(&out_dir, &base, options.compression);

    if !options.quiet {
        logger::log_info("processing");
    }

    let source = File::open(input).map_err(|_| Error::FileOpen {
        path: input.to_path_buf(),
    })?;
    let mut source = BufReader::new(source);

    let result = (|| -> Result<ConvertSummary> {
        let mut out = compress::create_writer(&temp_path, options.compression, &options.zargs)?;
        let writer_options = options.writer_options(metadata);
        let summary = write_seekable(&schema, &writer_options, &mut source, &mut out)?;
        out.finish()?;

        if options.validate {
            validate_against_file(&temp_path, input, options)?;
        }

        std::fs::rename(&temp_path, &final_path).map_err(|_| Error::FileCreate {
            path: final_path.clone(),
        })?;
        Ok(ConvertSummary {
            output_path: final_path.clone(),
            rows: summary.rows,
            blocks: summary.blocks,
        })
    })();

    match result {
        Ok(summary) => {
            if options.remove_sources {
                let _ = std::fs::remove_file(input);
                let _ = std::fs::remove_file(format!("{stub}.desc.sql"));
            }
            if !options.quiet {
                logger::log_info(&format!("Rows={}", summary.rows));
                logger::log_info("Done");
            }
            Ok(summary)
        }
        Err(err) => {
            let _ = std::fs::remove_file(&temp_path);
            Err(err)
        }
    }
}

/// Converts rows arriving on a non-seekable stream (standard input) into
/// `<basename>.zdw[...]` in the output directory.
///
/// # Errors
///
/// As [`convert_sql_file`], plus spill-file failures.
pub fn convert_stream<R: BufRead>(
    input: R,
    schema: &Schema,
    output_basename: &str,
    options: &ConvertOptions,
) -> Result<ConvertSummary> {
    let out_dir = options
        .output_dir
        .clone()
        .unwrap_or_else(|| PathBuf::from("."));
    let (temp_path, final_path) = output_paths(&out_dir, output_basename, options.compression);

    let result = (|| -> Result<ConvertSummary> {
        let mut out = compress::create_writer(&temp_path, options.compression, &options.zargs)?;
        let writer_options = options.writer_options(options.metadata.clone());
        let (summary, spills) =
            write_streaming(schema, &writer_options, input, &mut out, &out_dir)?;
        out.finish()?;

        if options.validate {
            validate_against_spills(&temp_path, &spills)?;
        }
        drop(spills);

        std::fs::rename(&temp_path, &final_path).map_err(|_| Error::FileCreate {
            path: final_path.clone(),
        })?;
        Ok(ConvertSummary {
            output_path: final_path.clone(),
            rows: summary.rows,
            blocks: summary.blocks,
        })
    })();

    result.map_err(|err| {
        let _ = std::fs::remove_file(&temp_path);
        err
    })
}

fn output_paths(out_dir: &Path, base: &str, compression: Compression) -> (PathBuf, PathBuf) {
    let ext = compression.extension();
    (
        out_dir.join(format!("{base}.creating.zdw{ext}")),
        out_dir.join(format!("{base}.zdw{ext}")),
    )
}

/// Decodes the freshly written file and byte-compares every row against
/// the source `.sql` file (trimmed the same way the writer trimmed).
fn validate_against_file(zdw_path: &Path, source: &Path, options: &ConvertOptions) -> Result<()> {
    let file = File::open(source).map_err(|_| Error::FileOpen {
        path: source.to_path_buf(),
    })?;
    let mut lines = LineReader::new(BufReader::new(file));
    let mut row = Vec::new();
    let trim = options.trim_trailing_spaces;
    validate_rows(zdw_path, move || {
        if !lines.next_row(&mut row)? {
            return Ok(None);
        }
        Ok(Some(canonical_row(&row, trim)))
    })
}

/// Decodes the freshly written file and byte-compares every row against
/// the spill files produced while streaming.
fn validate_against_spills(zdw_path: &Path, spills: &[SpillFile]) -> Result<()> {
    let mut remaining = spills.iter();
    let mut current: Option<LineReader<_>> = match remaining.next() {
        Some(spill) => Some(LineReader::new(spill.reader()?)),
        None => None,
    };
    let mut row = Vec::new();
    validate_rows(zdw_path, move || loop {
        let Some(lines) = current.as_mut() else {
            return Ok(None);
        };
        if lines.next_row(&mut row)? {
            // Spill rows were canonicalized when written.
            return Ok(Some(row.clone()));
        }
        current = match remaining.next() {
            Some(spill) => Some(LineReader::new(spill.reader()?)),
            None => None,
        };
    })
}

fn canonical_row(row: &[u8], trim: bool) -> Vec<u8> {
    let fields = split_fields(row, trim);
    let mut out = Vec::with_capacity(row.len());
    for (i, field) in fields.iter().enumerate() {
        if i > 0 {
            out.push(b'\t');
        }
        out.extend_from_slice(&row[field.clone()]);
    }
    out
}

fn validate_rows<F>(zdw_path: &Path, mut expected: F) -> Result<()>
where
    F: FnMut() -> Result<Option<Vec<u8>>>,
{
    let mut reader = ZdwReader::new(compress::open_reader(zdw_path)?);
    reader.read_header()?;

    let mut decoded = Vec::new();
    let mut row_number = 0u64;
    loop {
        decoded.clear();
        let more = {
            let mut sink = TsvSink::new(&mut decoded);
            reader.next_row_into(&mut sink)?
        };
        let expected_row = expected()?;
        row_number += 1;
        match (more, expected_row) {
            (true, Some(mut expect)) => {
                expect.push(b'\n');
                if decoded != expect {
                    return Err(Error::FilesDiffer {
                        details: format!("row {row_number} differs from the source").into(),
                    });
                }
            }
            (false, None) => return Ok(()),
            (true, None) => {
                return Err(Error::FilesDiffer {
                    details: "decoded output has more rows than the source".into(),
                });
            }
            (false, Some(_)) => {
                return Err(Error::FilesDiffer {
                    details: "source has more rows than the decoded output".into(),
                });
            }
        }
    }
}
