//! Wire-format scenarios: exact byte images, hand-built multi-block files,
//! and format-error handling.

use std::io::Cursor;

use zdw::error::Error;
use zdw::reader::{ColumnSelection, InclusionRule, ReadOptions, ZdwReader};
use zdw::schema::Schema;
use zdw::sinks::{OrderedTsvSink, TsvSink};
use zdw::writer::{write_seekable, WriterOptions};

fn schema(desc: &str) -> Schema {
    Schema::parse_desc(Cursor::new(desc.as_bytes())).unwrap()
}

fn encode(desc: &str, rows: &[u8]) -> Vec<u8> {
    let schema = schema(desc);
    let mut input = Cursor::new(rows.to_vec());
    let mut out = Vec::new();
    let options = WriterOptions::new().with_quiet(true);
    write_seekable(&schema, &options, &mut input, &mut out).unwrap();
    out
}

fn decode_tsv(bytes: &[u8], options: ReadOptions) -> Vec<u8> {
    let mut reader = ZdwReader::with_options(Cursor::new(bytes.to_vec()), options);
    reader.read_header().unwrap();
    let mut out = Vec::new();
    match reader.output_order() {
        Some(order) => {
            let mut sink = OrderedTsvSink::new(&mut out, &order).unwrap();
            while reader.next_row_into(&mut sink).unwrap() {}
        }
        None => {
            let mut sink = TsvSink::new(&mut out);
            while reader.next_row_into(&mut sink).unwrap() {}
        }
    }
    out
}

/// Header bytes for a v10 file with one varchar column named `a`.
fn one_column_header() -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&10u16.to_le_bytes());
    bytes.extend_from_slice(b"a\0\0");
    bytes.push(0); // VARCHAR tag
    bytes.extend_from_slice(&0u16.to_le_bytes());
    bytes
}

fn block(rows: &[&[u8]], dict: &[u8], is_final: bool) -> Vec<u8> {
    let mut bytes = Vec::new();
    bytes.extend_from_slice(&(rows.len() as u32).to_le_bytes());
    bytes.extend_from_slice(&64u32.to_le_bytes());
    bytes.push(u8::from(is_final));
    bytes.extend_from_slice(dict);
    bytes.push(1); // byte width of the lone column
    bytes.extend_from_slice(&0u64.to_le_bytes()); // baseline
    for row in rows {
        bytes.extend_from_slice(row);
    }
    bytes
}

#[test]
fn dictionary_and_row_bytes_match_the_specified_image() {
    let out = encode("first\tvarchar(10)\nsecond\tvarchar(10)\n", b"a\tb\na\tc\n");

    // Header: version, names, tags, declared widths.
    let mut expected = Vec::new();
    expected.extend_from_slice(&10u16.to_le_bytes());
    expected.extend_from_slice(b"first\0second\0\0");
    expected.extend_from_slice(&[0, 0]);
    expected.extend_from_slice(&10u16.to_le_bytes());
    expected.extend_from_slice(&10u16.to_le_bytes());
    // Block header.
    expected.extend_from_slice(&2u32.to_le_bytes());
    expected.extend_from_slice(&16384u32.to_le_bytes());
    expected.push(1);
    // Dictionary: offsets 1, 3, 5 for a, b, c.
    expected.extend_from_slice(b"\x01\x07\0a\0b\0c\0");
    // Widths and baselines.
    expected.extend_from_slice(&[1, 1]);
    expected.extend_from_slice(&0u64.to_le_bytes());
    expected.extend_from_slice(&0u64.to_le_bytes());
    // Row 1: both bits set, offsets 1 and 3. Row 2: only column two.
    expected.extend_from_slice(&[0b11, 0x01, 0x03]);
    expected.extend_from_slice(&[0b10, 0x05]);
    assert_eq!(out, expected);
}

#[test]
fn integer_delta_block_matches_the_specified_image() {
    let out = encode("n\tint unsigned\n", b"100\n101\n100\n");
    // Find the block payload after the fixed-size header.
    let header_len = 2 + "n\0\0".len() + 1 + 2;
    let block = &out[header_len..];
    let mut expected = Vec::new();
    expected.extend_from_slice(&3u32.to_le_bytes());
    expected.extend_from_slice(&16384u32.to_le_bytes());
    expected.push(1);
    expected.push(0); // empty dictionary
    expected.push(1); // width
    expected.extend_from_slice(&99u64.to_le_bytes()); // baseline = min - 1
    expected.extend_from_slice(&[0b1, 0x01]);
    expected.extend_from_slice(&[0b1, 0x02]);
    expected.extend_from_slice(&[0b1, 0x01]);
    assert_eq!(block, expected);
}

#[test]
fn multi_block_files_decode_to_concatenated_rows() {
    let mut bytes = one_column_header();
    bytes.extend_from_slice(&block(&[&[0b1, 0x01]], b"\x01\x03\0x\0", false));
    bytes.extend_from_slice(&block(&[&[0b1, 0x01], &[0b0]], b"\x01\x03\0y\0", true));
    assert_eq!(decode_tsv(&bytes, ReadOptions::new()), b"x\ny\ny\n");
}

#[test]
fn bytes_after_the_final_block_are_an_error() {
    let mut bytes = one_column_header();
    bytes.extend_from_slice(&block(&[&[0b1, 0x01]], b"\x01\x03\0x\0", true));
    bytes.push(0x77);

    let mut reader = ZdwReader::new(Cursor::new(bytes));
    reader.read_header().unwrap();
    let mut sink = TsvSink::new(Vec::new());
    assert!(reader.next_row_into(&mut sink).unwrap());
    assert!(matches!(
        reader.next_row_into(&mut sink),
        Err(Error::TruncatedOrLonger)
    ));
}

#[test]
fn truncated_block_reports_row_count_mismatch() {
    let mut bytes = one_column_header();
    // Block promises two rows but carries only one.
    let mut body = Vec::new();
    body.extend_from_slice(&2u32.to_le_bytes());
    body.extend_from_slice(&64u32.to_le_bytes());
    body.push(1);
    body.extend_from_slice(b"\x01\x03\0x\0");
    body.push(1);
    body.extend_from_slice(&0u64.to_le_bytes());
    body.extend_from_slice(&[0b1, 0x01]);
    bytes.extend_from_slice(&body);

    let mut reader = ZdwReader::new(Cursor::new(bytes));
    reader.read_header().unwrap();
    let mut sink = TsvSink::new(Vec::new());
    assert!(reader.next_row_into(&mut sink).unwrap());
    assert!(matches!(
        reader.next_row_into(&mut sink),
        Err(Error::RowCountMismatch {
            expected: 2,
            actual: 1
        })
    ));
}

#[test]
fn out_of_range_dictionary_offset_is_corrupted_data() {
    let mut bytes = one_column_header();
    let mut body = Vec::new();
    body.extend_from_slice(&1u32.to_le_bytes());
    body.extend_from_slice(&64u32.to_le_bytes());
    body.push(1);
    body.extend_from_slice(b"\x01\x03\0x\0");
    body.push(1);
    body.extend_from_slice(&0u64.to_le_bytes());
    body.extend_from_slice(&[0b1, 0x55]); // offset 0x55 > blob size 3
    bytes.extend_from_slice(&body);

    let mut reader = ZdwReader::new(Cursor::new(bytes));
    reader.read_header().unwrap();
    let mut sink = TsvSink::new(Vec::new());
    assert!(matches!(
        reader.next_row_into(&mut sink),
        Err(Error::CorruptedData { .. })
    ));
}

#[test]
fn fill_missing_projection_emits_empty_column_and_text_desc() {
    let encoded = encode("a\tvarchar(4)\nb\tvarchar(4)\n", b"1\t2\n");
    let selection = ColumnSelection::new(["a", "c", "b"], InclusionRule::FillMissing);
    let options = ReadOptions::new().with_selection(selection.clone());
    assert_eq!(decode_tsv(&encoded, options), b"1\t\t2\n");

    let mut reader = ZdwReader::with_options(
        Cursor::new(encoded),
        ReadOptions::new().with_selection(selection),
    );
    reader.read_header().unwrap();
    let mut desc = Vec::new();
    zdw::schema::write_desc(&reader.output_columns().unwrap(), &mut desc).unwrap();
    assert_eq!(desc, b"a\tvarchar(4)\nc\ttext\nb\tvarchar(4)\n");
}

#[test]
fn version_11_metadata_block_round_trips() {
    let mut metadata = std::collections::BTreeMap::new();
    metadata.insert("job".to_owned(), "nightly".to_owned());
    metadata.insert("source".to_owned(), "unit test".to_owned());

    let schema = schema("a\tvarchar(4)\n");
    let options = WriterOptions::new()
        .with_quiet(true)
        .with_version11(true)
        .with_metadata(metadata);
    let mut out = Vec::new();
    write_seekable(
        &schema,
        &options,
        &mut Cursor::new(b"x\n".to_vec()),
        &mut out,
    )
    .unwrap();

    let mut reader = ZdwReader::new(Cursor::new(out));
    reader.read_header().unwrap();
    assert_eq!(reader.version(), 11);
    assert_eq!(
        reader.metadata(),
        &[
            ("job".to_owned(), "nightly".to_owned()),
            ("source".to_owned(), "unit test".to_owned()),
        ]
    );
}

#[test]
fn version_9_files_decode_like_version_10() {
    let mut bytes = encode("a\tvarchar(4)\n", b"x\ny\n");
    bytes[0] = 9;
    assert_eq!(decode_tsv(&bytes, ReadOptions::new()), b"x\ny\n");
}

#[test]
fn delta_flag_population_matches_value_changes() {
    // Three rows over two used columns; count the bits the writer set.
    let encoded = encode("a\tvarchar(4)\nn\tint unsigned\n", b"x\t1\nx\t2\ny\t2\n");
    let reader = ZdwReader::new(Cursor::new(encoded));
    let stats = reader.read_statistics().unwrap();
    // Row 1 changes both columns, rows 2 and 3 change one each.
    assert_eq!(stats.blocks[0].delta_bits_set, 4);
    assert_eq!(stats.blocks[0].used_columns, 2);
    assert_eq!(stats.rows, 3);
}

#[test]
fn integrity_test_decodes_without_output() {
    let encoded = encode("a\tvarchar(4)\nn\tint\n", b"x\t-1\ny\t5\n");
    let mut reader = ZdwReader::new(Cursor::new(encoded));
    reader.read_header().unwrap();
    assert_eq!(reader.test_integrity().unwrap(), 2);
}

#[test]
fn memory_sink_exposes_fields_of_each_row() {
    use zdw::sinks::MemoryRowSink;

    let encoded = encode("a\tvarchar(8)\nn\tint unsigned\n", b"left\t7\nright\t8\n");
    let mut reader = ZdwReader::new(Cursor::new(encoded));
    reader.read_header().unwrap();

    let mut sink = MemoryRowSink::new(reader.output_columns().unwrap().len());
    assert!(reader.next_row_into(&mut sink).unwrap());
    assert_eq!(sink.fields(), vec![&b"left"[..], &b"7"[..]]);

    sink.reset();
    assert!(reader.next_row_into(&mut sink).unwrap());
    assert_eq!(sink.fields(), vec![&b"right"[..], &b"8"[..]]);

    sink.reset();
    assert!(!reader.next_row_into(&mut sink).unwrap());
}

#[test]
fn header_accessors_enforce_lifecycle() {
    let encoded = encode("a\tvarchar(4)\n", b"x\n");
    let reader = ZdwReader::new(Cursor::new(encoded));
    assert!(matches!(
        reader.columns(),
        Err(Error::HeaderNotReadYet)
    ));
}
