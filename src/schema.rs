//! Column schema: wire-stable type tags, description-file parsing, and
//! schema text emission.

use std::io::BufRead;

use crate::error::{Error, Result};

/// Column type tags as persisted in the file header. The numeric values are
/// wire-stable and must not change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum ColumnType {
    Varchar = 0,
    Text = 1,
    Datetime = 2,
    Char2 = 3,
    /// Legacy visitor-ID halves (pre-v8 files); never written today.
    VisidLow = 4,
    VisidHigh = 5,
    Char = 6,
    Tiny = 7,
    Short = 8,
    Long = 9,
    LongLong = 10,
    Decimal = 11,
    TinySigned = 12,
    ShortSigned = 13,
    LongSigned = 14,
    LongLongSigned = 15,
    TinyText = 16,
    MediumText = 17,
    LongText = 18,
    /// Synthesized at decode time; never persisted.
    VirtualBasename = 64,
    /// Synthesized at decode time; never persisted.
    VirtualRow = 65,
}

impl ColumnType {
    /// Parses a persisted tag byte. Virtual tags are not valid on the wire.
    #[must_use]
    pub const fn from_wire_tag(tag: u8) -> Option<Self> {
        Some(match tag {
            0 => Self::Varchar,
            1 => Self::Text,
            2 => Self::Datetime,
            3 => Self::Char2,
            4 => Self::VisidLow,
            5 => Self::VisidHigh,
            6 => Self::Char,
            7 => Self::Tiny,
            8 => Self::Short,
            9 => Self::Long,
            10 => Self::LongLong,
            11 => Self::Decimal,
            12 => Self::TinySigned,
            13 => Self::ShortSigned,
            14 => Self::LongSigned,
            15 => Self::LongLongSigned,
            16 => Self::TinyText,
            17 => Self::MediumText,
            18 => Self::LongText,
            _ => return None,
        })
    }

    #[must_use]
    pub const fn wire_tag(self) -> u8 {
        self as u8
    }

    /// Whether stored values for this type are dictionary offsets.
    #[must_use]
    pub const fn uses_dictionary(self) -> bool {
        matches!(
            self,
            Self::Varchar
                | Self::Text
                | Self::TinyText
                | Self::MediumText
                | Self::LongText
                | Self::Datetime
                | Self::Char2
                | Self::Decimal
        )
    }

    /// Whether stored values are baseline-biased numbers (integers and CHAR).
    #[must_use]
    pub const fn uses_baseline(self) -> bool {
        matches!(
            self,
            Self::Char
                | Self::Tiny
                | Self::TinySigned
                | Self::Short
                | Self::ShortSigned
                | Self::Long
                | Self::LongSigned
                | Self::LongLong
                | Self::LongLongSigned
                | Self::VisidLow
                | Self::VisidHigh
        )
    }

    #[must_use]
    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            Self::TinySigned | Self::ShortSigned | Self::LongSigned | Self::LongLongSigned
        )
    }

    #[must_use]
    pub const fn is_integer(self) -> bool {
        matches!(
            self,
            Self::Tiny
                | Self::TinySigned
                | Self::Short
                | Self::ShortSigned
                | Self::Long
                | Self::LongSigned
                | Self::LongLong
                | Self::LongLongSigned
                | Self::VisidLow
                | Self::VisidHigh
                | Self::VirtualRow
        )
    }

    /// Default field text emitted when a column has no stored value.
    #[must_use]
    pub const fn default_text(self) -> &'static [u8] {
        match self {
            Self::Decimal => b"0.000000000000",
            _ if self.is_integer() => b"0",
            _ => b"",
        }
    }
}

/// One column of the schema: name, type tag, and the declared character
/// width (v7+; zero when not applicable).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Column {
    pub name: String,
    pub ty: ColumnType,
    pub char_width: u16,
}

impl Column {
    #[must_use]
    pub fn new(name: impl Into<String>, ty: ColumnType) -> Self {
        Self {
            name: name.into(),
            ty,
            char_width: 0,
        }
    }

    #[must_use]
    pub fn with_char_width(mut self, width: u16) -> Self {
        self.char_width = width;
        self
    }

    /// SQL type text used in description side-cars, e.g. `varchar(255)`.
    /// Returns `None` for types with no description rendering.
    #[must_use]
    pub fn sql_type_text(&self) -> Option<String> {
        Some(match self.ty {
            ColumnType::Varchar | ColumnType::VirtualBasename => {
                let width = if self.char_width == 0 {
                    255
                } else {
                    self.char_width
                };
                format!("varchar({width})")
            }
            ColumnType::Text => "text".to_owned(),
            ColumnType::TinyText => "tinytext".to_owned(),
            ColumnType::MediumText => "mediumtext".to_owned(),
            ColumnType::LongText => "longtext".to_owned(),
            ColumnType::Datetime => "datetime".to_owned(),
            ColumnType::Char2 => "char(2)".to_owned(),
            ColumnType::Char => "char(1)".to_owned(),
            ColumnType::VisidLow | ColumnType::VisidHigh => "bigint(20) unsigned".to_owned(),
            ColumnType::Tiny => "tinyint(3) unsigned".to_owned(),
            ColumnType::Short => "smallint(5) unsigned".to_owned(),
            ColumnType::Long | ColumnType::VirtualRow => "int(11) unsigned".to_owned(),
            ColumnType::LongLong => "bigint(20) unsigned".to_owned(),
            ColumnType::TinySigned => "tinyint(3)".to_owned(),
            ColumnType::ShortSigned => "smallint(5)".to_owned(),
            ColumnType::LongSigned => "int(11)".to_owned(),
            ColumnType::LongLongSigned => "bigint(20)".to_owned(),
            ColumnType::Decimal => "decimal(24,12)".to_owned(),
        })
    }
}

/// The typed column list of one file.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    columns: Vec<Column>,
}

impl Schema {
    #[must_use]
    pub fn new(columns: Vec<Column>) -> Self {
        Self { columns }
    }

    #[must_use]
    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.columns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    /// Case-insensitive lookup by column name; first match wins.
    #[must_use]
    pub fn lookup(&self, name: &str) -> Option<usize> {
        self.columns
            .iter()
            .position(|c| c.name.eq_ignore_ascii_case(name))
    }

    /// Parses a description side-car: one `name<TAB>sql_type` line per
    /// column. A leading header line starting with `Field` is skipped; a
    /// line without a tab is fatal.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DescFileMissingTypeInfo`] when a line carries no
    /// type, or an I/O error from the underlying reader.
    pub fn parse_desc<R: BufRead>(reader: R) -> Result<Self> {
        let mut columns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            let line = line.trim_end_matches(['\r', '\n']);
            if line.is_empty() {
                continue;
            }
            if line.as_bytes().len() >= 5 && line.as_bytes()[..5].eq_ignore_ascii_case(b"Field") {
                continue;
            }
            let Some(tab) = line.find('\t') else {
                return Err(Error::DescFileMissingTypeInfo);
            };
            let name = &line[..tab];
            let type_text = line[tab + 1..].trim_start();
            columns.push(parse_column(name, type_text));
        }
        Ok(Self { columns })
    }
}

/// Writes a description side-car for `columns`: one `name<TAB>sql_type`
/// line per column, in the given order.
///
/// # Errors
///
/// Returns [`Error::UnexpectedDescType`] for a column whose type has no
/// description rendering, or the underlying I/O error.
pub fn write_desc<W: std::io::Write>(columns: &[Column], out: &mut W) -> Result<()> {
    for column in columns {
        let sql_type = column
            .sql_type_text()
            .ok_or_else(|| Error::UnexpectedDescType {
                details: format!("column '{}' has tag {}", column.name, column.ty.wire_tag())
                    .into(),
            })?;
        out.write_all(column.name.as_bytes())?;
        out.write_all(b"\t")?;
        out.write_all(sql_type.as_bytes())?;
        out.write_all(b"\n")?;
    }
    Ok(())
}

fn parse_column(name: &str, type_text: &str) -> Column {
    let column = Column::new(name, ColumnType::Text);
    if let Some(rest) = type_text.strip_prefix("varchar") {
        return Column {
            ty: ColumnType::Varchar,
            char_width: parenthesized_width(rest),
            ..column
        };
    }
    if let Some(rest) = type_text.strip_prefix("char") {
        let width = parenthesized_width(rest);
        let ty = match width {
            1 => ColumnType::Char,
            2 => ColumnType::Char2,
            // Wider fixed-size char fields are stored as varchar.
            _ => ColumnType::Varchar,
        };
        return Column {
            ty,
            char_width: width,
            ..column
        };
    }
    if type_text.starts_with("tinytext") {
        return Column {
            ty: ColumnType::TinyText,
            ..column
        };
    }
    if type_text.starts_with("mediumtext") {
        return Column {
            ty: ColumnType::MediumText,
            ..column
        };
    }
    if type_text.starts_with("longtext") {
        return Column {
            ty: ColumnType::LongText,
            ..column
        };
    }
    if type_text.starts_with("text") {
        return Column {
            ty: ColumnType::Text,
            ..column
        };
    }
    if type_text.starts_with("datetime") {
        return Column {
            ty: ColumnType::Datetime,
            ..column
        };
    }
    if type_text.starts_with("decimal") {
        return Column {
            ty: ColumnType::Decimal,
            ..column
        };
    }

    // Numeric types; signed unless the token "unsigned" appears.
    let signed = !type_text.contains("unsigned");
    let ty = if type_text.starts_with("tinyint") {
        if signed {
            ColumnType::TinySigned
        } else {
            ColumnType::Tiny
        }
    } else if type_text.starts_with("smallint") {
        if signed {
            ColumnType::ShortSigned
        } else {
            ColumnType::Short
        }
    } else if type_text.starts_with("bigint") {
        if signed {
            ColumnType::LongLongSigned
        } else {
            ColumnType::LongLong
        }
    } else if signed {
        ColumnType::LongSigned
    } else {
        ColumnType::Long
    };
    Column { ty, ..column }
}

fn parenthesized_width(rest: &str) -> u16 {
    rest.strip_prefix('(')
        .map(|inner| {
            inner
                .bytes()
                .take_while(u8::is_ascii_digit)
                .fold(0u16, |acc, d| {
                    acc.saturating_mul(10).saturating_add(u16::from(d - b'0'))
                })
        })
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn parse(desc: &str) -> Schema {
        Schema::parse_desc(Cursor::new(desc.as_bytes())).unwrap()
    }

    #[test]
    fn wire_tags_round_trip() {
        for tag in 0u8..=18 {
            let ty = ColumnType::from_wire_tag(tag).unwrap();
            assert_eq!(ty.wire_tag(), tag);
        }
        assert!(ColumnType::from_wire_tag(19).is_none());
        assert!(ColumnType::from_wire_tag(64).is_none());
    }

    #[test]
    fn desc_parses_text_and_numeric_types() {
        let schema = parse(
            "Field\tType\n\
             name\tvarchar(40)\n\
             flag\tchar(1)\n\
             pair\tchar(2)\n\
             code\tchar(8)\n\
             note\ttext\n\
             small\ttinytext\n\
             stamp\tdatetime\n\
             price\tdecimal(24,12)\n\
             count\tint(11) unsigned\n\
             delta\tint(11)\n\
             tiny\ttinyint(3) unsigned\n\
             big\tbigint(20)\n",
        );
        let types: Vec<ColumnType> = schema.columns().iter().map(|c| c.ty).collect();
        assert_eq!(
            types,
            vec![
                ColumnType::Varchar,
                ColumnType::Char,
                ColumnType::Char2,
                ColumnType::Varchar,
                ColumnType::Text,
                ColumnType::TinyText,
                ColumnType::Datetime,
                ColumnType::Decimal,
                ColumnType::Long,
                ColumnType::LongSigned,
                ColumnType::Tiny,
                ColumnType::LongLongSigned,
            ]
        );
        assert_eq!(schema.columns()[0].char_width, 40);
        assert_eq!(schema.columns()[3].char_width, 8);
    }

    #[test]
    fn desc_without_tab_is_fatal() {
        let err = Schema::parse_desc(Cursor::new(b"name text\n".as_slice())).unwrap_err();
        assert!(matches!(err, Error::DescFileMissingTypeInfo));
    }

    #[test]
    fn lookup_is_case_insensitive() {
        let schema = parse("UserName\tvarchar(10)\ncount\tint(11)\n");
        assert_eq!(schema.lookup("username"), Some(0));
        assert_eq!(schema.lookup("USERNAME"), Some(0));
        assert_eq!(schema.lookup("Count"), Some(1));
        assert_eq!(schema.lookup("missing"), None);
    }

    #[test]
    fn sql_type_text_round_trips_desc_lines() {
        let schema = parse("a\tvarchar(12)\nb\tchar(1)\nc\tdecimal(24,12)\nd\tsmallint(5)\n");
        let rendered: Vec<String> = schema
            .columns()
            .iter()
            .map(|c| c.sql_type_text().unwrap())
            .collect();
        assert_eq!(
            rendered,
            vec!["varchar(12)", "char(1)", "decimal(24,12)", "smallint(5)"]
        );
    }

    #[test]
    fn write_desc_round_trips_a_parsed_schema() {
        let text = "a\tvarchar(12)\nb\tchar(1)\nc\ttext\nd\tint(11) unsigned\n";
        let schema = parse(text);
        let mut out = Vec::new();
        write_desc(schema.columns(), &mut out).unwrap();
        assert_eq!(out, text.as_bytes());
    }

    #[test]
    fn defaults_follow_type_family() {
        assert_eq!(ColumnType::Text.default_text(), b"");
        assert_eq!(ColumnType::Long.default_text(), b"0");
        assert_eq!(ColumnType::Decimal.default_text(), b"0.000000000000");
        assert_eq!(ColumnType::Datetime.default_text(), b"");
    }
}
