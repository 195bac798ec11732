use std::borrow::Cow;

use time::OffsetDateTime;

/// A single decoded cell produced by the typed row API.
///
/// Text payloads borrow from the current block's dictionary and become owned
/// through [`Value::into_owned`] when they must outlive it.
#[derive(Debug, Clone, PartialEq)]
pub enum Value<'a> {
    /// Text-family column with no stored value.
    Null,
    /// Text converted into UTF-8 from the source (or requested) encoding.
    Str(Cow<'a, str>),
    /// Raw bytes when conversion into UTF-8 is not possible.
    Bytes(Cow<'a, [u8]>),
    /// Unsigned integer column.
    UInt(u64),
    /// Signed integer column.
    Int(i64),
    /// DECIMAL column parsed as a double.
    Decimal(f64),
    /// DATETIME column parsed as a UTC timestamp.
    DateTime(OffsetDateTime),
}

impl Value<'_> {
    #[must_use]
    pub fn into_owned(self) -> Value<'static> {
        match self {
            Value::Null => Value::Null,
            Value::Str(s) => Value::Str(Cow::Owned(s.into_owned())),
            Value::Bytes(b) => Value::Bytes(Cow::Owned(b.into_owned())),
            Value::UInt(v) => Value::UInt(v),
            Value::Int(v) => Value::Int(v),
            Value::Decimal(v) => Value::Decimal(v),
            Value::DateTime(dt) => Value::DateTime(dt),
        }
    }

    /// Text view for assertions and display; numeric values format without
    /// leading zeros, negatives as `-N`.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Str(s) => s.to_string(),
            Value::Bytes(b) => String::from_utf8_lossy(b).into_owned(),
            Value::UInt(v) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*v).to_owned()
            }
            Value::Int(v) => {
                let mut buf = itoa::Buffer::new();
                buf.format(*v).to_owned()
            }
            Value::Decimal(v) => {
                let mut buf = ryu::Buffer::new();
                buf.format(*v).to_owned()
            }
            Value::DateTime(dt) => dt.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn into_owned_detaches_borrowed_text() {
        let text = String::from("hello");
        let value = Value::Str(Cow::Borrowed(text.as_str()));
        let owned: Value<'static> = value.into_owned();
        assert_eq!(owned, Value::Str(Cow::Owned(String::from("hello"))));
    }

    #[test]
    fn text_rendering() {
        assert_eq!(Value::UInt(42).to_text(), "42");
        assert_eq!(Value::Int(-7).to_text(), "-7");
        assert_eq!(Value::Null.to_text(), "");
    }
}
