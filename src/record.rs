//! Document-to-row transform for the books collection.
//!
//! [`transform_book`] is total: every absent field is defaulted independently,
//! so a document missing everything still produces a row. A field that is
//! present but null stays `None` and is written as SQL `NULL`. Values the
//! destination cannot hold (a non-integer `__v`) are carried through and
//! rejected at write time, where they count as a per-record failure.

use crate::error::{Error, Result};
use mongodb::bson::{Bson, Document};
use serde::Serialize;

/// Text stored in `_id` when the source document has no identity, or a null one.
pub const MISSING_ID_PLACEHOLDER: &str = "None";

/// Source field names, in destination column order.
pub mod fields {
    /// Document identity
    pub const ID: &str = "_id";
    /// Version counter
    pub const VERSION: &str = "__v";
    /// Author list
    pub const AUTHORS: &str = "authors";
    /// Application-level book id
    pub const BOOK_ID: &str = "bookID";
    /// Title
    pub const BOOK_NAME: &str = "bookName";
    /// Category
    pub const CATEGORY: &str = "category";
    /// Edition
    pub const EDITION: &str = "edition";
    /// ISBN
    pub const ISBN: &str = "ISBN";
    /// Publication year
    pub const YEAR: &str = "year";
}

/// Value of the `__v` column.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(untagged)]
pub enum DocVersion {
    /// Integer version (the default `0` included)
    Number(i64),
    /// Source value with no integer reading, kept as text for diagnostics
    Malformed(String),
}

impl Default for DocVersion {
    fn default() -> Self {
        DocVersion::Number(0)
    }
}

/// One row of the destination `books` table.
///
/// `None` in any column but `_id` means the source field was explicitly null.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BookRow {
    /// `_id` (primary key)
    #[serde(rename = "_id")]
    pub id: String,
    /// `__v`
    #[serde(rename = "__v")]
    pub version: Option<DocVersion>,
    /// `authors`
    pub authors: Option<String>,
    /// `bookid`
    pub book_id: Option<String>,
    /// `bookname`
    pub book_name: Option<String>,
    /// `category`
    pub category: Option<String>,
    /// `edition`
    pub edition: Option<String>,
    /// `isbn`
    pub isbn: Option<String>,
    /// `year`
    pub year: Option<String>,
}

impl BookRow {
    /// Integer `__v` (`None` for NULL), or a [`Error::MalformedRecord`] naming this row.
    pub fn version_value(&self) -> Result<Option<i64>> {
        match &self.version {
            None => Ok(None),
            Some(DocVersion::Number(n)) => Ok(Some(*n)),
            Some(DocVersion::Malformed(raw)) => Err(Error::malformed_record(
                &self.id,
                format!("__v is not an integer: {}", raw),
            )),
        }
    }

    /// Text columns after `__v`, in destination column order.
    pub fn text_columns(&self) -> [Option<&str>; 7] {
        [
            self.authors.as_deref(),
            self.book_id.as_deref(),
            self.book_name.as_deref(),
            self.category.as_deref(),
            self.edition.as_deref(),
            self.isbn.as_deref(),
            self.year.as_deref(),
        ]
    }
}

/// Map one source document to one destination row.
pub fn transform_book(doc: &Document) -> BookRow {
    BookRow {
        id: document_id(doc),
        version: version(doc.get(fields::VERSION)),
        authors: text_field(doc, fields::AUTHORS),
        book_id: text_field(doc, fields::BOOK_ID),
        book_name: text_field(doc, fields::BOOK_NAME),
        category: text_field(doc, fields::CATEGORY),
        edition: text_field(doc, fields::EDITION),
        isbn: text_field(doc, fields::ISBN),
        year: text_field(doc, fields::YEAR),
    }
}

/// Identity of a document as it will appear in the `_id` column.
pub fn document_id(doc: &Document) -> String {
    match doc.get(fields::ID) {
        None | Some(Bson::Null) | Some(Bson::Undefined) => MISSING_ID_PLACEHOLDER.to_string(),
        Some(value) => bson_to_text(value),
    }
}

/// Absent is `""`, null is `None`.
fn text_field(doc: &Document, key: &str) -> Option<String> {
    match doc.get(key) {
        None => Some(String::new()),
        Some(Bson::Null) | Some(Bson::Undefined) => None,
        Some(value) => Some(bson_to_text(value)),
    }
}

/// Absent is `0`, null is `None`.
fn version(value: Option<&Bson>) -> Option<DocVersion> {
    match value {
        None => Some(DocVersion::default()),
        Some(Bson::Null) | Some(Bson::Undefined) => None,
        Some(value) => Some(read_version(value)),
    }
}

fn read_version(value: &Bson) -> DocVersion {
    let number = match value {
        Bson::Int32(n) => Some(i64::from(*n)),
        Bson::Int64(n) => Some(*n),
        Bson::Double(d) => integral_f64(*d),
        Bson::String(s) => s.trim().parse::<i64>().ok(),
        _ => None,
    };

    match number {
        Some(n) => DocVersion::Number(n),
        None => DocVersion::Malformed(bson_to_text(value)),
    }
}

fn integral_f64(d: f64) -> Option<i64> {
    // 2^63 is exactly representable; i64::MAX is not.
    const BOUND: f64 = 9_223_372_036_854_775_808.0;
    if d.is_finite() && d.fract() == 0.0 && d >= -BOUND && d < BOUND {
        Some(d as i64)
    } else {
        None
    }
}

/// Doubles keep a fractional digit when integral, so `2.0` is stored as `"2.0"`.
fn double_text(d: f64) -> String {
    if d.is_finite() && d.fract() == 0.0 && d.abs() < 1e16 {
        format!("{:.1}", d)
    } else {
        d.to_string()
    }
}

/// Text form of a BSON value as stored in a TEXT column.
fn bson_to_text(value: &Bson) -> String {
    match value {
        Bson::String(s) => s.clone(),
        Bson::ObjectId(oid) => oid.to_hex(),
        Bson::Int32(n) => n.to_string(),
        Bson::Int64(n) => n.to_string(),
        Bson::Double(d) => double_text(*d),
        Bson::Boolean(b) => b.to_string(),
        Bson::Symbol(s) => s.clone(),
        Bson::DateTime(dt) => dt
            .try_to_rfc3339_string()
            .unwrap_or_else(|_| dt.timestamp_millis().to_string()),
        other => other.clone().into_relaxed_extjson().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mongodb::bson::{doc, oid::ObjectId};
    use proptest::prelude::*;

    #[test]
    fn test_missing_fields_get_defaults() {
        let row = transform_book(&doc! { "_id": "only-id" });

        assert_eq!(row.id, "only-id");
        assert_eq!(row.version, Some(DocVersion::Number(0)));
        for column in row.text_columns() {
            assert_eq!(column, Some(""));
        }
    }

    #[test]
    fn test_empty_document_uses_id_placeholder() {
        let row = transform_book(&Document::new());
        assert_eq!(row.id, MISSING_ID_PLACEHOLDER);
        assert_eq!(row.version_value().unwrap(), Some(0));
    }

    #[test]
    fn test_full_document() {
        let row = transform_book(&doc! {
            "_id": "abc123",
            "authors": "A. Author",
            "bookID": "B1",
            "bookName": "Test Book",
            "category": "Fiction",
            "edition": "1st",
            "ISBN": "111-2",
            "year": "2020",
        });

        assert_eq!(
            row,
            BookRow {
                id: "abc123".into(),
                version: Some(DocVersion::Number(0)),
                authors: Some("A. Author".into()),
                book_id: Some("B1".into()),
                book_name: Some("Test Book".into()),
                category: Some("Fiction".into()),
                edition: Some("1st".into()),
                isbn: Some("111-2".into()),
                year: Some("2020".into()),
            }
        );
    }

    #[test]
    fn test_object_id_is_hex() {
        let oid = ObjectId::parse_str("65a1f0c2e4b0a1b2c3d4e5f6").unwrap();
        let row = transform_book(&doc! { "_id": oid, "__v": 3 });

        assert_eq!(row.id, "65a1f0c2e4b0a1b2c3d4e5f6");
        assert_eq!(row.version, Some(DocVersion::Number(3)));
    }

    #[test]
    fn test_null_fields_stay_null() {
        let row = transform_book(&doc! {
            "_id": Bson::Null,
            "__v": Bson::Null,
            "authors": Bson::Null,
            "year": Bson::Undefined,
        });

        assert_eq!(row.id, MISSING_ID_PLACEHOLDER);
        assert_eq!(row.version, None);
        assert_eq!(row.version_value().unwrap(), None);
        assert_eq!(row.authors, None);
        assert_eq!(row.year, None);
        // absent, not null
        assert_eq!(row.book_name.as_deref(), Some(""));
    }

    #[test]
    fn test_version_readings() {
        assert_eq!(read_version(&Bson::Int64(7)), DocVersion::Number(7));
        assert_eq!(read_version(&Bson::Double(2.0)), DocVersion::Number(2));
        assert_eq!(
            read_version(&Bson::String(" 12 ".into())),
            DocVersion::Number(12)
        );
        assert_eq!(
            read_version(&Bson::Double(1.5)),
            DocVersion::Malformed("1.5".into())
        );
        assert_eq!(
            read_version(&Bson::Boolean(true)),
            DocVersion::Malformed("true".into())
        );
        assert!(matches!(
            read_version(&Bson::Double(f64::NAN)),
            DocVersion::Malformed(_)
        ));
    }

    #[test]
    fn test_malformed_version_is_write_error() {
        let row = transform_book(&doc! { "_id": "x", "__v": "draft" });

        let err = row.version_value().unwrap_err();
        assert_eq!(err.code(), "MALFORMED_RECORD");
        assert!(err.to_string().contains("'x'"));
        assert!(err.to_string().contains("draft"));
    }

    #[test]
    fn test_non_string_scalars_become_text() {
        let row = transform_book(&doc! {
            "_id": 42_i64,
            "year": 2020,
            "edition": 2.5,
            "category": false,
        });

        assert_eq!(row.id, "42");
        assert_eq!(row.year.as_deref(), Some("2020"));
        assert_eq!(row.edition.as_deref(), Some("2.5"));
        assert_eq!(row.category.as_deref(), Some("false"));
    }

    #[test]
    fn test_integral_doubles_keep_fraction() {
        let row = transform_book(&doc! { "_id": 1.0, "edition": 2.0, "year": -3.0 });

        assert_eq!(row.id, "1.0");
        assert_eq!(row.edition.as_deref(), Some("2.0"));
        assert_eq!(row.year.as_deref(), Some("-3.0"));
    }

    #[test]
    fn test_nested_values_become_json_text() {
        let row = transform_book(&doc! {
            "_id": "n1",
            "authors": ["A", "B"],
            "edition": { "number": 2 },
        });

        assert_eq!(row.authors.as_deref(), Some(r#"["A","B"]"#));
        assert_eq!(row.edition.as_deref(), Some(r#"{"number":2}"#));
    }

    #[test]
    fn test_document_id_matches_row() {
        let doc = doc! { "_id": "abc", "bookName": "x" };
        assert_eq!(document_id(&doc), transform_book(&doc).id);
    }

    #[test]
    fn test_source_is_untouched() {
        let doc = doc! { "_id": "abc", "__v": 1, "extra": "kept" };
        let before = doc.clone();
        let _ = transform_book(&doc);
        assert_eq!(doc, before);
    }

    proptest! {
        #[test]
        fn prop_string_identity_preserved(id in ".*") {
            let row = transform_book(&doc! { "_id": id.clone() });
            prop_assert_eq!(row.id, id);
        }

        #[test]
        fn prop_integer_identity_preserved(id in any::<i64>()) {
            let row = transform_book(&doc! { "_id": id });
            prop_assert_eq!(row.id, id.to_string());
        }

        #[test]
        fn prop_integer_version_preserved(v in any::<i32>()) {
            let row = transform_book(&doc! { "_id": "p", "__v": v });
            prop_assert_eq!(row.version_value().unwrap(), Some(i64::from(v)));
        }

        #[test]
        fn prop_text_fields_round_through(name in ".*", isbn in "[0-9-]{0,17}") {
            let row = transform_book(&doc! { "_id": "p", "bookName": name.clone(), "ISBN": isbn.clone() });
            prop_assert_eq!(row.book_name, Some(name));
            prop_assert_eq!(row.isbn, Some(isbn));
        }
    }
}
