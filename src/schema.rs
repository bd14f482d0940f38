//! Destination table definition, DDL rendering and schema verification.
//!
//! The tool never creates or alters the destination table. The definition here
//! is used to build the insert statement, to print the DDL an operator must run
//! beforehand, and to check an existing table before migrating.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Table definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Table {
    /// Table name, optionally schema-qualified
    pub name: String,
    /// Columns
    pub columns: Vec<Column>,
    /// Primary key column
    pub primary_key: String,
}

impl Table {
    /// The `books` table layout under the given name.
    pub fn books(name: impl Into<String>) -> Self {
        let text = |n: &str| Column::new(n, ColumnType::Text);
        Self {
            name: name.into(),
            columns: vec![
                text("_id").nullable(false),
                Column::new("__v", ColumnType::Integer),
                text("authors"),
                text("bookid"),
                text("bookname"),
                text("category"),
                text("edition"),
                text("isbn"),
                text("year"),
            ],
            primary_key: "_id".into(),
        }
    }

    /// Column names in order.
    pub fn column_names(&self) -> Vec<&str> {
        self.columns.iter().map(|c| c.name.as_str()).collect()
    }

    /// Parameterized insert that leaves an existing row with the same key untouched.
    pub fn insert_statement(&self) -> String {
        let placeholders: Vec<String> = (1..=self.columns.len())
            .map(|i| format!("${}", i))
            .collect();
        format!(
            "INSERT INTO {} ({}) VALUES ({}) ON CONFLICT ({}) DO NOTHING",
            self.name,
            self.column_names().join(", "),
            placeholders.join(", "),
            self.primary_key
        )
    }

    /// Generate CREATE TABLE DDL for PostgreSQL.
    pub fn to_postgres_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE {} (\n", self.name);

        let col_defs: Vec<String> = self
            .columns
            .iter()
            .map(|c| {
                let constraint = if c.name == self.primary_key {
                    " PRIMARY KEY"
                } else if !c.nullable {
                    " NOT NULL"
                } else {
                    ""
                };
                format!("    {} {}{}", c.name, c.column_type, constraint)
            })
            .collect();

        ddl.push_str(&col_defs.join(",\n"));
        ddl.push_str("\n);");
        ddl
    }

    /// Check an introspected table against this definition.
    ///
    /// Extra columns are allowed. Every expected column must exist with a
    /// compatible type, and the key column must be the primary key, since
    /// `ON CONFLICT` needs a matching constraint. Columns that receive NULL
    /// for null source fields must not be `NOT NULL`.
    pub fn verify(&self, existing: &[IntrospectedColumn]) -> Result<()> {
        if existing.is_empty() {
            return Err(Error::schema(format!(
                "Table {} does not exist or has no columns",
                self.name
            )));
        }

        let mut problems = Vec::new();

        for expected in &self.columns {
            let Some(found) = existing.iter().find(|c| c.name == expected.name) else {
                problems.push(format!("missing column {}", expected.name));
                continue;
            };

            let found_type = found.column_type();
            if !expected.column_type.accepts(&found_type) {
                problems.push(format!(
                    "column {} is {}, expected {}",
                    expected.name, found.pg_type, expected.column_type
                ));
            }

            if expected.name == self.primary_key && !found.is_primary_key {
                problems.push(format!("column {} is not the primary key", expected.name));
            }

            if expected.nullable && !found.nullable {
                problems.push(format!("column {} is NOT NULL", expected.name));
            }
        }

        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::schema(format!(
                "Table {} does not match the books layout: {}",
                self.name,
                problems.join("; ")
            )))
        }
    }
}

/// Column definition.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Column {
    /// Column name
    pub name: String,
    /// Column type
    pub column_type: ColumnType,
    /// Is nullable
    pub nullable: bool,
}

impl Column {
    /// Create a new column.
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: true,
        }
    }

    /// Set nullable.
    pub fn nullable(mut self, nullable: bool) -> Self {
        self.nullable = nullable;
        self
    }
}

/// Column types relevant to the books table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnType {
    /// Small integer (2 bytes)
    SmallInt,
    /// Integer (4 bytes)
    Integer,
    /// Big integer (8 bytes)
    BigInt,
    /// Variable-length string
    Varchar {
        /// Maximum length (None = unlimited)
        max_length: Option<u32>,
    },
    /// Text (unlimited length)
    Text,
    /// Any other PostgreSQL type, by name
    Other(String),
}

impl ColumnType {
    /// Parse from an `information_schema.columns.data_type` value.
    pub fn from_postgres(pg_type: &str, max_length: Option<u32>) -> Self {
        let normalized = pg_type.to_lowercase();
        match normalized.as_str() {
            "smallint" | "int2" => ColumnType::SmallInt,
            "integer" | "int" | "int4" => ColumnType::Integer,
            "bigint" | "int8" => ColumnType::BigInt,
            "text" => ColumnType::Text,
            s if s.starts_with("character varying") || s.starts_with("varchar") => {
                ColumnType::Varchar { max_length }
            }
            _ => ColumnType::Other(normalized),
        }
    }

    fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::SmallInt | ColumnType::Integer | ColumnType::BigInt
        )
    }

    fn is_text(&self) -> bool {
        matches!(self, ColumnType::Text | ColumnType::Varchar { .. })
    }

    /// Whether an existing column of type `found` can hold values meant for `self`.
    pub fn accepts(&self, found: &ColumnType) -> bool {
        (self.is_integer() && found.is_integer()) || (self.is_text() && found.is_text())
    }
}

impl fmt::Display for ColumnType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColumnType::SmallInt => write!(f, "SMALLINT"),
            ColumnType::Integer => write!(f, "INTEGER"),
            ColumnType::BigInt => write!(f, "BIGINT"),
            ColumnType::Varchar {
                max_length: Some(n),
            } => write!(f, "VARCHAR({})", n),
            ColumnType::Varchar { max_length: None } => write!(f, "VARCHAR"),
            ColumnType::Text => write!(f, "TEXT"),
            ColumnType::Other(name) => write!(f, "{}", name.to_uppercase()),
        }
    }
}

/// Schema introspection result.
#[derive(Debug, Clone)]
pub struct IntrospectedColumn {
    /// Column name
    pub name: String,
    /// PostgreSQL type
    pub pg_type: String,
    /// Declared maximum length for character types
    pub max_length: Option<i32>,
    /// Is nullable
    pub nullable: bool,
    /// Is primary key
    pub is_primary_key: bool,
}

impl IntrospectedColumn {
    /// Parsed column type.
    pub fn column_type(&self) -> ColumnType {
        let max_length = self.max_length.and_then(|n| u32::try_from(n).ok());
        ColumnType::from_postgres(&self.pg_type, max_length)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn introspected(name: &str, pg_type: &str, pk: bool) -> IntrospectedColumn {
        IntrospectedColumn {
            name: name.into(),
            pg_type: pg_type.into(),
            max_length: None,
            nullable: !pk,
            is_primary_key: pk,
        }
    }

    fn books_columns() -> Vec<IntrospectedColumn> {
        let mut cols = vec![
            introspected("_id", "text", true),
            introspected("__v", "integer", false),
        ];
        for name in [
            "authors", "bookid", "bookname", "category", "edition", "isbn", "year",
        ] {
            cols.push(introspected(name, "text", false));
        }
        cols
    }

    #[test]
    fn test_insert_statement() {
        let sql = Table::books("books").insert_statement();
        assert_eq!(
            sql,
            "INSERT INTO books (_id, __v, authors, bookid, bookname, category, edition, isbn, year) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) ON CONFLICT (_id) DO NOTHING"
        );
    }

    #[test]
    fn test_books_ddl() {
        let ddl = Table::books("public.books").to_postgres_ddl();
        assert!(ddl.starts_with("CREATE TABLE public.books ("));
        assert!(ddl.contains("_id TEXT PRIMARY KEY"));
        assert!(ddl.contains("__v INTEGER"));
        assert!(ddl.contains("year TEXT"));
        assert!(ddl.ends_with(");"));
    }

    #[test]
    fn test_verify_accepts_books_layout() {
        let table = Table::books("books");
        assert!(table.verify(&books_columns()).is_ok());
    }

    #[test]
    fn test_verify_accepts_varchar_and_bigint() {
        let table = Table::books("books");
        let mut cols = books_columns();
        cols[1] = introspected("__v", "bigint", false);
        cols[2] = IntrospectedColumn {
            max_length: Some(255),
            ..introspected("authors", "character varying", false)
        };
        cols.push(introspected("created_at", "timestamp with time zone", false));

        assert!(table.verify(&cols).is_ok());
    }

    #[test]
    fn test_verify_reports_problems() {
        let table = Table::books("books");
        let mut cols = books_columns();
        cols[0].is_primary_key = false;
        cols[1] = introspected("__v", "text", false);
        cols.retain(|c| c.name != "isbn");

        let err = table.verify(&cols).unwrap_err().to_string();
        assert!(err.contains("missing column isbn"));
        assert!(err.contains("column __v is text, expected INTEGER"));
        assert!(err.contains("column _id is not the primary key"));
    }

    #[test]
    fn test_verify_rejects_not_null_text_column() {
        let table = Table::books("books");
        let mut cols = books_columns();
        cols[4].nullable = false;

        let err = table.verify(&cols).unwrap_err().to_string();
        assert!(err.contains("column bookname is NOT NULL"));
    }

    #[test]
    fn test_ddl_marks_required_columns() {
        let mut table = Table::books("books");
        table.columns[2] = Column::new("authors", ColumnType::Text).nullable(false);

        let ddl = table.to_postgres_ddl();
        assert!(ddl.contains("authors TEXT NOT NULL"));
        assert!(ddl.contains("_id TEXT PRIMARY KEY,"));
        assert!(ddl.contains("bookid TEXT,"));
    }

    #[test]
    fn test_verify_missing_table() {
        let err = Table::books("books").verify(&[]).unwrap_err();
        assert_eq!(err.code(), "SCHEMA_ERROR");
    }

    #[test]
    fn test_column_type_from_postgres() {
        assert_eq!(ColumnType::from_postgres("integer", None), ColumnType::Integer);
        assert_eq!(
            ColumnType::from_postgres("character varying", Some(32)),
            ColumnType::Varchar {
                max_length: Some(32)
            }
        );
        assert_eq!(
            ColumnType::from_postgres("jsonb", None),
            ColumnType::Other("jsonb".into())
        );
    }
}
