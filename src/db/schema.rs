//! Table schemas derived from Arrow data.
//!
//! The source batch is already typed, so the table layout is a direct mapping
//! from Arrow types to SQL types rather than an inference pass over values.

use anyhow::{Result, bail};
use arrow::datatypes::{DataType, Schema as ArrowSchema};

/// SQL data type
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SqlType {
    Boolean,
    SmallInt,
    Integer,
    BigInt,
    Real,
    DoublePrecision,
    Text,
    Timestamp,
    Date,
}

impl SqlType {
    /// Returns the Postgres type name. SQLite accepts the same names through
    /// its affinity rules, so one spelling serves both backends.
    pub fn to_postgres(&self) -> &'static str {
        match self {
            SqlType::Boolean => "BOOLEAN",
            SqlType::SmallInt => "SMALLINT",
            SqlType::Integer => "INTEGER",
            SqlType::BigInt => "BIGINT",
            SqlType::Real => "REAL",
            SqlType::DoublePrecision => "DOUBLE PRECISION",
            SqlType::Text => "TEXT",
            SqlType::Timestamp => "TIMESTAMP",
            SqlType::Date => "DATE",
        }
    }

    /// Map an Arrow type to the SQL type rows of that column are stored as.
    pub fn from_arrow(data_type: &DataType) -> Result<Self> {
        use DataType::*;
        Ok(match data_type {
            Boolean => SqlType::Boolean,
            Int8 | Int16 | UInt8 => SqlType::SmallInt,
            Int32 | UInt16 => SqlType::Integer,
            Int64 | UInt32 | UInt64 => SqlType::BigInt,
            Float16 | Float32 => SqlType::Real,
            Float64 => SqlType::DoublePrecision,
            Utf8 | LargeUtf8 => SqlType::Text,
            Timestamp(_, _) => SqlType::Timestamp,
            Date32 | Date64 => SqlType::Date,
            other => bail!("Unsupported column type for SQL storage: {other:?}"),
        })
    }
}

/// A column in a table schema
#[derive(Debug, Clone)]
pub struct Column {
    pub name: String,
    pub sql_type: SqlType,
}

/// A database table layout (ordered collection of columns)
#[derive(Debug, Clone)]
pub struct TableSchema {
    pub table_name: String,
    pub columns: Vec<Column>,
}

impl TableSchema {
    pub fn from_arrow(table_name: &str, schema: &ArrowSchema) -> Result<Self> {
        let columns = schema
            .fields()
            .iter()
            .map(|field| {
                Ok(Column {
                    name: field.name().clone(),
                    sql_type: SqlType::from_arrow(field.data_type())?,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(TableSchema {
            table_name: table_name.to_string(),
            columns,
        })
    }

    /// Generate the CREATE TABLE statement. All columns are nullable; nulls
    /// are introduced upstream by schema alignment.
    pub fn create_ddl(&self) -> String {
        let mut ddl = format!("CREATE TABLE \"{}\" (\n", self.table_name);

        let column_defs: Vec<String> = self
            .columns
            .iter()
            .map(|col| format!("  \"{}\" {}", col.name, col.sql_type.to_postgres()))
            .collect();

        ddl.push_str(&column_defs.join(",\n"));
        ddl.push_str("\n);");

        ddl
    }

    pub fn drop_ddl(&self) -> String {
        format!("DROP TABLE IF EXISTS \"{}\";", self.table_name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use arrow::datatypes::{Field, TimeUnit};

    fn trip_schema() -> ArrowSchema {
        ArrowSchema::new(vec![
            Field::new("vendor_id", DataType::Int64, true),
            Field::new(
                "pickup_datetime",
                DataType::Timestamp(TimeUnit::Microsecond, None),
                true,
            ),
            Field::new("passenger_count", DataType::Float64, true),
            Field::new("store_and_fwd_flag", DataType::Utf8, true),
        ])
    }

    #[test]
    fn test_from_arrow_maps_types() {
        let schema = TableSchema::from_arrow("yellow_taxi_data", &trip_schema()).unwrap();

        assert_eq!(schema.columns.len(), 4);
        assert_eq!(schema.columns[0].sql_type, SqlType::BigInt);
        assert_eq!(schema.columns[1].sql_type, SqlType::Timestamp);
        assert_eq!(schema.columns[2].sql_type, SqlType::DoublePrecision);
        assert_eq!(schema.columns[3].sql_type, SqlType::Text);
    }

    #[test]
    fn test_from_arrow_rejects_nested_types() {
        let nested = ArrowSchema::new(vec![Field::new(
            "tags",
            DataType::List(std::sync::Arc::new(Field::new("item", DataType::Utf8, true))),
            true,
        )]);

        assert!(TableSchema::from_arrow("t", &nested).is_err());
    }

    #[test]
    fn test_create_ddl() {
        let schema = TableSchema::from_arrow("yellow_taxi_data", &trip_schema()).unwrap();
        let ddl = schema.create_ddl();

        assert!(ddl.contains("CREATE TABLE \"yellow_taxi_data\""));
        assert!(ddl.contains("\"vendor_id\" BIGINT"));
        assert!(ddl.contains("\"pickup_datetime\" TIMESTAMP"));
        assert!(ddl.contains("\"passenger_count\" DOUBLE PRECISION"));
        assert!(ddl.contains("\"store_and_fwd_flag\" TEXT"));
        assert!(!ddl.contains("NOT NULL"));
    }

    #[test]
    fn test_drop_ddl() {
        let schema = TableSchema::from_arrow("zones", &trip_schema()).unwrap();
        assert_eq!(schema.drop_ddl(), "DROP TABLE IF EXISTS \"zones\";");
    }
}
