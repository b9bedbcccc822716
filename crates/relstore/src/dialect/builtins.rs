//! Built-in dialect definitions.
//!
//! Each dialect starts from a shared base table and overrides the names that
//! differ for that product.

use crate::core::types::{TypeMapping, TypeNames};

use super::{Dialect, PlaceholderStyle};

const BASE: TypeNames = TypeNames {
    bytes: "BLOB",
    int32: "INTEGER",
    int64: "BIGINT",
    bounded_string: "VARCHAR(255)",
    unbounded_string: "TEXT",
    boolean: "BOOLEAN",
};

const MYSQL: TypeNames = TypeNames {
    bytes: "LONGBLOB",
    unbounded_string: "LONGTEXT",
    ..BASE
};

fn dialect(name: &str, placeholder: PlaceholderStyle, names: TypeNames) -> Dialect {
    Dialect::new(name, placeholder, TypeMapping::from_names(names))
}

/// PostgreSQL.
pub fn postgres() -> Dialect {
    dialect(
        "postgres",
        PlaceholderStyle::Numbered,
        TypeNames {
            bytes: "BYTEA",
            ..BASE
        },
    )
}

/// MySQL 5.7+ and MariaDB.
pub fn mysql() -> Dialect {
    dialect("mysql", PlaceholderStyle::Positional, MYSQL)
}

/// MySQL 5.6: indexed utf8mb4 columns are limited to 767 bytes, so bounded
/// strings narrow to 191 characters.
pub fn mysql_5_6() -> Dialect {
    dialect(
        "mysql-5.6",
        PlaceholderStyle::Positional,
        TypeNames {
            bounded_string: "VARCHAR(191)",
            ..MYSQL
        },
    )
}

/// SQLite.
pub fn sqlite() -> Dialect {
    dialect(
        "sqlite",
        PlaceholderStyle::Positional,
        TypeNames {
            int64: "INTEGER",
            ..BASE
        },
    )
}

/// H2.
pub fn h2() -> Dialect {
    dialect(
        "h2",
        PlaceholderStyle::Positional,
        TypeNames {
            unbounded_string: "CLOB",
            ..BASE
        },
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::types::LogicalType;

    #[test]
    fn test_mysql_5_6_overrides_only_bounded_string() {
        let full = mysql();
        let narrow = mysql_5_6();
        assert_eq!(
            narrow.type_name(LogicalType::BoundedString).unwrap(),
            "VARCHAR(191)"
        );
        for logical in LogicalType::CONCRETE {
            if logical != LogicalType::BoundedString {
                assert_eq!(
                    narrow.type_name(logical).unwrap(),
                    full.type_name(logical).unwrap()
                );
            }
        }
    }

    #[test]
    fn test_postgres_types() {
        let pg = postgres();
        assert_eq!(pg.type_name(LogicalType::Bytes).unwrap(), "BYTEA");
        assert_eq!(pg.type_name(LogicalType::Int64).unwrap(), "BIGINT");
        assert_eq!(pg.type_name(LogicalType::Boolean).unwrap(), "BOOLEAN");
    }

    #[test]
    fn test_sqlite_stores_both_integer_widths_as_integer() {
        let lite = sqlite();
        assert_eq!(lite.type_name(LogicalType::Int32).unwrap(), "INTEGER");
        assert_eq!(lite.type_name(LogicalType::Int64).unwrap(), "INTEGER");
        assert_eq!(lite.type_name(LogicalType::Bytes).unwrap(), "BLOB");
    }
}
