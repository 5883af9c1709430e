//! Store kinds and the session statements that differ between them.

use serde::{Deserialize, Serialize};

/// SQL store behind a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DatabaseType {
    PostgreSQL,
    /// Also MariaDB
    MySQL,
    SQLite,
}

impl DatabaseType {
    /// Identify the store from a connection URL's scheme.
    pub fn from_connection_string(connection_string: &str) -> Option<Self> {
        let (scheme, _) = connection_string.split_once(':')?;
        match scheme.to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Some(Self::PostgreSQL),
            "mysql" | "mariadb" => Some(Self::MySQL),
            "sqlite" => Some(Self::SQLite),
            _ => None,
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "PostgreSQL",
            Self::MySQL => "MySQL",
            Self::SQLite => "SQLite",
        }
    }

    /// Statement that opens an explicit transaction.
    ///
    /// SQLite takes the write lock up front so two writers never deadlock on
    /// a shared-to-exclusive lock upgrade.
    pub fn begin_statement(&self) -> &'static str {
        match self {
            Self::PostgreSQL => "BEGIN",
            Self::MySQL => "START TRANSACTION",
            Self::SQLite => "BEGIN IMMEDIATE",
        }
    }

    /// Statement that switches the session's read-only flag.
    pub fn read_only_statement(&self, read_only: bool) -> &'static str {
        match (self, read_only) {
            (Self::PostgreSQL, true) => "SET SESSION CHARACTERISTICS AS TRANSACTION READ ONLY",
            (Self::PostgreSQL, false) => "SET SESSION CHARACTERISTICS AS TRANSACTION READ WRITE",
            (Self::MySQL, true) => "SET SESSION TRANSACTION READ ONLY",
            (Self::MySQL, false) => "SET SESSION TRANSACTION READ WRITE",
            (Self::SQLite, true) => "PRAGMA query_only = ON",
            (Self::SQLite, false) => "PRAGMA query_only = OFF",
        }
    }
}

impl std::fmt::Display for DatabaseType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.display_name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scheme_selects_store() {
        let cases = [
            ("postgres://localhost/db", Some(DatabaseType::PostgreSQL)),
            ("PostgreSQL://localhost/db", Some(DatabaseType::PostgreSQL)),
            ("mariadb://localhost/db", Some(DatabaseType::MySQL)),
            ("sqlite:test.db", Some(DatabaseType::SQLite)),
            ("sqlite://data/test.db", Some(DatabaseType::SQLite)),
            ("sqlite3:test.db", None),
            ("no-scheme", None),
        ];
        for (url, expected) in cases {
            assert_eq!(DatabaseType::from_connection_string(url), expected, "{url}");
        }
    }

    #[test]
    fn test_sqlite_begins_immediate() {
        assert_eq!(DatabaseType::SQLite.begin_statement(), "BEGIN IMMEDIATE");
        assert_eq!(
            DatabaseType::SQLite.read_only_statement(true),
            "PRAGMA query_only = ON"
        );
    }
}
