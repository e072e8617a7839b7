//! PostgreSQL Error Codes
//!
//! SQLSTATE codes the analytics core uses to classify driver errors into
//! network-class, schema-class and timeout failures.
//!
//! ## SQLSTATE Format
//!
//! - 5-character codes representing error classes and conditions
//! - First 2 characters: error class
//! - Last 3 characters: specific condition
//!
//! ## Reference
//!
//! Full list: <https://www.postgresql.org/docs/current/errcodes-appendix.html>

/// PostgreSQL SQLSTATE error codes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PgErrorCode;

impl PgErrorCode {
    // =========================================================================
    // Class 08: Connection Exception
    // =========================================================================

    /// Connection exception class prefix
    pub const CONNECTION_EXCEPTION_CLASS: &'static str = "08";

    // =========================================================================
    // Class 23: Integrity Constraint Violation
    // =========================================================================

    /// Foreign key violation - Code 23503
    pub const FOREIGN_KEY_VIOLATION: &'static str = "23503";

    // =========================================================================
    // Class 42: Syntax Error or Access Rule Violation
    // =========================================================================

    /// Syntax error or access rule violation class prefix
    ///
    /// Covers `42601` syntax_error, `42P01` undefined_table,
    /// `42703` undefined_column and `42883` undefined_function.
    pub const SYNTAX_OR_ACCESS_CLASS: &'static str = "42";

    pub const SYNTAX_ERROR: &'static str = "42601";
    pub const UNDEFINED_TABLE: &'static str = "42P01";
    pub const UNDEFINED_COLUMN: &'static str = "42703";

    // =========================================================================
    // Class 53 / 57: Insufficient Resources, Operator Intervention
    // =========================================================================

    /// Too many connections - Code 53300
    pub const TOO_MANY_CONNECTIONS: &'static str = "53300";

    /// Query canceled - Code 57014
    ///
    /// Raised when `statement_timeout` fires on the server.
    pub const QUERY_CANCELED: &'static str = "57014";

    /// Admin shutdown - Code 57P01
    pub const ADMIN_SHUTDOWN: &'static str = "57P01";

    /// Cannot connect now - Code 57P03
    pub const CANNOT_CONNECT_NOW: &'static str = "57P03";

    // =========================================================================
    // Helper Methods
    // =========================================================================

    /// Check if the error code signals a server-side statement timeout
    #[inline]
    pub fn is_query_canceled(code: &str) -> bool {
        code == Self::QUERY_CANCELED
    }

    /// Check if the error code signals infrastructure trouble rather than a bad query
    #[inline]
    pub fn is_connection_error(code: &str) -> bool {
        code.starts_with(Self::CONNECTION_EXCEPTION_CLASS)
            || code == Self::TOO_MANY_CONNECTIONS
            || code == Self::ADMIN_SHUTDOWN
            || code == Self::CANNOT_CONNECT_NOW
    }

    /// Check if the error code indicates a query/schema mismatch
    #[inline]
    pub fn is_schema_error(code: &str) -> bool {
        code.starts_with(Self::SYNTAX_OR_ACCESS_CLASS) || code == Self::FOREIGN_KEY_VIOLATION
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_schema_error_detection() {
        assert!(PgErrorCode::is_schema_error(PgErrorCode::SYNTAX_ERROR));
        assert!(PgErrorCode::is_schema_error(PgErrorCode::UNDEFINED_TABLE));
        assert!(PgErrorCode::is_schema_error(PgErrorCode::UNDEFINED_COLUMN));
        assert!(PgErrorCode::is_schema_error("23503"));
        assert!(!PgErrorCode::is_schema_error("23505"));
        assert!(!PgErrorCode::is_schema_error("08006"));
    }

    #[test]
    fn test_connection_error_detection() {
        assert!(PgErrorCode::is_connection_error("08006"));
        assert!(PgErrorCode::is_connection_error("08001"));
        assert!(PgErrorCode::is_connection_error("53300"));
        assert!(PgErrorCode::is_connection_error("57P01"));
        assert!(!PgErrorCode::is_connection_error("42601"));
    }

    #[test]
    fn test_query_canceled() {
        assert!(PgErrorCode::is_query_canceled("57014"));
        assert!(!PgErrorCode::is_query_canceled("57P01"));
    }
}
