//! The seam between the cache and whatever actually runs queries.

use qcache_core::Table;

/// Error type executors may return.
pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

/// Runs a query against a live database.
pub trait QueryExecutor {
    fn execute(&self, query: &str) -> Result<Table, BoxError>;
}

impl<F> QueryExecutor for F
where
    F: Fn(&str) -> Result<Table, BoxError>,
{
    fn execute(&self, query: &str) -> Result<Table, BoxError> {
        self(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use qcache_core::Value;

    #[test]
    fn test_closure_executor() {
        let executor = |query: &str| -> Result<Table, BoxError> {
            Ok(Table::from_rows(["query"], vec![vec![Value::from(query)]])?)
        };
        let table = executor.execute("select 1").unwrap();
        assert_eq!(table.get(0, "query"), Some(&Value::from("select 1")));
    }

    #[test]
    fn test_closure_executor_error() {
        let executor = |_: &str| -> Result<Table, BoxError> { Err("connection refused".into()) };
        assert_eq!(executor.execute("select 1").unwrap_err().to_string(), "connection refused");
    }
}
