//! Statement logging.

use std::time::Instant;

/// Summarizes one executed statement when it goes out of scope.
pub(crate) struct QueryLogger<'q> {
    sql: &'q str,
    rows_returned: u64,
    rows_affected: u64,
    started: Instant,
}

impl<'q> QueryLogger<'q> {
    pub(crate) fn new(sql: &'q str) -> Self {
        QueryLogger {
            sql,
            rows_returned: 0,
            rows_affected: 0,
            started: Instant::now(),
        }
    }

    pub(crate) fn returned(&mut self, rows: u64) {
        self.rows_returned = rows;
    }

    pub(crate) fn affected(&mut self, rows: u64) {
        self.rows_affected = rows;
    }
}

impl Drop for QueryLogger<'_> {
    fn drop(&mut self) {
        if log::log_enabled!(log::Level::Debug) {
            log::debug!(
                "executed in {:?} (returned: {}, affected: {}): {}",
                self.started.elapsed(),
                self.rows_returned,
                self.rows_affected,
                self.sql
            );
        }
    }
}
