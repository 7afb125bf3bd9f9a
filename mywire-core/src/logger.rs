use std::time::{Duration, Instant};

use log::LevelFilter;

pub(crate) const QUERY_TARGET: &str = "mywire::query";

// `tracing` macros need the level as a constant, so a runtime level is matched out
// https://github.com/tokio-rs/tracing/issues/372
#[doc(hidden)]
#[macro_export]
macro_rules! private_tracing_dynamic_enabled {
    (target: $target:expr, $level:expr) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::enabled!(target: $target, Level::ERROR),
            Level::WARN => ::tracing::enabled!(target: $target, Level::WARN),
            Level::INFO => ::tracing::enabled!(target: $target, Level::INFO),
            Level::DEBUG => ::tracing::enabled!(target: $target, Level::DEBUG),
            Level::TRACE => ::tracing::enabled!(target: $target, Level::TRACE),
        }
    }};
}

#[doc(hidden)]
#[macro_export]
macro_rules! private_tracing_dynamic_event {
    (target: $target:expr, $level:expr, $($args:tt)*) => {{
        use ::tracing::Level;

        match $level {
            Level::ERROR => ::tracing::event!(target: $target, Level::ERROR, $($args)*),
            Level::WARN => ::tracing::event!(target: $target, Level::WARN, $($args)*),
            Level::INFO => ::tracing::event!(target: $target, Level::INFO, $($args)*),
            Level::DEBUG => ::tracing::event!(target: $target, Level::DEBUG, $($args)*),
            Level::TRACE => ::tracing::event!(target: $target, Level::TRACE, $($args)*),
        }
    }};
}

#[doc(hidden)]
pub fn private_level_filter_to_levels(filter: LevelFilter) -> Option<(tracing::Level, log::Level)> {
    let tracing_level = match filter {
        LevelFilter::Error => Some(tracing::Level::ERROR),
        LevelFilter::Warn => Some(tracing::Level::WARN),
        LevelFilter::Info => Some(tracing::Level::INFO),
        LevelFilter::Debug => Some(tracing::Level::DEBUG),
        LevelFilter::Trace => Some(tracing::Level::TRACE),
        LevelFilter::Off => None,
    };

    tracing_level.zip(filter.to_level())
}

/// Verbosity of statement logging for a connection.
#[derive(Clone, Debug)]
#[non_exhaustive]
pub struct LogSettings {
    pub statements_level: LevelFilter,
    pub slow_statements_level: LevelFilter,
    pub slow_statements_duration: Duration,
}

impl Default for LogSettings {
    fn default() -> Self {
        LogSettings {
            statements_level: LevelFilter::Debug,
            slow_statements_level: LevelFilter::Warn,
            slow_statements_duration: Duration::from_secs(1),
        }
    }
}

impl LogSettings {
    pub fn log_statements(&mut self, level: LevelFilter) {
        self.statements_level = level;
    }

    pub fn log_slow_statements(&mut self, level: LevelFilter, duration: Duration) {
        self.slow_statements_level = level;
        self.slow_statements_duration = duration;
    }
}

/// Logs one statement execution when dropped or [finished](Self::finish).
///
/// Events go to the `mywire::query` target, at the slow statement level once the
/// execution took longer than the configured threshold.
pub struct QueryLogger<'q> {
    sql: &'q str,
    thread_id: u32,
    rows_returned: u64,
    rows_affected: u64,
    start: Instant,
    settings: LogSettings,
    finished: bool,
}

impl<'q> QueryLogger<'q> {
    /// Starts timing `sql` as run by the server thread `thread_id`.
    pub fn new(sql: &'q str, thread_id: u32, settings: LogSettings) -> Self {
        Self {
            sql,
            thread_id,
            rows_returned: 0,
            rows_affected: 0,
            start: Instant::now(),
            settings,
            finished: false,
        }
    }

    pub fn increment_rows_returned(&mut self) {
        self.rows_returned += 1;
    }

    pub fn increase_rows_affected(&mut self, n: u64) {
        self.rows_affected += n;
    }

    pub fn finish(&mut self) {
        if self.finished {
            return;
        }

        self.finished = true;

        let elapsed = self.start.elapsed();

        let was_slow = elapsed >= self.settings.slow_statements_duration;

        let lvl = if was_slow {
            self.settings.slow_statements_level
        } else {
            self.settings.statements_level
        };

        let Some((tracing_level, log_level)) = private_level_filter_to_levels(lvl) else {
            return;
        };

        // either a `log` logger or a `tracing` subscriber may be listening
        let log_is_enabled = log::log_enabled!(target: QUERY_TARGET, log_level)
            || private_tracing_dynamic_enabled!(target: QUERY_TARGET, tracing_level);

        if !log_is_enabled {
            return;
        }

        let mut summary = parse_query_summary(self.sql);

        let sql = if summary != self.sql {
            summary.push_str(" …");
            format!("\n\n{}\n", self.sql)
        } else {
            String::new()
        };

        if was_slow {
            private_tracing_dynamic_event!(
                target: QUERY_TARGET,
                tracing_level,
                summary,
                db.statement = sql,
                thread_id = self.thread_id,
                rows_affected = self.rows_affected,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
                slow_threshold = ?self.settings.slow_statements_duration,
                "slow statement: execution time exceeded alert threshold"
            );
        } else {
            private_tracing_dynamic_event!(
                target: QUERY_TARGET,
                tracing_level,
                summary,
                db.statement = sql,
                thread_id = self.thread_id,
                rows_affected = self.rows_affected,
                rows_returned = self.rows_returned,
                ?elapsed,
                elapsed_secs = elapsed.as_secs_f64(),
            );
        }
    }
}

impl Drop for QueryLogger<'_> {
    fn drop(&mut self) {
        self.finish();
    }
}

/// The first four words of a statement, collapsed onto one line.
pub fn parse_query_summary(sql: &str) -> String {
    sql.split_whitespace()
        .take(4)
        .collect::<Vec<&str>>()
        .join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_summarizes_statements() {
        assert_eq!(
            parse_query_summary("SELECT id,\n  name FROM users WHERE id = ?"),
            "SELECT id, name FROM"
        );
        assert_eq!(parse_query_summary("COMMIT"), "COMMIT");
    }

    #[test]
    fn it_maps_level_filters() {
        assert!(private_level_filter_to_levels(LevelFilter::Off).is_none());
        assert_eq!(
            private_level_filter_to_levels(LevelFilter::Warn),
            Some((tracing::Level::WARN, log::Level::Warn))
        );
    }
}
