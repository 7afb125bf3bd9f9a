use std::ops::Range;

use crate::arguments::MySqlArguments;
use crate::rewrite::shape::InsertShape;

/// Most placeholders a single prepared statement may carry.
pub(crate) const MAX_PLACEHOLDERS: usize = 65_535;

// COM_STMT_EXECUTE besides its arguments: command, statement id, cursor flag, iteration
// count and the new-params-bound flag
const EXECUTE_HEADER_LEN: usize = 11;

/// One parameterized template and the parameter sets to run it with.
///
/// Built once per batch. The batch may be joined into multi-row statements only if the
/// template has a rewritable shape and every parameter set binds exactly its placeholders.
#[derive(Debug)]
pub struct BatchDescriptor<'q> {
    sql: &'q str,
    shape: InsertShape,
    parameter_sets: Vec<MySqlArguments>,
    rewritable: bool,
}

impl<'q> BatchDescriptor<'q> {
    /// `no_backslash_escapes` tells how string literals in `sql` are lexed; see
    /// [`InsertShape::analyze`].
    pub fn new(sql: &'q str, parameter_sets: Vec<MySqlArguments>, no_backslash_escapes: bool) -> Self {
        let shape = InsertShape::analyze(sql, no_backslash_escapes);

        let rewritable = shape.is_rewritable()
            && parameter_sets
                .iter()
                .all(|set| set.len() == shape.placeholder_count());

        Self {
            sql,
            shape,
            parameter_sets,
            rewritable,
        }
    }

    pub fn sql(&self) -> &'q str {
        self.sql
    }

    pub fn shape(&self) -> &InsertShape {
        &self.shape
    }

    pub fn parameter_sets(&self) -> &[MySqlArguments] {
        &self.parameter_sets
    }

    pub fn is_rewritable(&self) -> bool {
        self.rewritable
    }

    pub(crate) fn into_parameter_sets(self) -> Vec<MySqlArguments> {
        self.parameter_sets
    }

    /// Joins the parameter sets into as few prepared statements as `max_statement_bytes` and
    /// the placeholder limit allow. Each statement covers a contiguous run of parameter sets.
    ///
    /// A statement is measured by its SQL text plus its encoded arguments, so neither its
    /// `COM_STMT_PREPARE` nor its `COM_STMT_EXECUTE` grows past `max_statement_bytes` unless
    /// a single parameter set does on its own.
    ///
    /// Returns nothing if the batch is not rewritable.
    pub fn rewrite(&self, max_statement_bytes: usize) -> Vec<RewrittenStatement> {
        if !self.rewritable {
            return Vec::new();
        }

        let prefix = self.shape.prefix(self.sql);
        let row = self.shape.row(self.sql);
        let suffix = self.shape.suffix(self.sql);

        let groups = pack(
            self.parameter_sets
                .iter()
                .map(|set| row.len() + set.binary_len()),
            prefix.len() + suffix.len() + EXECUTE_HEADER_LEN,
            self.shape.placeholder_count(),
            max_statement_bytes,
        );

        groups
            .into_iter()
            .map(|rows| {
                let sql = join(prefix, std::iter::repeat(row).take(rows.len()), suffix);
                let arguments = self.parameter_sets[rows.clone()]
                    .iter()
                    .flat_map(|set| set.values().iter().cloned())
                    .collect();

                RewrittenStatement {
                    sql,
                    arguments,
                    rows,
                }
            })
            .collect()
    }
}

/// One statement sent on behalf of several original statements.
///
/// When it inserts into a table with an `AUTO_INCREMENT` key, the server allocates ids
/// sequentially per row: the original statement at `rows.start + i` got the reported first
/// id plus `i` times `auto_increment_increment`.
#[derive(Debug, Clone, PartialEq)]
pub struct RewrittenStatement {
    pub sql: String,
    pub arguments: MySqlArguments,
    /// The original statements covered, by index.
    pub rows: Range<usize>,
}

/// How a list of plain statements is sent.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Planned {
    /// Sent as written.
    Single(usize),
    Rewritten(RewrittenStatement),
}

/// Joins runs of consecutive single-row `INSERT`s without placeholders that share their
/// text outside the row.
pub(crate) fn plan_statements<S: AsRef<str>>(
    statements: &[S],
    max_statement_bytes: usize,
    no_backslash_escapes: bool,
) -> Vec<Planned> {
    let shapes: Vec<InsertShape> = statements
        .iter()
        .map(|sql| InsertShape::analyze(sql.as_ref(), no_backslash_escapes))
        .collect();

    let joinable = |idx: usize| shapes[idx].is_rewritable() && shapes[idx].placeholder_count() == 0;

    let same_outline = |a: usize, b: usize| {
        let (sa, sb) = (statements[a].as_ref(), statements[b].as_ref());

        shapes[a].prefix(sa) == shapes[b].prefix(sb) && shapes[a].suffix(sa) == shapes[b].suffix(sb)
    };

    let mut planned = Vec::new();
    let mut start = 0;

    while start < statements.len() {
        let mut end = start + 1;

        if joinable(start) {
            while end < statements.len() && joinable(end) && same_outline(start, end) {
                end += 1;
            }
        }

        if end - start == 1 {
            planned.push(Planned::Single(start));
            start = end;
            continue;
        }

        let sql = statements[start].as_ref();
        let prefix = shapes[start].prefix(sql);
        let suffix = shapes[start].suffix(sql);

        let row = |idx: usize| shapes[idx].row(statements[idx].as_ref());

        for group in pack(
            (start..end).map(|idx| row(idx).len()),
            prefix.len() + suffix.len(),
            0,
            max_statement_bytes,
        ) {
            let rows = (group.start + start)..(group.end + start);

            if rows.len() == 1 {
                planned.push(Planned::Single(rows.start));
                continue;
            }

            planned.push(Planned::Rewritten(RewrittenStatement {
                sql: join(prefix, rows.clone().map(row), suffix),
                arguments: MySqlArguments::new(),
                rows,
            }));
        }

        start = end;
    }

    planned
}

fn join<'a>(prefix: &str, rows: impl Iterator<Item = &'a str>, suffix: &str) -> String {
    let mut sql = String::from(prefix);

    for (idx, row) in rows.enumerate() {
        if idx > 0 {
            sql.push(',');
        }

        sql.push_str(row);
    }

    sql.push_str(suffix);
    sql
}

// Splits rows into contiguous groups whose joined statement stays within `max_bytes` and
// the placeholder limit. A row too large on its own still gets a group.
fn pack(
    row_lens: impl IntoIterator<Item = usize>,
    fixed_len: usize,
    placeholders_per_row: usize,
    max_bytes: usize,
) -> Vec<Range<usize>> {
    let max_rows = MAX_PLACEHOLDERS
        .checked_div(placeholders_per_row)
        .unwrap_or(usize::MAX)
        .max(1);

    let mut groups = Vec::new();
    let mut start = 0;
    let mut count = 0;
    let mut len = fixed_len;

    for (idx, row_len) in row_lens.into_iter().enumerate() {
        let added = if count == 0 { row_len } else { row_len + 1 };

        if count > 0 && (len + added > max_bytes || count == max_rows) {
            groups.push(start..idx);

            start = idx;
            count = 1;
            len = fixed_len + row_len;
        } else {
            count += 1;
            len += added;
        }
    }

    if count > 0 {
        groups.push(start..start + count);
    }

    groups
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::args;

    #[test]
    fn it_joins_every_row_into_one_statement() {
        let batch = BatchDescriptor::new(
            "INSERT INTO t VALUES (?, ?)",
            vec![args![1_i64, "a"], args![2_i64, "b"], args![3_i64, "c"]],
            false,
        );

        let statements = batch.rewrite(1 << 20);

        assert_eq!(statements.len(), 1);
        assert_eq!(statements[0].sql, "INSERT INTO t VALUES (?, ?),(?, ?),(?, ?)");
        assert_eq!(statements[0].arguments.len(), 6);
        assert_eq!(statements[0].rows, 0..3);
    }

    fn statement_len(statement: &RewrittenStatement) -> usize {
        statement.sql.len() + EXECUTE_HEADER_LEN + statement.arguments.binary_len()
    }

    #[test]
    fn it_splits_at_the_size_cap() {
        // 32 fixed bytes (21 of SQL, 11 of COM_STMT_EXECUTE), then 14 per row
        // (3 of SQL, 11 for a BIGINT argument) plus a comma: 4 rows fit in 100 bytes
        let sql = "INSERT INTO t VALUES (?)";
        let batch = BatchDescriptor::new(sql, (0..7_i64).map(|i| args![i]).collect(), false);

        let statements = batch.rewrite(100);
        let rows: Vec<_> = statements.iter().map(|s| s.rows.clone()).collect();

        assert_eq!(rows, [0..4, 4..7]);
        assert!(statements.iter().all(|s| statement_len(s) <= 100));
        assert_eq!(statements[1].sql, "INSERT INTO t VALUES (?),(?),(?)");
        assert_eq!(statements[1].arguments, args![4_i64, 5_i64, 6_i64]);
    }

    #[test]
    fn it_counts_argument_bytes_towards_the_size_cap() {
        let blob = vec![0_u8; 300 * 1024];
        let batch = BatchDescriptor::new(
            "INSERT INTO t VALUES (?)",
            (0..4).map(|_| args![blob.clone()]).collect(),
            false,
        );

        let statements = batch.rewrite(1 << 20);
        let rows: Vec<_> = statements.iter().map(|s| s.rows.clone()).collect();

        // the SQL alone would fit all four rows in one statement
        assert_eq!(rows, [0..3, 3..4]);
        assert!(statements.iter().all(|s| statement_len(s) <= 1 << 20));
    }

    #[test]
    fn it_gives_an_oversized_row_its_own_group() {
        let groups = pack([10, 50, 10], 5, 1, 40);

        assert_eq!(groups, [0..1, 1..2, 2..3]);
    }

    #[test]
    fn it_splits_at_the_placeholder_limit() {
        let groups = pack(std::iter::repeat(7).take(5), 10, 30_000, usize::MAX);

        assert_eq!(groups, [0..2, 2..4, 4..5]);
    }

    #[test]
    fn it_keeps_rows_using_last_insert_id_apart() {
        let batch = BatchDescriptor::new(
            "INSERT INTO t VALUES (?, LAST_INSERT_ID())",
            vec![args![1_i64], args![2_i64]],
            false,
        );

        assert!(!batch.is_rewritable());
        assert!(batch.rewrite(1 << 20).is_empty());
    }

    #[test]
    fn it_refuses_mismatched_parameter_sets() {
        let batch = BatchDescriptor::new(
            "INSERT INTO t VALUES (?, ?)",
            vec![args![1_i64, 2_i64], args![3_i64]],
            false,
        );

        assert!(!batch.is_rewritable());
    }

    #[test]
    fn it_preserves_the_suffix_once() {
        let batch = BatchDescriptor::new(
            "INSERT INTO t VALUES (?) ON DUPLICATE KEY UPDATE n = n + 1;",
            vec![args![1_i64], args![2_i64]],
            false,
        );

        let statements = batch.rewrite(1 << 20);

        assert_eq!(
            statements[0].sql,
            "INSERT INTO t VALUES (?),(?) ON DUPLICATE KEY UPDATE n = n + 1"
        );
    }

    #[test]
    fn it_plans_runs_of_matching_statements() {
        let statements = [
            "INSERT INTO t(v) VALUES (1)",
            "INSERT INTO t(v) VALUES (2)",
            "UPDATE t SET v = 3",
            "INSERT INTO t(v) VALUES (4)",
            "INSERT INTO u(v) VALUES (5)",
        ];

        let planned = plan_statements(&statements, 1 << 20, false);

        assert_eq!(
            planned,
            [
                Planned::Rewritten(RewrittenStatement {
                    sql: "INSERT INTO t(v) VALUES (1),(2)".into(),
                    arguments: MySqlArguments::new(),
                    rows: 0..2,
                }),
                Planned::Single(2),
                Planned::Single(3),
                Planned::Single(4),
            ]
        );
    }

    #[test]
    fn it_joins_literals_ending_in_a_backslash_without_escapes() {
        let statements = [r"INSERT INTO t VALUES ('a\')", r"INSERT INTO t VALUES ('b\')"];

        assert_eq!(
            plan_statements(&statements, 1 << 20, true),
            [Planned::Rewritten(RewrittenStatement {
                sql: r"INSERT INTO t VALUES ('a\'),('b\')".into(),
                arguments: MySqlArguments::new(),
                rows: 0..2,
            })]
        );

        assert_eq!(
            plan_statements(&statements, 1 << 20, false),
            [Planned::Single(0), Planned::Single(1)]
        );
    }
}
