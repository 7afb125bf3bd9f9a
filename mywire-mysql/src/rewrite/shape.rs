use std::fmt::{self, Display, Formatter};
use std::ops::Range;

use crate::rewrite::lexer::{Lexer, Token, TokenKind};

/// Why an `INSERT` cannot be folded into a multi-row statement.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub enum NonRewritable {
    /// Not an `INSERT` or `REPLACE`.
    NotAnInsert,
    /// More than one statement in the text.
    MultipleStatements,
    /// `INSERT ... SET col = ...`
    SetClause,
    /// `INSERT ... SELECT`, `INSERT ... TABLE` and other forms without a `VALUES` list.
    NoValuesClause,
    /// The statement already lists more than one row.
    MultipleRows,
    /// A subquery inside the row.
    Subquery,
    /// `LAST_INSERT_ID()` would be evaluated once for all rows.
    LastInsertId,
    /// The `ON DUPLICATE KEY UPDATE` clause binds parameters, which would be repeated per row.
    PlaceholderInUpdate,
    /// Placeholders outside of the row.
    PlaceholderOutsideValues,
    /// A clause after the row that cannot follow several rows.
    UnsupportedSuffix,
    /// A `/*! ... */` comment, whose content the server executes.
    ExecutableComment,
    /// Parentheses do not balance.
    Malformed,
}

impl Display for NonRewritable {
    fn fmt(&self, f: &mut Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            NonRewritable::NotAnInsert => "not an INSERT or REPLACE statement",
            NonRewritable::MultipleStatements => "more than one statement",
            NonRewritable::SetClause => "INSERT ... SET form",
            NonRewritable::NoValuesClause => "no VALUES list",
            NonRewritable::MultipleRows => "VALUES already lists several rows",
            NonRewritable::Subquery => "subquery in VALUES",
            NonRewritable::LastInsertId => "uses LAST_INSERT_ID()",
            NonRewritable::PlaceholderInUpdate => "placeholder in ON DUPLICATE KEY UPDATE",
            NonRewritable::PlaceholderOutsideValues => "placeholder outside of VALUES",
            NonRewritable::UnsupportedSuffix => "unsupported clause after VALUES",
            NonRewritable::ExecutableComment => "executable comment",
            NonRewritable::Malformed => "unbalanced parentheses",
        })
    }
}

/// The outline of a single-row `INSERT ... VALUES (...)`, split so that rows from several
/// executions can be joined into one statement:
///
/// ```text
/// INSERT INTO t (a, b) VALUES (?, ?) ON DUPLICATE KEY UPDATE b = VALUES(b)
/// |------- prefix -------------|----|-------------- suffix ---------------|
///                               row
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsertShape {
    prefix: Range<usize>,
    row: Range<usize>,
    suffix: Range<usize>,
    has_on_duplicate_key_update: bool,
    update_clause_uses_non_rewritable_ref: bool,
    placeholder_count: usize,
    reason: Option<NonRewritable>,
}

impl InsertShape {
    /// Analyzes `sql`. Always succeeds; check [`is_rewritable`](Self::is_rewritable).
    ///
    /// With `no_backslash_escapes` (the `NO_BACKSLASH_ESCAPES` SQL mode) a backslash inside
    /// a string literal is an ordinary character.
    pub fn analyze(sql: &str, no_backslash_escapes: bool) -> Self {
        let mut lexer = Lexer::new(sql, no_backslash_escapes);
        let tokens: Vec<Token> = lexer.by_ref().collect();

        let mut shape = Self {
            prefix: 0..0,
            row: 0..0,
            suffix: sql.len()..sql.len(),
            has_on_duplicate_key_update: false,
            update_clause_uses_non_rewritable_ref: false,
            placeholder_count: 0,
            reason: None,
        };

        if lexer.saw_executable_comment() {
            shape.reason = Some(NonRewritable::ExecutableComment);
            return shape;
        }

        if let Err(reason) = shape.split(sql, &tokens) {
            shape.reason = Some(reason);
        }

        shape
    }

    fn split(&mut self, sql: &str, tokens: &[Token]) -> Result<(), NonRewritable> {
        let tokens = strip_trailing_semicolon(tokens)?;

        match tokens.first() {
            Some(t) if t.is_keyword(sql, "INSERT") || t.is_keyword(sql, "REPLACE") => {}
            _ => return Err(NonRewritable::NotAnInsert),
        }

        let values = find_values_keyword(sql, tokens)?;

        // optional `ROW` constructor keyword before the row
        let mut open = values + 1;
        if tokens.get(open).is_some_and(|t| t.is_keyword(sql, "ROW")) {
            open += 1;
        }

        if tokens.get(open).map(|t| t.kind) != Some(TokenKind::OpenParen) {
            return Err(NonRewritable::NoValuesClause);
        }

        let close = matching_paren(tokens, open)?;
        let row_start = tokens[values + 1].start;

        let row = &tokens[open + 1..close];
        if row.iter().any(|t| t.is_keyword(sql, "SELECT")) {
            return Err(NonRewritable::Subquery);
        }
        if row.iter().any(|t| t.is_keyword(sql, "LAST_INSERT_ID")) {
            return Err(NonRewritable::LastInsertId);
        }

        if tokens[..values].iter().any(|t| t.kind == TokenKind::Placeholder) {
            return Err(NonRewritable::PlaceholderOutsideValues);
        }

        let suffix = &tokens[close + 1..];
        self.check_suffix(sql, suffix)?;

        self.prefix = 0..row_start;
        self.row = row_start..tokens[close].end;
        // starts right after the row, keeping the whitespace before the clause
        self.suffix = self.row.end..suffix.last().map_or(self.row.end, |last| last.end);
        self.placeholder_count = row
            .iter()
            .filter(|t| t.kind == TokenKind::Placeholder)
            .count();

        Ok(())
    }

    // accepts `[AS alias [(columns)]] [ON DUPLICATE KEY UPDATE ...]`
    fn check_suffix(&mut self, sql: &str, suffix: &[Token]) -> Result<(), NonRewritable> {
        let mut rest = suffix;

        if rest.first().is_some_and(|t| t.kind == TokenKind::Comma) {
            return Err(NonRewritable::MultipleRows);
        }

        if rest.first().is_some_and(|t| t.is_keyword(sql, "AS")) {
            rest = rest.get(2..).ok_or(NonRewritable::UnsupportedSuffix)?;

            if rest.first().is_some_and(|t| t.kind == TokenKind::OpenParen) {
                let close = matching_paren(rest, 0)?;
                rest = &rest[close + 1..];
            }
        }

        if rest.is_empty() {
            return Ok(());
        }

        let on_duplicate_key_update = ["ON", "DUPLICATE", "KEY", "UPDATE"];
        let is_odku = rest.len() > on_duplicate_key_update.len()
            && rest
                .iter()
                .zip(on_duplicate_key_update)
                .all(|(t, keyword)| t.is_keyword(sql, keyword));

        if !is_odku {
            return Err(NonRewritable::UnsupportedSuffix);
        }

        self.has_on_duplicate_key_update = true;

        let update = &rest[on_duplicate_key_update.len()..];

        if update.iter().any(|t| t.kind == TokenKind::Placeholder) {
            self.update_clause_uses_non_rewritable_ref = true;
            return Err(NonRewritable::PlaceholderInUpdate);
        }

        if update.iter().any(|t| t.is_keyword(sql, "LAST_INSERT_ID")) {
            self.update_clause_uses_non_rewritable_ref = true;
            return Err(NonRewritable::LastInsertId);
        }

        Ok(())
    }

    pub fn is_rewritable(&self) -> bool {
        self.reason.is_none()
    }

    /// Why the statement cannot be rewritten, if it cannot.
    pub fn reason(&self) -> Option<NonRewritable> {
        self.reason
    }

    /// Everything before the row, including `VALUES` and a trailing space.
    pub fn prefix<'s>(&self, sql: &'s str) -> &'s str {
        &sql[self.prefix.clone()]
    }

    /// The row itself, e.g. `(?, ?)`.
    pub fn row<'s>(&self, sql: &'s str) -> &'s str {
        &sql[self.row.clone()]
    }

    /// Everything after the row, without a trailing `;`.
    pub fn suffix<'s>(&self, sql: &'s str) -> &'s str {
        &sql[self.suffix.clone()]
    }

    /// Byte range of the row in the analyzed text.
    pub fn values_span(&self) -> Range<usize> {
        self.row.clone()
    }

    pub fn has_on_duplicate_key_update(&self) -> bool {
        self.has_on_duplicate_key_update
    }

    /// Whether the `ON DUPLICATE KEY UPDATE` clause refers to something that changes
    /// meaning once rows are merged.
    pub fn update_clause_uses_non_rewritable_ref(&self) -> bool {
        self.update_clause_uses_non_rewritable_ref
    }

    /// Placeholders in the row.
    pub fn placeholder_count(&self) -> usize {
        self.placeholder_count
    }
}

fn strip_trailing_semicolon(tokens: &[Token]) -> Result<&[Token], NonRewritable> {
    let tokens = match tokens.split_last() {
        Some((last, rest)) if last.kind == TokenKind::Semicolon => rest,
        _ => tokens,
    };

    if tokens.iter().any(|t| t.kind == TokenKind::Semicolon) {
        return Err(NonRewritable::MultipleStatements);
    }

    Ok(tokens)
}

// index of the top-level `VALUES` (or `VALUE`) keyword
fn find_values_keyword(sql: &str, tokens: &[Token]) -> Result<usize, NonRewritable> {
    let mut depth = 0_usize;

    for (idx, token) in tokens.iter().enumerate() {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth = depth.checked_sub(1).ok_or(NonRewritable::Malformed)?;
            }

            TokenKind::Word if depth == 0 => {
                let word = token.text(sql);

                if word.eq_ignore_ascii_case("VALUES") || word.eq_ignore_ascii_case("VALUE") {
                    return Ok(idx);
                }

                if word.eq_ignore_ascii_case("SET") {
                    return Err(NonRewritable::SetClause);
                }

                if word.eq_ignore_ascii_case("SELECT")
                    || word.eq_ignore_ascii_case("TABLE")
                    || word.eq_ignore_ascii_case("WITH")
                {
                    return Err(NonRewritable::NoValuesClause);
                }
            }

            _ => {}
        }
    }

    Err(NonRewritable::NoValuesClause)
}

fn matching_paren(tokens: &[Token], open: usize) -> Result<usize, NonRewritable> {
    let mut depth = 0_usize;

    for (idx, token) in tokens.iter().enumerate().skip(open) {
        match token.kind {
            TokenKind::OpenParen => depth += 1,
            TokenKind::CloseParen => {
                depth -= 1;
                if depth == 0 {
                    return Ok(idx);
                }
            }
            _ => {}
        }
    }

    Err(NonRewritable::Malformed)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn it_splits_a_simple_insert() {
        let sql = "INSERT INTO t (a, b) VALUES (?, ?)";
        let shape = InsertShape::analyze(sql, false);

        assert!(shape.is_rewritable());
        assert_eq!(shape.prefix(sql), "INSERT INTO t (a, b) VALUES ");
        assert_eq!(shape.row(sql), "(?, ?)");
        assert_eq!(shape.suffix(sql), "");
        assert_eq!(shape.placeholder_count(), 2);
    }

    #[test]
    fn it_keeps_on_duplicate_key_update() {
        let sql = "insert into t values (?, now()) on duplicate key update b = values(b);";
        let shape = InsertShape::analyze(sql, false);

        assert!(shape.is_rewritable());
        assert!(shape.has_on_duplicate_key_update());
        assert_eq!(shape.row(sql), "(?, now())");
        assert_eq!(shape.suffix(sql), " on duplicate key update b = values(b)");
    }

    #[test]
    fn it_accepts_a_row_alias() {
        let sql = "INSERT INTO t VALUES (?, ?) AS new (x, y) ON DUPLICATE KEY UPDATE b = new.y";
        let shape = InsertShape::analyze(sql, false);

        assert!(shape.is_rewritable());
        assert_eq!(shape.suffix(sql), " AS new (x, y) ON DUPLICATE KEY UPDATE b = new.y");
    }

    #[test]
    fn it_refuses_shapes_that_change_meaning() {
        let cases = [
            ("UPDATE t SET a = ?", NonRewritable::NotAnInsert),
            ("INSERT INTO t VALUES (?); DELETE FROM t", NonRewritable::MultipleStatements),
            ("INSERT INTO t SET a = ?", NonRewritable::SetClause),
            ("INSERT INTO t (a) SELECT ? FROM dual", NonRewritable::NoValuesClause),
            ("INSERT INTO t VALUES (1), (?)", NonRewritable::MultipleRows),
            ("INSERT INTO t VALUES ((SELECT max(a) FROM u), ?)", NonRewritable::Subquery),
            ("INSERT INTO t VALUES (?, LAST_INSERT_ID())", NonRewritable::LastInsertId),
            (
                "INSERT INTO t VALUES (?) ON DUPLICATE KEY UPDATE a = ?",
                NonRewritable::PlaceholderInUpdate,
            ),
            (
                "INSERT INTO t VALUES (?) ON DUPLICATE KEY UPDATE id = LAST_INSERT_ID(id)",
                NonRewritable::LastInsertId,
            ),
            ("INSERT INTO t VALUES (?) RETURNING id", NonRewritable::UnsupportedSuffix),
            ("INSERT /*!IGNORE*/ INTO t VALUES (?)", NonRewritable::ExecutableComment),
            ("INSERT INTO t VALUES (?", NonRewritable::Malformed),
        ];

        for (sql, reason) in cases {
            assert_eq!(InsertShape::analyze(sql, false).reason(), Some(reason), "{sql}");
        }
    }

    #[test]
    fn it_flags_parameterized_update_clauses() {
        let shape = InsertShape::analyze("INSERT INTO t VALUES (?) ON DUPLICATE KEY UPDATE a = ?", false);

        assert!(shape.has_on_duplicate_key_update());
        assert!(shape.update_clause_uses_non_rewritable_ref());
    }

    #[test]
    fn it_is_not_fooled_by_quoted_keywords() {
        let sql = "INSERT INTO `values` VALUES ('SELECT ;', ?)";
        let shape = InsertShape::analyze(sql, false);

        assert!(shape.is_rewritable(), "{:?}", shape.reason());
        assert_eq!(shape.row(sql), "('SELECT ;', ?)");
    }

    #[test]
    fn it_reads_backslashes_as_the_sql_mode_says() {
        let sql = r"INSERT INTO t VALUES ('C:\', ?)";

        let shape = InsertShape::analyze(sql, true);
        assert!(shape.is_rewritable(), "{:?}", shape.reason());
        assert_eq!(shape.row(sql), r"('C:\', ?)");
        assert_eq!(shape.placeholder_count(), 1);

        // the quote is escaped and the literal never ends
        assert!(!InsertShape::analyze(sql, false).is_rewritable());
    }
}
