use super::{Dialect, InsertStatement, is_limitable, multi_row_insert};
use crate::entity::FieldSource;
use crate::error::DaoResult;
use crate::models::{EntityMetadata, Page};
use std::borrow::Cow;

/// PostgreSQL: `LIMIT n OFFSET m`, `$n` placeholders, keys via `RETURNING`.
#[derive(Debug, Clone, Copy, Default)]
pub struct PostgresDialect;

impl Dialect for PostgresDialect {
    fn name(&self) -> &'static str {
        "postgres"
    }

    fn paginate(&self, sql: &str, page: Page) -> String {
        if page.is_unbounded() || !is_limitable(sql) {
            return sql.to_string();
        }
        match page.limit {
            Some(limit) if page.start == 0 => format!("{} LIMIT {}", sql, limit),
            Some(limit) => format!("{} LIMIT {} OFFSET {}", sql, limit, page.start),
            None => format!("{} OFFSET {}", sql, page.start),
        }
    }

    fn supports_batch_insert(&self) -> bool {
        true
    }

    fn build_insert(
        &self,
        metadata: &EntityMetadata,
        table: &str,
        entities: &[&dyn FieldSource],
    ) -> DaoResult<InsertStatement> {
        let mut stmt = multi_row_insert(metadata, table, entities)?;
        if !stmt.generated_key_columns.is_empty() {
            stmt.sql
                .push_str(&format!(" RETURNING {}", stmt.generated_key_columns.join(", ")));
        }
        Ok(stmt)
    }

    fn prepare<'a>(&self, sql: &'a str) -> Cow<'a, str> {
        numbered_placeholders(sql)
    }
}

/// Replace each `?` in SQL code with `$1`, `$2`, ...
///
/// Literals and comments are copied verbatim, dollar-quoted bodies included.
fn numbered_placeholders(sql: &str) -> Cow<'_, str> {
    if !sql.contains('?') {
        return Cow::Borrowed(sql);
    }
    let bytes = sql.as_bytes();
    let mut out = String::with_capacity(sql.len() + 8);
    let mut copied = 0;
    let mut n = 0;
    let mut i = 0;
    while i < bytes.len() {
        i = match bytes[i] {
            b'\'' | b'"' => quote_end(bytes, i),
            b'-' if bytes.get(i + 1) == Some(&b'-') => line_end(bytes, i),
            b'/' if bytes.get(i + 1) == Some(&b'*') => block_comment_end(bytes, i),
            b'$' => dollar_quote_end(sql, i).unwrap_or(i + 1),
            b'?' => {
                n += 1;
                out.push_str(&sql[copied..i]);
                out.push('$');
                out.push_str(&n.to_string());
                copied = i + 1;
                i + 1
            }
            _ => i + 1,
        };
    }
    out.push_str(&sql[copied..]);
    Cow::Owned(out)
}

// A doubled quote closes and reopens, which nets out the same.
fn quote_end(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    bytes[start + 1..]
        .iter()
        .position(|&b| b == quote)
        .map_or(bytes.len(), |pos| start + 1 + pos + 1)
}

fn line_end(bytes: &[u8], start: usize) -> usize {
    bytes[start..]
        .iter()
        .position(|&b| b == b'\n')
        .map_or(bytes.len(), |pos| start + pos)
}

/// Block comments nest in PostgreSQL.
fn block_comment_end(bytes: &[u8], start: usize) -> usize {
    let mut depth = 0usize;
    let mut i = start;
    while i + 1 < bytes.len() {
        match (bytes[i], bytes[i + 1]) {
            (b'/', b'*') => {
                depth += 1;
                i += 2;
            }
            (b'*', b'/') => {
                depth -= 1;
                i += 2;
                if depth == 0 {
                    return i;
                }
            }
            _ => i += 1,
        }
    }
    bytes.len()
}

/// End of a `$tag$ ... $tag$` body opening at `start`, or `None` when the
/// `$` does not open one (`$1`, or part of an identifier).
fn dollar_quote_end(sql: &str, start: usize) -> Option<usize> {
    let bytes = sql.as_bytes();
    if start > 0 && is_ident_byte(bytes[start - 1]) {
        return None;
    }
    let tag_len = bytes[start + 1..].iter().position(|&b| b == b'$')?;
    let tag = &bytes[start + 1..start + 1 + tag_len];
    if let Some(first) = tag.first() {
        if first.is_ascii_digit() || !tag.iter().all(|&b| is_ident_byte(b)) {
            return None;
        }
    }
    let delimiter = &sql[start..start + tag_len + 2];
    let body = start + delimiter.len();
    Some(
        sql[body..]
            .find(delimiter)
            .map_or(sql.len(), |pos| body + pos + delimiter.len()),
    )
}

fn is_ident_byte(b: u8) -> bool {
    b.is_ascii_alphanumeric() || b == b'_'
}
