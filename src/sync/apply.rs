//! Batch applier: executes an operation plan atomically.
//!
//! Every batch runs inside one `BEGIN IMMEDIATE` transaction. The first
//! failing operation rolls back the whole batch; nothing of it is ever
//! visible to readers.

use rusqlite::types::Value as SqlValue;
use rusqlite::params_from_iter;
use thiserror::Error;

use crate::db::{DbError, ScheduleDb};
use crate::sync::ops::{Operation, Selection, Table, Value, Values};

#[derive(Debug, Error)]
pub enum ApplyError {
    #[error("Transaction failed: {0}")]
    Store(#[from] DbError),

    #[error("Operation {index} on {table} failed: {source}")]
    Operation {
        index: usize,
        table: Table,
        #[source]
        source: rusqlite::Error,
    },

    #[error("Operation {index} references operation {reference}, which produced no row id")]
    UnresolvedReference { index: usize, reference: usize },

    #[error("Operation {index} on {table} has no selection and would touch every row")]
    Unbounded { index: usize, table: Table },
}

/// Rows touched by a committed batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ApplyOutcome {
    pub operations: usize,
    pub inserted: usize,
    pub updated: usize,
    pub deleted: usize,
}

impl ApplyOutcome {
    pub fn rows_changed(&self) -> usize {
        self.inserted + self.updated + self.deleted
    }
}

/// Apply `ops` in order inside a single transaction.
pub fn apply_batch(db: &ScheduleDb, ops: &[Operation]) -> Result<ApplyOutcome, ApplyError> {
    if ops.is_empty() {
        return Ok(ApplyOutcome::default());
    }

    let outcome = db.with_transaction(|tx| {
        let conn = tx.conn_ref();
        let mut outcome = ApplyOutcome {
            operations: ops.len(),
            ..ApplyOutcome::default()
        };
        // Row id produced by each insert, indexed like `ops`.
        let mut row_ids: Vec<Option<i64>> = Vec::with_capacity(ops.len());

        for (index, op) in ops.iter().enumerate() {
            let table = op.table();
            let sql_error = |source: rusqlite::Error| ApplyError::Operation {
                index,
                table,
                source,
            };

            let row_id = match op {
                Operation::Insert { values, .. } => {
                    let (columns, params) = resolve_values(index, values, &row_ids)?;
                    let placeholders: Vec<String> =
                        (1..=columns.len()).map(|i| format!("?{i}")).collect();
                    let sql = format!(
                        "INSERT INTO {} ({}) VALUES ({})",
                        table.name(),
                        columns.join(", "),
                        placeholders.join(", ")
                    );
                    conn.execute(&sql, params_from_iter(params))
                        .map_err(sql_error)?;
                    outcome.inserted += 1;
                    Some(conn.last_insert_rowid())
                }
                Operation::Update {
                    selection, values, ..
                } => {
                    guard_selection(index, table, selection)?;
                    if !values.is_empty() {
                        let (columns, mut params) = resolve_values(index, values, &row_ids)?;
                        let assignments: Vec<String> = columns
                            .iter()
                            .enumerate()
                            .map(|(i, c)| format!("{c} = ?{}", i + 1))
                            .collect();
                        let (filter, filter_params) = where_clause(selection, columns.len());
                        params.extend(filter_params);
                        let sql = format!(
                            "UPDATE {} SET {} WHERE {}",
                            table.name(),
                            assignments.join(", "),
                            filter
                        );
                        outcome.updated += conn
                            .execute(&sql, params_from_iter(params))
                            .map_err(sql_error)?;
                    }
                    None
                }
                Operation::Delete { selection, .. } => {
                    guard_selection(index, table, selection)?;
                    let (filter, params) = where_clause(selection, 0);
                    let sql = format!("DELETE FROM {} WHERE {}", table.name(), filter);
                    outcome.deleted += conn
                        .execute(&sql, params_from_iter(params))
                        .map_err(sql_error)?;
                    None
                }
            };
            row_ids.push(row_id);
        }

        Ok::<_, ApplyError>(outcome)
    })?;

    log::debug!(
        "Applied {} operations ({} inserted, {} updated, {} deleted)",
        outcome.operations,
        outcome.inserted,
        outcome.updated,
        outcome.deleted
    );
    Ok(outcome)
}

fn guard_selection(index: usize, table: Table, selection: &Selection) -> Result<(), ApplyError> {
    if selection.is_empty() {
        return Err(ApplyError::Unbounded { index, table });
    }
    Ok(())
}

fn resolve_values(
    index: usize,
    values: &Values,
    row_ids: &[Option<i64>],
) -> Result<(Vec<&'static str>, Vec<SqlValue>), ApplyError> {
    let mut columns = Vec::with_capacity(values.len());
    let mut params = Vec::with_capacity(values.len());
    for (column, value) in values {
        let param = match value {
            Value::Null => SqlValue::Null,
            Value::Text(s) => SqlValue::Text(s.clone()),
            Value::Integer(i) => SqlValue::Integer(*i),
            Value::Bool(b) => SqlValue::Integer(i64::from(*b)),
            Value::BackReference(reference) => {
                let id = row_ids
                    .get(*reference)
                    .copied()
                    .flatten()
                    .ok_or(ApplyError::UnresolvedReference {
                        index,
                        reference: *reference,
                    })?;
                SqlValue::Integer(id)
            }
        };
        columns.push(*column);
        params.push(param);
    }
    Ok((columns, params))
}

/// `col = ?n AND ...`, numbering placeholders after `offset` bound params.
fn where_clause(selection: &Selection, offset: usize) -> (String, Vec<SqlValue>) {
    let mut clauses = Vec::with_capacity(selection.filters().len());
    let mut params = Vec::with_capacity(selection.filters().len());
    for (i, (column, value)) in selection.filters().iter().enumerate() {
        clauses.push(format!("{column} = ?{}", offset + i + 1));
        params.push(SqlValue::Text(value.clone()));
    }
    (clauses.join(" AND "), params)
}
