//! Store operations produced by reconcilers and executed by the applier.
//!
//! An operation list is a plain value: reconcilers build it from a read-only
//! view of the store, tests assert on it, and `apply::apply_batch` is the
//! only thing that ever executes it.

use std::collections::BTreeMap;
use std::fmt;

/// Tables the sync engine reads and writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Table {
    Rooms,
    Speakers,
    Tracks,
    Blocks,
    Sessions,
    SessionsSpeakers,
}

impl Table {
    pub fn name(self) -> &'static str {
        match self {
            Table::Rooms => "rooms",
            Table::Speakers => "speakers",
            Table::Tracks => "tracks",
            Table::Blocks => "blocks",
            Table::Sessions => "sessions",
            Table::SessionsSpeakers => "sessions_speakers",
        }
    }

    /// Column holding the derived, sync-stable id. The join table has no
    /// single id column; its rows are addressed by `(session_id, speaker_id)`.
    pub fn id_column(self) -> Option<&'static str> {
        match self {
            Table::Rooms => Some("room_id"),
            Table::Speakers => Some("speaker_id"),
            Table::Tracks => Some("track_id"),
            Table::Blocks => Some("block_id"),
            Table::Sessions => Some("session_id"),
            Table::SessionsSpeakers => None,
        }
    }
}

impl fmt::Display for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A column value carried by an insert or update.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Null,
    Text(String),
    Integer(i64),
    Bool(bool),
    /// Row id generated by the insert at this index of the same batch.
    BackReference(usize),
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Text(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Text(v)
    }
}

impl From<&String> for Value {
    fn from(v: &String) -> Self {
        Value::Text(v.clone())
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Integer(v)
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(Value::Null)
    }
}

/// Equality filters (`column = value`, AND-ed) selecting the rows an update
/// or delete touches.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Selection(Vec<(&'static str, String)>);

impl Selection {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn and(mut self, column: &'static str, value: impl Into<String>) -> Self {
        self.0.push((column, value.into()));
        self
    }

    pub fn filters(&self) -> &[(&'static str, String)] {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Value filtered on for `column`, if any.
    pub fn get(&self, column: &str) -> Option<&str> {
        self.0
            .iter()
            .find(|(c, _)| *c == column)
            .map(|(_, v)| v.as_str())
    }
}

pub type Values = BTreeMap<&'static str, Value>;

/// A single store write.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    Insert {
        table: Table,
        values: Values,
    },
    Update {
        table: Table,
        selection: Selection,
        values: Values,
    },
    Delete {
        table: Table,
        selection: Selection,
    },
}

impl Operation {
    pub fn insert(table: Table) -> Self {
        Operation::Insert {
            table,
            values: Values::new(),
        }
    }

    /// Update the row whose derived id equals `id`.
    pub fn update_by_id(table: Table, id: impl Into<String>) -> Self {
        Operation::Update {
            table,
            selection: Self::id_selection(table, id),
            values: Values::new(),
        }
    }

    pub fn update_where(table: Table, selection: Selection) -> Self {
        Operation::Update {
            table,
            selection,
            values: Values::new(),
        }
    }

    pub fn delete_by_id(table: Table, id: impl Into<String>) -> Self {
        Operation::Delete {
            table,
            selection: Self::id_selection(table, id),
        }
    }

    pub fn delete_where(table: Table, selection: Selection) -> Self {
        Operation::Delete { table, selection }
    }

    fn id_selection(table: Table, id: impl Into<String>) -> Selection {
        // Join rows have no single id; callers address them with delete_where.
        let column = table.id_column().unwrap_or("_id");
        Selection::new().and(column, id)
    }

    /// Set (or replace) a column value. Deletes carry no values; the call is
    /// ignored for them.
    pub fn with_value(mut self, column: &'static str, value: impl Into<Value>) -> Self {
        self.set_value(column, value);
        self
    }

    pub fn set_value(&mut self, column: &'static str, value: impl Into<Value>) {
        match self {
            Operation::Insert { values, .. } | Operation::Update { values, .. } => {
                values.insert(column, value.into());
            }
            Operation::Delete { .. } => {}
        }
    }

    pub fn table(&self) -> Table {
        match self {
            Operation::Insert { table, .. }
            | Operation::Update { table, .. }
            | Operation::Delete { table, .. } => *table,
        }
    }

    pub fn values(&self) -> Option<&Values> {
        match self {
            Operation::Insert { values, .. } | Operation::Update { values, .. } => Some(values),
            Operation::Delete { .. } => None,
        }
    }

    pub fn value(&self, column: &str) -> Option<&Value> {
        self.values().and_then(|v| v.get(column))
    }

    pub fn selection(&self) -> Option<&Selection> {
        match self {
            Operation::Update { selection, .. } | Operation::Delete { selection, .. } => {
                Some(selection)
            }
            Operation::Insert { .. } => None,
        }
    }

    /// The derived id this operation targets: the id column of an insert's
    /// values, or the id filter of an update/delete.
    pub fn target_id(&self) -> Option<&str> {
        let column = self.table().id_column()?;
        match self {
            Operation::Insert { values, .. } => match values.get(column) {
                Some(Value::Text(id)) => Some(id.as_str()),
                _ => None,
            },
            Operation::Update { selection, .. } | Operation::Delete { selection, .. } => {
                selection.get(column)
            }
        }
    }

    pub fn is_insert(&self) -> bool {
        matches!(self, Operation::Insert { .. })
    }

    pub fn is_update(&self) -> bool {
        matches!(self, Operation::Update { .. })
    }

    pub fn is_delete(&self) -> bool {
        matches!(self, Operation::Delete { .. })
    }
}
