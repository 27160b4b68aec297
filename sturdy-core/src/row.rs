//! Result rows.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{Error, Result};
use crate::types::{decode_enum, EnumCodec, FromValue, Value};

/// Column names for a result set, shared by every row it produced.
#[derive(Debug)]
pub struct RowMeta {
    names: Vec<String>,
    by_name: HashMap<String, usize>,
}

impl RowMeta {
    pub fn new(names: Vec<String>) -> Arc<Self> {
        let by_name = names
            .iter()
            .enumerate()
            .map(|(i, n)| (n.clone(), i))
            .collect();

        Arc::new(RowMeta { names, by_name })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.by_name.get(name).copied()
    }
}

/// A single row from a result set: ordered [`Value`]s addressable by column name.
#[derive(Debug, Clone)]
pub struct Row {
    meta: Arc<RowMeta>,
    values: Vec<Value>,
}

impl Row {
    pub fn new(meta: Arc<RowMeta>, values: Vec<Value>) -> Self {
        debug_assert_eq!(meta.names().len(), values.len());
        Row { meta, values }
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn columns(&self) -> &[String] {
        self.meta.names()
    }

    /// The raw value of a column, or `None` when the result set has no such column.
    pub fn value(&self, name: &str) -> Option<&Value> {
        self.meta.position(name).map(|i| &self.values[i])
    }

    pub fn value_at(&self, index: usize) -> Option<&Value> {
        self.values.get(index)
    }

    /// Decode a column by name.
    pub fn try_get<T: FromValue>(&self, name: &str) -> Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| Error::type_mismatch(format!("no column named `{name}` in row")))?;

        T::from_value(value)
            .map_err(|e| Error::type_mismatch(format!("column `{name}`: {e}")))
    }

    /// Decode a column by position.
    pub fn try_get_at<T: FromValue>(&self, index: usize) -> Result<T> {
        let value = self
            .value_at(index)
            .ok_or_else(|| Error::type_mismatch(format!("no column at index {index}")))?;

        T::from_value(value)
    }

    /// Decode an enum column via its [`EnumCodec`].
    pub fn try_get_enum<T: EnumCodec>(&self, name: &str) -> Result<T> {
        let value = self
            .value(name)
            .ok_or_else(|| Error::type_mismatch(format!("no column named `{name}` in row")))?;

        decode_enum(value).map_err(|e| Error::type_mismatch(format!("column `{name}`: {e}")))
    }

    /// A new row holding only the columns prefixed with `prefix`, with the
    /// prefix stripped. Used to split LEFT JOIN-folded related columns out of
    /// a combined row.
    pub(crate) fn strip_prefix(&self, prefix: &str) -> Option<Row> {
        let mut names = Vec::new();
        let mut values = Vec::new();

        for (i, name) in self.meta.names().iter().enumerate() {
            if let Some(stripped) = name.strip_prefix(prefix) {
                names.push(stripped.to_owned());
                values.push(self.values[i].clone());
            }
        }

        if names.is_empty() {
            return None;
        }

        Some(Row::new(RowMeta::new(names), values))
    }

    pub(crate) fn into_values(self) -> Vec<Value> {
        self.values
    }
}
