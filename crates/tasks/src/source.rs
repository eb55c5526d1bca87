//! In-memory data source backing sources with inline rows.

use anyhow::Result;
use async_trait::async_trait;
use records::Row;

use crate::kinds::value_key;
use crate::traits::{DataSource, SourceQuery};

/// Serves a fixed set of rows, applying the query filter.
#[derive(Debug, Clone, Default)]
pub struct MemorySource {
    rows: Vec<Row>,
}

impl MemorySource {
    pub fn new(rows: Vec<Row>) -> Self {
        Self { rows }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

#[async_trait]
impl DataSource for MemorySource {
    async fn fetch(&self, query: SourceQuery<'_>) -> Result<Vec<Row>> {
        let rows = match query.filter {
            None => self.rows.clone(),
            Some((column, wanted)) => self
                .rows
                .iter()
                .filter(|row| {
                    row.get(column)
                        .and_then(value_key)
                        .is_some_and(|key| key == wanted)
                })
                .cloned()
                .collect(),
        };
        Ok(rows)
    }
}
