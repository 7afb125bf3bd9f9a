use std::ops::Range;

use bytes::Bytes;

/// A decoded row: one packet plus the byte range of every non-`NULL` value inside it.
#[derive(Debug, Clone)]
pub(crate) struct Row {
    pub(crate) storage: Bytes,
    pub(crate) values: Vec<Option<Range<usize>>>,
}

impl Row {
    pub(crate) fn get(&self, index: usize) -> Option<&[u8]> {
        self.values
            .get(index)?
            .clone()
            .map(|col| &self.storage[col])
    }

    pub(crate) fn len(&self) -> usize {
        self.values.len()
    }
}
