// SPDX-FileCopyrightText: 2026 Mattia Egloff <mattia.egloff@pm.me>
//
// SPDX-License-Identifier: GPL-3.0-or-later

//! Snapshot queries over the event log.

use std::collections::VecDeque;
use std::ops::Range;

use time::OffsetDateTime;

use crate::event::Event;
use crate::storage::{QueryCursor, SharedStorage, StorageError};

/// Default number of events fetched per page.
pub const DEFAULT_PAGE_SIZE: usize = 64;

/// A finite, restartable view of live events in capture-time order.
///
/// Iterating twice yields the same sequence: visibility is pinned to the
/// sequence number committed when the query was created.
pub struct EventQuery {
    storage: SharedStorage,
    range: Range<OffsetDateTime>,
    patient_id: Option<String>,
    snapshot: u64,
    page_size: usize,
}

impl EventQuery {
    pub(crate) fn new(storage: SharedStorage, range: Range<OffsetDateTime>, snapshot: u64) -> Self {
        EventQuery {
            storage,
            range,
            patient_id: None,
            snapshot,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }

    /// Restricts the query to one patient.
    pub fn for_patient(mut self, patient_id: impl Into<String>) -> Self {
        self.patient_id = Some(patient_id.into());
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size.max(1);
        self
    }

    /// The sequence number this query observes.
    pub fn snapshot(&self) -> u64 {
        self.snapshot
    }

    /// Starts a fresh pass over the query.
    pub fn iter(&self) -> EventIter<'_> {
        EventIter {
            query: self,
            cursor: QueryCursor::origin(),
            buffer: VecDeque::new(),
            exhausted: false,
        }
    }

    fn fetch(&self, after: QueryCursor) -> Result<Vec<Event>, StorageError> {
        self.storage.lock().query_page(
            self.patient_id.as_deref(),
            self.range.start,
            self.range.end,
            self.snapshot,
            after,
            self.page_size,
        )
    }
}

impl<'a> IntoIterator for &'a EventQuery {
    type Item = Result<Event, StorageError>;
    type IntoIter = EventIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}

/// One pass over an [`EventQuery`]. Reads lazily, one page at a time.
pub struct EventIter<'a> {
    query: &'a EventQuery,
    cursor: QueryCursor,
    buffer: VecDeque<Event>,
    exhausted: bool,
}

impl Iterator for EventIter<'_> {
    type Item = Result<Event, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.buffer.is_empty() && !self.exhausted {
            match self.query.fetch(self.cursor) {
                Ok(page) => {
                    self.exhausted = page.len() < self.query.page_size;
                    if let Some(last) = page.last() {
                        self.cursor = QueryCursor::after(last);
                    }
                    self.buffer.extend(page);
                }
                Err(e) => {
                    self.exhausted = true;
                    return Some(Err(e));
                }
            }
        }

        self.buffer.pop_front().map(Ok)
    }
}
