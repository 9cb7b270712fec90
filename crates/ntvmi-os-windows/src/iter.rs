use std::iter::FusedIterator;

use ntvmi_core::{Va, VmiCore, VmiDriver};

use crate::WindowsError;

/// An iterator for traversing list entries.
///
/// Iterate over entries in a circular linked list structure, specifically
/// `LIST_ENTRY`, following the forward links from the list head until the
/// head is reached again.
pub struct ListEntryIterator<'a, Driver>
where
    Driver: VmiDriver,
{
    vmi: &'a VmiCore<Driver>,

    /// The last entry returned, `None` before the first step.
    current: Option<Va>,

    /// Set once the walk has ended, successfully or not.
    finished: bool,

    /// Address of the list head.
    list_head: Va,

    /// Offset to the containing structure.
    ///
    /// The offset is subtracted from the entry address to get the containing
    /// structure, similar to the `CONTAINING_RECORD` macro in the Windows
    /// kernel.
    offset: u64,

    /// Offset to the forward link pointer (`LIST_ENTRY.Flink`).
    offset_flink: u64,

    /// Number of entries that may still be returned.
    remaining: usize,
}

impl<'a, Driver> ListEntryIterator<'a, Driver>
where
    Driver: VmiDriver,
{
    /// Create a new list entry iterator.
    ///
    /// At most `limit` entries are returned; a list that has not returned to
    /// its head by then is reported as corrupted.
    pub fn new(
        vmi: &'a VmiCore<Driver>,
        list_head: Va,
        offset: u64,
        offset_flink: u64,
        limit: usize,
    ) -> Self {
        Self {
            vmi,
            current: None,
            finished: false,
            list_head,
            offset,
            offset_flink,
            remaining: limit,
        }
    }

    fn flink(&self, entry: Va) -> Result<Va, WindowsError> {
        let flink = self.vmi.read_va(entry + self.offset_flink)?;
        if flink.is_null() {
            tracing::warn!(%entry, "null LIST_ENTRY.Flink");
            return Err(WindowsError::CorruptedStruct("LIST_ENTRY.Flink"));
        }

        Ok(flink)
    }

    fn __next(&mut self) -> Result<Option<Va>, WindowsError> {
        let entry = self.flink(self.current.unwrap_or(self.list_head))?;

        if entry == self.list_head {
            return Ok(None);
        }

        if self.remaining == 0 {
            tracing::warn!(list_head = %self.list_head, "list does not return to its head");
            return Err(WindowsError::CorruptedStruct("LIST_ENTRY"));
        }

        self.remaining -= 1;
        self.current = Some(entry);

        Ok(Some(entry - self.offset))
    }
}

impl<Driver> Iterator for ListEntryIterator<'_, Driver>
where
    Driver: VmiDriver,
{
    type Item = Result<Va, WindowsError>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }

        let result = self.__next().transpose();
        if !matches!(result, Some(Ok(_))) {
            self.finished = true;
        }

        result
    }
}

impl<Driver> FusedIterator for ListEntryIterator<'_, Driver> where Driver: VmiDriver {}
