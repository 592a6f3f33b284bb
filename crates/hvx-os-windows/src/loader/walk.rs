use std::{iter::FusedIterator, marker::PhantomData};

use hvx_core::{Bitness, HvxDriver, HvxError, ProcessId, StealthyReader, Va};

use super::{LoaderEntry as _, LoaderLayout};

/// Why a loader list traversal ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WalkStop {
    /// The traversal came back to the list head.
    ListHead,

    /// A forward link was null.
    NullLink,

    /// The iteration ceiling of the layout was reached.
    Ceiling,

    /// A module entry could not be read.
    ReadFailure,
}

/// Position of a loader list traversal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LoaderWalkCursor {
    /// The node to visit next.
    pub current: Va,

    /// The list head; reaching it again ends the traversal.
    pub list_head: Va,

    /// Layout family of the list.
    pub bitness: Bitness,

    /// Number of entries produced so far.
    pub iterations: usize,
}

/// Iterator over the module entries of an in-load-order list.
///
/// The list lives in memory the caller does not control. The walk ends at
/// the first of: a return to the list head, a null link, a failed entry
/// read, or [`LoaderLayout::ITERATION_CEILING`] entries. None of these is
/// an error; [`stop_reason`] tells them apart afterwards.
///
/// [`stop_reason`]: Self::stop_reason
pub struct LoaderWalk<'a, Driver, Layout>
where
    Driver: HvxDriver,
    Layout: LoaderLayout,
{
    reader: StealthyReader<'a, Driver>,
    pid: ProcessId,
    cursor: LoaderWalkCursor,
    stop: Option<WalkStop>,
    _marker: PhantomData<Layout>,
}

impl<'a, Driver, Layout> LoaderWalk<'a, Driver, Layout>
where
    Driver: HvxDriver,
    Layout: LoaderLayout,
{
    /// Starts a traversal of the list of the process whose environment
    /// block is at `peb`.
    pub fn new(reader: StealthyReader<'a, Driver>, pid: ProcessId, peb: Va) -> Result<Self, HvxError> {
        let list = Layout::list_head(&reader, pid, peb)?;

        Ok(Self {
            reader,
            pid,
            cursor: LoaderWalkCursor {
                current: list.first,
                list_head: list.head,
                bitness: Layout::BITNESS,
                iterations: 0,
            },
            stop: None,
            _marker: PhantomData,
        })
    }

    /// Returns the current position.
    pub fn cursor(&self) -> LoaderWalkCursor {
        self.cursor
    }

    /// Returns why the traversal ended, or `None` while it is in progress.
    pub fn stop_reason(&self) -> Option<WalkStop> {
        self.stop
    }

    fn finish(&mut self, reason: WalkStop) -> Option<Layout::Entry> {
        let LoaderWalkCursor {
            current,
            iterations,
            bitness,
            ..
        } = self.cursor;

        match reason {
            WalkStop::Ceiling => tracing::warn!(
                pid = %self.pid,
                ?bitness,
                iterations,
                "loader list exceeds the iteration ceiling"
            ),
            WalkStop::ReadFailure => tracing::debug!(
                pid = %self.pid,
                %current,
                iterations,
                "loader list entry is unreadable"
            ),
            WalkStop::ListHead | WalkStop::NullLink => tracing::trace!(
                pid = %self.pid,
                ?reason,
                iterations,
                "loader list traversal finished"
            ),
        }

        self.stop = Some(reason);
        None
    }
}

impl<Driver, Layout> Iterator for LoaderWalk<'_, Driver, Layout>
where
    Driver: HvxDriver,
    Layout: LoaderLayout,
{
    type Item = Layout::Entry;

    fn next(&mut self) -> Option<Self::Item> {
        if self.stop.is_some() {
            return None;
        }

        let current = self.cursor.current;
        if current.is_null() {
            return self.finish(WalkStop::NullLink);
        }

        if current == self.cursor.list_head {
            return self.finish(WalkStop::ListHead);
        }

        if self.cursor.iterations >= Layout::ITERATION_CEILING {
            return self.finish(WalkStop::Ceiling);
        }

        match Layout::read_entry(&self.reader, self.pid, current) {
            Ok(entry) => {
                tracing::trace!(pid = %self.pid, %current, base = %entry.dll_base(), "loader entry");
                self.cursor.current = entry.next();
                self.cursor.iterations += 1;
                Some(entry)
            }
            Err(_) => self.finish(WalkStop::ReadFailure),
        }
    }
}

impl<Driver, Layout> FusedIterator for LoaderWalk<'_, Driver, Layout>
where
    Driver: HvxDriver,
    Layout: LoaderLayout,
{
}
