//! Queues that produce filtered streams of file information records.
//!
//! Each queue implements a single piece of a larger directory enumeration and
//! exposes the same queue-shaped contract: inspect the front record, copy it
//! out, pop it, restart. A real-directory queue pulls batches from the facade
//! one pooled buffer at a time; a name-insertion queue fabricates records for
//! directories that only exist by virtue of the rule set; a merged queue
//! interleaves any number of sub-queues into one case-insensitively ordered
//! stream. The set of queue shapes is closed, so dispatch is by tagged
//! variant rather than an open hierarchy.

use std::cmp::Ordering;
use std::sync::Arc;

use crate::buffers::PooledBuffer;
use crate::fileinfo::{FileInformationClass, FileInformationLayout};
use crate::instruction::{EnumerationFilter, SingleDirectoryNameInsertion};
use crate::operations::{FilesystemOperations, Handle, QueryFlags};
use crate::status::NtStatus;
use crate::strings;

/// Byte position value meaning the current batch holds nothing further.
const INVALID_BUFFER_POSITION: usize = usize::MAX;

/// Enumerates the real contents of one directory, filtered by an enumeration
/// filter, fetching one pooled buffer worth of records from the facade at a
/// time. Not internally synchronized; callers serialize access per handle.
pub struct EnumerationQueue {
    filter: EnumerationFilter,
    directory_handle: Option<Handle>,
    information_class: FileInformationClass,
    layout: FileInformationLayout,
    buffer: PooledBuffer,
    buffer_position: usize,
    status: NtStatus,
    fs: Arc<dyn FilesystemOperations>,
}

impl EnumerationQueue {
    /// Opens the directory and primes the queue with its first batch. A
    /// directory that does not exist yields an immediately-exhausted queue;
    /// any other open failure is recorded as the queue's status.
    pub fn new(
        fs: Arc<dyn FilesystemOperations>,
        filter: EnumerationFilter,
        absolute_directory_path: &str,
        information_class: FileInformationClass,
        file_pattern: Option<&str>,
    ) -> EnumerationQueue {
        let mut queue = EnumerationQueue {
            filter,
            directory_handle: None,
            information_class,
            layout: FileInformationLayout::for_class(information_class),
            buffer: PooledBuffer::acquire(),
            buffer_position: INVALID_BUFFER_POSITION,
            status: NtStatus::Success,
            fs,
        };

        match queue.fs.open_directory_for_enumeration(absolute_directory_path) {
            Ok(handle) => queue.directory_handle = Some(handle),
            Err(status) if status.is_absent_or_invalid_name() => {
                // Not an error for the directory to be missing; the queue is
                // simply empty.
            }
            Err(status) => {
                queue.status = status;
                return queue;
            }
        }

        queue.restart(file_pattern);
        queue
    }

    /// Fetches the next batch of records from the facade.
    fn advance_contents(&mut self, query_flags: QueryFlags, file_pattern: Option<&str>) {
        let Some(handle) = self.directory_handle else {
            self.buffer_position = INVALID_BUFFER_POSITION;
            self.status = NtStatus::NoMoreFiles;
            return;
        };

        let result = self.fs.partial_enumerate_directory_contents(
            handle,
            self.information_class,
            &mut self.buffer,
            query_flags,
            file_pattern,
        );
        if result.succeeded() {
            self.buffer_position = 0;
            self.status = NtStatus::MoreEntries;
        } else {
            self.buffer_position = INVALID_BUFFER_POSITION;
            self.status = result;
        }
    }

    fn front_record(&self) -> &[u8] {
        &self.buffer[self.buffer_position..]
    }

    fn pop_internal(&mut self) {
        let next_offset = self.layout.read_next_entry_offset(self.front_record()) as usize;
        if next_offset == 0 {
            self.advance_contents(QueryFlags::default(), None);
        } else {
            self.buffer_position += next_offset;
        }
    }

    fn skip_non_matching(&mut self) {
        while self.status == NtStatus::MoreEntries
            && !self.filter.should_include(&self.front_name())
        {
            self.pop_internal();
        }
    }

    pub fn status(&self) -> NtStatus {
        self.status
    }

    pub fn front_name(&self) -> String {
        self.layout.read_file_name(self.front_record())
    }

    pub fn front_size(&self) -> usize {
        self.layout.size_of_entry(self.front_record())
    }

    /// Copies the front record into `dest`, up to its capacity. Returns the
    /// number of bytes copied; the caller decides whether a short copy is
    /// acceptable.
    pub fn copy_front(&self, dest: &mut [u8]) -> usize {
        let bytes_to_copy = usize::min(self.front_size(), dest.len());
        dest[..bytes_to_copy].copy_from_slice(&self.front_record()[..bytes_to_copy]);
        bytes_to_copy
    }

    pub fn pop(&mut self) {
        self.pop_internal();
        self.skip_non_matching();
    }

    /// Restarts the enumeration from the first entry. The file pattern, when
    /// supplied, is handed through to the facade, which performs the
    /// matching for real directory contents.
    pub fn restart(&mut self, file_pattern: Option<&str>) {
        self.advance_contents(QueryFlags::RESTART_SCAN, file_pattern);
        self.skip_non_matching();
    }
}

impl Drop for EnumerationQueue {
    fn drop(&mut self) {
        if let Some(handle) = self.directory_handle.take() {
            self.fs.close_handle(handle);
        }
    }
}

/// Inserts synthetic directory entries into an enumeration. Each insertion
/// names the next component toward a rule origin that has no real presence;
/// metadata comes from probing the rule's target directory, and probes that
/// find nothing are skipped silently.
pub struct NameInsertionQueue {
    insertions: Vec<SingleDirectoryNameInsertion>,
    position: usize,
    information_class: FileInformationClass,
    layout: FileInformationLayout,
    buffer: PooledBuffer,
    status: NtStatus,
    /// Query pattern, folded to upper case. This queue matches its own
    /// pattern, unlike the real-directory queue, which delegates matching to
    /// the facade.
    file_pattern: Option<String>,
    fs: Arc<dyn FilesystemOperations>,
}

impl NameInsertionQueue {
    pub fn new(
        fs: Arc<dyn FilesystemOperations>,
        insertions: Vec<SingleDirectoryNameInsertion>,
        information_class: FileInformationClass,
        file_pattern: Option<&str>,
    ) -> NameInsertionQueue {
        let mut queue = NameInsertionQueue {
            insertions,
            position: 0,
            information_class,
            layout: FileInformationLayout::for_class(information_class),
            buffer: PooledBuffer::acquire(),
            status: NtStatus::Success,
            file_pattern: None,
            fs,
        };
        queue.restart(file_pattern);
        queue
    }

    /// Probes for the next insertion whose metadata source exists and whose
    /// name matches the query pattern, and stages its record.
    fn advance_contents(&mut self) {
        loop {
            if self.position == self.insertions.len() {
                self.status = NtStatus::NoMoreFiles;
                return;
            }

            let insertion = &self.insertions[self.position];
            let pattern_matches = match &self.file_pattern {
                Some(pattern) => {
                    strings::file_name_matches_pattern(&insertion.file_name_to_insert, pattern)
                }
                None => true,
            };
            if !pattern_matches {
                self.position += 1;
                continue;
            }

            let probe_result = self.fs.query_single_file_directory_information(
                &insertion.information_source_directory,
                &insertion.information_source_file_name,
                self.information_class,
                &mut self.buffer,
            );
            if probe_result.is_absent_or_invalid_name() {
                tracing::trace!(
                    source = %insertion.information_source_directory,
                    name = %insertion.information_source_file_name,
                    "name insertion source missing, skipped"
                );
                self.position += 1;
                continue;
            }
            if !probe_result.succeeded() {
                self.status = probe_result;
                return;
            }

            let name = insertion.file_name_to_insert.clone();
            self.position += 1;
            self.layout.write_file_name(&mut self.buffer, &name);
            self.status = NtStatus::MoreEntries;
            return;
        }
    }

    pub fn status(&self) -> NtStatus {
        self.status
    }

    pub fn front_name(&self) -> String {
        self.layout.read_file_name(&self.buffer)
    }

    pub fn front_size(&self) -> usize {
        self.layout.size_of_entry(&self.buffer)
    }

    pub fn copy_front(&self, dest: &mut [u8]) -> usize {
        let bytes_to_copy = usize::min(self.front_size(), dest.len());
        dest[..bytes_to_copy].copy_from_slice(&self.buffer[..bytes_to_copy]);
        bytes_to_copy
    }

    pub fn pop(&mut self) {
        self.advance_contents();
    }

    /// Restarts from the first insertion. A non-empty pattern replaces the
    /// previous one and is folded to upper case before being stored.
    pub fn restart(&mut self, file_pattern: Option<&str>) {
        if self.insertions.is_empty() {
            self.status = NtStatus::NoMoreFiles;
            return;
        }

        if let Some(pattern) = file_pattern.filter(|pattern| !pattern.is_empty()) {
            self.file_pattern = Some(strings::upcase(pattern));
        }

        self.position = 0;
        self.advance_contents();
    }
}

/// Merges sub-queues into a single stream ordered case-insensitively by file
/// name. Sub-queues are expected to deliver names in sorted order; when two
/// fronts tie, the earlier sub-queue wins.
pub struct MergedQueue {
    queues: Vec<DirectoryOperationQueue>,
    front_queue: Option<usize>,
}

impl MergedQueue {
    pub fn new(queues: Vec<DirectoryOperationQueue>) -> MergedQueue {
        let mut merged = MergedQueue { queues, front_queue: None };
        merged.select_front_queue();
        merged
    }

    /// Picks the sub-queue providing the next record: the one with more
    /// entries whose front name sorts lowest.
    fn select_front_queue(&mut self) {
        let mut selected: Option<(usize, String)> = None;

        for (index, queue) in self.queues.iter().enumerate() {
            if queue.status() != NtStatus::MoreEntries {
                continue;
            }
            let name = queue.front_name();
            let is_lower = match &selected {
                Some((_, selected_name)) => {
                    strings::compare_ignore_case(&name, selected_name) == Ordering::Less
                }
                None => true,
            };
            if is_lower {
                selected = Some((index, name));
            }
        }

        self.front_queue = selected.map(|(index, _)| index);
    }

    fn front(&self) -> Option<&DirectoryOperationQueue> {
        self.front_queue.map(|index| &self.queues[index])
    }

    pub fn status(&self) -> NtStatus {
        // Any sub-queue error is the overall status.
        for queue in &self.queues {
            let status = queue.status();
            match status {
                NtStatus::MoreEntries | NtStatus::NoMoreFiles => {}
                other if !other.succeeded() => return other,
                _ => {}
            }
        }

        match self.front_queue {
            Some(_) => NtStatus::MoreEntries,
            None => NtStatus::NoMoreFiles,
        }
    }

    pub fn front_name(&self) -> String {
        self.front().map(DirectoryOperationQueue::front_name).unwrap_or_default()
    }

    pub fn front_size(&self) -> usize {
        self.front().map(DirectoryOperationQueue::front_size).unwrap_or(0)
    }

    pub fn copy_front(&self, dest: &mut [u8]) -> usize {
        match self.front() {
            Some(queue) => queue.copy_front(dest),
            None => 0,
        }
    }

    pub fn pop(&mut self) {
        if let Some(index) = self.front_queue {
            self.queues[index].pop();
        }
        self.select_front_queue();
    }

    pub fn restart(&mut self, file_pattern: Option<&str>) {
        for queue in &mut self.queues {
            queue.restart(file_pattern);
        }
        self.select_front_queue();
    }
}

/// Closed set of queue shapes participating in directory enumeration.
pub enum DirectoryOperationQueue {
    Enumeration(EnumerationQueue),
    NameInsertion(NameInsertionQueue),
    Merged(MergedQueue),
}

impl DirectoryOperationQueue {
    /// Status of the enumeration: `MoreEntries` while records remain,
    /// `NoMoreFiles` once exhausted, anything else is an error that halts the
    /// overall operation.
    pub fn status(&self) -> NtStatus {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.status(),
            DirectoryOperationQueue::NameInsertion(queue) => queue.status(),
            DirectoryOperationQueue::Merged(queue) => queue.status(),
        }
    }

    /// File name of the front record. Meaningful only while the status is
    /// `MoreEntries`.
    pub fn front_name(&self) -> String {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.front_name(),
            DirectoryOperationQueue::NameInsertion(queue) => queue.front_name(),
            DirectoryOperationQueue::Merged(queue) => queue.front_name(),
        }
    }

    /// Serialized size of the front record, in bytes.
    pub fn front_size(&self) -> usize {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.front_size(),
            DirectoryOperationQueue::NameInsertion(queue) => queue.front_size(),
            DirectoryOperationQueue::Merged(queue) => queue.front_size(),
        }
    }

    /// Copies the front record into `dest` up to its capacity, returning the
    /// bytes written.
    pub fn copy_front(&self, dest: &mut [u8]) -> usize {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.copy_front(dest),
            DirectoryOperationQueue::NameInsertion(queue) => queue.copy_front(dest),
            DirectoryOperationQueue::Merged(queue) => queue.copy_front(dest),
        }
    }

    /// Advances past the front record.
    pub fn pop(&mut self) {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.pop(),
            DirectoryOperationQueue::NameInsertion(queue) => queue.pop(),
            DirectoryOperationQueue::Merged(queue) => queue.pop(),
        }
    }

    /// Restarts the enumeration from the beginning, optionally replacing the
    /// query file pattern.
    pub fn restart(&mut self, file_pattern: Option<&str>) {
        match self {
            DirectoryOperationQueue::Enumeration(queue) => queue.restart(file_pattern),
            DirectoryOperationQueue::NameInsertion(queue) => queue.restart(file_pattern),
            DirectoryOperationQueue::Merged(queue) => queue.restart(file_pattern),
        }
    }
}
