//! Registry of open filesystem handles and their redirection metadata.
//!
//! Every handle the interception layer produces on behalf of the application
//! has a record here: the path the application believes it opened, the path
//! that was really opened, and, once the handle is used for directory
//! enumeration, the enumeration state. One reader-writer lock guards the
//! registry; the close-and-remove operation performs the platform close while
//! still holding the exclusive lock so that a recycled handle value can never
//! be bound to a stale record by a racing insertion.

use std::collections::HashMap;
use std::collections::HashSet;
use std::sync::{Mutex, RwLock};

use crate::enumeration::DirectoryOperationQueue;
use crate::fileinfo::FileInformationLayout;
use crate::operations::{FilesystemOperations, Handle};
use crate::status::NtStatus;
use crate::strings;

/// State of an in-progress directory enumeration on one handle.
pub struct DirectoryEnumeration {
    /// Queue producing the enumeration's records.
    pub queue: DirectoryOperationQueue,

    /// Layout of the records the queue produces.
    pub layout: FileInformationLayout,

    /// Upper-cased names already emitted to the application, for suppressing
    /// duplicates across the merged producers. Survives queue restarts;
    /// cleared only when the application requests a rescan.
    pub enumerated_names: HashSet<String>,

    /// Whether no advance call has produced output yet. An empty result on
    /// the very first call reports a different status than later exhaustion.
    pub is_first_invocation: bool,
}

impl DirectoryEnumeration {
    pub fn new(queue: DirectoryOperationQueue, layout: FileInformationLayout) -> Self {
        DirectoryEnumeration {
            queue,
            layout,
            enumerated_names: HashSet::new(),
            is_first_invocation: true,
        }
    }

    /// Records a name as emitted. Returns `false` when it was already seen.
    pub fn record_emitted_name(&mut self, file_name: &str) -> bool {
        self.enumerated_names.insert(strings::upcase(file_name))
    }

    /// Whether the name has been emitted before.
    pub fn was_name_emitted(&self, file_name: &str) -> bool {
        self.enumerated_names.contains(&strings::upcase(file_name))
    }
}

/// Data stored per open handle. The registry owns the record; the record
/// exclusively owns its enumeration state.
pub struct HandleData {
    /// Path associated internally with the handle, the one the application
    /// believes it opened.
    pub associated_path: String,

    /// Path that was actually opened. Empty for synthetic handles that have
    /// no real filesystem object behind them.
    pub real_opened_path: String,

    /// Enumeration state, created lazily on the first enumeration request.
    /// The inner lock serializes traversal without holding the registry lock
    /// exclusively; the contract is that at most one enumeration call per
    /// handle is in flight at a time.
    pub directory_enumeration: Option<Mutex<DirectoryEnumeration>>,
}

impl HandleData {
    fn new(associated_path: String, real_opened_path: String) -> HandleData {
        HandleData { associated_path, real_opened_path, directory_enumeration: None }
    }
}

/// Owned snapshot of a handle's path metadata.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandleView {
    pub associated_path: String,
    pub real_opened_path: String,
    pub has_directory_enumeration: bool,
}

/// Concurrency-safe storage for open handles and their metadata.
#[derive(Default)]
pub struct OpenHandleStore {
    open_handles: RwLock<HashMap<Handle, HandleData>>,
}

impl OpenHandleStore {
    pub fn new() -> OpenHandleStore {
        OpenHandleStore::default()
    }

    pub fn is_empty(&self) -> bool {
        self.open_handles.read().expect("handle store lock").is_empty()
    }

    pub fn size(&self) -> usize {
        self.open_handles.read().expect("handle store lock").len()
    }

    /// Retrieves a snapshot of the record for a handle, if one exists.
    pub fn get(&self, handle: Handle) -> Option<HandleView> {
        let open_handles = self.open_handles.read().expect("handle store lock");
        open_handles.get(&handle).map(|data| HandleView {
            associated_path: data.associated_path.clone(),
            real_opened_path: data.real_opened_path.clone(),
            has_directory_enumeration: data.directory_enumeration.is_some(),
        })
    }

    /// Inserts a new handle record. The handle must not already be present.
    pub fn insert(&self, handle: Handle, associated_path: String, real_opened_path: String) {
        let mut open_handles = self.open_handles.write().expect("handle store lock");
        let previous =
            open_handles.insert(handle, HandleData::new(associated_path, real_opened_path));
        debug_assert!(previous.is_none(), "handle inserted twice");
    }

    /// Inserts a record or, if the handle is already present, replaces its
    /// path metadata while leaving any enumeration state untouched.
    pub fn insert_or_update(
        &self,
        handle: Handle,
        associated_path: String,
        real_opened_path: String,
    ) {
        let mut open_handles = self.open_handles.write().expect("handle store lock");
        match open_handles.get_mut(&handle) {
            Some(data) => {
                data.associated_path = associated_path;
                data.real_opened_path = real_opened_path;
            }
            None => {
                open_handles.insert(handle, HandleData::new(associated_path, real_opened_path));
            }
        }
    }

    /// Attaches enumeration state to an existing record. The record must
    /// exist and must not already carry enumeration state.
    pub fn associate_enumeration(
        &self,
        handle: Handle,
        queue: DirectoryOperationQueue,
        layout: FileInformationLayout,
    ) {
        let mut open_handles = self.open_handles.write().expect("handle store lock");
        let Some(data) = open_handles.get_mut(&handle) else {
            debug_assert!(false, "associating enumeration state with an unknown handle");
            return;
        };
        debug_assert!(
            data.directory_enumeration.is_none(),
            "handle already has enumeration state"
        );
        data.directory_enumeration = Some(Mutex::new(DirectoryEnumeration::new(queue, layout)));
    }

    /// Runs a closure against the enumeration state of a handle, under the
    /// shared registry lock. Returns `None` when the handle is unknown or has
    /// no enumeration state.
    pub fn with_enumeration<R>(
        &self,
        handle: Handle,
        operation: impl FnOnce(&mut DirectoryEnumeration, &str, &str) -> R,
    ) -> Option<R> {
        let open_handles = self.open_handles.read().expect("handle store lock");
        let data = open_handles.get(&handle)?;
        let enumeration = data.directory_enumeration.as_ref()?;
        let mut state = enumeration.lock().expect("enumeration state lock");
        Some(operation(&mut state, &data.associated_path, &data.real_opened_path))
    }

    /// Removes a handle record, transferring ownership of its data to the
    /// caller. Returns `None` when the handle is unknown.
    pub fn remove(&self, handle: Handle) -> Option<HandleData> {
        let mut open_handles = self.open_handles.write().expect("handle store lock");
        open_handles.remove(&handle)
    }

    /// Closes the handle through the facade and removes its record, all
    /// within one exclusive critical section. When the platform close fails,
    /// the record is retained so the host can retry. Synthetic handles,
    /// recognizable by their empty real path, are removed without a facade
    /// call.
    pub fn remove_and_close(
        &self,
        handle: Handle,
        fs: &dyn FilesystemOperations,
    ) -> Result<HandleData, NtStatus> {
        let mut open_handles = self.open_handles.write().expect("handle store lock");

        let Some(data) = open_handles.get(&handle) else {
            debug_assert!(false, "closing a handle that was never stored");
            return Err(NtStatus::InvalidHandle);
        };

        if !data.real_opened_path.is_empty() {
            let close_result = fs.close_handle(handle);
            if !close_result.succeeded() {
                tracing::warn!(?handle, ?close_result, "platform close failed, record retained");
                return Err(close_result);
            }
        }

        Ok(open_handles.remove(&handle).expect("record present under exclusive lock"))
    }
}
