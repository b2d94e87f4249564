//! Applies operation instructions against the platform facade.
//!
//! The executor is the surface the interception layer calls. It composes
//! root-handle-relative paths, obtains instructions from the director,
//! carries them out (fallback opens, lazy target hierarchy creation,
//! synthetic handles), keeps the open-handle registry current, and streams
//! directory enumerations into host-supplied buffers with deduplication and
//! record chaining.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use crate::director::FilesystemDirector;
use crate::enumeration::{
    DirectoryOperationQueue, EnumerationQueue, MergedQueue, NameInsertionQueue,
};
use crate::fileinfo::{FileInformationClass, FileInformationLayout};
use crate::handles::OpenHandleStore;
use crate::instruction::{AccessMode, FileOperation, FileOperationInstruction, SyntheticOutcome};
use crate::operations::{FilesystemOperations, Handle, QueryFlags};
use crate::status::NtStatus;
use crate::strings;

/// Synthetic handle values occupy a range no facade implementation issues.
const SYNTHETIC_HANDLE_BASE: u64 = 1 << 63;

/// Records are placed on 8-byte boundaries within host buffers.
const RECORD_ALIGNMENT: usize = 8;

/// Outcome of one enumeration advance call.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct EnumerationOutput {
    pub status: NtStatus,

    /// Bytes of the host buffer occupied by records, including alignment.
    pub bytes_written: usize,
}

/// Carries out instructions from a director against a platform facade,
/// tracking every handle it produces.
pub struct FilesystemExecutor {
    director: Arc<FilesystemDirector>,
    handles: OpenHandleStore,
    fs: Arc<dyn FilesystemOperations>,
    next_synthetic_handle: AtomicU64,
}

impl FilesystemExecutor {
    pub fn new(
        director: Arc<FilesystemDirector>,
        fs: Arc<dyn FilesystemOperations>,
    ) -> FilesystemExecutor {
        FilesystemExecutor {
            director,
            handles: OpenHandleStore::new(),
            fs,
            next_synthetic_handle: AtomicU64::new(SYNTHETIC_HANDLE_BASE),
        }
    }

    pub fn director(&self) -> &FilesystemDirector {
        &self.director
    }

    pub fn handles(&self) -> &OpenHandleStore {
        &self.handles
    }

    /// Resolves the absolute path of a request, composing it with the logical
    /// path of a root directory handle when one is supplied. Composition
    /// always uses the path the application believes the root handle names,
    /// never the real opened path.
    pub fn compose_path(
        &self,
        requested_path: &str,
        root_directory: Option<Handle>,
    ) -> Result<String, NtStatus> {
        let composed = match root_directory {
            None => requested_path.to_owned(),
            Some(root) => {
                let root_path = match self.handles.get(root) {
                    Some(view) => view.associated_path,
                    None => self.fs.query_absolute_path_by_handle(root)?,
                };
                if requested_path.is_empty() {
                    root_path
                } else {
                    format!("{root_path}\\{requested_path}")
                }
            }
        };
        strings::normalize_path(&composed).ok_or(NtStatus::ObjectNameInvalid)
    }

    /// Opens or creates a filesystem entity on behalf of the application.
    /// `open_fn` performs the underlying system call against a real absolute
    /// path; the executor decides which path, in which order, and registers
    /// the resulting handle.
    pub fn new_file_handle(
        &self,
        requested_path: &str,
        root_directory: Option<Handle>,
        operation: FileOperation,
        access: AccessMode,
        mut open_fn: impl FnMut(&str) -> Result<Handle, NtStatus>,
    ) -> Result<Handle, NtStatus> {
        let path = self.compose_path(requested_path, root_directory)?;
        let instruction = self.director.instruction_for_file_operation(&path, operation, access);

        match instruction {
            FileOperationInstruction::PassThrough => {
                let handle = open_fn(&path)?;
                self.handles.insert_or_update(handle, path.clone(), path);
                Ok(handle)
            }
            FileOperationInstruction::Redirect { real_path, ensure_target_hierarchy } => {
                if ensure_target_hierarchy {
                    if let Some((parent, _)) = strings::split_parent_and_leaf(&real_path) {
                        let hierarchy_result = self.fs.create_directory_hierarchy(parent);
                        if !hierarchy_result.succeeded() {
                            return Err(hierarchy_result);
                        }
                    }
                }
                tracing::debug!(from = %path, to = %real_path, "redirecting file operation");
                let handle = open_fn(&real_path)?;
                self.handles.insert_or_update(handle, path, real_path);
                Ok(handle)
            }
            FileOperationInstruction::TryRedirectThenFallback { target_path, origin_path } => {
                match open_fn(&target_path) {
                    Ok(handle) => {
                        self.handles.insert_or_update(handle, path, target_path);
                        Ok(handle)
                    }
                    Err(status) if status.is_absent_or_invalid_name() => {
                        let handle = open_fn(&origin_path)?;
                        self.handles.insert_or_update(handle, path, origin_path);
                        Ok(handle)
                    }
                    Err(status) => Err(status),
                }
            }
            FileOperationInstruction::Synthesize(SyntheticOutcome::Directory) => {
                let handle =
                    Handle(self.next_synthetic_handle.fetch_add(1, Ordering::Relaxed));
                tracing::debug!(?handle, path = %path, "synthesized illusionary directory handle");
                self.handles.insert(handle, path, String::new());
                Ok(handle)
            }
            FileOperationInstruction::Synthesize(SyntheticOutcome::NotFound) => {
                Err(NtStatus::ObjectNameNotFound)
            }
        }
    }

    /// Closes a handle. Handles unknown to the registry are forwarded to the
    /// facade untouched; registered handles are closed and erased within one
    /// critical section so a recycled value can never alias a stale record.
    pub fn close_handle(&self, handle: Handle) -> NtStatus {
        if self.handles.get(handle).is_none() {
            return self.fs.close_handle(handle);
        }
        match self.handles.remove_and_close(handle, self.fs.as_ref()) {
            Ok(_) => NtStatus::Success,
            Err(status) => status,
        }
    }

    /// Prepares a directory enumeration on a handle: consults the director
    /// and, when interposition is required, builds the queues and attaches
    /// them to the handle record. Returns `None` when the host should forward
    /// the enumeration to the system unchanged, and the status to report
    /// otherwise.
    pub fn prepare_directory_enumeration(
        &self,
        handle: Handle,
        raw_information_class: u32,
        file_pattern: Option<&str>,
    ) -> Option<NtStatus> {
        let Some(information_class) = FileInformationClass::from_raw(raw_information_class) else {
            return Some(NtStatus::InvalidInfoClass);
        };

        let view = self.handles.get(handle)?;
        if view.has_directory_enumeration {
            return Some(NtStatus::Success);
        }

        let instruction = self
            .director
            .instruction_for_directory_enumeration(&view.associated_path, &view.real_opened_path)?;

        tracing::debug!(
            path = %view.associated_path,
            directories = instruction.directories_to_enumerate.len(),
            insertions = instruction.names_to_insert.len(),
            "interposing directory enumeration"
        );

        let mut queues: Vec<DirectoryOperationQueue> = instruction
            .directories_to_enumerate
            .into_iter()
            .map(|directory| {
                DirectoryOperationQueue::Enumeration(EnumerationQueue::new(
                    Arc::clone(&self.fs),
                    directory.filter,
                    &directory.path,
                    information_class,
                    file_pattern,
                ))
            })
            .collect();
        if !instruction.names_to_insert.is_empty() {
            queues.push(DirectoryOperationQueue::NameInsertion(NameInsertionQueue::new(
                Arc::clone(&self.fs),
                instruction.names_to_insert,
                information_class,
                file_pattern,
            )));
        }

        let queue = if queues.len() == 1 {
            queues.remove(0)
        } else {
            DirectoryOperationQueue::Merged(MergedQueue::new(queues))
        };

        self.handles.associate_enumeration(
            handle,
            queue,
            FileInformationLayout::for_class(information_class),
        );
        Some(NtStatus::Success)
    }

    /// Advances a prepared enumeration, filling the host buffer with as many
    /// deduplicated records as fit. Honors the restart-scan flag (which also
    /// clears the deduplication set) and the return-single-entry flag.
    pub fn advance_directory_enumeration(
        &self,
        handle: Handle,
        buffer: &mut [u8],
        query_flags: QueryFlags,
        file_pattern: Option<&str>,
    ) -> EnumerationOutput {
        let result = self.handles.with_enumeration(handle, |state, _, _| {
            if query_flags.contains(QueryFlags::RESTART_SCAN) {
                state.queue.restart(file_pattern);
                state.enumerated_names.clear();
            }

            let layout = state.layout;
            let return_single_entry = query_flags.contains(QueryFlags::RETURN_SINGLE_ENTRY);
            let mut bytes_written = 0usize;
            let mut previous_record: Option<usize> = None;

            loop {
                match state.queue.status() {
                    NtStatus::MoreEntries => {}
                    NtStatus::NoMoreFiles => break,
                    error => return EnumerationOutput { status: error, bytes_written },
                }

                let name = state.queue.front_name();
                if state.was_name_emitted(&name) {
                    state.queue.pop();
                    continue;
                }

                let record_size = state.queue.front_size();
                let record_start =
                    (bytes_written + RECORD_ALIGNMENT - 1) & !(RECORD_ALIGNMENT - 1);
                let available = buffer.len().saturating_sub(record_start);

                if record_size > available {
                    if previous_record.is_some() {
                        break;
                    }
                    if available < layout.base_size() {
                        return EnumerationOutput { status: NtStatus::BufferTooSmall, bytes_written: 0 };
                    }

                    // A single truncated record: the name is cut short but
                    // its length field still reports the bytes needed.
                    let written = state.queue.copy_front(&mut buffer[record_start..]);
                    layout.clear_next_entry_offset(&mut buffer[record_start..]);
                    state.record_emitted_name(&name);
                    state.queue.pop();
                    state.is_first_invocation = false;
                    return EnumerationOutput {
                        status: NtStatus::BufferOverflow,
                        bytes_written: record_start + written,
                    };
                }

                let record = &mut buffer[record_start..record_start + record_size];
                state.queue.copy_front(record);
                layout.clear_next_entry_offset(record);
                if let Some(previous_start) = previous_record {
                    layout.write_next_entry_offset(
                        &mut buffer[previous_start..],
                        (record_start - previous_start) as u32,
                    );
                }

                state.record_emitted_name(&name);
                state.queue.pop();
                previous_record = Some(record_start);
                bytes_written = record_start + record_size;

                if return_single_entry {
                    break;
                }
            }

            let status = if previous_record.is_none() {
                if state.is_first_invocation {
                    NtStatus::NoSuchFile
                } else {
                    NtStatus::NoMoreFiles
                }
            } else {
                NtStatus::Success
            };
            state.is_first_invocation = false;
            EnumerationOutput { status, bytes_written }
        });

        match result {
            Some(output) => output,
            None => {
                debug_assert!(false, "enumeration advanced without prepared state");
                EnumerationOutput { status: NtStatus::InvalidParameter, bytes_written: 0 }
            }
        }
    }
}
