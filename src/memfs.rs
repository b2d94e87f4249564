//! In-memory implementation of the platform facade.
//!
//! Backs the integration tests and the demo binary with a controllable fake
//! filesystem: a case-insensitive tree of directories and files, a handle
//! table, and per-handle enumeration cursors. Directory contents enumerate in
//! case-insensitive sorted order by name, the order the real system calls
//! produce.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use crate::fileinfo::{encode_utf16le, FileInformationClass, FileInformationLayout};
use crate::operations::{FilesystemOperations, Handle, QueryFlags};
use crate::status::NtStatus;
use crate::strings;

/// Records are packed on 8-byte boundaries, as the host does.
const RECORD_ALIGNMENT: usize = 8;

#[derive(Debug, Copy, Clone, PartialEq, Eq)]
enum EntryKind {
    File,
    Directory,
}

#[derive(Debug, Clone)]
struct Entry {
    name: String,
    kind: EntryKind,
}

/// Cursor of an in-progress enumeration on one open directory handle.
#[derive(Debug, Clone)]
struct EnumerationCursor {
    /// Pattern supplied when the enumeration began; kept across calls unless
    /// a restart provides a replacement.
    file_pattern: Option<String>,

    /// Upper-cased key of the most recently consumed entry.
    last_consumed: Option<String>,
}

#[derive(Debug)]
struct OpenHandle {
    absolute_path: String,
    enumeration: Option<EnumerationCursor>,
}

#[derive(Default)]
struct State {
    /// Directory contents keyed by upper-cased absolute directory path. The
    /// inner map is keyed by upper-cased entry name so iteration yields
    /// case-insensitive sorted order.
    directories: HashMap<String, BTreeMap<String, Entry>>,

    open_handles: HashMap<Handle, OpenHandle>,

    next_handle_value: u64,
}

/// Controllable in-memory filesystem implementing [`FilesystemOperations`].
#[derive(Default)]
pub struct InMemoryFilesystem {
    state: Mutex<State>,
}

impl InMemoryFilesystem {
    pub fn new() -> InMemoryFilesystem {
        InMemoryFilesystem::default()
    }

    /// Inserts a directory and all of its parents.
    pub fn add_directory(&self, absolute_path: &str) {
        let mut state = self.state.lock().expect("filesystem state lock");
        Self::insert_entry(&mut state, absolute_path, EntryKind::Directory);
    }

    /// Inserts a file and all of its parent directories.
    pub fn add_file(&self, absolute_path: &str) {
        let mut state = self.state.lock().expect("filesystem state lock");
        Self::insert_entry(&mut state, absolute_path, EntryKind::File);
    }

    /// Inserts several files into one directory.
    pub fn add_files_in_directory<'name>(
        &self,
        directory_absolute_path: &str,
        file_names: impl IntoIterator<Item = &'name str>,
    ) {
        for file_name in file_names {
            self.add_file(&format!("{directory_absolute_path}\\{file_name}"));
        }
    }

    /// Opens an existing file or directory, minting a handle for it. This is
    /// what an interception layer's underlying open call does against this
    /// filesystem.
    pub fn open(&self, absolute_path: &str) -> Result<Handle, NtStatus> {
        let mut state = self.state.lock().expect("filesystem state lock");
        match Self::entry_kind(&state, absolute_path) {
            Some(_) => Ok(Self::mint_handle(&mut state, absolute_path)),
            None => Err(NtStatus::ObjectNameNotFound),
        }
    }

    /// Creates a file and opens it. Unlike [`InMemoryFilesystem::add_file`],
    /// the parent directory must already exist; this models the underlying
    /// create call, which does not invent missing hierarchy.
    pub fn create_and_open(&self, absolute_path: &str) -> Result<Handle, NtStatus> {
        let mut state = self.state.lock().expect("filesystem state lock");
        let Some((parent, leaf)) = strings::split_parent_and_leaf(absolute_path) else {
            return Err(NtStatus::ObjectNameInvalid);
        };
        let Some(contents) = state.directories.get_mut(&strings::upcase(parent)) else {
            return Err(NtStatus::ObjectPathNotFound);
        };
        contents
            .insert(strings::upcase(leaf), Entry { name: leaf.to_owned(), kind: EntryKind::File });
        Ok(Self::mint_handle(&mut state, absolute_path))
    }

    /// Removes a file or directory (with everything beneath it). Simulates
    /// external modification of the filesystem. Test support.
    pub fn remove(&self, absolute_path: &str) {
        let mut state = self.state.lock().expect("filesystem state lock");
        if let Some((parent, leaf)) = strings::split_parent_and_leaf(absolute_path) {
            if let Some(contents) = state.directories.get_mut(&strings::upcase(parent)) {
                contents.remove(&strings::upcase(leaf));
            }
        }
        let removed_key = strings::upcase(absolute_path);
        let removed_prefix = format!("{removed_key}\\");
        state
            .directories
            .retain(|key, _| key != &removed_key && !key.starts_with(&removed_prefix));
    }

    /// Names currently present in a directory, sorted case-insensitively.
    /// Test support.
    pub fn directory_contents(&self, absolute_path: &str) -> Option<Vec<String>> {
        let state = self.state.lock().expect("filesystem state lock");
        state
            .directories
            .get(&strings::upcase(absolute_path))
            .map(|entries| entries.values().map(|entry| entry.name.clone()).collect())
    }

    /// Number of handles currently open. Test support.
    pub fn open_handle_count(&self) -> usize {
        let state = self.state.lock().expect("filesystem state lock");
        state.open_handles.len()
    }

    fn insert_entry(state: &mut State, absolute_path: &str, kind: EntryKind) {
        if let Some((parent, leaf)) = strings::split_parent_and_leaf(absolute_path) {
            Self::insert_entry(state, parent, EntryKind::Directory);
            state
                .directories
                .entry(strings::upcase(parent))
                .or_default()
                .insert(strings::upcase(leaf), Entry { name: leaf.to_owned(), kind });
        }
        if kind == EntryKind::Directory {
            state.directories.entry(strings::upcase(absolute_path)).or_default();
        }
    }

    fn entry_kind(state: &State, absolute_path: &str) -> Option<EntryKind> {
        if state.directories.contains_key(&strings::upcase(absolute_path)) {
            return Some(EntryKind::Directory);
        }
        let (parent, leaf) = strings::split_parent_and_leaf(absolute_path)?;
        state
            .directories
            .get(&strings::upcase(parent))?
            .get(&strings::upcase(leaf))
            .map(|entry| entry.kind)
    }

    fn mint_handle(state: &mut State, absolute_path: &str) -> Handle {
        state.next_handle_value += 1;
        let handle = Handle(state.next_handle_value);
        state.open_handles.insert(
            handle,
            OpenHandle { absolute_path: absolute_path.to_owned(), enumeration: None },
        );
        handle
    }
}

impl FilesystemOperations for InMemoryFilesystem {
    fn close_handle(&self, handle: Handle) -> NtStatus {
        let mut state = self.state.lock().expect("filesystem state lock");
        match state.open_handles.remove(&handle) {
            Some(_) => NtStatus::Success,
            None => NtStatus::InvalidHandle,
        }
    }

    fn create_directory_hierarchy(&self, absolute_path: &str) -> NtStatus {
        let mut state = self.state.lock().expect("filesystem state lock");
        if let Some(EntryKind::File) = Self::entry_kind(&state, absolute_path) {
            return NtStatus::ObjectPathInvalid;
        }
        Self::insert_entry(&mut state, absolute_path, EntryKind::Directory);
        NtStatus::Success
    }

    fn exists(&self, absolute_path: &str) -> bool {
        let state = self.state.lock().expect("filesystem state lock");
        Self::entry_kind(&state, absolute_path).is_some()
    }

    fn is_directory(&self, absolute_path: &str) -> bool {
        let state = self.state.lock().expect("filesystem state lock");
        Self::entry_kind(&state, absolute_path) == Some(EntryKind::Directory)
    }

    fn open_directory_for_enumeration(&self, absolute_path: &str) -> Result<Handle, NtStatus> {
        let mut state = self.state.lock().expect("filesystem state lock");
        match Self::entry_kind(&state, absolute_path) {
            Some(EntryKind::Directory) => Ok(Self::mint_handle(&mut state, absolute_path)),
            Some(EntryKind::File) => Err(NtStatus::ObjectPathInvalid),
            None => Err(NtStatus::ObjectNameNotFound),
        }
    }

    fn partial_enumerate_directory_contents(
        &self,
        handle: Handle,
        information_class: FileInformationClass,
        buffer: &mut [u8],
        query_flags: QueryFlags,
        file_pattern: Option<&str>,
    ) -> NtStatus {
        let layout = FileInformationLayout::for_class(information_class);
        let mut state = self.state.lock().expect("filesystem state lock");

        let Some(open_handle) = state.open_handles.get(&handle) else {
            return NtStatus::InvalidHandle;
        };
        let directory_key = strings::upcase(&open_handle.absolute_path);
        let entries: Vec<(String, String)> = match state.directories.get(&directory_key) {
            Some(contents) => contents
                .iter()
                .map(|(key, entry)| (key.clone(), entry.name.clone()))
                .collect(),
            None => return NtStatus::ObjectPathNotFound,
        };

        let open_handle =
            state.open_handles.get_mut(&handle).expect("handle present moments ago");
        let supplied_pattern =
            file_pattern.filter(|pattern| !pattern.is_empty()).map(str::to_owned);
        let restart = query_flags.contains(QueryFlags::RESTART_SCAN);
        if open_handle.enumeration.is_none() || restart {
            let retained_pattern = open_handle
                .enumeration
                .as_ref()
                .and_then(|cursor| cursor.file_pattern.clone());
            open_handle.enumeration = Some(EnumerationCursor {
                file_pattern: supplied_pattern.or(retained_pattern),
                last_consumed: None,
            });
        }
        let cursor = open_handle.enumeration.as_mut().expect("cursor initialized above");

        let mut write_position = 0usize;
        let mut previous_record: Option<usize> = None;

        for (key, name) in entries {
            if let Some(last) = &cursor.last_consumed {
                if key.as_str() <= last.as_str() {
                    continue;
                }
            }

            let matches = match &cursor.file_pattern {
                Some(pattern) => strings::file_name_matches_pattern(&name, pattern),
                None => true,
            };
            if !matches {
                cursor.last_consumed = Some(key);
                continue;
            }

            let record_size =
                layout.size_for_file_name_length(encode_utf16le(&name).len());
            let record_start = (write_position + RECORD_ALIGNMENT - 1) & !(RECORD_ALIGNMENT - 1);
            if record_start + record_size > buffer.len() {
                if previous_record.is_none() {
                    return NtStatus::BufferTooSmall;
                }
                break;
            }

            let record = &mut buffer[record_start..record_start + record_size];
            record.fill(0);
            layout.write_file_name(record, &name);
            layout.clear_next_entry_offset(record);

            if let Some(previous_start) = previous_record {
                layout.write_next_entry_offset(
                    &mut buffer[previous_start..],
                    (record_start - previous_start) as u32,
                );
            }

            previous_record = Some(record_start);
            write_position = record_start + record_size;
            cursor.last_consumed = Some(key);

            if query_flags.contains(QueryFlags::RETURN_SINGLE_ENTRY) {
                break;
            }
        }

        if previous_record.is_none() {
            return NtStatus::NoMoreFiles;
        }
        NtStatus::Success
    }

    fn query_absolute_path_by_handle(&self, handle: Handle) -> Result<String, NtStatus> {
        let state = self.state.lock().expect("filesystem state lock");
        state
            .open_handles
            .get(&handle)
            .map(|open_handle| open_handle.absolute_path.clone())
            .ok_or(NtStatus::InvalidHandle)
    }

    fn query_file_handle_mode(&self, handle: Handle) -> Result<u32, NtStatus> {
        let state = self.state.lock().expect("filesystem state lock");
        if state.open_handles.contains_key(&handle) {
            Ok(0)
        } else {
            Err(NtStatus::InvalidHandle)
        }
    }

    fn query_single_file_directory_information(
        &self,
        directory_absolute_path: &str,
        file_name: &str,
        information_class: FileInformationClass,
        buffer: &mut [u8],
    ) -> NtStatus {
        let layout = FileInformationLayout::for_class(information_class);
        let state = self.state.lock().expect("filesystem state lock");

        let Some(contents) = state.directories.get(&strings::upcase(directory_absolute_path))
        else {
            return NtStatus::ObjectPathNotFound;
        };
        let Some(entry) = contents.get(&strings::upcase(file_name)) else {
            return NtStatus::ObjectNameNotFound;
        };

        let record_size = layout.size_for_file_name_length(encode_utf16le(&entry.name).len());
        if record_size > buffer.len() {
            return NtStatus::BufferTooSmall;
        }

        let record = &mut buffer[..record_size];
        record.fill(0);
        layout.write_file_name(record, &entry.name);
        layout.clear_next_entry_offset(record);
        NtStatus::Success
    }
}
