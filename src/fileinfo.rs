//! Layout engine for directory file-information records.
//!
//! The directory enumeration system calls write sequences of variable-length
//! records into caller buffers. Every supported record class shares the same
//! shape: a fixed-size base carrying a `nextEntryOffset` chain field and a
//! `fileNameLength` field, followed by a trailing UTF-16LE file name of
//! dynamic length. These records are byte regions, not language structures;
//! this module describes each class with an offset table and performs all
//! reads and writes through it, so the core never depends on concrete field
//! ordering.

use byteorder::{ByteOrder, LittleEndian};
use num_derive::{FromPrimitive, ToPrimitive};
use num_traits::FromPrimitive;

/// Bytes per UTF-16 code unit in trailing file name fields.
pub const BYTES_PER_NAME_CHAR: usize = 2;

/// Directory information classes whose record layouts the core understands.
/// Values are the host's information class enumerators.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, FromPrimitive, ToPrimitive)]
#[repr(u32)]
pub enum FileInformationClass {
    FileDirectory = 1,
    FileFullDirectory = 2,
    FileBothDirectory = 3,
    FileNames = 12,
    FileIdBothDirectory = 37,
    FileIdFullDirectory = 38,
    FileIdGlobalTxDirectory = 50,
    FileIdExtdDirectory = 60,
    FileIdExtdBothDirectory = 63,
}

impl FileInformationClass {
    /// Interprets a raw information class value, if it is supported.
    pub fn from_raw(raw: u32) -> Option<Self> {
        Self::from_u32(raw)
    }
}

/// Describes the layout of one file-information record class: the base record
/// size and the byte offsets of the fields common to every class. All field
/// accesses performed by the core go through one of these descriptors.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct FileInformationLayout {
    information_class: FileInformationClass,
    base_size: usize,
    offset_of_next_entry_offset: usize,
    offset_of_file_name_length: usize,
    offset_of_file_name: usize,
}

/// Offset tables for the supported record classes, matching the host's
/// structure definitions field for field. Base sizes include the one-element
/// name placeholder and trailing alignment padding, exactly as the host
/// headers declare them.
const LAYOUTS: [FileInformationLayout; 9] = [
    FileInformationLayout {
        information_class: FileInformationClass::FileDirectory,
        base_size: 72,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 64,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileFullDirectory,
        base_size: 72,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 68,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileBothDirectory,
        base_size: 96,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 94,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileNames,
        base_size: 16,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 8,
        offset_of_file_name: 12,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileIdBothDirectory,
        base_size: 112,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 104,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileIdFullDirectory,
        base_size: 88,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 80,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileIdGlobalTxDirectory,
        base_size: 96,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 92,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileIdExtdDirectory,
        base_size: 96,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 88,
    },
    FileInformationLayout {
        information_class: FileInformationClass::FileIdExtdBothDirectory,
        base_size: 120,
        offset_of_next_entry_offset: 0,
        offset_of_file_name_length: 60,
        offset_of_file_name: 114,
    },
];

impl FileInformationLayout {
    /// Retrieves the layout descriptor for an information class.
    pub fn for_class(information_class: FileInformationClass) -> FileInformationLayout {
        LAYOUTS
            .iter()
            .copied()
            .find(|layout| layout.information_class == information_class)
            .expect("every supported class has a layout entry")
    }

    /// Information class this layout describes.
    pub fn information_class(&self) -> FileInformationClass {
        self.information_class
    }

    /// Base record size, excluding any trailing name beyond the placeholder.
    pub fn base_size(&self) -> usize {
        self.base_size
    }

    /// Byte offset of the trailing file name field.
    pub fn offset_of_file_name(&self) -> usize {
        self.offset_of_file_name
    }

    /// Reads the `nextEntryOffset` chain field.
    pub fn read_next_entry_offset(&self, entry: &[u8]) -> u32 {
        LittleEndian::read_u32(&entry[self.offset_of_next_entry_offset..])
    }

    /// Writes the `nextEntryOffset` chain field.
    pub fn write_next_entry_offset(&self, entry: &mut [u8], value: u32) {
        LittleEndian::write_u32(&mut entry[self.offset_of_next_entry_offset..], value);
    }

    /// Zeroes the `nextEntryOffset` field, terminating a record chain.
    pub fn clear_next_entry_offset(&self, entry: &mut [u8]) {
        self.write_next_entry_offset(entry, 0);
    }

    /// Reads the `fileNameLength` field, in bytes.
    pub fn read_file_name_length(&self, entry: &[u8]) -> u32 {
        LittleEndian::read_u32(&entry[self.offset_of_file_name_length..])
    }

    /// Raw bytes of the trailing file name, clamped to the record slice. This
    /// is a zero-copy view into the UTF-16LE name field.
    pub fn file_name_bytes<'entry>(&self, entry: &'entry [u8]) -> &'entry [u8] {
        let start = self.offset_of_file_name;
        let length = self.read_file_name_length(entry) as usize;
        let end = usize::min(start + length, entry.len());
        &entry[start..end]
    }

    /// Decodes the trailing file name field.
    pub fn read_file_name(&self, entry: &[u8]) -> String {
        decode_utf16le(self.file_name_bytes(entry))
    }

    /// Size a record of this class would occupy with a trailing name of the
    /// given byte length.
    pub fn size_for_file_name_length(&self, file_name_length_bytes: usize) -> usize {
        usize::max(self.base_size, self.offset_of_file_name + file_name_length_bytes)
    }

    /// Size of the given record including its trailing file name.
    pub fn size_of_entry(&self, entry: &[u8]) -> usize {
        self.size_for_file_name_length(self.read_file_name_length(entry) as usize)
    }

    /// Writes the `fileNameLength` field and refreshes `nextEntryOffset` to
    /// keep the chain consistent with the record's new size.
    pub fn write_file_name_length(&self, entry: &mut [u8], file_name_length_bytes: u32) {
        LittleEndian::write_u32(
            &mut entry[self.offset_of_file_name_length..],
            file_name_length_bytes,
        );
        let entry_size = self.size_of_entry(entry) as u32;
        self.write_next_entry_offset(entry, entry_size);
    }

    /// Writes the trailing file name. As many characters as fit within the
    /// record slice are written; the `fileNameLength` field receives the
    /// number of bytes the complete name needs, so a caller can detect
    /// truncation by comparing that value against the available space.
    pub fn write_file_name(&self, entry: &mut [u8], file_name: &str) {
        let encoded = encode_utf16le(file_name);
        let capacity = entry.len().saturating_sub(self.offset_of_file_name);
        let written = usize::min(capacity & !1, encoded.len());

        entry[self.offset_of_file_name..self.offset_of_file_name + written]
            .copy_from_slice(&encoded[..written]);
        self.write_file_name_length(entry, encoded.len() as u32);
    }
}

/// Encodes a file name as UTF-16LE bytes.
pub fn encode_utf16le(value: &str) -> Vec<u8> {
    let mut encoded = Vec::with_capacity(value.len() * BYTES_PER_NAME_CHAR);
    for unit in value.encode_utf16() {
        encoded.extend_from_slice(&unit.to_le_bytes());
    }
    encoded
}

/// Decodes UTF-16LE bytes into a string, replacing unpaired surrogates.
pub fn decode_utf16le(bytes: &[u8]) -> String {
    let units: Vec<u16> = bytes
        .chunks_exact(BYTES_PER_NAME_CHAR)
        .map(LittleEndian::read_u16)
        .collect();
    String::from_utf16_lossy(&units)
}
