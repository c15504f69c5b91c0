// SPDX-License-Identifier: GPL-3.0-or-later
// Copyright (C) 2026 Erik van der Tier

//! Output files and the virtual/physical address mapping.
//!
//! The `FileManager` owns every registered output file and keeps exactly one
//! active at a time. All writes go through it: the active file's virtual
//! cursor advances with each write, and the physical file offset is always
//! `virtual - header_size` for the active file.

use std::fmt;
use std::fs::{self, File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Byte order applied to every multi-byte write primitive, independent of
/// the host's native order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endianness {
    Big,
    Little,
}

/// I/O-layer errors. `FileOpen` aborts the job; `NoActiveFile` and
/// `SeekOutOfRange` indicate driver contract violations and are fatal too.
#[derive(Debug)]
pub enum FileError {
    NoActiveFile,
    SeekOutOfRange { target: u64 },
    FileOpen { name: PathBuf, detail: String },
    Write { name: PathBuf, detail: String },
}

impl fmt::Display for FileError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FileError::NoActiveFile => write!(f, "No file opened"),
            FileError::SeekOutOfRange { target } => {
                write!(f, "Seek target 0x{target:08X} is outside the output file")
            }
            FileError::FileOpen { name, detail } => {
                write!(f, "Could not open file {}: {detail}", name.display())
            }
            FileError::Write { name, detail } => {
                write!(f, "Could not write to file {}: {detail}", name.display())
            }
        }
    }
}

impl std::error::Error for FileError {}

/// A single output destination with dual virtual/physical addressing.
pub trait AssemblerFile {
    /// Open the file, or with `check_only` just verify that opening would
    /// succeed without keeping any state. Repeated open is a no-op.
    fn open(&mut self, check_only: bool) -> Result<(), FileError>;
    fn close(&mut self);
    fn is_open(&self) -> bool;
    fn write(&mut self, data: &[u8]) -> Result<(), FileError>;
    fn virtual_address(&self) -> u64;
    fn physical_address(&self) -> u64;
    fn header_size(&self) -> u64;
    fn seek_virtual(&mut self, address: u64) -> Result<(), FileError>;
    fn seek_physical(&mut self, address: u64) -> Result<(), FileError>;
    /// Whether the file dictates its own load address.
    fn has_fixed_virtual_address(&self) -> bool {
        false
    }
    fn file_name(&self) -> &Path;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileMode {
    /// Create (or truncate) a fresh output file.
    Create,
    /// Open an existing file and patch it in place.
    Patch,
    /// Copy an original file, then patch the copy.
    Copy,
}

/// File-backed [`AssemblerFile`] with a constant header-size delta between
/// virtual and physical addressing: `physical = virtual - header_size`.
pub struct GenericAssemblerFile {
    mode: FileMode,
    file_name: PathBuf,
    original_name: Option<PathBuf>,
    header_size: u64,
    virtual_address: u64,
    handle: Option<File>,
    closed: bool,
    // Physical length bound for patch/copy modes; Create grows freely.
    fixed_end: Option<u64>,
}

impl GenericAssemblerFile {
    /// A fresh output file, truncated on open.
    pub fn create(file_name: impl Into<PathBuf>, header_size: u64) -> Self {
        Self {
            mode: FileMode::Create,
            file_name: file_name.into(),
            original_name: None,
            header_size,
            virtual_address: header_size,
            handle: None,
            closed: false,
            fixed_end: None,
        }
    }

    /// Patch an existing file in place.
    pub fn patch(file_name: impl Into<PathBuf>, header_size: u64) -> Self {
        Self {
            mode: FileMode::Patch,
            ..Self::create(file_name, header_size)
        }
    }

    /// Copy `original_name` to `file_name` on open, then patch the copy.
    pub fn copy_from(
        original_name: impl Into<PathBuf>,
        file_name: impl Into<PathBuf>,
        header_size: u64,
    ) -> Self {
        Self {
            mode: FileMode::Copy,
            original_name: Some(original_name.into()),
            ..Self::create(file_name, header_size)
        }
    }

    /// Re-specify the header size. Only valid while the file is not open,
    /// for formats whose header size is known late.
    pub fn set_header_size(&mut self, size: u64) {
        debug_assert!(self.handle.is_none(), "header size changed while open");
        self.header_size = size;
        self.virtual_address = size;
    }

    fn open_error(&self, detail: impl Into<String>) -> FileError {
        FileError::FileOpen {
            name: self.file_name.clone(),
            detail: detail.into(),
        }
    }

    fn open_handle(&self) -> Result<(File, Option<u64>), FileError> {
        match self.mode {
            FileMode::Create => {
                let file = OpenOptions::new()
                    .create(true)
                    .write(true)
                    .truncate(true)
                    .open(&self.file_name)
                    .map_err(|err| self.open_error(err.to_string()))?;
                Ok((file, None))
            }
            FileMode::Patch => {
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&self.file_name)
                    .map_err(|err| self.open_error(err.to_string()))?;
                let len = file
                    .metadata()
                    .map_err(|err| self.open_error(err.to_string()))?
                    .len();
                Ok((file, Some(len)))
            }
            FileMode::Copy => {
                let original = self
                    .original_name
                    .as_ref()
                    .expect("copy mode always has an original");
                fs::copy(original, &self.file_name).map_err(|err| FileError::FileOpen {
                    name: original.clone(),
                    detail: err.to_string(),
                })?;
                let file = OpenOptions::new()
                    .read(true)
                    .write(true)
                    .open(&self.file_name)
                    .map_err(|err| self.open_error(err.to_string()))?;
                let len = file
                    .metadata()
                    .map_err(|err| self.open_error(err.to_string()))?
                    .len();
                Ok((file, Some(len)))
            }
        }
    }
}

impl AssemblerFile for GenericAssemblerFile {
    fn open(&mut self, check_only: bool) -> Result<(), FileError> {
        if self.handle.is_some() {
            return Ok(());
        }
        if self.closed {
            return Err(self.open_error("file was already closed"));
        }
        if check_only {
            // Dry validation: open, then undo any file we created ourselves.
            let existed = self.file_name.exists();
            let (file, _) = self.open_handle()?;
            drop(file);
            if !existed {
                let _ = fs::remove_file(&self.file_name);
            }
            return Ok(());
        }
        let (file, fixed_end) = self.open_handle()?;
        self.handle = Some(file);
        self.fixed_end = fixed_end;
        self.virtual_address = self.header_size;
        Ok(())
    }

    fn close(&mut self) {
        self.handle = None;
        self.closed = true;
    }

    fn is_open(&self) -> bool {
        self.handle.is_some()
    }

    fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        let name = self.file_name.clone();
        let handle = self.handle.as_mut().ok_or_else(|| FileError::Write {
            name: name.clone(),
            detail: "file is not open".to_string(),
        })?;
        handle.write_all(data).map_err(|err| FileError::Write {
            name,
            detail: err.to_string(),
        })?;
        self.virtual_address += data.len() as u64;
        Ok(())
    }

    fn virtual_address(&self) -> u64 {
        self.virtual_address
    }

    fn physical_address(&self) -> u64 {
        self.virtual_address - self.header_size
    }

    fn header_size(&self) -> u64 {
        self.header_size
    }

    fn seek_virtual(&mut self, address: u64) -> Result<(), FileError> {
        if address < self.header_size {
            return Err(FileError::SeekOutOfRange { target: address });
        }
        let physical = address - self.header_size;
        if let Some(end) = self.fixed_end {
            if physical > end {
                return Err(FileError::SeekOutOfRange { target: address });
            }
        }
        if let Some(handle) = self.handle.as_mut() {
            handle
                .seek(SeekFrom::Start(physical))
                .map_err(|err| FileError::Write {
                    name: self.file_name.clone(),
                    detail: err.to_string(),
                })?;
        }
        self.virtual_address = address;
        Ok(())
    }

    fn seek_physical(&mut self, address: u64) -> Result<(), FileError> {
        self.seek_virtual(address + self.header_size)
    }

    fn has_fixed_virtual_address(&self) -> bool {
        true
    }

    fn file_name(&self) -> &Path {
        &self.file_name
    }
}

/// Owns every registered output file; exactly one may be active.
pub struct FileManager {
    files: Vec<Box<dyn AssemblerFile>>,
    active: Option<usize>,
    endianness: Endianness,
}

impl Default for FileManager {
    fn default() -> Self {
        Self::new()
    }
}

impl FileManager {
    pub fn new() -> Self {
        Self {
            files: Vec::new(),
            active: None,
            endianness: Endianness::Little,
        }
    }

    /// Close any active file and drop the whole registered set. Used
    /// between independent assembly jobs.
    pub fn reset(&mut self) {
        self.close_file();
        self.files.clear();
    }

    pub fn set_endianness(&mut self, endianness: Endianness) {
        self.endianness = endianness;
    }

    pub fn endianness(&self) -> Endianness {
        self.endianness
    }

    /// Register a file without opening it. Returns its index for
    /// [`FileManager::open_file`].
    pub fn add_file(&mut self, file: Box<dyn AssemblerFile>) -> usize {
        self.files.push(file);
        self.files.len() - 1
    }

    /// Open a registered file, closing the previously active one first.
    /// With `check_only` the open is validated and rolled back; no file
    /// becomes active. On failure nothing is active either.
    pub fn open_file(&mut self, index: usize, check_only: bool) -> Result<(), FileError> {
        if self.active.is_some() {
            self.close_file();
        }
        let file = self.files.get_mut(index).ok_or(FileError::NoActiveFile)?;
        file.open(check_only)?;
        if !check_only {
            self.active = Some(index);
        }
        Ok(())
    }

    /// Close the active file; no-op when nothing is open.
    pub fn close_file(&mut self) {
        if let Some(index) = self.active.take() {
            self.files[index].close();
        }
    }

    pub fn has_open_file(&self) -> bool {
        self.active.is_some()
    }

    fn active_file(&self) -> Result<&dyn AssemblerFile, FileError> {
        let index = self.active.ok_or(FileError::NoActiveFile)?;
        Ok(self.files[index].as_ref())
    }

    fn active_file_mut(&mut self) -> Result<&mut Box<dyn AssemblerFile>, FileError> {
        let index = self.active.ok_or(FileError::NoActiveFile)?;
        Ok(&mut self.files[index])
    }

    pub fn write(&mut self, data: &[u8]) -> Result<(), FileError> {
        self.active_file_mut()?.write(data)
    }

    pub fn write_u8(&mut self, value: u8) -> Result<(), FileError> {
        self.write(&[value])
    }

    pub fn write_u16(&mut self, value: u16) -> Result<(), FileError> {
        let bytes = match self.endianness {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.write(&bytes)
    }

    pub fn write_u32(&mut self, value: u32) -> Result<(), FileError> {
        let bytes = match self.endianness {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.write(&bytes)
    }

    pub fn write_u64(&mut self, value: u64) -> Result<(), FileError> {
        let bytes = match self.endianness {
            Endianness::Big => value.to_be_bytes(),
            Endianness::Little => value.to_le_bytes(),
        };
        self.write(&bytes)
    }

    pub fn virtual_address(&self) -> Result<u64, FileError> {
        Ok(self.active_file()?.virtual_address())
    }

    pub fn physical_address(&self) -> Result<u64, FileError> {
        Ok(self.active_file()?.physical_address())
    }

    pub fn header_size(&self) -> Result<u64, FileError> {
        Ok(self.active_file()?.header_size())
    }

    pub fn seek_virtual(&mut self, address: u64) -> Result<(), FileError> {
        self.active_file_mut()?.seek_virtual(address)
    }

    pub fn seek_physical(&mut self, address: u64) -> Result<(), FileError> {
        self.active_file_mut()?.seek_physical(address)
    }

    /// Advance the virtual cursor without writing, leaving a gap to be
    /// patched later.
    pub fn advance_memory(&mut self, bytes: u64) -> Result<(), FileError> {
        let current = self.virtual_address()?;
        self.seek_virtual(current + bytes)
    }
}
