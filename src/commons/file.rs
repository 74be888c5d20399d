//! Helpers for working with files.

use std::{fmt, fs, io};
use std::fs::File;
use std::io::Write;
use std::path::{Path, PathBuf};
use log::trace;


/// Creates a dir and all its parents if needed.
pub fn create_dir_all(dir: &Path) -> Result<(), IoError> {
    if !dir.is_dir() {
        fs::create_dir_all(dir).map_err(|e| {
            IoError::new(
                format!("could not create dir: {}", dir.display()), e
            )
        })?;
    }
    Ok(())
}

/// Creates a sub dir if needed, returns the full path to it.
pub fn sub_dir(base: &Path, name: &str) -> Result<PathBuf, IoError> {
    let full_path = base.join(name);
    create_dir_all(&full_path)?;
    Ok(full_path)
}

pub fn remove_dir_all(dir: &Path) -> Result<(), IoError> {
    if dir.exists() {
        fs::remove_dir_all(dir).map_err(|e| {
            IoError::new(
                format!("could not remove dir: {}", dir.display()), e
            )
        })?;
    }
    Ok(())
}

/// Creates a file, creating parent dirs as needed.
pub fn create_file_with_path(path: &Path) -> Result<File, IoError> {
    if !path.exists() {
        if let Some(parent) = path.parent() {
            trace!("Creating path: {}", parent.display());
            create_dir_all(parent)?;
        }
    }
    File::create(path).map_err(|e| {
        IoError::new(format!("could not create file: {}", path.display()), e)
    })
}

/// Saves a file, creating parent dirs as needed.
pub fn save(content: &[u8], full_path: &Path) -> Result<(), IoError> {
    let mut f = create_file_with_path(full_path)?;
    f.write_all(content).map_err(|e| {
        IoError::new(format!("could not write to: {}", full_path.display()), e)
    })?;
    trace!("Saved file: {}", full_path.display());
    Ok(())
}

pub fn read(path: &Path) -> Result<Vec<u8>, IoError> {
    fs::read(path).map_err(|e| {
        IoError::new(format!("could not read: {}", path.display()), e)
    })
}

pub fn read_to_string(path: &Path) -> Result<String, IoError> {
    fs::read_to_string(path).map_err(|e| {
        IoError::new(format!("could not read: {}", path.display()), e)
    })
}

pub fn delete_file(full_path: &Path) -> Result<(), IoError> {
    trace!("Removing file: {}", full_path.display());
    fs::remove_file(full_path).map_err(|e| {
        IoError::new(
            format!("could not remove file: {}", full_path.display()), e
        )
    })
}


//------------ IoError -------------------------------------------------------

/// An I/O error with some context about what was attempted.
#[derive(Debug)]
pub struct IoError {
    context: String,
    cause: io::Error,
}

impl IoError {
    pub fn new(context: String, cause: io::Error) -> Self {
        IoError { context, cause }
    }

    pub fn kind(&self) -> io::ErrorKind {
        self.cause.kind()
    }
}

impl fmt::Display for IoError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}, cause: {}", self.context, self.cause)
    }
}

impl std::error::Error for IoError {}


//============ Tests =========================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn save_creates_parents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a/b/c.txt");
        save(b"hello", &path).unwrap();
        assert_eq!(read_to_string(&path).unwrap(), "hello");
        delete_file(&path).unwrap();
        assert!(read(&path).is_err());
    }
}
