//! Daily CSV logs kept in a host directory

use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use log::info;
use lorabridge_core::storage::{LogDestination, LogStorage};

/// Log storage backed by `<dir>/sensors_YYYY-MM-DD.csv` files
pub struct DirStorage {
    dir: PathBuf,
    available: bool,
}

impl DirStorage {
    /// Use `dir`, creating it if needed. Storage is reported unavailable when
    /// the directory cannot be created.
    pub fn open(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        let available = match fs::create_dir_all(&dir) {
            Ok(()) => true,
            Err(e) => {
                log::error!(" Failed to create {}: {}", dir.display(), e);
                false
            }
        };
        if available {
            info!(" Logging to directory {}", dir.display());
        }
        Self { dir, available }
    }

    /// Storage that behaves like a missing card
    pub fn missing(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            available: false,
        }
    }

    pub fn set_available(&mut self, available: bool) {
        self.available = available;
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn file_path(&self, dest: &LogDestination) -> PathBuf {
        self.dir.join(dest.file_name().as_str())
    }

    fn log_files(&self) -> io::Result<Vec<(LogDestination, u64)>> {
        let mut logs = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(dest) = name.to_str().and_then(LogDestination::from_file_name) else {
                continue;
            };
            logs.push((dest, entry.metadata()?.len()));
        }
        logs.sort();
        Ok(logs)
    }
}

impl LogStorage for DirStorage {
    type Error = io::Error;

    fn is_available(&self) -> bool {
        self.available
    }

    fn exists(&self, dest: &LogDestination) -> Result<bool, Self::Error> {
        match fs::metadata(self.file_path(dest)) {
            Ok(meta) => Ok(meta.is_file()),
            Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e),
        }
    }

    fn append(&mut self, dest: &LogDestination, data: &[u8]) -> Result<(), Self::Error> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(self.file_path(dest))?;
        file.write_all(data)
    }

    fn read_at(
        &self,
        dest: &LogDestination,
        offset: u64,
        buf: &mut [u8],
    ) -> Result<usize, Self::Error> {
        let mut file = File::open(self.file_path(dest))?;
        file.seek(SeekFrom::Start(offset))?;
        file.read(buf)
    }

    fn log_len(&self, dest: &LogDestination) -> Result<u64, Self::Error> {
        fs::metadata(self.file_path(dest)).map(|meta| meta.len())
    }

    fn find_any_log(&self) -> Result<Option<LogDestination>, Self::Error> {
        Ok(self.log_files()?.first().map(|(dest, _)| *dest))
    }

    fn used_bytes(&self) -> Option<u64> {
        self.log_files()
            .ok()
            .map(|logs| logs.iter().map(|(_, len)| len).sum())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lorabridge_core::storage::count_entries;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("lorabridge-sim-{}-{}", name, std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        dir
    }

    #[test]
    fn test_append_and_read_back() {
        let dir = temp_dir("append");
        let mut storage = DirStorage::open(&dir);
        let dest = LogDestination::from_file_name("sensors_2024-03-10.csv").unwrap();

        assert!(!storage.exists(&dest).unwrap());
        storage.append(&dest, b"timestamp,temperature,humidity,soil_moisture,lux\r\n").unwrap();
        storage.append(&dest, b"2024-03-10 12:00:00,1.00,2.00,3,4.0\r\n").unwrap();

        assert!(storage.exists(&dest).unwrap());
        assert!(dir.join("sensors_2024-03-10.csv").is_file());
        assert_eq!(count_entries(&storage, &dest).unwrap(), 1);
        assert_eq!(storage.log_len(&dest).unwrap(), 87);

        let mut buf = [0u8; 9];
        assert_eq!(storage.read_at(&dest, 0, &mut buf).unwrap(), 9);
        assert_eq!(&buf, b"timestamp");

        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_find_any_log_skips_other_files() {
        let dir = temp_dir("find");
        let mut storage = DirStorage::open(&dir);
        fs::write(dir.join("settings.bin"), b"\x00").unwrap();
        assert_eq!(storage.find_any_log().unwrap(), None);

        let later = LogDestination::from_file_name("sensors_2024-03-11.csv").unwrap();
        let earlier = LogDestination::from_file_name("sensors_2024-03-09.csv").unwrap();
        storage.append(&later, b"x\r\n").unwrap();
        storage.append(&earlier, b"x\r\n").unwrap();
        assert_eq!(storage.find_any_log().unwrap(), Some(earlier));
        assert_eq!(storage.used_bytes(), Some(6));

        fs::remove_dir_all(&dir).unwrap();
    }
}
