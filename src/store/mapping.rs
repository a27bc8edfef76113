use std::fs::OpenOptions;
use std::path::Path;

use anyhow::{Context as _, Result, bail};
use memmap2::{Mmap, MmapMut, MmapOptions};

/// Opens (creating if needed) `path` read-write, sizes it to exactly `len` bytes and maps it.
///
/// With `truncate` the previous contents are discarded first, otherwise they are kept and
/// the file is only extended (zero-filled) or cut to `len`.
pub(crate) fn map_writable(path: &Path, len: usize, truncate: bool) -> Result<MmapMut> {
    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(truncate)
        .open(path)
        .with_context(|| format!("failed to open store file: {}", path.display()))?;

    file.set_len(len as u64)
        .with_context(|| format!("failed to size store file to {len} bytes: {}", path.display()))?;

    // SAFETY: the file was just sized to `len`. Other processes may write to the same file;
    // readers of this mapping accept torn reads (see the module docs).
    let mmap = unsafe {
        MmapOptions::new()
            .len(len)
            .map_mut(&file)
            .with_context(|| format!("failed to map store file: {}", path.display()))?
    };

    Ok(mmap)
}

/// Maps an existing store file read-only without resizing it.
pub(crate) fn map_readonly(path: &Path, len: usize) -> Result<Mmap> {
    let file = OpenOptions::new()
        .read(true)
        .open(path)
        .with_context(|| format!("failed to open store file: {}", path.display()))?;

    let actual = file
        .metadata()
        .with_context(|| format!("failed to stat store file: {}", path.display()))?
        .len();
    if actual < len as u64 {
        bail!(
            "store file too short: expected at least {len} bytes, got {actual}: {}",
            path.display()
        );
    }

    // SAFETY: length checked above; the writer never shrinks the file while mapped.
    let mmap = unsafe {
        MmapOptions::new()
            .len(len)
            .map(&file)
            .with_context(|| format!("failed to map store file: {}", path.display()))?
    };

    Ok(mmap)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extends_short_file_with_zeros() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [7u8; 4]).unwrap();

        let mmap = map_writable(&path, 16, false).unwrap();

        assert_eq!(&mmap[..4], &[7u8; 4]);
        assert!(mmap[4..].iter().all(|&b| b == 0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
    }

    #[test]
    fn truncate_discards_contents() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("log.bin");
        std::fs::write(&path, [7u8; 32]).unwrap();

        let mmap = map_writable(&path, 16, true).unwrap();

        assert!(mmap.iter().all(|&b| b == 0));
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 16);
    }

    #[test]
    fn readonly_rejects_short_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("short.bin");
        std::fs::write(&path, [0u8; 4]).unwrap();

        assert!(map_readonly(&path, 16).is_err());
    }

    #[test]
    fn readonly_sees_writer_updates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shared.bin");

        let mut writer = map_writable(&path, 8, false).unwrap();
        let reader = map_readonly(&path, 8).unwrap();

        writer[3] = 42;

        assert_eq!(reader[3], 42);
    }
}
