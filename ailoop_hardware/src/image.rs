//! Flash image files for simulated power cycles across process runs.
use std::{fs, io::Write, path::Path};

/// Replace `path` with `bytes` via a temporary sibling and a rename, so a
/// crash never leaves a half-written image behind.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> std::io::Result<()> {
    let tmp = path.with_extension("new");
    {
        let mut f = fs::File::create(&tmp)?;
        f.write_all(bytes)?;
        f.sync_all()?;
    }
    fs::rename(tmp, path)
}

pub fn read_image(path: &Path) -> std::io::Result<Vec<u8>> {
    fs::read(path)
}
