use std::fs;
use std::path::Path;

use anyhow::{bail, Context, Result};

/// Read the named file under `root`. Directories are not transferable.
pub fn read(root: &Path, name: &str) -> Result<Vec<u8>> {
    let path = root.join(name);

    let meta = fs::metadata(&path).with_context(|| format!("couldn't access {}", path.display()))?;
    if meta.is_dir() {
        bail!("cannot transfer directories: {}", path.display());
    }

    fs::read(&path).with_context(|| format!("couldn't read {}", path.display()))
}

/// Write `data` under `root` as `name`, creating intermediate directories.
pub fn save(root: &Path, name: &str, data: &[u8]) -> Result<()> {
    let path = root.join(name);

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("couldn't create directory {}", parent.display()))?;
    }

    fs::write(&path, data).with_context(|| format!("couldn't write {}", path.display()))
}
