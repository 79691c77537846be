use std::fs::{self, File};
use std::io;
use std::path::Path;

use sha2::{Digest, Sha256};

const MAX_HASH_SIZE: u64 = 64 * 1024 * 1024; // 64 MiB

/// SHA-256 of a file as lowercase hex.
pub fn file_hash(path: &Path) -> io::Result<String> {
    let mut file = File::open(path)?;
    let mut hasher = Sha256::new();
    io::copy(&mut file, &mut hasher)?;
    Ok(hex::encode(hasher.finalize()))
}

/// Whether two files hold the same bytes. Sizes are compared first; files
/// over 64 MiB or unreadable files are never reported identical.
pub fn same_content(a: &Path, b: &Path) -> bool {
    match fs::metadata(a) {
        Ok(m) if m.len() <= MAX_HASH_SIZE => identical(a, b),
        _ => false,
    }
}

/// Byte equality without a size cap, for confirming one specific pair.
pub fn identical(a: &Path, b: &Path) -> bool {
    let (Ok(ma), Ok(mb)) = (fs::metadata(a), fs::metadata(b)) else {
        return false;
    };
    if ma.len() != mb.len() {
        return false;
    }
    match (file_hash(a), file_hash(b)) {
        (Ok(ha), Ok(hb)) => ha == hb,
        _ => false,
    }
}
