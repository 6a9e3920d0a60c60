use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

const READ_BUFFER_LENGTH: usize = 64 * 1024;

/// Streams the file through BLAKE3 and returns the lowercase hex digest.
pub fn content_digest(file: &Path) -> io::Result<String> {
    let mut f = File::open(file)?;
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; READ_BUFFER_LENGTH];
    loop {
        let read = f.read(&mut buffer)?;
        if read == 0 {
            break;
        }
        hasher.update(&buffer[..read]);
    }
    Ok(hasher.finalize().to_hex().to_string())
}

pub fn digest_bytes(data: &[u8]) -> String {
    blake3::hash(data).to_hex().to_string()
}
