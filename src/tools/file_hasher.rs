use crate::error::{SegmentError, SegmentResult};
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;

const BUFFER_SIZE: usize = 4 * 1024 * 1024; // 4MB buffer

/// 計算檔案的 BLAKE3 雜湊（十六進位字串）
pub fn calculate_file_hash(path: &Path) -> SegmentResult<String> {
    let file = File::open(path).map_err(|e| SegmentError::io(path, e))?;
    let mut reader = BufReader::with_capacity(BUFFER_SIZE, file);
    let mut hasher = blake3::Hasher::new();
    let mut buffer = vec![0u8; BUFFER_SIZE];

    loop {
        let bytes_read = reader
            .read(&mut buffer)
            .map_err(|e| SegmentError::io(path, e))?;
        if bytes_read == 0 {
            break;
        }
        hasher.update(&buffer[..bytes_read]);
    }

    Ok(hasher.finalize().to_hex().to_string())
}

/// 取雜湊前 8 碼作為短識別碼
pub fn short_file_digest(path: &Path) -> SegmentResult<String> {
    let mut hash = calculate_file_hash(path)?;
    hash.truncate(8);
    Ok(hash)
}

#[must_use]
pub fn short_text_digest(text: &str) -> String {
    let mut hash = blake3::hash(text.as_bytes()).to_hex().to_string();
    hash.truncate(8);
    hash
}
