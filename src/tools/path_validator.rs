use crate::error::{SegmentError, SegmentResult};
use std::path::Path;

/// 確認輸入是存在的檔案，否則回傳驗證錯誤
pub fn validate_file_exists(path: &Path) -> SegmentResult<()> {
    if !path.exists() {
        return Err(SegmentError::validation(format!(
            "路徑不存在: {}",
            path.display()
        )));
    }
    if !path.is_file() {
        return Err(SegmentError::validation(format!(
            "路徑不是檔案: {}",
            path.display()
        )));
    }
    Ok(())
}

pub fn validate_directory_exists(path: &Path) -> SegmentResult<()> {
    if !path.exists() {
        return Err(SegmentError::validation(format!(
            "路徑不存在: {}",
            path.display()
        )));
    }
    if !path.is_dir() {
        return Err(SegmentError::validation(format!(
            "路徑不是資料夾: {}",
            path.display()
        )));
    }
    Ok(())
}

pub fn ensure_directory_exists(path: &Path) -> SegmentResult<()> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| SegmentError::io(path, e))?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_validate_file_exists() {
        let dir = tempdir().unwrap();
        let file = dir.path().join("clip.mp4");
        std::fs::write(&file, b"x").unwrap();

        assert!(validate_file_exists(&file).is_ok());
        assert!(matches!(
            validate_file_exists(dir.path()),
            Err(SegmentError::Validation(_))
        ));
        assert!(validate_file_exists(&dir.path().join("missing.mp4")).is_err());
    }

    #[test]
    fn test_ensure_directory_exists_is_recursive() {
        let dir = tempdir().unwrap();
        let nested = dir.path().join("a").join("b");
        ensure_directory_exists(&nested).unwrap();
        assert!(nested.is_dir());
        assert!(validate_directory_exists(&nested).is_ok());
    }
}
