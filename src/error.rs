//! 錯誤分類
//!
//! 元件層一律回傳 `SegmentError`，由 `kind()` 決定是否重試與結束碼

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use thiserror::Error;

pub type SegmentResult<T> = Result<T, SegmentError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Validation,
    Io,
    Decode,
    Network,
    Unrecoverable,
}

impl ErrorKind {
    /// 批次呼叫端用來區分可重試與致命錯誤的結束碼
    #[must_use]
    pub const fn exit_code(self) -> u8 {
        match self {
            Self::Validation => 2,
            Self::Io => 3,
            Self::Network => 4,
            Self::Decode | Self::Unrecoverable => 1,
        }
    }

    #[must_use]
    pub const fn is_retryable(self) -> bool {
        matches!(self, Self::Network)
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Validation => "validation",
            Self::Io => "io",
            Self::Decode => "decode",
            Self::Network => "network",
            Self::Unrecoverable => "unrecoverable",
        };
        f.write_str(name)
    }
}

#[derive(Debug, Error)]
pub enum SegmentError {
    #[error("輸入驗證失敗: {0}")]
    Validation(String),

    #[error("檔案存取失敗 {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("無法讀取媒體檔案 {}: {message}", .path.display())]
    UnreadableMedia { path: PathBuf, message: String },

    #[error("第 {index} 幀解碼失敗: {message}")]
    Decode { index: u64, message: String },

    #[error("網路操作失敗: {0}")]
    Network(String),

    #[error("{operation} 重試 {attempts} 次後仍失敗: {last}")]
    RetriesExhausted {
        operation: String,
        attempts: u32,
        last: Box<SegmentError>,
    },

    #[error("操作已取消")]
    Cancelled,

    #[error("{0}")]
    Unrecoverable(String),
}

impl SegmentError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    pub fn unreadable(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::UnreadableMedia {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn decode(index: u64, message: impl Into<String>) -> Self {
        Self::Decode {
            index,
            message: message.into(),
        }
    }

    pub fn network(message: impl Into<String>) -> Self {
        Self::Network(message.into())
    }

    pub fn unrecoverable(message: impl Into<String>) -> Self {
        Self::Unrecoverable(message.into())
    }

    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Validation(_) => ErrorKind::Validation,
            Self::Io { .. } | Self::UnreadableMedia { .. } => ErrorKind::Io,
            Self::Decode { .. } => ErrorKind::Decode,
            Self::Network(_) => ErrorKind::Network,
            Self::RetriesExhausted { .. } | Self::Cancelled | Self::Unrecoverable(_) => {
                ErrorKind::Unrecoverable
            }
        }
    }

    /// 重試耗盡時以最後一次錯誤的類別決定結束碼
    #[must_use]
    pub fn exit_code(&self) -> u8 {
        match self {
            Self::RetriesExhausted { last, .. } => last.exit_code(),
            other => other.kind().exit_code(),
        }
    }

    /// 錯誤根源是否為網路問題（包含重試耗盡）
    #[must_use]
    pub fn is_network_rooted(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::RetriesExhausted { last, .. } => last.is_network_rooted(),
            _ => false,
        }
    }
}
