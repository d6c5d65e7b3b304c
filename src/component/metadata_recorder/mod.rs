//! 擷取結果描述檔元件
//!
//! 記錄來源資訊、擷取設定、命名規則與每個輸出檔案的大小及 BLAKE3 雜湊

mod main;
mod manifest;

pub use main::{MetadataRecorder, VerificationReport};
pub use manifest::{
    BOUNDARY_POLICY, ExtractionManifest, ExtractionSettings, MANIFEST_VERSION, NamingConvention,
    NamingField, ProducedFile, SourceDescriptor,
};
