mod ffprobe_info;
mod file_hasher;
pub mod file_naming;
mod path_validator;
mod process;

pub use ffprobe_info::probe_media;
pub use file_hasher::{calculate_file_hash, short_file_digest, short_text_digest};
pub use file_naming::{frame_file_name, tile_file_name};
pub use path_validator::{ensure_directory_exists, validate_directory_exists, validate_file_exists};
pub use process::{ProcessError, ProcessOutput, run_with_timeout};
