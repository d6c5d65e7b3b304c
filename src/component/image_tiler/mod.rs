//! 長圖切割元件
//!
//! 將整頁截圖切成固定高度、上下重疊的切片

mod main;
mod tile_planner;

pub use main::{ImageTiler, TilingOutcome};
pub use tile_planner::{TilePlacement, plan_tiles};
