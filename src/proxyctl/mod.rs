//! C8/C9/C10: everything that touches the proxy process and its on-disk
//! and runtime-API surface (design doc §4.8, §4.9, §4.10).

pub mod files;
pub mod process;
pub mod reload;
pub mod runtime_api;
