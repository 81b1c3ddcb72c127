//! Compile-time defaults
//!
//! Generated by `build.rs`; set `DD_CONFIG_RS=/path/to/file.rs` at build
//! time to override any of them.

include!(concat!(env!("OUT_DIR"), "/dd_merged_config.rs"));
