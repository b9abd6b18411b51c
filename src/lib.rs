//! Firmpatch: Intel-HEX firmware image inspection and patching.
//!
//! The crate provides:
//! - An Intel-HEX record codec (`hex`)
//! - A cell-aware memory model of a CPU's regions (`memory`)
//! - Typed variables stored at fixed addresses (`variable`)
//! - Structural diffs between two images (`diff`)
//! - CPU catalog, meta files and file helpers (`cpu`, `config`, `io`)
//! - An optional CLI (`cli` feature)
//!
//! # Quick Start
//!
//! ```no_run
//! use firmpatch::hex::EncodeOptions;
//! use firmpatch::variable::Value;
//!
//! let mut image = firmpatch::io::load_image("firmware.hex", "meta.yaml").unwrap();
//! image.set("voltage", Some(&Value::Integer(230))).unwrap();
//! let lines = image.to_hex(&EncodeOptions::default()).unwrap();
//! firmpatch::io::write_hex_lines("patched.hex", &lines).unwrap();
//! ```

pub mod config;
pub mod cpu;
pub mod diff;
pub mod error;
pub mod hex;
pub mod image;
pub mod io;
pub mod memory;
pub mod variable;

#[cfg(feature = "cli")]
pub mod cli;

pub use error::{Error, ErrorKind, Result};
pub use image::Image;
