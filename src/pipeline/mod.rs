//! Pipeline stages for page-image-to-article extraction.
//!
//! Each submodule implements one transformation step and is tested on its
//! own; [`crate::extract`] wires them together.
//!
//! ## Data Flow
//!
//! ```text
//! archive ──▶ encode ──▶ llm ──▶ parse ──▶ normalize
//!  (zip)     (base64)   (HTTP)   (JSON)    (records)
//! ```
//!
//! 1. [`archive`]   - enumerate qualifying image entries, lazily, in order
//! 2. [`encode`]    - base64-wrap the bytes and pick a MIME type
//! 3. [`llm`]       - the one stage with network I/O; a single attempt per image
//! 4. [`parse`]     - fence stripping and JSON recovery on the raw answer
//! 5. [`normalize`] - fill defaults and assign ids; never fails

pub mod archive;
pub mod encode;
pub mod llm;
pub mod normalize;
pub mod parse;
