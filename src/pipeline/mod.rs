//! Pipeline stages from photo to share card.
//!
//! Each submodule implements one transformation step and is testable on
//! its own.
//!
//! ## Data Flow
//!
//! ```text
//! capture ──▶ encode ──▶ llm ──▶ parse          compose
//! (decode)    (bound,    (VLM,   (fences,  ···▶ (gradient,
//!              JPEG)     timeout) JSON)          text, PNG)
//! ```
//!
//! 1. [`capture`]: decode a file, drop payload or camera frame
//! 2. [`encode`]: bound to `max_dimension` and JPEG-encode for upload
//! 3. [`llm`]: the only stage with network I/O; one request per
//!    attempt, raced against the timeout
//! 4. [`parse`]: strip code fences and deserialise the report
//! 5. [`compose`]: paint the share card from the photo and the shown value

pub mod capture;
pub mod compose;
pub mod encode;
pub mod llm;
pub mod parse;
