//! Pipeline stages for image-to-JSON extraction.
//!
//! ## Data Flow
//!
//! ```text
//!                 ┌──▶ encode ──▶ vision (provider | sse) ──┐
//! input ──────────┤                                         ├──▶ sanitize
//! (path/dir/URL)  └──▶ detectors ──▶ ocr (structure) ───────┘
//! ```
//!
//! 1. [`input`]      resolve paths, directories and URLs to sniffed images
//! 2. [`encode`]     base64-wrap the image bytes for a multimodal message
//! 3. [`vision`]     single-shot or streamed vision call
//! 4. [`sse`]        OpenAI-compatible event-stream transport
//! 5. [`ocr`]        local detection, then JSON-mode structuring
//! 6. [`detectors`]  tesseract / oar-ocr text detectors
//! 7. [`sanitize`]   fence stripping and JSON parsing of the reply

pub mod detectors;
pub mod encode;
pub mod input;
pub mod ocr;
pub mod sanitize;
pub mod sse;
pub mod vision;
