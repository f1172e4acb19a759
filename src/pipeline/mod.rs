//! Per-stage building blocks.
//!
//! ## Data Flow
//!
//! ```text
//! scan ──▶ converter (stages 1, 2) ──▶ cleanup + headings (stage 3)
//! ```
//!
//! 1. [`scan`]: list a stage's input folder and pair each file with
//!    its destination
//! 2. [`converter`]: the [`converter::Converter`] trait and the
//!    subprocess-backed Acrobat and pandoc adapters
//! 3. [`headings`]: classify plain lines as section titles and rewrite
//!    them as Markdown headings; pure and total over its input
//! 4. [`cleanup`]: the stage-3 pass sequence, exposed as a converter so
//!    the fan-out runner drives it like any other tool

pub mod cleanup;
pub mod converter;
pub mod headings;
pub mod scan;
