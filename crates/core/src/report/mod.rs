//! Report assembly and rendering.

mod assembler;
mod render;
mod types;

pub use assembler::assemble;
pub use render::{render_subject, render_text};
pub use types::{Report, ReportCounts, ReportEntry, ReportSection};
