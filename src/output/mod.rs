// Output module
pub mod table;

pub use table::{render_report, report_json};
