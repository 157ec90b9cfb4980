//! Built-in tools.

mod call_subordinate;
mod response;
mod unknown;

pub use call_subordinate::CallSubordinateTool;
pub use response::ResponseTool;
pub use unknown::UnknownTool;
