//! Built-in extensions.

mod history_window;
mod system_prompt;

pub use history_window::HistoryWindow;
pub use system_prompt::SystemPrompt;
