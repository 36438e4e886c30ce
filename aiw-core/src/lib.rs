pub mod command;
pub mod error;
pub mod validation;

pub use command::{is_tool_installed, run_checked, run_command, shell_quote, CommandOutput};
pub use error::{CoreError, Result};
pub use validation::{slugify, validate_workspace_name, MAX_WORKSPACE_NAME_LEN};
