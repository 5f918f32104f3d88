//! CLI support.
//!
//! Command dispatch lives in the binary; this module holds the pieces it
//! shares with the library.
//!
//! # Commands
//!
//! | Command | Description |
//! |---------|-------------|
//! | `run` | Run the full workflow for a request |
//! | `plan` | Show the decomposition and execution plan |
//! | `search` | Show the files retrieved for a query |
//! | `context` | Print the assembled prompt without running the agent |
//! | `sync` | Re-index files in the code graph |
//! | `config` | Show the effective configuration |
//!
//! # Example Usage
//!
//! ```bash
//! # Plan a multi-step change
//! taskscope plan "add a logout endpoint and write tests for it"
//!
//! # Run without questions or build
//! taskscope run --skip-clarification --skip-build-test "fix the login bug"
//! ```

mod output;
pub mod prompter;

pub use output::{
    OutputFormat, render_config, render_context, render_files, render_plan, render_result,
    render_sync, to_json,
};
pub use prompter::{NonInteractivePrompter, ScriptedPrompter, TerminalPrompter, UserPrompter};
