//! Terminal output with a plain fallback for CI and pipes
//!
//! Interactive terminals get `indicatif` spinners and symbols; everything
//! else gets bracketed status prefixes, one line per event.
//!
//! ```rust,ignore
//! use quill::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Building site...");
//! spinner.stop("Site published");
//! ui::key_value(&ctx, "Task", &task_id);
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    intro, key_value, key_value_status, outro_success, section, step_info, step_ok, step_record,
    step_warn,
};
pub use progress::TaskSpinner;
