//! Build command - run the pipeline in the foreground

use super::site_pipeline;
use crate::audit::{AuditEvent, AuditLog};
use crate::config::Config;
use crate::error::{QuillError, QuillResult};
use crate::ui::{self, TaskSpinner, UiContext};

/// Execute the build command
pub async fn execute(config: &Config) -> QuillResult<()> {
    let ctx = UiContext::detect();
    let audit = AuditLog::new(config);
    let pipeline = site_pipeline(config);

    ui::intro(&ctx, "Quill build");

    let mut spinner = TaskSpinner::new(&ctx);
    spinner.start(&format!("Running {}", pipeline.step_names().join(" → ")));
    let result = pipeline.run().await;

    match result {
        Ok(steps) => {
            spinner.stop("Pipeline finished");
            for step in &steps {
                ui::step_record(&ctx, step);
            }
            audit
                .record(AuditEvent::BuildCompleted { steps: steps.len() })
                .await;
            ui::outro_success(&ctx, "Site built and published");
            Ok(())
        }
        Err(e) => {
            spinner.stop_error("Pipeline interrupted");
            if let QuillError::BuildFailed {
                ref step,
                ref reason,
                ref steps,
            } = e
            {
                for record in steps {
                    ui::step_record(&ctx, record);
                }
                audit
                    .record(AuditEvent::BuildFailed {
                        step: step.clone(),
                        reason: reason.clone(),
                    })
                    .await;
            }
            Err(e)
        }
    }
}
