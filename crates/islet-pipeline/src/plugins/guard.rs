//! Request validation.

use islet_config::KernelConfig;
use islet_core::Exception;

use crate::error::{PipelineError, PipelineResult};
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Rejects malformed or oversized requests before anything is loaded.
#[derive(Debug, Default)]
pub struct GuardPlugin;

impl Plugin for GuardPlugin {
    fn name(&self) -> &'static str {
        "guard"
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        hooks.on_validate("guard", |ctx| {
            Box::pin(async move {
                let max_size = ctx.config.max_size;
                let length = ctx.request.code.chars().count();
                if length > max_size {
                    return Err(PipelineError::rejected(
                        Exception::PayloadTooLarge,
                        format!("code length {length} exceeds limit {max_size}"),
                    ));
                }
                if ctx.request.entry.is_empty() {
                    return Err(PipelineError::rejected(
                        Exception::ValidationError,
                        "entry must be a non-empty string",
                    ));
                }
                if ctx.request.timeout == Some(0) {
                    return Err(PipelineError::rejected(
                        Exception::ValidationError,
                        "timeout must be a positive number of milliseconds",
                    ));
                }
                Ok(ctx)
            })
        });
        Ok(())
    }
}
