//! Final output formatting and audit logging.

use tracing::info;

use islet_config::KernelConfig;
use islet_core::{LogEntry, LogLevel};

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Entries retained in a formatted output, matching the wait buffer's cap.
const MAX_OUTPUT_LOGS: usize = 1000;

/// Bounds the final log list and, when auditing is on, logs one line per
/// response with tools, permission summary, and duration.
#[derive(Debug, Default)]
pub struct LoggerPlugin;

impl Plugin for LoggerPlugin {
    fn name(&self) -> &'static str {
        "logger"
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        hooks.on_format("logger", |mut ctx| {
            Box::pin(async move {
                if let Some(output) = ctx.output.as_mut() {
                    if output.logs.len() > MAX_OUTPUT_LOGS {
                        let dropped = output.logs.len().saturating_sub(MAX_OUTPUT_LOGS);
                        output.logs.truncate(MAX_OUTPUT_LOGS);
                        output.logs.push(LogEntry::new(
                            LogLevel::Warn,
                            format!("{dropped} log entr(ies) dropped at format"),
                        ));
                    }

                    if ctx.config.audit {
                        let tools: Vec<&str> = ctx
                            .tools
                            .as_ref()
                            .map(|selection| {
                                selection.names.iter().map(String::as_str).collect()
                            })
                            .unwrap_or_default();
                        let detection = ctx
                            .permissions
                            .as_ref()
                            .map(islet_permissions::detect)
                            .unwrap_or_default();
                        info!(
                            ok = output.ok,
                            duration_ms = output.duration,
                            tools = ?tools,
                            wild = detection.wild,
                            hosts = detection.hosts,
                            "request served"
                        );
                    }
                }
                Ok(ctx)
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::manager::PipelineManager;
    use islet_core::{ExecuteRequest, Output};
    use std::sync::Arc;

    struct NoisyExecute;

    impl Plugin for NoisyExecute {
        fn name(&self) -> &'static str {
            "noisy"
        }
        fn setup(
            &self,
            hooks: &mut HookRegistry,
            _config: &KernelConfig,
        ) -> PipelineResult<()> {
            hooks.on_execute("noisy", |mut ctx| {
                Box::pin(async move {
                    let logs = (0..1500)
                        .map(|i| LogEntry::new(LogLevel::Log, format!("line {i}")))
                        .collect();
                    ctx.output = Some(Output::success(None, logs, 1));
                    Ok(ctx)
                })
            });
            Ok(())
        }
    }

    #[tokio::test]
    async fn format_bounds_runaway_log_lists() {
        let manager = PipelineManager::build(
            Arc::new(KernelConfig::default()),
            vec![Arc::new(NoisyExecute), Arc::new(LoggerPlugin)],
        )
        .unwrap();
        let output = manager.execute(ExecuteRequest::new("code")).await;
        assert_eq!(output.logs.len(), MAX_OUTPUT_LOGS + 1);
        assert_eq!(output.logs.last().unwrap().level, LogLevel::Warn);
    }
}
