//! Module materialization.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;

use islet_config::KernelConfig;

use crate::error::PipelineResult;
use crate::hooks::HookRegistry;
use crate::plugin::Plugin;

/// Encodes the request's code as a data URL identifying the loadable
/// module.
#[derive(Debug, Default)]
pub struct LoaderPlugin;

/// Build the data URL for a snippet.
#[must_use]
pub fn data_url(code: &str) -> String {
    format!("data:text/plain;base64,{}", STANDARD.encode(code))
}

impl Plugin for LoaderPlugin {
    fn name(&self) -> &'static str {
        "loader"
    }

    fn pre(&self) -> &'static [&'static str] {
        &["guard"]
    }

    fn setup(&self, hooks: &mut HookRegistry, _config: &KernelConfig) -> PipelineResult<()> {
        hooks.on_load("loader", |mut ctx| {
            Box::pin(async move {
                ctx.url = Some(data_url(&ctx.request.code));
                Ok(ctx)
            })
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_urls_are_stable_and_decodable() {
        let url = data_url("fn default() { 1 }");
        let encoded = url.strip_prefix("data:text/plain;base64,").unwrap();
        let decoded = STANDARD.decode(encoded).unwrap();
        assert_eq!(decoded, b"fn default() { 1 }");
    }
}
