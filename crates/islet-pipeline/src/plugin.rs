//! Plugin records and their topological ordering.

use std::collections::HashMap;
use std::sync::Arc;

use islet_config::KernelConfig;

use crate::error::{PipelineError, PipelineResult};
use crate::hooks::HookRegistry;

/// A pipeline plugin: ordering constraints plus a setup that taps the
/// hook chains. Plain records, no inheritance.
pub trait Plugin: Send + Sync {
    /// Unique plugin name.
    fn name(&self) -> &'static str;

    /// Plugins that must exist in the set and be set up before this one.
    fn required(&self) -> &'static [&'static str] {
        &[]
    }

    /// Plugins set up before this one, when present.
    fn pre(&self) -> &'static [&'static str] {
        &[]
    }

    /// Plugins set up after this one, when present.
    fn post(&self) -> &'static [&'static str] {
        &[]
    }

    /// Tap the hook chains.
    ///
    /// # Errors
    ///
    /// A setup failure aborts pipeline assembly.
    fn setup(&self, hooks: &mut HookRegistry, config: &KernelConfig) -> PipelineResult<()>;
}

/// Order plugins so every `pre`/`required` runs earlier and every `post`
/// runs later, keeping declaration order among unconstrained peers.
///
/// # Errors
///
/// [`PipelineError::MissingPlugin`] for an absent requirement and
/// [`PipelineError::Cycle`] when the constraints cannot be satisfied.
pub fn sort_plugins(plugins: Vec<Arc<dyn Plugin>>) -> PipelineResult<Vec<Arc<dyn Plugin>>> {
    let index: HashMap<&str, usize> = plugins
        .iter()
        .enumerate()
        .map(|(position, plugin)| (plugin.name(), position))
        .collect();

    // edges[a] contains b  <=>  a must be set up before b
    let mut edges: Vec<Vec<usize>> = vec![Vec::new(); plugins.len()];
    let mut indegree: Vec<usize> = vec![0; plugins.len()];

    for (position, plugin) in plugins.iter().enumerate() {
        for dep in plugin.required() {
            let Some(&dep_position) = index.get(dep) else {
                return Err(PipelineError::MissingPlugin {
                    plugin: plugin.name().to_string(),
                    required: (*dep).to_string(),
                });
            };
            edges[dep_position].push(position);
            indegree[position] = indegree[position].saturating_add(1);
        }
        for dep in plugin.pre() {
            if let Some(&dep_position) = index.get(dep) {
                edges[dep_position].push(position);
                indegree[position] = indegree[position].saturating_add(1);
            }
        }
        for succ in plugin.post() {
            if let Some(&succ_position) = index.get(succ) {
                edges[position].push(succ_position);
                indegree[succ_position] = indegree[succ_position].saturating_add(1);
            }
        }
    }

    // Kahn's algorithm, always taking the earliest-declared ready plugin
    // so unconstrained peers keep their declaration order.
    let mut order = Vec::with_capacity(plugins.len());
    let mut placed = vec![false; plugins.len()];
    while order.len() < plugins.len() {
        let Some(next) = (0..plugins.len())
            .find(|&candidate| !placed[candidate] && indegree[candidate] == 0)
        else {
            return Err(PipelineError::Cycle);
        };
        placed[next] = true;
        for &succ in &edges[next] {
            indegree[succ] = indegree[succ].saturating_sub(1);
        }
        order.push(Arc::clone(&plugins[next]));
    }
    Ok(order)
}
