//! Boot-time plugin manifest loading.
//!
//! Every sub-directory of the plugin base path holding a `package.json` is a
//! plugin. Its `trex.functions.roles` and `trex.functions.scopes` sections are
//! merged into the [`PolicyStore`] one plugin at a time, in directory-name order.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::authz::{PolicyStore, RuleSpec};
use crate::config::ClientIdSubstitutions;

const MANIFEST_FILE: &str = "package.json";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PluginManifest {
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub trex: Option<TrexSection>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TrexSection {
    #[serde(default)]
    pub functions: Option<PolicyContributions>,
}

/// Authorization-relevant part of a plugin's function block.
///
/// Entries stay raw JSON here and are typed one at a time during
/// registration, so a single bad entry only rejects itself.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PolicyContributions {
    #[serde(default)]
    pub roles: Map<String, Value>,
    #[serde(default)]
    pub scopes: Vec<Value>,
}

impl PluginManifest {
    pub fn contributions(&self) -> Option<&PolicyContributions> {
        self.trex.as_ref().and_then(|t| t.functions.as_ref())
    }
}

/// What one plugin added to the store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PluginLoadSummary {
    pub plugin: String,
    pub rules_accepted: usize,
    pub rules_rejected: usize,
    pub roles_merged: usize,
    pub roles_rejected: usize,
}

/// Parses a manifest, reporting the JSON path of the first bad field.
pub fn load_manifest_str(raw: &str) -> anyhow::Result<PluginManifest> {
    let de = &mut serde_json::Deserializer::from_str(raw);
    serde_path_to_error::deserialize(de).map_err(|err| anyhow::anyhow!("invalid manifest at `{}`: {}", err.path(), err.inner()))
}

fn parse_entry<T: DeserializeOwned>(entry: &Value) -> Result<T, String> {
    serde_path_to_error::deserialize(entry).map_err(|err| format!("at `{}`: {}", err.path(), err.inner()))
}

/// Registers one manifest's roles and rules. Bad entries are logged and skipped.
pub fn register_manifest(
    plugin: &str,
    manifest: &PluginManifest,
    store: &PolicyStore,
    client_ids: &ClientIdSubstitutions,
) -> PluginLoadSummary {
    let mut summary = PluginLoadSummary {
        plugin: plugin.to_string(),
        ..Default::default()
    };

    let Some(contributions) = manifest.contributions() else {
        tracing::debug!(plugin = %plugin, "plugin contributes no policy");
        return summary;
    };

    for (role, raw) in &contributions.roles {
        let target = client_ids.remap(role);
        let scopes = match parse_entry::<Vec<String>>(raw) {
            Ok(scopes) => scopes,
            Err(err) => {
                summary.roles_rejected += 1;
                tracing::error!(plugin = %plugin, role = %target, error = %err, "rejected malformed role");
                continue;
            }
        };
        match store.register_role_scopes(target, &scopes) {
            Ok(added) => {
                summary.roles_merged += 1;
                tracing::debug!(plugin = %plugin, role = %target, added, "merged role scopes");
            }
            Err(err) => {
                summary.roles_rejected += 1;
                tracing::error!(plugin = %plugin, role = %target, error = %err, "rejected role");
            }
        }
    }

    let mut rules = Vec::with_capacity(contributions.scopes.len());
    for (index, raw) in contributions.scopes.iter().enumerate() {
        match parse_entry::<RuleSpec>(raw) {
            Ok(rule) => rules.push(rule),
            Err(err) => {
                summary.rules_rejected += 1;
                tracing::error!(plugin = %plugin, index, error = %err, "rejected malformed rule");
            }
        }
    }

    let report = store.register_rules(&rules);
    for err in &report.rejected {
        tracing::error!(plugin = %plugin, error = %err, "rejected rule");
    }
    summary.rules_accepted = report.accepted;
    summary.rules_rejected += report.rejected.len();

    tracing::info!(
        plugin = %plugin,
        rules = summary.rules_accepted,
        roles = summary.roles_merged,
        "plugin policy registered"
    );
    summary
}

/// Reads and registers the manifest in `dir`.
pub fn load_plugin_dir(
    dir: &Path,
    store: &PolicyStore,
    client_ids: &ClientIdSubstitutions,
) -> anyhow::Result<PluginLoadSummary> {
    let manifest_path = dir.join(MANIFEST_FILE);
    let raw = fs::read_to_string(&manifest_path)
        .with_context(|| format!("failed to read {}", manifest_path.display()))?;
    let manifest = load_manifest_str(&raw).with_context(|| format!("failed to parse {}", manifest_path.display()))?;

    let fallback = dir
        .file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_default();
    let plugin = manifest.name.clone().unwrap_or(fallback);

    Ok(register_manifest(&plugin, &manifest, store, client_ids))
}

/// Plugin directories under `base_path`, sorted by name.
pub fn discover_plugins(base_path: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let entries =
        fs::read_dir(base_path).with_context(|| format!("failed to read plugin directory {}", base_path.display()))?;

    let mut dirs = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
            dirs.push(path);
        }
    }
    dirs.sort();
    Ok(dirs)
}

/// Loads every plugin under `base_path` sequentially.
///
/// Must finish before the server accepts traffic. A plugin that fails to load
/// is logged and skipped; the others still register.
pub fn load_plugins(
    base_path: &Path,
    store: &PolicyStore,
    client_ids: &ClientIdSubstitutions,
) -> anyhow::Result<Vec<PluginLoadSummary>> {
    let mut summaries = Vec::new();
    for dir in discover_plugins(base_path)? {
        match load_plugin_dir(&dir, store, client_ids) {
            Ok(summary) => summaries.push(summary),
            Err(err) => tracing::error!(dir = %dir.display(), error = ?err, "skipping plugin"),
        }
    }
    Ok(summaries)
}
