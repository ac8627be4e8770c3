use std::fs;
use std::path::Path;

use anyhow::Result;
use axum::http::Method;
use serde_json::json;
use tempfile::tempdir;

use gateway_authz::authz::{catalog, roles, PolicyStore};
use gateway_authz::config::ClientIdSubstitutions;
use gateway_authz::plugins::load_plugins;

fn write_plugin(base: &Path, dir: &str, manifest: &str) -> Result<()> {
    let plugin_dir = base.join(dir);
    fs::create_dir_all(&plugin_dir)?;
    fs::write(plugin_dir.join("package.json"), manifest)?;
    Ok(())
}

#[test]
fn plugins_load_in_directory_order_after_core_rules() -> Result<()> {
    let base = tempdir()?;

    write_plugin(
        base.path(),
        "b-reports",
        &json!({
            "name": "reports",
            "trex": {"functions": {
                "roles": {"TENANT_VIEWER": ["reports.read", "portal.tenant.read"]},
                "scopes": [{"path": "^/reports/(.*)", "scopes": ["reports.read"]}]
            }}
        })
        .to_string(),
    )?;
    write_plugin(
        base.path(),
        "a-reports-admin",
        &json!({
            "name": "reports-admin",
            "trex": {"functions": {
                "roles": {"IDP_ALP_DATA_CLIENT_ID": ["reports.export"]},
                "scopes": [{"path": "^/reports/(.*)", "scopes": ["reports.admin"], "httpMethods": ["GET"]}]
            }}
        })
        .to_string(),
    )?;
    // not a plugin: no manifest
    fs::create_dir_all(base.path().join("c-assets"))?;

    let store = PolicyStore::with_catalog();
    let core_rules = store.snapshot().rules().len();
    let ids = ClientIdSubstitutions {
        svc_client_id: None,
        data_client_id: Some("data-client".into()),
    };

    let summaries = load_plugins(base.path(), &store, &ids)?;
    let names: Vec<&str> = summaries.iter().map(|s| s.plugin.as_str()).collect();
    assert_eq!(names, vec!["reports-admin", "reports"]);

    let policy = store.snapshot();
    assert_eq!(policy.rules().len(), core_rules + 2);

    let (index, rule) = policy.first_match(&Method::GET, "/reports/monthly").unwrap();
    assert_eq!(index, core_rules);
    assert_eq!(rule.required_scopes(), ["reports.admin".to_string()]);

    let (_, rule) = policy.first_match(&Method::DELETE, "/reports/monthly").unwrap();
    assert_eq!(rule.required_scopes(), ["reports.read".to_string()]);

    // merged into the catalog role without duplicating portal.tenant.read
    let viewer = policy.scopes_for(roles::TENANT_VIEWER);
    assert!(viewer.contains(&"reports.read".to_string()));
    assert_eq!(viewer.iter().filter(|s| *s == "portal.tenant.read").count(), 1);

    assert_eq!(policy.scopes_for("data-client"), ["reports.export".to_string()]);
    Ok(())
}

#[test]
fn broken_manifest_does_not_block_other_plugins() -> Result<()> {
    let base = tempdir()?;

    write_plugin(base.path(), "a-broken", "{ this is not json")?;
    write_plugin(
        base.path(),
        "b-typo",
        r#"{"trex": {"functions": {"scopes": {"path": "^/x"}}}}"#,
    )?;
    write_plugin(
        base.path(),
        "c-good",
        &json!({
            "trex": {"functions": {
                "roles": {"TENANT_VIEWER": ["good.read"], "BROKEN": "good.write"},
                "scopes": [
                    {"path": "^/good(.*)", "scopes": ["good.read"]},
                    {"path": "^/bad(", "scopes": ["bad.read"]},
                    {"path": "^/empty", "scopes": []},
                    {"scopes": ["no.path"]},
                    {"path": "^/typed", "scopes": "not.a.list"}
                ]
            }}
        })
        .to_string(),
    )?;

    let store = PolicyStore::new();
    let summaries = load_plugins(base.path(), &store, &ClientIdSubstitutions::default())?;

    assert_eq!(summaries.len(), 1);
    assert_eq!(summaries[0].plugin, "c-good");
    assert_eq!(summaries[0].rules_accepted, 1);
    assert_eq!(summaries[0].rules_rejected, 4);
    assert_eq!(summaries[0].roles_merged, 1);
    assert_eq!(summaries[0].roles_rejected, 1);

    let policy = store.snapshot();
    assert_eq!(policy.rules().len(), 1);
    assert!(policy.first_match(&Method::GET, "/good/1").is_some());
    assert_eq!(policy.scopes_for(roles::TENANT_VIEWER), ["good.read".to_string()]);
    assert!(policy.scopes_for("BROKEN").is_empty());
    Ok(())
}

#[test]
fn catalog_is_seeded_before_plugins() {
    let store = PolicyStore::with_catalog();
    let policy = store.snapshot();

    assert_eq!(policy.rules().len(), catalog::core_rules().len());
    assert!(policy.scopes_for(roles::STUDY_RESEARCHER).contains(&"PA.svc".to_string()));
    assert!(policy.first_match(&Method::GET, "/usermgmt/api/me").is_some());
}

#[test]
fn missing_base_directory_is_an_error() {
    let base = tempdir().unwrap();
    let missing = base.path().join("does-not-exist");
    assert!(load_plugins(&missing, &PolicyStore::new(), &ClientIdSubstitutions::default()).is_err());
}
