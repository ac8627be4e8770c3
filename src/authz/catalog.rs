//! Compiled-in role catalog and core rule set.
//!
//! These are registered before any plugin loads, so core rules always sit
//! ahead of plugin-contributed rules in the first-match order.

use super::roles;
use super::rule::RuleSpec;

const UUID: &str = "[0-9a-fA-F]{8}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{4}-[0-9a-fA-F]{12}";

pub const ROLE_SCOPES: &[(&str, &[&str])] = &[
    (
        roles::ALP_USER_ADMIN,
        &[
            "usermgmt.dataAdmin.read",
            "usermgmt.dataAdmin.write",
            "usermgmt.user.read",
            "usermgmt.user.write",
            "usermgmt.user.add",
            "usermgmt.user.delete",
            "usermgmt.user.password.write",
            "usermgmt.group.delete",
            "usermgmt.userGroup.read",
            "usermgmt.userGroup.overview",
            "usermgmt.userGroup.tenant.read",
            "usermgmt.userGroup.tenant.add",
            "usermgmt.userGroup.study.add",
            "usermgmt.userGroup.tenant.delete",
            "usermgmt.userGroup.study.delete",
            "usermgmt.member.tenant.add",
            "usermgmt.member.tenant.delete",
            "usermgmt.member.tenant.update",
            "nifimgmt.userAdmin",
        ],
    ),
    (
        roles::ALP_SYSTEM_ADMIN,
        &[
            "usermgmt.dataAdmin.read",
            "usermgmt.group.read",
            "usermgmt.me",
            "usermgmt.studyAccessRequest.read",
            "usermgmt.studyAccessRequest.update",
            "usermgmt.user.read",
            "usermgmt.user.add",
            "usermgmt.userGroup.read",
            "usermgmt.userGroup.overview",
            "usermgmt.userGroup.tenant.read",
            "usermgmt.setup",
            "dbCredentials.db.list",
            "dbCredentials.db.read",
            "dbCredentials.db.vocabSchema.list",
            "dbCredentials.db.write",
            "dbCredentials.db.credential.update",
            "dbCredentials.db.delete",
            "portal.dataset.systemAdmin.read",
            "portal.dataset.exist",
            "portal.dataset.add",
            "portal.dataset.update",
            "portal.dataset.delete",
            "portal.dataset.resource.read",
            "portal.dataset.resource.add",
            "portal.dataset.resource.delete",
            "portal.dataset.resource.download",
            "portal.dataset.release.add",
            "portal.dataset.release.list.read",
            "portal.dataset.release.read",
            "portal.tenant.read",
            "portal.feature.read",
            "portal.feature.write",
            "portal.config.read",
            "portal.config.write",
            "terminology.user.read",
            "dataflowmgmt.dataflow.read",
            "dataflowmgmt.dataflow.add",
            "dataflowmgmt.dataflow.delete",
            "dataflowmgmt.analysisflow.read",
            "dataflowmgmt.analysisflow.add",
            "dataflowmgmt.analysisflow.delete",
            "dbSvc.schema.create",
            "dbSvc.schema.update",
            "dbSvc.schema.delete",
            "dbSvc.datamodels.read",
            "meilisearchSvc.index.add",
            "meilisearchSvc.document.add",
            "gateway.dashboardGate.register",
            "gateway.dataset.create",
            "gateway.fhir.create",
        ],
    ),
    (roles::ALP_SQLEDITOR_ADMIN, &["sqleditor.admin"]),
    (roles::ALP_NIFI_ADMIN, &["nifimgmt.userAdmin"]),
    (roles::ALP_DASHBOARD_VIEWER, &["gateway.dashboardGate.content"]),
    (
        roles::TENANT_VIEWER,
        &[
            "usermgmt.group.read",
            "usermgmt.me",
            "usermgmt.studyAccessRequest.add",
            "usermgmt.studyAccessRequest.me",
            "usermgmt.userGroup.tenant.read",
            "usermgmt.userGroup.status",
            "dataflowmgmt.dqd.job.dataset.flowRun.latest.read",
            "dataflowmgmt.dqd.dataQuality.flowRun.results.overview.read",
            "portal.tenant.read",
            "portal.feature.read",
            "portal.dataset.read",
            "portal.filterScope.read",
            "portal.dataset.release.list.read",
            "portal.config.read",
        ],
    ),
    (
        roles::STUDY_WRITE_DQD_RESEARCHER,
        &[
            "dataflowmgmt.dqd.dataQuality.flowRun.add",
            "dataflowmgmt.dqd.dataCharacterization.flowRun.add",
        ],
    ),
    (
        roles::STUDY_RESEARCHER,
        &[
            "PA.svc",
            "PAConfig.i18n",
            "PAConfig.svc/read",
            "CDWConfig.svc/read",
            "portal.dataset.paConfig.read",
            "portal.dataset.resource.read",
            "portal.dataset.resource.download",
            "portal.notebook.read",
            "portal.notebook.add",
            "portal.notebook.update",
            "portal.notebook.delete",
            "terminology.user.read",
            "gateway.terminology.conceptSet.read",
            "gateway.terminology.conceptSet.create",
            "gateway.terminology.conceptSet.update",
            "gateway.terminology.conceptSet.delete",
            "dataflowmgmt.analysisflow.read",
            "dataflowmgmt.analysisflow.add",
            "dataflowmgmt.analysisflow.delete",
        ],
    ),
    (
        "ALP_SHARED",
        &["usermgmt.group.read", "usermgmt.group.add", "usermgmt.group.delete"],
    ),
];

/// Core gateway routes, in evaluation order.
pub fn core_rules() -> Vec<RuleSpec> {
    vec![
        RuleSpec::new("^/analytics-svc/plugins/(.*)", &["PA.svc"]),
        RuleSpec::new("^/analytics-svc/api/services/population/studies/patientcount", &["PA.DatasetOverview.svc"]),
        RuleSpec::new("^/analytics-svc/api/services/(.*)", &["PA.svc"]),
        RuleSpec::new("^/analytics-svc/pa/services(.*)", &["PA.svc"]),
        RuleSpec::new("^/pa-config-svc/enduser(.*)", &["PAConfig.svc/read"]),
        RuleSpec::new("^/pa-config-svc/services/(.*)", &["PAConfig.svc"]),
        RuleSpec::new("^/hc/hph/cdw/config/services/config.xsjs(.*)", &["CDWConfig.svc/read"]).with_methods(&["GET"]),
        RuleSpec::new("^/hc/hph/cdw/(.*)$", &["CDWConfig.svc"]),
        RuleSpec::new("^/usermgmt/api/me", &["usermgmt.me"]).with_methods(&["GET", "PUT", "DELETE"]),
        RuleSpec::new("^/usermgmt/api/group/create", &["usermgmt.group.add"]).with_methods(&["POST"]),
        RuleSpec::new("^/usermgmt/api/group/(delete|cleanup)", &["usermgmt.group.delete"]).with_methods(&["POST"]),
        RuleSpec::new("^/usermgmt/api/group(.*)", &["usermgmt.group.read"]).with_methods(&["GET"]),
        RuleSpec::new("^/usermgmt/api/study/access-request/me", &["usermgmt.studyAccessRequest.me"]),
        RuleSpec::new("^/usermgmt/api/study/access-request/(approve|reject)", &["usermgmt.studyAccessRequest.update"]),
        RuleSpec::new("^/usermgmt/api/study/access-request/list/(.+)", &["usermgmt.studyAccessRequest.read"]),
        RuleSpec::new("^/usermgmt/api/study/access-request", &["usermgmt.studyAccessRequest.add"]),
        RuleSpec::new("^/usermgmt/api/user-group/list", &["usermgmt.userGroup.tenant.read"]),
        RuleSpec::new("^/usermgmt/api/user-group/overview", &["usermgmt.userGroup.overview"]),
        RuleSpec::new("^/usermgmt/api/user-group/status/(.+)", &["usermgmt.userGroup.status"]),
        RuleSpec::new("^/usermgmt/api/user-group$", &["usermgmt.userGroup.read"]),
        RuleSpec::new(format!("^/usermgmt/api/user/{UUID}/password"), &["usermgmt.user.password.write"])
            .with_methods(&["PUT"]),
        RuleSpec::new("^/usermgmt/api/user(.*)", &["usermgmt.user.read"]).with_methods(&["GET"]),
        RuleSpec::new("^/usermgmt/api/user", &["usermgmt.user.add"]).with_methods(&["POST"]),
        RuleSpec::new("^/usermgmt/api/user/(.*)", &["usermgmt.user.delete"]).with_methods(&["DELETE"]),
        RuleSpec::new("^/usermgmt/api/setup/(.*)", &["usermgmt.setup"]).with_methods(&["POST", "GET"]),
        RuleSpec::new("^/db-credentials/db/list$", &["dbCredentials.db.list"]).with_methods(&["GET"]),
        RuleSpec::new(format!("^/db-credentials/db/{UUID}$"), &["dbCredentials.db.read"]).with_methods(&["GET"]),
        RuleSpec::new(format!("^/db-credentials/db/{UUID}$"), &["dbCredentials.db.delete"]).with_methods(&["DELETE"]),
        RuleSpec::new("^/db-credentials/db$", &["dbCredentials.db.write"]).with_methods(&["POST", "PUT"]),
        RuleSpec::new("^/system-portal/dataset/list$", &["portal.dataset.read"]).with_methods(&["GET"]),
        RuleSpec::new(format!("^/system-portal/dataset/{UUID}/resource/list$"), &["portal.dataset.resource.read"])
            .with_methods(&["GET"]),
        RuleSpec::new("^/system-portal/notebook$", &["portal.notebook.read"]).with_methods(&["GET"]),
        RuleSpec::new("^/alp-nifi-api/nifi/(.*)", &["nifimgmt.userAdmin"]),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authz::PolicyRule;
    use std::collections::HashSet;

    #[test]
    fn every_core_rule_compiles() {
        for spec in core_rules() {
            assert!(PolicyRule::compile(&spec).is_ok(), "core rule {} failed to compile", spec.path);
        }
    }

    #[test]
    fn role_names_are_unique() {
        let names: HashSet<&str> = ROLE_SCOPES.iter().map(|(role, _)| *role).collect();
        assert_eq!(names.len(), ROLE_SCOPES.len());
    }
}
