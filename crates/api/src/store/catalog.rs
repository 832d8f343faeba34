//! Read-only tenant and user catalog

use std::collections::{BTreeMap, HashMap};

use chatrelay_shared::{
    ActiveUser, ConfigurationOption, Source, TechnicalUserPermissions, Tenant, TestProfile,
};

use super::seed;

/// Static lookup data served by the tenant and user routes
#[derive(Debug, Clone)]
pub struct Catalog {
    tenants: Vec<Tenant>,
    active_user: ActiveUser,
    permissions: HashMap<String, TechnicalUserPermissions>,
    configurations: HashMap<String, Vec<ConfigurationOption>>,
    test_profiles: HashMap<String, Vec<TestProfile>>,
    sources: Vec<Source>,
}

impl Catalog {
    /// Tenants, optionally without their logo URLs
    pub fn tenants(&self, include_logo: bool) -> Vec<Tenant> {
        self.tenants
            .iter()
            .cloned()
            .map(|mut tenant| {
                if !include_logo {
                    tenant.logo_url = None;
                }
                tenant
            })
            .collect()
    }

    pub fn active_user(&self) -> &ActiveUser {
        &self.active_user
    }

    /// Permissions of the technical user; nothing is allowed for unknown tenants
    pub fn permissions(&self, tenant_id: &str) -> TechnicalUserPermissions {
        self.permissions.get(tenant_id).copied().unwrap_or_default()
    }

    pub fn configurations(&self, tenant_id: &str) -> Vec<ConfigurationOption> {
        self.configurations.get(tenant_id).cloned().unwrap_or_default()
    }

    pub fn test_profiles(&self, tenant_id: &str) -> Vec<TestProfile> {
        self.test_profiles.get(tenant_id).cloned().unwrap_or_default()
    }

    /// Citations attached to every generated answer
    pub fn sources(&self) -> &[Source] {
        &self.sources
    }
}

fn configuration(name: &str, published_to_main: bool) -> ConfigurationOption {
    ConfigurationOption {
        name: name.to_string(),
        published_to_main,
    }
}

fn profile(id: &str, name: &str) -> TestProfile {
    TestProfile {
        id: id.to_string(),
        name: name.to_string(),
    }
}

impl Default for Catalog {
    fn default() -> Self {
        let tenants = vec![
            Tenant {
                id: "tenant-a".to_string(),
                name: "Acme Corp".to_string(),
                logo_url: Some("https://placehold.co/64x64?text=A".to_string()),
            },
            Tenant {
                id: "tenant-b".to_string(),
                name: "Globex".to_string(),
                logo_url: None,
            },
        ];

        let active_user = ActiveUser {
            id: "guest-user".to_string(),
            name: "Guest User".to_string(),
            email: "guest@example.com".to_string(),
            profiles: vec![
                "Guest".to_string(),
                "Power User".to_string(),
                "Analyst".to_string(),
            ],
            active_profile: Some("Guest".to_string()),
            feature_flags: BTreeMap::from([
                ("canGenerateQuestions".to_string(), true),
                ("canSubmitFeedback".to_string(), true),
            ]),
        };

        let permissions = HashMap::from([
            (
                "tenant-a".to_string(),
                TechnicalUserPermissions {
                    can_chat: true,
                    can_delete_conversation: true,
                    can_provide_feedback: true,
                },
            ),
            (
                "tenant-b".to_string(),
                TechnicalUserPermissions {
                    can_chat: true,
                    can_delete_conversation: false,
                    can_provide_feedback: true,
                },
            ),
        ]);

        let configurations = HashMap::from([
            (
                "tenant-a".to_string(),
                vec![
                    configuration("default", true),
                    configuration("support-bot", true),
                    configuration("experimental", false),
                ],
            ),
            ("tenant-b".to_string(), vec![configuration("default", true)]),
        ]);

        let test_profiles = HashMap::from([
            (
                "tenant-a".to_string(),
                vec![
                    profile("profile-1", "John Developer"),
                    profile("profile-2", "Alice Admin"),
                    profile("profile-3", "Bob User"),
                ],
            ),
            ("tenant-b".to_string(), vec![profile("profile-4", "Dana Analyst")]),
        ]);

        Self {
            tenants,
            active_user,
            permissions,
            configurations,
            test_profiles,
            sources: seed::fixed_sources(),
        }
    }
}
