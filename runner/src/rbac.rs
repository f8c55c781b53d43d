//! Rbac command: scale the number of global roles, users and role bindings.
use anyhow::{anyhow, Context, Result};
use clap::Args;
use fleetbench_common::{
    pagination::{Flavor, HttpTransport, ListRequest, Lister},
    retry::{retry_on_conflict, DEFAULT_CONFLICT_RETRIES},
    session::Session,
};
use reqwest::{Client, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::{
    config::{Config, TargetOpts},
    CommandResult,
};

/// Objects created by this command carry descriptions starting with this.
const TEST_PREFIX: &str = "Test ";
const RESOURCES_PER_ROLE: usize = 5;
const BINDINGS_PER_USER: usize = 5;
const CHECK_THRESHOLD: f64 = 0.99;

const GROUP_RESOURCES: [(&str, &str); 7] = [
    ("fleet.cattle.io", "gitrepos"),
    ("fleet.cattle.io", "bundledeployments"),
    ("apiregistration.k8s.io", "apiservices"),
    ("rbac.authorization.k8s.io", "clusterroles"),
    ("events.k8s.io", "events"),
    ("apps", "replicasets"),
    ("discovery.k8s.io", "endpointslices"),
];

const VERBS: [&str; 7] = ["create", "delete", "get", "list", "patch", "update", "watch"];

const GLOBAL_ROLES: [&str; 16] = [
    "user",
    "restricted-admin",
    "user-base",
    "authn-manage",
    "kontainerdrivers-manage",
    "clustertemplaterevisions-create",
    "catalogs-use",
    "features-manage",
    "clusters-create",
    "catalogs-manage",
    "settings-manage",
    "view-rancher-metrics",
    "nodedrivers-manage",
    "clustertemplates-create",
    "podsecuritypolicytemplates-manage",
    "users-manage",
];

/// Options to Rbac command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    target: TargetOpts,

    /// Number of global roles to create.
    #[arg(long, env = "ROLE_COUNT", default_value_t = 10)]
    roles: usize,

    /// Number of users to create, each bound to five global roles.
    #[arg(long, env = "USER_COUNT", default_value_t = 10)]
    users: usize,

    /// Password given to every created user.
    #[arg(long, env = "USER_PASSWORD", default_value = "useruseruser", hide_env_values = true)]
    user_password: String,

    /// Conflicting attempts tolerated before the final binding attempt.
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    conflict_retries: usize,

    /// Keep test roles and users left over from earlier runs.
    #[arg(long, env = "SKIP_CLEANUP")]
    skip_cleanup: bool,
}

#[tracing::instrument(skip_all, fields(roles = opts.roles, users = opts.users))]
pub async fn rbac(opts: Opts) -> Result<CommandResult> {
    let config = Config::from_opts(opts.target)?;
    let client = config.http_client()?;
    let session = config.session(&client).await?;
    let seeder = RbacSeeder {
        config,
        client,
        session,
        roles: opts.roles,
        users: opts.users,
        user_password: opts.user_password,
        conflict_retries: opts.conflict_retries,
    };
    if !opts.skip_cleanup {
        seeder.cleanup().await?;
    }
    seeder.run().await
}

/// Pass/fail tally of the status checks made while seeding.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct Checks {
    passed: usize,
    failed: usize,
}

impl Checks {
    fn record(&mut self, ok: bool, what: &str, status: StatusCode) {
        if ok {
            self.passed += 1;
        } else {
            self.failed += 1;
            warn!(what, %status, "check failed");
        }
    }

    fn rate(&self) -> f64 {
        let total = self.passed + self.failed;
        if total == 0 {
            1.0
        } else {
            self.passed as f64 / total as f64
        }
    }
}

struct RbacSeeder {
    config: Config,
    client: Client,
    session: Session,
    roles: usize,
    users: usize,
    user_password: String,
    conflict_retries: usize,
}

impl RbacSeeder {
    /// Delete test roles and users created by earlier runs.
    async fn cleanup(&self) -> Result<()> {
        let roles = self
            .test_objects("v1/management.cattle.io.globalroles")
            .await?;
        for id in &roles {
            self.delete(&format!("v3/globalRoles/{id}")).await?;
        }
        let users = self.test_objects("v1/management.cattle.io.users").await?;
        for id in &users {
            self.delete(&format!("v3/users/{id}")).await?;
        }
        info!(roles = roles.len(), users = users.len(), "removed leftovers");
        Ok(())
    }

    /// Ids of the objects of a collection whose description marks them as test objects.
    async fn test_objects(&self, path: &str) -> Result<Vec<String>> {
        let request = ListRequest::new(self.config.api_url(path)?, Flavor::Cursor)
            .with_page_size(self.config.page_size);
        let mut lister = Lister::new(
            HttpTransport::new(self.client.clone(), self.session.clone()),
            request,
        );
        let mut ids = Vec::new();
        while let Some(page) = lister.next_page().await {
            let page = page.with_context(|| format!("listing {path}"))?;
            ids.extend(page.items.iter().filter_map(test_object_id));
        }
        Ok(ids)
    }

    async fn delete(&self, path: &str) -> Result<()> {
        let response = self
            .session
            .apply(self.client.delete(self.config.api_url(path)?))
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            warn!(path, %status, "delete failed");
        }
        Ok(())
    }

    async fn post(&self, path: &str, body: &Value) -> Result<reqwest::Response> {
        Ok(self
            .session
            .apply(self.client.post(self.config.api_url(path)?).json(body))
            .send()
            .await?)
    }

    async fn run(&self) -> Result<CommandResult> {
        let mut checks = Checks::default();

        for index in 0..self.roles {
            let response = self.post("v3/globalroles", &global_role_body(index)).await?;
            checks.record(
                response.status() == StatusCode::CREATED,
                "create global role",
                response.status(),
            );
        }
        info!(roles = self.roles, "global roles created");

        for index in 0..self.users {
            let response = self
                .post("v3/users", &user_body(index, &self.user_password))
                .await?;
            let status = response.status();
            checks.record(status == StatusCode::CREATED, "create user", status);
            if status != StatusCode::CREATED {
                continue;
            }
            let user: Value = response.json().await?;
            let Some(user_id) = user["id"].as_str() else {
                return Ok(CommandResult::Failure(anyhow!(
                    "created user {index} has no id"
                )));
            };
            debug!(user_id, "user created");

            let url = self.config.api_url("v3/globalrolebindings")?;
            for binding in 0..BINDINGS_PER_USER {
                let body = role_binding_body(index, binding, user_id);
                let response = retry_on_conflict(self.conflict_retries, || {
                    self.session
                        .apply(self.client.post(url.clone()).json(&body))
                        .send()
                })
                .await?;
                let status = response.status();
                checks.record(
                    status == StatusCode::CREATED || status == StatusCode::NO_CONTENT,
                    "create global role binding",
                    status,
                );
            }
        }
        info!(users = self.users, ?checks, "users and bindings created");

        let rate = checks.rate();
        if rate > CHECK_THRESHOLD {
            Ok(CommandResult::Success)
        } else {
            Ok(CommandResult::Failure(anyhow!(
                "{} of {} checks failed",
                checks.failed,
                checks.failed + checks.passed
            )))
        }
    }
}

fn test_object_id(item: &Value) -> Option<String> {
    let description = item["description"].as_str()?;
    if description.starts_with(TEST_PREFIX) {
        item["id"].as_str().map(str::to_owned)
    } else {
        None
    }
}

fn global_role_body(index: usize) -> Value {
    let rules: Vec<Value> = (0..RESOURCES_PER_ROLE)
        .map(|j| {
            let n = index * RESOURCES_PER_ROLE + j;
            let (group, resource) = GROUP_RESOURCES[n % GROUP_RESOURCES.len()];
            json!({
                "apiGroups": [group],
                "nonResourceURLs": [],
                "resourceNames": [],
                "resources": [resource],
                "verbs": [VERBS[n % VERBS.len()]],
            })
        })
        .collect();
    json!({
        "type": "globalRole",
        "name": format!("{TEST_PREFIX}Global Role {index}"),
        "description": format!("{TEST_PREFIX}Global Role {index}"),
        "rules": rules,
        "newUserDefault": false,
    })
}

fn user_body(index: usize, password: &str) -> Value {
    json!({
        "type": "user",
        "name": format!("{TEST_PREFIX}User {index}"),
        "description": format!("{TEST_PREFIX}User {index}"),
        "enabled": true,
        "mustChangePassword": false,
        "password": password,
        "username": format!("user-{index}"),
    })
}

fn role_binding_body(user: usize, binding: usize, user_id: &str) -> Value {
    json!({
        "type": "globalRoleBinding",
        "globalRoleId": GLOBAL_ROLES[(user * BINDINGS_PER_USER + binding) % GLOBAL_ROLES.len()],
        "userId": user_id,
    })
}
