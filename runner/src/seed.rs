//! Seed command: create the config maps the churn scenario writes to.
use anyhow::{bail, Result};
use clap::Args;
use fleetbench_common::{
    retry::{retry_on_conflict, ConflictStatus},
    session::Session,
};
use reqwest::{Client, Url};
use serde_json::Value;
use tracing::{debug, info};

use crate::{
    config::{Config, TargetOpts},
    resources::{config_map_body, config_map_name, namespace_body, ConfigMapOpts},
    CommandResult,
};

/// Options to Seed command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    target: TargetOpts,

    #[command(flatten)]
    config_maps: ConfigMapOpts,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum Outcome {
    Created,
    Existing,
}

#[tracing::instrument(skip_all, fields(namespace = %opts.config_maps.namespace, count = opts.config_maps.config_maps))]
pub async fn seed(opts: Opts) -> Result<CommandResult> {
    let config = Config::from_opts(opts.target)?;
    let client = config.http_client()?;
    let session = config.session(&client).await?;
    let seeder = Seeder {
        client,
        session,
        namespaces_url: config.steve_url("namespaces")?,
        config_maps_url: config.steve_url("configmaps")?,
        opts: opts.config_maps,
    };
    seeder.run().await
}

struct Seeder {
    client: Client,
    session: Session,
    namespaces_url: Url,
    config_maps_url: Url,
    opts: ConfigMapOpts,
}

impl Seeder {
    async fn run(&self) -> Result<CommandResult> {
        let namespace = &self.opts.namespace;
        let outcome = match self
            .create(&self.namespaces_url, &namespace_body(namespace))
            .await
        {
            Ok(outcome) => outcome,
            Err(err) => return Ok(CommandResult::Failure(err)),
        };
        info!(%namespace, ?outcome, "namespace ready");

        let mut created = 0;
        let mut existing = 0;
        for index in 0..self.opts.config_maps {
            let name = config_map_name(&self.opts.prefix, index);
            let body = config_map_body(namespace, &name, &format!("seed-{index}"));
            match self.create(&self.config_maps_url, &body).await {
                Ok(Outcome::Created) => created += 1,
                Ok(Outcome::Existing) => existing += 1,
                Err(err) => {
                    return Ok(CommandResult::Failure(
                        err.context(format!("failed to create config map {name}")),
                    ))
                }
            }
            debug!(%name, "config map ready");
            if (index + 1) % 100 == 0 {
                info!(done = index + 1, total = self.opts.config_maps, "seeding");
            }
        }
        info!(created, existing, "seeding complete");
        Ok(CommandResult::Success)
    }

    /// POST `body`, treating a conflict that outlasts the retries as an existing object.
    async fn create(&self, url: &Url, body: &Value) -> Result<Outcome> {
        let response = retry_on_conflict(self.opts.conflict_retries, || {
            self.session
                .apply(self.client.post(url.clone()).json(body))
                .send()
        })
        .await?;
        let status = response.status();
        if status.is_conflict() {
            Ok(Outcome::Existing)
        } else if status.is_success() {
            Ok(Outcome::Created)
        } else {
            let text = response.text().await.unwrap_or_default();
            bail!("{url} returned {status}: {text}")
        }
    }
}

#[cfg(test)]
mod test {
    use test_log::test;
    use wiremock::{
        matchers::{body_partial_json, header, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn seeder(server: &MockServer, config_maps: usize, conflict_retries: usize) -> Seeder {
        let base = Url::parse(&server.uri()).unwrap();
        Seeder {
            client: Client::new(),
            session: Session::Cookie("token-abc".into()),
            namespaces_url: base.join("/v1/namespaces").unwrap(),
            config_maps_url: base.join("/v1/configmaps").unwrap(),
            opts: ConfigMapOpts {
                namespace: "scalability-test".into(),
                config_maps,
                prefix: "test-config-map".into(),
                conflict_retries,
            },
        }
    }

    #[test(tokio::test)]
    async fn creates_every_config_map_in_existing_namespace() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/namespaces"))
            .respond_with(ResponseTemplate::new(409))
            .expect(1)
            .mount(&server)
            .await;
        for index in 0..3 {
            Mock::given(method("POST"))
                .and(path("/v1/configmaps"))
                .and(header("cookie", "R_SESS=token-abc"))
                .and(body_partial_json(serde_json::json!({
                    "metadata": {
                        "name": format!("test-config-map-{index}"),
                        "namespace": "scalability-test",
                    }
                })))
                .respond_with(ResponseTemplate::new(201))
                .expect(1)
                .mount(&server)
                .await;
        }

        let result = seeder(&server, 3, 0).run().await.unwrap();
        assert!(matches!(result, CommandResult::Success), "{result:?}");
    }

    #[test(tokio::test)]
    async fn exhausted_conflicts_count_as_existing() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/namespaces"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/configmaps"))
            .respond_with(ResponseTemplate::new(409))
            .expect(2)
            .mount(&server)
            .await;

        let result = seeder(&server, 2, 0).run().await.unwrap();
        assert!(matches!(result, CommandResult::Success), "{result:?}");
    }

    #[test(tokio::test)]
    async fn server_error_fails_the_seed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/v1/namespaces"))
            .respond_with(ResponseTemplate::new(201))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/v1/configmaps"))
            .respond_with(ResponseTemplate::new(500).set_body_string("boom"))
            .expect(1)
            .mount(&server)
            .await;

        match seeder(&server, 5, 0).run().await.unwrap() {
            CommandResult::Failure(err) => {
                assert!(format!("{err:#}").contains("test-config-map-0"), "{err:#}")
            }
            CommandResult::Success => panic!("expected failure"),
        }
    }
}
