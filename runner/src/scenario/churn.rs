use std::sync::Arc;

use anyhow::anyhow;
use fleetbench_common::{retry::retry_on_conflict, session::Session};
use goose::prelude::*;
use rand::seq::SliceRandom;
use reqwest::{Client, Url};
use serde_json::{json, Value};
use tracing::debug;

use super::{
    util::{goose_error, setup_client},
    Plan,
};
use crate::{goose_try, resources::config_map_name};

/// Goose metric key of the config map read preceding each update.
pub(crate) const GET_CONFIG_MAP_REQ_NAME: &str = "GET get_config_map";

/// Name and URL of a seeded config map.
type Target = (String, Url);

pub fn scenario(plan: Arc<Plan>) -> Result<Scenario, GooseError> {
    let targets: Arc<Vec<Target>> = Arc::new(
        (0..plan.config_maps.config_maps)
            .map(|index| {
                let name = config_map_name(&plan.config_maps.prefix, index);
                let url = plan.config_map_url(&name)?;
                Ok((name, url))
            })
            .collect::<anyhow::Result<_>>()
            .map_err(goose_error)?,
    );
    if targets.is_empty() {
        return Err(goose_error(anyhow!("churn needs at least one config map")));
    }
    let setup = setup_client(plan.clone());

    let update: Transaction = Transaction::new(Arc::new(move |user| {
        let plan = plan.clone();
        let targets = targets.clone();
        Box::pin(async move { update_config_map(user, plan, targets).await })
    }))
    .set_name("update_config_map");

    Ok(scenario!("ConfigMapChurn")
        .register_transaction(setup)
        .register_transaction(update))
}

/// Read a random seeded config map, change its data and write it back.
async fn update_config_map(
    user: &mut GooseUser,
    plan: Arc<Plan>,
    targets: Arc<Vec<Target>>,
) -> TransactionResult {
    let Some((name, url)) = targets.choose(&mut rand::thread_rng()) else {
        return Ok(());
    };

    let builder = plan.session.apply(user.client.get(url.clone()));
    let request = GooseRequest::builder()
        .method(GooseMethod::Get)
        .name("get_config_map")
        .set_request_builder(builder)
        .expect_status_code(200)
        .build();
    let mut goose = user.request(request).await?;
    let response = goose.response.map_err(TransactionError::from)?;
    if !response.status().is_success() {
        // goose already counted the unexpected status
        return Ok(());
    }
    let mut body = goose_try!(user, "malformed", &mut goose.request, {
        response.json::<Value>().await
    })?;
    let stamp = format!("updated-{}", chrono::Utc::now().timestamp_millis());
    if let Err(message) = stamp_data(&mut body, stamp) {
        return user.set_failure("malformed", &mut goose.request, None, Some(message));
    }

    // The write is not a goose request; its failures are charged to the read.
    let client = user.client.clone();
    match write_back(
        &client,
        &plan.session,
        url,
        &body,
        plan.config_maps.conflict_retries,
    )
    .await
    {
        Ok(()) => {
            debug!(%name, "config map updated");
            Ok(())
        }
        Err(message) => user.set_failure(
            "update",
            &mut goose.request,
            None,
            Some(&format!("update of {name}: {message}")),
        ),
    }
}

/// Replace the data of a config map read from the server.
fn stamp_data(body: &mut Value, value: String) -> Result<(), &'static str> {
    let object = body
        .as_object_mut()
        .ok_or("config map body is not an object")?;
    object.insert("data".into(), json!({ "data": value }));
    Ok(())
}

/// PUT a config map back, retrying while the server reports conflicts.
async fn write_back(
    client: &Client,
    session: &Session,
    url: &Url,
    body: &Value,
    retries: usize,
) -> Result<(), String> {
    let response = retry_on_conflict(retries, || {
        session.apply(client.put(url.clone()).json(body)).send()
    })
    .await
    .map_err(|err| err.to_string())?;
    let status = response.status();
    if status.is_success() {
        Ok(())
    } else {
        Err(format!("server returned {status}"))
    }
}
