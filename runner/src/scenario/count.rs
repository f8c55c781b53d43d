use std::sync::Arc;

use fleetbench_common::pagination::{classify, PagedBody, StatusClass};
use goose::prelude::*;
use tracing::debug;

use super::{util::setup_client, Plan};
use crate::goose_try;

/// Goose metric key of a count request.
pub(crate) const COUNT_REQ_NAME: &str = "GET count";

pub fn scenario(plan: Arc<Plan>) -> Result<Scenario, GooseError> {
    let setup = setup_client(plan.clone());

    let count: Transaction = Transaction::new(Arc::new(move |user| {
        let plan = plan.clone();
        Box::pin(async move { count(user, plan).await })
    }))
    .set_name("count");

    Ok(scenario!("ResourceCount")
        .register_transaction(setup)
        .register_transaction(count))
}

/// Why a count response did not yield a total, tagged like listing failures.
#[derive(Debug, PartialEq, Eq)]
struct CountFailure {
    tag: &'static str,
    message: String,
}

impl CountFailure {
    fn new(tag: &'static str, message: impl Into<String>) -> Self {
        Self {
            tag,
            message: message.into(),
        }
    }
}

/// Total reported by a count response.
fn read_count(status: u16, body: &[u8]) -> Result<u64, CountFailure> {
    match classify(status) {
        StatusClass::Ok => {}
        StatusClass::Gone => {
            return Err(CountFailure::new(
                "gone",
                "count expired on the server (410 Gone)",
            ))
        }
        StatusClass::Failed(status) => {
            return Err(CountFailure::new(
                "status",
                format!("count returned status {status}"),
            ))
        }
    }
    let body: PagedBody = serde_json::from_slice(body)
        .map_err(|err| CountFailure::new("malformed", format!("count body: {err}")))?;
    body.count
        .ok_or_else(|| CountFailure::new("malformed", "count response carries no count"))
}

/// Ask for a single item and read the total the server reports alongside it.
async fn count(user: &mut GooseUser, plan: Arc<Plan>) -> TransactionResult {
    let builder = plan.session.apply(user.client.get(plan.count_url.clone()));
    let request = GooseRequest::builder()
        .method(GooseMethod::Get)
        .name("count")
        .set_request_builder(builder)
        .expect_status_code(200)
        .build();
    let mut goose = user.request(request).await?;
    let response = goose.response.map_err(TransactionError::from)?;
    let status = response.status().as_u16();
    let body = goose_try!(user, "transport", &mut goose.request, {
        response.bytes().await
    })?;

    match read_count(status, &body) {
        Ok(count) => {
            debug!(count, resource = %plan.config.resource, "counted");
            Ok(())
        }
        Err(failure) => user.set_failure(
            failure.tag,
            &mut goose.request,
            None,
            Some(&failure.message),
        ),
    }
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn reads_reported_count() {
        let body = br#"{"data":[{"id":"a"}],"count":42,"revision":"7"}"#;
        assert_eq!(read_count(200, body), Ok(42));
    }

    #[test]
    fn gone_and_failed_statuses_are_tagged() {
        assert_eq!(read_count(410, b"").unwrap_err().tag, "gone");
        let failure = read_count(500, b"oops").unwrap_err();
        assert_eq!(failure.tag, "status");
        assert!(failure.message.contains("500"));
    }

    #[test]
    fn garbage_and_missing_count_are_malformed() {
        assert_eq!(read_count(200, b"<html>").unwrap_err().tag, "malformed");
        assert_eq!(
            read_count(200, br#"{"data":[]}"#),
            Err(CountFailure::new(
                "malformed",
                "count response carries no count"
            ))
        );
    }
}
