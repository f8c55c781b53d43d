use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use goose::{metrics::GooseRequestMetric, prelude::*};
use tracing::{debug, warn};

use fleetbench_common::pagination::{ListError, Pager};

use super::{util::setup_client, Plan};
use crate::goose_try;

/// Goose metric key of a listing page request.
pub(crate) const LIST_PAGE_REQ_NAME: &str = "GET list_page";

pub fn scenario(plan: Arc<Plan>) -> Result<Scenario, GooseError> {
    let setup = setup_client(plan.clone());

    let list: Transaction = Transaction::new(Arc::new(move |user| {
        let plan = plan.clone();
        Box::pin(async move { list(user, plan).await })
    }))
    .set_name("list");

    Ok(scenario!("PaginatedList")
        .register_transaction(setup)
        .register_transaction(list))
}

/// Time a page request may take before the listing deadline passes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
enum PageBudget {
    Unbounded,
    Within(Duration),
    Exceeded,
}

fn page_budget(deadline: Option<Duration>, elapsed: Duration) -> PageBudget {
    match deadline {
        None => PageBudget::Unbounded,
        Some(deadline) => match deadline.checked_sub(elapsed) {
            Some(remaining) if !remaining.is_zero() => PageBudget::Within(remaining),
            _ => PageBudget::Exceeded,
        },
    }
}

/// Drain one complete listing, one goose request per page.
async fn list(user: &mut GooseUser, plan: Arc<Plan>) -> TransactionResult {
    let mut pager = Pager::new(plan.request.clone());
    let started = Instant::now();
    // Metric of the latest page, charged when the deadline passes between pages.
    let mut last: Option<GooseRequestMetric> = None;
    while let Some(url) = pager.next_url() {
        let mut builder = plan.session.apply(user.client.get(url.clone()));
        match page_budget(plan.request.deadline, started.elapsed()) {
            PageBudget::Unbounded => {}
            PageBudget::Within(remaining) => builder = builder.timeout(remaining),
            PageBudget::Exceeded => {
                let err = ListError::DeadlineExceeded {
                    page: pager.pages_seen() + 1,
                };
                warn!(%err, deadline = ?plan.request.deadline, "listing abandoned");
                pager.abort();
                match last.as_mut() {
                    Some(request) => {
                        return user.set_failure(err.kind(), request, None, Some(&err.to_string()))
                    }
                    // Nothing to charge yet, the request times out at once instead.
                    None => builder = builder.timeout(Duration::ZERO),
                }
            }
        }
        let request = GooseRequest::builder()
            .method(GooseMethod::Get)
            .name("list_page")
            .set_request_builder(builder)
            .expect_status_code(200)
            .build();
        let mut goose = user.request(request).await?;
        let response = goose.response.map_err(TransactionError::from)?;
        let status = response.status().as_u16();
        let body = goose_try!(user, "transport", &mut goose.request, {
            response.bytes().await
        })?;

        match pager.observe(url, status, &body) {
            Ok(page) => {
                debug!(page = page.index, items = page.items.len(), last = page.last, "page");
                last = Some(goose.request);
            }
            Err(err) => {
                if err.is_gone() {
                    warn!(%err, "listing revision expired");
                }
                return user.set_failure(err.kind(), &mut goose.request, None, Some(&err.to_string()));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod test {
    use test_log::test;

    use super::*;

    #[test]
    fn no_deadline_leaves_pages_unbounded() {
        assert_eq!(
            page_budget(None, Duration::from_secs(3600)),
            PageBudget::Unbounded
        );
    }

    #[test]
    fn pages_get_the_time_left() {
        assert_eq!(
            page_budget(Some(Duration::from_secs(30)), Duration::from_secs(12)),
            PageBudget::Within(Duration::from_secs(18))
        );
    }

    #[test]
    fn deadline_passed_between_pages() {
        let deadline = Some(Duration::from_secs(30));
        assert_eq!(
            page_budget(deadline, Duration::from_secs(30)),
            PageBudget::Exceeded
        );
        assert_eq!(
            page_budget(deadline, Duration::from_secs(31)),
            PageBudget::Exceeded
        );
    }

    #[test]
    fn exceeded_deadline_is_tagged() {
        let err = ListError::DeadlineExceeded { page: 4 };
        assert_eq!(err.kind(), "deadline");
        assert_eq!(err.page(), 4);
    }
}
