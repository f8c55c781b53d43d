//! List command: walk one listing end to end and report what it took.
use std::time::Instant;

use anyhow::{anyhow, Result};
use clap::Args;
use fleetbench_common::pagination::{HttpTransport, ListSummary, Lister, PageTransport};
use futures::{pin_mut, StreamExt};
use tracing::{debug, info, warn};

use crate::{
    config::{Config, TargetOpts},
    CommandResult,
};

/// Options to List command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    target: TargetOpts,

    /// Number of complete listings to perform, each starting over from page one.
    #[arg(long, env = "PER_VU_ITERATIONS", default_value_t = 1)]
    iterations: usize,
}

#[tracing::instrument(skip_all, fields(iterations = opts.iterations))]
pub async fn list(opts: Opts) -> Result<CommandResult> {
    let config = Config::from_opts(opts.target)?;
    let client = config.http_client()?;
    let session = config.session(&client).await?;
    let mut lister = Lister::new(
        HttpTransport::new(client, session),
        config.list_request()?,
    );
    info!(
        url = %lister.pager().request().url,
        flavor = lister.pager().request().flavor.name(),
        page_size = config.page_size,
        "listing"
    );
    run(&mut lister, opts.iterations).await
}

async fn run<T: PageTransport>(lister: &mut Lister<T>, iterations: usize) -> Result<CommandResult> {
    for iteration in 1..=iterations {
        if iteration > 1 {
            lister.restart();
        }
        let started = Instant::now();
        let summary = match walk(lister).await {
            Ok(summary) => summary,
            Err(err) => {
                warn!(iteration, %err, "listing failed");
                return Ok(CommandResult::Failure(err));
            }
        };
        info!(
            iteration,
            pages = summary.pages,
            items = summary.items,
            bytes = summary.bytes,
            revision = summary.revision.as_deref().unwrap_or(""),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "listing complete"
        );
    }
    Ok(CommandResult::Success)
}

async fn walk<T: PageTransport>(lister: &mut Lister<T>) -> Result<ListSummary> {
    let mut summary = ListSummary::default();
    {
        let pages = lister.pages();
        pin_mut!(pages);
        while let Some(page) = pages.next().await {
            let page = page.map_err(|err| {
                if err.is_gone() {
                    anyhow!(err).context("the revision expired while listing, pages were not read fast enough")
                } else {
                    anyhow!(err)
                }
            })?;
            debug!(
                page = page.index,
                items = page.items.len(),
                len = page.len,
                revision = page.revision.as_deref().unwrap_or(""),
                "page"
            );
            summary.pages += 1;
            summary.items += page.items.len();
            summary.bytes += page.len;
        }
    }
    summary.revision = lister.pager().revision().map(str::to_owned);
    Ok(summary)
}
