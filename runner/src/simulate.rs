use std::sync::Arc;

use anyhow::{anyhow, bail, Result};
use clap::{Args, ValueEnum};
use goose::{config::GooseConfiguration, prelude::GooseMetrics, GooseAttack};
use opentelemetry::{global, KeyValue};
use tracing::{error, info, warn};

use fleetbench_common::pagination::GONE;

use crate::{
    config::{Config, TargetOpts},
    resources::ConfigMapOpts,
    scenario::{churn, count, list, Plan},
    CommandResult,
};

/// Options to Simulate command
#[derive(Args, Debug)]
pub struct Opts {
    #[command(flatten)]
    target: TargetOpts,

    #[command(flatten)]
    config_maps: ConfigMapOpts,

    /// Simulation scenario to run.
    #[arg(long, value_enum, env = "SIMULATE_SCENARIO", default_value_t)]
    scenario: Scenario,

    /// Number of users to simulate. Each user is a tokio task issuing requests
    /// one after the other.
    #[arg(long, default_value_t = 1, env = "VUS")]
    users: usize,

    /// Number of scenario iterations each user runs. When unset the
    /// simulation runs for `run_time` instead.
    #[arg(long, env = "PER_VU_ITERATIONS")]
    iterations: Option<usize>,

    /// Duration of the simulation
    #[arg(long, env = "SIMULATE_RUN_TIME", default_value = "10m")]
    run_time: String,

    /// Time taken to start all users, e.g. `30s`.
    #[arg(long, env = "SIMULATE_STARTUP_TIME")]
    startup_time: Option<String>,

    /// Option to throttle requests (per second) for load control
    #[arg(long, env = "SIMULATE_THROTTLE_REQUESTS")]
    throttle_requests: Option<usize>,

    /// Share of requests that must succeed for the run to pass. The check rate
    /// has to be above it, so it is below 1.
    #[arg(long, env = "CHECK_THRESHOLD", default_value_t = 0.99)]
    check_threshold: f64,

    /// Write goose's request log to this file.
    #[arg(long, env = "SIMULATE_REQUEST_LOG")]
    request_log: Option<String>,
}

#[derive(Clone, Debug, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum Scenario {
    /// Each user drains the configured listing page by page, over and over.
    #[default]
    List,
    /// Each user asks the configured listing for its item count.
    Count,
    /// Each user rewrites random seeded config maps.
    Churn,
}

impl Scenario {
    pub fn name(&self) -> &'static str {
        match self {
            Scenario::List => "list",
            Scenario::Count => "count",
            Scenario::Churn => "churn",
        }
    }

    /// Goose metric key of the request the scenario is built around.
    fn main_request(&self) -> &'static str {
        match self {
            Scenario::List => list::LIST_PAGE_REQ_NAME,
            Scenario::Count => count::COUNT_REQ_NAME,
            Scenario::Churn => churn::GET_CONFIG_MAP_REQ_NAME,
        }
    }
}

/// Request outcomes summed over every request name of an attack.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
struct RequestTally {
    success: usize,
    fail: usize,
    gone: usize,
}

impl RequestTally {
    fn from_metrics(metrics: &GooseMetrics) -> Self {
        metrics
            .requests
            .values()
            .fold(Self::default(), |mut tally, request| {
                tally.success += request.success_count;
                tally.fail += request.fail_count;
                tally.gone += request
                    .status_code_counts
                    .get(&GONE)
                    .copied()
                    .unwrap_or(0);
                tally
            })
    }

    fn total(&self) -> usize {
        self.success + self.fail
    }

    fn check_rate(&self) -> f64 {
        if self.total() == 0 {
            0.0
        } else {
            self.success as f64 / self.total() as f64
        }
    }
}

/// This struct holds information about the state of the simulation that
/// allows us to determine whether or not we met our success criteria.
#[derive(Debug)]
struct ScenarioState {
    scenario: Scenario,
    plan: Arc<Plan>,
    users: usize,
    iterations: Option<usize>,
    run_time: String,
    startup_time: Option<String>,
    throttle_requests: Option<usize>,
    check_threshold: f64,
    request_log: Option<String>,
}

impl ScenarioState {
    async fn try_from_opts(opts: Opts) -> Result<Self> {
        tracing::debug!(scenario = opts.scenario.name(), users = opts.users, "building state from opts");
        if opts.users == 0 {
            bail!("at least one user is required");
        }
        // The check rate must be strictly above the threshold.
        if !(0.0..1.0).contains(&opts.check_threshold) {
            bail!(
                "check threshold must be at least 0 and below 1, got {}",
                opts.check_threshold
            );
        }
        if opts.scenario == Scenario::Churn && opts.config_maps.config_maps == 0 {
            bail!("the churn scenario needs at least one seeded config map");
        }
        let config = Config::from_opts(opts.target)?;
        let client = config.http_client()?;
        let session = config.session(&client).await?;
        Ok(Self {
            scenario: opts.scenario,
            plan: Arc::new(Plan::new(config, session, opts.config_maps)?),
            users: opts.users,
            iterations: opts.iterations,
            run_time: opts.run_time,
            startup_time: opts.startup_time,
            throttle_requests: opts.throttle_requests,
            check_threshold: opts.check_threshold,
            request_log: opts.request_log,
        })
    }

    fn build_goose_scenario(&self) -> Result<goose::prelude::Scenario> {
        let plan = self.plan.clone();
        let scenario = match self.scenario {
            Scenario::List => list::scenario(plan)?,
            Scenario::Count => count::scenario(plan)?,
            Scenario::Churn => churn::scenario(plan)?,
        };
        Ok(scenario)
    }

    /// Not a result so the metrics are always recorded, even on failure.
    fn validate_scenario_success(&self, tally: &RequestTally) -> CommandResult {
        let rate = tally.check_rate();
        let mut errors = Vec::new();
        if tally.total() == 0 {
            errors.push("no requests were made".to_owned());
        } else if rate <= self.check_threshold {
            warn!(rate, threshold = self.check_threshold, "check rate at or below threshold");
            errors.push(format!(
                "check rate {:.4} is not above threshold {}",
                rate, self.check_threshold
            ));
        }
        if tally.gone > 0 {
            warn!(gone = tally.gone, "listings expired on the server");
            errors.push(format!(
                "{} requests returned 410 Gone, pages were not read fast enough",
                tally.gone
            ));
        }
        if errors.is_empty() {
            info!(rate, threshold = self.check_threshold, ?tally, "SUCCESS! check rate over the threshold");
            CommandResult::Success
        } else {
            warn!(?errors, ?tally, "FAILURE! scenario did not meet its checks");
            CommandResult::Failure(anyhow!(errors.join("\n")))
        }
    }

    fn goose_config(&self) -> GooseConfiguration {
        let mut config = GooseConfiguration::default();
        config.log_level = 2;
        config.host = self
            .plan
            .config
            .base_url
            .as_str()
            .trim_end_matches('/')
            .to_owned();
        config.users = Some(self.users);
        match self.iterations {
            Some(iterations) => config.iterations = iterations,
            None => config.run_time = self.run_time.clone(),
        }
        if let Some(startup_time) = &self.startup_time {
            config.startup_time = startup_time.clone();
        }
        if let Some(throttle_requests) = self.throttle_requests {
            config.throttle_requests = throttle_requests
        }
        if let Some(request_log) = &self.request_log {
            config.request_log = request_log.clone();
        }
        config
    }
}

#[tracing::instrument(skip_all, fields(scenario = opts.scenario.name()))]
pub async fn simulate(opts: Opts) -> Result<CommandResult> {
    let state = ScenarioState::try_from_opts(opts).await?;
    let scenario = state.build_goose_scenario()?;
    let config = state.goose_config();

    let goose_metrics = match GooseAttack::initialize_with_config(config)?
        .register_scenario(scenario)
        .execute()
        .await
    {
        Ok(m) => m,
        Err(e) => {
            error!("{:#?}", e);
            return Err(e.into());
        }
    };

    let tally = RequestTally::from_metrics(&goose_metrics);
    if let Some(main) = goose_metrics.requests.get(state.scenario.main_request()) {
        info!(
            request = state.scenario.main_request(),
            success = main.success_count,
            fail = main.fail_count,
            "main request totals"
        );
    }
    let success = state.validate_scenario_success(&tally);
    record_metrics(state.scenario, &goose_metrics, &tally);

    Ok(success)
}

/// Export the totals of a finished attack.
fn record_metrics(scenario: Scenario, metrics: &GooseMetrics, tally: &RequestTally) {
    let meter = global::meter("simulate");
    let attrs = vec![KeyValue::new("scenario", scenario.name())];

    let requests_total = meter
        .u64_counter("fleetbench_requests_total")
        .with_description("Total number of requests")
        .init();
    let status_codes_total = meter
        .u64_counter("fleetbench_status_codes_total")
        .with_description("Total number of requests with a status code")
        .init();
    let gone_total = meter
        .u64_counter("fleetbench_gone_total")
        .with_description("Total number of requests answered with 410 Gone")
        .init();
    let run_seconds = meter
        .u64_counter("fleetbench_run_seconds_total")
        .with_description("Total number of seconds the load test ran")
        .init();

    run_seconds.add(metrics.duration as u64, &attrs);
    gone_total.add(tally.gone as u64, &attrs);

    for (name, request) in &metrics.requests {
        let mut attrs = attrs.clone();
        attrs.push(KeyValue::new("name", name.clone()));

        attrs.push(KeyValue::new("result", "success"));
        requests_total.add(request.success_count as u64, &attrs);
        attrs.pop();

        attrs.push(KeyValue::new("result", "fail"));
        requests_total.add(request.fail_count as u64, &attrs);
        attrs.pop();

        for (code, count) in &request.status_code_counts {
            attrs.push(KeyValue::new("code", code.to_string()));
            status_codes_total.add(*count as u64, &attrs);
            attrs.pop();
        }
    }
}

#[cfg(test)]
mod test {
    use clap::Parser;
    use test_log::test;

    use super::*;

    #[derive(Parser, Debug)]
    struct Cli {
        #[command(flatten)]
        opts: Opts,
    }

    fn get_opts(args: &[&str]) -> Opts {
        let mut argv = vec!["fleetbench-runner", "--base-url", "https://rancher.test/"];
        argv.extend_from_slice(args);
        Cli::try_parse_from(argv).unwrap().opts
    }

    async fn get_state(args: &[&str]) -> ScenarioState {
        ScenarioState::try_from_opts(get_opts(args)).await.unwrap()
    }

    fn tally(success: usize, fail: usize, gone: usize) -> RequestTally {
        RequestTally {
            success,
            fail,
            gone,
        }
    }

    #[test(tokio::test)]
    async fn passes_above_threshold() {
        let state = get_state(&[]).await;
        match state.validate_scenario_success(&tally(995, 5, 0)) {
            CommandResult::Success => (),
            e => panic!("expected success, got {:?}", e),
        }
    }

    #[test(tokio::test)]
    async fn fails_at_threshold() {
        let state = get_state(&[]).await;
        match state.validate_scenario_success(&tally(99, 1, 0)) {
            CommandResult::Failure(e) => info!("got expected failure: {}", e),
            e => panic!("expected failure, got {:?}", e),
        }
    }

    #[test(tokio::test)]
    async fn any_gone_fails() {
        let state = get_state(&[]).await;
        match state.validate_scenario_success(&tally(10_000, 1, 1)) {
            CommandResult::Failure(e) => assert!(e.to_string().contains("410")),
            e => panic!("expected failure, got {:?}", e),
        }
    }

    #[test(tokio::test)]
    async fn no_requests_fails() {
        let state = get_state(&[]).await;
        match state.validate_scenario_success(&tally(0, 0, 0)) {
            CommandResult::Failure(e) => info!("got expected failure: {}", e),
            e => panic!("expected failure, got {:?}", e),
        }
    }

    #[test(tokio::test)]
    async fn custom_threshold() {
        let state = get_state(&["--check-threshold", "0.5"]).await;
        match state.validate_scenario_success(&tally(6, 4, 0)) {
            CommandResult::Success => (),
            e => panic!("expected success, got {:?}", e),
        }
    }

    #[test(tokio::test)]
    async fn iterations_replace_run_time() {
        let state = get_state(&["--users", "8", "--iterations", "3"]).await;
        let config = state.goose_config();
        assert_eq!(config.host, "https://rancher.test");
        assert_eq!(config.users, Some(8));
        assert_eq!(config.iterations, 3);
        assert_eq!(config.run_time, "");

        let state = get_state(&["--run-time", "5m", "--throttle-requests", "20"]).await;
        let config = state.goose_config();
        assert_eq!(config.iterations, 0);
        assert_eq!(config.run_time, "5m");
        assert_eq!(config.throttle_requests, 20);
    }

    #[test(tokio::test)]
    async fn rejects_invalid_opts() {
        assert!(ScenarioState::try_from_opts(get_opts(&["--users", "0"]))
            .await
            .is_err());
        assert!(ScenarioState::try_from_opts(get_opts(&["--check-threshold", "1.5"]))
            .await
            .is_err());
        assert!(ScenarioState::try_from_opts(get_opts(&["--check-threshold", "1.0"]))
            .await
            .is_err());
        assert!(ScenarioState::try_from_opts(get_opts(&[
            "--scenario",
            "churn",
            "--config-maps",
            "0"
        ]))
        .await
        .is_err());
    }

    #[test]
    fn scenario_names() {
        assert_eq!(Scenario::List.name(), "list");
        assert_eq!(Scenario::Count.name(), "count");
        assert_eq!(Scenario::Churn.name(), "churn");
        assert_eq!(Scenario::List.main_request(), "GET list_page");
    }
}
