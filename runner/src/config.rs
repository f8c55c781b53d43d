//! Run configuration, captured once at startup and passed by reference.
use std::time::Duration;

use anyhow::{bail, Result};
use clap::{Args, ValueEnum};
use fleetbench_common::{
    pagination::{Flavor, ListRequest},
    session::Session,
};
use reqwest::{Client, Url};
use tracing::{debug, warn};

/// API family serving the listed resource.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum Api {
    /// `/v1` resources, optionally proxied to a downstream cluster.
    #[default]
    Steve,
    /// Legacy `/v3` resources.
    Norman,
}

/// Pagination convention used against the Steve API.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum PaginationStyle {
    /// `limit`/`continue` with a `revision` fence.
    #[default]
    K8s,
    /// `pagesize`/`page` with a `revision` fence.
    Steve,
}

/// Options shared by every command that talks to the platform.
#[derive(Args, Debug, Clone)]
pub struct TargetOpts {
    /// Base URL of the platform, e.g. https://rancher.example.com
    #[arg(long, env = "BASE_URL")]
    base_url: Url,

    /// Username for the local authentication provider.
    #[arg(long, env = "USERNAME")]
    username: Option<String>,

    /// Password for the local authentication provider.
    #[arg(long, env = "PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Existing session token, used as the R_SESS cookie. Takes precedence over
    /// username and password.
    #[arg(long, env = "TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Cluster whose resources are listed, `local` for the management cluster.
    #[arg(long, env = "CLUSTER", default_value = "local")]
    cluster: String,

    /// Resource type to list.
    #[arg(long, env = "RESOURCE", default_value = "management.cattle.io.setting")]
    resource: String,

    /// API family to list through.
    #[arg(long, value_enum, env = "API", default_value_t)]
    api: Api,

    /// Pagination style, only meaningful for the Steve API.
    #[arg(long, value_enum, env = "PAGINATION_STYLE", default_value_t)]
    pagination_style: PaginationStyle,

    /// Items requested per page.
    #[arg(long, env = "PAGE_SIZE", default_value_t = 100)]
    page_size: u32,

    /// Extra query string appended to every Steve list request,
    /// e.g. `&filter=metadata.namespace=default`.
    #[arg(long, env = "URL_SUFFIX")]
    url_suffix: Option<String>,

    /// Abandon a listing that takes longer than this, e.g. `30s`, `5m`.
    #[arg(long, env = "LIST_DEADLINE", value_parser = parse_duration)]
    list_deadline: Option<Duration>,

    /// Timeout of individual requests outside of listings.
    #[arg(long, env = "REQUEST_TIMEOUT", value_parser = parse_duration, default_value = "60s")]
    request_timeout: Duration,

    /// Accept invalid TLS certificates, as test installations usually have them.
    #[arg(long, env = "INSECURE_SKIP_TLS_VERIFY", default_value_t = true, action = clap::ArgAction::Set)]
    insecure: bool,
}

/// Immutable snapshot of the target platform and listing parameters.
#[derive(Clone, Debug)]
pub struct Config {
    pub base_url: Url,
    pub cluster: String,
    pub resource: String,
    pub api: Api,
    pub pagination_style: PaginationStyle,
    pub page_size: u32,
    pub url_suffix: Option<String>,
    pub list_deadline: Option<Duration>,
    pub request_timeout: Duration,
    pub insecure: bool,
    token: Option<String>,
    credentials: Option<(String, String)>,
}

impl Config {
    pub fn from_opts(opts: TargetOpts) -> Result<Self> {
        if opts.page_size == 0 {
            bail!("page size must be at least 1");
        }
        if opts.cluster.is_empty() {
            bail!("cluster must not be empty");
        }
        if opts.list_deadline.is_some_and(|d| d.is_zero()) {
            bail!("list deadline must be longer than zero");
        }
        let credentials = match (opts.username, opts.password) {
            (Some(username), Some(password)) => Some((username, password)),
            (None, None) => None,
            (username, _) => {
                warn!(
                    has_username = username.is_some(),
                    "username and password must be given together, ignoring credentials"
                );
                None
            }
        };
        Ok(Self {
            base_url: opts.base_url,
            cluster: opts.cluster,
            resource: opts.resource,
            api: opts.api,
            pagination_style: opts.pagination_style,
            page_size: opts.page_size,
            url_suffix: opts.url_suffix.filter(|s| !s.is_empty()),
            list_deadline: opts.list_deadline,
            request_timeout: opts.request_timeout,
            insecure: opts.insecure,
            token: opts.token,
            credentials,
        })
    }

    /// Pagination convention of the configured listing.
    pub fn flavor(&self) -> Flavor {
        match (self.api, self.pagination_style) {
            (Api::Norman, _) => Flavor::NextLink,
            (Api::Steve, PaginationStyle::K8s) => Flavor::Cursor,
            (Api::Steve, PaginationStyle::Steve) => Flavor::PageNumber,
        }
    }

    /// URL of a path on the management cluster, e.g. `v3/users`.
    pub fn api_url(&self, path: &str) -> Result<Url> {
        Ok(Url::parse(&format!(
            "{}/{}",
            self.base_url.as_str().trim_end_matches('/'),
            path.trim_start_matches('/')
        ))?)
    }

    /// URL of a Steve path on the configured cluster.
    pub fn steve_url(&self, path: &str) -> Result<Url> {
        let path = path.trim_start_matches('/');
        if self.cluster == "local" {
            self.api_url(&format!("v1/{path}"))
        } else {
            self.api_url(&format!("k8s/clusters/{}/v1/{path}", self.cluster))
        }
    }

    /// Collection URL of the configured resource.
    pub fn listing_url(&self) -> Result<Url> {
        match self.api {
            Api::Steve => self.steve_url(&self.resource),
            Api::Norman => self.api_url(&format!("v3/{}", self.resource)),
        }
    }

    /// Listing of the configured resource, ready to hand to a pager.
    pub fn list_request(&self) -> Result<ListRequest> {
        let mut request =
            ListRequest::new(self.listing_url()?, self.flavor()).with_page_size(self.page_size);
        // Norman follows server links verbatim, a suffix would be lost after page one.
        if self.api == Api::Steve {
            if let Some(suffix) = &self.url_suffix {
                request = request.with_suffix(suffix.clone());
            }
        }
        if let Some(deadline) = self.list_deadline {
            request = request.with_deadline(deadline);
        }
        Ok(request)
    }

    /// HTTP client for requests made outside of goose.
    pub fn http_client(&self) -> Result<Client> {
        Ok(Client::builder()
            .danger_accept_invalid_certs(self.insecure)
            .connect_timeout(Duration::from_secs(10))
            .timeout(self.request_timeout)
            .build()?)
    }

    /// Establish the session every request of the run presents.
    pub async fn session(&self, client: &Client) -> Result<Session> {
        let credentials = self
            .credentials
            .as_ref()
            .map(|(username, password)| (username.as_str(), password.as_str()));
        let session =
            Session::resolve(client, &self.base_url, self.token.as_deref(), credentials).await?;
        debug!(anonymous = session == Session::Anonymous, "session ready");
        Ok(session)
    }
}

/// Parse durations such as `90s`, `5m`, `2h` or a plain number of seconds.
pub fn parse_duration(s: &str) -> Result<Duration, String> {
    let s = s.trim();
    let (number, scale) = if let Some(ms) = s.strip_suffix("ms") {
        (ms, 0)
    } else if let Some(hours) = s.strip_suffix('h') {
        (hours, 3600)
    } else if let Some(minutes) = s.strip_suffix('m') {
        (minutes, 60)
    } else if let Some(secs) = s.strip_suffix('s') {
        (secs, 1)
    } else {
        (s, 1)
    };
    let n: u64 = number
        .trim()
        .parse()
        .map_err(|_| format!("invalid duration '{s}', expected e.g. 1h, 30m, 90s, 500ms"))?;
    Ok(if scale == 0 {
        Duration::from_millis(n)
    } else {
        Duration::from_secs(n * scale)
    })
}
