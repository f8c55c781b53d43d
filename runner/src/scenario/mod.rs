use anyhow::Result;
use fleetbench_common::{pagination::ListRequest, session::Session};
use reqwest::Url;

use crate::{config::Config, resources::ConfigMapOpts};

pub mod churn;
pub mod count;
pub mod list;
pub mod util;

/// Everything a goose user needs to issue its requests. Built once before the
/// attack and shared read only between users.
#[derive(Clone, Debug)]
pub struct Plan {
    pub config: Config,
    pub session: Session,
    pub request: ListRequest,
    pub count_url: Url,
    pub config_maps: ConfigMapOpts,
}

impl Plan {
    pub fn new(config: Config, session: Session, config_maps: ConfigMapOpts) -> Result<Self> {
        let request = config.list_request()?;
        let mut count_url = config.listing_url()?;
        count_url
            .query_pairs_mut()
            .append_pair("projectsornamespaces", &config_maps.namespace)
            .append_pair("page", "1")
            .append_pair("pagesize", "1");
        Ok(Self {
            config,
            session,
            request,
            count_url,
            config_maps,
        })
    }

    /// URL of one seeded config map.
    pub fn config_map_url(&self, name: &str) -> Result<Url> {
        self.config.steve_url(&format!(
            "configmaps/{}/{}",
            self.config_maps.namespace, name
        ))
    }
}
