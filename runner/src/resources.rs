//! Config map fixtures shared by the seed command and the churn scenario.
use clap::Args;
use fleetbench_common::retry::DEFAULT_CONFLICT_RETRIES;
use serde_json::{json, Value};

/// Label put on every seeded config map.
pub const SEED_LABEL: &str = "fleetbench/seeded";

/// Where seeded config maps live and how writes are retried.
#[derive(Args, Debug, Clone)]
pub struct ConfigMapOpts {
    /// Namespace holding the config maps.
    #[arg(long, env = "NAMESPACE", default_value = "scalability-test")]
    pub namespace: String,

    /// Number of config maps.
    #[arg(long, env = "CONFIG_MAP_COUNT", default_value_t = 100)]
    pub config_maps: usize,

    /// Config map names are `<prefix>-<index>`.
    #[arg(long, env = "CONFIG_MAP_PREFIX", default_value = "test-config-map")]
    pub prefix: String,

    /// Conflicting attempts tolerated before the final write attempt.
    #[arg(long, env = "CONFLICT_RETRIES", default_value_t = DEFAULT_CONFLICT_RETRIES)]
    pub conflict_retries: usize,
}

pub fn config_map_name(prefix: &str, index: usize) -> String {
    format!("{prefix}-{index}")
}

pub fn namespace_body(namespace: &str) -> Value {
    json!({
        "type": "namespace",
        "metadata": { "name": namespace },
    })
}

pub fn config_map_body(namespace: &str, name: &str, data: &str) -> Value {
    json!({
        "type": "configmap",
        "metadata": {
            "name": name,
            "namespace": namespace,
            "labels": { SEED_LABEL: "true" },
        },
        "data": { "data": data },
    })
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn names_are_indexed() {
        assert_eq!(config_map_name("test-config-map", 7), "test-config-map-7");
    }

    #[test]
    fn config_map_is_labelled_and_namespaced() {
        let body = config_map_body("scalability-test", "cm-1", "x");
        assert_eq!(body["metadata"]["namespace"], "scalability-test");
        assert_eq!(body["metadata"]["labels"][SEED_LABEL], "true");
        assert_eq!(body["data"]["data"], "x");
    }
}
