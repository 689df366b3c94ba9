//! Supervisor configuration file. Grounded on `cmd/supd/main.go`'s `Conf` /
//! `WorkerConf` structs and `parseConf`'s `meta.Undecoded()` check, ported to
//! `serde(deny_unknown_fields)` the same way `broker::config` does.

use std::path::Path;

use serde::Deserialize;

use crate::error::{SupervisorError, SupervisorResult};

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Conf {
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(rename = "worker", default)]
    pub workers: Vec<JobConf>,
}

/// One job definition. Named `JobConf` rather than `WorkerConf` to keep
/// "worker" for the one running child, matching spec.md §3's `Job` /
/// `Worker` split.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConf {
    pub name: String,
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: Vec<String>,
    #[serde(default)]
    pub dir: Option<String>,
    pub pool_size: usize,
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Conf {
    pub async fn read(path: &Path) -> SupervisorResult<Conf> {
        let data = tokio::fs::read_to_string(path)
            .await
            .map_err(SupervisorError::Io)?;
        let conf: Conf = toml::from_str(&data).map_err(|e| SupervisorError::Config(e.to_string()))?;

        for job in &conf.workers {
            if job.pool_size == 0 {
                return Err(SupervisorError::EmptyPool(job.name.clone()));
            }
        }

        Ok(conf)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_unknown_keys() {
        let toml = r#"
            log_level = "info"

            [[worker]]
            name = "echo"
            command = "/bin/echo"
            pool_size = 1
            bogus_key = 1
        "#;
        let err = toml::from_str::<Conf>(toml).unwrap_err();
        assert!(err.to_string().contains("bogus_key") || err.to_string().contains("unknown field"));
    }

    #[test]
    fn parses_minimal_job() {
        let toml = r#"
            [[worker]]
            name = "echo"
            command = "/bin/echo"
            pool_size = 2
        "#;
        let conf: Conf = toml::from_str(toml).unwrap();
        assert_eq!(conf.workers.len(), 1);
        assert_eq!(conf.workers[0].pool_size, 2);
        assert!(conf.workers[0].args.is_empty());
    }
}
