//! Backend host list parsing and load-based selection.

use super::{HostLoad, LoadProbe};
use crate::error::PipelineError;
use reqwest::Url;
use tracing::{debug, info, warn};

pub(crate) const DEFAULT_PORT: u16 = 3000;

/// Split a host list on commas and whitespace, normalizing each entry.
pub(crate) fn parse_host_list(raw: &str) -> Result<Vec<String>, PipelineError> {
    raw.split(|c: char| c == ',' || c.is_whitespace())
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(normalize_host)
        .collect()
}

/// Reduce a host entry to `scheme://host:port`.
///
/// A bare `host[:port]` is taken as `http`. Entries without an explicit port
/// get port 3000; paths are dropped.
pub(crate) fn normalize_host(raw: &str) -> Result<String, PipelineError> {
    let s = raw.trim();
    let with_scheme = if s.contains("://") {
        s.to_string()
    } else {
        format!("http://{s}")
    };
    let url = Url::parse(&with_scheme)
        .map_err(|e| PipelineError::Input(format!("invalid backend host {s:?}: {e}")))?;
    let host = url
        .host_str()
        .filter(|h| !h.is_empty())
        .ok_or_else(|| PipelineError::Input(format!("backend host {s:?} names no host")))?;
    // Url drops a port equal to the scheme default, so look for it in the text.
    let port = url.port().unwrap_or_else(|| {
        match url.port_or_known_default() {
            Some(default) if names_port(&with_scheme, default) => default,
            _ => DEFAULT_PORT,
        }
    });
    Ok(format!("{}://{host}:{port}", url.scheme()))
}

fn names_port(url: &str, port: u16) -> bool {
    let rest = url.split_once("://").map_or(url, |(_, rest)| rest);
    let authority = rest.split(['/', '?', '#']).next().unwrap_or(rest);
    authority.ends_with(&format!(":{port}"))
}

/// Picks one backend out of the configured candidates.
#[derive(Debug, Clone)]
pub(crate) struct HostSelector {
    hosts: Vec<String>,
}

impl HostSelector {
    pub fn new(hosts: Vec<String>) -> Self {
        Self { hosts }
    }

    pub fn hosts(&self) -> &[String] {
        &self.hosts
    }

    /// Choose the least-loaded responsive host.
    ///
    /// A single configured host is used without probing. Unreachable hosts
    /// are excluded, not retried.
    pub async fn select<P: LoadProbe>(&self, probe: &P) -> Result<String, PipelineError> {
        match self.hosts.as_slice() {
            [] => Err(PipelineError::NoHostAvailable {
                failures: vec!["no hosts configured".into()],
            }),
            [only] => {
                debug!(host = %only, "single host configured, skipping probe");
                Ok(only.clone())
            }
            hosts => {
                let results =
                    futures::future::join_all(hosts.iter().map(|h| probe.probe(h))).await;
                pick_least_loaded(hosts, results)
            }
        }
    }
}

fn pick_least_loaded(
    hosts: &[String],
    results: Vec<Result<HostLoad, String>>,
) -> Result<String, PipelineError> {
    let mut best: Option<(&String, u64)> = None;
    let mut failures = Vec::new();
    for (host, result) in hosts.iter().zip(results) {
        match result {
            Ok(load) => {
                debug!(
                    host = %host,
                    queue = load.queue,
                    engine = load.engine.as_deref().unwrap_or("-"),
                    version = load.version.as_deref().unwrap_or("-"),
                    "host responded"
                );
                // Strict comparison keeps the earlier host on ties.
                if best.map_or(true, |(_, q)| load.queue < q) {
                    best = Some((host, load.queue));
                }
            }
            Err(reason) => {
                warn!(host = %host, %reason, "host unreachable, excluding");
                failures.push(format!("{host}: {reason}"));
            }
        }
    }
    match best {
        Some((host, queue)) => {
            info!(host = %host, queue, "selected backend host");
            Ok(host.clone())
        }
        None => Err(PipelineError::NoHostAvailable { failures }),
    }
}
