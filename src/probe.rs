//! Concurrent reachability probing and ranking of candidate gateways.
//!
//! One task per unique host, each owning its own result slot; a per-host
//! timeout bounds worst-case wall time. Probing is best-effort: a host
//! that cannot be measured ranks worst instead of failing the batch.

use async_trait::async_trait;
use regex::Regex;
use std::cmp::Ordering;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::process::Command;

use crate::settings::ProbeSettings;
use crate::topology::Candidate;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProbeResult {
    /// Packet loss percentage, or infinity when unreachable.
    pub packet_loss: f64,

    /// Average round-trip time in milliseconds, or infinity.
    pub latency_ms: f64,
}

impl ProbeResult {
    pub const UNREACHABLE: ProbeResult = ProbeResult {
        packet_loss: f64::INFINITY,
        latency_ms: f64::INFINITY,
    };

    pub fn is_reachable(&self) -> bool {
        self.packet_loss.is_finite()
    }

    /// Ranking order: lower packet loss wins, latency breaks ties.
    /// total_cmp keeps the infinity sentinel sorting last.
    pub fn rank_cmp(&self, other: &ProbeResult) -> Ordering {
        self.packet_loss
            .total_cmp(&other.packet_loss)
            .then(self.latency_ms.total_cmp(&other.latency_ms))
    }
}

/// Capability interface for reachability measurement, so tests can
/// substitute deterministic fakes for the ping subprocess.
#[async_trait]
pub trait ProbeRunner: Send + Sync {
    async fn probe(&self, host: &str) -> ProbeResult;
}

/// Production probe runner: shells out to the system `ping`.
pub struct PingRunner {
    sample_count: u32,
    timeout: Duration,
    stats_pattern: Regex,
}

impl PingRunner {
    pub fn new(settings: &ProbeSettings) -> Self {
        Self {
            sample_count: settings.sample_count,
            timeout: Duration::from_secs(settings.timeout_secs),
            // Matches both Linux ("rtt min/avg/max/mdev") and BSD
            // ("round-trip min/avg/max/stddev") summary lines.
            stats_pattern: Regex::new(
                r"(?s)([\d.]+)% packet loss.*min/avg/max\S* = [\d.]+/([\d.]+)",
            )
            .expect("static pattern"),
        }
    }

    fn parse_output(&self, stdout: &str) -> Option<ProbeResult> {
        let captures = self.stats_pattern.captures(stdout)?;
        let packet_loss = captures.get(1)?.as_str().parse().ok()?;
        let latency_ms = captures.get(2)?.as_str().parse().ok()?;
        Some(ProbeResult {
            packet_loss,
            latency_ms,
        })
    }
}

#[async_trait]
impl ProbeRunner for PingRunner {
    async fn probe(&self, host: &str) -> ProbeResult {
        let mut command = Command::new("ping");
        command
            .arg(host)
            .args(["-c", &self.sample_count.to_string()])
            .kill_on_drop(true);

        let output = match tokio::time::timeout(self.timeout, command.output()).await {
            Ok(Ok(output)) => output,
            Ok(Err(err)) => {
                tracing::warn!("Failed to run ping for {}: {}", host, err);
                return ProbeResult::UNREACHABLE;
            }
            Err(_) => {
                tracing::warn!("Ping for {} timed out after {:?}", host, self.timeout);
                return ProbeResult::UNREACHABLE;
            }
        };

        if !output.status.success() {
            tracing::warn!("Ping for {} exited with {}", host, output.status);
            return ProbeResult::UNREACHABLE;
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        match self.parse_output(&stdout) {
            Some(result) => result,
            None => {
                tracing::warn!("Failed to parse ping output for {}", host);
                ProbeResult::UNREACHABLE
            }
        }
    }
}

/// Probe every unique host concurrently and collect the results.
///
/// Each spawned task returns its own (host, result) pair through its join
/// handle, so there is no shared mutable state between probes.
pub async fn probe_hosts(
    runner: Arc<dyn ProbeRunner>,
    hosts: &[String],
) -> HashMap<String, ProbeResult> {
    let mut unique: Vec<&String> = hosts.iter().collect();
    unique.sort();
    unique.dedup();

    let mut handles = Vec::with_capacity(unique.len());
    for host in unique {
        let runner = runner.clone();
        let host = host.clone();
        handles.push((
            host.clone(),
            tokio::spawn(async move { runner.probe(&host).await }),
        ));
    }

    let mut stats = HashMap::with_capacity(handles.len());
    for (host, handle) in handles {
        let result = match handle.await {
            Ok(result) => result,
            Err(err) => {
                tracing::warn!("Probe task for {} failed: {}", host, err);
                ProbeResult::UNREACHABLE
            }
        };
        stats.insert(host, result);
    }

    stats
}

/// Order candidates by probe ranking and keep the best `top` of them.
/// The sort is stable, so candidates with identical measurements keep
/// their directory order.
pub fn rank_candidates(
    mut candidates: Vec<Candidate>,
    stats: &HashMap<String, ProbeResult>,
    top: usize,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        let a_stats = stats.get(&a.host).copied().unwrap_or(ProbeResult::UNREACHABLE);
        let b_stats = stats.get(&b.host).copied().unwrap_or(ProbeResult::UNREACHABLE);
        a_stats.rank_cmp(&b_stats)
    });
    candidates.truncate(top);
    candidates
}

/// Probe all candidate hosts and return the top-ranked candidates.
pub async fn select_gateways(
    runner: Arc<dyn ProbeRunner>,
    candidates: Vec<Candidate>,
    top: usize,
) -> Vec<Candidate> {
    let hosts: Vec<String> = candidates.iter().map(|c| c.host.clone()).collect();
    let stats = probe_hosts(runner, &hosts).await;

    for (host, result) in &stats {
        if result.is_reachable() {
            tracing::debug!(
                "Probe {}: {}% loss, {} ms",
                host,
                result.packet_loss,
                result.latency_ms
            );
        } else {
            tracing::debug!("Probe {}: unreachable", host);
        }
    }

    rank_candidates(candidates, &stats, top)
}
