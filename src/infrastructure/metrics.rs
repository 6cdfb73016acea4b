// Copyright (c) 2025 Kirky.X
//
// Licensed under the MIT License
// See LICENSE file in the project root for full license information.

use anyhow::Context;
use metrics::{describe_counter, describe_gauge, describe_histogram};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use tracing::{info, warn};

/// 启动 Prometheus 指标导出
pub fn init_metrics(listen_addr: &str) -> anyhow::Result<()> {
    let addr: SocketAddr = listen_addr
        .parse()
        .with_context(|| format!("Invalid metrics address '{}'", listen_addr))?;

    // 端口被占用时只告警，采集本身不依赖指标
    if let Err(e) = PrometheusBuilder::new().with_http_listener(addr).install() {
        warn!("Failed to install Prometheus recorder: {}. This might happen if the port is already in use.", e);
        return Ok(());
    }

    describe_metrics();
    info!("Metrics exporter listening on {}", addr);
    Ok(())
}

fn describe_metrics() {
    describe_counter!("fetch_attempts_total", "Platform fetch attempts by result");
    describe_histogram!("fetch_backoff_seconds", "Backoff delay before a fetch retry");
    describe_counter!("collection_runs_total", "Collection runs by result");
    describe_counter!("merge_groups_total", "Canonical businesses produced by merges");
    describe_counter!("identity_acquire_total", "Identity lease attempts by result");
    describe_counter!("identity_cooldown_total", "Identities sent into cooldown");
    describe_gauge!("identity_pool_healthy", "Identities currently available for lease");
    describe_counter!("scheduler_jobs_dispatched_total", "Scheduled job runs dispatched");
    describe_counter!(
        "scheduler_persistence_errors_total",
        "Failed writes of scheduled job state"
    );
}
