// Copyright 2025 Kirky.X
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use listingrs::config::settings::Settings;
use listingrs::domain::repositories::job_repository::JobRepository;
use listingrs::domain::services::merge_engine::MergeEngine;
use listingrs::engines::collection::CollectionCoordinator;
use listingrs::engines::fetch_coordinator::ResilientFetcher;
use listingrs::engines::http_adapter::JsonListingAdapter;
use listingrs::engines::identity_pool::IdentityPool;
use listingrs::engines::proxy_list::load_identities;
use listingrs::infrastructure::database::connection;
use listingrs::infrastructure::metrics::init_metrics;
use listingrs::infrastructure::repositories::job_repo_impl::JobRepositoryImpl;
use listingrs::infrastructure::result_sink::InMemoryResultSink;
use listingrs::presentation::routes::{self, AdminServices};
use listingrs::scheduler::{JobScheduler, SystemClock};
use listingrs::utils::telemetry;
use migration::{Migrator, MigratorTrait};
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// 主函数
///
/// 应用程序入口点，负责初始化所有组件并启动服务
#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // 1. Load configuration
    let settings = Arc::new(Settings::new()?);

    // 2. Initialize logging and metrics
    telemetry::init_telemetry(settings.logging.format);
    info!("Starting listingrs...");
    if settings.metrics.enabled {
        init_metrics(&settings.metrics.listen_addr)?;
    }

    // 3. Connect to database
    let db = Arc::new(connection::create_pool(&settings.database).await?);
    info!("Running database migrations...");
    Migrator::up(db.as_ref(), None).await?;
    info!("Database migrations applied");

    // 4. Identity pool and fetcher
    let identities = load_identities(&settings.identity).await?;
    let pool = Arc::new(IdentityPool::new(identities, settings.identity.pool_config()));
    let fetcher = Arc::new(
        ResilientFetcher::new(pool.clone(), settings.retry.policy())
            .with_request_interval(settings.collection.request_interval())
            .with_fetch_timeout(settings.collection.fetch_timeout()),
    );

    // 5. Platform adapters
    let mut coordinator = CollectionCoordinator::new(
        fetcher,
        MergeEngine::new(settings.dedup.merge_config()),
        settings.collection.max_concurrent_platforms,
    );
    for platform in settings.platforms.iter().filter(|p| p.enabled) {
        coordinator.register(Arc::new(JsonListingAdapter::from_settings(platform)));
        info!(platform = %platform.id, endpoint = %platform.endpoint, "Platform adapter registered");
    }
    if coordinator.platforms().is_empty() {
        warn!("No platform adapters configured, collections will report unsupported platforms");
    }
    let coordinator = Arc::new(coordinator);

    // 6. Scheduler
    let job_repo: Arc<dyn JobRepository> = Arc::new(JobRepositoryImpl::new(db.clone()));
    let results = Arc::new(InMemoryResultSink::new());
    let shutdown = CancellationToken::new();

    let (scheduler, handle) = JobScheduler::new(
        job_repo.clone(),
        coordinator.clone(),
        Arc::new(SystemClock),
        settings.scheduler.tick_interval(),
    );
    let scheduler = scheduler.with_sink(results.clone());
    let scheduler_task = if settings.scheduler.enabled {
        Some(tokio::spawn(scheduler.run(shutdown.clone())))
    } else {
        warn!("Scheduler disabled by configuration");
        None
    };

    // 7. Start HTTP server
    let app = routes::routes(AdminServices {
        jobs: job_repo,
        scheduler: handle,
        coordinator,
        results,
    });

    let addr = format!("{}:{}", settings.server.host, settings.server.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("Admin API listening on {}", addr);

    let signal = shutdown.clone();
    axum::serve(listener, app)
        .with_graceful_shutdown(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                warn!("Failed to listen for shutdown signal: {}", e);
            }
            info!("Shutdown signal received");
            signal.cancel();
        })
        .await?;

    shutdown.cancel();
    if let Some(task) = scheduler_task {
        task.await?;
    }
    info!("listingrs stopped");
    Ok(())
}
