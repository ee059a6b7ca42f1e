//! Main integration module for the MLOps service
//!
//! This module wires configuration, the dataset store, the experiment
//! tracker, the model archive and the lifecycle service together, and runs
//! the REST and gRPC front ends over one shared [`ModelService`].

use std::future::Future;
use std::sync::Arc;

use anyhow::{Context, Result};
use gateways::{DatasetStore, ExperimentTracker, FsDatasetStore, HttpExperimentTracker, NoopTracker};
use model_manager::{LifecycleSettings, ModelArchive, ModelService};
use service_config::ServiceConfig;
use tokio::sync::watch;
use tracing::{info, warn};

pub use service_config;

/// The assembled service
pub struct MlopsService {
    /// Effective configuration
    config: ServiceConfig,

    /// Lifecycle service shared by both transports
    service: Arc<ModelService>,
}

impl MlopsService {
    /// Builds the gateways and the lifecycle service from configuration
    pub fn new(config: ServiceConfig) -> Result<Self> {
        info!("Initializing MLOps service");

        let datasets: Arc<dyn DatasetStore> = Arc::new(
            FsDatasetStore::new(&config.storage.datasets_dir)
                .with_context(|| format!("opening dataset store at {:?}", config.storage.datasets_dir))?,
        );

        let tracker: Arc<dyn ExperimentTracker> = match &config.tracker.endpoint {
            Some(endpoint) => {
                info!("Experiment tracking enabled at {}", endpoint);
                Arc::new(
                    HttpExperimentTracker::new(
                        endpoint,
                        &config.tracker.project,
                        config.tracker.api_key.clone(),
                        config.lifecycle.gateway_timeout(),
                    )
                    .context("creating experiment tracker client")?,
                )
            }
            None => {
                info!("No tracker endpoint configured; experiment tracking disabled");
                Arc::new(NoopTracker)
            }
        };

        let mut service = ModelService::new(LifecycleSettings::from(&config.lifecycle), datasets, tracker);
        if let Some(models_dir) = &config.storage.models_dir {
            let archive = ModelArchive::open(models_dir)
                .with_context(|| format!("opening model archive at {:?}", models_dir))?;
            service = service.with_archive(archive).context("restoring archived models")?;
        }

        Ok(Self {
            config,
            service: Arc::new(service),
        })
    }

    /// Lifecycle service handle
    pub fn service(&self) -> Arc<ModelService> {
        Arc::clone(&self.service)
    }

    /// Effective configuration
    pub fn config(&self) -> &ServiceConfig {
        &self.config
    }

    /// Runs both servers until `shutdown` resolves or a server fails, then
    /// stops the lifecycle service
    pub async fn run(self, shutdown: impl Future<Output = ()> + Send + 'static) -> Result<()> {
        let rest_addr = self.config.rest_addr()?;
        let grpc_addr = self.config.grpc_addr()?;
        let (stop_tx, stop_rx) = watch::channel(());

        let rest = {
            let service = self.service();
            let signal = stopped(stop_rx.clone());
            async move {
                api_gateway::rest::serve(rest_addr, service, signal)
                    .await
                    .context("REST server failed")
            }
        };
        let grpc = {
            let service = self.service();
            let signal = stopped(stop_rx);
            async move {
                api_gateway::grpc::serve(grpc_addr, service, signal)
                    .await
                    .context("gRPC server failed")
            }
        };
        let stop = async move {
            shutdown.await;
            info!("Shutdown requested, draining servers");
            let _ = stop_tx.send(());
            Ok::<(), anyhow::Error>(())
        };

        let served = tokio::try_join!(rest, grpc, stop);
        self.service.shutdown().await;
        match served {
            Ok(_) => {
                info!("MLOps service stopped");
                Ok(())
            }
            Err(e) => {
                warn!("MLOps service stopped after a server error: {:#}", e);
                Err(e)
            }
        }
    }
}

async fn stopped(mut rx: watch::Receiver<()>) {
    let _ = rx.changed().await;
}
