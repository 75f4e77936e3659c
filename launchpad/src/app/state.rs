//! Application state management

use std::sync::Arc;

use tracing::{info, warn};

use crate::app::options::AppOptions;
use crate::cloud::aws::AwsCli;
use crate::cloud::simulated::SimulatedCloud;
use crate::cloud::CloudClients;
use crate::deploy::steps::{CustomDomainStep, DatabaseStep, FrontendUploadStep, ProvisioningStep};
use crate::deploy::template::FsTemplateResolver;
use crate::deploy::{ActiveDeployments, Orchestrator, OrchestratorOptions};
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::query::QueryService;
use crate::reconcile::StatusReconciler;
use crate::storage::settings::CloudBackendKind;
use crate::store::{FileRecordStore, RecordStore, Records};

/// Main application state
pub struct AppState {
    /// Deployment records
    pub records: Arc<Records>,

    /// Attempts currently running in this process
    pub active: Arc<ActiveDeployments>,

    /// Deployment orchestrator
    pub orchestrator: Arc<Orchestrator>,

    /// Control-plane reconciler
    pub reconciler: Arc<StatusReconciler>,

    /// Read side
    pub query: Arc<QueryService>,
}

impl AppState {
    /// Initialize application state from options
    pub async fn init(options: &AppOptions) -> Result<Self, DeployError> {
        info!("Initializing application state...");

        options.layout.setup().await?;
        let store: Arc<dyn RecordStore> = Arc::new(FileRecordStore::new(options.layout.records_dir()));

        let cloud = match options.cloud_backend {
            CloudBackendKind::Aws => {
                let cli = Arc::new(AwsCli::new(options.aws_profile.clone()));
                CloudClients::aws(cli, options.layout.work_dir().subdir("build"))
            }
            CloudBackendKind::Simulated => {
                warn!("Using the simulated cloud backend, nothing is provisioned");
                CloudClients::simulated(Arc::new(SimulatedCloud::new()))
            }
        };

        Ok(Self::assemble(options, store, cloud))
    }

    /// Wire every component over the given store and cloud
    pub fn assemble(options: &AppOptions, store: Arc<dyn RecordStore>, cloud: CloudClients) -> Self {
        let records = Arc::new(Records::new(store));
        let active = Arc::new(ActiveDeployments::new());

        let templates_dir = match &options.templates_dir {
            Some(path) => Dir::new(path.clone()),
            None => options.layout.templates_dir(),
        };
        let templates = Arc::new(FsTemplateResolver::new(templates_dir, options.layout.work_dir()));

        let steps: Vec<Arc<dyn ProvisioningStep>> = vec![
            Arc::new(FrontendUploadStep::new(cloud.storage.clone(), cloud.cdn.clone())),
            Arc::new(DatabaseStep::new(cloud.database.clone(), options.waits.clone())),
            Arc::new(CustomDomainStep::new(
                cloud.certificates.clone(),
                cloud.cdn.clone(),
                cloud.dns.clone(),
                options.waits.clone(),
            )),
        ];

        let orchestrator = Arc::new(Orchestrator::new(
            records.clone(),
            templates,
            cloud.stack_deployer.clone(),
            steps,
            active.clone(),
            OrchestratorOptions {
                default_region: options.default_region.clone(),
            },
        ));
        let reconciler = Arc::new(StatusReconciler::new(
            records.clone(),
            cloud.stack_query.clone(),
            active.clone(),
            options.default_region.clone(),
        ));
        let query = Arc::new(QueryService::new(
            records.clone(),
            reconciler.clone(),
            options.stale_after,
        ));

        info!("Records stored in {} store", records.store_type());
        Self {
            records,
            active,
            orchestrator,
            reconciler,
            query,
        }
    }

    /// Abort attempts still running. Their records stay `in_progress` and
    /// are picked up by reconciliation on the next start.
    pub async fn shutdown(&self) -> Result<(), DeployError> {
        let aborted = self.active.abort_all();
        if aborted > 0 {
            warn!("Aborted {} running deployment(s)", aborted);
        }
        Ok(())
    }
}
