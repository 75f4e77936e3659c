//! Cloud provider interfaces
//!
//! Provisioning and status lookups go through the traits in this module so
//! the orchestrator, steps and reconciler never care which backend answers.
//! [`aws`] shells out to the AWS and SAM command line tools; [`simulated`]
//! keeps everything in memory.

pub mod aws;
pub mod simulated;

use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::deploy::stack::StackDeployer;
use crate::errors::DeployError;

/// Fixed hosted zone of every CloudFront distribution, used for alias records
pub const CLOUDFRONT_HOSTED_ZONE_ID: &str = "Z2FDTNDATAQYW2";

/// Certificates served by CloudFront must live here
pub const CERTIFICATE_REGION: &str = "us-east-1";

/// One resource of a deployed stack
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StackResource {
    pub logical_id: String,
    pub resource_type: String,
    pub status: String,
    pub physical_id: Option<String>,
}

/// Control-plane view of a stack
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackDescription {
    pub stack_name: String,
    pub stack_id: Option<String>,
    /// Native status string, e.g. `UPDATE_COMPLETE`
    pub native_status: String,
    pub outputs: BTreeMap<String, String>,
    pub resources: Vec<StackResource>,
}

/// Result of a stack lookup
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StackLookup {
    Found(StackDescription),
    NotFound,
}

/// Reads stack state from the control plane
#[async_trait]
pub trait StackQuery: Send + Sync {
    async fn describe_stack(&self, stack_name: &str, region: &str) -> Result<StackLookup, DeployError>;
}

/// What a bucket sync changed
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SyncReport {
    pub uploaded: Vec<String>,
    pub deleted: Vec<String>,
}

impl SyncReport {
    pub fn is_unchanged(&self) -> bool {
        self.uploaded.is_empty() && self.deleted.is_empty()
    }
}

/// Object storage mirrored from a local directory
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Make the bucket hold exactly the files under `local_dir`
    async fn sync(&self, local_dir: &Path, bucket: &str, region: &str) -> Result<SyncReport, DeployError>;
}

/// Distribution configuration together with its concurrency token
#[derive(Debug, Clone)]
pub struct DistributionConfig {
    pub config: serde_json::Value,
    pub etag: String,
}

/// Outcome of a conditional distribution update
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DistributionUpdate {
    Updated { etag: String },
    /// The ETag no longer matched, someone else changed the distribution
    PreconditionFailed,
}

#[async_trait]
pub trait CdnApi: Send + Sync {
    /// Invalidate `paths`, returning the invalidation id
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String, DeployError>;

    async fn get_distribution_config(&self, distribution_id: &str) -> Result<DistributionConfig, DeployError>;

    async fn update_distribution_config(
        &self,
        distribution_id: &str,
        config: &serde_json::Value,
        if_match: &str,
    ) -> Result<DistributionUpdate, DeployError>;

    /// Public domain name of the distribution, e.g. `d111.cloudfront.net`
    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, DeployError>;
}

/// DNS record that proves domain ownership
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationRecord {
    pub name: String,
    pub record_type: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CertificateDetail {
    pub arn: String,
    /// `PENDING_VALIDATION`, `ISSUED`, `FAILED`, ...
    pub status: String,
    pub domain_name: String,
    pub alternative_names: Vec<String>,
    pub validation_records: Vec<ValidationRecord>,
}

impl CertificateDetail {
    pub fn is_issued(&self) -> bool {
        self.status.eq_ignore_ascii_case("ISSUED")
    }

    /// Whether the certificate covers every name in `names`
    pub fn covers(&self, names: &[String]) -> bool {
        names.iter().all(|name| {
            name.eq_ignore_ascii_case(&self.domain_name)
                || self
                    .alternative_names
                    .iter()
                    .any(|alt| alt.eq_ignore_ascii_case(name) || wildcard_matches(alt, name))
        })
    }
}

fn wildcard_matches(pattern: &str, name: &str) -> bool {
    match pattern.strip_prefix("*.") {
        Some(suffix) => name
            .split_once('.')
            .map(|(_, rest)| rest.eq_ignore_ascii_case(suffix))
            .unwrap_or(false),
        None => false,
    }
}

#[async_trait]
pub trait CertificateApi: Send + Sync {
    /// Certificates known for `domain_name`
    async fn list_certificates(&self, domain_name: &str) -> Result<Vec<CertificateDetail>, DeployError>;

    async fn request_certificate(&self, domain_name: &str, alternative_names: &[String]) -> Result<String, DeployError>;

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, DeployError>;
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DnsChange {
    /// A record aliasing `name` to a CloudFront distribution
    Alias { name: String, target: String },
    Cname { name: String, value: String },
}

#[async_trait]
pub trait DnsApi: Send + Sync {
    /// Create or replace the given records, returning the change id
    async fn upsert_records(&self, hosted_zone_id: &str, changes: &[DnsChange]) -> Result<String, DeployError>;
}

/// Whether a create call made something new
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CreateOutcome {
    Created,
    AlreadyExists,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSpec {
    pub table_name: String,
    pub partition_key: (String, String),
    pub sort_key: Option<(String, String)>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableDescription {
    pub table_name: String,
    pub status: String,
    pub arn: String,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ClusterSpec {
    pub cluster_id: String,
    pub engine: String,
    pub database_name: String,
    pub master_username: String,
    pub security_group_id: String,
    pub subnet_group_name: String,
    pub min_capacity: f64,
    pub max_capacity: f64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClusterDescription {
    pub cluster_id: String,
    pub status: String,
    pub arn: String,
    pub endpoint: Option<String>,
    pub port: Option<u16>,
    pub secret_arn: Option<String>,
}

#[async_trait]
pub trait DatabaseApi: Send + Sync {
    async fn create_table(&self, spec: &TableSpec, region: &str) -> Result<CreateOutcome, DeployError>;

    async fn describe_table(&self, table_name: &str, region: &str) -> Result<TableDescription, DeployError>;

    /// Security group admitting `port` from inside the VPC, returns its id
    async fn ensure_security_group(
        &self,
        group_name: &str,
        vpc_id: &str,
        port: u16,
        region: &str,
    ) -> Result<String, DeployError>;

    async fn ensure_subnet_group(&self, group_name: &str, subnet_ids: &[String], region: &str) -> Result<(), DeployError>;

    /// Create the cluster and its serverless instance
    async fn create_cluster(&self, spec: &ClusterSpec, region: &str) -> Result<CreateOutcome, DeployError>;

    async fn describe_cluster(&self, cluster_id: &str, region: &str) -> Result<ClusterDescription, DeployError>;
}

/// Every cloud collaborator, wired to one backend
#[derive(Clone)]
pub struct CloudClients {
    pub stack_deployer: Arc<dyn StackDeployer>,
    pub stack_query: Arc<dyn StackQuery>,
    pub storage: Arc<dyn ObjectStorage>,
    pub cdn: Arc<dyn CdnApi>,
    pub certificates: Arc<dyn CertificateApi>,
    pub dns: Arc<dyn DnsApi>,
    pub database: Arc<dyn DatabaseApi>,
}

impl CloudClients {
    /// Clients backed by the AWS and SAM command line tools
    pub fn aws(cli: Arc<aws::AwsCli>, build_dir: crate::filesys::dir::Dir) -> Self {
        let stack_query: Arc<dyn StackQuery> = Arc::new(aws::CloudFormation::new(cli.clone()));
        Self {
            stack_deployer: Arc::new(crate::deploy::stack::SamStackDeployer::new(
                cli.clone(),
                stack_query.clone(),
                build_dir,
            )),
            stack_query,
            storage: Arc::new(aws::S3::new(cli.clone())),
            cdn: Arc::new(aws::CloudFront::new(cli.clone())),
            certificates: Arc::new(aws::Acm::new(cli.clone())),
            dns: Arc::new(aws::Route53::new(cli.clone())),
            database: Arc::new(aws::Databases::new(cli)),
        }
    }

    /// Clients backed by one in-memory cloud
    pub fn simulated(cloud: Arc<simulated::SimulatedCloud>) -> Self {
        Self {
            stack_deployer: cloud.clone(),
            stack_query: cloud.clone(),
            storage: cloud.clone(),
            cdn: cloud.clone(),
            certificates: cloud.clone(),
            dns: cloud.clone(),
            database: cloud,
        }
    }
}
