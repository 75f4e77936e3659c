//! In-memory cloud
//!
//! Behaves like the real services closely enough to drive whole deployments
//! offline: stacks get deterministic ids and outputs, buckets are mirrored by
//! content hash, distributions carry ETags, certificates issue after a poll
//! and databases become available after one. Any operation can be made to
//! fail with [`SimulatedCloud::fail`].

use std::collections::{BTreeMap, HashMap, HashSet};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use async_trait::async_trait;
use serde_json::{json, Value};

use crate::cloud::{
    CdnApi, CertificateApi, CertificateDetail, ClusterDescription, ClusterSpec, CreateOutcome,
    DatabaseApi, DistributionConfig, DistributionUpdate, DnsApi, DnsChange, ObjectStorage,
    StackDescription, StackLookup, StackQuery, StackResource, SyncReport, TableDescription,
    TableSpec, ValidationRecord, CERTIFICATE_REGION,
};
use crate::deploy::progress::ProgressSink;
use crate::deploy::stack::{StackConfig, StackDeployer, StackOutcome};
use crate::deploy::template::ResolvedTemplate;
use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::utils::sha256_hash;

const ACCOUNT_ID: &str = "123456789012";

struct SimStack {
    region: String,
    description: StackDescription,
}

struct SimDistribution {
    config: Value,
    etag: u64,
    domain_name: String,
}

struct SimCertificate {
    detail: CertificateDetail,
    polls: u32,
}

#[derive(Default)]
struct SimState {
    stacks: HashMap<String, SimStack>,
    buckets: HashMap<String, BTreeMap<String, String>>,
    distributions: HashMap<String, SimDistribution>,
    invalidations: Vec<(String, Vec<String>)>,
    certificates: Vec<SimCertificate>,
    dns: HashMap<String, Vec<DnsChange>>,
    tables: HashMap<String, TableDescription>,
    clusters: HashMap<String, ClusterDescription>,
    security_groups: HashMap<String, String>,
    subnet_groups: HashSet<String>,
    failures: HashMap<String, String>,
    stack_apply_failure: Option<(i32, String)>,
    counter: u64,
}

impl SimState {
    fn check(&self, operation: &str) -> Result<(), DeployError> {
        match self.failures.get(operation) {
            Some(message) => Err(DeployError::CommandError(format!(
                "simulated {} failure: {}",
                operation, message
            ))),
            None => Ok(()),
        }
    }

    fn next_id(&mut self) -> u64 {
        self.counter += 1;
        self.counter
    }
}

fn short_hash(value: &str) -> String {
    sha256_hash(value.as_bytes())[..12].to_string()
}

/// Shared in-memory cloud implementing every provider interface
#[derive(Default)]
pub struct SimulatedCloud {
    state: Mutex<SimState>,
}

impl SimulatedCloud {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, SimState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Make `operation` fail until [`SimulatedCloud::heal`] is called.
    ///
    /// Operations: `describe_stack`, `sync`, `invalidate`,
    /// `get_distribution_config`, `update_distribution`, `list_certificates`,
    /// `request_certificate`, `upsert_records`, `create_table`,
    /// `ensure_security_group`, `ensure_subnet_group`, `create_cluster`.
    pub fn fail(&self, operation: &str, message: &str) {
        self.state()
            .failures
            .insert(operation.to_string(), message.to_string());
    }

    pub fn heal(&self, operation: &str) {
        let mut state = self.state();
        state.failures.remove(operation);
        if operation == "stack_apply" {
            state.stack_apply_failure = None;
        }
    }

    /// Make stack applies fail like the deploy tool exiting non-zero, until `heal("stack_apply")`
    pub fn fail_stack_apply(&self, exit_code: i32, stderr: &str) {
        self.state().stack_apply_failure = Some((exit_code, stderr.to_string()));
    }

    /// Overwrite a stack's native status, as an out-of-band change would
    pub fn set_stack_status(&self, stack_name: &str, native_status: &str) {
        if let Some(stack) = self.state().stacks.get_mut(stack_name) {
            stack.description.native_status = native_status.to_string();
        }
    }

    /// Add or replace a stack output, as an out-of-band update would
    pub fn set_stack_output(&self, stack_name: &str, key: &str, value: &str) {
        if let Some(stack) = self.state().stacks.get_mut(stack_name) {
            stack
                .description
                .outputs
                .insert(key.to_string(), value.to_string());
        }
    }

    pub fn delete_stack(&self, stack_name: &str) {
        self.state().stacks.remove(stack_name);
    }

    pub fn stack(&self, stack_name: &str) -> Option<StackDescription> {
        self.state()
            .stacks
            .get(stack_name)
            .map(|s| s.description.clone())
    }

    /// Object keys and content hashes of a bucket
    pub fn bucket_objects(&self, bucket: &str) -> BTreeMap<String, String> {
        self.state().buckets.get(bucket).cloned().unwrap_or_default()
    }

    pub fn invalidations(&self) -> Vec<(String, Vec<String>)> {
        self.state().invalidations.clone()
    }

    pub fn distribution_config(&self, distribution_id: &str) -> Option<Value> {
        self.state()
            .distributions
            .get(distribution_id)
            .map(|d| d.config.clone())
    }

    /// Bump a distribution's ETag without changing its config
    pub fn touch_distribution(&self, distribution_id: &str) {
        if let Some(distribution) = self.state().distributions.get_mut(distribution_id) {
            distribution.etag += 1;
        }
    }

    pub fn dns_records(&self, hosted_zone_id: &str) -> Vec<DnsChange> {
        self.state().dns.get(hosted_zone_id).cloned().unwrap_or_default()
    }

    /// Register an existing certificate
    pub fn add_certificate(&self, domain_name: &str, alternative_names: &[String], status: &str) -> String {
        let mut state = self.state();
        let id = state.next_id();
        let arn = format!(
            "arn:aws:acm:{}:{}:certificate/{}",
            CERTIFICATE_REGION,
            ACCOUNT_ID,
            short_hash(&format!("{}-{}", domain_name, id))
        );
        state.certificates.push(SimCertificate {
            detail: CertificateDetail {
                arn: arn.clone(),
                status: status.to_string(),
                domain_name: domain_name.to_string(),
                alternative_names: alternative_names.to_vec(),
                validation_records: Vec::new(),
            },
            polls: 0,
        });
        arn
    }

    pub fn certificate_count(&self) -> usize {
        self.state().certificates.len()
    }

    pub fn has_cluster(&self, cluster_id: &str) -> bool {
        self.state().clusters.contains_key(cluster_id)
    }

    pub fn has_subnet_group(&self, group_name: &str) -> bool {
        self.state().subnet_groups.contains(group_name)
    }
}

fn is_api_type(resource_type: &str) -> bool {
    resource_type.contains("Serverless::Function")
        || resource_type.contains("Serverless::Api")
        || resource_type.contains("Serverless::HttpApi")
        || resource_type.contains("ApiGateway")
}

#[async_trait]
impl StackDeployer for SimulatedCloud {
    async fn apply(
        &self,
        template: &ResolvedTemplate,
        config: &StackConfig,
        progress: &ProgressSink,
    ) -> Result<StackOutcome, DeployError> {
        let mut state = self.state();
        if let Some((exit_code, stderr)) = state.stack_apply_failure.clone() {
            return Err(DeployError::StackApplyError {
                stdout: format!("Deploying stack {}\n", config.stack_name),
                stderr,
                exit_code,
            });
        }

        let existed = state.stacks.contains_key(&config.stack_name);
        let hash = short_hash(&format!("{}/{}", config.region, config.stack_name));
        let resource_status = if existed { "UPDATE_COMPLETE" } else { "CREATE_COMPLETE" };

        let mut outputs = BTreeMap::new();
        let mut resources = Vec::new();
        for declared in &template.declared_resources {
            let physical_id = format!("{}-{}-{}", config.stack_name, declared.logical_id, &hash[..6]);
            resources.push(StackResource {
                logical_id: declared.logical_id.clone(),
                resource_type: declared.resource_type.clone(),
                status: resource_status.to_string(),
                physical_id: Some(physical_id),
            });
            progress.emit(format!(
                "{} {} {}",
                declared.logical_id, declared.resource_type, resource_status
            ));

            if is_api_type(&declared.resource_type) {
                outputs.insert(
                    "ApiUrl".to_string(),
                    format!("https://{}.execute-api.{}.amazonaws.com/", &hash[..10], config.region),
                );
            } else if declared.resource_type == "AWS::S3::Bucket" {
                let bucket = format!("{}-site-{}", config.stack_name.to_lowercase(), &hash[..6]);
                state.buckets.entry(bucket.clone()).or_default();
                outputs.insert("FrontendBucketName".to_string(), bucket);
            } else if declared.resource_type == "AWS::CloudFront::Distribution" {
                let distribution_id = format!("E{}", hash[..12].to_uppercase());
                let domain_name = format!("d{}.cloudfront.net", &hash[..12]);
                state
                    .distributions
                    .entry(distribution_id.clone())
                    .or_insert_with(|| SimDistribution {
                        config: json!({
                            "CallerReference": config.stack_name,
                            "Aliases": { "Quantity": 0 },
                            "ViewerCertificate": { "CloudFrontDefaultCertificate": true },
                            "Enabled": true
                        }),
                        etag: 1,
                        domain_name: domain_name.clone(),
                    });
                outputs.insert("CloudFrontDistributionId".to_string(), distribution_id);
                outputs.insert("CloudFrontDomainName".to_string(), domain_name);
            }
        }

        let description = StackDescription {
            stack_name: config.stack_name.clone(),
            stack_id: Some(format!(
                "arn:aws:cloudformation:{}:{}:stack/{}/{}",
                config.region, ACCOUNT_ID, config.stack_name, hash
            )),
            native_status: resource_status.to_string(),
            outputs: outputs.clone(),
            resources: resources.clone(),
        };
        state.stacks.insert(
            config.stack_name.clone(),
            SimStack {
                region: config.region.clone(),
                description: description.clone(),
            },
        );

        Ok(StackOutcome {
            stack_name: description.stack_name,
            stack_id: description.stack_id,
            outputs,
            resources,
        })
    }
}

#[async_trait]
impl StackQuery for SimulatedCloud {
    async fn describe_stack(&self, stack_name: &str, region: &str) -> Result<StackLookup, DeployError> {
        let state = self.state();
        state.check("describe_stack")?;
        Ok(match state.stacks.get(stack_name) {
            Some(stack) if stack.region == region => StackLookup::Found(stack.description.clone()),
            _ => StackLookup::NotFound,
        })
    }
}

#[async_trait]
impl ObjectStorage for SimulatedCloud {
    async fn sync(&self, local_dir: &Path, bucket: &str, _region: &str) -> Result<SyncReport, DeployError> {
        self.state().check("sync")?;

        let mut local = BTreeMap::new();
        for (key, path) in Dir::new(local_dir).walk_files().await? {
            let contents = tokio::fs::read(&path).await?;
            local.insert(key, sha256_hash(&contents));
        }

        let mut state = self.state();
        let objects = state
            .buckets
            .get_mut(bucket)
            .ok_or_else(|| DeployError::CommandError(format!("NoSuchBucket: {}", bucket)))?;

        let mut report = SyncReport::default();
        for (key, hash) in &local {
            if objects.get(key) != Some(hash) {
                objects.insert(key.clone(), hash.clone());
                report.uploaded.push(key.clone());
            }
        }
        let stale: Vec<String> = objects
            .keys()
            .filter(|key| !local.contains_key(*key))
            .cloned()
            .collect();
        for key in stale {
            objects.remove(&key);
            report.deleted.push(key);
        }
        Ok(report)
    }
}

#[async_trait]
impl CdnApi for SimulatedCloud {
    async fn create_invalidation(&self, distribution_id: &str, paths: &[String]) -> Result<String, DeployError> {
        let mut state = self.state();
        state.check("invalidate")?;
        if !state.distributions.contains_key(distribution_id) {
            return Err(DeployError::NotFound(format!("distribution {}", distribution_id)));
        }
        state
            .invalidations
            .push((distribution_id.to_string(), paths.to_vec()));
        Ok(format!("I{}", state.next_id()))
    }

    async fn get_distribution_config(&self, distribution_id: &str) -> Result<DistributionConfig, DeployError> {
        let state = self.state();
        state.check("get_distribution_config")?;
        let distribution = state
            .distributions
            .get(distribution_id)
            .ok_or_else(|| DeployError::NotFound(format!("distribution {}", distribution_id)))?;
        Ok(DistributionConfig {
            config: distribution.config.clone(),
            etag: format!("E{}", distribution.etag),
        })
    }

    async fn update_distribution_config(
        &self,
        distribution_id: &str,
        config: &Value,
        if_match: &str,
    ) -> Result<DistributionUpdate, DeployError> {
        let mut state = self.state();
        state.check("update_distribution")?;
        let distribution = state
            .distributions
            .get_mut(distribution_id)
            .ok_or_else(|| DeployError::NotFound(format!("distribution {}", distribution_id)))?;
        if format!("E{}", distribution.etag) != if_match {
            return Ok(DistributionUpdate::PreconditionFailed);
        }
        distribution.config = config.clone();
        distribution.etag += 1;
        Ok(DistributionUpdate::Updated {
            etag: format!("E{}", distribution.etag),
        })
    }

    async fn distribution_domain(&self, distribution_id: &str) -> Result<String, DeployError> {
        self.state()
            .distributions
            .get(distribution_id)
            .map(|d| d.domain_name.clone())
            .ok_or_else(|| DeployError::NotFound(format!("distribution {}", distribution_id)))
    }
}

#[async_trait]
impl CertificateApi for SimulatedCloud {
    async fn list_certificates(&self, domain_name: &str) -> Result<Vec<CertificateDetail>, DeployError> {
        let state = self.state();
        state.check("list_certificates")?;
        let parent = domain_name.split_once('.').map(|(_, rest)| format!("*.{}", rest));
        Ok(state
            .certificates
            .iter()
            .filter(|c| {
                c.detail.domain_name.eq_ignore_ascii_case(domain_name)
                    || parent
                        .as_deref()
                        .is_some_and(|p| c.detail.domain_name.eq_ignore_ascii_case(p))
            })
            .map(|c| c.detail.clone())
            .collect())
    }

    async fn request_certificate(&self, domain_name: &str, alternative_names: &[String]) -> Result<String, DeployError> {
        let mut state = self.state();
        state.check("request_certificate")?;
        let id = state.next_id();
        let token = short_hash(&format!("{}-{}", domain_name, id));
        let arn = format!(
            "arn:aws:acm:{}:{}:certificate/{}",
            CERTIFICATE_REGION, ACCOUNT_ID, token
        );
        let mut names = vec![domain_name.to_string()];
        names.extend(alternative_names.iter().cloned());
        state.certificates.push(SimCertificate {
            detail: CertificateDetail {
                arn: arn.clone(),
                status: "PENDING_VALIDATION".to_string(),
                domain_name: domain_name.to_string(),
                alternative_names: names,
                validation_records: vec![ValidationRecord {
                    name: format!("_{}.{}.", &token[..8], domain_name),
                    record_type: "CNAME".to_string(),
                    value: format!("_{}.acm-validations.aws.", &token[8..]),
                }],
            },
            polls: 0,
        });
        Ok(arn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, DeployError> {
        let mut state = self.state();
        let certificate = state
            .certificates
            .iter_mut()
            .find(|c| c.detail.arn == arn)
            .ok_or_else(|| DeployError::NotFound(format!("certificate {}", arn)))?;
        certificate.polls += 1;
        if certificate.detail.status == "PENDING_VALIDATION" && certificate.polls > 2 {
            certificate.detail.status = "ISSUED".to_string();
        }
        Ok(certificate.detail.clone())
    }
}

#[async_trait]
impl DnsApi for SimulatedCloud {
    async fn upsert_records(&self, hosted_zone_id: &str, changes: &[DnsChange]) -> Result<String, DeployError> {
        let mut state = self.state();
        state.check("upsert_records")?;
        let zone = state.dns.entry(hosted_zone_id.to_string()).or_default();
        for change in changes {
            let name = match change {
                DnsChange::Alias { name, .. } | DnsChange::Cname { name, .. } => name,
            };
            zone.retain(|existing| match existing {
                DnsChange::Alias { name: n, .. } | DnsChange::Cname { name: n, .. } => n != name,
            });
            zone.push(change.clone());
        }
        Ok(format!("C{}", state.next_id()))
    }
}

#[async_trait]
impl DatabaseApi for SimulatedCloud {
    async fn create_table(&self, spec: &TableSpec, region: &str) -> Result<CreateOutcome, DeployError> {
        let mut state = self.state();
        state.check("create_table")?;
        if state.tables.contains_key(&spec.table_name) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        state.tables.insert(
            spec.table_name.clone(),
            TableDescription {
                table_name: spec.table_name.clone(),
                status: "CREATING".to_string(),
                arn: format!("arn:aws:dynamodb:{}:{}:table/{}", region, ACCOUNT_ID, spec.table_name),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn describe_table(&self, table_name: &str, _region: &str) -> Result<TableDescription, DeployError> {
        let mut state = self.state();
        let table = state
            .tables
            .get_mut(table_name)
            .ok_or_else(|| DeployError::NotFound(format!("table {}", table_name)))?;
        let current = table.clone();
        table.status = "ACTIVE".to_string();
        Ok(current)
    }

    async fn ensure_security_group(
        &self,
        group_name: &str,
        vpc_id: &str,
        _port: u16,
        _region: &str,
    ) -> Result<String, DeployError> {
        let mut state = self.state();
        state.check("ensure_security_group")?;
        let id = format!("sg-{}", short_hash(&format!("{}/{}", vpc_id, group_name)));
        state
            .security_groups
            .entry(group_name.to_string())
            .or_insert(id.clone());
        Ok(id)
    }

    async fn ensure_subnet_group(&self, group_name: &str, _subnet_ids: &[String], _region: &str) -> Result<(), DeployError> {
        let mut state = self.state();
        state.check("ensure_subnet_group")?;
        state.subnet_groups.insert(group_name.to_string());
        Ok(())
    }

    async fn create_cluster(&self, spec: &ClusterSpec, region: &str) -> Result<CreateOutcome, DeployError> {
        let mut state = self.state();
        state.check("create_cluster")?;
        if state.clusters.contains_key(&spec.cluster_id) {
            return Ok(CreateOutcome::AlreadyExists);
        }
        let port = if spec.engine.contains("mysql") { 3306 } else { 5432 };
        state.clusters.insert(
            spec.cluster_id.clone(),
            ClusterDescription {
                cluster_id: spec.cluster_id.clone(),
                status: "creating".to_string(),
                arn: format!("arn:aws:rds:{}:{}:cluster:{}", region, ACCOUNT_ID, spec.cluster_id),
                endpoint: Some(format!(
                    "{}.cluster-{}.{}.rds.amazonaws.com",
                    spec.cluster_id,
                    &short_hash(&spec.cluster_id)[..8],
                    region
                )),
                port: Some(port),
                secret_arn: Some(format!(
                    "arn:aws:secretsmanager:{}:{}:secret:rds!cluster-{}",
                    region,
                    ACCOUNT_ID,
                    short_hash(&spec.cluster_id)
                )),
            },
        );
        Ok(CreateOutcome::Created)
    }

    async fn describe_cluster(&self, cluster_id: &str, _region: &str) -> Result<ClusterDescription, DeployError> {
        let mut state = self.state();
        let cluster = state
            .clusters
            .get_mut(cluster_id)
            .ok_or_else(|| DeployError::NotFound(format!("cluster {}", cluster_id)))?;
        let current = cluster.clone();
        cluster.status = "available".to_string();
        Ok(current)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_sync_mirrors_by_content() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("index.html"), "<h1>hi</h1>").unwrap();
        std::fs::create_dir(tmp.path().join("assets")).unwrap();
        std::fs::write(tmp.path().join("assets/app.js"), "console.log(1)").unwrap();

        let cloud = SimulatedCloud::new();
        cloud.state().buckets.insert("site".to_string(), BTreeMap::new());

        let first = cloud.sync(tmp.path(), "site", "us-east-1").await.unwrap();
        assert_eq!(first.uploaded, vec!["assets/app.js", "index.html"]);

        std::fs::remove_file(tmp.path().join("assets/app.js")).unwrap();
        std::fs::write(tmp.path().join("index.html"), "<h1>changed</h1>").unwrap();
        let second = cloud.sync(tmp.path(), "site", "us-east-1").await.unwrap();
        assert_eq!(second.uploaded, vec!["index.html"]);
        assert_eq!(second.deleted, vec!["assets/app.js"]);
        assert_eq!(cloud.bucket_objects("site").len(), 1);
    }

    #[tokio::test]
    async fn test_distribution_update_requires_current_etag() {
        let cloud = SimulatedCloud::new();
        cloud.state().distributions.insert(
            "E1".to_string(),
            SimDistribution {
                config: json!({}),
                etag: 1,
                domain_name: "d1.cloudfront.net".to_string(),
            },
        );

        let current = cloud.get_distribution_config("E1").await.unwrap();
        cloud.touch_distribution("E1");
        let stale = cloud
            .update_distribution_config("E1", &json!({"Enabled": true}), &current.etag)
            .await
            .unwrap();
        assert_eq!(stale, DistributionUpdate::PreconditionFailed);

        let fresh = cloud.get_distribution_config("E1").await.unwrap();
        let updated = cloud
            .update_distribution_config("E1", &json!({"Enabled": true}), &fresh.etag)
            .await
            .unwrap();
        assert!(matches!(updated, DistributionUpdate::Updated { .. }));
    }
}
