//! Deployment request models

use std::collections::BTreeMap;
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// What the deployment ships
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeploymentType {
    /// Serverless API only
    Backend,

    /// Static site behind a CDN
    Frontend,

    /// Both of the above in one stack
    Fullstack,
}

impl DeploymentType {
    pub fn as_str(&self) -> &'static str {
        match self {
            DeploymentType::Backend => "backend",
            DeploymentType::Frontend => "frontend",
            DeploymentType::Fullstack => "fullstack",
        }
    }

    /// Whether this type ships backend compute
    pub fn has_backend(&self) -> bool {
        matches!(self, DeploymentType::Backend | DeploymentType::Fullstack)
    }

    /// Whether this type ships frontend assets
    pub fn has_frontend(&self) -> bool {
        matches!(self, DeploymentType::Frontend | DeploymentType::Fullstack)
    }
}

impl fmt::Display for DeploymentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "backend" => Ok(DeploymentType::Backend),
            "frontend" => Ok(DeploymentType::Frontend),
            "fullstack" => Ok(DeploymentType::Fullstack),
            _ => Err(format!("Invalid deployment type: {}", s)),
        }
    }
}

/// A request to deploy one project.
///
/// Immutable once accepted. `project_name` is the key of the resulting
/// deployment record.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeploymentRequest {
    pub project_name: String,

    pub deployment_type: DeploymentType,

    pub framework: String,

    /// Target region, falls back to the service default
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub region: Option<String>,

    /// Stack name override, defaults to `<projectName>-stack`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack_name: Option<String>,

    #[serde(default, alias = "backend", skip_serializing_if = "Option::is_none")]
    pub backend_configuration: Option<BackendConfig>,

    #[serde(default, alias = "frontend", skip_serializing_if = "Option::is_none")]
    pub frontend_configuration: Option<FrontendConfig>,

    #[serde(default, alias = "database", skip_serializing_if = "Option::is_none")]
    pub database_configuration: Option<DatabaseConfig>,

    #[serde(default, alias = "domain", skip_serializing_if = "Option::is_none")]
    pub domain_configuration: Option<DomainConfig>,
}

impl DeploymentRequest {
    /// Stack name used for the base infrastructure
    pub fn stack_name(&self) -> String {
        self.stack_name
            .clone()
            .unwrap_or_else(|| format!("{}-stack", self.project_name))
    }

    /// Region for this request, or the given default
    pub fn region_or(&self, default: &str) -> String {
        self.region
            .clone()
            .filter(|r| !r.is_empty())
            .unwrap_or_else(|| default.to_string())
    }
}

/// Backend compute configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BackendConfig {
    /// Directory holding the backend sources
    pub source_path: PathBuf,

    /// Function runtime, e.g. `nodejs20.x` or `python3.12`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub runtime: Option<String>,

    /// Memory in MB
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_size: Option<u32>,

    /// Timeout in seconds
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timeout: Option<u32>,

    #[serde(default)]
    pub environment: BTreeMap<String, String>,
}

/// Frontend assets configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FrontendConfig {
    /// Directory holding the frontend project
    pub source_path: PathBuf,

    /// Build output directory relative to `source_path` (e.g. `dist`).
    /// When absent, `source_path` itself holds the built assets.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub build_output: Option<String>,

    #[serde(default = "default_index_document")]
    pub index_document: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_document: Option<String>,
}

fn default_index_document() -> String {
    "index.html".to_string()
}

impl FrontendConfig {
    /// Directory whose contents are mirrored to the bucket
    pub fn assets_dir(&self) -> PathBuf {
        match &self.build_output {
            Some(out) if !out.is_empty() => self.source_path.join(out),
            _ => self.source_path.clone(),
        }
    }
}

/// Database configuration, discriminated by `engine`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "engine", rename_all = "kebab-case")]
pub enum DatabaseConfig {
    Dynamodb(DynamoDbConfig),
    AuroraServerless(RelationalConfig),
}

impl DatabaseConfig {
    pub fn engine_name(&self) -> &'static str {
        match self {
            DatabaseConfig::Dynamodb(_) => "dynamodb",
            DatabaseConfig::AuroraServerless(_) => "aurora-serverless",
        }
    }
}

/// Key attribute of a DynamoDB table
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyAttribute {
    pub name: String,

    /// `S`, `N` or `B`
    #[serde(default = "default_attribute_type")]
    pub attribute_type: String,
}

fn default_attribute_type() -> String {
    "S".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DynamoDbConfig {
    /// Table name, defaults to `<projectName>-table`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub table_name: Option<String>,

    pub partition_key: KeyAttribute,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sort_key: Option<KeyAttribute>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RelationalDialect {
    Postgres,
    Mysql,
}

impl RelationalDialect {
    /// RDS engine identifier
    pub fn rds_engine(&self) -> &'static str {
        match self {
            RelationalDialect::Postgres => "aurora-postgresql",
            RelationalDialect::Mysql => "aurora-mysql",
        }
    }

    pub fn port(&self) -> u16 {
        match self {
            RelationalDialect::Postgres => 5432,
            RelationalDialect::Mysql => 3306,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RelationalConfig {
    #[serde(default = "default_dialect")]
    pub dialect: RelationalDialect,

    pub database_name: String,

    #[serde(default = "default_master_username")]
    pub master_username: String,

    /// Minimum Aurora capacity units
    #[serde(default = "default_min_capacity")]
    pub min_capacity: f64,

    /// Maximum Aurora capacity units
    #[serde(default = "default_max_capacity")]
    pub max_capacity: f64,

    pub vpc_id: String,

    pub subnet_ids: Vec<String>,
}

fn default_dialect() -> RelationalDialect {
    RelationalDialect::Postgres
}

fn default_master_username() -> String {
    "dbadmin".to_string()
}

fn default_min_capacity() -> f64 {
    0.5
}

fn default_max_capacity() -> f64 {
    2.0
}

/// Custom domain configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DomainConfig {
    pub domain_name: String,

    /// Route53 zone to create alias records in
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hosted_zone_id: Option<String>,

    /// Use this certificate instead of looking one up
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub certificate_arn: Option<String>,

    /// Also serve `www.<domainName>`
    #[serde(default)]
    pub include_www: bool,
}

impl DomainConfig {
    /// Every hostname the distribution should answer for
    pub fn aliases(&self) -> Vec<String> {
        let mut aliases = vec![self.domain_name.clone()];
        if self.include_www && !self.domain_name.starts_with("www.") {
            aliases.push(format!("www.{}", self.domain_name));
        }
        aliases
    }
}
