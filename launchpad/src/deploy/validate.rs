//! Request validation

use launchpad_models::{DatabaseConfig, DeploymentRequest, DeploymentType};

use crate::errors::DeployError;

/// Backend frameworks with templates
pub const BACKEND_FRAMEWORKS: &[&str] = &["express", "nestjs", "koa", "fastapi", "flask", "django"];

/// Frontend frameworks with templates
pub const FRONTEND_FRAMEWORKS: &[&str] = &["react", "vue", "angular", "svelte", "nextjs", "static"];

const MAX_PROJECT_NAME_LEN: usize = 128;

/// Check a request before any record is written.
///
/// Every problem found is reported in one [`DeployError::ValidationError`].
pub fn validate_request(request: &DeploymentRequest) -> Result<(), DeployError> {
    let mut problems: Vec<String> = Vec::new();

    if let Err(problem) = check_project_name(&request.project_name) {
        problems.push(problem);
    }
    if let Some(region) = &request.region {
        if !is_region(region) {
            problems.push(format!("invalid region {:?}", region));
        }
    }
    if !framework_supported(request.deployment_type, &request.framework) {
        problems.push(format!(
            "framework {:?} is not supported for {} deployments",
            request.framework, request.deployment_type
        ));
    }

    check_blocks(request, &mut problems);

    if let Some(backend) = &request.backend_configuration {
        if !backend.source_path.is_dir() {
            problems.push(format!(
                "backend source path {} does not exist",
                backend.source_path.display()
            ));
        }
    }
    if let Some(frontend) = &request.frontend_configuration {
        let assets = frontend.assets_dir();
        if !assets.is_dir() {
            problems.push(format!("frontend assets directory {} does not exist", assets.display()));
        }
    }
    if let Some(database) = &request.database_configuration {
        check_database(database, &mut problems);
    }
    if let Some(domain) = &request.domain_configuration {
        if !is_domain_name(&domain.domain_name) {
            problems.push(format!("invalid domain name {:?}", domain.domain_name));
        }
    }

    if problems.is_empty() {
        Ok(())
    } else {
        Err(DeployError::ValidationError(problems.join("; ")))
    }
}

/// Project names key records and prefix cloud resource names
pub fn check_project_name(name: &str) -> Result<(), String> {
    let mut chars = name.chars();
    match chars.next() {
        None => return Err("project name is empty".to_string()),
        Some(first) if !first.is_ascii_alphabetic() => {
            return Err(format!("project name {:?} must start with a letter", name));
        }
        _ => {}
    }
    if name.len() > MAX_PROJECT_NAME_LEN {
        return Err(format!(
            "project name is longer than {} characters",
            MAX_PROJECT_NAME_LEN
        ));
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '-') {
        return Err(format!(
            "project name {:?} may only contain letters, digits and hyphens",
            name
        ));
    }
    Ok(())
}

/// Whether `framework` has templates for `deployment_type`.
///
/// Fullstack accepts `<frontend>-<backend>` or either half on its own.
pub fn framework_supported(deployment_type: DeploymentType, framework: &str) -> bool {
    let framework = framework.to_lowercase();
    match deployment_type {
        DeploymentType::Backend => BACKEND_FRAMEWORKS.contains(&framework.as_str()),
        DeploymentType::Frontend => FRONTEND_FRAMEWORKS.contains(&framework.as_str()),
        DeploymentType::Fullstack => {
            if BACKEND_FRAMEWORKS.contains(&framework.as_str())
                || FRONTEND_FRAMEWORKS.contains(&framework.as_str())
            {
                return true;
            }
            match framework.split_once('-') {
                Some((frontend, backend)) => {
                    FRONTEND_FRAMEWORKS.contains(&frontend) && BACKEND_FRAMEWORKS.contains(&backend)
                }
                None => false,
            }
        }
    }
}

/// Configuration blocks must match what the deployment type ships
fn check_blocks(request: &DeploymentRequest, problems: &mut Vec<String>) {
    let deployment_type = request.deployment_type;
    let has_backend = request.backend_configuration.is_some();
    let has_frontend = request.frontend_configuration.is_some();

    if deployment_type.has_backend() && !has_backend {
        problems.push(format!("{} deployments require backendConfiguration", deployment_type));
    }
    if !deployment_type.has_backend() && has_backend {
        problems.push(format!("{} deployments take no backendConfiguration", deployment_type));
    }
    if deployment_type.has_frontend() && !has_frontend {
        problems.push(format!("{} deployments require frontendConfiguration", deployment_type));
    }
    if !deployment_type.has_frontend() && has_frontend {
        problems.push(format!("{} deployments take no frontendConfiguration", deployment_type));
    }
    if !deployment_type.has_frontend() && request.domain_configuration.is_some() {
        problems.push("custom domains need a frontend distribution".to_string());
    }
}

fn check_database(database: &DatabaseConfig, problems: &mut Vec<String>) {
    match database {
        DatabaseConfig::Dynamodb(config) => {
            if config.partition_key.name.trim().is_empty() {
                problems.push("dynamodb partitionKey name is empty".to_string());
            }
            let keys = std::iter::once(&config.partition_key).chain(config.sort_key.iter());
            for key in keys {
                if !matches!(key.attribute_type.as_str(), "S" | "N" | "B") {
                    problems.push(format!(
                        "dynamodb key {} has invalid type {:?}",
                        key.name, key.attribute_type
                    ));
                }
            }
        }
        DatabaseConfig::AuroraServerless(config) => {
            if config.database_name.trim().is_empty() {
                problems.push("aurora databaseName is empty".to_string());
            }
            if config.vpc_id.trim().is_empty() {
                problems.push("aurora vpcId is empty".to_string());
            }
            if config.subnet_ids.len() < 2 {
                problems.push("aurora needs at least two subnetIds".to_string());
            }
            if config.min_capacity <= 0.0 || config.min_capacity > config.max_capacity {
                problems.push(format!(
                    "aurora capacity range {}..{} is invalid",
                    config.min_capacity, config.max_capacity
                ));
            }
        }
    }
}

fn is_region(region: &str) -> bool {
    let parts: Vec<&str> = region.split('-').collect();
    parts.len() >= 3
        && parts.iter().all(|p| !p.is_empty())
        && region.chars().all(|c| c.is_ascii_lowercase() || c.is_ascii_digit() || c == '-')
}

fn is_domain_name(domain: &str) -> bool {
    let labels: Vec<&str> = domain.split('.').collect();
    labels.len() >= 2
        && labels.iter().all(|label| {
            !label.is_empty()
                && label.len() <= 63
                && !label.starts_with('-')
                && !label.ends_with('-')
                && label.chars().all(|c| c.is_ascii_alphanumeric() || c == '-')
        })
}
