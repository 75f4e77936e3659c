//! Infrastructure template resolution
//!
//! Templates live at `<templates>/<type>/<framework>.yaml`, with
//! `default.yaml` as the per-type fallback. A `.yaml.hbs` variant is rendered
//! with Handlebars against the request before use.

use std::path::PathBuf;

use async_trait::async_trait;
use handlebars::Handlebars;
use launchpad_models::DeploymentRequest;
use serde_json::json;
use tracing::debug;

use crate::errors::DeployError;
use crate::filesys::dir::Dir;
use crate::filesys::file::File;

/// A resource the template declares
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeclaredResource {
    pub logical_id: String,
    pub resource_type: String,
}

/// A template ready to apply
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub template_path: PathBuf,
    pub declared_resources: Vec<DeclaredResource>,
}

/// Finds the template for a request
#[async_trait]
pub trait TemplateResolver: Send + Sync {
    /// Resolve by `(deployment_type, framework)`; [`DeployError::TemplateNotFound`] when nothing matches
    async fn resolve(&self, request: &DeploymentRequest) -> Result<ResolvedTemplate, DeployError>;
}

/// Template resolver backed by a directory tree
pub struct FsTemplateResolver {
    templates_dir: Dir,
    work_dir: Dir,
    handlebars: Handlebars<'static>,
}

impl FsTemplateResolver {
    pub fn new(templates_dir: Dir, work_dir: Dir) -> Self {
        let mut handlebars = Handlebars::new();
        handlebars.set_strict_mode(true);
        handlebars.register_escape_fn(handlebars::no_escape);
        Self {
            templates_dir,
            work_dir,
            handlebars,
        }
    }

    /// Candidate files in lookup order
    fn candidates(&self, request: &DeploymentRequest) -> Vec<File> {
        let type_dir = self.templates_dir.subdir(request.deployment_type.as_str());
        let framework = request.framework.to_lowercase();
        let mut candidates = Vec::new();
        for stem in [framework.as_str(), "default"] {
            candidates.push(type_dir.file(&format!("{}.yaml.hbs", stem)));
            candidates.push(type_dir.file(&format!("{}.yaml", stem)));
        }
        candidates
    }

    async fn render(&self, source: &File, request: &DeploymentRequest) -> Result<File, DeployError> {
        let raw = source.read_string().await?;
        let context = render_context(request)?;
        let rendered = self.handlebars.render_template(&raw, &context)?;

        let target = self
            .work_dir
            .subdir(&request.project_name)
            .file("template.yaml");
        target.write_atomic(rendered.as_bytes()).await?;
        Ok(target)
    }
}

/// Render context: the request itself plus derived values
fn render_context(request: &DeploymentRequest) -> Result<serde_json::Value, DeployError> {
    let mut context = serde_json::to_value(request)?;
    let backend_source = request
        .backend_configuration
        .as_ref()
        .map(|b| absolute(&b.source_path));
    let frontend_assets = request
        .frontend_configuration
        .as_ref()
        .map(|f| absolute(&f.assets_dir()));
    if let Some(map) = context.as_object_mut() {
        map.insert("stackName".to_string(), json!(request.stack_name()));
        map.insert("backendSourcePath".to_string(), json!(backend_source));
        map.insert("frontendAssetsPath".to_string(), json!(frontend_assets));
    }
    Ok(context)
}

fn absolute(path: &std::path::Path) -> String {
    std::path::absolute(path)
        .unwrap_or_else(|_| path.to_path_buf())
        .to_string_lossy()
        .into_owned()
}

/// Resources declared in the template's `Resources` section.
///
/// Intrinsic tags such as `!Ref` parse as tagged values and are ignored.
pub fn declared_resources(document: &str) -> Result<Vec<DeclaredResource>, DeployError> {
    let value: serde_yaml::Value = serde_yaml::from_str(document)?;
    let Some(resources) = value.get("Resources").and_then(|r| r.as_mapping()) else {
        return Ok(Vec::new());
    };

    let mut declared = Vec::new();
    for (logical_id, body) in resources {
        let Some(logical_id) = logical_id.as_str() else {
            continue;
        };
        let resource_type = body
            .get("Type")
            .and_then(|t| t.as_str())
            .unwrap_or("Unknown")
            .to_string();
        declared.push(DeclaredResource {
            logical_id: logical_id.to_string(),
            resource_type,
        });
    }
    Ok(declared)
}

#[async_trait]
impl TemplateResolver for FsTemplateResolver {
    async fn resolve(&self, request: &DeploymentRequest) -> Result<ResolvedTemplate, DeployError> {
        for candidate in self.candidates(request) {
            if !candidate.exists().await {
                continue;
            }
            debug!("Using template {}", candidate.path().display());

            let is_handlebars = candidate
                .path()
                .extension()
                .is_some_and(|ext| ext == "hbs");
            let template = if is_handlebars {
                self.render(&candidate, request).await?
            } else {
                candidate
            };

            let document = template.read_string().await?;
            return Ok(ResolvedTemplate {
                template_path: template.path().to_path_buf(),
                declared_resources: declared_resources(&document)?,
            });
        }

        Err(DeployError::TemplateNotFound {
            deployment_type: request.deployment_type.to_string(),
            framework: request.framework.clone(),
        })
    }
}
