//! Custom domain attachment
//!
//! Sub-stages, each reported through progress:
//! 1. find or request a certificate covering every alias
//! 2. wait for the certificate to be issued
//! 3. attach aliases and certificate to the distribution
//! 4. point the hosted zone at the distribution

use std::sync::Arc;

use async_trait::async_trait;
use launchpad_models::{DeploymentRequest, DomainConfig, StepName, StepResult};
use serde_json::{json, Value};

use crate::cloud::{CdnApi, CertificateApi, CertificateDetail, DistributionUpdate, DnsApi, DnsChange};
use crate::deploy::steps::{outputs, ProvisioningStep, StepContext, WaitOptions};
use crate::errors::DeployError;
use crate::utils::{wait_until, WaitState};

const MAX_UPDATE_ATTEMPTS: u32 = 3;

/// Serves the frontend distribution under a custom domain
pub struct CustomDomainStep {
    certificates: Arc<dyn CertificateApi>,
    cdn: Arc<dyn CdnApi>,
    dns: Arc<dyn DnsApi>,
    waits: WaitOptions,
}

impl CustomDomainStep {
    pub fn new(
        certificates: Arc<dyn CertificateApi>,
        cdn: Arc<dyn CdnApi>,
        dns: Arc<dyn DnsApi>,
        waits: WaitOptions,
    ) -> Self {
        Self {
            certificates,
            cdn,
            dns,
            waits,
        }
    }

    async fn run(&self, config: &DomainConfig, ctx: &StepContext<'_>, result: &mut StepResult) -> Result<(), DeployError> {
        let distribution_id = ctx
            .output(outputs::DISTRIBUTION_ID)
            .ok_or_else(|| DeployError::step(StepName::CustomDomain, "base stack produced no distribution output"))?;
        let aliases = config.aliases();

        let certificate = self.certificate(config, &aliases, ctx).await?;
        result.resource_type = Some("AWS::CertificateManager::Certificate".to_string());
        result.resource_id = Some(certificate.arn.clone());
        result.connection_info.insert("CertificateArn".to_string(), certificate.arn.clone());

        let certificate = self.wait_for_issue(certificate, config, ctx).await?;

        self.attach(distribution_id, &aliases, &certificate.arn, ctx).await?;
        result
            .connection_info
            .insert("CustomDomainUrl".to_string(), format!("https://{}", config.domain_name));

        if let Some(zone_id) = &config.hosted_zone_id {
            let target = match ctx.output(outputs::DISTRIBUTION_DOMAIN) {
                Some(domain) => domain.to_string(),
                None => self.cdn.distribution_domain(distribution_id).await?,
            };
            let changes: Vec<DnsChange> = aliases
                .iter()
                .map(|name| DnsChange::Alias {
                    name: name.clone(),
                    target: target.clone(),
                })
                .collect();
            let change_id = self.dns.upsert_records(zone_id, &changes).await?;
            ctx.progress.emit(format!(
                "Pointed {} at {} (change {})",
                aliases.join(", "),
                target,
                change_id
            ));
        } else {
            ctx.progress.emit(format!(
                "No hosted zone given, point {} at the distribution manually",
                aliases.join(", ")
            ));
        }
        Ok(())
    }

    /// Certificate covering `aliases`: the configured one, an existing one, or a new request
    async fn certificate(
        &self,
        config: &DomainConfig,
        aliases: &[String],
        ctx: &StepContext<'_>,
    ) -> Result<CertificateDetail, DeployError> {
        if let Some(arn) = &config.certificate_arn {
            let certificate = self.certificates.describe_certificate(arn).await?;
            if !certificate.covers(aliases) {
                return Err(DeployError::step(
                    StepName::CustomDomain,
                    format!("certificate {} does not cover {}", arn, aliases.join(", ")),
                ));
            }
            ctx.progress.emit(format!("Using configured certificate {}", arn));
            return Ok(certificate);
        }

        let mut candidates: Vec<CertificateDetail> = self
            .certificates
            .list_certificates(&config.domain_name)
            .await?
            .into_iter()
            .filter(|c| c.covers(aliases))
            .collect();
        // Issued certificates first
        candidates.sort_by_key(|c| !c.is_issued());
        if let Some(existing) = candidates.into_iter().next() {
            ctx.progress.emit(format!("Reusing certificate {} ({})", existing.arn, existing.status));
            return Ok(existing);
        }

        let arn = self
            .certificates
            .request_certificate(&config.domain_name, &aliases[1..])
            .await?;
        ctx.progress.emit(format!("Requested certificate {} for {}", arn, aliases.join(", ")));
        self.certificates.describe_certificate(&arn).await
    }

    async fn wait_for_issue(
        &self,
        certificate: CertificateDetail,
        config: &DomainConfig,
        ctx: &StepContext<'_>,
    ) -> Result<CertificateDetail, DeployError> {
        if certificate.is_issued() {
            return Ok(certificate);
        }

        let (certificates, arn) = (&self.certificates, certificate.arn.as_str());
        if let Some(zone_id) = &config.hosted_zone_id {
            // Validation records show up shortly after the request
            let records = wait_until(
                &format!("validation records of {}", arn),
                self.waits.certificate_timeout,
                &self.waits.cooldown,
                move || async move {
                    let detail = certificates.describe_certificate(arn).await?;
                    if detail.validation_records.is_empty() {
                        Ok(WaitState::Pending(detail.status))
                    } else {
                        Ok(WaitState::Ready(detail.validation_records))
                    }
                },
            )
            .await?;
            let changes: Vec<DnsChange> = records
                .into_iter()
                .map(|r| DnsChange::Cname {
                    name: r.name,
                    value: r.value,
                })
                .collect();
            self.dns.upsert_records(zone_id, &changes).await?;
            ctx.progress.emit(format!("Created {} validation records in {}", changes.len(), zone_id));
        } else {
            for record in &certificate.validation_records {
                ctx.progress.emit(format!(
                    "Waiting for validation record {} {} {}",
                    record.name, record.record_type, record.value
                ));
            }
        }

        ctx.progress.emit(format!("Waiting for certificate {} to be issued", arn));
        wait_until(
            &format!("certificate {}", arn),
            self.waits.certificate_timeout,
            &self.waits.cooldown,
            move || async move {
                let detail = certificates.describe_certificate(arn).await?;
                if detail.is_issued() {
                    Ok(WaitState::Ready(detail))
                } else if detail.status.eq_ignore_ascii_case("FAILED") {
                    Err(DeployError::step(
                        StepName::CustomDomain,
                        format!("certificate {} validation failed", arn),
                    ))
                } else {
                    Ok(WaitState::Pending(detail.status))
                }
            },
        )
        .await
    }

    /// Read-modify-write of the distribution config, retried on ETag conflicts
    async fn attach(
        &self,
        distribution_id: &str,
        aliases: &[String],
        certificate_arn: &str,
        ctx: &StepContext<'_>,
    ) -> Result<(), DeployError> {
        for attempt in 1..=MAX_UPDATE_ATTEMPTS {
            let mut current = self.cdn.get_distribution_config(distribution_id).await?;
            if !apply_domain(&mut current.config, aliases, certificate_arn)? {
                ctx.progress.emit(format!("Distribution {} already serves {}", distribution_id, aliases.join(", ")));
                return Ok(());
            }

            match self
                .cdn
                .update_distribution_config(distribution_id, &current.config, &current.etag)
                .await?
            {
                DistributionUpdate::Updated { .. } => {
                    ctx.progress.emit(format!(
                        "Attached {} to distribution {}",
                        aliases.join(", "),
                        distribution_id
                    ));
                    return Ok(());
                }
                DistributionUpdate::PreconditionFailed => {
                    ctx.progress.emit(format!(
                        "Distribution {} changed concurrently, retrying ({}/{})",
                        distribution_id, attempt, MAX_UPDATE_ATTEMPTS
                    ));
                }
            }
        }
        Err(DeployError::step(
            StepName::CustomDomain,
            format!("distribution {} kept changing during update", distribution_id),
        ))
    }
}

/// Add `aliases` and the certificate to a distribution config.
///
/// Existing aliases are kept. Returns whether anything changed.
pub fn apply_domain(config: &mut Value, aliases: &[String], certificate_arn: &str) -> Result<bool, DeployError> {
    let Some(map) = config.as_object_mut() else {
        return Err(DeployError::step(StepName::CustomDomain, "distribution config is not an object"));
    };

    let mut items: Vec<String> = map
        .get("Aliases")
        .and_then(|a| a.get("Items"))
        .and_then(|i| i.as_array())
        .map(|items| items.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
        .unwrap_or_default();
    for alias in aliases {
        if !items.iter().any(|i| i.eq_ignore_ascii_case(alias)) {
            items.push(alias.clone());
        }
    }
    let new_aliases = json!({ "Quantity": items.len(), "Items": items });
    let new_certificate = json!({
        "CloudFrontDefaultCertificate": false,
        "ACMCertificateArn": certificate_arn,
        "SSLSupportMethod": "sni-only",
        "MinimumProtocolVersion": "TLSv1.2_2021"
    });

    let unchanged = map.get("Aliases") == Some(&new_aliases)
        && map
            .get("ViewerCertificate")
            .and_then(|c| c.get("ACMCertificateArn"))
            .and_then(|a| a.as_str())
            == Some(certificate_arn);
    if unchanged {
        return Ok(false);
    }

    map.insert("Aliases".to_string(), new_aliases);
    map.insert("ViewerCertificate".to_string(), new_certificate);
    Ok(true)
}

#[async_trait]
impl ProvisioningStep for CustomDomainStep {
    fn name(&self) -> StepName {
        StepName::CustomDomain
    }

    fn applies_to(&self, request: &DeploymentRequest) -> bool {
        request.domain_configuration.is_some()
    }

    async fn provision(&self, request: &DeploymentRequest, ctx: &StepContext<'_>) -> StepResult {
        let Some(config) = &request.domain_configuration else {
            return StepResult::failed(self.name(), "no domain configuration");
        };

        let mut result = StepResult::succeeded(self.name());
        if let Err(e) = self.run(config, ctx, &mut result).await {
            ctx.progress.emit(format!("Custom domain {} failed: {}", config.domain_name, e));
            result.success = false;
            result.error = Some(e.to_string());
        }
        result
    }
}
