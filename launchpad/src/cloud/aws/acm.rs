//! ACM certificate lookups and requests

use std::sync::Arc;

use async_trait::async_trait;
use serde::Deserialize;

use crate::cloud::aws::client::AwsCli;
use crate::cloud::{CertificateApi, CertificateDetail, ValidationRecord, CERTIFICATE_REGION};
use crate::errors::DeployError;

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ListCertificatesResponse {
    #[serde(default)]
    certificate_summary_list: Vec<CertificateSummary>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct CertificateSummary {
    certificate_arn: String,
    domain_name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct RequestCertificateResponse {
    certificate_arn: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DescribeCertificateResponse {
    certificate: Certificate,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct Certificate {
    certificate_arn: String,
    domain_name: String,
    status: String,
    #[serde(default)]
    subject_alternative_names: Vec<String>,
    #[serde(default)]
    domain_validation_options: Vec<DomainValidation>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct DomainValidation {
    resource_record: Option<ResourceRecord>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "PascalCase")]
struct ResourceRecord {
    name: String,
    #[serde(rename = "Type")]
    record_type: String,
    value: String,
}

impl From<Certificate> for CertificateDetail {
    fn from(cert: Certificate) -> Self {
        let mut validation_records: Vec<ValidationRecord> = Vec::new();
        for record in cert
            .domain_validation_options
            .into_iter()
            .filter_map(|o| o.resource_record)
        {
            // Names sharing a parent domain share one validation record
            if validation_records.iter().any(|r| r.name == record.name) {
                continue;
            }
            validation_records.push(ValidationRecord {
                name: record.name,
                record_type: record.record_type,
                value: record.value,
            });
        }
        Self {
            arn: cert.certificate_arn,
            status: cert.status,
            domain_name: cert.domain_name,
            alternative_names: cert.subject_alternative_names,
            validation_records,
        }
    }
}

/// ACM client, always addressed in the CloudFront certificate region
pub struct Acm {
    cli: Arc<AwsCli>,
}

impl Acm {
    pub fn new(cli: Arc<AwsCli>) -> Self {
        Self { cli }
    }
}

#[async_trait]
impl CertificateApi for Acm {
    async fn list_certificates(&self, domain_name: &str) -> Result<Vec<CertificateDetail>, DeployError> {
        let response: ListCertificatesResponse = self
            .cli
            .aws_json(
                CERTIFICATE_REGION,
                &[
                    "acm",
                    "list-certificates",
                    "--certificate-statuses",
                    "ISSUED",
                    "PENDING_VALIDATION",
                ],
            )
            .await?;

        let parent = domain_name.split_once('.').map(|(_, rest)| format!("*.{}", rest));
        let mut details = Vec::new();
        for summary in response.certificate_summary_list {
            let matches = summary.domain_name.eq_ignore_ascii_case(domain_name)
                || parent
                    .as_deref()
                    .is_some_and(|p| summary.domain_name.eq_ignore_ascii_case(p));
            if matches {
                details.push(self.describe_certificate(&summary.certificate_arn).await?);
            }
        }
        Ok(details)
    }

    async fn request_certificate(&self, domain_name: &str, alternative_names: &[String]) -> Result<String, DeployError> {
        let mut args = vec![
            "acm",
            "request-certificate",
            "--domain-name",
            domain_name,
            "--validation-method",
            "DNS",
        ];
        if !alternative_names.is_empty() {
            args.push("--subject-alternative-names");
            args.extend(alternative_names.iter().map(String::as_str));
        }
        let response: RequestCertificateResponse = self.cli.aws_json(CERTIFICATE_REGION, &args).await?;
        Ok(response.certificate_arn)
    }

    async fn describe_certificate(&self, arn: &str) -> Result<CertificateDetail, DeployError> {
        let response: DescribeCertificateResponse = self
            .cli
            .aws_json(
                CERTIFICATE_REGION,
                &["acm", "describe-certificate", "--certificate-arn", arn],
            )
            .await?;
        Ok(response.certificate.into())
    }
}
