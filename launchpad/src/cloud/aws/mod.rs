//! AWS backend driven through the `aws` and `sam` command line tools

pub mod acm;
pub mod client;
pub mod cloudformation;
pub mod cloudfront;
pub mod databases;
pub mod route53;
pub mod s3;

pub use acm::Acm;
pub use client::{AwsCli, CommandOutput};
pub use cloudformation::CloudFormation;
pub use cloudfront::CloudFront;
pub use databases::Databases;
pub use route53::Route53;
pub use s3::S3;
