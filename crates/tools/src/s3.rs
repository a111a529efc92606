//! S3 toolkit: bucket and object operations.
//!
//! The tools talk to an [`ObjectStorage`] rather than to the AWS SDK
//! directly. With the `s3` feature enabled, [`AwsObjectStorage`] is the
//! real implementation; tests use an in-memory fake.

use async_trait::async_trait;
use opsclaw_core::error::{RegistryError, ToolError};
use opsclaw_core::tool::{Tool, ToolInput, ToolRegistry};
use serde::Deserialize;
use std::sync::Arc;

use crate::render::{human_size, numbered};

pub const CREDENTIAL_KEY: &str = "awsKey";
pub const CREDENTIAL_SECRET: &str = "awsSecret";

/// Largest object body rendered inline in an observation.
const MAX_OBJECT_BYTES: usize = 64 * 1024;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ObjectSummary {
    pub key: String,
    pub size: u64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AclGrant {
    pub grantee: String,
    pub permission: String,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BucketAcl {
    pub owner: Option<String>,
    pub grants: Vec<AclGrant>,
}

/// Object storage backend used by the S3 tools.
///
/// Errors are already classified: access problems and missing buckets
/// are `Remote`, connectivity problems are `Transport`.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Create a bucket, returning its location when the service reports one.
    async fn create_bucket(&self, bucket: &str) -> Result<Option<String>, ToolError>;

    async fn delete_bucket(&self, bucket: &str) -> Result<(), ToolError>;

    async fn list_buckets(&self) -> Result<Vec<String>, ToolError>;

    /// Every object in the bucket, following pagination to the end.
    async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ToolError>;

    async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ToolError>;

    /// The bucket policy document, or `None` when the bucket has no policy.
    async fn bucket_policy(&self, bucket: &str) -> Result<Option<String>, ToolError>;

    async fn bucket_acl(&self, bucket: &str) -> Result<BucketAcl, ToolError>;

    async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ToolError>;
}

/// Every S3 operation exposed as a tool.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum S3Op {
    CreateBucket,
    DeleteBucket,
    ListBuckets,
    ListObjects,
    DeleteObject,
    GetBucketPolicy,
    GetBucketAcl,
    GetObject,
    GetBucketSize,
}

impl S3Op {
    pub const ALL: [S3Op; 9] = [
        Self::CreateBucket,
        Self::DeleteBucket,
        Self::ListBuckets,
        Self::ListObjects,
        Self::DeleteObject,
        Self::GetBucketPolicy,
        Self::GetBucketAcl,
        Self::GetObject,
        Self::GetBucketSize,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            Self::CreateBucket => "create-bucket",
            Self::DeleteBucket => "delete-bucket",
            Self::ListBuckets => "list-buckets",
            Self::ListObjects => "list-objects",
            Self::DeleteObject => "delete-an-object",
            Self::GetBucketPolicy => "get-bucket-policy",
            Self::GetBucketAcl => "get-bucket-acl",
            Self::GetObject => "get-an-object",
            Self::GetBucketSize => "get-bucket-size",
        }
    }

    pub fn description(&self) -> &'static str {
        match self {
            Self::CreateBucket => {
                "Call this to create a new S3 bucket. Input should be a string that specifies the name of the bucket to be created."
            }
            Self::DeleteBucket => {
                "Call this to delete an S3 bucket. Input should be a string that specifies the name of the bucket to be deleted."
            }
            Self::ListBuckets => {
                "Call this to list all the S3 buckets. Takes no input. Return a numbered list."
            }
            Self::ListObjects => {
                "Call this to list all the objects in an S3 bucket. Input should be a string that specifies the name of the bucket. \
                 Return a numbered list."
            }
            Self::DeleteObject => {
                "Call this to delete an object from an S3 bucket. Input must be a JSON object with bucketName (string) \
                 and objectName (string)."
            }
            Self::GetBucketPolicy => {
                "Call this to get the policy of an S3 bucket. Input should be a string that specifies the name of the bucket."
            }
            Self::GetBucketAcl => {
                "Call this to get the access control list (ACL) of an S3 bucket. Input should be a string that specifies \
                 the name of the bucket."
            }
            Self::GetObject => {
                "Call this to get the contents of an object in an S3 bucket. Input must be a JSON object with \
                 bucketName (string) and objectName (string)."
            }
            Self::GetBucketSize => {
                "Call this to get the total size of an S3 bucket. Input should be a string that specifies the name of the bucket."
            }
        }
    }
}

#[derive(Deserialize)]
struct ObjectRef {
    #[serde(rename = "bucketName")]
    bucket_name: String,
    #[serde(rename = "objectName")]
    object_name: String,
}

impl ObjectRef {
    fn parse(input: &ToolInput) -> Result<Self, ToolError> {
        let object: Self = input.json()?;
        if object.bucket_name.trim().is_empty() || object.object_name.trim().is_empty() {
            return Err(ToolError::invalid_input(
                "bucketName and objectName must not be empty",
            ));
        }
        Ok(object)
    }
}

fn render_object(bytes: &[u8]) -> String {
    match std::str::from_utf8(bytes) {
        Ok(text) if bytes.len() <= MAX_OBJECT_BYTES => text.to_string(),
        Ok(_) => {
            let text = String::from_utf8_lossy(&bytes[..MAX_OBJECT_BYTES]);
            format!("{text}\n... ({} bytes total, truncated)", bytes.len())
        }
        Err(_) => format!("<binary object, {} bytes>", bytes.len()),
    }
}

/// One S3 operation bound to a storage backend.
pub struct S3Tool {
    op: S3Op,
    storage: Arc<dyn ObjectStorage>,
}

impl S3Tool {
    pub fn new(op: S3Op, storage: Arc<dyn ObjectStorage>) -> Self {
        Self { op, storage }
    }

    async fn run(&self, input: &ToolInput) -> Result<String, ToolError> {
        let storage = &self.storage;
        match self.op {
            S3Op::CreateBucket => {
                let bucket = input.required_text("a bucket name")?;
                match storage.create_bucket(bucket).await? {
                    Some(location) => Ok(format!("Bucket created with location {location}.")),
                    None => Ok(format!("Bucket {bucket} created.")),
                }
            }
            S3Op::DeleteBucket => {
                let bucket = input.required_text("a bucket name")?;
                storage.delete_bucket(bucket).await?;
                Ok(format!("{bucket} successfully deleted."))
            }
            S3Op::ListBuckets => {
                let buckets = storage.list_buckets().await?;
                Ok(numbered(buckets, "There are no buckets."))
            }
            S3Op::ListObjects => {
                let bucket = input.required_text("a bucket name")?;
                let objects = storage.list_objects(bucket).await?;
                Ok(numbered(
                    objects.iter().map(|o| o.key.as_str()),
                    &format!("The bucket {bucket} is empty."),
                ))
            }
            S3Op::DeleteObject => {
                let object = ObjectRef::parse(input)?;
                storage
                    .delete_object(&object.bucket_name, &object.object_name)
                    .await?;
                Ok(format!(
                    "The object '{}' has been successfully deleted from the '{}' S3 bucket.",
                    object.object_name, object.bucket_name
                ))
            }
            S3Op::GetBucketPolicy => {
                let bucket = input.required_text("a bucket name")?;
                match storage.bucket_policy(bucket).await? {
                    Some(policy) => Ok(policy),
                    None => Ok(format!("The bucket {bucket} has no policy.")),
                }
            }
            S3Op::GetBucketAcl => {
                let bucket = input.required_text("a bucket name")?;
                let acl = storage.bucket_acl(bucket).await?;
                let grants = numbered(
                    acl.grants
                        .iter()
                        .map(|g| format!("{}: {}", g.grantee, g.permission)),
                    "(no grants)",
                );
                Ok(format!(
                    "Owner: {}\nGrants:\n{grants}",
                    acl.owner.as_deref().unwrap_or("unknown")
                ))
            }
            S3Op::GetObject => {
                let object = ObjectRef::parse(input)?;
                let bytes = storage
                    .get_object(&object.bucket_name, &object.object_name)
                    .await?;
                Ok(render_object(&bytes))
            }
            S3Op::GetBucketSize => {
                let bucket = input.required_text("a bucket name")?;
                let total: u64 = storage
                    .list_objects(bucket)
                    .await?
                    .iter()
                    .map(|o| o.size)
                    .sum();
                Ok(format!("Size of the bucket {bucket}: {}", human_size(total)))
            }
        }
    }
}

#[async_trait]
impl Tool for S3Tool {
    fn name(&self) -> &str {
        self.op.name()
    }

    fn description(&self) -> &str {
        self.op.description()
    }

    async fn invoke(&self, input: ToolInput) -> Result<String, ToolError> {
        self.run(&input).await
    }
}

/// Register every S3 tool against one storage backend.
pub fn toolkit(storage: Arc<dyn ObjectStorage>) -> Result<ToolRegistry, RegistryError> {
    let mut registry = ToolRegistry::new();
    for op in S3Op::ALL {
        registry.register(Arc::new(S3Tool::new(op, storage.clone())))?;
    }
    Ok(registry)
}

#[cfg(feature = "s3")]
pub use aws::AwsObjectStorage;

#[cfg(feature = "s3")]
mod aws {
    use super::{AclGrant, BucketAcl, ObjectStorage, ObjectSummary};
    use async_trait::async_trait;
    use aws_config::BehaviorVersion;
    use aws_sdk_s3::config::{Credentials as AwsCredentials, Region};
    use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata, SdkError};
    use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
    use opsclaw_core::credential::Credentials;
    use opsclaw_core::error::{CredentialError, ToolError};
    use tracing::debug;

    /// [`ObjectStorage`] backed by the AWS SDK.
    #[derive(Debug, Clone)]
    pub struct AwsObjectStorage {
        client: aws_sdk_s3::Client,
        region: String,
    }

    impl AwsObjectStorage {
        pub async fn connect(
            credentials: &Credentials,
            region: &str,
        ) -> Result<Self, CredentialError> {
            let key = credentials.get(super::CREDENTIAL_KEY)?;
            let secret = credentials.get(super::CREDENTIAL_SECRET)?;
            let aws_credentials =
                AwsCredentials::new(key, secret, None, None, "opsclaw-credentials");

            let sdk_config = aws_config::defaults(BehaviorVersion::latest())
                .region(Region::new(region.to_string()))
                .credentials_provider(aws_credentials)
                .load()
                .await;

            debug!(region, "Created S3 client");
            Ok(Self {
                client: aws_sdk_s3::Client::new(&sdk_config),
                region: region.to_string(),
            })
        }
    }

    fn map_sdk_error<E, R>(err: SdkError<E, R>) -> ToolError
    where
        E: ProvideErrorMetadata + std::error::Error + 'static,
        R: std::fmt::Debug,
    {
        if matches!(
            err,
            SdkError::DispatchFailure(_) | SdkError::TimeoutError(_)
        ) {
            return ToolError::transport(format!("S3 unreachable: {}", DisplayErrorContext(&err)));
        }
        match (err.code(), err.message()) {
            (Some(code), Some(message)) => ToolError::remote(format!("{code}: {message}")),
            (Some(code), None) => ToolError::remote(code.to_string()),
            _ => ToolError::remote(DisplayErrorContext(&err).to_string()),
        }
    }

    #[async_trait]
    impl ObjectStorage for AwsObjectStorage {
        async fn create_bucket(&self, bucket: &str) -> Result<Option<String>, ToolError> {
            let mut request = self.client.create_bucket().bucket(bucket);
            // us-east-1 rejects an explicit location constraint
            if self.region != "us-east-1" {
                request = request.create_bucket_configuration(
                    CreateBucketConfiguration::builder()
                        .location_constraint(BucketLocationConstraint::from(self.region.as_str()))
                        .build(),
                );
            }
            let output = request.send().await.map_err(map_sdk_error)?;
            Ok(output.location().map(str::to_string))
        }

        async fn delete_bucket(&self, bucket: &str) -> Result<(), ToolError> {
            self.client
                .delete_bucket()
                .bucket(bucket)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        }

        async fn list_buckets(&self) -> Result<Vec<String>, ToolError> {
            let output = self
                .client
                .list_buckets()
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(output
                .buckets()
                .iter()
                .filter_map(|b| b.name().map(str::to_string))
                .collect())
        }

        async fn list_objects(&self, bucket: &str) -> Result<Vec<ObjectSummary>, ToolError> {
            let mut objects = Vec::new();
            let mut continuation: Option<String> = None;

            loop {
                let output = self
                    .client
                    .list_objects_v2()
                    .bucket(bucket)
                    .set_continuation_token(continuation.take())
                    .send()
                    .await
                    .map_err(map_sdk_error)?;

                objects.extend(output.contents().iter().filter_map(|o| {
                    o.key().map(|key| ObjectSummary {
                        key: key.to_string(),
                        size: o.size().unwrap_or(0).max(0) as u64,
                    })
                }));

                match output.next_continuation_token() {
                    Some(token) if output.is_truncated().unwrap_or(false) => {
                        continuation = Some(token.to_string());
                    }
                    _ => break,
                }
            }

            debug!(bucket, count = objects.len(), "Listed objects");
            Ok(objects)
        }

        async fn delete_object(&self, bucket: &str, key: &str) -> Result<(), ToolError> {
            self.client
                .delete_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(map_sdk_error)?;
            Ok(())
        }

        async fn bucket_policy(&self, bucket: &str) -> Result<Option<String>, ToolError> {
            match self.client.get_bucket_policy().bucket(bucket).send().await {
                Ok(output) => Ok(output.policy().map(str::to_string)),
                Err(err) if err.code() == Some("NoSuchBucketPolicy") => Ok(None),
                Err(err) => Err(map_sdk_error(err)),
            }
        }

        async fn bucket_acl(&self, bucket: &str) -> Result<BucketAcl, ToolError> {
            let output = self
                .client
                .get_bucket_acl()
                .bucket(bucket)
                .send()
                .await
                .map_err(map_sdk_error)?;

            let owner = output
                .owner()
                .and_then(|o| o.display_name().or(o.id()))
                .map(str::to_string);
            let grants = output
                .grants()
                .iter()
                .map(|g| {
                    let grantee = g
                        .grantee()
                        .and_then(|who| {
                            who.display_name()
                                .or(who.email_address())
                                .or(who.uri())
                                .or(who.id())
                        })
                        .unwrap_or("unknown");
                    AclGrant {
                        grantee: grantee.to_string(),
                        permission: g
                            .permission()
                            .map(|p| p.as_str().to_string())
                            .unwrap_or_else(|| "unknown".into()),
                    }
                })
                .collect();

            Ok(BucketAcl { owner, grants })
        }

        async fn get_object(&self, bucket: &str, key: &str) -> Result<Vec<u8>, ToolError> {
            let output = self
                .client
                .get_object()
                .bucket(bucket)
                .key(key)
                .send()
                .await
                .map_err(map_sdk_error)?;
            let body = output
                .body
                .collect()
                .await
                .map_err(|e| ToolError::transport(format!("Failed to read object body: {e}")))?;
            Ok(body.into_bytes().to_vec())
        }
    }
}
