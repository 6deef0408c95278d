use aws_sdk_kms::types::{KeyUsageType, OriginType};
use snapshot_migration_core::client::KeyService;
use snapshot_migration_core::contract::{ErrorKind, MigrationError};

use super::block_on;
use super::errors::classify_sdk_error;

pub struct KmsKeyService {
    client: aws_sdk_kms::Client,
}

impl KmsKeyService {
    pub fn new(client: aws_sdk_kms::Client) -> Self {
        Self { client }
    }
}

impl KeyService for KmsKeyService {
    fn find_key_by_alias(&self, alias: &str) -> Result<Option<String>, MigrationError> {
        let result = block_on(self.client.describe_key().key_id(alias).send());
        match result {
            Ok(output) => Ok(output
                .key_metadata()
                .map(|metadata| metadata.key_id().to_string())),
            Err(error) => {
                let error = classify_sdk_error("DescribeKey", &error);
                if error.kind() == ErrorKind::NotFound {
                    Ok(None)
                } else {
                    Err(error)
                }
            }
        }
    }

    fn create_key(&self, description: &str) -> Result<String, MigrationError> {
        let output = block_on(
            self.client
                .create_key()
                .description(description)
                .key_usage(KeyUsageType::EncryptDecrypt)
                .origin(OriginType::AwsKms)
                .bypass_policy_lockout_safety_check(false)
                .send(),
        )
        .map_err(|error| classify_sdk_error("CreateKey", &error))?;
        output
            .key_metadata()
            .map(|metadata| metadata.key_id().to_string())
            .ok_or_else(|| {
                MigrationError::new(ErrorKind::Unknown, "CreateKey returned no key metadata")
            })
    }

    fn create_alias(&self, alias: &str, key_id: &str) -> Result<(), MigrationError> {
        block_on(
            self.client
                .create_alias()
                .alias_name(alias)
                .target_key_id(key_id)
                .send(),
        )
        .map(|_| ())
        .map_err(|error| classify_sdk_error("CreateAlias", &error))
    }
}
