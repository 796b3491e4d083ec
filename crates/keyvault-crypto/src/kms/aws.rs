//! AWS KMS client.

use super::RemoteKmsClient;
use crate::{CryptoError, CryptoResult, SecureBytes};
use async_trait::async_trait;
use aws_sdk_kms::config::Region;
use aws_sdk_kms::error::{ProvideErrorMetadata, SdkError};
use aws_sdk_kms::primitives::Blob;
use aws_sdk_kms::Client as KmsClient;
use keyvault_core::{KmsProvider, ProviderMetadata};
use tracing::debug;

/// [`RemoteKmsClient`] backed by the AWS SDK.
///
/// The client is built per call from the shared SDK configuration so the
/// `region` (and optional `endpoint`) recorded on each key document is
/// honoured.
pub struct AwsKmsClient {
    config: aws_config::SdkConfig,
}

impl AwsKmsClient {
    /// Creates a client from the default AWS credential chain.
    pub async fn new() -> Self {
        let config = aws_config::load_defaults(aws_config::BehaviorVersion::latest()).await;
        Self { config }
    }

    /// Creates a client from an existing SDK configuration.
    #[must_use]
    pub fn with_config(config: aws_config::SdkConfig) -> Self {
        Self { config }
    }

    fn client_for(&self, metadata: &ProviderMetadata) -> KmsClient {
        let mut builder = aws_sdk_kms::config::Builder::from(&self.config);
        if let Some(region) = metadata.get("region") {
            builder = builder.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = metadata.get("endpoint") {
            builder = builder.endpoint_url(endpoint.clone());
        }
        KmsClient::from_conf(builder.build())
    }
}

impl std::fmt::Debug for AwsKmsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AwsKmsClient")
            .field("region", &self.config.region())
            .finish()
    }
}

fn master_key(metadata: &ProviderMetadata) -> CryptoResult<&str> {
    metadata
        .get("key")
        .map(String::as_str)
        .ok_or_else(|| CryptoError::InvalidMetadata {
            provider: KmsProvider::Aws,
            field: "key".to_string(),
        })
}

fn classify<E, R>(err: SdkError<E, R>, key: &str) -> CryptoError
where
    E: ProvideErrorMetadata + std::fmt::Debug,
    R: std::fmt::Debug,
{
    let unavailable = |message: String| CryptoError::ProviderUnavailable {
        provider: KmsProvider::Aws,
        message,
    };

    let service = match err {
        SdkError::ServiceError(ref context) => context.err(),
        SdkError::TimeoutError(_) | SdkError::DispatchFailure(_) | SdkError::ResponseError(_) => {
            return unavailable(format!("{err:?}"))
        }
        _ => return CryptoError::Internal(format!("{err:?}")),
    };

    let code = service.code().unwrap_or("Unknown");
    let message = format!("{code}: {}", service.message().unwrap_or("no message"));
    debug!(provider = %KmsProvider::Aws, key, code, "KMS request rejected");
    match code {
        "NotFoundException" | "DisabledException" | "KMSInvalidStateException" => {
            CryptoError::KeyNotFound(format!("{key} ({message})"))
        }
        "AccessDeniedException"
        | "UnrecognizedClientException"
        | "InvalidSignatureException"
        | "ExpiredTokenException"
        | "IncorrectKeyException" => CryptoError::ProviderAuthFailure {
            provider: KmsProvider::Aws,
            message,
        },
        "InvalidCiphertextException" => CryptoError::AuthenticationFailed,
        _ => unavailable(message),
    }
}

#[async_trait]
impl RemoteKmsClient for AwsKmsClient {
    async fn encrypt(
        &self,
        _provider: KmsProvider,
        plaintext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<Vec<u8>> {
        let key = master_key(metadata)?;
        let result = self
            .client_for(metadata)
            .encrypt()
            .key_id(key)
            .plaintext(Blob::new(plaintext))
            .send()
            .await
            .map_err(|e| classify(e, key))?;

        let ciphertext = result
            .ciphertext_blob()
            .ok_or_else(|| CryptoError::Internal("No ciphertext in response".to_string()))?;

        Ok(ciphertext.as_ref().to_vec())
    }

    async fn decrypt(
        &self,
        _provider: KmsProvider,
        ciphertext: &[u8],
        metadata: &ProviderMetadata,
    ) -> CryptoResult<SecureBytes> {
        let key = master_key(metadata)?;
        let result = self
            .client_for(metadata)
            .decrypt()
            .key_id(key)
            .ciphertext_blob(Blob::new(ciphertext))
            .send()
            .await
            .map_err(|e| classify(e, key))?;

        let plaintext = result
            .plaintext()
            .ok_or_else(|| CryptoError::Internal("No plaintext in response".to_string()))?;

        Ok(SecureBytes::from_slice(plaintext.as_ref()))
    }
}
