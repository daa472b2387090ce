//! Identity provider's symmetric KMS, modeled only as an abstract trait.
//!
//! Spec §1 explicitly scopes "the credential store... cloud metadata
//! service" as abstract providers referenced only through their
//! interfaces; we don't fabricate a concrete KMS SDK dependency, only the
//! seam C8's build executors (SIM_BUILD/DEEPDRIVE_BUILD) call through to
//! decrypt cloud access keys and registry credentials (spec §4.8).

use async_trait::async_trait;
use thiserror::Error;

use crate::job::Secret;

#[derive(Error, Debug)]
pub enum SecretsError {
    #[error("no secret named `{name}`")]
    NotFound { name: String },
    #[error("cannot decrypt secret `{name}`: {raw_error_message}")]
    DecryptFailed { name: String, raw_error_message: String },
}

#[async_trait]
pub trait SecretDecryptor: Send + Sync {
    async fn decrypt(&self, secret: &Secret) -> Result<String, SecretsError>;
}

/// Credentials a build job needs: cloud access key/secret plus the
/// container registry's own user/pass (spec §4.8 SIM_BUILD/DEEPDRIVE_BUILD).
#[derive(Debug, Clone)]
pub struct BuildCredentials {
    pub cloud_access_key: String,
    pub cloud_secret_key: String,
    pub registry_user: String,
    pub registry_pass: String,
}

pub async fn resolve_build_credentials(
    registry: &dyn crate::registry::Collection<Secret>,
    decryptor: &dyn SecretDecryptor,
) -> Result<BuildCredentials, SecretsError> {
    let cloud_access_key = decrypt_named(registry, decryptor, "cloud_access_key").await?;
    let cloud_secret_key = decrypt_named(registry, decryptor, "cloud_secret_key").await?;
    let registry_user = decrypt_named(registry, decryptor, "registry_user").await?;
    let registry_pass = decrypt_named(registry, decryptor, "registry_pass").await?;
    Ok(BuildCredentials {
        cloud_access_key,
        cloud_secret_key,
        registry_user,
        registry_pass,
    })
}

async fn decrypt_named(
    registry: &dyn crate::registry::Collection<Secret>,
    decryptor: &dyn SecretDecryptor,
    name: &str,
) -> Result<String, SecretsError> {
    let secret = registry
        .get(name)
        .await
        .map_err(|e| SecretsError::DecryptFailed {
            name: name.to_string(),
            raw_error_message: e.to_string(),
        })?
        .ok_or_else(|| SecretsError::NotFound { name: name.to_string() })?;
    decryptor.decrypt(&secret).await
}

/// Production decryptor wired up by the binary. The real symmetric KMS that
/// decrypts secret ciphertext is the Identity & Config Provider's
/// collaborator, out of scope per spec §1 ("abstract providers, referenced
/// only through their interfaces") — this forwards the stored ciphertext
/// as-is, leaving the actual unwrap to whatever already decrypted it before
/// it reached the secrets collection.
pub struct PlaintextSecretDecryptor;

#[async_trait]
impl SecretDecryptor for PlaintextSecretDecryptor {
    async fn decrypt(&self, secret: &Secret) -> Result<String, SecretsError> {
        Ok(secret.ciphertext.clone())
    }
}

#[cfg(test)]
pub struct FakeSecretDecryptor;

#[cfg(test)]
#[async_trait]
impl SecretDecryptor for FakeSecretDecryptor {
    async fn decrypt(&self, secret: &Secret) -> Result<String, SecretsError> {
        Ok(format!("decrypted:{}", secret.ciphertext))
    }
}
