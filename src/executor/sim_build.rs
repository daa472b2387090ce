//! SIM_BUILD job flow (spec §4.8): build the simulator package against a
//! fixed base image, with decrypted cloud/registry credentials injected.

use crate::container_runtime::ContainerSpec;
use crate::job::{BuildSpec, Results};
use crate::secrets::resolve_build_credentials;

use super::{finalize_containers, ExecutorContext, ExecutorError};

pub async fn run(job_id: &str, build: &BuildSpec, results: &mut Results, ctx: &ExecutorContext<'_>) -> Result<(), ExecutorError> {
    let image = ctx.runtime.pull(crate::config::SIM_BUILD_BASE_IMAGE).await?;
    results.sim_base_docker_digest = Some(image.digest);

    let creds = resolve_build_credentials(ctx.secrets, ctx.decryptor).await?;

    let mut env = std::collections::HashMap::new();
    env.insert("DEEPDRIVE_COMMIT".to_string(), build.commit.clone());
    env.insert("DEEPDRIVE_BRANCH".to_string(), build.branch.clone());
    env.insert("IS_DEEPDRIVE_SIM_BUILD".to_string(), "1".to_string());
    env.insert("CLOUD_ACCESS_KEY".to_string(), creds.cloud_access_key);
    env.insert("CLOUD_SECRET_KEY".to_string(), creds.cloud_secret_key);
    env.insert("REGISTRY_USER".to_string(), creds.registry_user);
    env.insert("REGISTRY_PASS".to_string(), creds.registry_pass);

    let spec = ContainerSpec {
        image: crate::config::SIM_BUILD_BASE_IMAGE.to_string(),
        env,
        ..Default::default()
    };

    let (containers, _success) = crate::supervisor::run(ctx.runtime, &[spec]).await?;
    finalize_containers(job_id, containers, results, ctx).await?;
    Ok(())
}
