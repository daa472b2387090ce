//! DEEPDRIVE_BUILD job flow (spec §4.8): same shape as SIM_BUILD, but the
//! build container gets the host's container-control socket bind-mounted
//! (Docker-in-Docker pattern) so it can itself drive image builds.

use crate::container_runtime::ContainerSpec;
use crate::job::{BuildSpec, Results};
use crate::secrets::resolve_build_credentials;

use super::{finalize_containers, ExecutorContext, ExecutorError};

pub async fn run(job_id: &str, build: &BuildSpec, results: &mut Results, ctx: &ExecutorContext<'_>) -> Result<(), ExecutorError> {
    let image = ctx.runtime.pull(crate::config::DEEPDRIVE_BUILD_BASE_IMAGE).await?;
    results.deepdrive_base_docker_digest = Some(image.digest);

    let creds = resolve_build_credentials(ctx.secrets, ctx.decryptor).await?;

    let mut env = std::collections::HashMap::new();
    env.insert("DEEPDRIVE_COMMIT".to_string(), build.commit.clone());
    env.insert("DEEPDRIVE_BRANCH".to_string(), build.branch.clone());
    env.insert("IS_DEEPDRIVE_BUILD".to_string(), "1".to_string());
    env.insert("CLOUD_ACCESS_KEY".to_string(), creds.cloud_access_key);
    env.insert("CLOUD_SECRET_KEY".to_string(), creds.cloud_secret_key);
    env.insert("REGISTRY_USER".to_string(), creds.registry_user);
    env.insert("REGISTRY_PASS".to_string(), creds.registry_pass);

    let spec = ContainerSpec {
        image: crate::config::DEEPDRIVE_BUILD_BASE_IMAGE.to_string(),
        env,
        volumes: vec![(
            crate::config::DOCKER_SOCKET_PATH.to_string(),
            crate::config::DOCKER_SOCKET_PATH.to_string(),
        )],
        ..Default::default()
    };

    let (containers, _success) = crate::supervisor::run(ctx.runtime, &[spec]).await?;
    finalize_containers(job_id, containers, results, ctx).await?;
    Ok(())
}
