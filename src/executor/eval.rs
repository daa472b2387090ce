//! EVAL job flow (spec §4.8).

use std::path::PathBuf;

use crate::config::problem_env;
use crate::container_runtime::ContainerSpec;
use crate::job::{EvalSpec, Results};
use crate::results::{extract_stdout_json, merge_file_channel};

use super::{finalize_containers, ExecutorContext, ExecutorError};

pub async fn run(
    job_id: &str,
    eval_spec: &EvalSpec,
    botleague_liaison_host: &str,
    results: &mut Results,
    ctx: &ExecutorContext<'_>,
) -> Result<(), ExecutorError> {
    let suffix = eval_spec
        .problem_def
        .as_ref()
        .and_then(|d| d.container_postfix.clone())
        .unwrap_or_default();

    let problem_tag = format!("deepdriveio/deepdrive:problem_{}{}", eval_spec.problem, suffix);
    let bot_tag = format!("{}{}", eval_spec.docker_tag, suffix);

    let problem_image = match ctx.runtime.pull(&problem_tag).await {
        Ok(image) => Some(image),
        Err(e) => {
            results.errors.insert("problem_pull".to_string(), e.to_string());
            None
        }
    };
    let bot_image = if eval_spec.run_problem_only {
        None
    } else {
        match ctx.runtime.pull(&bot_tag).await {
            Ok(image) => Some(image),
            Err(e) => {
                results.errors.insert("bot_pull".to_string(), e.to_string());
                None
            }
        }
    };

    if problem_image.is_none() || (!eval_spec.run_problem_only && bot_image.is_none()) {
        return Ok(());
    }
    results.problem_docker_digest = problem_image.map(|i| i.digest);
    results.bot_docker_digest = bot_image.map(|i| i.digest);

    let results_mount_host = PathBuf::from(ctx.results_mount_base.as_ref()).join(&eval_spec.eval_id);
    std::fs::create_dir_all(&results_mount_host).ok();
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        if let Ok(meta) = std::fs::metadata(&results_mount_host) {
            let mut perms = meta.permissions();
            perms.set_mode(0o777);
            let _ = std::fs::set_permissions(&results_mount_host, perms);
        }
    }

    let mut env = std::collections::HashMap::new();
    env.insert(problem_env::EVAL_KEY.to_string(), eval_spec.eval_key.clone());
    env.insert(problem_env::SEED.to_string(), eval_spec.seed.to_string());
    env.insert(problem_env::PROBLEM.to_string(), eval_spec.problem.clone());
    env.insert(
        problem_env::RESULT_FILEPATH.to_string(),
        format!("{}/results.json", crate::config::IN_CONTAINER_RESULTS_DIR),
    );
    env.insert(problem_env::DEEPDRIVE_UPLOAD.to_string(), "1".to_string());
    env.insert(
        problem_env::APPLICATION_CREDENTIALS.to_string(),
        crate::config::CREDENTIALS_MOUNT_DEST.to_string(),
    );

    let problem_spec = ContainerSpec {
        image: problem_tag.clone(),
        env,
        volumes: vec![
            (
                results_mount_host.to_string_lossy().to_string(),
                crate::config::IN_CONTAINER_RESULTS_DIR.to_string(),
            ),
            (
                crate::config::CREDENTIALS_MOUNT_SOURCE.to_string(),
                crate::config::CREDENTIALS_MOUNT_DEST.to_string(),
            ),
        ],
        ..Default::default()
    };

    let mut specs = vec![problem_spec];
    if !eval_spec.run_problem_only {
        specs.push(ContainerSpec {
            image: bot_tag.clone(),
            ..Default::default()
        });
    }

    let (containers, success) = crate::supervisor::run(ctx.runtime, &specs).await?;
    let combined_log = finalize_containers(job_id, containers, results, ctx).await?;
    results.json_results_from_logs = extract_stdout_json(&combined_log);

    if success {
        merge_file_channel(results, &PathBuf::from(ctx.results_mount_base.as_ref()), &eval_spec.eval_id);

        let archive_names = archive_names(eval_spec, &bot_tag, job_id);
        if let Err(e) = retag_and_push(ctx, &bot_tag, &archive_names.bot).await {
            results.errors.insert("bot_archive".to_string(), e.to_string());
        }
        if let Err(e) = retag_and_push(ctx, &problem_tag, &archive_names.problem).await {
            results.errors.insert("problem_archive".to_string(), e.to_string());
        }
    }

    crate::reporter::post_results(
        ctx.http_client,
        botleague_liaison_host,
        &eval_spec.eval_key,
        &serde_json::to_value(&*results).unwrap_or_default(),
        ctx.is_test,
    )
    .await
    .map_err(|e| {
        results.errors.insert("report".to_string(), e.to_string());
        e
    })
    .ok();

    Ok(())
}

struct ArchiveNames {
    bot: String,
    problem: String,
}

/// Deterministic archive names per spec §4.8 step 6. In the absence of a
/// structured "user"/"bot name"/"problem owner" split in `EvalSpec`, we
/// derive them from the docker tags and problem name the job already
/// carries, which is what the source actually has on hand at this point.
fn archive_names(eval_spec: &EvalSpec, bot_tag: &str, job_id: &str) -> ArchiveNames {
    let bot_label = bot_tag.rsplit(':').next().unwrap_or(bot_tag).replace('/', "-");
    ArchiveNames {
        bot: format!("bot-{bot_label}-{}-{job_id}", eval_spec.problem),
        problem: format!("problem-{}-{job_id}", eval_spec.problem),
    }
}

async fn retag_and_push(ctx: &ExecutorContext<'_>, source_tag: &str, new_tag: &str) -> Result<(), ExecutorError> {
    ctx.runtime.tag(source_tag, crate::config::ARCHIVE_REPO, new_tag).await?;
    ctx.runtime.push(crate::config::ARCHIVE_REPO, new_tag).await?;
    Ok(())
}
