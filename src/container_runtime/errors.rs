use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContainerRuntimeError {
    #[error("cannot log in to container registry: {raw_error_message}")]
    LoginFailed { raw_error_message: String },
    #[error("cannot pull image `{tag}`: {raw_error_message}")]
    PullFailed { tag: String, raw_error_message: String },
    #[error("pull of `{tag}` returned no `:latest` tag among {discovered_tags:?}")]
    NoLatestTag { tag: String, discovered_tags: Vec<String> },
    #[error("cannot start container from `{tag}`: {raw_error_message}")]
    RunFailed { tag: String, raw_error_message: String },
    #[error("cannot inspect container `{container_id}`: {raw_error_message}")]
    InspectFailed {
        container_id: String,
        raw_error_message: String,
    },
    #[error("cannot list running containers: {raw_error_message}")]
    ListFailed { raw_error_message: String },
    #[error("cannot fetch logs for container `{container_id}`: {raw_error_message}")]
    LogsFailed {
        container_id: String,
        raw_error_message: String,
    },
    #[error("cannot stop container `{container_id}`: {raw_error_message}")]
    StopFailed {
        container_id: String,
        raw_error_message: String,
    },
    #[error("cannot tag image `{source}` as `{target}`: {raw_error_message}")]
    TagFailed {
        source: String,
        target: String,
        raw_error_message: String,
    },
    #[error("cannot push `{repo}:{tag}`: {raw_error_message}")]
    PushFailed {
        repo: String,
        tag: String,
        raw_error_message: String,
    },
}
