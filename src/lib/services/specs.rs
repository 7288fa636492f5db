use std::path::Path;

use tracing::{debug, info};

use super::types::{
    API, API_BASE_IMAGE, BindMount, ContainerSpec, HASURA, HBP, Link, MINIO, MINIO_CLIENT,
    POSTGRES, SpecError, SpecResult,
};
use crate::lib::config::types::{NhostConfig, RunContext};

const POSTGRES_CONTAINER_PORT: u16 = 5432;
const BUCKET: &str = "nhost";
const SOCIAL_PROVIDERS: [&str; 4] = ["GOOGLE", "FACEBOOK", "GITHUB", "LINKEDIN"];
const SOCIAL_FIELDS: [&str; 3] = ["ENABLE", "CLIENT_ID", "CLIENT_SECRET"];

/// Content of `.nhost/Dockerfile-api`.
pub const DOCKERFILE_API: &str = r#"
FROM nhost/nodeapi:v0.2.7
WORKDIR /usr/src/app
COPY api ./api
RUN ./install.sh
ENTRYPOINT ["./entrypoint-dev.sh"]
"#;

/// Derives the specs and makes sure every bind-mount source exists on the
/// host. The custom API is included only when the project has an `api/` dir.
pub fn build_specs(
    ctx: &RunContext,
    config: &NhostConfig,
    env_vars: &[String],
) -> SpecResult<Vec<ContainerSpec>> {
    let with_api = ctx.api_dir().is_dir();
    let specs = container_specs(ctx, config, env_vars, with_api);
    ensure_mount_dirs(&specs)?;

    info!(
        containers = specs.len(),
        custom_api = with_api,
        "Container configurations generated"
    );
    Ok(specs)
}

/// Specs in start order. Every container only links to ones before it.
pub fn container_specs(
    ctx: &RunContext,
    config: &NhostConfig,
    env_vars: &[String],
    with_api: bool,
) -> Vec<ContainerSpec> {
    let mut specs = vec![
        postgres(ctx, config),
        minio(ctx, config),
        minio_client(config),
        hasura(config, env_vars),
        hasura_backend_plus(ctx, config, env_vars),
    ];
    if with_api {
        specs.push(custom_api(ctx, config, env_vars));
    }
    specs
}

/// Distinct images referenced by `specs`, first use first.
pub fn required_images(specs: &[ContainerSpec]) -> Vec<String> {
    let mut images: Vec<String> = Vec::with_capacity(specs.len());
    for spec in specs {
        if !images.contains(&spec.image) {
            images.push(spec.image.clone());
        }
    }
    images
}

pub fn ensure_mount_dirs(specs: &[ContainerSpec]) -> SpecResult<()> {
    for mount in specs.iter().flat_map(|spec| &spec.mounts) {
        ensure_dir(&mount.source)?;
    }
    Ok(())
}

fn ensure_dir(path: &Path) -> SpecResult<()> {
    if path.is_dir() {
        return Ok(());
    }
    debug!(path = %path.display(), "Creating mount directory");
    std::fs::create_dir_all(path).map_err(|source| SpecError::MountDir {
        path: path.to_path_buf(),
        source,
    })
}

pub fn write_dockerfile(ctx: &RunContext) -> std::io::Result<()> {
    std::fs::write(ctx.dockerfile_api(), DOCKERFILE_API)
}

fn admin_secret(config: &NhostConfig) -> &str {
    config.admin_secret().unwrap_or_default()
}

fn postgres(ctx: &RunContext, config: &NhostConfig) -> ContainerSpec {
    let mut spec = ContainerSpec::new(POSTGRES, format!("postgres:{}", config.postgres_version));
    spec.env = vec![
        format!("POSTGRES_USER={}", config.postgres_user),
        format!("POSTGRES_PASSWORD={}", config.postgres_password),
    ];
    spec.exposed_port = Some(POSTGRES_CONTAINER_PORT);
    spec.host_port = Some(config.postgres_port);
    spec.mounts = vec![BindMount {
        source: ctx.db_data_dir(),
        target: "/var/lib/postgresql/data".to_string(),
    }];
    spec
}

fn minio(ctx: &RunContext, config: &NhostConfig) -> ContainerSpec {
    let mut spec = ContainerSpec::new(MINIO, format!("minio/minio:{}", config.minio_version));
    spec.env = vec![
        format!("MINIO_ACCESS_KEY={}", config.minio_access_key),
        format!("MINIO_SECRET_KEY={}", config.minio_secret_key),
    ];
    spec.exposed_port = Some(config.minio_port);
    spec.host_port = Some(config.minio_port);
    spec.entrypoint = Some(vec!["sh".to_string()]);
    spec.cmd = Some(vec![
        "-c".to_string(),
        format!("/usr/bin/minio server --address :{} /data", config.minio_port),
    ]);
    spec.mounts = vec![
        BindMount {
            source: ctx.minio_data_dir(),
            target: "/data".to_string(),
        },
        BindMount {
            source: ctx.minio_config_dir(),
            target: "/.minio".to_string(),
        },
    ];
    spec
}

/// One-shot `mc` run that (re)creates the storage bucket.
fn minio_client(config: &NhostConfig) -> ContainerSpec {
    let script = [
        format!(
            "/usr/bin/mc config host add myminio http://nhost-minio:{} {} {};",
            config.minio_port, config.minio_access_key, config.minio_secret_key
        ),
        format!("/usr/bin/mc rm -r --force myminio/{BUCKET};"),
        format!("/usr/bin/mc mb myminio/{BUCKET};"),
        format!("/usr/bin/mc policy download myminio/{BUCKET};"),
        "exit 0;".to_string(),
    ]
    .join(" ");

    let mut spec = ContainerSpec::new(MINIO_CLIENT, format!("minio/mc:{}", config.mc_version));
    spec.exposed_port = Some(config.minio_port);
    spec.entrypoint = Some(vec!["sh".to_string()]);
    spec.cmd = Some(vec!["-c".to_string(), script]);
    spec.links = vec![Link::new(MINIO, "nhost-minio")];
    spec
}

fn hasura(config: &NhostConfig, env_vars: &[String]) -> ContainerSpec {
    let port = config.hasura_graphql_port;
    let mut spec = ContainerSpec::new(HASURA, config.graphql_image());
    spec.env = vec![
        format!("HASURA_GRAPHQL_SERVER_PORT={port}"),
        format!(
            "HASURA_GRAPHQL_DATABASE_URL=postgres://{}:{}@nhost-postgres:{}/postgres",
            config.postgres_user, config.postgres_password, POSTGRES_CONTAINER_PORT
        ),
        "HASURA_GRAPHQL_ENABLE_CONSOLE=false".to_string(),
        "HASURA_GRAPHQL_ENABLED_LOG_TYPES=startup, http-log, webhook-log, websocket-log, query-log"
            .to_string(),
        format!("HASURA_GRAPHQL_ADMIN_SECRET={}", admin_secret(config)),
        "HASURA_GRAPHQL_MIGRATIONS_SERVER_TIMEOUT=20".to_string(),
        "HASURA_GRAPHQL_NO_OF_RETRIES=20".to_string(),
        "HASURA_GRAPHQL_UNAUTHORIZED_ROLE=public".to_string(),
        format!("NHOST_HASURA_URL=http://{HASURA}:{port}/v1/graphql"),
        format!("NHOST_WEBHOOK_SECRET={}", config.webhook_secret),
        format!("NHOST_HBP_URL=http://{HBP}:{}", config.hasura_backend_plus_port),
        format!("NHOST_CUSTOM_API_URL=http://{API}:{}", config.api_port),
    ];

    if let Some(key) = &config.graphql_jwt_key {
        let secret = serde_json::json!({ "type": "HS256", "key": key });
        spec.env.push(format!("HASURA_GRAPHQL_JWT_SECRET={secret}"));
    }
    spec.env.extend_from_slice(env_vars);

    spec.exposed_port = Some(port);
    spec.host_port = Some(port);
    spec.links = vec![Link::new(POSTGRES, "nhost-postgres")];
    spec
}

fn hasura_backend_plus(ctx: &RunContext, config: &NhostConfig, env_vars: &[String]) -> ContainerSpec {
    let port = config.hasura_backend_plus_port;
    let graphql_url = format!("http://nhost-graphql-engine:{}/v1/graphql", config.hasura_graphql_port);

    let mut spec = ContainerSpec::new(
        HBP,
        format!("nhost/hasura-backend-plus:{}", config.hasura_backend_plus_version),
    );
    spec.env = vec![
        format!("PORT={port}"),
        "USER_FIELDS=''".to_string(),
        "USER_REGISTRATION_AUTO_ACTIVE=true".to_string(),
        format!("HASURA_GRAPHQL_ENDPOINT={graphql_url}"),
        format!("HASURA_ENDPOINT={graphql_url}"),
        format!("HASURA_GRAPHQL_ADMIN_SECRET={}", admin_secret(config)),
        "AUTH_ACTIVE=true".to_string(),
        "AUTH_LOCAL_ACTIVE=true".to_string(),
        "REFRESH_TOKEN_EXPIRES=43200".to_string(),
        format!("S3_ENDPOINT=nhost-minio:{}", config.minio_port),
        "S3_SSL_ENABLED=false".to_string(),
        format!("S3_BUCKET={BUCKET}"),
        format!("S3_ACCESS_KEY_ID={}", config.minio_access_key),
        format!("S3_SECRET_ACCESS_KEY={}", config.minio_secret_key),
        "LOST_PASSWORD_ENABLE=true".to_string(),
        format!(
            "PROVIDER_SUCCESS_REDIRECT={}",
            config.provider_success_redirect.as_deref().unwrap_or_default()
        ),
        format!(
            "PROVIDER_FAILURE_REDIRECT={}",
            config.provider_failure_redirect.as_deref().unwrap_or_default()
        ),
    ];

    for provider in SOCIAL_PROVIDERS {
        for field in SOCIAL_FIELDS {
            let variable = format!("{provider}_{field}");
            if let Some(value) = config.extra_value(&variable.to_lowercase()) {
                spec.env.push(format!("{variable}={value}"));
            }
        }
    }

    if let Some(key) = &config.graphql_jwt_key {
        spec.env.push(format!("JWT_KEY={key}"));
        spec.env.push("JWT_ALGORITHM=HS256".to_string());
        spec.env.push("JWT_TOKEN_EXPIRES=15".to_string());
    }
    spec.env.extend_from_slice(env_vars);

    spec.exposed_port = Some(port);
    spec.host_port = Some(port);
    spec.links = vec![
        Link::new(HASURA, "nhost-graphql-engine"),
        Link::new(MINIO, "nhost-minio"),
    ];
    spec.mounts = vec![BindMount {
        source: ctx.custom_dir(),
        target: "/app/custom".to_string(),
    }];
    spec
}

/// Runs the API sources on the base image the generated Dockerfile pins,
/// with `api/` mounted where the Dockerfile would have copied it.
fn custom_api(ctx: &RunContext, config: &NhostConfig, env_vars: &[String]) -> ContainerSpec {
    let port = config.api_port;
    let mut spec = ContainerSpec::new(API, API_BASE_IMAGE.to_string());
    spec.env = vec![
        format!("PORT={port}"),
        format!(
            "NHOST_HASURA_URL=http://nhost-hasura:{}/v1/graphql",
            config.hasura_graphql_port
        ),
        format!("NHOST_HASURA_ADMIN_SECRET={}", admin_secret(config)),
        format!("NHOST_WEBHOOK_SECRET={}", config.webhook_secret),
        format!("NHOST_HBP_URL=http://nhost-hbp:{}", config.hasura_backend_plus_port),
        format!("NHOST_CUSTOM_API_URL=http://nhost-api:{port}"),
    ];

    if let Some(key) = &config.graphql_jwt_key {
        spec.env.push(format!("NHOST_JWT_KEY={key}"));
        spec.env.push("NHOST_JWT_ALGORITHM=HS256".to_string());
    }
    spec.env.extend_from_slice(env_vars);

    spec.exposed_port = Some(port);
    spec.host_port = Some(port);
    spec.working_dir = Some("/usr/src/app".to_string());
    spec.entrypoint = Some(vec![
        "sh".to_string(),
        "-c".to_string(),
        "./install.sh && ./entrypoint-dev.sh".to_string(),
    ]);
    spec.links = vec![
        Link::new(HASURA, "nhost-hasura"),
        Link::new(HBP, "nhost-hbp"),
        Link::new(MINIO, "nhost-minio"),
    ];
    spec.mounts = vec![BindMount {
        source: ctx.api_dir(),
        target: "/usr/src/app/api".to_string(),
    }];
    spec
}
