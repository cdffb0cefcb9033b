use std::{future::IntoFuture, process, sync::Arc};

use tokio::sync::oneshot;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        auth::{AuthError, AuthService},
        comments::CommentService,
        error::AppError,
        follows::FollowService,
        groups::{CreateGroupCommand, GroupError, GroupService},
        posts::PostService,
        repos::{
            CommentsRepo, FollowsRepo, GroupsRepo, HealthProbe, PostsRepo, PostsWriteRepo,
            SessionsRepo, UsersRepo,
        },
    },
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState},
        telemetry,
        uploads::UploadStorage,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(error.exit_code());
    }
}

fn report_application_error(error: &AppError) {
    if dispatcher::has_been_set() {
        error!(error = %error, "application error");
        return;
    }

    let subscriber = tracing_fmt().with_max_level(Level::ERROR).finish();
    let dispatch = Dispatch::new(subscriber);
    dispatcher::with_default(&dispatch, || {
        error!(error = %error, "application error");
    });
}

async fn run() -> Result<(), AppError> {
    let (cli_args, settings) = config::load_with_cli()
        .map_err(|err| AppError::unexpected(format!("failed to load configuration: {err}")))?;

    let command = cli_args
        .command
        .unwrap_or(config::Command::Serve(Box::<config::ServeArgs>::default()));

    telemetry::init(&settings.logging).map_err(AppError::from)?;

    match command {
        config::Command::Serve(_) => run_serve(settings).await,
        config::Command::Groups(args) => run_groups(settings, args.command).await,
        config::Command::Users(args) => run_users(settings, args.command).await,
        config::Command::Migrate(_) => run_migrate(settings).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let state = build_http_state(repositories, &settings)?;
    serve_http(&settings, state).await
}

async fn run_migrate(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    info!(
        target: "yatube::migrate",
        pool_size = repositories.pool().size(),
        "Migrations applied"
    );
    Ok(())
}

async fn run_groups(
    settings: config::Settings,
    command: config::GroupsCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let groups_repo: Arc<dyn GroupsRepo> = repositories;
    let groups = GroupService::new(groups_repo);

    match command {
        config::GroupsCommand::Create(args) => {
            let group = groups
                .create(CreateGroupCommand {
                    title: args.title,
                    slug: args.slug,
                    description: args.description,
                })
                .await
                .map_err(group_error)?;
            println!("{}\t{}", group.slug, group.title);
        }
        config::GroupsCommand::Delete { slug } => {
            let group = groups.delete(&slug).await.map_err(group_error)?;
            info!(target: "yatube::groups", slug = %group.slug, "Group deleted");
        }
        config::GroupsCommand::List => {
            for group in groups.list().await.map_err(group_error)? {
                println!("{}\t{}", group.slug, group.title);
            }
        }
    }

    Ok(())
}

async fn run_users(
    settings: config::Settings,
    command: config::UsersCommand,
) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let auth = build_auth_service(&repositories, &settings);

    match command {
        config::UsersCommand::Create { username, password } => {
            let user = auth
                .signup(&username, &password, &password)
                .await
                .map_err(auth_error)?;
            println!("{}\t{}", user.id, user.username);
        }
        config::UsersCommand::Delete { username } => {
            let user = auth.delete_user(&username).await.map_err(auth_error)?;
            info!(target: "yatube::users", username = %user.username, "User deleted");
        }
    }

    Ok(())
}

fn group_error(err: GroupError) -> AppError {
    match err {
        GroupError::Invalid(errors) => AppError::validation(errors.to_string()),
        GroupError::Domain(err) => AppError::from(err),
        GroupError::Repo(err) => AppError::from(err),
    }
}

fn auth_error(err: AuthError) -> AppError {
    match err {
        AuthError::Invalid(errors) => AppError::validation(errors.to_string()),
        AuthError::UserNotFound => AppError::NotFound,
        AuthError::Repo(err) => AppError::from(err),
        other => AppError::unexpected(other.to_string()),
    }
}

async fn init_repositories(
    settings: &config::Settings,
) -> Result<Arc<PostgresRepositories>, AppError> {
    let database_url = settings
        .database
        .url
        .as_ref()
        .ok_or_else(|| InfraError::configuration("database url is not configured"))
        .map_err(AppError::from)?;

    let pool = PostgresRepositories::connect(database_url, settings.database.max_connections.get())
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    PostgresRepositories::run_migrations(&pool)
        .await
        .map_err(|err| AppError::from(InfraError::database(err.to_string())))?;

    Ok(Arc::new(PostgresRepositories::new(pool)))
}

fn build_auth_service(
    repositories: &Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> AuthService {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let sessions_repo: Arc<dyn SessionsRepo> = repositories.clone();
    AuthService::new(users_repo, sessions_repo, settings.auth.session_ttl)
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    settings: &config::Settings,
) -> Result<HttpState, AppError> {
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let health: Arc<dyn HealthProbe> = repositories.clone();

    let upload_storage = Arc::new(
        UploadStorage::new(settings.uploads.directory.clone())
            .map_err(|err| AppError::from(InfraError::Io(err)))?,
    );

    let upload_limit_bytes = usize::try_from(settings.uploads.max_request_bytes.get())
        .map_err(|_| AppError::validation("uploads.max_request_bytes exceeds usize"))?;

    let posts = Arc::new(PostService::new(
        posts_repo.clone(),
        posts_write_repo,
        groups_repo,
        users_repo.clone(),
        comments_repo.clone(),
        upload_storage.clone(),
    ));
    let comments = Arc::new(CommentService::new(comments_repo, posts_repo));
    let follows = Arc::new(FollowService::new(follows_repo, users_repo));
    let auth = Arc::new(build_auth_service(&repositories, settings));

    Ok(HttpState {
        posts,
        comments,
        follows,
        auth,
        upload_storage,
        health,
        secure_cookies: settings.auth.secure_cookies,
        upload_limit_bytes,
    })
}

async fn serve_http(settings: &config::Settings, state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target: "yatube::serve",
        addr = %settings.server.addr,
        "Listening"
    );

    let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();
    let mut server = tokio::spawn(
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async move {
                let _ = shutdown_rx.await;
            })
            .into_future(),
    );

    let finished = tokio::select! {
        finished = &mut server => finished,
        _ = tokio::signal::ctrl_c() => {
            let grace = settings.server.graceful_shutdown;
            info!(
                target: "yatube::serve",
                grace_seconds = grace.as_secs(),
                "Shutdown requested"
            );
            let _ = shutdown_tx.send(());
            match tokio::time::timeout(grace, &mut server).await {
                Ok(finished) => finished,
                Err(_) => {
                    warn!(
                        target: "yatube::serve",
                        "Graceful shutdown timed out; dropping open connections"
                    );
                    server.abort();
                    return Ok(());
                }
            }
        }
    };

    finished
        .map_err(|err| AppError::unexpected(format!("server task failed: {err}")))?
        .map_err(|err| AppError::unexpected(format!("server error: {err}")))?;

    Ok(())
}
