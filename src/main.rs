use std::{process, sync::Arc};

use serde::Serialize;
use tokio::signal;
use tracing::{Dispatch, Level, dispatcher, error, info, warn};
use tracing_subscriber::fmt as tracing_fmt;
use yatube::{
    application::{
        admin::{AdminRepos, AdminService, CreateGroupCommand},
        comments::CommentService,
        error::AppError,
        feed::FeedService,
        follows::FollowService,
        pagination::Paginator,
        posts::PostService,
        repos::{
            CommentsRepo, CommentsWriteRepo, FollowsRepo, FollowsWriteRepo, GroupsRepo,
            HealthRepo, MediaStore, PostsRepo, PostsWriteRepo, UsersRepo,
        },
    },
    cache::{CacheConfig, CacheState},
    config,
    infra::{
        db::PostgresRepositories,
        error::InfraError,
        http::{self, HttpState, ViewerResolver},
        telemetry,
        uploads::UploadStorage,
    },
};

#[tokio::main]
async fn main() {
    if let Err(error) = run().await {
        report_application_error(&error);
        process::exit(1);
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
        config::Command::Users(args) => run_users(settings, args).await,
        config::Command::Groups(args) => run_groups(settings, args).await,
        config::Command::Posts(args) => run_posts(settings, args).await,
    }
}

async fn run_serve(settings: config::Settings) -> Result<(), AppError> {
    let repositories = init_repositories(&settings).await?;
    let upload_storage = init_upload_storage(&settings)?;
    let http_state = build_http_state(repositories, upload_storage, &settings);
    serve_http(&settings, http_state).await
}

async fn run_users(settings: config::Settings, args: config::UsersArgs) -> Result<(), AppError> {
    let admin = build_admin_service(&settings).await?;

    match args.command {
        config::UsersCommand::Create { username } => {
            let user = admin.create_user(&username).await?;
            print_json(&user)
        }
        config::UsersCommand::Delete { username } => {
            let user = admin.delete_user(&username).await?;
            print_json(&user)
        }
        config::UsersCommand::List => print_json(&admin.list_users().await?),
    }
}

async fn run_groups(settings: config::Settings, args: config::GroupsArgs) -> Result<(), AppError> {
    let admin = build_admin_service(&settings).await?;

    match args.command {
        config::GroupsCommand::Create {
            title,
            description,
            slug,
        } => {
            let group = admin
                .create_group(CreateGroupCommand {
                    title,
                    description,
                    slug,
                })
                .await?;
            print_json(&group)
        }
        config::GroupsCommand::Delete { slug } => {
            let group = admin.delete_group(&slug).await?;
            print_json(&group)
        }
        config::GroupsCommand::List => print_json(&admin.list_groups().await?),
    }
}

async fn run_posts(settings: config::Settings, args: config::PostsArgs) -> Result<(), AppError> {
    let admin = build_admin_service(&settings).await?;

    match args.command {
        config::PostsCommand::Delete { id } => {
            admin.delete_post(id).await?;
            info!(target = "yatube::cli", post_id = %id, "post removed");
            Ok(())
        }
    }
}

fn print_json<T: Serialize>(value: &T) -> Result<(), AppError> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| AppError::unexpected(format!("failed to encode output: {err}")))?;
    println!("{rendered}");
    Ok(())
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

fn init_upload_storage(settings: &config::Settings) -> Result<Arc<UploadStorage>, AppError> {
    let storage = UploadStorage::new(settings.uploads.directory.clone())
        .map_err(|err| AppError::from(InfraError::Io(err)))?;
    Ok(Arc::new(storage))
}

async fn build_admin_service(settings: &config::Settings) -> Result<AdminService, AppError> {
    let repositories = init_repositories(settings).await?;
    let media: Arc<dyn MediaStore> = init_upload_storage(settings)?;

    Ok(AdminService::new(AdminRepos {
        users: repositories.clone(),
        users_write: repositories.clone(),
        groups: repositories.clone(),
        groups_write: repositories.clone(),
        posts: repositories.clone(),
        posts_write: repositories,
        media,
    }))
}

fn build_http_state(
    repositories: Arc<PostgresRepositories>,
    upload_storage: Arc<UploadStorage>,
    settings: &config::Settings,
) -> HttpState {
    let users_repo: Arc<dyn UsersRepo> = repositories.clone();
    let groups_repo: Arc<dyn GroupsRepo> = repositories.clone();
    let posts_repo: Arc<dyn PostsRepo> = repositories.clone();
    let posts_write_repo: Arc<dyn PostsWriteRepo> = repositories.clone();
    let comments_repo: Arc<dyn CommentsRepo> = repositories.clone();
    let comments_write_repo: Arc<dyn CommentsWriteRepo> = repositories.clone();
    let follows_repo: Arc<dyn FollowsRepo> = repositories.clone();
    let follows_write_repo: Arc<dyn FollowsWriteRepo> = repositories.clone();
    let health_repo: Arc<dyn HealthRepo> = repositories;
    let media_store: Arc<dyn MediaStore> = upload_storage.clone();

    let feed = Arc::new(FeedService::new(
        posts_repo.clone(),
        groups_repo.clone(),
        users_repo.clone(),
        follows_repo,
        Paginator::new(settings.feed.page_size),
    ));
    let posts = Arc::new(PostService::new(
        posts_repo.clone(),
        posts_write_repo,
        groups_repo,
        comments_repo,
        media_store,
    ));
    let comments = Arc::new(CommentService::new(posts_repo, comments_write_repo));
    let follows = Arc::new(FollowService::new(users_repo.clone(), follows_write_repo));

    let cache_config = CacheConfig::from(&settings.cache);
    let cache = cache_config.enabled.then(|| CacheState::new(cache_config));

    HttpState {
        feed,
        posts,
        comments,
        follows,
        health: health_repo,
        media: upload_storage,
        cache,
        auth: settings.auth.clone(),
        viewer_resolver: ViewerResolver::new(users_repo, settings.auth.user_header.clone()),
        upload_limit_bytes: usize::try_from(settings.uploads.max_request_bytes.get())
            .unwrap_or(usize::MAX),
    }
}

async fn serve_http(settings: &config::Settings, http_state: HttpState) -> Result<(), AppError> {
    let router = http::build_router(http_state);

    let listener = tokio::net::TcpListener::bind(settings.server.addr)
        .await
        .map_err(|err| AppError::from(InfraError::from(err)))?;

    info!(
        target = "yatube::serve",
        addr = %settings.server.addr,
        "listening"
    );

    let (signal_tx, mut signal_rx) = tokio::sync::watch::channel(false);
    let server = axum::serve(listener, router.into_make_service()).with_graceful_shutdown(
        async move {
            shutdown_signal().await;
            let _ = signal_tx.send(true);
        },
    );
    let server = async move { server.await };

    let grace = settings.server.graceful_shutdown;
    let drain_deadline = async move {
        if signal_rx.wait_for(|fired| *fired).await.is_err() {
            std::future::pending::<()>().await;
        }
        tokio::time::sleep(grace).await;
    };

    tokio::select! {
        result = server => {
            result.map_err(|err| AppError::unexpected(format!("server error: {err}")))?;
        }
        () = drain_deadline => {
            warn!(
                target = "yatube::serve",
                grace_seconds = grace.as_secs(),
                "in-flight requests did not finish before the shutdown deadline"
            );
        }
    }

    info!(target = "yatube::serve", "server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!(error = %err, "failed to listen for ctrl-c");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(err) => {
                error!(error = %err, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => info!(target = "yatube::serve", signal = "SIGINT", "shutting down"),
        () = terminate => info!(target = "yatube::serve", signal = "SIGTERM", "shutting down"),
    }
}
