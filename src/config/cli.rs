use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, builder::BoolishValueParser};

/// Command-line arguments for the Yatube binary.
#[derive(Debug, Parser)]
#[command(name = "yatube", version, about = "Yatube publishing site")]
pub struct CliArgs {
    /// Optional path to a configuration file.
    #[arg(long = "config-file", env = "YATUBE_CONFIG_FILE", value_name = "PATH")]
    pub config_file: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Option<Command>,
}

#[derive(Debug, Subcommand, Clone)]
pub enum Command {
    /// Run the Yatube HTTP service.
    Serve(Box<ServeArgs>),
    /// Manage post groups.
    #[command(name = "groups")]
    Groups(GroupsArgs),
    /// Manage user accounts.
    #[command(name = "users")]
    Users(UsersArgs),
    /// Apply pending database migrations and exit.
    #[command(name = "migrate")]
    Migrate(DatabaseOverride),
}

#[derive(Debug, Args, Default, Clone)]
pub struct DatabaseOverride {
    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeArgs {
    #[command(flatten)]
    pub overrides: ServeOverrides,
}

#[derive(Debug, Args, Default, Clone)]
pub struct ServeOverrides {
    /// Override the listener host.
    #[arg(long = "server-host", value_name = "HOST")]
    pub server_host: Option<String>,

    /// Override the listener port.
    #[arg(long = "server-port", value_name = "PORT")]
    pub server_port: Option<u16>,

    /// Override the graceful shutdown timeout.
    #[arg(long = "server-graceful-shutdown-seconds", value_name = "SECONDS")]
    pub server_graceful_shutdown_seconds: Option<u64>,

    /// Override the base log level (trace|debug|info|warn|error).
    #[arg(long = "log-level", value_name = "LEVEL")]
    pub log_level: Option<String>,

    /// Toggle JSON logging.
    #[arg(
        long = "log-json",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub log_json: Option<bool>,

    /// Override the database connection URL.
    #[arg(long = "database-url", value_name = "URL")]
    pub database_url: Option<String>,

    /// Override the database pool size.
    #[arg(long = "database-max-connections", value_name = "COUNT")]
    pub database_max_connections: Option<u32>,

    /// Override the uploads directory.
    #[arg(long = "uploads-directory", value_name = "PATH")]
    pub uploads_directory: Option<PathBuf>,

    /// Override the maximum request size for uploads in bytes.
    #[arg(long = "uploads-max-request-bytes", value_name = "BYTES")]
    pub uploads_max_request_bytes: Option<u64>,

    /// Override how long a login session stays valid.
    #[arg(long = "auth-session-ttl-hours", value_name = "HOURS")]
    pub auth_session_ttl_hours: Option<u64>,

    /// Mark the session cookie `Secure`.
    #[arg(
        long = "auth-secure-cookies",
        value_name = "BOOL",
        value_parser = BoolishValueParser::new()
    )]
    pub auth_secure_cookies: Option<bool>,
}

#[derive(Debug, Args, Clone)]
pub struct GroupsArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: GroupsCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum GroupsCommand {
    /// Create a group; the slug is derived from the title when omitted.
    #[command(name = "create")]
    Create(GroupCreateArgs),
    /// Delete a group. Its posts stay and lose their group.
    #[command(name = "delete")]
    Delete {
        /// Slug of the group to delete.
        #[arg(value_name = "SLUG")]
        slug: String,
    },
    /// List every group.
    #[command(name = "list")]
    List,
}

#[derive(Debug, Args, Clone)]
pub struct GroupCreateArgs {
    /// Display title.
    #[arg(long, value_name = "TITLE")]
    pub title: String,

    /// URL slug; generated from the title when omitted.
    #[arg(long, value_name = "SLUG")]
    pub slug: Option<String>,

    /// Free-text description.
    #[arg(long, value_name = "TEXT")]
    pub description: String,
}

#[derive(Debug, Args, Clone)]
pub struct UsersArgs {
    #[command(flatten)]
    pub database: DatabaseOverride,

    #[command(subcommand)]
    pub command: UsersCommand,
}

#[derive(Debug, Subcommand, Clone)]
pub enum UsersCommand {
    /// Register an account.
    #[command(name = "create")]
    Create {
        #[arg(value_name = "USERNAME")]
        username: String,

        /// Account password.
        #[arg(long, env = "YATUBE_USER_PASSWORD", value_name = "PASSWORD")]
        password: String,
    },
    /// Delete an account together with its posts, comments, follows and sessions.
    #[command(name = "delete")]
    Delete {
        #[arg(value_name = "USERNAME")]
        username: String,
    },
}
