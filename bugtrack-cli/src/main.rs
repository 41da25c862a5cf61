use anyhow::{anyhow, Context, Result};
use argon2::password_hash::rand_core::OsRng;
use argon2::password_hash::{PasswordHash, PasswordHasher, PasswordVerifier, SaltString};
use argon2::Argon2;
use bugtrack_core::{
    BugId, BugPatch, BugStatus, BugTracker, Caller, CommentId, Config, CoreError, NewBug,
    NewUser, Priority, Repository, Role, SqliteRepository, UserId, UserPatch,
};
use clap::{Args, Parser, Subcommand};
use serde::Serialize;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{debug, warn};
use tracing_subscriber::EnvFilter;

const MIN_PASSWORD_LEN: usize = 6;

/// Bugtrack: role-based bug tracker
#[derive(Parser, Debug)]
#[command(name = "bugtrack")]
#[command(about = "Role-based bug tracker", long_about = None)]
struct Cli {
    /// SQLite database path (overrides BUGTRACK_STATE_DIR/BUGTRACK_DB_FILE)
    #[arg(long, global = true)]
    db: Option<PathBuf>,

    /// Act as the user with this id
    #[arg(long = "as", global = true, env = "BUGTRACK_ACTOR")]
    actor: Option<u64>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Manage users
    #[command(subcommand)]
    User(UserCommand),
    /// Report, update and browse bugs
    #[command(subcommand)]
    Bug(BugCommand),
    /// Comment on bugs
    #[command(subcommand)]
    Comment(CommentCommand),
}

#[derive(Subcommand, Debug)]
enum UserCommand {
    /// Register a new account
    Register(RegisterArgs),
    /// Check an email and password and show who they belong to
    Login(LoginArgs),
    /// Show the acting user's profile
    Whoami,
    /// Show one user's profile
    Show { id: u64 },
    /// List every other user (admin only)
    List,
    /// Edit a profile (defaults to the acting user)
    Edit(EditUserArgs),
    /// Delete a user and unassign their bugs (admin only)
    Delete { id: u64 },
}

#[derive(Args, Debug)]
struct RegisterArgs {
    #[arg(long)]
    name: String,

    #[arg(long)]
    email: String,

    /// One of admin, developer, tester
    #[arg(long)]
    role: String,

    /// Plain-text password; only its argon2 hash is stored
    #[arg(long, env = "BUGTRACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct LoginArgs {
    #[arg(long)]
    email: String,

    #[arg(long, env = "BUGTRACK_PASSWORD", hide_env_values = true)]
    password: String,
}

#[derive(Args, Debug)]
struct EditUserArgs {
    /// User to edit
    #[arg(long)]
    id: Option<u64>,

    #[arg(long)]
    name: Option<String>,

    #[arg(long)]
    email: Option<String>,
}

#[derive(Subcommand, Debug)]
enum BugCommand {
    /// Report a bug
    Create(CreateBugArgs),
    /// List visible bugs
    List {
        /// Only bugs in this status
        #[arg(long)]
        status: Option<String>,
    },
    /// Show a bug with its comments
    Show { id: u64 },
    /// Change fields, status or assignee of a bug
    Update(UpdateBugArgs),
    /// Delete a bug and its comments
    Delete { id: u64 },
    /// Per-status counts of visible bugs
    Summary,
}

#[derive(Args, Debug)]
struct CreateBugArgs {
    #[arg(long)]
    title: String,

    #[arg(long)]
    description: String,

    /// One of Low, Medium, High
    #[arg(long, default_value = "Medium")]
    priority: String,
}

#[derive(Args, Debug)]
struct UpdateBugArgs {
    id: u64,

    #[arg(long)]
    title: Option<String>,

    #[arg(long)]
    description: Option<String>,

    #[arg(long)]
    priority: Option<String>,

    #[arg(long)]
    status: Option<String>,

    /// Assign to this developer
    #[arg(long, conflicts_with = "unassign")]
    assign: Option<u64>,

    /// Remove the assignee
    #[arg(long)]
    unassign: bool,
}

#[derive(Subcommand, Debug)]
enum CommentCommand {
    /// Comment on a bug
    Add { bug_id: u64, text: String },
    /// Delete a comment
    Delete { id: u64 },
}

/// Exit code for a failed command, by core error kind.
fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<CoreError>().map(CoreError::kind) {
        Some("unauthenticated") => 3,
        Some("forbidden") => 4,
        Some("not_found") => 5,
        Some("invalid_transition") => 6,
        Some("validation") => 7,
        Some("storage") => 8,
        _ => 1,
    }
}

fn init_tracing(default_level: &str) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn hash_password(password: &str) -> Result<String> {
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(CoreError::validation(
            "password",
            format!("is too short (minimum is {} characters)", MIN_PASSWORD_LEN),
        )
        .into());
    }

    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| anyhow!("Failed to hash password: {}", e))
}

/// Whether `password` matches a stored argon2 hash. Unreadable hashes never match.
fn verify_password(password: &str, stored_hash: &str) -> bool {
    match PasswordHash::new(stored_hash) {
        Ok(hash) => Argon2::default()
            .verify_password(password.as_bytes(), &hash)
            .is_ok(),
        Err(e) => {
            warn!("Stored password hash is unreadable: {}", e);
            false
        }
    }
}

fn parse<T>(value: &str) -> Result<T, CoreError>
where
    T: std::str::FromStr<Err = bugtrack_core::ParseEnumError>,
{
    value.parse::<T>().map_err(CoreError::from)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let json = serde_json::to_string_pretty(value).context("Failed to serialize output")?;
    println!("{}", json);
    Ok(())
}

/// Turn `--as` into a caller. An id with no user behind it is anonymous.
async fn resolve_caller(repo: &dyn Repository, actor: Option<u64>) -> Result<Caller> {
    let Some(id) = actor else {
        return Ok(Caller::Anonymous);
    };

    let user = repo
        .get_user(UserId(id))
        .await
        .context("Failed to look up acting user")?;
    match user {
        Some(user) => {
            debug!("Acting as user {} ({})", user.id, user.role);
            Ok(Caller::User(user.actor()))
        }
        None => {
            warn!("No user with id {}; continuing anonymously", id);
            Ok(Caller::Anonymous)
        }
    }
}

async fn run_user(tracker: &BugTracker, caller: &Caller, command: UserCommand) -> Result<()> {
    match command {
        UserCommand::Register(args) => {
            let user = NewUser {
                name: args.name,
                email: args.email,
                role: parse::<Role>(&args.role)?,
                password_hash: hash_password(&args.password)?,
            };
            print_json(&tracker.register_user(user).await?)
        }
        UserCommand::Login(args) => {
            let actor = tracker
                .authenticate(&args.email, |stored| verify_password(&args.password, stored))
                .await?;
            print_json(&tracker.current_user(&Caller::User(actor)).await?)
        }
        UserCommand::Whoami => print_json(&tracker.current_user(caller).await?),
        UserCommand::Show { id } => print_json(&tracker.get_user(caller, UserId(id)).await?),
        UserCommand::List => print_json(&tracker.list_users(caller).await?),
        UserCommand::Edit(args) => {
            let id = match (args.id, caller.actor()) {
                (Some(id), _) => UserId(id),
                (None, Some(actor)) => actor.id,
                (None, None) => return Err(CoreError::Unauthenticated.into()),
            };
            let patch = UserPatch {
                name: args.name,
                email: args.email,
            };
            print_json(&tracker.update_user(caller, id, patch).await?)
        }
        UserCommand::Delete { id } => print_json(&tracker.delete_user(caller, UserId(id)).await?),
    }
}

async fn run_bug(tracker: &BugTracker, caller: &Caller, command: BugCommand) -> Result<()> {
    match command {
        BugCommand::Create(args) => {
            let bug = NewBug::new(args.title, args.description, parse::<Priority>(&args.priority)?);
            print_json(&tracker.create_bug(caller, bug).await?)
        }
        BugCommand::List { status } => {
            let status = status.as_deref().map(parse::<BugStatus>).transpose()?;
            print_json(&tracker.list_bugs(caller, status).await?)
        }
        BugCommand::Show { id } => print_json(&tracker.get_bug(caller, BugId(id)).await?),
        BugCommand::Update(args) => {
            let mut patch = BugPatch {
                title: args.title,
                description: args.description,
                priority: args.priority.as_deref().map(parse::<Priority>).transpose()?,
                status: args.status.as_deref().map(parse::<BugStatus>).transpose()?,
                assigned_to: None,
            };
            if let Some(assignee) = args.assign {
                patch = patch.assign(UserId(assignee));
            } else if args.unassign {
                patch = patch.unassign();
            }
            print_json(&tracker.update_bug(caller, BugId(args.id), patch).await?)
        }
        BugCommand::Delete { id } => print_json(&tracker.delete_bug(caller, BugId(id)).await?),
        BugCommand::Summary => print_json(&tracker.bug_summary(caller).await?),
    }
}

async fn run_comment(tracker: &BugTracker, caller: &Caller, command: CommentCommand) -> Result<()> {
    match command {
        CommentCommand::Add { bug_id, text } => {
            print_json(&tracker.create_comment(caller, BugId(bug_id), text).await?)
        }
        CommentCommand::Delete { id } => {
            print_json(&tracker.delete_comment(caller, CommentId(id)).await?)
        }
    }
}

async fn run(cli: Cli, config: Config) -> Result<()> {
    let db_path = cli.db.unwrap_or_else(|| config.database_path());
    let repo = SqliteRepository::new(&db_path)
        .with_context(|| format!("Failed to open database at {}", db_path.display()))?;
    let tracker = BugTracker::new(repo);
    let caller = resolve_caller(tracker.repository().as_ref(), cli.actor).await?;

    match cli.command {
        Commands::User(command) => run_user(&tracker, &caller, command).await,
        Commands::Bug(command) => run_bug(&tracker, &caller, command).await,
        Commands::Comment(command) => run_comment(&tracker, &caller, command).await,
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match Config::from_env() {
        Ok(config) => config,
        Err(err) => {
            eprintln!("error: {:#}", err);
            return ExitCode::FAILURE;
        }
    };
    init_tracing(&config.log_level);

    match run(cli, config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {:#}", err);
            ExitCode::from(exit_code(&err))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bugtrack_core::InMemoryRepository;

    #[test]
    fn test_cli_parses_nested_commands() {
        let cli = Cli::try_parse_from([
            "bugtrack", "--as", "3", "bug", "update", "7", "--status", "fixed",
        ])
        .unwrap();
        assert_eq!(cli.actor, Some(3));
        match cli.command {
            Commands::Bug(BugCommand::Update(args)) => {
                assert_eq!(args.id, 7);
                assert_eq!(args.status.as_deref(), Some("fixed"));
                assert!(!args.unassign);
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_assign_conflicts_with_unassign() {
        let result = Cli::try_parse_from([
            "bugtrack", "bug", "update", "1", "--assign", "2", "--unassign",
        ]);
        assert!(result.is_err());
    }

    #[test]
    fn test_password_hash_verifies() {
        let hash = hash_password("correct horse").unwrap();
        let parsed = PasswordHash::new(&hash).unwrap();
        assert!(Argon2::default()
            .verify_password(b"correct horse", &parsed)
            .is_ok());
        assert!(Argon2::default()
            .verify_password(b"battery staple", &parsed)
            .is_err());
    }

    #[test]
    fn test_garbage_hash_never_verifies() {
        assert!(!verify_password("anything", "not-a-phc-string"));
    }

    #[tokio::test]
    async fn test_login_checks_argon2_hash() {
        let tracker = BugTracker::new(InMemoryRepository::new());
        let user = tracker
            .register_user(NewUser {
                name: "Margaret".to_string(),
                email: "margaret@example.com".to_string(),
                role: Role::Developer,
                password_hash: hash_password("apollo11").unwrap(),
            })
            .await
            .unwrap();

        let actor = tracker
            .authenticate("margaret@example.com", |stored| verify_password("apollo11", stored))
            .await
            .unwrap();
        assert_eq!(actor.id, user.id);

        let err = tracker
            .authenticate("margaret@example.com", |stored| verify_password("apollo13", stored))
            .await
            .unwrap_err();
        assert_eq!(exit_code(&err.into()), 3);
    }

    #[test]
    fn test_login_args_parse() {
        let cli = Cli::try_parse_from([
            "bugtrack", "user", "login", "--email", "a@example.com", "--password", "secret1",
        ])
        .unwrap();
        assert!(matches!(cli.command, Commands::User(UserCommand::Login(_))));
    }

    #[test]
    fn test_short_password_is_validation_error() {
        let err = hash_password("abc").unwrap_err();
        assert_eq!(exit_code(&err), 7);
    }

    #[test]
    fn test_exit_codes_by_kind() {
        assert_eq!(exit_code(&CoreError::Forbidden.into()), 4);
        assert_eq!(exit_code(&CoreError::not_found("bug", 1u64).into()), 5);
        assert_eq!(exit_code(&anyhow!("something else")), 1);
    }

    #[test]
    fn test_unknown_enum_value_is_validation_error() {
        let err = parse::<Priority>("urgent").unwrap_err();
        assert_eq!(err.kind(), "validation");
    }

    #[tokio::test]
    async fn test_unknown_actor_is_anonymous() {
        let repo = InMemoryRepository::new();
        assert_eq!(
            resolve_caller(&repo, Some(99)).await.unwrap(),
            Caller::Anonymous
        );
        assert_eq!(resolve_caller(&repo, None).await.unwrap(), Caller::Anonymous);
    }
}
