use anyhow::Context;
use backoffice_api::api::{self, AppState};
use backoffice_api::applications::NewApplication;
use backoffice_api::client::{ApiClient, AttachChildRequest};
use backoffice_api::config::Config;
use backoffice_api::store::DataStore;
use backoffice_api::tables::{ApplicationKind, Capability, TodoPriority, TodoStatus};
use backoffice_api::todos::NewTodo;
use backoffice_api::users::{self, NewUser};
use chrono::NaiveDate;
use clap::{Parser, Subcommand};
use serde::{de::DeserializeOwned, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the API server
    Serve {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,
        /// The address to bind to
        #[arg(short, long)]
        addr: Option<SocketAddr>,
        /// Directory holding the JSON records
        #[arg(long)]
        data_dir: Option<PathBuf>,
    },
    /// Create the admin account directly in a data directory
    Init {
        #[arg(short, long)]
        config: Option<PathBuf>,
        #[arg(long)]
        data_dir: Option<PathBuf>,
        /// Display name of the admin
        #[arg(long, default_value = "Administrator")]
        name: String,
        #[arg(long, env = "BACKOFFICE_ADMIN_PASSWORD")]
        password: String,
    },
    /// Client commands
    Client {
        /// The base URL of the API
        #[arg(long, default_value = backoffice_api::BASE_URL)]
        url: String,
        /// Session token from `client login`
        #[arg(long, env = "BACKOFFICE_TOKEN")]
        token: Option<String>,
        #[command(subcommand)]
        command: ClientCommands,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Show whether the server has been initialized
    Status,
    /// Log in and print the session token
    Login {
        #[arg(long)]
        username: String,
        #[arg(long, env = "BACKOFFICE_PASSWORD")]
        password: String,
    },
    /// End the current session
    Logout,
    /// Show the logged-in user
    Me,
    /// Show the dashboard summary
    Dashboard,
    /// User and hierarchy commands
    Users {
        #[command(subcommand)]
        command: UsersCommands,
    },
    /// Todo commands
    Todos {
        #[command(subcommand)]
        command: TodosCommands,
    },
    /// Chat commands
    Chats {
        #[command(subcommand)]
        command: ChatsCommands,
    },
    /// Notification commands
    Notifications {
        #[command(subcommand)]
        command: NotificationsCommands,
    },
    /// Application commands
    Applications {
        #[command(subcommand)]
        command: ApplicationsCommands,
    },
}

#[derive(Subcommand)]
enum UsersCommands {
    /// List visible users
    List,
    /// Show one user
    Get { id: String },
    /// Create a user under the logged-in account
    Create {
        #[arg(long)]
        name: String,
        #[arg(long)]
        code: String,
        #[arg(long)]
        username: String,
        #[arg(long)]
        password: String,
        #[arg(long, default_value = "")]
        position: String,
        /// Capability keys, e.g. `todo_manage`
        #[arg(long = "permission")]
        permissions: Vec<Capability>,
    },
    /// Create a department node
    Department { name: String },
    /// Replace a user's capabilities
    Permissions {
        id: String,
        #[arg(long = "permission")]
        permissions: Vec<Capability>,
    },
    /// Delete a user
    Delete { id: String },
    /// Display the organization tree
    Tree {
        /// Print YAML instead of JSON
        #[arg(long)]
        yaml: bool,
    },
    /// Move a user under a new parent
    Attach {
        child_id: String,
        #[arg(long)]
        parent_id: Option<String>,
    },
    /// Make a user a root
    Detach { id: String },
    /// List available capabilities
    Capabilities,
}

#[derive(Subcommand)]
enum TodosCommands {
    List {
        #[arg(long)]
        include_subordinates: bool,
        #[arg(long)]
        pending: bool,
    },
    Create {
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        assignee: Option<String>,
        #[arg(long, default_value = "medium", value_parser = parse_snake::<TodoPriority>)]
        priority: TodoPriority,
        /// YYYY-MM-DD
        #[arg(long)]
        due: Option<NaiveDate>,
    },
    Status {
        id: String,
        /// pending, in_progress or completed
        status: TodoStatus,
    },
    Reassign { id: String, assignee: String },
    Delete { id: String },
}

#[derive(Subcommand)]
enum ChatsCommands {
    List,
    /// Open (or reuse) a private chat with a user
    Private { user_id: String },
    Group {
        name: String,
        #[arg(long = "participant")]
        participants: Vec<String>,
    },
    Messages {
        chat_id: String,
        #[arg(long, default_value_t = backoffice_api::chats::DEFAULT_PAGE_SIZE)]
        limit: usize,
        #[arg(long, default_value_t = 0)]
        offset: usize,
    },
    Send { chat_id: String, content: String },
}

#[derive(Subcommand)]
enum NotificationsCommands {
    List {
        #[arg(long)]
        unread: bool,
    },
    Count,
    Read { id: String },
    ReadAll,
    Delete { id: String },
}

#[derive(Subcommand)]
enum ApplicationsCommands {
    List,
    Pending,
    Create {
        #[arg(long, default_value = "other", value_parser = parse_snake::<ApplicationKind>)]
        kind: ApplicationKind,
        #[arg(long)]
        title: String,
        #[arg(long, default_value = "")]
        content: String,
    },
    Approve { id: String },
    Reject {
        id: String,
        #[arg(long)]
        reason: Option<String>,
    },
}

/// Parses a snake_case enum name the way the JSON API spells it.
fn parse_snake<T: DeserializeOwned>(s: &str) -> Result<T, String> {
    serde_json::from_value(serde_json::Value::String(s.to_string()))
        .map_err(|_| format!("unknown value: {s}"))
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn load_config(file: Option<PathBuf>, data_dir: Option<PathBuf>) -> anyhow::Result<Config> {
    let mut config = Config::load(file.as_deref())?;
    if let Some(dir) = data_dir {
        config.data_dir = dir;
    }
    Ok(config)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Serve {
            config,
            addr,
            data_dir,
        } => {
            let mut config = load_config(config, data_dir)?;
            if let Some(addr) = addr {
                config.addr = addr;
            }
            let store = DataStore::open(&config.data_dir)
                .await
                .with_context(|| format!("opening data directory {}", config.data_dir.display()))?;
            info!(addr = %config.addr, data_dir = %config.data_dir.display(), "starting server");

            let listener = tokio::net::TcpListener::bind(config.addr).await?;
            let app = api::create_router(AppState::new(store, config));
            axum::serve(listener, app).await?;
        }
        Commands::Init {
            config,
            data_dir,
            name,
            password,
        } => {
            let config = load_config(config, data_dir)?;
            let store = DataStore::open(&config.data_dir).await?;
            let admin = users::initialize(&store, &name, &password, config.bcrypt_cost).await?;
            println!("Initialized; log in as '{}'", admin.username);
        }
        Commands::Client {
            url,
            token,
            command,
        } => {
            let mut client = ApiClient::new(url);
            if let Some(token) = token {
                client = client.with_token(token);
            }
            run_client(client, command).await?;
        }
    }
    Ok(())
}

async fn run_client(mut client: ApiClient, command: ClientCommands) -> anyhow::Result<()> {
    match command {
        ClientCommands::Status => print_json(&client.status().await?)?,
        ClientCommands::Login { username, password } => {
            let login = client.login(&username, &password).await?;
            eprintln!("Session expires at {}", login.expires_at);
            println!("{}", login.token);
        }
        ClientCommands::Logout => client.logout().await?,
        ClientCommands::Me => print_json(&client.me().await?)?,
        ClientCommands::Dashboard => print_json(&client.dashboard().await?)?,
        ClientCommands::Users { command } => match command {
            UsersCommands::List => print_json(&client.fetch_users().await?)?,
            UsersCommands::Get { id } => print_json(&client.fetch_user(&id).await?)?,
            UsersCommands::Create {
                name,
                code,
                username,
                password,
                position,
                permissions,
            } => {
                let user = NewUser {
                    name,
                    code,
                    username,
                    password,
                    position,
                    permissions,
                };
                print_json(&client.create_user(&user).await?)?
            }
            UsersCommands::Department { name } => {
                print_json(&client.create_department(&name).await?)?
            }
            UsersCommands::Permissions { id, permissions } => {
                print_json(&client.update_permissions(&id, permissions).await?)?
            }
            UsersCommands::Delete { id } => client.delete_user(&id).await?,
            UsersCommands::Tree { yaml } => {
                let tree = client.fetch_user_tree().await?;
                if yaml {
                    print!("{}", serde_yaml::to_string(&tree)?);
                } else {
                    print_json(&tree)?;
                }
            }
            UsersCommands::Attach {
                child_id,
                parent_id,
            } => {
                client
                    .attach_user(&AttachChildRequest {
                        child_id,
                        parent_id,
                    })
                    .await?
            }
            UsersCommands::Detach { id } => client.detach_user(&id).await?,
            UsersCommands::Capabilities => print_json(&client.permissions().await?)?,
        },
        ClientCommands::Todos { command } => match command {
            TodosCommands::List {
                include_subordinates,
                pending,
            } => print_json(&client.fetch_todos(include_subordinates, pending).await?)?,
            TodosCommands::Create {
                title,
                description,
                assignee,
                priority,
                due,
            } => {
                let todo = NewTodo {
                    title,
                    description,
                    assignee_id: assignee,
                    priority,
                    due_date: due,
                };
                print_json(&client.create_todo(&todo).await?)?
            }
            TodosCommands::Status { id, status } => {
                print_json(&client.update_todo_status(&id, status).await?)?
            }
            TodosCommands::Reassign { id, assignee } => {
                print_json(&client.reassign_todo(&id, &assignee).await?)?
            }
            TodosCommands::Delete { id } => client.delete_todo(&id).await?,
        },
        ClientCommands::Chats { command } => match command {
            ChatsCommands::List => print_json(&client.fetch_chats().await?)?,
            ChatsCommands::Private { user_id } => {
                print_json(&client.open_private_chat(&user_id).await?)?
            }
            ChatsCommands::Group { name, participants } => {
                print_json(&client.create_group_chat(&name, participants).await?)?
            }
            ChatsCommands::Messages {
                chat_id,
                limit,
                offset,
            } => print_json(&client.fetch_messages(&chat_id, limit, offset).await?)?,
            ChatsCommands::Send { chat_id, content } => {
                print_json(&client.send_message(&chat_id, &content, Vec::new()).await?)?
            }
        },
        ClientCommands::Notifications { command } => match command {
            NotificationsCommands::List { unread } => {
                print_json(&client.fetch_notifications(unread).await?)?
            }
            NotificationsCommands::Count => println!("{}", client.unread_count().await?),
            NotificationsCommands::Read { id } => {
                print_json(&client.mark_notification_read(&id).await?)?
            }
            NotificationsCommands::ReadAll => {
                println!("{}", client.mark_all_notifications_read().await?)
            }
            NotificationsCommands::Delete { id } => client.delete_notification(&id).await?,
        },
        ClientCommands::Applications { command } => match command {
            ApplicationsCommands::List => print_json(&client.fetch_applications().await?)?,
            ApplicationsCommands::Pending => {
                print_json(&client.fetch_pending_applications().await?)?
            }
            ApplicationsCommands::Create {
                kind,
                title,
                content,
            } => {
                let application = NewApplication {
                    kind,
                    title,
                    content,
                };
                print_json(&client.create_application(&application).await?)?
            }
            ApplicationsCommands::Approve { id } => {
                print_json(&client.approve_application(&id).await?)?
            }
            ApplicationsCommands::Reject { id, reason } => {
                print_json(&client.reject_application(&id, reason).await?)?
            }
        },
    }
    Ok(())
}
