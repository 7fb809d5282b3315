#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;
use std::sync::Arc;

use anyhow::bail;
use anyhow::Result;
use clap::value_parser;
use clap::Arg;
use clap::ArgAction;
use clap::ArgMatches;
use clap::Command;
use clap_complete::generate;
use clap_complete::Generator;
use clap_complete::Shell;
use dialoguer::theme::ColorfulTheme;
use dialoguer::Input;
use dialoguer::Password;
use strum::VariantNames;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use yansi::Paint;

use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::BackendBox;
use crate::domain::models::Event;
use crate::domain::models::IdentityBox;
use crate::domain::models::IdentityProvider;
use crate::domain::models::IngestionStatus;
use crate::domain::models::Profile;
use crate::domain::models::Project;
use crate::domain::models::Risk;
use crate::domain::models::Role;
use crate::domain::models::Session;
use crate::domain::models::WebhookUrl;
use crate::domain::services::ChatSession;
use crate::domain::services::Dashboard;
use crate::domain::services::DashboardSettings;
use crate::domain::services::IngestionMonitor;
use crate::domain::services::ProjectStore;
use crate::domain::services::SendOutcome;
use crate::domain::services::SessionGate;
use crate::infrastructure::backends::lumis::LumisBackend;
use crate::infrastructure::identity::supabase::SupabaseIdentity;
use crate::infrastructure::identity::supabase::SupabaseProjects;

pub fn help_text() -> String {
    let text = r#"
HOTKEYS:
- Enter - Connect a repository, or send a question once one is connected.
- Up arrow / Down arrow - Scroll the chat.
- CTRL+U / CTRL+D - Page up / page down.
- CTRL+L - Clear the chat.
- Esc - Dismiss a failed ingestion.
- CTRL+C - Stop waiting for an answer if one is pending, otherwise exit.
        "#;

    return text.trim().to_string();
}

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

async fn create_config_file() -> Result<()> {
    let config_file_path_str = Config::default(ConfigKey::ConfigFile);
    let config_file_path = path::PathBuf::from(&config_file_path_str);
    if config_file_path.exists() {
        bail!(format!(
            "Config file already exists at {config_file_path_str}"
        ));
    }

    if let Some(parent) = config_file_path.parent() {
        fs::create_dir_all(parent).await?;
    }

    let mut file = fs::File::create(&config_file_path).await?;
    file.write_all(Config::serialize_default(build()).as_bytes())
        .await?;

    println!("Created default config file at {config_file_path_str}");
    return Ok(());
}

fn backend() -> Result<BackendBox> {
    return Ok(Arc::new(LumisBackend::from_config()?));
}

fn settings() -> Result<DashboardSettings> {
    return Ok(DashboardSettings {
        poll_interval: Config::get_duration(ConfigKey::PollInterval)?,
        watch_interval: Config::get_duration(ConfigKey::WatchInterval)?,
        refresh_interval: Config::get_duration(ConfigKey::ProjectRefreshInterval)?,
    });
}

fn identity() -> Result<IdentityBox> {
    return Ok(Arc::new(SupabaseIdentity::from_config()?));
}

pub async fn require_session() -> Result<Session> {
    return SessionGate::new(identity()?).require().await;
}

fn unloaded_store(session: &Session) -> Result<ProjectStore> {
    let repository = SupabaseProjects::from_config(identity()?)?;
    return Ok(ProjectStore::new(Arc::new(repository), &session.user_id));
}

async fn project_store(session: &Session) -> Result<ProjectStore> {
    let store = unloaded_store(session)?;
    store.refresh().await;
    return Ok(store);
}

async fn find_project(session: &Session) -> Result<Option<Project>> {
    let store = unloaded_store(session)?;
    return Ok(store.fetch_project_for(&session.user_id).await);
}

/// Returns the status of the project's job while it is still running, and
/// None once it has finished. Errors when the backend knows no job for it.
async fn running_job(backend: &BackendBox, project: &Project) -> Result<Option<IngestionStatus>> {
    let status = match backend.ingest_status(&project.id).await {
        Ok(status) => status,
        Err(err) => {
            tracing::debug!(error = ?err, project_id = project.id, "No ingestion status");
            bail!(format!("No ingestion job running for {}.", project.repo_name()));
        }
    };

    if status.class().is_terminal() {
        return Ok(None);
    }

    return Ok(Some(status));
}

pub async fn start_dashboard(tx: mpsc::UnboundedSender<Event>) -> Result<Dashboard> {
    let session = require_session().await?;
    let backend = backend()?;
    if let Err(err) = backend.health_check().await {
        tracing::warn!(error = ?err, "Lumis server health check failed");
    }

    let repository = SupabaseProjects::from_config(identity()?)?;
    let dashboard = Dashboard::start(
        backend,
        Arc::new(repository),
        session,
        &Config::webhook_base(),
        settings()?,
        tx,
    )
    .await;

    return Ok(dashboard);
}

async fn login(matches: &ArgMatches) -> Result<()> {
    let theme = ColorfulTheme::default();
    let email = match matches.get_one::<String>("email") {
        Some(email) => email.to_string(),
        None => Input::<String>::with_theme(&theme)
            .with_prompt("Email")
            .interact_text()?,
    };
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .interact()?;

    let session = SupabaseIdentity::from_config()?
        .sign_in(&email, &password)
        .await?;

    println!(
        "Signed in as {}",
        Paint::green(session.email.unwrap_or(email))
    );
    return Ok(());
}

async fn signup() -> Result<()> {
    let theme = ColorfulTheme::default();
    let email = Input::<String>::with_theme(&theme)
        .with_prompt("Email")
        .interact_text()?;
    let password = Password::with_theme(&theme)
        .with_prompt("Password")
        .with_confirmation("Confirm password", "Passwords do not match")
        .interact()?;
    let full_name = Input::<String>::with_theme(&theme)
        .with_prompt("Full name")
        .interact_text()?;
    let phone_number = Input::<String>::with_theme(&theme)
        .with_prompt("Phone number")
        .allow_empty(true)
        .interact_text()?;
    let organization = Input::<String>::with_theme(&theme)
        .with_prompt("Organization")
        .allow_empty(true)
        .interact_text()?;

    let profile = Profile {
        id: "".to_string(),
        full_name,
        phone_number,
        organization,
    };

    let session = SupabaseIdentity::from_config()?
        .sign_up(&email, &password, &profile)
        .await?;

    if session.is_some() {
        println!("Account created, signed in as {}", Paint::green(email));
    } else {
        println!("Account created. Check your email for the confirmation link, then run `lumis login`.");
    }

    return Ok(());
}

fn print_progress(status: &IngestionStatus, printed_logs: &mut usize) {
    if status.logs.len() < *printed_logs {
        *printed_logs = 0;
    }

    for log in &status.logs[*printed_logs..] {
        println!("{} {log}", Paint::cyan(format!("[{}]", status.step)));
    }
    *printed_logs = status.logs.len();
}

/// Prints monitor events until the watched job reaches a terminal status.
async fn follow_ingestion(rx: &mut mpsc::UnboundedReceiver<Event>) -> Result<()> {
    let mut printed_logs = 0;

    while let Some(event) = rx.recv().await {
        match event {
            Event::IngestionProgress(status) => {
                print_progress(&status, &mut printed_logs);
            }
            Event::IngestionCompleted(project_id) => {
                println!(
                    "{}",
                    Paint::green(format!("Ingestion of project {project_id} completed."))
                );
                return Ok(());
            }
            Event::IngestionFailed(project_id, error) => {
                bail!(format!(
                    "Ingestion of project {project_id} failed: {}",
                    error.unwrap_or_else(|| return "unknown error".to_string())
                ));
            }
            _ => (),
        }
    }

    bail!("Ingestion monitor stopped unexpectedly")
}

async fn ingest(repo_url: &str) -> Result<()> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let dashboard = start_dashboard(tx).await?;

    let project_id = dashboard.ingest(repo_url).await?;
    println!("Started ingestion of {repo_url} as project {project_id}");

    let res = follow_ingestion(&mut rx).await;
    if res.is_ok() {
        if let Some(url) = dashboard.webhook_url() {
            println!("Point a GitHub push webhook at {url} to keep the twin in sync.");
        }
    }

    dashboard.shutdown();
    return res;
}

async fn watch() -> Result<()> {
    let session = require_session().await?;
    let project = match find_project(&session).await? {
        Some(project) => project,
        None => bail!("No project connected. Run `lumis ingest --repo-url <url>` first."),
    };

    let backend = backend()?;
    if running_job(&backend, &project).await?.is_none() {
        println!("No ingestion running for {}.", project.repo_name());
        return Ok(());
    }

    let (tx, mut rx) = mpsc::unbounded_channel::<Event>();
    let monitor = IngestionMonitor::new(backend, Config::get_duration(ConfigKey::PollInterval)?, tx);
    monitor.attach(&project.id);
    println!("Watching ingestion of {}", project.repo_name());

    let res = follow_ingestion(&mut rx).await;
    monitor.detach();
    return res;
}

pub fn format_status(
    project: Option<&Project>,
    webhook_url: Option<&WebhookUrl>,
    status: Option<&IngestionStatus>,
    risks: &[Risk],
) -> String {
    let project = match project {
        Some(project) => project,
        None => {
            return "No project connected. Run `lumis ingest --repo-url <url>` to connect one."
                .to_string()
        }
    };

    let mut lines = vec![
        format!("Project:   {} ({})", project.repo_name(), project.repo_url),
        format!("Commit:    {}", project.short_commit()),
    ];

    if let Some(webhook_url) = webhook_url {
        lines.push(format!("Webhook:   {webhook_url}"));
    }

    match status {
        Some(status) => lines.push(format!("Ingestion: {} ({})", status.status, status.step)),
        None => lines.push("Ingestion: no job running".to_string()),
    }

    if risks.is_empty() {
        lines.push("Risks:     none reported".to_string());
    } else {
        lines.push("Risks:".to_string());
        for risk in risks {
            lines.push(format!("  - [{}] {}", risk.risk_type, risk.description));
        }
    }

    return lines.join("\n");
}

async fn status() -> Result<()> {
    let session = require_session().await?;
    let project = find_project(&session).await?;
    let backend = backend()?;

    let mut webhook_url = None;
    let mut ingestion = None;
    let mut risks = vec![];
    if let Some(project) = &project {
        webhook_url = Some(WebhookUrl::new(
            &Config::webhook_base(),
            &session.user_id,
            &project.id,
        ));
        ingestion = backend.ingest_status(&project.id).await.ok();
        risks = backend.risks(&project.id).await.unwrap_or_else(|err| {
            tracing::warn!(error = ?err, "Failed to load risks");
            return vec![];
        });
    }

    println!(
        "{}",
        format_status(project.as_ref(), webhook_url.as_ref(), ingestion.as_ref(), &risks)
    );
    return Ok(());
}

async fn ask(query: &str) -> Result<()> {
    let session = require_session().await?;
    let chat = ChatSession::new(backend()?, project_store(&session).await?, None);

    match chat.send(query).await? {
        SendOutcome::Answered => {
            let answer = chat
                .messages()
                .into_iter()
                .rev()
                .find(|message| return message.role == Role::Assistant);
            if let Some(answer) = answer {
                println!("{}", answer.content);
            }
        }
        SendOutcome::Rejected(reason) => {
            bail!(format!("Question not sent: {reason:?}"));
        }
        SendOutcome::Discarded => (),
    }

    return Ok(());
}

async fn webhook() -> Result<()> {
    let session = require_session().await?;
    match find_project(&session).await? {
        Some(project) => {
            println!(
                "{}",
                WebhookUrl::new(&Config::webhook_base(), &session.user_id, &project.id)
            );
        }
        None => bail!("No project connected. Run `lumis ingest --repo-url <url>` first."),
    }

    return Ok(());
}

fn subcommand_completions() -> Command {
    return Command::new("completions")
        .about("Generates shell completions.")
        .arg(
            clap::Arg::new("shell")
                .short('s')
                .long("shell")
                .help("Which shell to generate completions for.")
                .action(ArgAction::Set)
                .value_parser(value_parser!(Shell))
                .required(true),
        );
}

fn subcommand_config() -> Command {
    return Command::new("config")
        .about("Configuration file options.")
        .subcommand(
            Command::new("create").about("Saves the default config file to the configuration file path. This command will fail if the file exists already.")
        )
        .subcommand(
            Command::new("default").about("Outputs the default configuration file to stdout.")
        )
        .subcommand(
            Command::new("path").about("Returns the default path for the configuration file.")
        );
}

fn subcommand_debug() -> Command {
    return Command::new("debug")
        .about("Debug helpers for Lumis")
        .hide(true)
        .subcommand(
            Command::new("log-path").about("Output path to debug log file generated when running Lumis with environment variable RUST_LOG=lumis")
        )
        .subcommand(
            Command::new("enum-config").about("List all config keys as strings.")
        );
}

fn arg_config(key: ConfigKey, env: &'static str, help: &str) -> Arg {
    let default = Config::default(key);
    let help = if default.is_empty() || key == ConfigKey::SessionFile {
        help.to_string()
    } else {
        format!("{help} [default: {default}]")
    };

    return Arg::new(key.to_string())
        .long(key.to_string())
        .env(env)
        .num_args(1)
        .help(help)
        .global(true);
}

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    let commands_text = help_text()
        .split('\n')
        .map(|line| {
            if line.starts_with('-') {
                return format!("  {line}");
            }
            if line.starts_with("HOTKEYS:") {
                return Paint::new(format!("DASHBOARD {line}"))
                    .underline()
                    .bold()
                    .to_string();
            }
            return line.to_string();
        })
        .collect::<Vec<String>>()
        .join("\n");

    return Command::new("lumis")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .after_help(commands_text)
        .arg_required_else_help(false)
        .subcommand(Command::new("dashboard").about("Open the dashboard. This is the default."))
        .subcommand(
            Command::new("login").about("Sign in and store the session locally.").arg(
                Arg::new("email")
                    .short('e')
                    .long("email")
                    .help("Account email. Prompted for when omitted.")
                    .num_args(1),
            ),
        )
        .subcommand(Command::new("signup").about("Create an account and its profile."))
        .subcommand(Command::new("logout").about("Sign out and forget the stored session."))
        .subcommand(
            Command::new("ingest")
                .about("Connect a repository and follow its ingestion.")
                .arg(
                    Arg::new("repo-url")
                        .short('r')
                        .long("repo-url")
                        .help("GitHub repository URL to ingest.")
                        .num_args(1)
                        .required(true),
                ),
        )
        .subcommand(Command::new("status").about("Show the connected project, its ingestion status and risks."))
        .subcommand(Command::new("watch").about("Follow a running ingestion of the connected project."))
        .subcommand(
            Command::new("ask")
                .about("Ask a single question about the connected project.")
                .arg(
                    Arg::new("query")
                        .help("Question to ask.")
                        .num_args(1..)
                        .required(true),
                ),
        )
        .subcommand(Command::new("webhook").about("Print the push webhook URL for the connected project."))
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(subcommand_debug())
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("LUMIS_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(arg_config(ConfigKey::ApiURL, "LUMIS_API_URL", "Lumis analysis server URL."))
        .arg(arg_config(
            ConfigKey::WebhookURL,
            "LUMIS_WEBHOOK_URL",
            "Public base URL GitHub reaches the server at, used for webhook addresses. Defaults to the api-url.",
        ))
        .arg(arg_config(ConfigKey::SupabaseURL, "LUMIS_SUPABASE_URL", "Supabase project URL."))
        .arg(arg_config(
            ConfigKey::SupabaseAnonKey,
            "LUMIS_SUPABASE_ANON_KEY",
            "Supabase anonymous API key.",
        ))
        .arg(arg_config(
            ConfigKey::SessionFile,
            "LUMIS_SESSION_FILE",
            "Path of the cached sign in session.",
        ))
        .arg(arg_config(
            ConfigKey::PollInterval,
            "LUMIS_POLL_INTERVAL",
            "Milliseconds between ingestion status polls while watching a job.",
        ))
        .arg(arg_config(
            ConfigKey::WatchInterval,
            "LUMIS_WATCH_INTERVAL",
            "Milliseconds between checks for ingestions started elsewhere, such as webhook syncs.",
        ))
        .arg(arg_config(
            ConfigKey::ProjectRefreshInterval,
            "LUMIS_PROJECT_REFRESH_INTERVAL",
            "Milliseconds between project refreshes on the dashboard.",
        ))
        .arg(arg_config(
            ConfigKey::RequestTimeout,
            "LUMIS_REQUEST_TIMEOUT",
            "Milliseconds to wait for any single HTTP request.",
        ));
}

/// Runs the requested subcommand. Returns true when the dashboard should
/// open.
pub async fn parse() -> Result<bool> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("debug", debug_matches)) => {
            match debug_matches.subcommand() {
                Some(("log-path", _)) => {
                    let log_path = Config::log_dir().join("debug.log");
                    println!("{}", log_path.to_string_lossy());
                }
                Some(("enum-config", _)) => {
                    let res = ConfigKey::VARIANTS.join("\n");
                    println!("{}", res);
                }
                _ => {
                    subcommand_debug().print_long_help()?;
                }
            }

            return Ok(false);
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
            return Ok(false);
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
                return Ok(false);
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
                return Ok(false);
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
                return Ok(false);
            }
            _ => {
                subcommand_config().print_long_help()?;
                return Ok(false);
            }
        },
        Some(("dashboard", subcmd_matches)) => {
            Config::load(vec![&matches, subcmd_matches]).await?;
        }
        Some((name, subcmd_matches)) => {
            Config::load(vec![&matches, subcmd_matches]).await?;

            match name {
                "login" => login(subcmd_matches).await?,
                "signup" => signup().await?,
                "logout" => {
                    SupabaseIdentity::from_config()?.sign_out().await?;
                    println!("Signed out.");
                }
                "ingest" => {
                    let repo_url = subcmd_matches
                        .get_one::<String>("repo-url")
                        .map(|url| return url.to_string())
                        .unwrap_or_default();
                    ingest(&repo_url).await?;
                }
                "status" => status().await?,
                "watch" => watch().await?,
                "ask" => {
                    let query = subcmd_matches
                        .get_many::<String>("query")
                        .map(|words| return words.cloned().collect::<Vec<String>>().join(" "))
                        .unwrap_or_default();
                    ask(&query).await?;
                }
                "webhook" => webhook().await?,
                _ => {
                    build().print_long_help()?;
                }
            }

            return Ok(false);
        }
        None => {
            Config::load(vec![&matches]).await?;
        }
    }

    return Ok(true);
}
