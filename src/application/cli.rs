#[cfg(test)]
#[path = "cli_test.rs"]
mod tests;

use std::io;
use std::path;
use std::sync::Arc;
use std::time::Duration;

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
use dialoguer::Confirm;
use dialoguer::Input;
use dialoguer::Password;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::mpsc;
use yansi::Paint;

use super::render;
use super::watch::resolve_session;
use super::watch::PlanDecision;
use super::watch::WatchOptions;
use super::watch::WatchOutcome;
use super::watch::Watcher;
use crate::configuration::Config;
use crate::configuration::ConfigKey;
use crate::domain::models::Navigation;
use crate::domain::models::SessionStatus;
use crate::domain::models::StartResearchRequest;
use crate::domain::models::User;
use crate::domain::services::summarize;
use crate::domain::services::AuthStore;
use crate::infrastructure::api::ApiClient;
use crate::infrastructure::storage::StorageManager;

const NOT_SIGNED_IN: &str = "You are not signed in. Run `quill auth login` first.";
const SIGNED_OUT: &str = "Your session has expired. Run `quill auth login` to sign in again.";

fn print_completions<G: Generator>(gen: G, cmd: &mut Command) {
    generate(gen, cmd, cmd.get_name().to_string(), &mut io::stdout());
    std::process::exit(0);
}

/// Everything a command needs to talk to the research service.
struct Client {
    auth: Arc<AuthStore>,
    api: Arc<ApiClient>,
    navigation: mpsc::UnboundedReceiver<Navigation>,
}

impl Client {
    fn new(matches: &ArgMatches) -> Result<Client> {
        let persist = !matches.get_flag("no-persist");
        let auth = Arc::new(AuthStore::new(StorageManager::get(persist)));
        auth.init();

        let (tx, navigation) = mpsc::unbounded_channel::<Navigation>();
        let api = Arc::new(ApiClient::from_config(auth.clone())?.with_navigation(tx));

        return Ok(Client {
            auth,
            api,
            navigation,
        });
    }

    fn require_user(&self) -> Result<User> {
        match self.auth.user() {
            Some(user) => return Ok(user),
            None => bail!(NOT_SIGNED_IN),
        }
    }
}

/// Trims free-form input, treating whitespace-only values as absent.
pub fn optional_text(value: Option<&String>) -> Option<String> {
    return value
        .map(|text| return text.trim().to_string())
        .filter(|text| return !text.is_empty());
}

/// Builds the start request, rejecting a blank topic before anything is sent.
pub fn start_request(
    user: &User,
    topic: &str,
    constraints: Option<&String>,
    scope: Option<&String>,
) -> Result<StartResearchRequest> {
    let topic = topic.trim();
    if topic.is_empty() {
        bail!("Please enter a research topic");
    }

    return Ok(StartResearchRequest {
        topic: topic.to_string(),
        user_id: user.id.to_string(),
        constraints: optional_text(constraints),
        scope: optional_text(scope),
    });
}

fn watch_options(matches: &ArgMatches) -> Result<WatchOptions> {
    let poll_interval = Config::get(ConfigKey::PollInterval).parse::<u64>()?;

    return Ok(WatchOptions {
        interactive: !matches.get_flag("no-input"),
        follow: matches.get_flag("follow"),
        plan_decision: matches
            .get_flag("approve")
            .then_some(PlanDecision::Approve),
        poll_interval: Duration::from_millis(poll_interval),
        viewer_url: Config::get(ConfigKey::DocumentViewerURL),
    });
}

fn session_id(matches: &ArgMatches) -> String {
    if let Ok(Some(id)) = matches.try_get_one::<String>("session-id") {
        return id.to_string();
    }

    return "".to_string();
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

fn prompt_text(prompt: &str, initial: Option<&String>) -> Result<String> {
    if let Some(initial) = initial {
        return Ok(initial.to_string());
    }

    let res = Input::<String>::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .interact_text()?;

    return Ok(res.trim().to_string());
}

fn prompt_password(prompt: &str) -> Result<String> {
    let res = Password::with_theme(&ColorfulTheme::default())
        .with_prompt(prompt)
        .allow_empty_password(true)
        .interact()?;

    return Ok(res);
}

async fn auth_login(client: &Client, matches: &ArgMatches) -> Result<()> {
    let email = prompt_text("Email", matches.get_one::<String>("email"))?;
    let password = prompt_password("Password")?;

    let res = client.auth.login(&*client.api, &email, &password).await;
    if let Some(err) = res.error() {
        bail!(err.to_string());
    }

    if let Some(user) = client.auth.user() {
        println!("Signed in as {}", Paint::new(user.username).bold());
    }

    return Ok(());
}

async fn auth_register(client: &Client, matches: &ArgMatches) -> Result<()> {
    let email = prompt_text("Email", matches.get_one::<String>("email"))?;
    let username = prompt_text("Username", matches.get_one::<String>("username"))?;
    let password = prompt_password("Password")?;
    let confirm_password = prompt_password("Confirm password")?;

    let res = client
        .auth
        .register(&*client.api, &email, &username, &password, &confirm_password)
        .await;
    if let Some(err) = res.error() {
        bail!(err.to_string());
    }

    println!("Account created. Signed in as {}", Paint::new(username).bold());
    return Ok(());
}

async fn auth_logout(client: &Client) -> Result<()> {
    if client.auth.token().is_some() {
        if let Err(err) = client.api.logout().await {
            tracing::warn!(error = ?err, "Server-side logout failed");
        }
    }

    client.auth.logout();
    println!("Signed out.");
    return Ok(());
}

async fn auth_whoami(client: &Client) -> Result<()> {
    client.require_user()?;
    let user = client.api.me().await?;
    println!("{} <{}>", Paint::new(&user.username).bold(), user.email);
    return Ok(());
}

async fn research_start(client: Client, matches: &ArgMatches) -> Result<()> {
    let user = client.require_user()?;
    let topic = matches
        .get_one::<String>("topic")
        .map(|topic| return topic.to_string())
        .unwrap_or_default();

    let req = start_request(
        &user,
        &topic,
        matches.get_one::<String>("constraints"),
        matches.get_one::<String>("scope"),
    )?;

    let res = client.api.start_research(&req).await?;
    println!(
        "Research started for \"{}\" (ID: {})",
        req.topic,
        Paint::new(&res.session_id).bold()
    );
    if let Some(message) = res.message {
        println!("{message}");
    }

    if matches.get_flag("watch") {
        return research_watch(client, &res.session_id, matches).await;
    }

    println!("Follow along with `quill research watch {}`", res.session_id);
    return Ok(());
}

async fn research_list(client: &Client) -> Result<()> {
    let user = client.require_user()?;
    let mut sessions = client.api.list_sessions(&user.id).await?;

    if sessions.is_empty() {
        println!("There are no research sessions yet. Start one with `quill research start`.");
        return Ok(());
    }

    sessions.sort_by(|a, b| return b.created_at.cmp(&a.created_at));
    for session in sessions {
        let line = render::session_line(&session);
        println!("{}", Paint::new(line).fg(render::status_color(session.status)));
    }

    return Ok(());
}

async fn research_show(client: &Client, id: &str) -> Result<()> {
    client.require_user()?;
    let session = resolve_session(&client.api, id).await?;

    println!("{}\n", render::session_detail(&session));
    println!(
        "{}\n",
        render::agent_summary_line(&summarize(&session.agent_updates))
    );
    for update in &session.agent_updates {
        println!("{}\n", render::activity_card(update));
    }

    if session.status == SessionStatus::Completed {
        let viewer_url = Config::get(ConfigKey::DocumentViewerURL);
        println!("Report: {}", client.api.report_url(&session, &viewer_url));
    } else if !session.status.is_terminal() {
        println!("Follow along with `quill research watch {}`", session.id);
    }

    return Ok(());
}

async fn research_watch(client: Client, id: &str, matches: &ArgMatches) -> Result<()> {
    client.require_user()?;
    let session = resolve_session(&client.api, id).await?;
    let opts = watch_options(matches)?;

    let outcome = Watcher::new(client.api.clone(), &session.id, opts)
        .run(session, client.navigation)
        .await?;

    return finish_watch(id, outcome);
}

/// Turns how a watch ended into the command's exit status.
fn finish_watch(id: &str, outcome: WatchOutcome) -> Result<()> {
    match outcome {
        WatchOutcome::SignedOut => bail!(SIGNED_OUT),
        WatchOutcome::Failed => bail!("Research failed"),
        WatchOutcome::Interrupted => {
            println!("Stopped watching. Resume with `quill research watch {id}`");
        }
        WatchOutcome::Completed | WatchOutcome::Rejected => {}
    }

    return Ok(());
}

async fn research_decide(client: &Client, id: &str, approved: bool, matches: &ArgMatches) -> Result<()> {
    client.require_user()?;
    let modifications = optional_text(matches.get_one::<String>("modifications"));
    client.api.approve_plan(id, approved, modifications).await?;

    if approved {
        println!("Plan approved. Research is continuing.");
    } else {
        println!("Plan rejected. You can start a new research session.");
    }

    return Ok(());
}

async fn research_delete(client: &Client, id: &str, matches: &ArgMatches) -> Result<()> {
    client.require_user()?;

    if !matches.get_flag("yes") {
        let confirmed = Confirm::with_theme(&ColorfulTheme::default())
            .with_prompt(format!("Delete research session {id}?"))
            .default(false)
            .interact()?;
        if !confirmed {
            return Ok(());
        }
    }

    client.api.delete_session(id).await?;
    println!("Deleted session {id}");
    return Ok(());
}

async fn research_download(client: &Client, id: &str, matches: &ArgMatches) -> Result<()> {
    client.require_user()?;
    let session = resolve_session(&client.api, id).await?;

    if session.status != SessionStatus::Completed {
        bail!(format!(
            "The report is not ready yet. Current status: {}",
            render::status_badge(session.status)
        ));
    }

    if matches.get_flag("direct") {
        println!("{}", client.api.download_url(&session.id));
    } else {
        let viewer_url = Config::get(ConfigKey::DocumentViewerURL);
        println!("{}", client.api.report_url(&session, &viewer_url));
    }

    return Ok(());
}

fn arg_session_id() -> Arg {
    return Arg::new("session-id")
        .help("Research session ID")
        .required(true);
}

fn arg_no_input() -> Arg {
    return Arg::new("no-input")
        .long("no-input")
        .help("Never prompt. Pending plans are printed and left for `research approve` or `research reject`.")
        .action(ArgAction::SetTrue);
}

fn arg_approve() -> Arg {
    return Arg::new("approve")
        .long("approve")
        .help("Approve a pending plan without prompting.")
        .action(ArgAction::SetTrue);
}

fn arg_follow() -> Arg {
    return Arg::new("follow")
        .long("follow")
        .help("Keep streaming after the report is ready.")
        .action(ArgAction::SetTrue);
}

fn subcommand_auth() -> Command {
    return Command::new("auth")
        .about("Sign in, sign out, and manage your account.")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("login")
                .about("Sign in with your email and password.")
                .arg(
                    Arg::new("email")
                        .short('e')
                        .long("email")
                        .help("Account email. Prompted for when omitted.")
                        .num_args(1),
                ),
        )
        .subcommand(
            Command::new("register")
                .about("Create a new account and sign in.")
                .arg(
                    Arg::new("email")
                        .short('e')
                        .long("email")
                        .help("Account email. Prompted for when omitted.")
                        .num_args(1),
                )
                .arg(
                    Arg::new("username")
                        .short('u')
                        .long("username")
                        .help("Username, at least 3 characters. Prompted for when omitted.")
                        .num_args(1),
                ),
        )
        .subcommand(Command::new("logout").about("Sign out and forget the stored credentials."))
        .subcommand(Command::new("whoami").about("Show the signed in account."));
}

fn subcommand_research() -> Command {
    return Command::new("research")
        .about("Start and manage research sessions.")
        .arg_required_else_help(true)
        .subcommand(
            Command::new("start")
                .about("Start a new research session.")
                .arg(
                    Arg::new("topic")
                        .help("What to research, e.g. \"Impact of AI on healthcare diagnostics\"")
                        .required(true),
                )
                .arg(
                    Arg::new("constraints")
                        .long("constraints")
                        .help("Optional constraints, e.g. \"Focus on peer-reviewed sources from the last 5 years\"")
                        .num_args(1),
                )
                .arg(
                    Arg::new("scope")
                        .long("scope")
                        .help("Optional scope for the research.")
                        .num_args(1),
                )
                .arg(
                    Arg::new("watch")
                        .short('w')
                        .long("watch")
                        .help("Watch the session once it has started.")
                        .action(ArgAction::SetTrue),
                )
                .arg(arg_no_input())
                .arg(arg_approve())
                .arg(arg_follow()),
        )
        .subcommand(Command::new("list").about("List your research sessions, newest first."))
        .subcommand(
            Command::new("show")
                .about("Show a session with its plan and agent activity.")
                .arg(arg_session_id()),
        )
        .subcommand(
            Command::new("watch")
                .about("Follow a session live until its report is ready.")
                .arg(arg_session_id())
                .arg(arg_no_input())
                .arg(arg_approve())
                .arg(arg_follow()),
        )
        .subcommand(
            Command::new("approve")
                .about("Approve a session's research plan.")
                .arg(arg_session_id())
                .arg(
                    Arg::new("modifications")
                        .short('m')
                        .long("modifications")
                        .help("Changes to request alongside the approval.")
                        .num_args(1),
                ),
        )
        .subcommand(
            Command::new("reject")
                .about("Reject a session's research plan.")
                .arg(arg_session_id()),
        )
        .subcommand(
            Command::new("delete")
                .about("Delete a research session.")
                .arg(arg_session_id())
                .arg(
                    Arg::new("yes")
                        .short('y')
                        .long("yes")
                        .help("Skip the confirmation prompt.")
                        .action(ArgAction::SetTrue),
                ),
        )
        .subcommand(
            Command::new("download")
                .about("Print the URL of a finished report.")
                .arg(arg_session_id())
                .arg(
                    Arg::new("direct")
                        .long("direct")
                        .help("Print the direct download URL even when a hosted copy exists.")
                        .action(ArgAction::SetTrue),
                ),
        );
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

pub fn build() -> Command {
    let about = format!(
        "{}\n\nVersion: {}\nCommit: {}",
        env!("CARGO_PKG_DESCRIPTION"),
        env!("CARGO_PKG_VERSION"),
        env!("VERGEN_GIT_DESCRIBE")
    );

    return Command::new("quill")
        .about(about)
        .author(env!("CARGO_PKG_AUTHORS"))
        .version(env!("CARGO_PKG_VERSION"))
        .arg_required_else_help(true)
        .subcommand(subcommand_auth())
        .subcommand(subcommand_completions())
        .subcommand(subcommand_config())
        .subcommand(Command::new("manpages").about("Generates manpages and outputs to stdout."))
        .subcommand(subcommand_research())
        .arg(
            Arg::new(ConfigKey::ApiURL.to_string())
                .long(ConfigKey::ApiURL.to_string())
                .env("QUILL_API_URL")
                .num_args(1)
                .help(format!("Research service API URL. [default: {}]", Config::default(ConfigKey::ApiURL)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::WsURL.to_string())
                .long(ConfigKey::WsURL.to_string())
                .env("QUILL_WS_URL")
                .num_args(1)
                .help("WebSocket base URL for live updates. Derived from the API URL when not set.")
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ConfigFile.to_string())
                .short('c')
                .long(ConfigKey::ConfigFile.to_string())
                .env("QUILL_CONFIG_FILE")
                .num_args(1)
                .help(format!("Path to configuration file [default: {}]", Config::default(ConfigKey::ConfigFile)))
                .global(true)
        )
        .arg(
            Arg::new(ConfigKey::CredentialsFile.to_string())
                .long(ConfigKey::CredentialsFile.to_string())
                .env("QUILL_CREDENTIALS_FILE")
                .num_args(1)
                .help(format!("Where the sign-in token and user are stored. [default: {}]", Config::default(ConfigKey::CredentialsFile)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::PollInterval.to_string())
                .long(ConfigKey::PollInterval.to_string())
                .env("QUILL_POLL_INTERVAL")
                .num_args(1)
                .help(format!("Time in milliseconds between session refreshes while watching. [default: {}]", Config::default(ConfigKey::PollInterval)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::ConnectTimeout.to_string())
                .long(ConfigKey::ConnectTimeout.to_string())
                .env("QUILL_CONNECT_TIMEOUT")
                .num_args(1)
                .help(format!("Time to wait in milliseconds before timing out when connecting to the API. [default: {}]", Config::default(ConfigKey::ConnectTimeout)))
                .global(true),
        )
        .arg(
            Arg::new(ConfigKey::DocumentViewerURL.to_string())
                .long(ConfigKey::DocumentViewerURL.to_string())
                .env("QUILL_DOCUMENT_VIEWER_URL")
                .num_args(1)
                .help(format!("Viewer used to open hosted reports. [default: {}]", Config::default(ConfigKey::DocumentViewerURL)))
                .global(true),
        )
        .arg(
            Arg::new("no-persist")
                .long("no-persist")
                .env("QUILL_NO_PERSIST")
                .help("Keep credentials in memory for this run only.")
                .action(ArgAction::SetTrue)
                .global(true),
        );
}

async fn run_auth(matches: &ArgMatches) -> Result<()> {
    let (name, subcmd_matches) = match matches.subcommand() {
        Some(res) => res,
        None => {
            subcommand_auth().print_long_help()?;
            return Ok(());
        }
    };

    let client = Client::new(subcmd_matches)?;
    match name {
        "login" => return auth_login(&client, subcmd_matches).await,
        "register" => return auth_register(&client, subcmd_matches).await,
        "logout" => return auth_logout(&client).await,
        "whoami" => return auth_whoami(&client).await,
        _ => {
            subcommand_auth().print_long_help()?;
            return Ok(());
        }
    }
}

async fn run_research(matches: &ArgMatches) -> Result<()> {
    let (name, subcmd_matches) = match matches.subcommand() {
        Some(res) => res,
        None => {
            subcommand_research().print_long_help()?;
            return Ok(());
        }
    };

    let client = Client::new(subcmd_matches)?;
    let id = session_id(subcmd_matches);
    match name {
        "start" => return research_start(client, subcmd_matches).await,
        "list" => return research_list(&client).await,
        "show" => return research_show(&client, &id).await,
        "watch" => return research_watch(client, &id, subcmd_matches).await,
        "approve" => return research_decide(&client, &id, true, subcmd_matches).await,
        "reject" => return research_decide(&client, &id, false, subcmd_matches).await,
        "delete" => return research_delete(&client, &id, subcmd_matches).await,
        "download" => return research_download(&client, &id, subcmd_matches).await,
        _ => {
            subcommand_research().print_long_help()?;
            return Ok(());
        }
    }
}

pub async fn parse() -> Result<()> {
    let matches = build().get_matches();

    match matches.subcommand() {
        Some(("auth", subcmd_matches)) => {
            let mut all = vec![&matches, subcmd_matches];
            if let Some((_, leaf)) = subcmd_matches.subcommand() {
                all.push(leaf);
            }
            Config::load(all).await?;
            return run_auth(subcmd_matches).await;
        }
        Some(("research", subcmd_matches)) => {
            let mut all = vec![&matches, subcmd_matches];
            if let Some((_, leaf)) = subcmd_matches.subcommand() {
                all.push(leaf);
            }
            Config::load(all).await?;
            return run_research(subcmd_matches).await;
        }
        Some(("completions", subcmd_matches)) => {
            if let Some(completions) = subcmd_matches.get_one::<Shell>("shell").copied() {
                let mut app = build();
                print_completions(completions, &mut app);
            }
        }
        Some(("config", subcmd_matches)) => match subcmd_matches.subcommand() {
            Some(("create", _)) => {
                create_config_file().await?;
            }
            Some(("default", _)) => {
                println!("{}", Config::serialize_default(build()));
            }
            Some(("path", _)) => {
                println!("{}", Config::default(ConfigKey::ConfigFile));
            }
            _ => {
                subcommand_config().print_long_help()?;
            }
        },
        Some(("manpages", _)) => {
            clap_mangen::Man::new(build()).render(&mut io::stdout())?;
        }
        _ => {
            build().print_long_help()?;
        }
    }

    return Ok(());
}
