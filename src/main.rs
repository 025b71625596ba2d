use std::io::{self, BufRead, StdinLock, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::time::{Duration, Instant};

use clap::{Parser, Subcommand};
use url::Url;

use readtogether::app::{NavigationController, ShellEvent};
use readtogether::bridge::celebration::{self, CelebrationData, HttpEnricher};
use readtogether::bridge::PageMessage;
use readtogether::config::{CrossOriginPolicy, RewardMode, ShellConfig, SiteOrigin};
use readtogether::context::AppContext;
use readtogether::net::connectivity::{ConnectivityMonitor, TcpProbe};
use readtogether::net::cookies::parse_cookie_string;
use readtogether::net::download::{self, DownloadError, DownloadLocation, HttpDownloader};
use readtogether::net::fetch::FetchError;
use readtogether::net::policy::{classify, is_same_origin};
use readtogether::platform::{
    system, CrossOriginChoice, FileChooserParams, Notice, Platform, PlatformError, WebView,
};
use readtogether::reward::flow::{AdOutcome, AdPresenter, RewardFlow, RewardOutcome};
use readtogether::reward::{RewardAdConfig, RewardError};
use readtogether::session::notes::{NoteStore, NotesError};
use readtogether::session::terms::{
    ConsentAnswer, ConsentPrompt, FileMarker, ProcessExit, TermsGate,
};

/// How long the simulator waits for in-flight transfers at end of script.
const DRAIN_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, Parser)]
#[command(name = "readtogether")]
#[command(about = "ReadTogether shell core: navigation policy, downloads, notes and rewards")]
struct Cli {
    /// Site the shell is bound to
    #[arg(long, env = "READTOGETHER_SITE_URL")]
    site_url: Option<String>,

    /// Application support directory (terms marker, offline notes)
    #[arg(long, env = "READTOGETHER_DATA_DIR")]
    data_dir: Option<PathBuf>,

    /// Cross-origin links: prompt or external
    #[arg(long, env = "READTOGETHER_CROSS_ORIGIN", default_value = "prompt")]
    cross_origin: CrossOriginPolicy,

    /// Reward claiming: simulated or live
    #[arg(long, env = "READTOGETHER_REWARD_MODE", default_value = "simulated")]
    reward_mode: RewardMode,

    /// Base URL of the reward-ads API
    #[arg(long, env = "READTOGETHER_REWARD_API")]
    reward_api: Option<Url>,

    /// Session token sent as a bearer credential
    #[arg(long, env = "READTOGETHER_TOKEN", hide_env_values = true)]
    token: Option<String>,

    /// Page load timeout in seconds
    #[arg(long, env = "READTOGETHER_LOAD_TIMEOUT")]
    load_timeout: Option<u64>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Print how each URL would be handled
    Classify { urls: Vec<String> },
    /// Fetch a document the way an intercepted link would be
    Download {
        url: String,
        /// `document.cookie`-style string forwarded with the request
        #[arg(long)]
        cookie: Option<String>,
        /// Target directory instead of the platform downloads folder
        #[arg(long)]
        to: Option<PathBuf>,
    },
    /// Offline notes kept on this device
    Notes {
        #[command(subcommand)]
        action: NotesAction,
    },
    /// Run the one-time terms acceptance gate
    Terms,
    /// Watch a rewarded ad and claim the reward
    Reward {
        /// Skip the ad instead of watching it to the end
        #[arg(long)]
        skip: bool,
    },
    /// Interpret one in-page message
    Message { payload: String },
    /// Drive the navigation controller with an event script read from stdin
    Simulate {
        /// Cookie string the simulated page exposes
        #[arg(long)]
        cookie: Option<String>,
    },
}

#[derive(Debug, Subcommand)]
enum NotesAction {
    List,
    Add { text: Vec<String> },
    Delete { id: String },
}

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Download(#[from] DownloadError),
    #[error(transparent)]
    Notes(#[from] NotesError),
    #[error(transparent)]
    Reward(#[from] RewardError),
    #[error(transparent)]
    Io(#[from] io::Error),
    #[error("no note with id {0}")]
    UnknownNote(String),
    #[error("invalid URL {0}")]
    InvalidUrl(String),
    #[error("unrecognised page message")]
    UnknownMessage,
}

fn main() -> ExitCode {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{e}");
            eprintln!("error: {e}");
            ExitCode::FAILURE
        }
    }
}

fn shell_config(cli: &Cli) -> ShellConfig {
    let mut config = ShellConfig::new(SiteOrigin::from_config(cli.site_url.as_deref()));
    config.cross_origin = cli.cross_origin;
    config.reward_mode = cli.reward_mode;
    if let Some(dir) = &cli.data_dir {
        config.documents_dir = dir.join("documents");
        config.data_dir = dir.clone();
    }
    if let Some(api) = &cli.reward_api {
        config.reward_api = api.clone();
    }
    if let Some(secs) = cli.load_timeout {
        config.load_timeout = Duration::from_secs(secs);
    }
    config
}

fn run(cli: Cli) -> Result<(), CliError> {
    let ctx = AppContext::new(shell_config(&cli))?;
    ctx.set_token(cli.token.clone());
    log::debug!("bound to {}", ctx.origin().base());

    match cli.command {
        Command::Classify { urls } => {
            for url in urls {
                println!("{:?}\t{url}", classify(&url, ctx.origin()));
            }
            Ok(())
        }
        Command::Download { url, cookie, to } => run_download(&ctx, &url, cookie, to),
        Command::Notes { action } => run_notes(&ctx.config.data_dir, action),
        Command::Terms => {
            let mut gate = TermsGate::new(
                FileMarker::in_dir(&ctx.config.data_dir),
                StdinPrompt::new(),
                ProcessExit,
            );
            if gate.ensure_accepted() {
                let (marker, _, _) = gate.into_parts();
                match marker.accepted_at() {
                    Some(at) => println!("terms accepted {}", at.format("%Y-%m-%d %H:%M UTC")),
                    None => println!("terms accepted"),
                }
            }
            Ok(())
        }
        Command::Reward { skip } => {
            let flow = RewardFlow::for_context(&ctx)?;
            match flow.run(&mut ConsoleAd { skip })? {
                RewardOutcome::Claimed(result) => println!(
                    "+{} ({}), balance {}",
                    result.coins_awarded,
                    result.transaction_id,
                    result
                        .balance_after
                        .map_or_else(|| "unknown".to_string(), |b| b.to_string())
                ),
                RewardOutcome::Skipped => println!("ad skipped, no reward"),
            }
            Ok(())
        }
        Command::Message { payload } => run_message(&ctx, &payload),
        Command::Simulate { cookie } => simulate(ctx, cookie),
    }
}

fn run_download(
    ctx: &AppContext,
    url: &str,
    cookie: Option<String>,
    to: Option<PathBuf>,
) -> Result<(), CliError> {
    let url = Url::parse(url)
        .ok()
        .or_else(|| ctx.origin().join(url))
        .ok_or_else(|| CliError::InvalidUrl(url.to_string()))?;
    let cookies = cookie
        .as_deref()
        .map(parse_cookie_string)
        .unwrap_or_default();
    let mut location = DownloadLocation::resolve(&ctx.config);
    if to.is_some() {
        location.downloads = to;
    }

    let token = ctx.token();
    let path = download::download(ctx.http(), &url, &cookies, token.as_deref(), &location)?;
    println!("{}", path.display());
    Ok(())
}

fn run_notes(data_dir: &Path, action: NotesAction) -> Result<(), CliError> {
    let mut store = NoteStore::open(data_dir);
    match action {
        NotesAction::List => {
            for note in store.list() {
                println!(
                    "{}\t{}\t{}",
                    note.id,
                    note.created_at.format("%Y-%m-%d %H:%M"),
                    note.text
                );
            }
        }
        NotesAction::Add { text } => {
            let note = store.add(&text.join(" "))?;
            println!("{}", note.id);
        }
        NotesAction::Delete { id } => {
            if !store.delete(&id)? {
                return Err(CliError::UnknownNote(id));
            }
        }
    }
    Ok(())
}

fn run_message(ctx: &AppContext, payload: &str) -> Result<(), CliError> {
    let finished = match PageMessage::parse(payload) {
        Some(PageMessage::BookFinished(finished)) => finished,
        Some(PageMessage::Other { kind }) => {
            println!("ignored message '{kind}'");
            return Ok(());
        }
        None => return Err(CliError::UnknownMessage),
    };

    let api = finished
        .api_url
        .as_deref()
        .and_then(|raw| ctx.origin().join(raw))
        .filter(|api| is_same_origin(api, ctx.origin()));
    let mut data = match api {
        Some(api) => {
            let token = ctx.token();
            celebration::enrich(ctx.http(), &api, token.as_deref(), &finished)
        }
        None => CelebrationData::from_payload(&finished),
    };
    data.resolve_cover(ctx.origin().base());
    print_celebration(&data);
    Ok(())
}

fn print_celebration(data: &CelebrationData) {
    println!("🎉 {}", data.title);
    println!("   {}", data.reward_text);
    if let Some(cover) = &data.cover_url {
        println!("   {cover}");
    }
}

// ─── Console collaborators ───────────────────────────────────────────────────

/// Terms prompt answered on stdin. End of input counts as declining.
struct StdinPrompt {
    input: StdinLock<'static>,
}

impl StdinPrompt {
    fn new() -> Self {
        Self {
            input: io::stdin().lock(),
        }
    }

    fn next_line(&mut self) -> Option<String> {
        let mut line = String::new();
        match self.input.read_line(&mut line) {
            Ok(0) | Err(_) => None,
            Ok(_) => Some(line.trim().to_string()),
        }
    }
}

impl ConsentPrompt for StdinPrompt {
    fn ask(&mut self) -> ConsentAnswer {
        eprint!("Принять пользовательское соглашение? [accept/decline] ");
        let _ = io::stderr().flush();
        match self.next_line().as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("accept" | "yes" | "y" | "да") => ConsentAnswer::Accept,
            Some("decline" | "no" | "n" | "нет") | None => ConsentAnswer::Decline,
            Some(_) => ConsentAnswer::Dismissed,
        }
    }
}

struct ConsoleAd {
    skip: bool,
}

impl AdPresenter for ConsoleAd {
    fn show(&mut self, config: &RewardAdConfig, duration: Duration) -> AdOutcome {
        if self.skip {
            return AdOutcome::Skipped;
        }
        println!(
            "showing ad '{}' for {:?} (+{} {})",
            config.placement_id, duration, config.reward_amount, config.currency
        );
        std::thread::sleep(duration);
        AdOutcome::Completed { ad_unit_id: None }
    }
}

/// Prints what an embedded browser would be asked to do.
struct ConsoleWebView {
    cookie: Option<String>,
    depth: usize,
}

impl WebView for ConsoleWebView {
    fn load_url(&mut self, url: &str) {
        self.depth += 1;
        println!("webview: load {url}");
    }
    fn reload(&mut self) {
        println!("webview: reload");
    }
    fn can_go_back(&self) -> bool {
        self.depth > 1
    }
    fn go_back(&mut self) {
        self.depth = self.depth.saturating_sub(1);
        println!("webview: back");
    }
    fn cookie_string(&mut self) -> Option<String> {
        self.cookie.clone()
    }
    fn deliver_files(&mut self, files: Vec<PathBuf>) {
        println!("webview: {} file(s) delivered", files.len());
    }
}

struct ConsolePlatform;

impl Platform for ConsolePlatform {
    fn open_external(&mut self, url: &str) -> Result<(), PlatformError> {
        println!("platform: open externally {url}");
        system::open_with_default(url)
    }
    fn open_file(&mut self, path: &Path) -> Result<(), PlatformError> {
        system::open_path(path)
    }
    fn request_cross_origin_choice(&mut self, url: &str) {
        println!("platform: ask about {url} (answer with `choose stay|external|cancel {url}`)");
    }
    fn show_notice(&mut self, notice: Notice) {
        println!("notice: {notice}");
    }
    fn pick_files(&mut self, params: &FileChooserParams) -> Vec<PathBuf> {
        println!("platform: file chooser for {:?}, nothing picked", params.accept_types);
        Vec::new()
    }
}

// ─── Simulator ───────────────────────────────────────────────────────────────

fn simulate(ctx: Arc<AppContext>, cookie: Option<String>) -> Result<(), CliError> {
    let mut gate = TermsGate::new(
        FileMarker::in_dir(&ctx.config.data_dir),
        StdinPrompt::new(),
        ProcessExit,
    );
    if !gate.ensure_accepted() {
        return Ok(());
    }
    let (_, mut input, _) = gate.into_parts();

    let probe = TcpProbe::for_origin(ctx.origin(), Duration::from_secs(2));
    let mut monitor = ConnectivityMonitor::new(&probe);

    let mut shell = NavigationController::new(
        &ctx.config,
        ConsoleWebView { cookie, depth: 0 },
        ConsolePlatform,
        Box::new(HttpDownloader::new(Arc::clone(&ctx))),
        Box::new(HttpEnricher::new(Arc::clone(&ctx))?),
    );
    let events = shell.sender();
    monitor.on_change(move |online| {
        let _ = events.send(ShellEvent::ConnectivityChanged { online });
    });
    shell.start(monitor.currently_online());

    while let Some(line) = input.next_line() {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let (verb, rest) = line.split_once(' ').unwrap_or((line.as_str(), ""));
        let rest = rest.trim();
        match verb {
            "start" => shell.handle(ShellEvent::PageStarted { url: rest.into() }),
            "finish" => shell.handle(ShellEvent::PageFinished { url: rest.into() }),
            "error" => shell.handle(ShellEvent::ResourceError {
                main_frame: Some(rest != "sub"),
                description: "simulated failure".into(),
            }),
            "offline" => {
                monitor.update(false);
            }
            "online" => {
                monitor.update(true);
            }
            "probe" => {
                monitor.refresh(&probe);
            }
            "navigate" => println!("decision: {:?}", shell.on_navigation_request(rest)),
            "choose" => match parse_choice(rest) {
                Some((choice, url)) => shell.handle(ShellEvent::CrossOriginChoice {
                    url: url.into(),
                    choice,
                }),
                None => println!("usage: choose stay|external|cancel <url>"),
            },
            "message" => shell.handle(ShellEvent::PageMessage {
                payload: rest.into(),
            }),
            "back" => println!("back handled: {}", shell.go_back()),
            "reload" => shell.reload(),
            "wait" => std::thread::sleep(Duration::from_millis(rest.parse().unwrap_or(1000))),
            "dismiss" => {
                shell.dismiss_celebration();
            }
            other => println!("unknown command '{other}'"),
        }
        settle(&mut shell);
    }

    let deadline = Instant::now() + DRAIN_TIMEOUT;
    while shell.view().downloads_in_flight > 0 && Instant::now() < deadline {
        std::thread::sleep(Duration::from_millis(100));
        settle(&mut shell);
    }
    shell.dispose();
    Ok(())
}

/// Deliver queued events and due timers, then print the view.
fn settle(shell: &mut NavigationController<ConsoleWebView, ConsolePlatform>) {
    shell.pump();
    shell.poll_timeout(Instant::now());
    let view = shell.view();
    println!(
        "state: {:?} loading={} error={} timed_out={} offline={} recovering={} downloads={}",
        view.phase,
        view.navigation.is_loading,
        view.navigation.has_error,
        view.navigation.has_timed_out,
        view.offline_overlay,
        view.recovery_overlay,
        view.downloads_in_flight,
    );
    if let Some(data) = &view.celebration {
        print_celebration(data);
    }
}

fn parse_choice(rest: &str) -> Option<(CrossOriginChoice, &str)> {
    let (choice, url) = rest.split_once(' ')?;
    let choice = match choice {
        "stay" => CrossOriginChoice::StayInApp,
        "external" => CrossOriginChoice::OpenExternally,
        "cancel" => CrossOriginChoice::Cancel,
        _ => return None,
    };
    Some((choice, url.trim()))
}
