//! Neurorad Chat - Terminal Surface
//!
//! Streams answers from a local vision model into the terminal.
//!
//! # Usage
//!
//! ```bash
//! # One question, streamed to stdout
//! neurorad-chat --image scan.png ask "Is there a midline shift?"
//!
//! # Interactive session
//! neurorad-chat chat
//!
//! # Create an account on the identity service
//! neurorad-chat signup --email me@example.org
//!
//! # Verbose logging (logs go to stderr)
//! RUST_LOG=debug neurorad-chat chat
//! ```
//!
//! # Chat Commands
//!
//! - `/image <path>`: attach an image to the following prompts
//! - `/clear`: remove the attached image
//! - `/quit`: leave
//!
//! Ctrl-C while an answer is streaming stops it and keeps the partial text.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::signal;
use tokio::sync::mpsc;
use tracing::{info, warn};

use neurorad_core::{
    default_config_path, load_config_from_path, AuthSession, Conductor, ConductorConfig,
    ConductorMessage, ConfigOverrides, GenerationBackend, IdentityProvider, ImageAttachment,
    NeuroradConfig, NotifyLevel, OllamaBackend, PocketBaseIdentity, Sender,
};

/// Neurorad Chat - streaming vision-model chat in the terminal
#[derive(Parser, Debug)]
#[command(name = "neurorad-chat")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Configuration file path
    #[arg(short = 'c', long, env = "NEURORAD_CONFIG", value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model name
    #[arg(short = 'm', long, value_name = "NAME")]
    model: Option<String>,

    /// Generation endpoint (URL, host:port or host)
    #[arg(long, value_name = "URL")]
    ollama_url: Option<String>,

    /// Image to attach to prompts
    #[arg(short = 'i', long, value_name = "PATH")]
    image: Option<PathBuf>,

    /// Refuse to send prompts without an image
    #[arg(long)]
    require_image: bool,

    /// Account email for the identity service
    #[arg(long, env = "NEURORAD_EMAIL")]
    email: Option<String>,

    /// Account password for the identity service
    #[arg(long, env = "NEURORAD_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Refuse to start without a valid login
    #[arg(long)]
    require_login: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(short = 'l', long, env = "NEURORAD_LOG_LEVEL", default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Ask one question and stream the answer
    Ask {
        /// The prompt
        #[arg(required = true, num_args = 1..)]
        prompt: Vec<String>,
    },
    /// Interactive chat (default)
    Chat,
    /// Create an account on the identity service
    Signup {
        /// Account email
        #[arg(long, env = "NEURORAD_EMAIL")]
        email: String,
        /// Password
        #[arg(long, env = "NEURORAD_PASSWORD", hide_env_values = true)]
        password: String,
        /// Password again (defaults to the password)
        #[arg(long)]
        confirm: Option<String>,
    },
}

/// Writes conductor messages and status lines to the terminal
///
/// Answers go to stdout, everything else to stderr.
struct Renderer {
    out: tokio::io::Stdout,
    err: tokio::io::Stderr,
    /// Prefix answers with the sender label
    transcript: bool,
    failed: bool,
}

impl Renderer {
    fn new(transcript: bool) -> Self {
        Self {
            out: tokio::io::stdout(),
            err: tokio::io::stderr(),
            transcript,
            failed: false,
        }
    }

    async fn status(&mut self, line: &str) -> std::io::Result<()> {
        self.err.write_all(line.as_bytes()).await?;
        self.err.write_all(b"\n").await?;
        self.err.flush().await
    }

    async fn print(&mut self, line: &str) -> std::io::Result<()> {
        self.out.write_all(line.as_bytes()).await?;
        self.out.write_all(b"\n").await?;
        self.out.flush().await
    }

    async fn prompt(&mut self) -> std::io::Result<()> {
        self.out.write_all(b"> ").await?;
        self.out.flush().await
    }

    async fn render(&mut self, msg: ConductorMessage) -> std::io::Result<()> {
        match msg {
            ConductorMessage::StreamStart { .. } if self.transcript => {
                let label = format!("{}: ", Sender::Assistant.label());
                self.out.write_all(label.as_bytes()).await?;
                self.out.flush().await?;
            }
            ConductorMessage::Token { text, .. } => {
                self.out.write_all(text.as_bytes()).await?;
                self.out.flush().await?;
            }
            ConductorMessage::StreamEnd { metadata, .. } => {
                self.out.write_all(b"\n").await?;
                self.out.flush().await?;
                info!(
                    elapsed_ms = metadata.elapsed_ms,
                    fragments = metadata.fragment_count,
                    tokens_per_second = metadata.tokens_per_second().unwrap_or(0.0),
                    "Response complete"
                );
            }
            ConductorMessage::StreamError { error, .. } => {
                self.failed = true;
                self.out.write_all(b"\n").await?;
                self.out.flush().await?;
                self.status(&error.to_string()).await?;
            }
            ConductorMessage::Notify { level, message } => {
                let prefix = match level {
                    NotifyLevel::Info => "note",
                    NotifyLevel::Warning => "warning",
                    NotifyLevel::Error => "error",
                };
                self.status(&format!("{prefix}: {message}")).await?;
            }
            ConductorMessage::State { state } => {
                tracing::debug!(state = state.description(), "State changed");
            }
            ConductorMessage::Message { .. } | ConductorMessage::StreamStart { .. } => {}
        }
        Ok(())
    }

    async fn drain(&mut self, rx: &mut mpsc::Receiver<ConductorMessage>) -> std::io::Result<()> {
        while let Ok(msg) = rx.try_recv() {
            self.render(msg).await?;
        }
        Ok(())
    }
}

/// Stream the open turn to the terminal; Ctrl-C stops it
async fn drive_turn<B: GenerationBackend + 'static>(
    conductor: &mut Conductor<B>,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    renderer: &mut Renderer,
) -> Result<()> {
    renderer.drain(rx).await?;
    loop {
        tokio::select! {
            more = conductor.poll_streaming() => {
                renderer.drain(rx).await?;
                if !more {
                    break;
                }
            }
            _ = signal::ctrl_c() => {
                warn!("Interrupted");
                conductor.cancel().await;
                renderer.drain(rx).await?;
                break;
            }
        }
    }
    Ok(())
}

fn load_settings(args: &Args) -> Result<NeuroradConfig> {
    let path = match &args.config {
        Some(path) => {
            if !path.exists() {
                bail!("Config file not found: {}", path.display());
            }
            Some(path.clone())
        }
        None => default_config_path(),
    };
    let mut config = load_config_from_path(path).context("Failed to load configuration")?;

    let mut overrides = ConfigOverrides::new();
    if let Some(ref model) = args.model {
        overrides = overrides.with_model(model.clone());
    }
    if let Some(ref url) = args.ollama_url {
        overrides = overrides.with_ollama_url(url.clone());
    }
    if args.require_image {
        overrides = overrides.with_require_image(true);
    }
    overrides.apply(&mut config);
    config.validate()?;

    info!(
        source = %config.source(),
        url = %config.ollama_url,
        model = %config.model,
        "Configuration loaded"
    );
    Ok(config)
}

async fn login(
    args: &Args,
    identity: &PocketBaseIdentity,
    renderer: &mut Renderer,
) -> Result<AuthSession> {
    let mut session = AuthSession::new();
    match (&args.email, &args.password) {
        (Some(email), Some(password)) => match identity.authenticate(email, password).await {
            Ok(auth) => {
                session.login(auth);
                if args.require_login && !session.validate(identity).await {
                    bail!("Session was rejected by the identity service");
                }
                renderer.status(&format!("Logged in as {email}")).await?;
            }
            Err(e) => {
                if args.require_login {
                    bail!("{}", e.display_message());
                }
                renderer
                    .status(&format!("warning: {}", e.display_message()))
                    .await?;
            }
        },
        _ if args.require_login => bail!("Login required: pass --email and --password"),
        _ => {}
    }
    Ok(session)
}

async fn signup(
    identity: &PocketBaseIdentity,
    renderer: &mut Renderer,
    email: &str,
    password: &str,
    confirm: &str,
) -> Result<()> {
    match identity.register(email, password, confirm).await {
        Ok(user) => {
            renderer
                .print(&format!("Account created for {} ({})", email, user.id))
                .await?;
            Ok(())
        }
        Err(e) => {
            if let Some(fields) = e.field_errors() {
                for (field, message) in fields {
                    renderer.status(&format!("  {field}: {message}")).await?;
                }
            }
            bail!("{}", e.display_message())
        }
    }
}

async fn ask<B: GenerationBackend + 'static>(
    conductor: &mut Conductor<B>,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    renderer: &mut Renderer,
    prompt: &str,
) -> Result<()> {
    conductor.send_message(prompt).await?;
    drive_turn(conductor, rx, renderer).await?;
    if renderer.failed {
        bail!("Generation failed");
    }
    Ok(())
}

async fn chat<B: GenerationBackend + 'static>(
    conductor: &mut Conductor<B>,
    rx: &mut mpsc::Receiver<ConductorMessage>,
    renderer: &mut Renderer,
) -> Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    renderer
        .status("Type a question. /image <path> attaches an image, /quit exits.")
        .await?;
    loop {
        renderer.prompt().await?;

        let Some(line) = lines.next_line().await? else {
            break;
        };
        let line = line.trim();

        let command = line.split_once(' ').map_or((line, ""), |(c, rest)| (c, rest.trim()));
        let status = match command {
            ("", _) => continue,
            ("/quit" | "/exit", _) => break,
            ("/clear", _) => match conductor.clear_image() {
                Ok(Some(image)) => format!("Removed {}", image.name()),
                Ok(None) => "No image attached".to_string(),
                Err(e) => e.to_string(),
            },
            ("/image", path) if !path.is_empty() => match ImageAttachment::from_path(path).await {
                Ok(image) => {
                    let label = format!("{} ({} KB)", image.name(), image.size_kb());
                    match conductor.attach_image(image) {
                        Ok(()) => format!("Attached {label}"),
                        Err(e) => e.to_string(),
                    }
                }
                Err(e) => e.to_string(),
            },
            ("/image", _) => "Usage: /image <path>".to_string(),
            _ => match conductor.send_message(line).await {
                Ok(_) => {
                    drive_turn(conductor, rx, renderer).await?;
                    continue;
                }
                Err(e) => e.to_string(),
            },
        };
        renderer.status(&status).await?;
    }
    Ok(())
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Logs go to stderr so answers can be piped
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(format!("neurorad_chat={}", args.log_level).parse()?)
                .add_directive(format!("neurorad_core={}", args.log_level).parse()?),
        )
        .with_writer(std::io::stderr)
        .with_target(true)
        .init();

    let config = load_settings(&args)?;
    let identity = PocketBaseIdentity::new(&config.identity_config())?;
    let mut renderer = Renderer::new(matches!(args.command, Some(Command::Chat) | None));

    if let Some(Command::Signup {
        ref email,
        ref password,
        ref confirm,
    }) = args.command
    {
        let confirm = confirm.as_deref().unwrap_or(password);
        return signup(&identity, &mut renderer, email, password, confirm).await;
    }

    let session = login(&args, &identity, &mut renderer).await?;
    if let Some(user) = session.user() {
        info!(user_id = %user.id, "Authenticated");
    }

    let backend = OllamaBackend::new(&config.backend_config())?;
    let (tx, mut rx) = mpsc::channel::<ConductorMessage>(256);
    let mut conductor = Conductor::new(backend, ConductorConfig::from(&config), tx);

    if let Some(ref path) = args.image {
        let image = ImageAttachment::from_path(path)
            .await
            .with_context(|| format!("Failed to attach {}", path.display()))?;
        conductor.attach_image(image)?;
    }

    match args.command {
        Some(Command::Ask { ref prompt }) => {
            ask(&mut conductor, &mut rx, &mut renderer, &prompt.join(" ")).await
        }
        Some(Command::Chat) | None => {
            conductor.start().await;
            renderer.drain(&mut rx).await?;
            chat(&mut conductor, &mut rx, &mut renderer).await
        }
        Some(Command::Signup { .. }) => Ok(()),
    }
}
