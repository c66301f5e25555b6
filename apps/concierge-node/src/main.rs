use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use concierge_chat::{
    AnalysisState, ConciergeConfig, GuestCredentials, GuestSession, SendMessage,
};
use concierge_realtime::QueryKey;
use concierge_store::{Conversation, GuestMessage, NewMessage, RequestStatus};
use std::io::{self, Write};
use std::path::PathBuf;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// JSON config file (defaults plus CONCIERGE_* environment otherwise)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// SQLite database path, overrides the config
    #[arg(long)]
    db: Option<PathBuf>,

    /// Guest ID
    #[arg(short, long)]
    guest: String,

    /// Hotel ID
    #[arg(short = 'H', long)]
    hotel: String,

    /// Guest session token sent to the analyzer
    #[arg(long)]
    token: Option<String>,

    /// Do not call the analysis service
    #[arg(long)]
    no_analysis: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Send one message as the guest
    Send {
        text: String,
        /// Language the guest writes in
        #[arg(long, default_value = "en")]
        language: String,
        /// Language staff read in
        #[arg(long, default_value = "en")]
        target: String,
    },
    /// Print the conversation
    List {
        /// Print messages as JSON lines
        #[arg(long)]
        json: bool,
    },
    /// Interactive chat that follows new messages live
    Watch {
        #[arg(long, default_value = "en")]
        language: String,
    },
    /// Reply as hotel staff
    Reply {
        text: String,
        #[arg(long, default_value = "staff")]
        staff_id: String,
    },
    /// Mark staff messages as read
    Read,
    /// Show the notification badge
    Badge,
    /// Open a service request
    Request {
        request_type: String,
        description: Option<String>,
    },
    /// Change the status of a service request
    Status {
        id: String,
        /// pending, in_progress, completed or cancelled
        status: String,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .try_init();

    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => ConciergeConfig::from_json_file(path)?,
        None => ConciergeConfig::from_env(),
    };
    if let Some(db) = &args.db {
        config.storage.db_path = db.clone();
    }
    if args.no_analysis {
        config.analyzer.enabled = false;
    }

    let mut credentials = GuestCredentials::new(&args.guest, &args.hotel);
    if let Some(token) = &args.token {
        credentials = credentials.with_token(token);
    }

    let session = GuestSession::open(config, credentials).await?;
    let result = run(&session, args.command).await;
    session.close();
    result
}

async fn run(session: &GuestSession, command: Command) -> Result<()> {
    let conversation = session.conversation().await?;

    match command {
        Command::Send {
            text,
            language,
            target,
        } => {
            let mut analysis = session.chat().analysis_events();
            let message = session
                .chat()
                .send_message(SendMessage::new(&conversation, text).languages(language, target))
                .await?;
            println!("Sent {}", message.id);

            // Stay around long enough for the detached analysis to land
            if session.chat().analysis_enabled() {
                let timeout = session.config().analyzer.timeout();
                match tokio::time::timeout(timeout, analysis.recv()).await {
                    Ok(Ok(event)) => {
                        println!("Analysis {:?}", event.state);
                        if event.state == AnalysisState::Complete {
                            if let Some(stored) = session.store().messages().get(&message.id).await? {
                                print_message(&stored);
                            }
                        }
                    }
                    _ => warn!("Analysis of {} did not settle in time", message.id),
                }
            }
        }
        Command::List { json } => {
            for message in session.chat().list_messages(&conversation.id).await? {
                if json {
                    println!("{}", serde_json::to_string(&message)?);
                } else {
                    print_message(&message);
                }
            }
        }
        Command::Watch { language } => watch(session, &conversation.id, &language).await?,
        Command::Reply { text, staff_id } => {
            let message = post_staff_reply(session, &conversation, &staff_id, &text).await?;
            println!("Replied {}", message.id);
        }
        Command::Read => {
            let marked = session
                .chat()
                .mark_staff_messages_read(&conversation.id)
                .await?;
            println!("Marked {} messages read", marked);
        }
        Command::Badge => print_badge(session).await?,
        Command::Request {
            request_type,
            description,
        } => {
            let credentials = session.credentials();
            let request = session
                .store()
                .requests()
                .create(
                    &credentials.guest_id,
                    &credentials.hotel_id,
                    &request_type,
                    description,
                )
                .await?;
            println!("Request {} is {}", request.id, request.status.as_str());
        }
        Command::Status { id, status } => {
            let status: RequestStatus = status.parse().map_err(anyhow::Error::msg)?;
            let request = session.store().requests().update_status(&id, status).await?;
            println!("Request {} is {}", request.id, request.status.as_str());
        }
    }

    Ok(())
}

async fn watch(session: &GuestSession, conversation_id: &str, language: &str) -> Result<()> {
    let chat = session.chat();
    let _live = chat.watch_messages(conversation_id).await?;
    let _sources = session
        .notifications()
        .subscribe_sources(session.realtime())
        .await?;
    let mut badge = session.notifications().watch();
    let mut invalidations = session.cache().subscribe();
    let messages_key = QueryKey::guest_messages(conversation_id);

    let mut shown = print_new(session, conversation_id, 0).await?;

    println!("Type a message, /reply <text>, /read, /badge or /quit");
    print!("> ");
    io::stdout().flush().context("Failed to flush stdout")?;

    let mut stdin = BufReader::new(tokio::io::stdin());
    let mut line = String::new();

    loop {
        tokio::select! {
            event = invalidations.recv() => {
                if matches!(event, Ok(ref key) if messages_key.starts_with(key)) {
                    shown = print_new(session, conversation_id, shown).await?;
                }
            }

            changed = badge.changed() => {
                if changed.is_ok() {
                    let state = badge.borrow().clone();
                    if let Some(label) = state.label {
                        println!("\n[bell] {}", label);
                    }
                }
            }

            read = stdin.read_line(&mut line) => {
                if read.context("Failed to read stdin")? == 0 {
                    break;
                }
                let input = line.trim();
                if let Some(command) = input.strip_prefix('/') {
                    let (name, rest) = command.split_once(' ').unwrap_or((command, ""));
                    match name {
                        "quit" | "exit" => break,
                        "read" => {
                            let marked = chat.mark_staff_messages_read(conversation_id).await?;
                            println!("Marked {} messages read", marked);
                        }
                        "badge" => print_badge(session).await?,
                        "reply" if !rest.trim().is_empty() => {
                            let conversation = session.conversation().await?;
                            post_staff_reply(session, &conversation, "staff", rest.trim()).await?;
                        }
                        other => println!("Unknown command: /{}", other),
                    }
                } else if !input.is_empty() {
                    let conversation = session.conversation().await?;
                    let request = SendMessage::new(&conversation, input).languages(language, "en");
                    if let Err(e) = chat.send_message(request).await {
                        eprintln!("Failed to send message: {}", e);
                    }
                }
                print!("> ");
                io::stdout().flush().context("Failed to flush stdout")?;
                line.clear();
            }
        }
    }

    info!("Leaving conversation {}", conversation_id);
    Ok(())
}

/// Insert a staff message and move the conversation's last activity
async fn post_staff_reply(
    session: &GuestSession,
    conversation: &Conversation,
    staff_id: &str,
    text: &str,
) -> Result<GuestMessage> {
    let message = session
        .store()
        .messages()
        .insert(NewMessage::from_staff(conversation, staff_id, text))
        .await?;
    session
        .store()
        .conversations()
        .touch_last_message(&conversation.id, message.created_at)
        .await?;
    Ok(message)
}

/// Print messages past the first `shown`, returns the new total
async fn print_new(session: &GuestSession, conversation_id: &str, shown: usize) -> Result<usize> {
    let messages = session.chat().list_messages(conversation_id).await?;
    for message in messages.iter().skip(shown) {
        print_message(message);
    }
    Ok(messages.len().max(shown))
}

async fn print_badge(session: &GuestSession) -> Result<()> {
    let badge = session.notifications().refresh().await?;
    println!(
        "{} open requests, {} unread messages, badge: {}",
        badge.pending_requests,
        badge.unread_messages,
        badge.label.as_deref().unwrap_or("-")
    );
    Ok(())
}

fn print_message(message: &GuestMessage) {
    let time = message.created_at.format("%H:%M:%S");
    match &message.translated_text {
        Some(translated) => println!(
            "[{}] {}: {} ({})",
            time, message.sender_type, message.message_text, translated
        ),
        None => println!("[{}] {}: {}", time, message.sender_type, message.message_text),
    }
}
