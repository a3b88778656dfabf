use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast::error::RecvError;

use gtd_assist::config::AppConfig;
use gtd_assist::error::Result;
use gtd_assist::conversation::{
    Attachment, ConversationEngine, EngineDeps, KeywordClassifier, Message, Origin, SessionEvent,
};
use gtd_assist::onboarding::SessionBootstrapper;
use gtd_assist::permissions::{Capability, PermissionStatus};
use gtd_assist::providers::fixtures::{
    FixtureDocuments, FixtureSuggestions, sample_calendar, sample_tasks,
};
use gtd_assist::providers::gemini::GeminiProvider;
use gtd_assist::providers::{DocumentReviewProvider, ProactiveSuggestionProvider, StaticGeolocator};

/// How long a simulated permission dialog stays pending.
const GRANT_DIALOG_DELAY: Duration = Duration::from_millis(400);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();

    let AppConfig {
        session: config,
        gemini,
        position,
    } = AppConfig::from_env()?;

    let documents = Arc::new(FixtureDocuments::default());
    let suggestions: Arc<dyn ProactiveSuggestionProvider>;
    let reviews: Arc<dyn DocumentReviewProvider>;
    let backend = match gemini {
        Some(gemini) => {
            let model = gemini.model.clone();
            let provider = Arc::new(GeminiProvider::new(gemini, documents));
            suggestions = provider.clone();
            reviews = provider;
            format!("gemini ({model})")
        }
        None => {
            suggestions = Arc::new(FixtureSuggestions);
            reviews = documents;
            "offline fixtures".to_string()
        }
    };

    eprintln!("📋 GTD Assist v{}", env!("CARGO_PKG_VERSION"));
    eprintln!("   User: {}", config.user_name);
    eprintln!("   Backend: {}", backend);
    match position {
        Some(p) => eprintln!("   Position: {:.4}, {:.4}", p.latitude, p.longitude),
        None => eprintln!("   Position: unavailable (set GTD_ASSIST_LATITUDE/LONGITUDE)"),
    }
    eprintln!("   Commands: /grant <cap>, /deny <cap>, /accept, /snooze, /status, /quit");
    eprintln!("   Capabilities: account-link, location, notifications\n");

    let engine = ConversationEngine::new(
        config,
        EngineDeps {
            suggestions,
            reviews,
            geolocator: Arc::new(StaticGeolocator::new(position)),
            classifier: Arc::new(KeywordClassifier),
            tasks: sample_tasks(),
            calendar: sample_calendar(Utc::now()),
        },
    );

    let render_handle = tokio::spawn(render_events(engine.subscribe()));
    let _onboarding = SessionBootstrapper::standard(&engine).spawn(engine.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    loop {
        let line = match lines.next_line().await {
            Ok(Some(line)) => line,
            Ok(None) => break, // EOF
            Err(e) => {
                tracing::error!("Error reading stdin: {}", e);
                break;
            }
        };
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        match parse_command(line) {
            Some(Command::Quit) => break,
            Some(Command::Permission { capability, grant }) => {
                let engine = engine.clone();
                tokio::spawn(async move {
                    if grant {
                        engine
                            .handle_permission_update(capability, PermissionStatus::Pending)
                            .await;
                        tokio::time::sleep(GRANT_DIALOG_DELAY).await;
                        engine
                            .handle_permission_update(capability, PermissionStatus::Granted)
                            .await;
                    } else {
                        engine
                            .handle_permission_update(capability, PermissionStatus::Denied)
                            .await;
                    }
                });
            }
            Some(command @ (Command::Accept | Command::Snooze)) => {
                let accept = matches!(command, Command::Accept);
                match answer_latest_suggestion(&engine, accept).await {
                    Ok(true) => {}
                    Ok(false) => eprintln!("   No suggestion waiting for an answer."),
                    Err(e) => eprintln!("   {}", e),
                }
            }
            Some(Command::Status) => {
                let snapshot = engine.snapshot().await;
                for (capability, status) in snapshot.permissions.iter() {
                    eprintln!("   {:<14} {}", capability.to_string(), status);
                }
                eprintln!("   busy: {}", snapshot.busy);
            }
            Some(Command::Unknown(reason)) => eprintln!("   {}", reason),
            None => {
                if let Err(e) = engine.submit_user_text(line).await {
                    eprintln!("   Not sent: {}", e);
                }
            }
        }
    }

    engine.close().await;
    render_handle.abort();
    Ok(())
}

/// Accept or snooze the newest open suggestion. `Ok(false)` when none is
/// waiting.
async fn answer_latest_suggestion(engine: &ConversationEngine, accept: bool) -> Result<bool> {
    let Some(id) = engine.latest_proposed_suggestion().await else {
        return Ok(false);
    };
    if accept {
        engine.accept_suggestion(id).await?;
    } else {
        engine.snooze_suggestion(id).await?;
    }
    Ok(true)
}

enum Command {
    Permission { capability: Capability, grant: bool },
    Accept,
    Snooze,
    Status,
    Quit,
    Unknown(String),
}

/// Slash commands; `None` for plain chat input.
fn parse_command(line: &str) -> Option<Command> {
    let rest = line.strip_prefix('/')?;
    let mut parts = rest.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let arg = parts.next();

    let command = match (name, arg) {
        ("grant" | "deny", Some(arg)) => match arg.parse::<Capability>() {
            Ok(capability) => Command::Permission {
                capability,
                grant: name == "grant",
            },
            Err(e) => Command::Unknown(e),
        },
        ("grant" | "deny", None) => Command::Unknown(format!("Usage: /{name} <capability>")),
        ("accept", _) => Command::Accept,
        ("snooze", _) => Command::Snooze,
        ("status", _) => Command::Status,
        ("quit" | "exit", _) => Command::Quit,
        _ => Command::Unknown(format!("Unknown command: /{name}")),
    };
    Some(command)
}

async fn render_events(mut rx: tokio::sync::broadcast::Receiver<SessionEvent>) {
    loop {
        match rx.recv().await {
            Ok(SessionEvent::MessageAppended { message }) => render_message(&message),
            Ok(SessionEvent::PermissionChanged { capability, status }) => {
                eprintln!("   [{capability}: {status}]");
            }
            Ok(SessionEvent::SuggestionResolved { state, .. }) => {
                eprintln!("   [suggestion {state}]");
            }
            Ok(SessionEvent::BusyChanged { busy: true }) => eprintln!("   ⏳ thinking..."),
            Ok(SessionEvent::BusyChanged { busy: false }) => {}
            Err(RecvError::Lagged(n)) => tracing::warn!(skipped = n, "Renderer lagged"),
            Err(RecvError::Closed) => break,
        }
    }
}

fn render_message(message: &Message) {
    match message.origin {
        Origin::User => return,
        Origin::System => println!("ℹ️  {}", message.text),
        Origin::Assistant => println!("\n🤖 {}", message.text),
    }

    match &message.attachment {
        Attachment::None => {}
        Attachment::PermissionPrompt => {
            for capability in Capability::ALL {
                println!("   • {} → /grant {}", capability.label(), capability);
            }
        }
        Attachment::SuggestionCard { task } => {
            println!("   📍 {} ({})", task.name, task.address);
            println!("   /accept to walk there, /snooze to skip");
        }
        Attachment::DirectionsCard { url, .. } => println!("   🚶 {}", url),
        Attachment::ReviewCard { review } => {
            println!("   Summary: {}", review.summary);
            for edit in &review.edits {
                println!("   - \"{}\" → \"{}\"", edit.original_text, edit.suggested_change);
                println!("     {}", edit.comment);
            }
        }
    }

    for citation in &message.citations {
        println!("   [{}] {}", citation.title, citation.uri);
    }
}
