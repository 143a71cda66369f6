//! statebot console bot
//!
//! Runs a small demo flow over stdin/stdout. Every input line is delivered
//! as a message from one configured user.

use async_trait::async_trait;
use statebot::{
    goto, stay, ChatId, Database, DatabaseStorage, Dispatcher, Engine, EngineConfig,
    HandlerRegistry, Inbound, StateKind, Transport, UserId,
};
use std::path::PathBuf;
use std::sync::Arc;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// States of the demo flow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Demo {
    Idle,
    Welcome,
    Menu,
    AskName,
    AskAge,
    Profile,
}

impl StateKind for Demo {
    fn all() -> &'static [Self] {
        &[
            Demo::Idle,
            Demo::Welcome,
            Demo::Menu,
            Demo::AskName,
            Demo::AskAge,
            Demo::Profile,
        ]
    }

    fn name(&self) -> &'static str {
        match self {
            Demo::Idle => "idle",
            Demo::Welcome => "welcome",
            Demo::Menu => "menu",
            Demo::AskName => "ask_name",
            Demo::AskAge => "ask_age",
            Demo::Profile => "profile",
        }
    }
}

/// Prints outbound messages to stdout
struct ConsoleTransport;

#[async_trait]
impl Transport for ConsoleTransport {
    async fn send(&self, chat_id: ChatId, text: &str) -> Result<(), String> {
        println!("[{chat_id}] bot> {text}");
        Ok(())
    }
}

#[allow(clippy::too_many_lines)]
fn demo_flow() -> HandlerRegistry {
    let mut registry = HandlerRegistry::new();

    registry
        .for_state(Demo::Idle.state_id())
        .on_enter(|_| async { goto(Demo::Welcome.state_id()) });

    registry
        .for_state(Demo::Welcome.state_id())
        .on_enter(|ctx| async move {
            ctx.send("Hi! Say \"hello\" to see the menu.").await;
            stay()
        })
        .on_response(|ctx, text| async move {
            if text.trim().eq_ignore_ascii_case("hello") {
                goto(Demo::Menu.state_id())
            } else {
                ctx.send("I only understand \"hello\" for now.").await;
                stay()
            }
        });

    registry
        .for_state(Demo::Menu.state_id())
        .on_enter(|ctx| async move {
            ctx.send("1) Tell me about yourself\n2) Show what you know\n3) Forget me")
                .await;
            stay()
        })
        .on_response(|ctx, text| async move {
            match text.trim() {
                "1" => goto(Demo::AskName.state_id()),
                "2" => goto(Demo::Profile.state_id()),
                "3" => {
                    ctx.data().restore(serde_json::Map::new());
                    ctx.send("Done, I forgot everything.").await;
                    goto(Demo::Welcome.state_id())
                }
                _ => {
                    ctx.send("Please pick 1, 2 or 3.").await;
                    stay()
                }
            }
        });

    registry
        .for_state(Demo::AskName.state_id())
        .on_enter(|ctx| async move {
            ctx.send("What is your name?").await;
            stay()
        })
        .on_response(|ctx, text| async move {
            let name = text.trim();
            if name.is_empty() {
                ctx.send("Your name can't be empty.").await;
                return stay();
            }
            ctx.set_data("name", name)?;
            goto(Demo::AskAge.state_id())
        });

    registry
        .for_state(Demo::AskAge.state_id())
        .on_enter(|ctx| async move {
            ctx.send("How old are you?").await;
            stay()
        })
        .on_response(|ctx, text| async move {
            match text.trim().parse::<u8>() {
                Ok(age) if (1..=150).contains(&age) => {
                    ctx.set_data("age", age)?;
                    goto(Demo::Profile.state_id())
                }
                _ => {
                    ctx.send("Please answer with a number between 1 and 150.").await;
                    stay()
                }
            }
        });

    registry
        .for_state(Demo::Profile.state_id())
        .on_enter(|ctx| async move {
            let name: Option<String> = ctx.get_data("name");
            let age: Option<u8> = ctx.get_data("age");
            let summary = match (name, age) {
                (Some(name), Some(age)) => format!("You are {name}, {age} years old."),
                (Some(name), None) => format!("You are {name}."),
                _ => "I don't know anything about you yet.".to_string(),
            };
            ctx.send(summary).await;
            goto(Demo::Menu.state_id())
        });

    registry
}

fn env_i64(name: &str, default: i64) -> i64 {
    std::env::var(name)
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(default)
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize logging; stdout belongs to the conversation
    let json_logs = std::env::var("STATEBOT_LOG_JSON").is_ok_and(|v| v == "1" || v == "true");
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "statebot=info".into()),
        )
        .with(json_logs.then(|| {
            tracing_subscriber::fmt::layer()
                .json()
                .with_current_span(false)
                .with_span_list(false)
                .with_writer(std::io::stderr)
        }))
        .with((!json_logs).then(|| tracing_subscriber::fmt::layer().with_writer(std::io::stderr)))
        .init();

    // Configuration
    let db_path = std::env::var("STATEBOT_DB_PATH").unwrap_or_else(|_| {
        let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
        format!("{home}/.statebot/statebot.db")
    });
    let user_id: UserId = env_i64("STATEBOT_USER_ID", 1);
    let chat_id: ChatId = env_i64("STATEBOT_CHAT_ID", user_id);
    let config = EngineConfig::from_env();

    // Ensure database directory exists
    if let Some(parent) = PathBuf::from(&db_path).parent() {
        std::fs::create_dir_all(parent)?;
    }

    tracing::info!(path = %db_path, "Opening database");
    let db = Database::open(&db_path)?;

    let registry = demo_flow();
    registry.validate::<Demo>()?;
    tracing::info!(
        states = registry.len(),
        max_chain_length = config.max_chain_length,
        same_state = %config.same_state,
        "Handlers registered"
    );

    let dispatcher = Dispatcher::new(
        Engine::new(registry, config),
        DatabaseStorage::new(db.clone()),
        Arc::new(ConsoleTransport),
    );

    println!("statebot console (user {user_id}). Commands: /reset, /reset-all, /quit");

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" => break,
            "/reset" => match dispatcher.reset(user_id).await {
                Ok(()) => println!("(session reset)"),
                Err(e) => tracing::error!(user_id, error = %e, "Reset failed"),
            },
            "/reset-all" => match db.reset_all_to_idle() {
                Ok(count) => println!("({count} sessions reset)"),
                Err(e) => tracing::error!(error = %e, "Reset failed"),
            },
            text => {
                dispatcher
                    .dispatch(&Inbound::new(user_id, chat_id, text))
                    .await;
            }
        }
    }

    tracing::info!("Input closed, shutting down");
    Ok(())
}
