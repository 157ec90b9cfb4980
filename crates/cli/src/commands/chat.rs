//! `monologue chat`: interactive or single-message mode.
//!
//! Lines typed while the agent is working are delivered as interventions.
//! Slash commands control the running context.

use std::io::Write;
use std::sync::Arc;

use anyhow::{Context, bail};
use monologue_agent::{AgentContext, AgentServices, ContextManager, TaskHandle};
use monologue_config::AppConfig;
use monologue_core::{LogItem, LogKind, TemplatePrompts};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::broadcast;
use tokio_stream::StreamExt;
use tokio_stream::wrappers::BroadcastStream;

pub async fn run(config: AppConfig, message: Option<String>) -> anyhow::Result<()> {
    let chat_provider = &config.agent.chat_model.provider;
    if !config.has_api_key() && chat_provider != "ollama" {
        eprintln!();
        eprintln!("  ERROR: No API key configured!");
        eprintln!();
        eprintln!("  Set one of these environment variables:");
        eprintln!("    MONOLOGUE_API_KEY, OPENROUTER_API_KEY or OPENAI_API_KEY");
        eprintln!();
        eprintln!("  Or add it to your config file:");
        eprintln!("    {}", AppConfig::config_dir().join("config.toml").display());
        eprintln!();
        bail!("No API key found. See above for setup instructions.");
    }

    let router = monologue_providers::router::build_from_config(&config);
    let provider = router
        .default()
        .with_context(|| format!("No provider registered for '{chat_provider}'"))?;

    let mut services = AgentServices::new(provider, config.agent.clone());
    if let Some(dir) = &config.prompts_dir {
        services = services.with_prompts(Arc::new(TemplatePrompts::new(dir, &config.agent.prompts_subdir)));
    }

    let manager = ContextManager::new();
    let context = manager.create(services.into_shared(), None, None).await;
    let hops = config.agent.broadcast_hops();

    if let Some(message) = message {
        let handle = context.communicate(message, hops).await;
        let answer = handle.result().await?;
        println!("{answer}");
        return Ok(());
    }

    println!();
    println!("  monologue: interactive mode");
    println!();
    println!("  Provider:  {chat_provider}");
    println!("  Model:     {}", config.agent.chat_model.name);
    println!("  Context:   {}", context.id());
    println!();
    println!("  Type a message and press Enter. Messages sent while the agent");
    println!("  works are delivered as interventions.");
    println!("  Commands: /pause /resume /nudge /reset /log /quit");
    println!();

    let printer = tokio::spawn(print_log(context.log().subscribe()));
    let result = interactive(&context, hops).await;

    // kills the task if one is still running
    manager.remove(context.id()).await;
    printer.abort();
    result
}

async fn interactive(context: &AgentContext, hops: Option<usize>) -> anyhow::Result<()> {
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut waiting_on: Option<u64> = None;

    prompt()?;
    while let Some(line) = lines.next_line().await? {
        match line.trim() {
            "" => {}
            "/quit" | "/exit" => break,
            "/pause" => {
                context.pause();
                println!("  (paused)");
            }
            "/resume" => {
                context.resume();
                println!("  (resumed)");
            }
            "/nudge" => {
                let handle = context.nudge().await;
                waiting_on = Some(handle.id());
                spawn_waiter(handle);
            }
            "/reset" => {
                context.reset().await;
                waiting_on = None;
                println!("  (context reset)");
            }
            "/log" => {
                for item in context.log().items() {
                    println!("  [{:>3}] {:?} {}", item.no, item.kind, item.heading);
                    if !item.content.is_empty() {
                        println!("        {}", first_line(&item.content));
                    }
                }
            }
            text => {
                let handle = context.communicate(text, hops).await;
                if waiting_on == Some(handle.id()) {
                    println!("  (sent as intervention)");
                } else {
                    waiting_on = Some(handle.id());
                    spawn_waiter(handle);
                }
            }
        }
        prompt()?;
    }
    Ok(())
}

fn prompt() -> anyhow::Result<()> {
    print!("  You > ");
    std::io::stdout().flush()?;
    Ok(())
}

/// Print the task's answer when it arrives.
fn spawn_waiter(handle: TaskHandle) {
    tokio::spawn(async move {
        match handle.result().await {
            Ok(answer) => {
                println!();
                for line in answer.lines() {
                    println!("  Agent > {line}");
                }
                println!();
                print!("  You > ");
                let _ = std::io::stdout().flush();
            }
            // replaced by /nudge, /reset or /quit
            Err(err) if err.is_cancelled() => {}
            Err(err) => eprintln!("\n  [Error] {err}\n"),
        }
    });
}

/// Mirror tool activity, warnings and errors from the context log.
async fn print_log(receiver: broadcast::Receiver<LogItem>) {
    let mut items = BroadcastStream::new(receiver);
    while let Some(item) = items.next().await {
        // lagging behind just skips items
        let Ok(item) = item else { continue };
        match item.kind {
            LogKind::Tool | LogKind::Util => eprintln!("  · {}", item.heading),
            LogKind::Warning | LogKind::Error => {
                eprintln!("  ! {}: {}", item.heading, first_line(&item.content))
            }
            LogKind::Agent | LogKind::User | LogKind::Info => {}
        }
    }
}

fn first_line(text: &str) -> &str {
    text.lines().next().unwrap_or_default()
}
