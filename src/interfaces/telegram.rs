use anyhow::Result;
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use teloxide::prelude::*;
use tracing::{error, info};

use crate::core::catalog::Category;
use crate::core::dispatch::PromptDelivery;
use crate::core::error::EngineError;
use crate::core::lifecycle::LifecycleComponent;
use crate::core::rotation::{CategoryPolicy, RotationEngine};
use crate::core::store::types::JournalEntry;
use crate::core::store::{JournalStore, ScheduleStore, UserProgressStore};

const DAY_NAMES: [&str; 7] = [
    "Sunday",
    "Monday",
    "Tuesday",
    "Wednesday",
    "Thursday",
    "Friday",
    "Saturday",
];

fn day_name(day: u8) -> &'static str {
    DAY_NAMES.get(day as usize).copied().unwrap_or("?")
}

fn parse_category(arg: &str) -> Option<Category> {
    match arg.trim().to_lowercase().as_str() {
        "self" | "self_awareness" | "self-awareness" => Some(Category::SelfAwareness),
        "connections" | "connection" => Some(Category::Connections),
        _ => None,
    }
}

fn parse_day(arg: &str) -> Option<u8> {
    arg.trim().parse::<u8>().ok().filter(|d| *d <= 6)
}

/// "<hour>" or "<hour> <minute>", 24h clock.
fn parse_time(rest: &str) -> Option<(u8, u8)> {
    let mut parts = rest.split_whitespace();
    let hour = parts.next()?.parse::<u8>().ok().filter(|h| *h <= 23)?;
    let minute = match parts.next() {
        Some(m) => m.parse::<u8>().ok().filter(|m| *m <= 59)?,
        None => 0,
    };
    Some((hour, minute))
}

const HELP_TEXT: &str = "\
🌱 reverie commands

/prompt — Get your next reflection prompt now
/prompt self — A Self-Awareness prompt
/prompt connections — A Connections prompt
/history — Your recent reflections
/schedule — Show your weekly delivery schedule
/schedule_day <0-6> — Change delivery day (0 = Sunday)
/schedule_time <hour> [minute] — Change delivery time (24h)
/schedule_toggle — Pause or resume weekly delivery
/help — Show this message

Anything else you write is saved to your journal as a reflection on \
your latest prompt.";

/// Sends prompts through the Telegram Bot API. User ids are Telegram chat
/// ids rendered as strings.
pub struct TelegramDelivery {
    bot: Bot,
}

impl TelegramDelivery {
    pub fn new(token: &str) -> Self {
        Self {
            bot: Bot::new(token),
        }
    }
}

#[async_trait]
impl PromptDelivery for TelegramDelivery {
    async fn send(&self, user_id: &str, text: &str) -> Result<(), EngineError> {
        let chat_id: i64 = user_id.parse().map_err(|_| EngineError::Delivery {
            user_id: user_id.to_string(),
            reason: "user id is not a chat id".to_string(),
        })?;
        self.bot
            .send_message(teloxide::types::ChatId(chat_id), text)
            .await
            .map_err(|e| EngineError::Delivery {
                user_id: user_id.to_string(),
                reason: e.to_string(),
            })?;
        Ok(())
    }
}

/// The bot command surface. Every command is a thin wrapper over the
/// engine and store contracts; the scheduled path goes through the same
/// `RotationEngine`, so rotation semantics are identical no matter which
/// surface asks.
pub struct TelegramChannel {
    token: String,
    engine: Arc<RotationEngine>,
    schedules: Arc<ScheduleStore>,
    progress: Arc<UserProgressStore>,
    journal: Arc<JournalStore>,
}

impl TelegramChannel {
    pub fn new(
        token: String,
        engine: Arc<RotationEngine>,
        schedules: Arc<ScheduleStore>,
        progress: Arc<UserProgressStore>,
        journal: Arc<JournalStore>,
    ) -> Self {
        Self {
            token,
            engine,
            schedules,
            progress,
            journal,
        }
    }

    async fn start_bot(&self) -> Result<()> {
        let bot_client = Bot::new(&self.token);

        let commands = vec![
            teloxide::types::BotCommand::new("prompt", "Get your next reflection prompt"),
            teloxide::types::BotCommand::new("history", "Show your recent reflections"),
            teloxide::types::BotCommand::new("schedule", "Show your weekly schedule"),
            teloxide::types::BotCommand::new("schedule_day", "Change delivery day"),
            teloxide::types::BotCommand::new("schedule_time", "Change delivery time"),
            teloxide::types::BotCommand::new("schedule_toggle", "Pause/resume delivery"),
            teloxide::types::BotCommand::new("help", "Show all available commands"),
        ];
        if let Err(e) = bot_client.set_my_commands(commands).await {
            error!("Failed to set telegram bot commands: {}", e);
        }

        let engine = self.engine.clone();
        let schedules = self.schedules.clone();
        let progress = self.progress.clone();
        let journal = self.journal.clone();

        tokio::spawn(async move {
            teloxide::repl(bot_client, move |bot: Bot, msg: Message| {
                let engine = engine.clone();
                let schedules = schedules.clone();
                let progress = progress.clone();
                let journal = journal.clone();
                async move {
                    let Some(text) = msg.text() else {
                        return Ok(());
                    };
                    let user_id = msg.chat.id.0.to_string();
                    let trimmed = text.trim();

                    if trimmed.starts_with("/start") {
                        match schedules.ensure(&user_id).await {
                            Ok(pref) => {
                                let welcome = format!(
                                    "🌱 Welcome to reverie!\n\nEvery {} at {:02}:{:02} I'll send \
                                     you a reflection prompt. Try /prompt for one right now, or \
                                     /help to see everything I can do.",
                                    day_name(pref.day_of_week),
                                    pref.hour,
                                    pref.minute
                                );
                                let _ = bot.send_message(msg.chat.id, welcome).await;
                            }
                            Err(e) => {
                                error!("Failed to set up schedule for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ Setup failed, try again later.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if trimmed == "/help" {
                        let _ = bot.send_message(msg.chat.id, HELP_TEXT).await;
                        return Ok(());
                    }

                    if trimmed == "/prompt" || trimmed.starts_with("/prompt ") {
                        let policy = match trimmed.strip_prefix("/prompt").map(str::trim) {
                            Some("") | None => CategoryPolicy::Alternate,
                            Some(arg) => match parse_category(arg) {
                                Some(category) => CategoryPolicy::Fixed(category),
                                None => {
                                    let _ = bot
                                        .send_message(
                                            msg.chat.id,
                                            "Usage: /prompt [self | connections]",
                                        )
                                        .await;
                                    return Ok(());
                                }
                            },
                        };

                        match engine.next_prompt_for(&user_id, policy).await {
                            Ok(assignment) => {
                                let reply = format!(
                                    "✨ {}\n\n{}\n\nReply right here to save your reflection.",
                                    assignment.category.label(),
                                    assignment.text
                                );
                                let _ = bot.send_message(msg.chat.id, reply).await;
                            }
                            Err(e) => {
                                error!("Prompt request failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(
                                        msg.chat.id,
                                        "❌ Couldn't fetch a prompt right now. Please try again \
                                         in a moment.",
                                    )
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if trimmed == "/schedule" {
                        match schedules.ensure(&user_id).await {
                            Ok(pref) => {
                                let status = if pref.enabled { "Enabled" } else { "Paused" };
                                let reply = format!(
                                    "⚙️ Weekly delivery\n\n📅 {} at {:02}:{:02}\n🔔 {}\n\nAdjust \
                                     with /schedule_day, /schedule_time, /schedule_toggle.",
                                    day_name(pref.day_of_week),
                                    pref.hour,
                                    pref.minute,
                                    status
                                );
                                let _ = bot.send_message(msg.chat.id, reply).await;
                            }
                            Err(e) => {
                                error!("Schedule lookup failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ Schedule unavailable right now.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if let Some(rest) = trimmed.strip_prefix("/schedule_day") {
                        let Some(day) = parse_day(rest) else {
                            let _ = bot
                                .send_message(
                                    msg.chat.id,
                                    "Usage: /schedule_day <0-6> (0 = Sunday)",
                                )
                                .await;
                            return Ok(());
                        };
                        match schedules.update(&user_id, |p| p.day_of_week = day).await {
                            Ok(_) => {
                                let _ = bot
                                    .send_message(
                                        msg.chat.id,
                                        format!("✅ Delivery day set to {}.", day_name(day)),
                                    )
                                    .await;
                            }
                            Err(e) => {
                                error!("Schedule update failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ Couldn't update your schedule.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if let Some(rest) = trimmed.strip_prefix("/schedule_time") {
                        let Some((hour, minute)) = parse_time(rest) else {
                            let _ = bot
                                .send_message(msg.chat.id, "Usage: /schedule_time <hour> [minute]")
                                .await;
                            return Ok(());
                        };
                        match schedules
                            .update(&user_id, |p| {
                                p.hour = hour;
                                p.minute = minute;
                            })
                            .await
                        {
                            Ok(_) => {
                                let _ = bot
                                    .send_message(
                                        msg.chat.id,
                                        format!(
                                            "✅ Delivery time set to {:02}:{:02}.",
                                            hour, minute
                                        ),
                                    )
                                    .await;
                            }
                            Err(e) => {
                                error!("Schedule update failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ Couldn't update your schedule.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if trimmed == "/schedule_toggle" {
                        match schedules.update(&user_id, |p| p.enabled = !p.enabled).await {
                            Ok(pref) => {
                                let reply = if pref.enabled {
                                    "🔔 Weekly delivery resumed."
                                } else {
                                    "🔕 Weekly delivery paused. /schedule_toggle to resume."
                                };
                                let _ = bot.send_message(msg.chat.id, reply).await;
                            }
                            Err(e) => {
                                error!("Schedule toggle failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ Couldn't update your schedule.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if trimmed == "/history" {
                        match journal.recent(&user_id, 5).await {
                            Ok(entries) if entries.is_empty() => {
                                let _ = bot
                                    .send_message(
                                        msg.chat.id,
                                        "📖 No reflections yet. Answer a /prompt to start your \
                                         journal.",
                                    )
                                    .await;
                            }
                            Ok(entries) => {
                                let lines: Vec<String> = entries
                                    .iter()
                                    .map(|e| {
                                        let preview: String =
                                            e.response.chars().take(120).collect();
                                        format!(
                                            "• {} ({}): {}",
                                            e.timestamp.format("%Y-%m-%d"),
                                            e.category.label(),
                                            preview
                                        )
                                    })
                                    .collect();
                                let reply =
                                    format!("📖 Recent reflections\n\n{}", lines.join("\n"));
                                let _ = bot.send_message(msg.chat.id, reply).await;
                            }
                            Err(e) => {
                                error!("History lookup failed for {}: {}", user_id, e);
                                let _ = bot
                                    .send_message(msg.chat.id, "❌ History unavailable right now.")
                                    .await;
                            }
                        }
                        return Ok(());
                    }

                    if trimmed.starts_with('/') {
                        let _ = bot
                            .send_message(msg.chat.id, "Unknown command. /help lists everything.")
                            .await;
                        return Ok(());
                    }

                    // Free text: save as a reflection on the user's latest prompt.
                    let last_prompt = match progress.get(&user_id).await {
                        Ok(p) => p.and_then(|p| p.last_prompt),
                        Err(e) => {
                            error!("Progress lookup failed for {}: {}", user_id, e);
                            let _ = bot
                                .send_message(msg.chat.id, "❌ Couldn't save that right now.")
                                .await;
                            return Ok(());
                        }
                    };
                    let Some(last_prompt) = last_prompt else {
                        let _ = bot
                            .send_message(
                                msg.chat.id,
                                "I don't have a prompt for you yet — try /prompt first.",
                            )
                            .await;
                        return Ok(());
                    };

                    let entry = JournalEntry {
                        user_id: user_id.clone(),
                        prompt: last_prompt.text,
                        response: trimmed.to_string(),
                        category: last_prompt.category,
                        timestamp: Utc::now(),
                    };
                    match journal.append(&entry).await {
                        Ok(()) => {
                            let _ = bot
                                .send_message(
                                    msg.chat.id,
                                    "🌿 Saved to your journal. See it any time with /history.",
                                )
                                .await;
                        }
                        Err(e) => {
                            error!("Journal write failed for {}: {}", user_id, e);
                            let _ = bot
                                .send_message(msg.chat.id, "❌ Couldn't save your reflection.")
                                .await;
                        }
                    }
                    Ok(())
                }
            })
            .await;
        });
        Ok(())
    }
}

#[async_trait]
impl LifecycleComponent for TelegramChannel {
    async fn on_init(&mut self) -> Result<()> {
        info!("Telegram channel initializing...");
        Ok(())
    }

    async fn on_start(&mut self) -> Result<()> {
        info!("Telegram channel starting...");
        if let Err(e) = self.start_bot().await {
            error!("Telegram bot crashed: {}", e);
        }
        Ok(())
    }

    async fn on_shutdown(&mut self) -> Result<()> {
        info!("Telegram channel shutting down...");
        Ok(())
    }
}
