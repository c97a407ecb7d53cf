//! Conversation command implementations.

use super::{format_timestamp, print_json, truncate, CommandContext};
use crate::cli::ConversationCommands;
use crate::error::Result;
use crate::model::{Conversation, MessageType};
use crate::validate::{parse_id, Page};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ListOutput {
    conversations: Vec<Conversation>,
    page: u32,
    per_page: u32,
    total: u64,
}

#[derive(Serialize)]
struct DeleteOutput {
    deleted: i64,
}

/// Execute conversation commands.
///
/// # Errors
///
/// Returns `Error::Validation` for bad ids or paging, `ConversationNotFound`
/// for unknown ids, or any storage failure.
pub fn execute(command: &ConversationCommands, ctx: &CommandContext) -> Result<()> {
    match command {
        ConversationCommands::List { page, per_page } => list(ctx, *page, *per_page),
        ConversationCommands::Show { id } => show(ctx, id),
        ConversationCommands::Delete { id } => delete(ctx, id),
    }
}

fn list(ctx: &CommandContext, page: u32, per_page: u32) -> Result<()> {
    let page = Page::new(page, per_page)?;
    let db = ctx.open_migrated()?;
    let conversations = db.list_conversations(page.limit(), page.offset())?;
    let total = db.count_conversations()?;

    if ctx.json {
        return print_json(&ListOutput {
            conversations,
            page: page.page,
            per_page: page.per_page,
            total,
        });
    }

    if conversations.is_empty() {
        println!("No conversations.");
        return Ok(());
    }

    for conv in &conversations {
        let title = conv.title.as_deref().unwrap_or(&conv.session_id);
        println!(
            "{} {} {}",
            format!("#{}", conv.id).cyan(),
            truncate(title, 60).bold(),
            format!(
                "[{} prompts, {} chars, {}]",
                conv.prompt_count,
                conv.total_characters,
                format_timestamp(conv.updated_at)
            )
            .dimmed()
        );
    }
    println!(
        "{}",
        format!("page {} of {} total", page.page, total).dimmed()
    );
    Ok(())
}

fn show(ctx: &CommandContext, raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id, "conversation_id")?;
    let db = ctx.open_migrated()?;
    let full = db.get_conversation_with_messages(id)?;

    if ctx.json {
        return print_json(&full);
    }

    let conv = &full.conversation;
    println!(
        "{} {}",
        format!("Conversation #{}", conv.id).cyan().bold(),
        conv.title.as_deref().unwrap_or("")
    );
    println!("  Session:  {}", conv.session_id);
    if let Some(dir) = &conv.working_directory {
        println!("  Workdir:  {dir}");
    }
    println!("  Created:  {}", format_timestamp(conv.created_at));
    println!("  Updated:  {}", format_timestamp(conv.updated_at));
    println!(
        "  Prompts:  {}  Characters: {}",
        conv.prompt_count, conv.total_characters
    );
    println!();

    for message in &full.messages {
        let label = match message.message_type {
            MessageType::Prompt => "prompt  ".yellow(),
            MessageType::Response => "response".green(),
        };
        let timing = message
            .execution_time
            .map(|ms| format!(" ({ms} ms)"))
            .unwrap_or_default();
        println!(
            "  {} {}{} {}",
            label,
            format_timestamp(message.timestamp).dimmed(),
            timing.dimmed(),
            truncate(&message.content, 100)
        );
    }
    Ok(())
}

fn delete(ctx: &CommandContext, raw_id: &str) -> Result<()> {
    let id = parse_id(raw_id, "conversation_id")?;
    let db = ctx.open_migrated()?;
    db.delete_conversation(id)?;

    if ctx.json {
        return print_json(&DeleteOutput { deleted: id });
    }
    println!("{} conversation #{id}", "Deleted".green().bold());
    Ok(())
}
