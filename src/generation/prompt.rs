//! 按生成类型拼装模型输入
//!
//! 生成模型是小型 text2text 模型，指令保持短句、单一任务；
//! 情绪洞察直接把用户文本交给分类模型。

use crate::generation::{GenerationContext, GenerationKind};

/// 送入模型前的用户文本上限（字符）
const MAX_USER_CHARS: usize = 1200;

fn clip(text: &str) -> &str {
    let text = text.trim();
    match text.char_indices().nth(MAX_USER_CHARS) {
        Some((idx, _)) => &text[..idx],
        None => text,
    }
}

fn context_lines(ctx: &GenerationContext) -> String {
    let mut lines = Vec::new();
    if let Some(mood) = &ctx.mood {
        lines.push(format!("Current mood: {mood}."));
    }
    if !ctx.recent_moods.is_empty() {
        lines.push(format!("Recent moods: {}.", ctx.recent_moods.join(", ")));
    }
    if !ctx.goals.is_empty() {
        lines.push(format!("Goals: {}.", ctx.goals.join("; ")));
    }
    if ctx.streak_days > 0 {
        lines.push(format!("Journaling streak: {} days.", ctx.streak_days));
    }
    if !ctx.tags.is_empty() {
        lines.push(format!("Topics: {}.", ctx.tags.join(", ")));
    }
    lines.join("\n")
}

pub fn build_prompt(kind: GenerationKind, user_text: &str, ctx: &GenerationContext) -> String {
    let entry = clip(user_text);
    let context = context_lines(ctx);
    let instruction = match kind {
        GenerationKind::MoodInsight => return entry.to_string(),
        GenerationKind::Reflection => {
            "Write a warm, brief reflection (two sentences) on this journal entry. \
             Do not give medical advice."
        }
        GenerationKind::JournalPrompt => {
            "Write one gentle, open-ended question that invites the writer to keep journaling."
        }
        GenerationKind::GoalSuggestion => {
            "Suggest one small, concrete wellness goal for this week that fits the writer."
        }
        GenerationKind::WeeklySummary => {
            "Summarize the writer's week in three kind sentences, noting patterns in mood."
        }
    };

    let mut prompt = String::from(instruction);
    if !context.is_empty() {
        prompt.push_str("\n\n");
        prompt.push_str(&context);
    }
    if !entry.is_empty() {
        prompt.push_str("\n\nEntry: ");
        prompt.push_str(entry);
    }
    prompt
}
