//! 规则模板：模型不可用、超时或输出为空时的确定性文案
//!
//! 同样的 (kind, context) 永远得到同样的文本，不依赖随机数或时钟。

use crate::engine::ScoredLabel;
use crate::generation::{GenerationContext, GenerationKind};

const LOW_MOODS: &[&str] = &[
    "sad", "anxious", "stressed", "tired", "angry", "lonely", "down", "overwhelmed", "low",
];

fn is_low(mood: &str) -> bool {
    let mood = mood.trim().to_lowercase();
    LOW_MOODS.iter().any(|m| *m == mood)
}

/// 用固定文本的字节和选一个变体，保证确定性
fn pick<'a>(options: &[&'a str], seed: &str) -> &'a str {
    let sum: usize = seed.bytes().map(usize::from).sum();
    options[sum % options.len()]
}

pub fn fallback_text(kind: GenerationKind, user_text: &str, ctx: &GenerationContext) -> String {
    match kind {
        GenerationKind::Reflection => reflection(user_text, ctx),
        GenerationKind::JournalPrompt => journal_prompt(ctx),
        GenerationKind::GoalSuggestion => goal_suggestion(ctx),
        GenerationKind::WeeklySummary => weekly_summary(ctx),
        GenerationKind::MoodInsight => mood_insight(ctx),
    }
}

fn reflection(user_text: &str, ctx: &GenerationContext) -> String {
    let opener = match ctx.mood.as_deref() {
        Some(m) if is_low(m) => format!("It sounds like today felt {m}, and that is okay to name."),
        Some(m) => format!("Thank you for sharing a {m} moment."),
        None => "Thank you for taking a moment to write this down.".to_string(),
    };
    let closer = pick(
        &[
            "What is one small thing that helped, even a little?",
            "Noticing how you feel is a meaningful step.",
            "Be as kind to yourself as you would be to a friend.",
        ],
        user_text,
    );
    format!("{opener} {closer}")
}

fn journal_prompt(ctx: &GenerationContext) -> String {
    if let Some(goal) = ctx.goals.first() {
        return format!("What is one step you took toward \"{goal}\" recently, and how did it feel?");
    }
    match ctx.mood.as_deref() {
        Some(m) if is_low(m) => "What would make the next hour a little easier for you?".to_string(),
        Some(_) => "What is something you are looking forward to this week?".to_string(),
        None => "What is on your mind right now?".to_string(),
    }
}

fn goal_suggestion(ctx: &GenerationContext) -> String {
    let low = ctx.mood.as_deref().map(is_low).unwrap_or(false);
    if low {
        return "Try a five-minute walk or a short breathing break once a day this week.".to_string();
    }
    if let Some(goal) = ctx.goals.first() {
        return format!("Pick one day this week to make a small, specific step toward \"{goal}\".");
    }
    if ctx.streak_days >= 3 {
        return format!(
            "You have journaled {} days in a row. Aim to keep the streak going with a two-minute entry each evening.",
            ctx.streak_days
        );
    }
    "Set aside ten quiet minutes this week to write about something that matters to you.".to_string()
}

fn weekly_summary(ctx: &GenerationContext) -> String {
    let mut parts = Vec::new();
    parts.push(match ctx.entry_count {
        0 => "You did not write this week, and that is fine. You can start again any time.".to_string(),
        1 => "You wrote one entry this week.".to_string(),
        n => format!("You wrote {n} entries this week."),
    });
    if let Some(mood) = ctx.dominant_mood() {
        parts.push(format!("The mood that came up most often was \"{mood}\"."));
    }
    if ctx.streak_days > 0 {
        parts.push(format!("Your current streak is {} days.", ctx.streak_days));
    }
    parts.push("Showing up for yourself counts.".to_string());
    parts.join(" ")
}

fn mood_insight(ctx: &GenerationContext) -> String {
    match ctx.dominant_mood().or(ctx.mood.as_deref()) {
        Some(m) if is_low(m) => format!(
            "\"{m}\" has come up lately. Gentle routines like rest, movement and connection can help."
        ),
        Some(m) => format!("\"{m}\" has come up lately. Keep noticing what supports that feeling."),
        None => "Log a few moods to start seeing patterns over time.".to_string(),
    }
}

/// 分类模型的最高标签转成洞察文案
pub fn insight_from_label(label: &ScoredLabel) -> String {
    let confidence = if label.score >= 0.8 { "clearly" } else { "somewhat" };
    match label.label.to_uppercase().as_str() {
        "POSITIVE" => format!("Your recent writing feels {confidence} positive. Notice what is going well."),
        "NEGATIVE" => format!(
            "Your recent writing feels {confidence} heavy. It may help to slow down and care for yourself."
        ),
        other => format!("Your recent writing leans {}.", other.to_lowercase()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_every_kind_has_fallback() {
        let ctx = GenerationContext::default();
        for kind in GenerationKind::ALL {
            assert!(!fallback_text(kind, "", &ctx).trim().is_empty(), "{kind}");
        }
    }

    #[test]
    fn test_fallbacks_are_deterministic() {
        let ctx = GenerationContext::default()
            .with_mood("tired")
            .with_recent_moods(["tired", "calm", "tired"])
            .with_entry_count(3)
            .with_streak(5);
        for kind in GenerationKind::ALL {
            assert_eq!(
                fallback_text(kind, "long day", &ctx),
                fallback_text(kind, "long day", &ctx)
            );
        }
    }

    #[test]
    fn test_weekly_summary_uses_context() {
        let ctx = GenerationContext::default()
            .with_recent_moods(["calm", "calm", "tired"])
            .with_entry_count(3)
            .with_streak(6);
        let s = fallback_text(GenerationKind::WeeklySummary, "", &ctx);
        assert!(s.contains("3 entries"));
        assert!(s.contains("\"calm\""));
        assert!(s.contains("6 days"));
    }

    #[test]
    fn test_goal_suggestion_prefers_gentle_goal_when_low() {
        let ctx = GenerationContext::default().with_mood("Anxious").with_goals(["run 10k"]);
        let s = fallback_text(GenerationKind::GoalSuggestion, "", &ctx);
        assert!(s.contains("walk"));
        let ctx = GenerationContext::default().with_mood("happy").with_goals(["run 10k"]);
        assert!(fallback_text(GenerationKind::GoalSuggestion, "", &ctx).contains("run 10k"));
    }

    #[test]
    fn test_insight_from_label() {
        let pos = ScoredLabel { label: "POSITIVE".into(), score: 0.95 };
        assert!(insight_from_label(&pos).contains("clearly positive"));
        let neg = ScoredLabel { label: "negative".into(), score: 0.6 };
        assert!(insight_from_label(&neg).contains("somewhat heavy"));
    }
}
