#[cfg(test)]
#[path = "render_test.rs"]
mod tests;

use chrono::DateTime;
use chrono::NaiveDateTime;
use yansi::Color;
use yansi::Paint;

use crate::domain::models::AgentName;
use crate::domain::models::AgentUpdate;
use crate::domain::models::Plan;
use crate::domain::models::ResearchSession;
use crate::domain::models::SessionStatus;
use crate::domain::services::AgentSummary;

const DATE_FORMAT: &str = "%b %-d, %Y, %I:%M %p";
const SUMMARY_AGENTS: [AgentName; 4] = [
    AgentName::Manager,
    AgentName::Researcher,
    AgentName::Writer,
    AgentName::Critique,
];

/// Renders server timestamps as `Mar 1, 2024, 10:00 AM`. Naive timestamps are
/// shown as-is, zoned ones in UTC. Anything unparseable is returned unchanged.
pub fn format_date(date: &str) -> String {
    if date.is_empty() {
        return "".to_string();
    }

    if let Ok(parsed) = DateTime::parse_from_rfc3339(date) {
        return parsed.naive_utc().format(DATE_FORMAT).to_string();
    }

    if let Ok(parsed) = NaiveDateTime::parse_from_str(date, "%Y-%m-%dT%H:%M:%S%.f") {
        return parsed.format(DATE_FORMAT).to_string();
    }

    return date.to_string();
}

pub fn truncate(text: &str, length: usize) -> String {
    if text.chars().count() <= length {
        return text.to_string();
    }

    let head = text.chars().take(length).collect::<String>();
    return format!("{head}...");
}

pub fn status_badge(status: SessionStatus) -> String {
    return status.to_string().replace('_', " ").to_uppercase();
}

pub fn status_color(status: SessionStatus) -> Color {
    match status {
        SessionStatus::AwaitingApproval => return Color::Yellow,
        SessionStatus::Planning | SessionStatus::Researching => return Color::Blue,
        SessionStatus::Writing | SessionStatus::Completed => return Color::Green,
        SessionStatus::Reviewing => return Color::Magenta,
        SessionStatus::Failed => return Color::Red,
        SessionStatus::Pending | SessionStatus::Unknown => return Color::White,
    }
}

pub fn paint_status(status: SessionStatus) -> Paint<String> {
    return Paint::new(status_badge(status))
        .fg(status_color(status))
        .bold();
}

pub fn agent_icon(agent: AgentName) -> &'static str {
    match agent {
        AgentName::Manager => return "🔷",
        AgentName::Researcher => return "🔶",
        AgentName::Writer => return "🟢",
        AgentName::Critique => return "🔴",
        AgentName::Unknown => return "",
    }
}

pub fn agent_label(agent: AgentName) -> String {
    let name = agent.to_string();
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => return format!("{}{}", first.to_uppercase(), chars.as_str()),
        None => return name,
    }
}

pub fn action_label(action: &str) -> String {
    return action.replace('_', " ");
}

fn numbered(items: &[String], indent: &str) -> Vec<String> {
    return items
        .iter()
        .enumerate()
        .map(|(idx, item)| return format!("{indent}{}. {item}", idx + 1))
        .collect();
}

/// Multi-line card for a single agent update. Only the details present on the
/// update produce a line.
pub fn activity_card(update: &AgentUpdate) -> String {
    let details = &update.details;
    let header = format!(
        "{} {}",
        agent_icon(update.agent),
        agent_label(update.agent)
    );
    let mut lines = vec![format!(
        "{} • {}",
        header.trim(),
        action_label(&update.action)
    )];

    if let Some(message) = &details.message {
        lines.push(format!("  {message}"));
    }
    if let Some(section) = &details.section {
        lines.push(format!("  Section: {section}"));
    }
    if let Some(num_sources) = details.num_sources {
        lines.push(format!("  Sources found: {num_sources}"));
    }
    if let Some(word_count) = details.word_count {
        lines.push(format!("  Word count: {word_count}"));
    }
    if let Some(quality_score) = details.quality_score {
        lines.push(format!("  Quality score: {quality_score}/10"));
    }
    if let Some(feedback) = &details.feedback {
        lines.push(format!("  Feedback: {feedback}"));
    }
    if let Some(preview) = &details.preview {
        lines.push(format!("  \"{preview}\""));
    }
    if let Some(plan) = &details.plan {
        lines.push("  Research Plan:".to_string());
        lines.extend(numbered(&plan.sections, "    "));
    }
    if !details.sources.is_empty() {
        lines.push("  Sources:".to_string());
        for source in &details.sources {
            lines.push(format!("    • {} ({})", source.title, source.url));
        }
    }
    if let Some(revision_count) = details.revision_count {
        lines.push(format!("  Revision: {revision_count}"));
    }
    if details.has_issues == Some(false) {
        lines.push("  ✅ Section approved".to_string());
    }

    let date = format_date(&update.timestamp);
    if !date.is_empty() {
        lines.push(format!("  {date}"));
    }

    return lines.join("\n");
}

pub fn agent_summary_line(summary: &AgentSummary) -> String {
    return SUMMARY_AGENTS
        .iter()
        .map(|agent| {
            let count = summary
                .get(agent)
                .map(|activity| return activity.count)
                .unwrap_or_default();
            return format!("{}: {count}", agent_label(*agent));
        })
        .collect::<Vec<String>>()
        .join(" | ");
}

pub fn plan_panel(plan: &Plan) -> String {
    let mut lines = vec![
        "⏸️ Human Approval Required".to_string(),
        "A research plan is ready. Review it and approve to continue.".to_string(),
        "".to_string(),
        "Planned Research Sections:".to_string(),
    ];
    lines.extend(numbered(&plan.sections, "  "));

    if !plan.research_questions.is_empty() {
        lines.push("Research Questions:".to_string());
        lines.extend(
            plan.research_questions
                .iter()
                .map(|question| return format!("  - {question}")),
        );
    }

    if let Some(estimated_sources) = plan.estimated_sources {
        lines.push(format!("Estimated sources: {estimated_sources}"));
    }

    return lines.join("\n");
}

pub fn download_notice(session: &ResearchSession, report_url: &str) -> String {
    return format!(
        "Your PDF is Ready!\nYour research report for \"{}\"\n{report_url}",
        session.topic
    );
}

/// One line per session for listings.
pub fn session_line(session: &ResearchSession) -> String {
    let mut res = format!(
        "- (ID: {}) [{}]",
        session.id,
        status_badge(session.status)
    );

    let date = format_date(session.created_at.as_deref().unwrap_or_default());
    if !date.is_empty() {
        res = format!("{res} {date}");
    }

    let topic = session.topic.split('\n').next().unwrap_or_default();
    return format!("{res}, {}", truncate(topic, 70));
}

pub fn session_detail(session: &ResearchSession) -> String {
    let mut lines = vec![
        session.topic.to_string(),
        format!("ID: {}", session.id),
        format!("Status: {}", status_badge(session.status)),
    ];

    if let Some(created_at) = &session.created_at {
        lines.push(format!("Created: {}", format_date(created_at)));
    }
    if let Some(completed_at) = &session.completed_at {
        lines.push(format!("Completed: {}", format_date(completed_at)));
    }

    if let Some(plan) = &session.plan {
        let approval = if session.plan_approved {
            "approved"
        } else {
            "not approved"
        };
        lines.push("".to_string());
        lines.push(format!("Plan ({approval}):"));
        lines.extend(numbered(&plan.sections, "  "));
    }

    return lines.join("\n");
}
