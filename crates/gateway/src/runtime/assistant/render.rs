//! Deterministic rendering: history windows, memory/tool summaries for
//! the compose prompt, and direct answers for intents whose tool output
//! already says everything (those skip the LLM entirely).

use serde_json::Value;

use wf_domain::chat::{Role, StoredMessage};
use wf_domain::memory::MemoryItem;

use crate::runtime::assistant::router::Intent;
use crate::tools::ToolInvocation;

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Prompt blocks
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Recent rounds rendered as a compact block for the compose prompt.
pub fn history_block(history: &[StoredMessage], max_rounds: usize) -> String {
    let keep = history.len().saturating_sub(max_rounds * 2);
    let mut out = String::new();
    for msg in &history[keep..] {
        let tag = match msg.role {
            Role::User => "User",
            Role::Assistant => "Assistant",
            Role::System => "System",
        };
        out.push_str(tag);
        out.push_str(": ");
        out.push_str(truncate(&msg.content, 300));
        out.push('\n');
    }
    out
}

/// Slot-summarize retrieved memories, deduplicated by text.
pub fn memory_block(memories: &[MemoryItem]) -> String {
    let mut seen = std::collections::HashSet::new();
    let mut out = String::new();
    for item in memories {
        let text = item.text.trim();
        if text.is_empty() || !seen.insert(text) {
            continue;
        }
        out.push_str("- ");
        out.push_str(truncate(text, 200));
        out.push('\n');
    }
    out
}

/// Canonicalize tool outcomes into a uniform context block; failed tools
/// become explicit gap notes the answer must acknowledge.
pub fn tool_results_block(invocations: &[ToolInvocation]) -> String {
    let mut out = String::new();
    for inv in invocations {
        if inv.ok {
            out.push_str(&format!("[{}]\n{}\n", inv.name, compact(&inv.outcome)));
        } else {
            let reason = inv.outcome["error"].as_str().unwrap_or("failed");
            out.push_str(&format!(
                "[{}] unavailable ({}) — acknowledge this gap.\n",
                inv.name,
                truncate(reason, 120)
            ));
        }
    }
    out
}

fn compact(value: &Value) -> String {
    truncate(&value.to_string(), 2000).to_owned()
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Deterministic answers
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// When a single factual tool result fully answers the intent, compose
/// the reply without the LLM. `None` means the LLM is needed.
pub fn deterministic_answer(intent: Intent, invocations: &[ToolInvocation]) -> Option<String> {
    match intent {
        Intent::PoiNearby => {
            let inv = invocations.iter().find(|i| i.name == "poi_around" && i.ok)?;
            let items = inv.outcome["items"].as_array()?;
            if items.is_empty() {
                return Some(
                    "I couldn't find any matching places nearby. Try widening the \
                     radius or a different category."
                        .into(),
                );
            }
            let mut lines = vec!["Here's what I found nearby:".to_owned()];
            for item in items.iter().take(5) {
                let name = item["name"].as_str().unwrap_or("(unnamed)");
                let mut line = format!("- {name}");
                if let Some(distance) = item["distance_m"].as_f64() {
                    line.push_str(&format!(" (~{}m away", distance.round() as i64));
                    if let Some(rating) = item["rating"].as_f64() {
                        line.push_str(&format!(", rated {rating:.1}"));
                    }
                    line.push(')');
                } else if let Some(rating) = item["rating"].as_f64() {
                    line.push_str(&format!(" (rated {rating:.1})"));
                }
                lines.push(line);
            }
            Some(lines.join("\n"))
        }
        Intent::Weather => {
            let inv = invocations.iter().find(|i| i.name == "weather_area" && i.ok)?;
            let results = inv.outcome["results"].as_array()?;
            let mut lines = Vec::new();
            for result in results {
                let location = result["location"].as_str().unwrap_or("there");
                for entry in result["entries"].as_array().into_iter().flatten() {
                    let condition = entry["condition"].as_str().unwrap_or("unknown");
                    let low = entry["temp_low_c"].as_i64().unwrap_or(0);
                    let high = entry["temp_high_c"].as_i64().unwrap_or(0);
                    let day = match entry["day_offset"].as_u64() {
                        Some(0) | None => String::new(),
                        Some(1) => " tomorrow".into(),
                        Some(n) => format!(" in {n} days"),
                    };
                    lines.push(format!(
                        "{location}{day}: {condition}, {low}–{high}°C"
                    ));
                }
            }
            (!lines.is_empty()).then(|| lines.join("\n"))
        }
        _ => None,
    }
}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use serde_json::json;
    use wf_domain::trace::ToolTrace;

    fn msg(role: Role, content: &str) -> StoredMessage {
        StoredMessage {
            id: 1,
            session_id: "s".into(),
            role,
            content: content.into(),
            tokens: None,
            created_at: Utc::now(),
            meta: Value::Null,
        }
    }

    fn invocation(name: &str, ok: bool, outcome: Value) -> ToolInvocation {
        ToolInvocation {
            name: name.into(),
            ok,
            outcome,
            trace: ToolTrace::ok(name, None, Value::Null),
        }
    }

    #[test]
    fn history_block_windows_rounds() {
        let history = vec![
            msg(Role::User, "q1"),
            msg(Role::Assistant, "a1"),
            msg(Role::User, "q2"),
            msg(Role::Assistant, "a2"),
        ];
        let block = history_block(&history, 1);
        assert!(!block.contains("q1"));
        assert!(block.contains("User: q2"));
        assert!(block.contains("Assistant: a2"));
    }

    #[test]
    fn memory_block_dedups() {
        let items = vec![
            MemoryItem {
                id: "1".into(),
                text: "likes museums".into(),
                score: 1.0,
                metadata: Value::Null,
            },
            MemoryItem {
                id: "2".into(),
                text: "likes museums".into(),
                score: 0.9,
                metadata: Value::Null,
            },
        ];
        let block = memory_block(&items);
        assert_eq!(block.matches("likes museums").count(), 1);
    }

    #[test]
    fn failed_tools_render_as_gaps() {
        let invs = vec![invocation(
            "weather_area",
            false,
            json!({"status": "failed", "error": "timeout"}),
        )];
        let block = tool_results_block(&invs);
        assert!(block.contains("unavailable"));
        assert!(block.contains("acknowledge this gap"));
    }

    #[test]
    fn poi_list_answers_without_llm() {
        let invs = vec![invocation(
            "poi_around",
            true,
            json!({"items": [
                {"name": "Noodle House", "distance_m": 120.0, "rating": 4.5},
                {"name": "Dim Sum Place", "distance_m": 300.0},
            ]}),
        )];
        let answer = deterministic_answer(Intent::PoiNearby, &invs).unwrap();
        assert!(answer.contains("Noodle House"));
        assert!(answer.contains("~120m"));
        assert!(answer.contains("4.5"));
    }

    #[test]
    fn empty_poi_list_still_answers() {
        let invs = vec![invocation("poi_around", true, json!({"items": []}))];
        let answer = deterministic_answer(Intent::PoiNearby, &invs).unwrap();
        assert!(answer.contains("couldn't find"));
    }

    #[test]
    fn weather_summary_is_deterministic() {
        let invs = vec![invocation(
            "weather_area",
            true,
            json!({"results": [{
                "location": "Guangzhou",
                "entries": [
                    {"condition": "sunny", "temp_low_c": 18, "temp_high_c": 26, "day_offset": 0},
                    {"condition": "showers", "temp_low_c": 17, "temp_high_c": 22, "day_offset": 1},
                ]
            }]}),
        )];
        let answer = deterministic_answer(Intent::Weather, &invs).unwrap();
        assert!(answer.contains("Guangzhou: sunny"));
        assert!(answer.contains("tomorrow: showers"));
    }

    #[test]
    fn general_qa_needs_the_llm() {
        assert!(deterministic_answer(Intent::GeneralQa, &[]).is_none());
        // A failed tool also forces the LLM path.
        let invs = vec![invocation("poi_around", false, json!({"status": "failed"}))];
        assert!(deterministic_answer(Intent::PoiNearby, &invs).is_none());
    }
}
