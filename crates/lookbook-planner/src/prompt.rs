//! Prompt construction for planning and summarizing.

use std::fmt::Write as _;

use lookbook_core::types::{ChatTurn, FusedResult};

pub const PLANNER_INSTRUCTIONS: &str = r#"You are a fashion search query planner. Your job is to analyze user queries and create an optimal search plan.

Given a user's message and whether they uploaded an image, you must output a JSON object with:
1. refined_queries: Array of 1-3 text queries to search (decompose complex queries, add synonyms)
2. use_image: Boolean - whether to use image-based search
3. text_weight: Float 0-1 - how much to weight text vs image results (0.5 = equal, 1.0 = text only)
4. top_k: Integer 10-50 - how many results to retrieve per modality
5. filters: Optional object of strict attribute filters. Keys: "color", "category". Extract ONLY if explicitly mentioned.
6. reasoning: Brief explanation of your strategy

Examples:

Query: "black midi dress for a summer wedding"
{
  "refined_queries": ["black midi dress", "summer wedding dress", "elegant black dress"],
  "use_image": false,
  "text_weight": 1.0,
  "top_k": 20,
  "filters": {"color": "black", "category": "dress"},
  "reasoning": "User specified color 'black', apply strict filter."
}

Query: "same style but in red" [with image]
{
  "refined_queries": ["red dress", "red clothing"],
  "use_image": true,
  "text_weight": 0.3,
  "top_k": 20,
  "filters": {"color": "red"},
  "reasoning": "User wants image-based search with color modification."
}

Query: "casual summer outfit" [with image]
{
  "refined_queries": ["casual summer outfit", "lightweight summer clothing"],
  "use_image": true,
  "text_weight": 0.5,
  "top_k": 25,
  "filters": null,
  "reasoning": "No specific color or category constraints."
}

Output ONLY valid JSON, no additional text."#;

/// Planner prompt: instructions, the trailing `history_turns` turns, then the query line.
pub fn planning_prompt(text: &str, has_image: bool, history: &[ChatTurn], history_turns: usize) -> String {
    let mut out = String::with_capacity(PLANNER_INSTRUCTIONS.len() + 256);
    out.push_str(PLANNER_INSTRUCTIONS);
    out.push_str("\n\n");
    let recent = &history[history.len().saturating_sub(history_turns)..];
    if !recent.is_empty() {
        out.push_str("Previous conversation:\n");
        for turn in recent {
            let _ = writeln!(out, "{}: {}", turn.role, turn.content);
        }
        out.push('\n');
    }
    let _ = write!(out, "Query: \"{}\"", text);
    if has_image {
        out.push_str(" [with image]");
    }
    out
}

/// Results shown to the summarizer.
pub const SUMMARY_PREVIEW: usize = 5;
const DESCRIPTION_PREVIEW_CHARS: usize = 100;

pub fn summary_prompt(query_text: &str, results: &[FusedResult]) -> String {
    let mut listed = String::new();
    for (i, r) in results.iter().take(SUMMARY_PREVIEW).enumerate() {
        let head: String = r.description.chars().take(DESCRIPTION_PREVIEW_CHARS).collect();
        let _ = writeln!(listed, "{}. {}... (relevance: {:.2})", i + 1, head, r.combined_score);
    }
    format!(
        r#"You are a helpful fashion shopping assistant. Given search results, write a 2-3 sentence summary of what was found.

Guidelines:
- Be concise, engaging, and helpful (max 3 sentences)
- Highlight the diversity of styles, colors, and key features found
- Mention the total number of results found in a natural way
- Do NOT list individual products or use bullet points

User query: "{query_text}"

Top results:
{listed}
Total results: {total}

Write a brief summary of what was found:"#,
        total = results.len()
    )
}
