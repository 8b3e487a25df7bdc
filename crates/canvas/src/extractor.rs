//! Fenced-code extraction.
//!
//! Splits message text into prose, code and chart fragments, then folds the
//! code fragments of each language into one [`CodeEntry`].  The scan is line
//! based: a fence opens on a line starting with three or more backticks and
//! closes on a line holding at least as many backticks and nothing else.  A
//! fence that never closes is prose.

use chrono::Utc;
use once_cell::sync::Lazy;
use regex::Regex;

use dc_domain::code::CodeEntry;
use dc_domain::message::Message;

/// Attribution used when neither a marker nor the message names an agent.
pub const DEFAULT_AGENT: &str = "AI";

/// `<!-- agent: Name -->`, `**Agent: Name**`, `[Agent: Name]` on a line of
/// their own.
static AGENT_MARKER: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)^\s*(?:<!--\s*agent:\s*(?P<a>[^>]+?)\s*-->|\*\*agent:\s*(?P<b>[^*]+?)\s*\*\*|\[agent:\s*(?P<c>[^\]]+?)\s*\])\s*$",
    )
    .expect("agent marker regex is valid")
});

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Fragments
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Fragment {
    Prose(String),
    Code {
        language: String,
        body: String,
        agent: String,
    },
    /// Body of a fence tagged with the chart language, left for the chart
    /// renderer.
    Chart(String),
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Extractor
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// Pure, stateless text → [`CodeEntry`] transformation.
#[derive(Debug, Clone)]
pub struct CodeBlockExtractor {
    chart_language: String,
}

impl Default for CodeBlockExtractor {
    fn default() -> Self {
        Self::new("chart")
    }
}

impl CodeBlockExtractor {
    pub fn new(chart_language: impl Into<String>) -> Self {
        Self {
            chart_language: chart_language.into().to_ascii_lowercase(),
        }
    }

    /// Split `text` into ordered fragments.  `default_agent` attributes code
    /// that no marker precedes.
    pub fn fragments(&self, text: &str, default_agent: &str) -> Vec<Fragment> {
        let lines: Vec<&str> = text.split('\n').collect();
        let mut out = Vec::new();
        let mut prose: Vec<&str> = Vec::new();
        let mut agent = default_agent.to_owned();
        let mut i = 0;

        while i < lines.len() {
            let line = lines[i];
            let Some((ticks, info)) = fence_open(line) else {
                if let Some(name) = agent_marker(line) {
                    agent = name;
                }
                prose.push(line);
                i += 1;
                continue;
            };

            let Some(close) = (i + 1..lines.len()).find(|&j| fence_close(lines[j], ticks)) else {
                // Unterminated: everything from here on is prose.
                prose.extend_from_slice(&lines[i..]);
                break;
            };

            flush_prose(&mut prose, &mut out);
            let body = lines[i + 1..close].join("\n").trim_end_matches(['\n', '\r']).to_owned();
            let language = normalize_language(info);
            if language == self.chart_language {
                out.push(Fragment::Chart(body));
            } else {
                out.push(Fragment::Code {
                    language,
                    body,
                    agent: agent.clone(),
                });
            }
            i = close + 1;
        }

        flush_prose(&mut prose, &mut out);
        out
    }

    /// Extract one entry per language from `messages`, keyed by `key`.
    ///
    /// Only assistant messages contribute.  Blocks of one language are
    /// concatenated in source order; when more than one block contributes,
    /// each gets a banner naming its agent.
    pub fn extract(&self, messages: &[Message], key: &str) -> Vec<CodeEntry> {
        let mut groups: Vec<LanguageGroup> = Vec::new();

        for message in messages.iter().filter(|m| m.is_assistant()) {
            let Some(text) = message.text.as_text() else {
                continue;
            };
            let default_agent = message.agent.as_deref().unwrap_or(DEFAULT_AGENT);
            for fragment in self.fragments(text, default_agent) {
                let Fragment::Code {
                    language,
                    body,
                    agent,
                } = fragment
                else {
                    continue;
                };
                match groups.iter_mut().find(|g| g.language == language) {
                    Some(g) => g.blocks.push((agent, body)),
                    None => groups.push(LanguageGroup {
                        language,
                        blocks: vec![(agent, body)],
                    }),
                }
            }
        }

        let source_message_id = match messages {
            [only] => only.id.clone(),
            _ => None,
        };
        let now = Utc::now();

        groups
            .into_iter()
            .map(|g| {
                let agents = g.agents();
                CodeEntry {
                    id: entry_id(key, &g.language),
                    title: title(&g.language, &agents),
                    code: g.render(),
                    language: g.language,
                    message_key: key.to_owned(),
                    source_message_id: source_message_id.clone(),
                    created_at: now,
                    is_executing: false,
                    agents,
                }
            })
            .collect()
    }

    /// Pick the most recent assistant message that bears code and extract it.
    ///
    /// Returns the message key used alongside the entries.  The key is the
    /// message's backend id, or `msg-{index}` while it has none.
    pub fn extract_latest(&self, messages: &[Message]) -> Option<(String, Vec<CodeEntry>)> {
        messages
            .iter()
            .enumerate()
            .rev()
            .filter(|(_, m)| m.is_assistant())
            .find_map(|(index, m)| {
                let key = message_key(m, index);
                let entries = self.extract(std::slice::from_ref(m), &key);
                (!entries.is_empty()).then_some((key, entries))
            })
    }

    /// Whether `text` contains at least one closed, non-chart code fence.
    pub fn has_code(&self, text: &str) -> bool {
        self.fragments(text, DEFAULT_AGENT)
            .iter()
            .any(|f| matches!(f, Fragment::Code { .. }))
    }
}

/// Key outputs and entries are indexed by for the message at `index`.
pub fn message_key(message: &Message, index: usize) -> String {
    match &message.id {
        Some(id) if !id.is_empty() => id.clone(),
        _ => positional_key(index),
    }
}

pub fn positional_key(index: usize) -> String {
    format!("msg-{index}")
}

pub fn entry_id(key: &str, language: &str) -> String {
    format!("{key}:{language}")
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Grouping
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

struct LanguageGroup {
    language: String,
    /// `(agent, body)` in encounter order.
    blocks: Vec<(String, String)>,
}

impl LanguageGroup {
    fn agents(&self) -> Vec<String> {
        let mut agents: Vec<String> = Vec::new();
        for (agent, _) in &self.blocks {
            if !agents.contains(agent) {
                agents.push(agent.clone());
            }
        }
        agents
    }

    fn render(&self) -> String {
        if let [(_, body)] = self.blocks.as_slice() {
            return body.clone();
        }
        let prefix = comment_prefix(&self.language);
        self.blocks
            .iter()
            .map(|(agent, body)| {
                format!("{prefix} ── {agent} ──\n{body}\n{prefix} ── end {agent} ──")
            })
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

fn title(language: &str, agents: &[String]) -> String {
    let mut chars = language.chars();
    let pretty = match chars.next() {
        Some(c) => c.to_uppercase().chain(chars).collect::<String>(),
        None => String::new(),
    };
    match agents {
        [] => format!("{pretty} code"),
        [one] if one == DEFAULT_AGENT => format!("{pretty} code"),
        _ => format!("{pretty} code ({})", agents.join(", ")),
    }
}

fn comment_prefix(language: &str) -> &'static str {
    match language {
        "sql" | "lua" | "haskell" => "--",
        "javascript" | "typescript" | "js" | "ts" | "java" | "c" | "cpp" | "rust" | "go"
        | "kotlin" | "swift" | "scala" => "//",
        "matlab" | "latex" | "tex" => "%",
        _ => "#",
    }
}

// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━
// Line classification
// ━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━

/// `Some((backtick count, info string))` for an opening fence line.
fn fence_open(line: &str) -> Option<(usize, &str)> {
    let trimmed = line.trim_start();
    let ticks = trimmed.chars().take_while(|&c| c == '`').count();
    if ticks < 3 {
        return None;
    }
    let info = trimmed[ticks..].trim();
    // An info string may not contain backticks (that is inline code).
    if info.contains('`') {
        return None;
    }
    Some((ticks, info))
}

fn fence_close(line: &str, open_ticks: usize) -> bool {
    let trimmed = line.trim();
    trimmed.len() >= open_ticks && trimmed.chars().all(|c| c == '`')
}

fn agent_marker(line: &str) -> Option<String> {
    let caps = AGENT_MARKER.captures(line)?;
    ["a", "b", "c"]
        .iter()
        .find_map(|g| caps.name(g))
        .map(|m| m.as_str().trim().to_owned())
        .filter(|s| !s.is_empty())
}

/// Lowercased first word of the info string, with common aliases folded.
pub fn normalize_language(info: &str) -> String {
    let word = info
        .split(|c: char| c.is_whitespace() || c == '{' || c == ',')
        .next()
        .unwrap_or("")
        .to_ascii_lowercase();
    match word.as_str() {
        "" => "text".into(),
        "py" | "py3" | "python3" | "ipython" => "python".into(),
        "js" => "javascript".into(),
        "ts" => "typescript".into(),
        "sh" | "shell" | "zsh" => "bash".into(),
        _ => word,
    }
}

fn flush_prose(prose: &mut Vec<&str>, out: &mut Vec<Fragment>) {
    if prose.is_empty() {
        return;
    }
    let text = prose.join("\n");
    prose.clear();
    if !text.trim().is_empty() {
        out.push(Fragment::Prose(text));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ex() -> CodeBlockExtractor {
        CodeBlockExtractor::default()
    }

    /// Entries minus their timestamp, for comparisons across calls.
    fn shape(entries: &[CodeEntry]) -> Vec<(String, String, String)> {
        entries
            .iter()
            .map(|e| (e.id.clone(), e.language.clone(), e.code.clone()))
            .collect()
    }

    #[test]
    fn no_code_yields_no_entries() {
        let msg = Message::assistant("Just prose, with `inline` code.").with_id("m1");
        assert!(ex().extract(&[msg], "m1").is_empty());
    }

    #[test]
    fn single_python_block() {
        let msg = Message::assistant("Here:\n```python\nprint(1)\n```\nDone.").with_id("m1");
        let entries = ex().extract(&[msg], "m1");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].language, "python");
        assert_eq!(entries[0].code, "print(1)");
        assert_eq!(entries[0].id, "m1:python");
        assert_eq!(entries[0].source_message_id.as_deref(), Some("m1"));
    }

    #[test]
    fn blocks_group_by_language_in_encounter_order() {
        let text = "```sql\nSELECT 1\n```\n```python\na = 1\n```\ntext\n```py\nb = 2\n```";
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].language, "sql");
        assert_eq!(entries[1].language, "python");
        let code = &entries[1].code;
        let a = code.find("a = 1").unwrap();
        let b = code.find("b = 2").unwrap();
        assert!(a < b);
        assert!(code.contains("# ── AI ──"));
        assert!(code.contains("# ── end AI ──"));
    }

    #[test]
    fn agent_markers_attribute_following_blocks() {
        let text = "<!-- agent: Loader -->\n```python\nload()\n```\n**Agent: Plotter**\n```python\nplot()\n```";
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].agents, vec!["Loader", "Plotter"]);
        assert!(entries[0].code.contains("# ── Loader ──\nload()"));
        assert!(entries[0].code.contains("# ── Plotter ──\nplot()"));
        assert_eq!(entries[0].title, "Python code (Loader, Plotter)");
    }

    #[test]
    fn message_agent_is_the_default_attribution() {
        let msg = Message::assistant("```sql\nSELECT 1\n```").with_agent("SqlAgent");
        let entries = ex().extract(&[msg], "k");
        assert_eq!(entries[0].agents, vec!["SqlAgent"]);
    }

    #[test]
    fn sql_banners_use_sql_comments() {
        let text = "```sql\nSELECT 1\n```\n```sql\nSELECT 2\n```";
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert!(entries[0].code.starts_with("-- ── AI ──"));
    }

    #[test]
    fn unterminated_fence_is_prose() {
        let text = "Start\n```python\nprint(1)\nno closing fence";
        let frags = ex().fragments(text, DEFAULT_AGENT);
        assert_eq!(frags, vec![Fragment::Prose(text.into())]);
        assert!(ex().extract(&[Message::assistant(text)], "k").is_empty());
    }

    #[test]
    fn closed_block_before_unterminated_one_survives() {
        let text = "```python\nok()\n```\n```python\nbroken(";
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].code, "ok()");
    }

    #[test]
    fn chart_fences_are_skipped() {
        let text = "```chart\n{\"data\": []}\n```\n```python\nx = 1\n```";
        let frags = ex().fragments(text, DEFAULT_AGENT);
        assert!(matches!(frags[0], Fragment::Chart(_)));
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].language, "python");
    }

    #[test]
    fn user_messages_are_ignored() {
        let msg = Message::user("```python\nprint(1)\n```");
        assert!(ex().extract(&[msg], "k").is_empty());
    }

    #[test]
    fn extraction_is_idempotent() {
        let msg = Message::assistant("```python\nprint(1)\n```\n```r\nx <- 1\n```");
        let first = ex().extract(std::slice::from_ref(&msg), "k");
        let second = ex().extract(std::slice::from_ref(&msg), "k");
        assert_eq!(shape(&first), shape(&second));
    }

    #[test]
    fn latest_assistant_message_with_code_wins() {
        let messages = vec![
            Message::assistant("```python\nold()\n```").with_id("m1"),
            Message::user("thanks"),
            Message::assistant("```python\nnew()\n```"),
            Message::assistant("no code here").with_id("m4"),
        ];
        let (key, entries) = ex().extract_latest(&messages).unwrap();
        assert_eq!(key, "msg-2");
        assert_eq!(entries[0].code, "new()");
        assert_eq!(entries[0].id, "msg-2:python");
    }

    #[test]
    fn longer_fence_contains_shorter_ones() {
        let text = "````markdown\n```python\ninner\n```\n````";
        let entries = ex().extract(&[Message::assistant(text)], "k");
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].language, "markdown");
        assert_eq!(entries[0].code, "```python\ninner\n```");
    }

    #[test]
    fn language_aliases_fold() {
        assert_eq!(normalize_language("py"), "python");
        assert_eq!(normalize_language("Python3 title=\"x\""), "python");
        assert_eq!(normalize_language(""), "text");
    }
}
