//! Attempt records and file renderers shared by the evaluator sinks.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::attempt::Attempt;
use crate::error::EvalError;

/// The flattened view of an attempt written to JSONL/JSON/HTML outputs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub id: Uuid,
    pub probe: String,
    pub generator: String,
    pub detector: Option<String>,
    pub prompts: Vec<String>,
    pub outputs: Vec<String>,
    pub scores: Vec<f64>,
    pub status: String,
}

impl From<&Attempt> for AttemptRecord {
    fn from(attempt: &Attempt) -> Self {
        Self {
            id: attempt.id,
            probe: attempt.probe.clone(),
            generator: attempt.generator.clone(),
            detector: attempt.detector.clone(),
            prompts: attempt.prompts.clone(),
            outputs: attempt.outputs.clone(),
            scores: attempt.scores.clone(),
            status: attempt.status.to_string(),
        }
    }
}

/// Renders attempts as JSONL: one JSON object per line.
pub fn render_jsonl(attempts: &[Attempt]) -> Result<String, EvalError> {
    let mut out = String::new();
    for attempt in attempts {
        let record = AttemptRecord::from(attempt);
        out.push_str(&serde_json::to_string(&record)?);
        out.push('\n');
    }
    Ok(out)
}

/// Renders attempts as a pretty-printed JSON array.
pub fn render_json(attempts: &[Attempt]) -> Result<String, EvalError> {
    let records: Vec<AttemptRecord> = attempts.iter().map(AttemptRecord::from).collect();
    Ok(serde_json::to_string_pretty(&records)?)
}

fn escape_html(text: &str) -> String {
    text.replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
}

/// Renders a self-contained HTML report of the scan.
pub fn render_html(attempts: &[Attempt]) -> String {
    let mut rows = String::new();
    for attempt in attempts {
        let peak = attempt.peak_score();
        let class = if peak >= 0.5 { "hit" } else { "miss" };
        rows.push_str(&format!(
            "<tr class=\"{class}\"><td>{}</td><td>{}</td><td>{}</td><td>{}</td>\
<td>{:.2}</td><td>{}</td></tr>\n",
            attempt.id,
            escape_html(&attempt.probe),
            escape_html(&attempt.generator),
            escape_html(attempt.detector.as_deref().unwrap_or("-")),
            peak,
            attempt.status,
        ));
    }

    format!(
        "<!DOCTYPE html>\n<html><head><meta charset=\"utf-8\">\
<title>augustus scan report</title>\n<style>\
body {{ font-family: sans-serif; margin: 2em; }}\
table {{ border-collapse: collapse; width: 100%; }}\
th, td {{ border: 1px solid #ccc; padding: 0.4em 0.6em; text-align: left; }}\
tr.hit td {{ background: #fdd; }}\
tr.miss td {{ background: #dfd; }}\
</style></head>\n<body>\n<h1>augustus scan report</h1>\n\
<p>{} attempts</p>\n<table>\n\
<tr><th>id</th><th>probe</th><th>generator</th><th>detector</th>\
<th>peak score</th><th>status</th></tr>\n{rows}</table>\n</body></html>\n",
        attempts.len(),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    fn complete_attempt() -> Attempt {
        let mut attempt = Attempt::new("test.Test");
        attempt.add_prompt("prompt");
        attempt.add_output("output");
        attempt.record_detector("always.Pass", vec![1.0]);
        attempt.stamp_primary(&["always.Pass".to_string()]);
        attempt.generator = "test.Repeat".to_string();
        attempt.mark_complete();
        attempt
    }

    #[test]
    fn test_jsonl_one_line_per_attempt() {
        let attempts = vec![complete_attempt(), complete_attempt()];
        let jsonl = render_jsonl(&attempts).unwrap();
        let lines: Vec<&str> = jsonl.lines().collect();
        assert_eq!(lines.len(), 2);

        let record: AttemptRecord = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(record.probe, "test.Test");
        assert_eq!(record.generator, "test.Repeat");
        assert_eq!(record.detector.as_deref(), Some("always.Pass"));
        assert_eq!(record.scores, vec![1.0]);
        assert_eq!(record.status, "complete");
    }

    #[test]
    fn test_json_is_array() {
        let attempts = vec![complete_attempt()];
        let json = render_json(&attempts).unwrap();
        let parsed: Vec<AttemptRecord> = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.len(), 1);
    }

    #[test]
    fn test_html_self_contained() {
        let attempts = vec![complete_attempt()];
        let html = render_html(&attempts);
        assert!(html.starts_with("<!DOCTYPE html>"));
        assert!(html.contains("test.Test"));
        assert!(html.contains("always.Pass"));
        assert!(html.contains("1 attempts"));
        assert!(html.contains("</html>"));
    }

    #[test]
    fn test_html_escapes_markup() {
        let mut attempt = complete_attempt();
        attempt.probe = "<script>alert(1)</script>".to_string();
        let html = render_html(&[attempt]);
        assert!(!html.contains("<script>alert"));
        assert!(html.contains("&lt;script&gt;"));
    }
}
