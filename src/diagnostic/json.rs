use super::{Diagnostic, SourceMap};

/// One diagnostic as a single-line JSON object.
pub fn render(d: &Diagnostic) -> String {
    let mut obj = serde_json::json!({
        "phase": d.phase.as_str(),
        "message": d.message,
        "notes": d.notes,
    });

    if let Some(location) = &d.location {
        obj["location"] = serde_json::Value::from(location.as_str());
    }

    if let Some(label) = &d.label {
        let mut span = serde_json::json!({
            "start": label.span.start,
            "end": label.span.end,
            "message": label.message,
        });
        if let Some(source) = &d.source {
            let (line, col) = SourceMap::new(source).lookup(source, label.span.start);
            span["line"] = serde_json::Value::from(line);
            span["col"] = serde_json::Value::from(col);
        }
        obj["span"] = span;
    }

    serde_json::to_string(&obj)
        .unwrap_or_else(|_| r#"{"phase":"runtime","message":"internal error serializing diagnostic"}"#.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::Phase;
    use crate::lexer::Span;

    fn parse(s: &str) -> serde_json::Value {
        serde_json::from_str(s).expect("valid JSON")
    }

    #[test]
    fn bare_error() {
        let v = parse(&render(&Diagnostic::error(Phase::Runtime, "Stack overflow")));
        assert_eq!(v["phase"], "runtime");
        assert_eq!(v["message"], "Stack overflow");
        assert!(v["notes"].as_array().unwrap().is_empty());
        assert!(v.get("span").is_none());
        assert!(v.get("location").is_none());
    }

    #[test]
    fn span_with_source_has_line_and_col() {
        let d = Diagnostic::error(Phase::Compile, "Expected ';'")
            .at("a.hby:2")
            .with_span(Span { start: 6, end: 7 }, "near '}'")
            .with_source("x = 1\n{ y }");
        let v = parse(&render(&d));
        assert_eq!(v["location"], "a.hby:2");
        assert_eq!(v["span"]["start"], 6);
        assert_eq!(v["span"]["end"], 7);
        assert_eq!(v["span"]["line"], 2);
        assert_eq!(v["span"]["col"], 1);
        assert_eq!(v["span"]["message"], "near '}'");
    }

    #[test]
    fn span_without_source_has_offsets_only() {
        let d = Diagnostic::error(Phase::Compile, "bad").with_span(Span { start: 5, end: 8 }, "here");
        let v = parse(&render(&d));
        assert!(v["span"].get("line").is_none());
        assert_eq!(v["span"]["start"], 5);
    }

    #[test]
    fn notes_keep_order() {
        let d = Diagnostic::error(Phase::Runtime, "bad").with_note("in f()").with_note("in script");
        let v = parse(&render(&d));
        assert_eq!(v["notes"][0], "in f()");
        assert_eq!(v["notes"][1], "in script");
        assert!(!render(&d).contains('\n'));
    }
}
