use super::{Diagnostic, SourceMap};

pub struct AnsiRenderer {
    pub use_color: bool,
}

impl AnsiRenderer {
    fn paint(&self, code: &str, s: &str) -> String {
        if self.use_color { format!("\x1b[{code}m{s}\x1b[0m") } else { s.to_string() }
    }

    fn bold(&self, s: &str) -> String {
        self.paint("1", s)
    }

    fn bold_red(&self, s: &str) -> String {
        self.paint("1;31", s)
    }

    fn cyan(&self, s: &str) -> String {
        self.paint("36", s)
    }

    fn dim(&self, s: &str) -> String {
        self.paint("2", s)
    }

    pub fn render(&self, d: &Diagnostic) -> String {
        let mut out = format!("{}: {}\n", self.bold_red(&format!("{} error", d.phase.as_str())), self.bold(&d.message));

        if let Some(location) = &d.location {
            out.push_str(&format!("  {} {location}\n", self.cyan("-->")));
        }

        if let (Some(label), Some(source)) = (&d.label, &d.source) {
            let map = SourceMap::new(source);
            let (line, col) = map.lookup(source, label.span.start);
            let line_text = map.line_text(source, line);

            let gutter = line.to_string().len();
            let pipe = self.cyan("|");
            let pad = " ".repeat(gutter);
            let number = self.cyan(&format!("{line:>gutter$}"));

            out.push_str(&format!("{pad} {pipe}\n"));
            out.push_str(&format!("{number} {pipe} {line_text}\n"));

            let width = source
                .get(label.span.start..label.span.end)
                .map_or(0, |s| s.chars().take_while(|&c| c != '\n').count())
                .max(1);
            let indent = " ".repeat(col - 1);
            let carets = self.bold_red(&"^".repeat(width));
            if label.message.is_empty() {
                out.push_str(&format!("{pad} {pipe} {indent}{carets}\n"));
            } else {
                out.push_str(&format!("{pad} {pipe} {indent}{carets} {}\n", self.bold_red(&label.message)));
            }
        }

        for note in &d.notes {
            out.push_str(&format!("  {} {note}\n", self.dim("=")));
        }

        out
    }
}
