//! Indented source accumulation and Python literal printing

/// Simple indented line accumulator (4-space indents).
#[derive(Debug, Default)]
pub struct CodeWriter {
    lines: Vec<String>,
    indent: usize,
}

impl CodeWriter {
    pub fn new(indent: usize) -> Self {
        Self {
            lines: Vec::new(),
            indent,
        }
    }

    pub fn writeln(&mut self, line: &str) -> &mut Self {
        if line.is_empty() {
            self.lines.push(String::new());
        } else {
            self.lines.push(format!("{}{}", "    ".repeat(self.indent), line));
        }
        self
    }

    pub fn blank(&mut self) -> &mut Self {
        self.writeln("")
    }

    pub fn comment(&mut self, text: &str) -> &mut Self {
        self.writeln(&format!("# {text}"))
    }

    pub fn push(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }

    pub fn pop(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }

    pub fn extend(&mut self, lines: &[String]) -> &mut Self {
        for line in lines {
            self.writeln(line);
        }
        self
    }

    pub fn lines(self) -> Vec<String> {
        self.lines
    }

    pub fn result(&self) -> String {
        self.lines.join("\n")
    }
}

/// Render a JSON value as a Python literal, the way `repr()` would.
pub fn py_repr(value: &serde_json::Value) -> String {
    use serde_json::Value;
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Number(n) => {
            if n.is_i64() || n.is_u64() {
                n.to_string()
            } else {
                let f = n.as_f64().unwrap_or(0.0);
                if f.fract() == 0.0 && f.is_finite() {
                    format!("{f:.1}")
                } else {
                    format!("{f}")
                }
            }
        }
        Value::String(s) => py_str(s),
        Value::Array(items) => {
            let parts: Vec<String> = items.iter().map(py_repr).collect();
            format!("[{}]", parts.join(", "))
        }
        Value::Object(map) => {
            let parts: Vec<String> = map
                .iter()
                .map(|(k, v)| format!("{}: {}", py_str(k), py_repr(v)))
                .collect();
            format!("{{{}}}", parts.join(", "))
        }
    }
}

fn py_str(s: &str) -> String {
    let mut out = String::with_capacity(s.len() + 2);
    out.push('\'');
    for c in s.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\'' => out.push_str("\\'"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            other => out.push(other),
        }
    }
    out.push('\'');
    out
}
