use std::fmt;

/// Text sink for plan explanations. Writing to it never fails.
#[derive(Debug, Default)]
pub struct Explain {
    text: String,
    indent: usize,
    at_line_start: bool,
    data: bool,
}

impl Explain {
    pub fn new(data: bool) -> Self {
        Self { data, at_line_start: true, ..Self::default() }
    }
    /// Whether variable ids should be printed next to operators.
    pub fn is_data(&self) -> bool {
        self.data
    }
    pub fn put(&mut self, text: impl AsRef<str>) -> &mut Self {
        if self.at_line_start {
            for _ in 0..self.indent {
                self.text.push_str("  ");
            }
            self.at_line_start = false;
        }
        self.text.push_str(text.as_ref());
        self
    }
    pub fn new_line(&mut self) -> &mut Self {
        if !self.at_line_start {
            self.text.push('\n');
            self.at_line_start = true;
        }
        self
    }
    pub fn push_indent(&mut self) -> &mut Self {
        self.indent += 1;
        self
    }
    pub fn pop_indent(&mut self) -> &mut Self {
        self.indent = self.indent.saturating_sub(1);
        self
    }
    pub fn is_empty(&self) -> bool {
        self.text.is_empty()
    }
    pub fn as_str(&self) -> &str {
        &self.text
    }
    pub fn into_string(self) -> String {
        self.text
    }
}

impl fmt::Display for Explain {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.text)
    }
}
