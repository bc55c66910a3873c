//! Scans an input buffer (a build file) byte by byte, tracking lines for
//! error messages.

use std::path::Path;

#[derive(Debug)]
pub struct ParseError {
    msg: String,
    ofs: usize,
}
pub type ParseResult<T> = Result<T, ParseError>;

pub struct Scanner<'a> {
    buf: &'a [u8],
    pub ofs: usize,
    pub line: usize,
}

/// A saved scanner position, see Scanner::mark().
#[derive(Clone, Copy)]
pub struct Mark {
    ofs: usize,
    line: usize,
}

impl<'a> Scanner<'a> {
    pub fn new(buf: &'a [u8]) -> Self {
        Scanner {
            buf,
            ofs: 0,
            line: 1,
        }
    }

    /// The current byte, or 0 at the end of input.
    pub fn peek(&self) -> u8 {
        self.buf.get(self.ofs).copied().unwrap_or(0)
    }

    pub fn peek_at(&self, ahead: usize) -> u8 {
        self.buf.get(self.ofs + ahead).copied().unwrap_or(0)
    }

    pub fn at_end(&self) -> bool {
        self.ofs >= self.buf.len()
    }

    /// Whether the scanner is at "\n" or "\r\n".
    pub fn peek_newline(&self) -> bool {
        self.peek() == b'\n' || (self.peek() == b'\r' && self.peek_at(1) == b'\n')
    }

    pub fn next(&mut self) {
        if self.at_end() {
            return;
        }
        if self.peek() == b'\n' {
            self.line += 1;
        }
        self.ofs += 1;
    }

    pub fn read(&mut self) -> u8 {
        let c = self.peek();
        self.next();
        c
    }

    /// Consume a newline (either flavor), returning whether there was one.
    pub fn skip_newline(&mut self) -> bool {
        if self.peek() == b'\r' && self.peek_at(1) == b'\n' {
            self.next();
        }
        if self.peek() == b'\n' {
            self.next();
            return true;
        }
        false
    }

    pub fn skip_spaces(&mut self) {
        while matches!(self.peek(), b' ' | b'\t') {
            self.next();
        }
    }

    /// Skip to just past the end of the current line.
    pub fn skip_line(&mut self) {
        while !self.at_end() && !self.peek_newline() {
            self.next();
        }
        self.skip_newline();
    }

    /// Whether the rest of the current line is only whitespace.
    pub fn rest_of_line_blank(&self) -> bool {
        let rest = &self.buf[self.ofs.min(self.buf.len())..];
        rest.iter()
            .take_while(|&&c| c != b'\n')
            .all(|c| c.is_ascii_whitespace())
    }

    pub fn mark(&self) -> Mark {
        Mark {
            ofs: self.ofs,
            line: self.line,
        }
    }

    pub fn reset(&mut self, mark: Mark) {
        self.ofs = mark.ofs;
        self.line = mark.line;
    }

    pub fn parse_error<T, S: Into<String>>(&self, msg: S) -> ParseResult<T> {
        self.parse_error_at(self.ofs, msg)
    }

    pub fn parse_error_at<T, S: Into<String>>(&self, ofs: usize, msg: S) -> ParseResult<T> {
        Err(ParseError {
            msg: msg.into(),
            ofs,
        })
    }

    /// Render an error as "parse error: msg" followed by the offending line
    /// with a caret under the error position.
    pub fn format_parse_error(&self, filename: &Path, err: ParseError) -> String {
        let ofs = err.ofs.min(self.buf.len());
        let line_start = self.buf[..ofs]
            .iter()
            .rposition(|&c| c == b'\n')
            .map_or(0, |pos| pos + 1);
        let line_end = self.buf[line_start..]
            .iter()
            .position(|&c| c == b'\n' || c == b'\r')
            .map_or(self.buf.len(), |pos| line_start + pos);
        let line_number = self.buf[..line_start]
            .iter()
            .filter(|&&c| c == b'\n')
            .count()
            + 1;

        let context = String::from_utf8_lossy(&self.buf[line_start..line_end]);
        let mut col = ofs - line_start;
        let mut shown: String = context.to_string();
        let mut lead = "";
        if col > 40 {
            // Trim beginning of line to fit it on screen.
            lead = "...";
            shown = shown.chars().skip(col - 20).collect();
            col = 3 + 20;
        }
        if shown.chars().count() > 60 {
            shown = shown.chars().take(60).collect::<String>() + "...";
        }

        let prefix = format!("{}:{}: ", filename.display(), line_number);
        format!(
            "parse error: {}\n{}{}{}\n{}^\n",
            err.msg,
            prefix,
            lead,
            shown,
            " ".repeat(prefix.len() + col)
        )
    }
}
