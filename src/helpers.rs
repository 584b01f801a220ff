use crate::level::Level;
use crate::logger::Logger;
use std::time::Duration;

/// Field carrying the request correlation id.
pub const REQUEST_ID_FIELD: &str = "requestId";

/// Map the helpers' level selector: `"Err"` and `"Info"` select those
/// levels, anything else logs at `Debug`.
pub fn select_level(level: &str) -> Level {
    match level {
        "Err" => Level::Error,
        "Info" => Level::Info,
        _ => Level::Debug,
    }
}

/// Timing breakdown of one HTTP round trip.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TraceInfo {
    pub dns_lookup: Duration,
    pub conn_time: Duration,
    pub tcp_conn_time: Duration,
    pub tls_handshake: Duration,
    pub server_time: Duration,
    pub response_time: Duration,
    pub total_time: Duration,
    pub is_conn_reused: bool,
    pub is_conn_was_idle: bool,
    pub conn_idle_time: Duration,
    pub request_attempt: u32,
}

/// A completed HTTP response that recorded its timings.
pub trait TracedResponse {
    /// Status line, e.g. `200 OK`.
    fn status(&self) -> String;
    fn trace_info(&self) -> TraceInfo;
}

/// Plain [`TracedResponse`] for clients that measure timings themselves.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TimedResponse {
    pub status: String,
    pub trace: TraceInfo,
}

impl TracedResponse for TimedResponse {
    fn status(&self) -> String {
        self.status.clone()
    }

    fn trace_info(&self) -> TraceInfo {
        self.trace.clone()
    }
}

impl Logger {
    /// Log an XML payload pretty-printed with a two-space indent.
    ///
    /// Payloads that are not well-formed are logged as given.
    #[track_caller]
    pub fn xml_log(&self, level: &str, request_id: &str, message: &str) {
        let level = select_level(level);
        if !self.is_enabled(level) {
            return;
        }
        let pretty = pretty_xml(message);
        let body = pretty.as_deref().unwrap_or(message);
        self.with_field(REQUEST_ID_FIELD, request_id).log(level, body);
    }

    /// Log a message exchanged in `direction` (`in`/`out`) for a request.
    ///
    /// A message that is itself a quoted string literal is unquoted first.
    #[track_caller]
    pub fn uuid_log(&self, level: &str, request_id: &str, direction: &str, message: &str) {
        let level = select_level(level);
        if !self.is_enabled(level) {
            return;
        }
        let unquoted = unquote(message);
        let body = unquoted.as_deref().unwrap_or(message);
        self.with_field(REQUEST_ID_FIELD, request_id)
            .with_field("direction", direction)
            .log(level, body);
    }

    /// Log the timings of a completed HTTP response at `Info`. Nothing is
    /// logged without a response.
    #[track_caller]
    pub fn http_trace_log(&self, request_id: &str, resp: Option<&dyn TracedResponse>) {
        let resp = match resp {
            Some(resp) => resp,
            None => return,
        };
        let ti = resp.trace_info();
        self.with_field(REQUEST_ID_FIELD, request_id)
            .with_field("Status", resp.status())
            .with_field("DNSLookup", ti.dns_lookup)
            .with_field("ConnTime", ti.conn_time)
            .with_field("TCPConnTime", ti.tcp_conn_time)
            .with_field("TLSHandshake", ti.tls_handshake)
            .with_field("ServerTime", ti.server_time)
            .with_field("ResponseTime", ti.response_time)
            .with_field("TotalTime", ti.total_time)
            .with_field("IsConnReused", ti.is_conn_reused)
            .with_field("IsConnWasIdle", ti.is_conn_was_idle)
            .with_field("ConnIdleTime", ti.conn_idle_time)
            .with_field("RequestAttempt", ti.request_attempt)
            .info("Http Response Received");
    }
}

/// Undo string-literal quoting.
///
/// Accepts a double-quoted literal, a backtick raw literal, or a
/// single-quoted character. Escapes follow Go string literals: `\a \b \f
/// \n \r \t \v \\`, the enclosing quote, `\xHH`, three-digit octal,
/// `\uHHHH` and `\UHHHHHHHH`. Returns `None` for anything else, including
/// byte escapes that do not form valid UTF-8.
pub fn unquote(s: &str) -> Option<String> {
    if s.len() < 2 {
        return None;
    }
    let first = s.chars().next()?;
    let last = s.chars().next_back()?;
    if first != last || !matches!(first, '"' | '`' | '\'') {
        return None;
    }
    let inner = &s[1..s.len() - 1];
    match first {
        '"' => unescape(inner, '"'),
        '`' if !inner.contains('`') => Some(inner.replace('\r', "")),
        '\'' => {
            let value = unescape(inner, '\'')?;
            let mut chars = value.chars();
            match (chars.next(), chars.next()) {
                (Some(_), None) => Some(value),
                _ => None,
            }
        }
        _ => None,
    }
}

fn unescape(inner: &str, quote: char) -> Option<String> {
    let mut out: Vec<u8> = Vec::with_capacity(inner.len());
    let mut buf = [0u8; 4];
    let mut chars = inner.chars();
    while let Some(c) = chars.next() {
        if c == quote || c == '\n' {
            return None;
        }
        if c != '\\' {
            out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            continue;
        }
        let esc = chars.next()?;
        match esc {
            'a' => out.push(0x07),
            'b' => out.push(0x08),
            'f' => out.push(0x0c),
            'n' => out.push(b'\n'),
            'r' => out.push(b'\r'),
            't' => out.push(b'\t'),
            'v' => out.push(0x0b),
            '\\' => out.push(b'\\'),
            '"' | '\'' if esc == quote => out.push(esc as u8),
            'x' => out.push(u8::try_from(hex_value(&mut chars, 2)?).ok()?),
            'u' | 'U' => {
                let width = if esc == 'u' { 4 } else { 8 };
                let c = char::from_u32(hex_value(&mut chars, width)?)?;
                out.extend_from_slice(c.encode_utf8(&mut buf).as_bytes());
            }
            '0'..='7' => {
                let mut value = esc.to_digit(8)?;
                for _ in 0..2 {
                    value = value * 8 + chars.next()?.to_digit(8)?;
                }
                out.push(u8::try_from(value).ok()?);
            }
            _ => return None,
        }
    }
    String::from_utf8(out).ok()
}

fn hex_value(chars: &mut std::str::Chars<'_>, width: usize) -> Option<u32> {
    let mut value: u32 = 0;
    for _ in 0..width {
        value = value.checked_mul(16)? + chars.next()?.to_digit(16)?;
    }
    Some(value)
}

enum Token<'a> {
    Open { name: &'a str, raw: &'a str },
    Close { name: &'a str, raw: &'a str },
    /// Self-closing element, declaration, comment, CDATA.
    Leaf(&'a str),
    Text(&'a str),
}

fn tag_name(body: &str) -> &str {
    let end = body
        .find(|c: char| c.is_whitespace() || c == '/' || c == '>')
        .unwrap_or(body.len());
    &body[..end]
}

/// Find the `>` closing the tag starting at `start`, skipping quoted
/// attribute values.
fn tag_end(input: &str, start: usize) -> Option<usize> {
    let mut quote: Option<char> = None;
    for (offset, c) in input[start..].char_indices() {
        match (quote, c) {
            (Some(q), c) if c == q => quote = None,
            (Some(_), _) => {}
            (None, '"') | (None, '\'') => quote = Some(c),
            (None, '>') => return Some(start + offset),
            _ => {}
        }
    }
    None
}

fn tokenize(input: &str) -> Option<Vec<Token<'_>>> {
    let mut tokens = Vec::new();
    let mut pos = 0;
    while pos < input.len() {
        let rest = &input[pos..];
        if !rest.starts_with('<') {
            let end = rest.find('<').map(|i| pos + i).unwrap_or(input.len());
            let text = input[pos..end].trim();
            if !text.is_empty() {
                tokens.push(Token::Text(text));
            }
            pos = end;
            continue;
        }

        let (end, special) = if rest.starts_with("<!--") {
            (rest.find("-->").map(|i| pos + i + 2)?, true)
        } else if rest.starts_with("<![CDATA[") {
            (rest.find("]]>").map(|i| pos + i + 2)?, true)
        } else {
            (tag_end(input, pos)?, false)
        };
        let raw = &input[pos..=end];
        if special || raw.starts_with("<?") || raw.starts_with("<!") || raw.ends_with("/>") {
            tokens.push(Token::Leaf(raw));
        } else if let Some(body) = raw.strip_prefix("</") {
            tokens.push(Token::Close { name: tag_name(body), raw });
        } else {
            tokens.push(Token::Open { name: tag_name(&raw[1..]), raw });
        }
        pos = end + 1;
    }
    Some(tokens)
}

/// Pretty-print `input` with one element per line and a two-space indent.
///
/// Elements holding only text stay on one line (`<b>1</b>`). Returns `None`
/// when tags are unterminated or unbalanced.
pub fn pretty_xml(input: &str) -> Option<String> {
    let tokens = tokenize(input)?;
    let mut lines: Vec<String> = Vec::new();
    let mut open: Vec<&str> = Vec::new();
    let mut i = 0;

    while i < tokens.len() {
        let indent = "  ".repeat(open.len());
        match &tokens[i] {
            Token::Open { name, raw } => {
                if let (Some(Token::Text(text)), Some(Token::Close { name: close, raw: close_raw })) =
                    (tokens.get(i + 1), tokens.get(i + 2))
                {
                    if close == name {
                        lines.push(format!("{}{}{}{}", indent, raw, text, close_raw));
                        i += 3;
                        continue;
                    }
                }
                lines.push(format!("{}{}", indent, raw));
                open.push(*name);
            }
            Token::Close { name, raw } => {
                if open.pop() != Some(*name) {
                    return None;
                }
                lines.push(format!("{}{}", "  ".repeat(open.len()), raw));
            }
            Token::Leaf(raw) => lines.push(format!("{}{}", indent, raw)),
            Token::Text(text) => lines.push(format!("{}{}", indent, text)),
        }
        i += 1;
    }

    if !open.is_empty() || lines.is_empty() {
        return None;
    }
    Some(lines.join("\n"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn level_selector_is_tri_state() {
        assert_eq!(select_level("Err"), Level::Error);
        assert_eq!(select_level("Info"), Level::Info);
        assert_eq!(select_level("err"), Level::Debug);
        assert_eq!(select_level(""), Level::Debug);
    }

    #[test]
    fn nested_elements_are_indented() {
        assert_eq!(pretty_xml("<a><b>1</b></a>").as_deref(), Some("<a>\n  <b>1</b>\n</a>"));
    }

    #[test]
    fn declarations_attributes_and_empty_elements() {
        let input = r#"<?xml version="1.0"?><cmd id="x>y"><arg/><!-- note --><v>2</v></cmd>"#;
        let expected = "<?xml version=\"1.0\"?>\n<cmd id=\"x>y\">\n  <arg/>\n  <!-- note -->\n  <v>2</v>\n</cmd>";
        assert_eq!(pretty_xml(input).as_deref(), Some(expected));
    }

    #[test]
    fn mixed_content_puts_text_on_its_own_line() {
        let pretty = pretty_xml("<a>hi<b/></a>").unwrap();
        assert_eq!(pretty, "<a>\n  hi\n  <b/>\n</a>");
    }

    #[test]
    fn malformed_xml_is_rejected() {
        assert!(pretty_xml("<a><b></a>").is_none());
        assert!(pretty_xml("<a>").is_none());
        assert!(pretty_xml("<a").is_none());
        assert!(pretty_xml("plain text").is_some());
    }

    #[test]
    fn unquote_handles_escapes_and_raw_literals() {
        assert_eq!(unquote(r#""hello \"world\"""#).as_deref(), Some(r#"hello "world""#));
        assert_eq!(unquote(r#""tab\there""#).as_deref(), Some("tab\there"));
        assert_eq!(unquote("`raw \\n`").as_deref(), Some("raw \\n"));
        assert_eq!(unquote("'x'").as_deref(), Some("x"));
    }

    #[test]
    fn unquote_accepts_go_escapes() {
        assert_eq!(unquote(r#""\x41\101\u00e9""#).as_deref(), Some("AAé"));
        assert_eq!(unquote(r#""\a\v\f""#).as_deref(), Some("\u{7}\u{b}\u{c}"));
        assert_eq!(unquote(r#""\U0001F600""#).as_deref(), Some("\u{1F600}"));
        assert_eq!(unquote(r"'\''").as_deref(), Some("'"));
        assert_eq!(unquote(r"'\n'").as_deref(), Some("\n"));
    }

    #[test]
    fn unquote_rejects_escapes_outside_go_literals() {
        assert!(unquote(r#""\/""#).is_none());
        assert!(unquote(r#""\'""#).is_none());
        assert!(unquote(r#""\400""#).is_none());
        assert!(unquote(r#""\xff""#).is_none());
        assert!(unquote(r#""\ud800""#).is_none());
        assert!(unquote("\"line\nbreak\"").is_none());
    }

    #[test]
    fn unquote_rejects_unquoted_or_broken_input() {
        assert!(unquote("hello").is_none());
        assert!(unquote(r#""unterminated"#).is_none());
        assert!(unquote(r#""bad \q escape""#).is_none());
        assert!(unquote("\"").is_none());
        assert!(unquote("'ab'").is_none());
    }
}
