//! Dump record rendering.
//!
//! A record looks like this (`HEADERS` block only when requested, body only
//! when requested):
//!
//! ```text
//! --------------------------------
//!   05-03-2024 (UTC) 14:07:09.042
//!   HTTP POST /api
//!   QUERY PARAMS: id=5
//!
//! HEADERS:
//! 	content-type: application/json
//!
//! --------------------------------
//! {"a":1}
//!
//! ```
//!
//! Nothing is escaped: the record is raw diagnostic text, not a
//! machine-readable format.

use http::HeaderMap;
use http::request::Parts;
use std::fmt::Write;

use crate::capture::CapturedRequest;
use crate::config::DumpConfig;
use crate::timestamp::current_timestamp;

/// Separator line framing every record.
pub const SEPARATOR: &str = "--------------------------------";

/// Rendered in place of the query string when the URI has none.
pub const NO_QUERY: &str = "(none)";

/// Builder for a single dump record.
///
/// Borrowed inputs only; the rendered `String` is the record.
#[derive(Debug, Clone, Copy)]
pub struct DumpFormatter<'a> {
    timestamp: &'a str,
    method: &'a str,
    path: &'a str,
    query: Option<&'a str>,
    headers: Option<&'a HeaderMap>,
    body: Option<&'a str>,
}

impl<'a> DumpFormatter<'a> {
    pub fn new(timestamp: &'a str, method: &'a str, path: &'a str) -> Self {
        Self {
            timestamp,
            method,
            path,
            query: None,
            headers: None,
            body: None,
        }
    }

    pub fn query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    /// Include a header section. `None` leaves the section empty.
    pub fn headers(mut self, headers: Option<&'a HeaderMap>) -> Self {
        self.headers = headers;
        self
    }

    /// Include a body section. `None` leaves the section empty.
    pub fn body(mut self, body: Option<&'a str>) -> Self {
        self.body = body;
        self
    }

    pub fn render(&self) -> Result<String, std::fmt::Error> {
        let mut out = String::with_capacity(
            128 + self.path.len() + self.body.map(str::len).unwrap_or_default(),
        );
        writeln!(out, "{SEPARATOR}")?;
        writeln!(out, "  {}", self.timestamp)?;
        writeln!(out, "  HTTP {} {}", self.method, self.path)?;
        writeln!(out, "  QUERY PARAMS: {}", self.query.unwrap_or(NO_QUERY))?;
        out.push_str("  ");
        if let Some(headers) = self.headers {
            write_header_section(&mut out, headers)?;
        }
        out.push('\n');
        writeln!(out, "{SEPARATOR}")?;
        out.push_str(self.body.unwrap_or_default());
        out.push_str("\n\n");
        Ok(out)
    }
}

/// `\nHEADERS:\n` followed by one `\t<name>: <value>\n` line per value.
///
/// Order is the header map's iteration order; repeated headers produce one
/// line per value.
fn write_header_section(out: &mut String, headers: &HeaderMap) -> std::fmt::Result {
    out.push_str("\nHEADERS:\n");
    for (name, value) in headers {
        writeln!(
            out,
            "\t{}: {}",
            name,
            String::from_utf8_lossy(value.as_bytes())
        )?;
    }
    out.push('\n');
    Ok(())
}

/// Render the record for a captured request with the current local time.
pub fn render_request(request: &CapturedRequest, config: &DumpConfig) -> Result<String, std::fmt::Error> {
    render_request_at(request, config, &current_timestamp())
}

/// Render the record for a captured request with a caller-supplied timestamp.
pub fn render_request_at(
    request: &CapturedRequest,
    config: &DumpConfig,
    timestamp: &str,
) -> Result<String, std::fmt::Error> {
    let payload = config.include_body.then(|| request.payload_str());
    DumpFormatter::new(timestamp, request.method().as_str(), request.path())
        .query(request.query())
        .headers(config.include_headers.then(|| request.headers()))
        .body(payload.as_deref())
        .render()
}

/// Body section of a record whose body crossed the capture limit.
pub fn oversize_note(limit: usize) -> String {
    format!("(body not captured: exceeds {limit} bytes)")
}

/// Render the record for a request whose body was too large to capture.
///
/// Same layout as [`render_request`]; when payloads are enabled the body
/// section holds [`oversize_note`] instead of the payload.
pub fn render_oversized(head: &Parts, limit: usize, config: &DumpConfig) -> Result<String, std::fmt::Error> {
    render_oversized_at(head, limit, config, &current_timestamp())
}

pub fn render_oversized_at(
    head: &Parts,
    limit: usize,
    config: &DumpConfig,
    timestamp: &str,
) -> Result<String, std::fmt::Error> {
    let note = config.include_body.then(|| oversize_note(limit));
    DumpFormatter::new(timestamp, head.method.as_str(), head.uri.path())
        .query(head.uri.query())
        .headers(config.include_headers.then_some(&head.headers))
        .body(note.as_deref())
        .render()
}

/// The text after the closing separator, without the record's trailing blank
/// line.
pub fn body_section(record: &str) -> Option<&str> {
    let closing = format!("\n{SEPARATOR}\n");
    let start = record.rfind(&closing)? + closing.len();
    record[start..].strip_suffix("\n\n")
}
