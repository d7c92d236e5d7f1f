//! Request logging.
//!
//! # Responsibilities
//! - Render one access log line per request from a preset or token template
//! - Skip responses below the configured status threshold
//! - Attach a request ID (incoming `x-request-id` or a fresh UUID v4)
//!
//! # Formats
//! ```text
//! combined  :remote-addr - - [:date[clf]] ":method :url HTTP/:http-version" :status :res[content-length] ":referrer" ":user-agent"
//! common    :remote-addr - - [:date[clf]] ":method :url HTTP/:http-version" :status :res[content-length]
//! dev       :method :url :status :response-time ms - :res[content-length]
//! short     :remote-addr - :method :url HTTP/:http-version :status :res[content-length] - :response-time ms
//! tiny      :method :url :status :res[content-length] - :response-time ms
//! ```
//!
//! # Design Decisions
//! - Formats are parsed once; unknown tokens are configuration errors
//! - The threshold is an inclusive lower bound: `status >= threshold` is logged
//! - Lines go through `tracing` under the `access` target
//! - `:res[content-length]` falls back to the exact body size, since axum
//!   bodies only get the header when hyper writes them
//! - Failures are rendered before the line is written, so failure lines show
//!   the rendered status and length

use std::fmt::Write as _;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::body::HttpBody;
use axum::extract::{ConnectInfo, Request, State};
use axum::http::{header, HeaderMap, Method, StatusCode, Uri, Version};
use axum::middleware::Next;
use axum::response::Response;
use chrono::{DateTime, SecondsFormat, Utc};

use crate::config::LoggingConfig;

/// Preset used when no format is configured.
pub const DEFAULT_FORMAT: &str = "dev";

const COMBINED: &str = r#":remote-addr - - [:date[clf]] ":method :url HTTP/:http-version" :status :res[content-length] ":referrer" ":user-agent""#;
const COMMON: &str =
    r#":remote-addr - - [:date[clf]] ":method :url HTTP/:http-version" :status :res[content-length]"#;
const DEV: &str = ":method :url :status :response-time ms - :res[content-length]";
const SHORT: &str =
    ":remote-addr - :method :url HTTP/:http-version :status :res[content-length] - :response-time ms";
const TINY: &str = ":method :url :status :res[content-length] - :response-time ms";

pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Error returned for unusable format strings.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum LogFormatError {
    #[error("log format is empty")]
    Empty,

    #[error("unknown log format token `:{0}`")]
    UnknownToken(String),

    #[error("unterminated argument for log format token `:{0}`")]
    Unterminated(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DateStyle {
    Clf,
    Iso,
    Web,
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum Token {
    Literal(String),
    Method,
    Url,
    Status,
    ResponseTime,
    TotalTime,
    Date(DateStyle),
    HttpVersion,
    RemoteAddr,
    Referrer,
    UserAgent,
    RequestId,
    ReqHeader(String),
    ResHeader(String),
}

/// A parsed log format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogFormat {
    name: String,
    tokens: Vec<Token>,
}

impl LogFormat {
    /// Parse a preset name or a token template.
    pub fn parse(format: &str) -> Result<Self, LogFormatError> {
        let template = match format {
            "combined" => COMBINED,
            "common" => COMMON,
            "dev" => DEV,
            "short" => SHORT,
            "tiny" => TINY,
            other => other,
        };
        if template.trim().is_empty() {
            return Err(LogFormatError::Empty);
        }

        Ok(Self {
            name: format.to_string(),
            tokens: parse_template(template)?,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

fn parse_template(template: &str) -> Result<Vec<Token>, LogFormatError> {
    let mut tokens = Vec::new();
    let mut literal = String::new();
    let mut rest = template;

    while let Some(pos) = rest.find(':') {
        let after = &rest[pos + 1..];
        let name_len = after
            .find(|c: char| !(c.is_ascii_lowercase() || c == '-'))
            .unwrap_or(after.len());
        if name_len == 0 {
            literal.push_str(&rest[..=pos]);
            rest = after;
            continue;
        }

        literal.push_str(&rest[..pos]);
        if !literal.is_empty() {
            tokens.push(Token::Literal(std::mem::take(&mut literal)));
        }

        let name = &after[..name_len];
        let mut remainder = &after[name_len..];
        let mut arg = None;
        if let Some(open) = remainder.strip_prefix('[') {
            let close = open
                .find(']')
                .ok_or_else(|| LogFormatError::Unterminated(name.to_string()))?;
            arg = Some(&open[..close]);
            remainder = &open[close + 1..];
        }

        tokens.push(token(name, arg)?);
        rest = remainder;
    }

    literal.push_str(rest);
    if !literal.is_empty() {
        tokens.push(Token::Literal(literal));
    }
    Ok(tokens)
}

fn token(name: &str, arg: Option<&str>) -> Result<Token, LogFormatError> {
    let unknown = || LogFormatError::UnknownToken(name.to_string());
    Ok(match (name, arg) {
        ("method", _) => Token::Method,
        ("url", _) => Token::Url,
        ("status", _) => Token::Status,
        ("response-time", _) => Token::ResponseTime,
        ("total-time", _) => Token::TotalTime,
        ("date", None | Some("web")) => Token::Date(DateStyle::Web),
        ("date", Some("clf")) => Token::Date(DateStyle::Clf),
        ("date", Some("iso")) => Token::Date(DateStyle::Iso),
        ("http-version", _) => Token::HttpVersion,
        ("remote-addr", _) => Token::RemoteAddr,
        ("referrer", _) => Token::Referrer,
        ("user-agent", _) => Token::UserAgent,
        ("request-id", _) => Token::RequestId,
        ("req", Some(header)) => Token::ReqHeader(header.to_ascii_lowercase()),
        ("res", Some(header)) => Token::ResHeader(header.to_ascii_lowercase()),
        _ => return Err(unknown()),
    })
}

/// Everything a log line can refer to.
#[derive(Debug)]
pub struct LogRecord<'a> {
    pub method: &'a Method,
    pub uri: &'a Uri,
    pub version: Version,
    pub request_headers: &'a HeaderMap,
    pub remote_addr: Option<SocketAddr>,
    pub request_id: &'a str,
    pub status: StatusCode,
    pub response_headers: &'a HeaderMap,
    /// Exact body size, for responses that have no `content-length` yet.
    pub body_length: Option<u64>,
    pub elapsed: Duration,
    pub timestamp: DateTime<Utc>,
}

/// Access logger built from [`LoggingConfig`].
#[derive(Debug, Clone)]
pub struct AccessLog {
    format: LogFormat,
    threshold: Option<u16>,
}

impl AccessLog {
    pub fn from_config(config: &LoggingConfig) -> Result<Self, LogFormatError> {
        let format = LogFormat::parse(config.format.as_deref().unwrap_or(DEFAULT_FORMAT))?;
        Ok(Self {
            format,
            threshold: config.error_threshold.map(|t| t.0),
        })
    }

    pub fn format(&self) -> &LogFormat {
        &self.format
    }

    /// Responses below the threshold are skipped; no threshold logs everything.
    pub fn should_log(&self, status: StatusCode) -> bool {
        self.threshold
            .map_or(true, |threshold| status.as_u16() >= threshold)
    }

    pub fn render(&self, record: &LogRecord<'_>) -> String {
        let mut line = String::new();
        for token in &self.format.tokens {
            match token {
                Token::Literal(text) => line.push_str(text),
                Token::Method => line.push_str(record.method.as_str()),
                Token::Url => line.push_str(
                    record
                        .uri
                        .path_and_query()
                        .map(|pq| pq.as_str())
                        .unwrap_or("/"),
                ),
                Token::Status => {
                    let _ = write!(line, "{}", record.status.as_u16());
                }
                Token::ResponseTime | Token::TotalTime => {
                    let _ = write!(line, "{:.3}", record.elapsed.as_secs_f64() * 1000.0);
                }
                Token::Date(style) => line.push_str(&format_date(record.timestamp, *style)),
                Token::HttpVersion => line.push_str(http_version(record.version)),
                Token::RemoteAddr => match record.remote_addr {
                    Some(addr) => {
                        let _ = write!(line, "{}", addr.ip());
                    }
                    None => line.push('-'),
                },
                Token::Referrer => line.push_str(
                    header_value(record.request_headers, header::REFERER.as_str()).unwrap_or("-"),
                ),
                Token::UserAgent => line.push_str(
                    header_value(record.request_headers, header::USER_AGENT.as_str())
                        .unwrap_or("-"),
                ),
                Token::RequestId => line.push_str(record.request_id),
                Token::ReqHeader(name) => {
                    line.push_str(header_value(record.request_headers, name).unwrap_or("-"))
                }
                Token::ResHeader(name) => match header_value(record.response_headers, name) {
                    Some(value) => line.push_str(value),
                    None => match record.body_length {
                        Some(length) if name == "content-length" => {
                            let _ = write!(line, "{length}");
                        }
                        _ => line.push('-'),
                    },
                },
            }
        }
        line
    }
}

fn header_value<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

fn http_version(version: Version) -> &'static str {
    match version {
        Version::HTTP_09 => "0.9",
        Version::HTTP_10 => "1.0",
        Version::HTTP_2 => "2.0",
        Version::HTTP_3 => "3.0",
        _ => "1.1",
    }
}

fn format_date(timestamp: DateTime<Utc>, style: DateStyle) -> String {
    match style {
        DateStyle::Clf => timestamp.format("%d/%b/%Y:%H:%M:%S %z").to_string(),
        DateStyle::Iso => timestamp.to_rfc3339_opts(SecondsFormat::Millis, true),
        DateStyle::Web => timestamp.format("%a, %d %b %Y %H:%M:%S GMT").to_string(),
    }
}

/// Access logging middleware.
pub async fn log_requests(
    State(log): State<Arc<AccessLog>>,
    request: Request,
    next: Next,
) -> Response {
    let start = Instant::now();
    let method = request.method().clone();
    let uri = request.uri().clone();
    let version = request.version();
    let request_headers = request.headers().clone();
    let remote_addr = request
        .extensions()
        .get::<ConnectInfo<SocketAddr>>()
        .map(|ConnectInfo(addr)| *addr);
    let request_id = header_value(&request_headers, REQUEST_ID_HEADER)
        .map(str::to_string)
        .unwrap_or_else(|| uuid::Uuid::new_v4().to_string());

    let response = next.run(request).await;

    let status = response.status();
    if log.should_log(status) {
        let elapsed = start.elapsed();
        let line = log.render(&LogRecord {
            method: &method,
            uri: &uri,
            version,
            request_headers: &request_headers,
            remote_addr,
            request_id: &request_id,
            status,
            response_headers: response.headers(),
            body_length: response.body().size_hint().exact(),
            elapsed,
            timestamp: Utc::now(),
        });
        tracing::info!(
            target: "access",
            method = %method,
            uri = %uri,
            status = status.as_u16(),
            latency_ms = elapsed.as_millis() as u64,
            request_id = %request_id,
            "{line}"
        );
    }

    response
}
