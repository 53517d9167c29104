//! User-facing error message formatting.
//!
//! Uses typed error matching (HTTP transport errors, serde_json categories,
//! io::ErrorKind) rather than string parsing to produce short notifications.

use crate::query::QueryError;
use color_eyre::eyre::Report;
use std::io;

/// Format an io::Error as a user-facing message by matching on ErrorKind.
pub fn user_message_from_io(err: &io::Error, context: Option<&str>) -> String {
    use std::io::ErrorKind;

    let base: String = match err.kind() {
        ErrorKind::NotFound => "File or directory not found.".to_string(),
        ErrorKind::PermissionDenied => "Permission denied. Check read access.".to_string(),
        ErrorKind::ConnectionRefused => {
            "Connection refused. Is the backend running?".to_string()
        }
        ErrorKind::ConnectionReset => "Connection reset.".to_string(),
        ErrorKind::TimedOut => "The request timed out.".to_string(),
        ErrorKind::InvalidData | ErrorKind::InvalidInput => {
            "Invalid or corrupted data.".to_string()
        }
        ErrorKind::UnexpectedEof => "Unexpected end of file.".to_string(),
        _ => err.to_string(),
    };

    match context {
        Some(ctx) if !ctx.is_empty() => format!("{} {}", base, ctx),
        _ => base,
    }
}

/// Format a serde_json::Error by its category.
pub fn user_message_from_json(err: &serde_json::Error) -> String {
    use serde_json::error::Category;

    match err.classify() {
        Category::Syntax => format!(
            "Response is not valid JSON (line {}, column {}).",
            err.line(),
            err.column()
        ),
        Category::Data => format!("Response has an unexpected shape: {}", err),
        Category::Eof => "Response ended unexpectedly.".to_string(),
        Category::Io => format!("Could not read response: {}", err),
    }
}

/// Format a ureq error: HTTP status or transport failure.
#[cfg(feature = "http")]
pub fn user_message_from_http(err: &ureq::Error) -> String {
    match err {
        ureq::Error::Status(code, response) => format!(
            "Server returned {} {}. Check the dataset key and version.",
            code,
            response.status_text()
        ),
        ureq::Error::Transport(transport) => match transport.kind() {
            ureq::ErrorKind::Dns => "Could not resolve the backend host.".to_string(),
            ureq::ErrorKind::ConnectionFailed => {
                "Could not connect to the backend. Is it running?".to_string()
            }
            ureq::ErrorKind::InvalidUrl | ureq::ErrorKind::UnknownScheme => {
                "The backend URL is invalid. Check [backend] base_url.".to_string()
            }
            _ => format!("Request failed: {}", transport),
        },
    }
}

/// Format a color_eyre Report by downcasting to known error types.
/// Walks the cause chain; the first recognized error wins.
pub fn user_message_from_report(report: &Report, context: Option<&str>) -> String {
    let with_context = |msg: String| match context {
        Some(ctx) => format!("{}: {}", ctx, msg),
        None => msg,
    };

    for cause in report.chain() {
        if let Some(qe) = cause.downcast_ref::<QueryError>() {
            return with_context(qe.to_string());
        }
        #[cfg(feature = "http")]
        if let Some(he) = cause.downcast_ref::<ureq::Error>() {
            return with_context(user_message_from_http(he));
        }
        if let Some(je) = cause.downcast_ref::<serde_json::Error>() {
            return with_context(user_message_from_json(je));
        }
        if let Some(io_err) = cause.downcast_ref::<io::Error>() {
            return with_context(user_message_from_io(io_err, None));
        }
    }

    // Fallback: first line of display to avoid long tracebacks
    let display = report.to_string();
    let first_line = display.lines().next().unwrap_or("An error occurred");
    with_context(first_line.trim().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use color_eyre::eyre::WrapErr;

    #[test]
    fn test_user_message_from_io_not_found() {
        let err = io::Error::new(io::ErrorKind::NotFound, "No such file");
        let msg = user_message_from_io(&err, None);
        assert!(
            msg.contains("not found"),
            "expected 'not found', got: {}",
            msg
        );
    }

    #[test]
    fn test_user_message_from_io_with_context() {
        let err = io::Error::new(io::ErrorKind::PermissionDenied, "denied");
        let msg = user_message_from_io(&err, Some("(records.json)"));
        assert_eq!(msg, "Permission denied. Check read access. (records.json)");
    }

    #[test]
    fn test_user_message_from_json_syntax() {
        let err = serde_json::from_str::<serde_json::Value>("{ nope").unwrap_err();
        let msg = user_message_from_json(&err);
        assert!(msg.starts_with("Response is not valid JSON"), "got: {}", msg);
    }

    #[test]
    fn test_report_chain_finds_io_error() {
        let result: Result<(), io::Error> =
            Err(io::Error::new(io::ErrorKind::NotFound, "gone"));
        let report = result.wrap_err("Loading dictionary").unwrap_err();
        let msg = user_message_from_report(&report, Some("Data load failed"));
        assert_eq!(msg, "Data load failed: File or directory not found.");
    }

    #[test]
    fn test_report_fallback_first_line() {
        let report = color_eyre::eyre::eyre!("first line\nsecond line");
        assert_eq!(user_message_from_report(&report, None), "first line");
    }
}
