//! Socket Wire Framing
//!
//! Single responsibility: Encode outgoing frames and classify incoming ones.
//!
//! # Wire Format
//!
//! All frames are WebSocket text messages with `;` as the delimiter.
//!
//! ## Request (outgoing)
//! ```text
//! <request id>;<message>
//! ```
//! `request id` is a decimal integer; `message` is the resource key.
//!
//! ## Reply (incoming)
//! ```text
//! <request id>;<status code>;<body>
//! ```
//! Split on the first two delimiters only, so the body may contain `;`.
//! A frame with fewer than three parts is an out-of-band notification and is
//! never matched against a pending request.

/// Status code of a successful reply
pub const STATUS_OK: &str = "200";

/// Build an outgoing request frame
pub fn encode_request(id: u64, message: &str) -> String {
    format!("{id};{message}")
}

/// A classified incoming frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Frame<'a> {
    /// Reply to a request
    Reply {
        id: &'a str,
        status: &'a str,
        body: &'a str,
    },
    /// Anything not shaped like a reply
    OutOfBand(&'a str),
}

impl Frame<'_> {
    /// Whether this is a reply carrying a success status
    pub fn is_success(&self) -> bool {
        matches!(self, Frame::Reply { status, .. } if *status == STATUS_OK)
    }
}

/// Classify an incoming frame
pub fn decode(text: &str) -> Frame<'_> {
    let mut parts = text.splitn(3, ';');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(id), Some(status), Some(body)) => Frame::Reply { id, status, body },
        _ => Frame::OutOfBand(text),
    }
}

/// Parse a reply id; `None` when it is not a decimal integer
pub fn parse_id(id: &str) -> Option<u64> {
    id.parse().ok()
}

/// Raw text delivered in place of the body of a failed reply
pub fn failure_body(frame: &str) -> String {
    serde_json::json!({ "error": format!("server failed with response ({frame})") }).to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encode_request() {
        assert_eq!(encode_request(0, "foo"), "0;foo");
        assert_eq!(encode_request(42, "/api/x?y=1"), "42;/api/x?y=1");
    }

    #[test]
    fn test_decode_reply() {
        let frame = decode("7;200;{\"a\":1}");
        assert_eq!(
            frame,
            Frame::Reply {
                id: "7",
                status: "200",
                body: "{\"a\":1}"
            }
        );
        assert!(frame.is_success());
    }

    #[test]
    fn test_decode_keeps_semicolons_in_body() {
        match decode("1;200;{\"s\":\"a;b;c\"}") {
            Frame::Reply { body, .. } => assert_eq!(body, "{\"s\":\"a;b;c\"}"),
            other => panic!("expected reply, got {other:?}"),
        }
    }

    #[test]
    fn test_decode_out_of_band() {
        assert_eq!(decode("break"), Frame::OutOfBand("break"));
        assert_eq!(decode("a;b"), Frame::OutOfBand("a;b"));
        assert_eq!(decode(""), Frame::OutOfBand(""));
    }

    #[test]
    fn test_decode_empty_body() {
        assert_eq!(
            decode("3;500;"),
            Frame::Reply {
                id: "3",
                status: "500",
                body: ""
            }
        );
        assert!(!decode("3;500;").is_success());
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("12"), Some(12));
        assert_eq!(parse_id("x"), None);
        assert_eq!(parse_id("-1"), None);
    }

    #[test]
    fn test_failure_body_is_error_json() {
        let body = failure_body("0;404;missing");
        let value: serde_json::Value = serde_json::from_str(&body).unwrap();
        assert_eq!(value["error"], "server failed with response (0;404;missing)");
    }
}
