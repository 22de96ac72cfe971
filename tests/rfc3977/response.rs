//! RFC 3977 Section 3.2 - Response lines
//!
//! A response starts with a three-digit status code, optionally followed by
//! a space and text. The first digit gives the class of the response.

use nntp_poster::commands::{parse_response_line, parse_single_response};
use nntp_poster::{FailureKind, NntpError, ResponsePolicy, codes};

#[test]
fn test_code_with_message() {
    let (code, msg) = parse_response_line("240 article received ok").unwrap();
    assert_eq!(code, 240);
    assert_eq!(msg, "article received ok");
}

#[test]
fn test_code_only() {
    assert_eq!(parse_response_line("340").unwrap(), (340, String::new()));
    assert_eq!(parse_response_line("340 ").unwrap(), (340, String::new()));
}

#[test]
fn test_message_keeps_inner_spacing() {
    let (_, msg) = parse_response_line("441  posting   failed ").unwrap();
    assert_eq!(msg, " posting   failed ");
}

#[test]
fn test_byte_order_mark_ignored() {
    let (code, _) = parse_response_line("\u{FEFF}200 ready").unwrap();
    assert_eq!(code, 200);
}

#[test]
fn test_malformed_lines_rejected() {
    for line in ["", "   ", "20", "2x0 bad", "-200 bad", " 200 ready", "2000 too long", "ok"] {
        let err = parse_response_line(line).unwrap_err();
        assert!(
            matches!(err, NntpError::InvalidResponse(_)),
            "accepted {:?}",
            line
        );
    }
}

#[test]
fn test_response_classes() {
    let ready = parse_single_response("200 posting allowed").unwrap();
    assert!(ready.is_success());

    let send = parse_single_response("340 send article").unwrap();
    assert!(send.is_continuation());
    assert!(!send.is_success());

    let busy = parse_single_response("400 service temporarily unavailable").unwrap();
    assert!(busy.is_error());

    let denied = parse_single_response("502 access denied").unwrap();
    assert!(denied.is_error());
}

#[test]
fn test_posting_codes() {
    assert_eq!(codes::READY_POSTING_ALLOWED, 200);
    assert_eq!(codes::READY_NO_POSTING, 201);
    assert_eq!(codes::ARTICLE_POSTED, 240);
    assert_eq!(codes::SEND_ARTICLE, 340);
    assert_eq!(codes::POSTING_NOT_PERMITTED, 440);
    assert_eq!(codes::POSTING_FAILED, 441);
}

#[test]
fn test_default_classification() {
    let policy = ResponsePolicy::default();

    assert_eq!(policy.classify(441), FailureKind::Rejected);
    for code in [400, 403, 436] {
        assert_eq!(policy.classify(code), FailureKind::Retryable, "{}", code);
    }
    for code in [440, 480, 481, 482, 483, 502] {
        assert_eq!(policy.classify(code), FailureKind::ServerFatal, "{}", code);
    }
    // Unknown codes get another try
    assert_eq!(policy.classify(499), FailureKind::Retryable);
}

#[test]
fn test_classification_through_errors() {
    let policy = ResponsePolicy::default();

    let rejected = NntpError::Protocol {
        code: 441,
        message: "duplicate".to_string(),
    };
    assert_eq!(rejected.failure_kind(&policy), FailureKind::Rejected);
    assert!(!rejected.breaks_connection());

    assert_eq!(
        NntpError::PostingNotPermitted.failure_kind(&policy),
        FailureKind::ServerFatal
    );
    assert_eq!(NntpError::Timeout.failure_kind(&policy), FailureKind::Retryable);
    assert!(NntpError::Timeout.breaks_connection());
}
