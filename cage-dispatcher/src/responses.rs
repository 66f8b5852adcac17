//! Uniform `(body, exit-code)` response shaping for `/git` and `/gh`.
//!
//! The dispatcher's only outward contract for command results is a plain
//! text body plus an `X-Yolo-Cage-Exit-Code` header; the agent-side shim
//! unpacks both back into a real process exit code.

use axum::http::HeaderValue;
use axum::response::{IntoResponse, Response};

pub const EXIT_CODE_HEADER: &str = "x-yolo-cage-exit-code";

fn plain_text_with_exit_code(body: String, exit_code: i32) -> Response {
    let mut response = body.into_response();
    response.headers_mut().insert(
        EXIT_CODE_HEADER,
        HeaderValue::from_str(&exit_code.to_string()).unwrap_or_else(|_| HeaderValue::from_static("1")),
    );
    response
}

/// A denial always carries exit code 1.
pub fn denial(message: impl Into<String>) -> Response {
    plain_text_with_exit_code(message.into(), 1)
}

/// A completed command's output, carrying its real exit code.
pub fn command_result(output: String, exit_code: i32) -> Response {
    plain_text_with_exit_code(output, exit_code)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn denial_always_carries_exit_code_one() {
        let response = denial("nope\n");
        assert_eq!(
            response.headers().get(EXIT_CODE_HEADER).unwrap(),
            "1"
        );
    }

    #[test]
    fn command_result_carries_its_exit_code() {
        let response = command_result("output".to_string(), 7);
        assert_eq!(
            response.headers().get(EXIT_CODE_HEADER).unwrap(),
            "7"
        );
    }
}
