//! HTTP request-line detection.
//!
//! The proxy never routes on HTTP, but the traffic monitor tags chunks
//! that open with a recognizable request line to make relayed traffic
//! easier to read in debug logs.

/// Request methods the sniffer recognizes.
const METHODS: [&str; 6] = ["GET", "HEAD", "POST", "PUT", "PATCH", "DELETE"];

/// Return the HTTP method if `chunk` begins with an HTTP request line.
///
/// Only the `METHOD ` prefix is inspected; the rest of the request line
/// is not parsed.
pub fn request_method(chunk: &[u8]) -> Option<&'static str> {
    METHODS.iter().copied().find(|method| {
        chunk.len() > method.len() + 1
            && chunk.starts_with(method.as_bytes())
            && chunk[method.len()] == b' '
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recognizes_methods() {
        assert_eq!(request_method(b"GET /health HTTP/1.1\r\n"), Some("GET"));
        assert_eq!(request_method(b"HEAD / HTTP/1.1\r\n"), Some("HEAD"));
        assert_eq!(request_method(b"POST /submit HTTP/1.1\r\n"), Some("POST"));
        assert_eq!(request_method(b"PUT /x HTTP/1.1\r\n"), Some("PUT"));
        assert_eq!(request_method(b"PATCH /x HTTP/1.1\r\n"), Some("PATCH"));
        assert_eq!(request_method(b"DELETE /x HTTP/1.1\r\n"), Some("DELETE"));
    }

    #[test]
    fn test_rejects_non_http() {
        assert_eq!(request_method(b"PING\n"), None);
        assert_eq!(request_method(b""), None);
        assert_eq!(request_method(b"GETX / HTTP/1.1"), None);
        assert_eq!(request_method(b"get / HTTP/1.1"), None);
        assert_eq!(request_method(&[0x16, 0x03, 0x01]), None);
    }

    #[test]
    fn test_method_alone_is_not_a_request_line() {
        assert_eq!(request_method(b"GET"), None);
        assert_eq!(request_method(b"GET "), None);
    }
}
