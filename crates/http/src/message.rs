//! Minimal views over the request/response types the middleware wraps.

use http::{HeaderMap, HeaderName};

/// Lower-case form of [`tracestitch_core::headers::REQUEST_HEADER`].
pub const REQUEST_HEADER_NAME: HeaderName = HeaderName::from_static("miniprofilerrequestheader");

/// Lower-case form of [`tracestitch_core::headers::RESULTS_HEADER`].
pub const RESULTS_HEADER_NAME: HeaderName = HeaderName::from_static("miniprofilerresults");

pub trait OutboundRequest {
    fn method_name(&self) -> &str;
    /// Address the request is sent to, used in step names.
    fn target(&self) -> String;
    fn header_map_mut(&mut self) -> &mut HeaderMap;
}

pub trait TracedResponse {
    fn header_map(&self) -> &HeaderMap;
}

impl<B> OutboundRequest for http::Request<B> {
    fn method_name(&self) -> &str {
        self.method().as_str()
    }

    fn target(&self) -> String {
        self.uri().to_string()
    }

    fn header_map_mut(&mut self) -> &mut HeaderMap {
        self.headers_mut()
    }
}

impl<B> TracedResponse for http::Response<B> {
    fn header_map(&self) -> &HeaderMap {
        self.headers()
    }
}

impl OutboundRequest for reqwest::Request {
    fn method_name(&self) -> &str {
        self.method().as_str()
    }

    fn target(&self) -> String {
        self.url().to_string()
    }

    fn header_map_mut(&mut self) -> &mut HeaderMap {
        self.headers_mut()
    }
}

impl TracedResponse for reqwest::Response {
    fn header_map(&self) -> &HeaderMap {
        self.headers()
    }
}

/// First value of `name` as text. Non-ASCII values count as absent.
pub fn header_str<'a>(headers: &'a HeaderMap, name: &HeaderName) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}

#[cfg(test)]
mod tests {
    use tracestitch_core::headers::{REQUEST_HEADER, RESULTS_HEADER};

    use super::*;

    #[test]
    fn header_names_match_protocol_constants() {
        assert!(REQUEST_HEADER_NAME.as_str().eq_ignore_ascii_case(REQUEST_HEADER));
        assert!(RESULTS_HEADER_NAME.as_str().eq_ignore_ascii_case(RESULTS_HEADER));
    }

    #[test]
    fn header_lookup_is_case_insensitive() {
        let mut headers = HeaderMap::new();
        headers.insert(
            HeaderName::from_bytes(RESULTS_HEADER.as_bytes()).unwrap(),
            "blob".parse().unwrap(),
        );
        assert_eq!(header_str(&headers, &RESULTS_HEADER_NAME), Some("blob"));
    }

    #[test]
    fn describes_http_requests() {
        let mut req = http::Request::builder()
            .method("POST")
            .uri("http://inventory:8080/reserve?id=7")
            .body(())
            .unwrap();
        assert_eq!(req.method_name(), "POST");
        assert_eq!(req.target(), "http://inventory:8080/reserve?id=7");
        req.header_map_mut()
            .insert(REQUEST_HEADER_NAME, "abc".parse().unwrap());
        assert!(req.headers().contains_key(REQUEST_HEADER));
    }
}
