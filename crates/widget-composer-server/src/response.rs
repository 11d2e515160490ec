//! HTTP responses of the composition API.

use axum::body::Body;
use axum::http::{HeaderName, HeaderValue, Response, StatusCode};

/// A buffered HTTP response.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    /// HTTP status code
    pub status: u16,
    /// Response headers as key-value pairs
    pub headers: Vec<(String, String)>,
    /// Response body
    pub body: Vec<u8>,
}

impl ApiResponse {
    fn with_content_type(status: u16, content_type: &str, body: &str) -> Self {
        Self {
            status,
            headers: vec![("content-type".to_string(), content_type.to_string())],
            body: body.as_bytes().to_vec(),
        }
    }

    /// Create a simple text response.
    pub fn text(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "text/plain; charset=utf-8", body)
    }

    /// Create a JSON response.
    pub fn json(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "application/json", body)
    }

    /// Create an HTML response.
    pub fn html(status: u16, body: &str) -> Self {
        Self::with_content_type(status, "text/html; charset=utf-8", body)
    }

    /// Create an error response with JSON body.
    pub fn error(status: u16, message: &str) -> Self {
        let body = serde_json::json!({
            "error": message
        })
        .to_string();
        Self::json(status, &body)
    }

    /// Add a header to the response.
    pub fn with_header(mut self, name: &str, value: &str) -> Self {
        self.headers.push((name.to_string(), value.to_string()));
        self
    }

    /// Mark the response as a download named `file_name`.
    pub fn attachment(self, file_name: &str) -> Self {
        let file_name = file_name.replace(['"', '\\'], "_");
        self.with_header(
            "content-disposition",
            &format!("attachment; filename=\"{file_name}\""),
        )
    }

    /// Convert to Axum response.
    ///
    /// Headers that are not valid HTTP are skipped.
    pub fn into_axum_response(self) -> Response<Body> {
        let mut response = Response::new(Body::from(self.body));
        *response.status_mut() =
            StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);

        for (name, value) in &self.headers {
            if let (Ok(name), Ok(value)) = (
                HeaderName::try_from(name.as_str()),
                HeaderValue::try_from(value.as_str()),
            ) {
                response.headers_mut().append(name, value);
            }
        }
        response
    }
}

impl Default for ApiResponse {
    fn default() -> Self {
        Self::text(200, "OK")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_text_response() {
        let resp = ApiResponse::text(200, "Hello, World!");
        assert_eq!(resp.status, 200);
        assert_eq!(resp.body, b"Hello, World!");
        assert_eq!(
            resp.headers[0],
            (
                "content-type".to_string(),
                "text/plain; charset=utf-8".to_string()
            )
        );
    }

    #[test]
    fn test_html_response() {
        let resp = ApiResponse::html(200, "<p>hi</p>");
        assert_eq!(resp.headers[0].1, "text/html; charset=utf-8");
    }

    #[test]
    fn test_error_response() {
        let resp = ApiResponse::error(404, "Not found");
        assert_eq!(resp.status, 404);
        let body: serde_json::Value = serde_json::from_slice(&resp.body).unwrap();
        assert_eq!(body["error"], "Not found");
    }

    #[test]
    fn test_attachment_header() {
        let resp = ApiResponse::html(200, "").attachment("compo\"sition.html");
        assert_eq!(
            resp.headers[1],
            (
                "content-disposition".to_string(),
                "attachment; filename=\"compo_sition.html\"".to_string()
            )
        );
    }

    #[test]
    fn test_into_axum_response() {
        let resp = ApiResponse::json(201, "{}")
            .with_header("x-request-id", "123")
            .with_header("bad header", "skipped");
        let axum_resp = resp.into_axum_response();
        assert_eq!(axum_resp.status(), StatusCode::CREATED);
        assert_eq!(axum_resp.headers()["x-request-id"], "123");
        assert_eq!(axum_resp.headers().len(), 2);
    }
}
