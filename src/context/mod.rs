//! Per-request context handed to route handlers.
//!
//! A [`Context`] bundles the parsed [`Request`] with the path parameters the
//! router captured, and knows how to turn the request's query string and form
//! body into a typed parameter struct.

use std::collections::HashMap;
use std::string::FromUtf8Error;

use serde::de::DeserializeOwned;
use thiserror::Error;

use crate::Request;

/// Errors raised while extracting handler parameters from a request.
///
/// All of them are the client's fault and map to `400 Bad Request`.
#[derive(Debug, Error)]
pub enum ParamError {
    #[error("missing path parameter `{name}`")]
    Missing { name: String },

    #[error("path parameter `{name}` is not valid UTF-8 once decoded")]
    Encoding {
        name: String,
        #[source]
        source: FromUtf8Error,
    },

    #[error("malformed form body: {0}")]
    Form(#[from] serde_urlencoded::de::Error),

    #[error("invalid parameters: {0}")]
    Invalid(#[from] serde_json::Error),
}

/// Raw (still percent-encoded) path segments captured by a route pattern.
#[derive(Default, Debug, Clone)]
pub struct PathParams {
    map: HashMap<String, String>,
}

impl PathParams {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: String, value: String) {
        self.map.insert(name, value);
    }

    pub fn get(&self, name: &str) -> Option<&str> {
        self.map.get(name).map(String::as_str)
    }
}

/// Everything a handler gets to see about one request.
pub struct Context {
    request: Request,
    params: PathParams,
}

impl Context {
    pub fn new(request: Request) -> Self {
        Self::with_params(request, PathParams::new())
    }

    /// Creates a context carrying the parameters captured by a matched route.
    pub fn with_params(request: Request, params: PathParams) -> Self {
        Self { request, params }
    }

    pub fn request(&self) -> &Request {
        &self.request
    }

    /// Gives the request back, dropping the captured parameters.
    pub fn into_request(self) -> Request {
        self.request
    }

    /// Returns the percent-decoded path parameter `name`.
    ///
    /// # Errors
    ///
    /// [`ParamError::Missing`] when the route did not capture `name`, and
    /// [`ParamError::Encoding`] when the decoded bytes are not UTF-8.
    pub fn path_param(&self, name: &str) -> Result<String, ParamError> {
        let raw = self.params.get(name).ok_or_else(|| ParamError::Missing {
            name: name.to_owned(),
        })?;
        urlencoding::decode(raw)
            .map(|decoded| decoded.into_owned())
            .map_err(|source| ParamError::Encoding {
                name: name.to_owned(),
                source,
            })
    }

    /// Deserializes the request's parameters into `T`.
    ///
    /// Query-string parameters and `application/x-www-form-urlencoded` body
    /// parameters are merged, with the body winning when a name appears in
    /// both. Within one source the first occurrence of a name wins. Every
    /// value is a string, so `T` should have `String` fields.
    ///
    /// # Errors
    ///
    /// [`ParamError::Form`] for an undecodable body, [`ParamError::Invalid`]
    /// when a required field is absent.
    pub fn form<T: DeserializeOwned>(&self) -> Result<T, ParamError> {
        let mut merged = first_wins(self.request.query_params().iter().cloned());
        merged.extend(first_wins(self.request.form_params()?));
        Ok(serde_json::from_value(serde_json::Value::Object(merged))?)
    }
}

fn first_wins(
    pairs: impl IntoIterator<Item = (String, String)>,
) -> serde_json::Map<String, serde_json::Value> {
    let mut map = serde_json::Map::new();
    for (name, value) in pairs {
        map.entry(name).or_insert_with(|| value.into());
    }
    map
}

#[cfg(test)]
mod tests {
    use serde::Deserialize;

    use super::*;

    #[derive(Debug, Deserialize)]
    #[serde(rename_all = "camelCase")]
    struct Swap {
        old_value: String,
        new_value: String,
    }

    fn ctx(raw: &str) -> Context {
        let (req, _) = Request::parse(raw.as_bytes()).unwrap();
        Context::new(req)
    }

    #[test]
    fn form_reads_query_string() {
        let c = ctx("PATCH /caching/k?oldValue=yay%21&newValue=boo HTTP/1.1\r\n\r\n");
        let swap: Swap = c.form().unwrap();
        assert_eq!(swap.old_value, "yay!");
        assert_eq!(swap.new_value, "boo");
    }

    #[test]
    fn form_body_wins_over_query() {
        let c = ctx("PATCH /caching/k?oldValue=q&newValue=q HTTP/1.1\r\n\
Content-Type: application/x-www-form-urlencoded\r\nContent-Length: 10\r\n\r\noldValue=b");
        let swap: Swap = c.form().unwrap();
        assert_eq!(swap.old_value, "b");
        assert_eq!(swap.new_value, "q");
    }

    #[test]
    fn repeated_names_keep_first_value_in_each_source() {
        let c = ctx("PATCH /caching/k?newValue=q1&newValue=q2 HTTP/1.1\r\n\
Content-Type: application/x-www-form-urlencoded\r\nContent-Length: 23\r\n\r\noldValue=b1&oldValue=b2");
        let swap: Swap = c.form().unwrap();
        assert_eq!(swap.old_value, "b1");
        assert_eq!(swap.new_value, "q1");
    }

    #[test]
    fn form_reports_missing_field() {
        let c = ctx("PATCH /caching/k?oldValue=a HTTP/1.1\r\n\r\n");
        let err = c.form::<Swap>().unwrap_err();
        assert!(matches!(err, ParamError::Invalid(_)));
        assert!(err.to_string().contains("newValue"));
    }

    #[test]
    fn path_param_is_percent_decoded() {
        let (req, _) = Request::parse(b"GET /caching/a%20b HTTP/1.1\r\n\r\n").unwrap();
        let mut params = PathParams::new();
        params.insert("key".into(), "a%20b".into());
        let c = Context::with_params(req, params);
        assert_eq!(c.path_param("key").unwrap(), "a b");
        assert!(matches!(
            c.path_param("other"),
            Err(ParamError::Missing { .. })
        ));
    }

    #[test]
    fn path_param_rejects_invalid_utf8() {
        let (req, _) = Request::parse(b"GET /caching/%FF HTTP/1.1\r\n\r\n").unwrap();
        let mut params = PathParams::new();
        params.insert("key".into(), "%FF".into());
        let c = Context::with_params(req, params);
        assert!(matches!(
            c.path_param("key"),
            Err(ParamError::Encoding { .. })
        ));
    }
}
