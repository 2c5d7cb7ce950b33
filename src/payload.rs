//! Request body parsing.

use crate::data::DataStream;
use crate::error::BodyParseError;
use serde::de::DeserializeOwned;

#[derive(Debug, Clone, PartialEq, Default)]
/// The parsed body of a request.
///
/// Which variant a request carries depends on its method and its
/// `Content-Type` header; see [`parse_payload`].
pub enum Payload {
    /// The request carried no body, or its method does not carry one.
    #[default]
    Empty,
    /// A JSON body (`application/json`).
    Json(serde_json::Value),
    /// A form body (`application/x-www-form-urlencoded`), in the order the
    /// pairs were sent.
    Form(Vec<(String, String)>),
    /// Any other body that is valid UTF-8, unparsed.
    Text(String),
    /// Any other body that is not valid UTF-8.
    Bytes(bytes::Bytes),
}

impl Payload {
    /// Whether there is no body.
    pub fn is_empty(&self) -> bool {
        matches!(self, Payload::Empty)
    }

    /// The JSON value, if the body was JSON.
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    /// The form pairs, if the body was a form.
    pub fn as_form(&self) -> Option<&[(String, String)]> {
        match self {
            Payload::Form(pairs) => Some(&pairs[..]),
            _ => None,
        }
    }

    /// The first value of the given form field, if the body was a form.
    ///
    /// # Examples
    /// ```rust
    /// # use noheadache::Payload;
    /// let payload = Payload::Form(vec![
    ///     ("name".into(), "x".into()),
    ///     ("name".into(), "y".into()),
    /// ]);
    /// assert_eq!(payload.form_value("name"), Some("x"));
    /// assert_eq!(payload.form_value("other"), None);
    /// ```
    pub fn form_value(&self, key: &str) -> Option<&str> {
        self.as_form()?
            .iter()
            .find(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
    }

    /// The text, if the body was neither JSON nor a form.
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(text) => Some(text),
            _ => None,
        }
    }

    /// Deserializes the body into the given type.  JSON bodies are converted
    /// directly; form bodies are treated as a flat object of strings.
    ///
    /// # Errors
    /// Fails if the body cannot be represented as the given type, or if it is
    /// neither JSON nor a form.
    pub fn deserialize<T: DeserializeOwned>(&self) -> Result<T, anyhow::Error> {
        match self {
            Payload::Json(value) => Ok(T::deserialize(value)?),
            Payload::Form(pairs) => {
                let object = pairs
                    .iter()
                    .map(|(k, v)| (k.clone(), serde_json::Value::String(v.clone())))
                    .collect::<serde_json::Map<_, _>>();
                Ok(T::deserialize(serde_json::Value::Object(object))?)
            }
            other => Err(anyhow::anyhow!(
                "cannot deserialize a {} body",
                other.kind()
            )),
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            Payload::Empty => "empty",
            Payload::Json(_) => "json",
            Payload::Form(_) => "form",
            Payload::Text(_) => "text",
            Payload::Bytes(_) => "binary",
        }
    }
}

/// Whether requests of this method conventionally carry a body that should
/// be parsed.
pub(crate) fn carries_body(method: &http::Method) -> bool {
    matches!(
        *method,
        http::Method::POST | http::Method::PUT | http::Method::PATCH
    )
}

/// Buffers the whole body, then parses it according to the content type.
///
/// The content type is matched by substring, so parameters such as
/// `; charset=utf-8` do not matter.  An empty body is always
/// [`Payload::Empty`], regardless of the content type.
///
/// # Errors
/// Fails with [`BodyParseError::InvalidJson`] if the content type declares
/// JSON but the body is malformed, and with the errors of the underlying
/// stream otherwise.
pub(crate) async fn parse_payload(
    body: hyper::Body,
    content_type: Option<&str>,
    limit: u64,
) -> Result<Payload, BodyParseError> {
    let bytes = DataStream::new(body, limit).into_bytes().await?;
    decode(bytes, content_type)
}

fn decode(bytes: Vec<u8>, content_type: Option<&str>) -> Result<Payload, BodyParseError> {
    if bytes.is_empty() {
        return Ok(Payload::Empty);
    }

    let content_type = content_type.unwrap_or("");
    if content_type.contains(mime::APPLICATION_JSON.essence_str()) {
        serde_json::from_slice(&bytes)
            .map(Payload::Json)
            .map_err(BodyParseError::InvalidJson)
    } else if content_type.contains(mime::APPLICATION_WWW_FORM_URLENCODED.essence_str()) {
        Ok(Payload::Form(parse_pairs(&bytes)))
    } else {
        match String::from_utf8(bytes) {
            Ok(text) => Ok(Payload::Text(text)),
            Err(e) => Ok(Payload::Bytes(e.into_bytes().into())),
        }
    }
}

/// Parses `x-www-form-urlencoded` pairs, keeping their order.  Undecodable
/// sequences are replaced; anything that still fails to parse is logged and
/// treated as an empty form.
pub(crate) fn parse_pairs(input: &[u8]) -> Vec<(String, String)> {
    match serde_urlencoded::from_bytes::<Vec<(String, String)>>(input) {
        Ok(pairs) => pairs,
        Err(e) => {
            log::warn!("could not decode form data ({}); treating it as empty", e);
            Vec::new()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_parses_json() {
        let payload = parse_payload(
            hyper::Body::from(r#"{"name":"x"}"#),
            Some("application/json; charset=utf-8"),
            512,
        )
        .await
        .unwrap();
        assert_eq!(payload, Payload::Json(json!({ "name": "x" })));
    }

    #[tokio::test]
    async fn test_malformed_json_is_an_error() {
        let error = parse_payload(hyper::Body::from("{name"), Some("application/json"), 512)
            .await
            .unwrap_err();
        assert!(matches!(error, BodyParseError::InvalidJson(_)));
    }

    #[tokio::test]
    async fn test_parses_form_in_order() {
        let payload = parse_payload(
            hyper::Body::from("b=2&a=1&b=3&greeting=hello%20world"),
            Some("application/x-www-form-urlencoded"),
            512,
        )
        .await
        .unwrap();
        assert_eq!(
            payload.as_form().unwrap(),
            &[
                ("b".to_string(), "2".to_string()),
                ("a".to_string(), "1".to_string()),
                ("b".to_string(), "3".to_string()),
                ("greeting".to_string(), "hello world".to_string()),
            ][..]
        );
    }

    #[tokio::test]
    async fn test_unknown_content_type_is_raw_text() {
        let payload = parse_payload(hyper::Body::from("{not json"), Some("text/plain"), 512)
            .await
            .unwrap();
        assert_eq!(payload, Payload::Text("{not json".into()));

        let payload = parse_payload(hyper::Body::from("plain"), None, 512)
            .await
            .unwrap();
        assert_eq!(payload.as_text(), Some("plain"));
    }

    #[tokio::test]
    async fn test_empty_body_is_empty() {
        let payload = parse_payload(hyper::Body::empty(), Some("application/json"), 512)
            .await
            .unwrap();
        assert!(payload.is_empty());
    }

    #[test]
    fn test_binary_body_is_kept_as_bytes() {
        let payload = decode(vec![0xff, 0xfe, 0x00], Some("application/octet-stream")).unwrap();
        assert_eq!(payload, Payload::Bytes(bytes::Bytes::from_static(&[0xff, 0xfe, 0x00])));
    }

    #[test]
    fn test_undecodable_form_values_are_replaced_not_dropped() {
        assert_eq!(
            parse_pairs(b"name=%FF&ok=1"),
            vec![
                ("name".to_string(), "\u{FFFD}".to_string()),
                ("ok".to_string(), "1".to_string()),
            ]
        );
    }

    #[test]
    fn test_deserializes_forms_and_json() {
        #[derive(serde::Deserialize)]
        struct User {
            name: String,
        }

        let form = Payload::Form(vec![("name".into(), "x".into())]);
        assert_eq!(form.deserialize::<User>().unwrap().name, "x");
        let json = Payload::Json(json!({ "name": "y" }));
        assert_eq!(json.deserialize::<User>().unwrap().name, "y");
        assert!(Payload::Text("z".into()).deserialize::<User>().is_err());
    }

    #[test]
    fn test_only_body_methods_carry_bodies() {
        assert!(carries_body(&http::Method::POST));
        assert!(carries_body(&http::Method::PUT));
        assert!(carries_body(&http::Method::PATCH));
        assert!(!carries_body(&http::Method::GET));
        assert!(!carries_body(&http::Method::DELETE));
    }
}
