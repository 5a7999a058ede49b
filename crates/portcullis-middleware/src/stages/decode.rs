//! Body decoding (stage 5).
//!
//! Runs only for routes that declare a payload type. JSON failures become
//! Bad Request problems carrying where and why the decoder stopped, plus the
//! offending field when the decoder names one:
//!
//! ```json
//! {
//!   "line": 1, "column": 12, "category": "data",
//!   "message": "missing field `name` at line 1 column 12",
//!   "fields": { "name": ["missing field `name` at line 1 column 12"] }
//! }
//! ```

use portcullis_core::{FieldErrors, Problem, Request};
use serde::de::DeserializeOwned;
use std::fmt;
use std::marker::PhantomData;

/// Decodes the request body into `B`.
pub trait Decode<B>: Send + Sync + 'static {
    /// Decodes the body.
    fn decode(&self, request: &Request) -> Result<B, Problem>;
}

/// The route declares no payload; the body is never read.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoBody;

impl Decode<()> for NoBody {
    fn decode(&self, _request: &Request) -> Result<(), Problem> {
        Ok(())
    }
}

/// Decodes a JSON payload.
pub struct JsonBody<B> {
    _body: PhantomData<fn() -> B>,
}

impl<B> JsonBody<B> {
    /// Creates a JSON decoder for `B`.
    #[must_use]
    pub fn new() -> Self {
        Self { _body: PhantomData }
    }
}

impl<B> Default for JsonBody<B> {
    fn default() -> Self {
        Self::new()
    }
}

impl<B> fmt::Debug for JsonBody<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JsonBody")
            .field("type", &std::any::type_name::<B>())
            .finish()
    }
}

impl<B: DeserializeOwned + Send + 'static> Decode<B> for JsonBody<B> {
    fn decode(&self, request: &Request) -> Result<B, Problem> {
        decode_json(request.body())
    }
}

/// Decodes JSON bytes, reporting the failure position.
pub fn decode_json<B: DeserializeOwned>(bytes: &[u8]) -> Result<B, Problem> {
    serde_json::from_slice(bytes).map_err(|e| {
        use serde_json::error::Category;

        let message = e.to_string();
        let category = match e.classify() {
            Category::Io => "io",
            Category::Syntax => "syntax",
            Category::Data => "data",
            Category::Eof => "eof",
        };
        let mut fields = FieldErrors::new();
        if e.classify() == Category::Data {
            if let Some(field) = named_field(&message) {
                fields.add(field, message.clone());
            }
        }
        let data = serde_json::json!({
            "line": e.line(),
            "column": e.column(),
            "category": category,
            "message": message,
            "fields": fields.fields,
        });
        Problem::bad_request("request body could not be decoded").with_data(data)
    })
}

/// Extracts `name` from serde messages such as ``missing field `name` ``.
fn named_field(message: &str) -> Option<&str> {
    let (_, rest) = message.split_once("field `")?;
    rest.split_once('`').map(|(name, _)| name)
}
