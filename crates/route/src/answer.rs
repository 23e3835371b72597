//! The outbound side of an exchange.
//!
//! Handlers never build responses directly. They fill an [`Answer`]: status, headers and
//! data, then mark it answered with [`Answer::end`], [`Answer::send`] or [`Answer::close`].
//! Once answered the rest of the pipeline is skipped and the executor converts the answer
//! into an `http::Response`.

use crate::body::ResponseBody;
use crate::context::RouteContext;
use crate::error::ExecError;
use bytes::Bytes;
use http::header::{CONNECTION, CONTENT_TYPE};
use http::{HeaderMap, HeaderValue, Response, StatusCode};
use std::fmt;
use tracing::warn;

/// Payload of an answer.
pub enum AnswerData {
    Text(String),
    Binary(Bytes),
    /// piped to the transport frame by frame
    Stream(ResponseBody),
    /// serialized to JSON when the answer is sent
    Value(serde_json::Value),
}

impl AnswerData {
    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Self::Text(text) => Some(text.as_bytes()),
            Self::Binary(bytes) => Some(bytes),
            _ => None,
        }
    }

    fn content_type(&self) -> Option<mime::Mime> {
        match self {
            Self::Text(_) => Some(mime::TEXT_PLAIN_UTF_8),
            Self::Binary(_) => Some(mime::APPLICATION_OCTET_STREAM),
            Self::Value(_) => Some(mime::APPLICATION_JSON),
            Self::Stream(_) => None,
        }
    }

    fn into_body(self) -> ResponseBody {
        match self {
            Self::Text(text) => ResponseBody::from(text),
            Self::Binary(bytes) => ResponseBody::once(bytes),
            Self::Stream(body) => body,
            Self::Value(value) => {
                warn!("only text, binary or stream can be sent, serializing the value as JSON");
                match serde_json::to_vec(&value) {
                    Ok(json) => ResponseBody::once(json.into()),
                    Err(e) => {
                        warn!(cause = %e, "failed to serialize answer data, sending an empty body");
                        ResponseBody::empty()
                    }
                }
            }
        }
    }
}

impl fmt::Debug for AnswerData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Text(text) => f.debug_tuple("Text").field(text).finish(),
            Self::Binary(bytes) => f.debug_tuple("Binary").field(bytes).finish(),
            Self::Stream(body) => f.debug_tuple("Stream").field(body).finish(),
            Self::Value(value) => f.debug_tuple("Value").field(value).finish(),
        }
    }
}

impl From<String> for AnswerData {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl From<&str> for AnswerData {
    fn from(value: &str) -> Self {
        Self::Text(value.to_string())
    }
}

impl From<Bytes> for AnswerData {
    fn from(value: Bytes) -> Self {
        Self::Binary(value)
    }
}

impl From<Vec<u8>> for AnswerData {
    fn from(value: Vec<u8>) -> Self {
        Self::Binary(value.into())
    }
}

impl From<ResponseBody> for AnswerData {
    fn from(value: ResponseBody) -> Self {
        Self::Stream(value)
    }
}

impl From<serde_json::Value> for AnswerData {
    fn from(value: serde_json::Value) -> Self {
        Self::Value(value)
    }
}

/// The response facade handed to every handler.
#[derive(Debug)]
pub struct Answer {
    status: StatusCode,
    headers: HeaderMap,
    data: Option<AnswerData>,
    error: Option<ExecError>,
    route: Option<RouteContext>,
    answered: bool,
    closing: bool,
}

impl Default for Answer {
    fn default() -> Self {
        Self::new()
    }
}

impl Answer {
    pub fn new() -> Self {
        Self {
            status: StatusCode::OK,
            headers: HeaderMap::new(),
            data: None,
            error: None,
            route: None,
            answered: false,
            closing: false,
        }
    }

    /// True once a handler has ended, sent or closed the answer.
    #[inline]
    pub fn answered(&self) -> bool {
        self.answered
    }

    pub fn status(&mut self, status: StatusCode) -> &mut Self {
        self.status = status;
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn data(&self) -> Option<&AnswerData> {
        self.data.as_ref()
    }

    pub fn data_mut(&mut self) -> Option<&mut AnswerData> {
        self.data.as_mut()
    }

    /// Sets the data without answering, later handlers may still change it.
    pub fn set_data(&mut self, data: impl Into<AnswerData>) -> &mut Self {
        self.data = Some(data.into());
        self
    }

    pub fn take_data(&mut self) -> Option<AnswerData> {
        self.data.take()
    }

    /// Marks the answer as answered with whatever data it holds.
    pub fn end(&mut self) {
        self.answered = true;
    }

    pub fn send(&mut self, data: impl Into<AnswerData>) {
        self.set_data(data);
        self.end();
    }

    /// Answers with `message` and asks the transport to close the connection.
    pub fn close(&mut self, message: impl Into<String>) {
        let message = message.into();
        self.data = if message.is_empty() { None } else { Some(AnswerData::Text(message)) };
        self.closing = true;
        self.end();
    }

    pub fn is_closing(&self) -> bool {
        self.closing
    }

    /// The failure that diverted the request to the error handler.
    pub fn error(&self) -> Option<&ExecError> {
        self.error.as_ref()
    }

    pub fn set_error(&mut self, error: ExecError) {
        self.error = Some(error);
    }

    /// The route the request was executing when it failed.
    pub fn route_context(&self) -> Option<&RouteContext> {
        self.route.as_ref()
    }

    pub(crate) fn set_route_context(&mut self, route: RouteContext) {
        self.route = Some(route);
    }

    /// Builds the response, applying the default send policy to the data.
    pub fn into_response(self) -> Response<ResponseBody> {
        let Self { status, mut headers, data, closing, .. } = self;

        let body = match data {
            Some(data) => {
                if let Some(value) = data.content_type().and_then(|mime| HeaderValue::from_str(mime.as_ref()).ok()) {
                    headers.entry(CONTENT_TYPE).or_insert(value);
                }
                data.into_body()
            }
            None => ResponseBody::empty(),
        };

        if closing {
            headers.insert(CONNECTION, HeaderValue::from_static("close"));
        }

        let mut response = Response::new(body);
        *response.status_mut() = status;
        *response.headers_mut() = headers;
        response
    }
}
