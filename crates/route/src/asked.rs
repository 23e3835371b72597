//! The inbound side of an exchange.
//!
//! This module contains the request facade handed to every handler:
//! - `Asked`: request line, headers, path parameters and the buffered body
//! - `PathParams`: named URL segments captured by the router

use bytes::Bytes;
use http::request::Parts;
use http::{HeaderMap, Method, Uri, Version};
use matchit::Params;

/// The request as seen by handlers.
///
/// The body is only present once it has been fully accumulated, which happens for routes with
/// buffered-data handlers and no streaming handler.
#[derive(Debug)]
pub struct Asked {
    id: u64,
    method: Method,
    uri: Uri,
    version: Version,
    headers: HeaderMap,
    path_params: PathParams,
    body: Option<Bytes>,
}

impl Asked {
    pub fn new(id: u64, parts: Parts, path_params: PathParams) -> Self {
        Self {
            id,
            method: parts.method,
            uri: parts.uri,
            version: parts.version,
            headers: parts.headers,
            path_params,
            body: None,
        }
    }

    /// Sequence number assigned by the dispatcher, unique for the process lifetime.
    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn uri(&self) -> &Uri {
        &self.uri
    }

    pub fn version(&self) -> Version {
        self.version
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn headers_mut(&mut self) -> &mut HeaderMap {
        &mut self.headers
    }

    pub fn path_params(&self) -> &PathParams {
        &self.path_params
    }

    /// The accumulated request body, `None` until body reading has finished.
    pub fn body(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    pub(crate) fn set_body(&mut self, body: Bytes) {
        self.body = Some(body);
    }

    pub(crate) fn set_path_params(&mut self, path_params: PathParams) {
        self.path_params = path_params;
    }
}

/// Path parameters extracted from the URL path, for example `id` in `/users/{id}`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PathParams {
    params: Vec<(String, String)>,
}

impl PathParams {
    #[inline]
    pub fn empty() -> Self {
        Self::default()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.params.is_empty()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.params.len()
    }

    /// Gets the value of a path parameter by its name
    pub fn get(&self, key: impl AsRef<str>) -> Option<&str> {
        let key = key.as_ref();
        self.params.iter().find(|(k, _)| k == key).map(|(_, v)| v.as_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.params.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }
}

impl From<Params<'_, '_>> for PathParams {
    fn from(params: Params<'_, '_>) -> Self {
        Self { params: params.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect() }
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for PathParams {
    fn from_iter<T: IntoIterator<Item = (K, V)>>(iter: T) -> Self {
        Self { params: iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect() }
    }
}
