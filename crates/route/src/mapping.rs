//! Route mapping records, the declarative source every pipeline is compiled from.

use crate::error::SetupError;
use serde::Deserialize;
use std::fmt;

fn default_method() -> String {
    "GET".to_string()
}

/// One route as written by the application, before compilation.
///
/// The serde field names follow the external record: `when`, `uri`, `in`, `after`, `to`,
/// `then` and `maxLength`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RouteMapping {
    #[serde(default = "default_method")]
    pub when: String,

    pub uri: String,

    #[serde(default, rename = "in")]
    pub environments: Option<Vec<String>>,

    #[serde(default)]
    pub after: Vec<String>,

    #[serde(default)]
    pub to: Option<String>,

    #[serde(default)]
    pub then: Vec<String>,

    #[serde(default, rename = "maxLength")]
    pub max_length: Option<usize>,
}

impl RouteMapping {
    /// A `GET` mapping for `uri` without any handler.
    pub fn new(uri: impl Into<String>) -> Self {
        Self {
            when: default_method(),
            uri: uri.into(),
            environments: None,
            after: vec![],
            to: None,
            then: vec![],
            max_length: None,
        }
    }

    pub fn when(mut self, method: impl Into<String>) -> Self {
        self.when = method.into();
        self
    }

    pub fn environments<I, S>(mut self, environments: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.environments = Some(environments.into_iter().map(Into::into).collect());
        self
    }

    pub fn after<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.after = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn to(mut self, name: impl Into<String>) -> Self {
        self.to = Some(name.into());
        self
    }

    pub fn then<I, S>(mut self, names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.then = names.into_iter().map(Into::into).collect();
        self
    }

    pub fn max_length(mut self, max_length: usize) -> Self {
        self.max_length = Some(max_length);
        self
    }

    /// The method in upper case, as used for routing.
    pub fn method(&self) -> String {
        self.when.to_ascii_uppercase()
    }
}

impl fmt::Display for RouteMapping {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} {}", self.method(), self.uri)
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum MappingRecord {
    Wrapped { route: RouteMapping },
    Plain(RouteMapping),
}

/// Parses route mappings from JSON.
///
/// Accepts a plain array of mappings as well as the route-file shape where every element is
/// `{ "route": { ... } }`.
pub fn load_routes_json(json: &str) -> Result<Vec<RouteMapping>, SetupError> {
    let records: Vec<MappingRecord> = serde_json::from_str(json)?;
    Ok(records
        .into_iter()
        .map(|record| match record {
            MappingRecord::Wrapped { route } | MappingRecord::Plain(route) => route,
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_from_minimal_record() {
        let routes = load_routes_json(r#"[{"uri": "/ping", "to": "pong"}]"#).unwrap();
        assert_eq!(routes.len(), 1);

        let route = &routes[0];
        assert_eq!(route.when, "GET");
        assert_eq!(route.to.as_deref(), Some("pong"));
        assert!(route.after.is_empty());
        assert!(route.then.is_empty());
        assert_eq!(route.max_length, None);
        assert_eq!(route.environments, None);
    }

    #[test]
    fn route_file_shape() {
        let json = r#"[
            {"route": {"when": "post", "uri": "/users", "in": ["dev"], "after": ["auth", "readJson"],
                       "to": "createUser", "then": ["compress"], "maxLength": 512}},
            {"route": {"uri": "/health"}}
        ]"#;
        let routes = load_routes_json(json).unwrap();
        assert_eq!(routes.len(), 2);

        let expected = RouteMapping::new("/users")
            .when("post")
            .environments(["dev"])
            .after(["auth", "readJson"])
            .to("createUser")
            .then(["compress"])
            .max_length(512);
        assert_eq!(routes[0], expected);
        assert_eq!(routes[0].to_string(), "POST /users");
        assert_eq!(routes[1], RouteMapping::new("/health"));
    }

    #[test]
    fn invalid_json_is_setup_error() {
        let err = load_routes_json(r#"[{"to": "missing-uri"}]"#).unwrap_err();
        assert!(matches!(err, SetupError::InvalidMappings { .. }));
    }
}
