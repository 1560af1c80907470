//! Cache key derivation.
//!
//! A key is the colon-joined tuple
//! `version:resource[:scope][:resource_id][:normalized_query]`. The text format is
//! shared by every instance that talks to the same store, so it must stay stable.
//!
//! Optional components are positional only, so a scope can collide with a
//! resource id: an unscoped `GET /api/v1/tasks/42` and a `GET /api/v1/tasks`
//! from caller `42` both map to `v1:tasks:42`. Scopes are expected to come from
//! the auth step and never look like task ids (UUIDs).

use std::collections::BTreeMap;
use std::fmt;

use axum::http::{Method, Request};
use tracing::debug;
use url::form_urlencoded;

/// Header carrying the caller identity resolved by the upstream auth step.
pub const SCOPE_HEADER: &str = "x-user-id";

/// Query parameters that influence cacheable content. Everything else is ignored.
pub const CACHEABLE_PARAMS: [&str; 5] = ["status", "limit", "page", "sort", "order"];

pub(crate) const DEFAULT_VERSION: &str = "v1";
pub(crate) const DEFAULT_RESOURCE_TYPE: &str = "tasks";

/// Borrowed view of the request data that key and pattern derivation depend on.
#[derive(Debug, Clone, Copy)]
pub struct RequestParts<'a> {
    pub method: &'a Method,
    pub path: &'a str,
    pub query: Option<&'a str>,
    pub scope: Option<&'a str>,
}

impl<'a> RequestParts<'a> {
    pub fn from_request<B>(request: &'a Request<B>) -> Self {
        let scope = request
            .headers()
            .get(SCOPE_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty());

        Self {
            method: request.method(),
            path: request.uri().path(),
            query: request.uri().query(),
            scope,
        }
    }

    /// Only `GET` is served from the cache.
    pub fn is_read(&self) -> bool {
        *self.method == Method::GET
    }

    /// `HEAD` and `OPTIONS` neither read from nor invalidate the cache.
    pub fn is_passthrough(&self) -> bool {
        *self.method == Method::HEAD || *self.method == Method::OPTIONS
    }

    /// Every method that is neither a read nor a pass-through.
    pub fn is_write(&self) -> bool {
        !self.is_read() && !self.is_passthrough()
    }
}

/// A derived cache key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey(String);

impl CacheKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Fixed leading components shared by keys and invalidation patterns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeySpace {
    pub default_version: String,
    pub resource_type: String,
}

impl Default for KeySpace {
    fn default() -> Self {
        Self {
            default_version: DEFAULT_VERSION.to_string(),
            resource_type: DEFAULT_RESOURCE_TYPE.to_string(),
        }
    }
}

impl KeySpace {
    /// The second path segment (`/api/{version}/...`), or the default when absent.
    pub(crate) fn version<'a>(&'a self, segments: &[&'a str]) -> &'a str {
        segments
            .get(1)
            .copied()
            .filter(|segment| !segment.is_empty())
            .unwrap_or(self.default_version.as_str())
    }
}

pub(crate) fn path_segments(path: &str) -> Vec<&str> {
    path.trim_matches('/').split('/').collect()
}

/// The fourth path segment (`/api/v1/tasks/{id}`), present only for single-resource requests.
pub(crate) fn resource_id<'a>(segments: &[&'a str]) -> Option<&'a str> {
    segments
        .get(3)
        .copied()
        .filter(|segment| !segment.is_empty())
}

pub fn is_cacheable_param(name: &str) -> bool {
    CACHEABLE_PARAMS.contains(&name)
}

/// Sorted `name=value` pairs of the allow-listed parameters, joined by `&`.
///
/// Pairs that do not decode to valid UTF-8 are dropped; for repeated names the
/// first value wins.
pub fn normalized_query(raw: Option<&str>) -> Option<String> {
    let raw = raw.filter(|query| !query.is_empty())?;

    let mut selected: BTreeMap<String, String> = BTreeMap::new();
    for (name, value) in form_urlencoded::parse(raw.as_bytes()) {
        if name.contains(char::REPLACEMENT_CHARACTER) || value.contains(char::REPLACEMENT_CHARACTER)
        {
            continue;
        }
        if !is_cacheable_param(&name) {
            continue;
        }
        selected
            .entry(name.into_owned())
            .or_insert_with(|| value.into_owned());
    }

    if selected.is_empty() {
        return None;
    }

    Some(
        selected
            .iter()
            .map(|(name, value)| format!("{name}={value}"))
            .collect::<Vec<_>>()
            .join("&"),
    )
}

/// Derives cache keys for read requests. Never fails.
#[derive(Debug, Clone, Default)]
pub struct CacheKeyBuilder {
    space: KeySpace,
}

impl CacheKeyBuilder {
    pub fn new(space: KeySpace) -> Self {
        Self { space }
    }

    pub fn space(&self) -> &KeySpace {
        &self.space
    }

    pub fn build_key(&self, request: &RequestParts<'_>) -> CacheKey {
        let segments = path_segments(request.path);

        let mut components: Vec<&str> = vec![
            self.space.version(&segments),
            self.space.resource_type.as_str(),
        ];
        if let Some(scope) = request.scope {
            components.push(scope);
        }
        if let Some(id) = resource_id(&segments) {
            components.push(id);
        }

        let query = normalized_query(request.query);
        if let Some(query) = query.as_deref() {
            components.push(query);
        }

        let key = CacheKey(components.join(":"));
        debug!(key = %key, path = request.path, "derived cache key");
        key
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scope_and_resource_id_share_a_position() {
        let method = Method::GET;
        let builder = CacheKeyBuilder::default();
        let single = RequestParts {
            method: &method,
            path: "/api/v1/tasks/42",
            query: None,
            scope: None,
        };
        let scoped_list = RequestParts {
            path: "/api/v1/tasks",
            scope: Some("42"),
            ..single
        };

        assert_eq!(builder.build_key(&single).as_str(), "v1:tasks:42");
        assert_eq!(builder.build_key(&single), builder.build_key(&scoped_list));
    }

    #[test]
    fn head_and_options_are_neither_reads_nor_writes() {
        for method in [Method::HEAD, Method::OPTIONS] {
            let parts = RequestParts {
                method: &method,
                path: "/api/v1/tasks",
                query: None,
                scope: None,
            };
            assert!(parts.is_passthrough());
            assert!(!parts.is_read());
            assert!(!parts.is_write());
        }
        for method in [Method::POST, Method::PUT, Method::PATCH, Method::DELETE] {
            let parts = RequestParts {
                method: &method,
                path: "/api/v1/tasks",
                query: None,
                scope: None,
            };
            assert!(parts.is_write());
        }
    }

    fn get(path: &str, query: Option<&'static str>, scope: Option<&'static str>) -> CacheKey {
        let method = Method::GET;
        let parts = RequestParts {
            method: &method,
            path,
            query,
            scope,
        };
        CacheKeyBuilder::default().build_key(&parts)
    }

    #[test]
    fn collection_key_without_scope_or_query() {
        assert_eq!(get("/api/v1/tasks", None, None).as_str(), "v1:tasks");
    }

    #[test]
    fn parameter_order_does_not_change_key() {
        let first = get("/api/v1/tasks", Some("status=pending&page=1"), None);
        let second = get("/api/v1/tasks", Some("page=1&status=pending"), None);
        assert_eq!(first, second);
        assert_eq!(first.as_str(), "v1:tasks:page=1&status=pending");
    }

    #[test]
    fn unlisted_parameters_are_ignored() {
        let with_noise = get("/api/v1/tasks", Some("status=pending&foo=bar"), None);
        let plain = get("/api/v1/tasks", Some("status=pending"), None);
        assert_eq!(with_noise, plain);
    }

    #[test]
    fn only_unlisted_parameters_drop_query_segment() {
        assert_eq!(
            get("/api/v1/tasks", Some("foo=bar&utm=x"), None).as_str(),
            "v1:tasks"
        );
    }

    #[test]
    fn scope_separates_keys() {
        let alice = get("/api/v1/tasks", Some("status=pending"), Some("alice"));
        let bob = get("/api/v1/tasks", Some("status=pending"), Some("bob"));
        assert_ne!(alice, bob);
        assert_eq!(alice.as_str(), "v1:tasks:alice:status=pending");
    }

    #[test]
    fn single_resource_key_includes_id() {
        assert_eq!(
            get("/api/v1/tasks/42", None, Some("alice")).as_str(),
            "v1:tasks:alice:42"
        );
        assert_eq!(get("/api/v1/tasks/42/", None, None).as_str(), "v1:tasks:42");
    }

    #[test]
    fn version_comes_from_second_segment() {
        assert_eq!(get("/api/v2/tasks", None, None).as_str(), "v2:tasks");
    }

    #[test]
    fn missing_version_falls_back_to_default() {
        assert_eq!(get("/", None, None).as_str(), "v1:tasks");
        assert_eq!(get("/api", None, None).as_str(), "v1:tasks");
        assert_eq!(get("/api//tasks", None, None).as_str(), "v1:tasks");
    }

    #[test]
    fn repeated_parameter_keeps_first_value() {
        assert_eq!(
            get("/api/v1/tasks", Some("page=2&page=3"), None).as_str(),
            "v1:tasks:page=2"
        );
    }

    #[test]
    fn values_are_percent_decoded() {
        assert_eq!(
            get("/api/v1/tasks", Some("sort=due%20date&order=asc"), None).as_str(),
            "v1:tasks:order=asc&sort=due date"
        );
    }

    #[test]
    fn malformed_pairs_are_dropped() {
        assert_eq!(
            get("/api/v1/tasks", Some("status=%FF%FE&page=1"), None).as_str(),
            "v1:tasks:page=1"
        );
    }

    #[test]
    fn empty_value_is_kept() {
        assert_eq!(
            get("/api/v1/tasks", Some("status="), None).as_str(),
            "v1:tasks:status="
        );
    }

    #[test]
    fn scope_header_is_read_from_request() {
        let request = Request::builder()
            .uri("/api/v1/tasks?limit=5")
            .header(SCOPE_HEADER, "carol")
            .body(())
            .unwrap();
        let parts = RequestParts::from_request(&request);
        assert_eq!(parts.scope, Some("carol"));
        assert!(parts.is_read());
        assert_eq!(
            CacheKeyBuilder::default().build_key(&parts).as_str(),
            "v1:tasks:carol:limit=5"
        );
    }

    #[test]
    fn blank_scope_header_is_treated_as_absent() {
        let request = Request::builder()
            .method(Method::POST)
            .uri("/api/v1/tasks")
            .header(SCOPE_HEADER, "  ")
            .body(())
            .unwrap();
        let parts = RequestParts::from_request(&request);
        assert_eq!(parts.scope, None);
        assert!(!parts.is_read());
    }

    #[test]
    fn custom_key_space_is_used() {
        let builder = CacheKeyBuilder::new(KeySpace {
            default_version: "v9".to_string(),
            resource_type: "jobs".to_string(),
        });
        let method = Method::GET;
        let parts = RequestParts {
            method: &method,
            path: "/",
            query: None,
            scope: None,
        };
        assert_eq!(builder.build_key(&parts).as_str(), "v9:jobs");
    }
}
