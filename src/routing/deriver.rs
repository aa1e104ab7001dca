//! Naming-convention route derivation.
//!
//! # Responsibilities
//! - Recognise the leading HTTP verb of an endpoint identifier
//! - Turn the remainder into literal path segments and `{param}` placeholders
//!
//! # Design Decisions
//! - Pure function: no state, no allocation beyond the returned path
//! - `_by_` marks a parameter boundary; everything before the first one is literal
//! - Literal words become separate segments (`get_user_profile` → `/user/profile`)
//! - Parameter names keep their underscores (`by_item_id` → `{item_id}`)

use axum::http::Method;

static VERBS: [(&str, Method); 7] = [
    ("get", Method::GET),
    ("post", Method::POST),
    ("put", Method::PUT),
    ("delete", Method::DELETE),
    ("patch", Method::PATCH),
    ("options", Method::OPTIONS),
    ("head", Method::HEAD),
];

const PARAM_SEPARATOR: &str = "_by_";

/// Derive `(verb, sub-path)` from an endpoint identifier.
///
/// Returns `None` when the identifier is not an endpoint: it starts with `_`
/// or does not begin with a known verb followed by `_` or end of string.
///
/// ```
/// use axum::http::Method;
/// use routeweave::routing::derive_route;
///
/// assert_eq!(derive_route("get"), Some((Method::GET, "/".to_string())));
/// assert_eq!(
///     derive_route("get_details_by_item_id"),
///     Some((Method::GET, "/details/{item_id}".to_string()))
/// );
/// assert_eq!(derive_route("_get_internal"), None);
/// ```
pub fn derive_route(identifier: &str) -> Option<(Method, String)> {
    if identifier.starts_with('_') {
        return None;
    }

    let lowered = identifier.to_lowercase();
    let (verb, method) = VERBS.iter().find(|(verb, _)| {
        lowered == *verb
            || lowered
                .strip_prefix(verb)
                .is_some_and(|rest| rest.starts_with('_'))
    })?;

    let mut parts = lowered.split(PARAM_SEPARATOR);
    let literal = parts.next().unwrap_or_default();

    let mut segments: Vec<String> = literal[verb.len()..]
        .split('_')
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect();

    segments.extend(
        parts
            .filter(|param| !param.is_empty())
            .map(|param| format!("{{{}}}", param)),
    );

    if segments.is_empty() {
        return Some((method.clone(), "/".to_string()));
    }

    Some((method.clone(), format!("/{}", segments.join("/"))))
}

/// Placeholder names of a path template, in order of appearance.
pub fn path_placeholders(template: &str) -> Vec<&str> {
    template
        .split('/')
        .filter_map(|segment| segment.strip_prefix('{')?.strip_suffix('}'))
        .filter(|name| !name.is_empty())
        .collect()
}

/// A path template with placeholder names erased (`/users/{id}` → `/users/{}`).
///
/// Two templates with the same shape match the same requests, so only one of
/// them can be routed.
pub fn route_shape(template: &str) -> String {
    template
        .split('/')
        .map(|segment| {
            if segment.starts_with('{') && segment.ends_with('}') {
                "{}"
            } else {
                segment
            }
        })
        .collect::<Vec<_>>()
        .join("/")
}
