//! # Local Router
//!
//! Matches a request method and path against descriptor path templates.
//! Templates are split on `/`; a `{name}` segment binds that parameter and
//! every other segment must match literally.

use std::collections::BTreeMap;

use crate::functions::{FunctionDescriptor, HttpMethod};

/// Outcome of routing one request
#[derive(Debug, Clone, PartialEq)]
pub enum RouteMatch<'a> {
    Matched {
        descriptor: &'a FunctionDescriptor,
        params: BTreeMap<String, String>,
    },
    /// No template has this path shape
    NotFound,
    /// The path exists, but not for this method
    MethodNotAllowed { allow: Vec<HttpMethod> },
}

impl RouteMatch<'_> {
    /// HTTP status of a rejected request
    pub fn status_code(&self) -> Option<u16> {
        match self {
            RouteMatch::Matched { .. } => None,
            RouteMatch::NotFound => Some(404),
            RouteMatch::MethodNotAllowed { .. } => Some(405),
        }
    }

    /// `Allow` header value for a 405
    pub fn allow_header(&self) -> Option<String> {
        match self {
            RouteMatch::MethodNotAllowed { allow } => Some(
                allow
                    .iter()
                    .map(HttpMethod::as_str)
                    .collect::<Vec<_>>()
                    .join(", "),
            ),
            _ => None,
        }
    }
}

/// Route table built once per server start
#[derive(Debug, Clone)]
pub struct Router {
    functions: Vec<FunctionDescriptor>,
}

impl Router {
    /// Keep routable descriptors in discovery order
    pub fn new(functions: Vec<FunctionDescriptor>) -> Self {
        Self {
            functions: functions.into_iter().filter(|f| f.is_routable()).collect(),
        }
    }

    pub fn functions(&self) -> &[FunctionDescriptor] {
        &self.functions
    }

    /// First descriptor matching both path shape and method wins
    pub fn route(&self, method: HttpMethod, path: &str) -> RouteMatch<'_> {
        let mut allow: Vec<HttpMethod> = Vec::new();

        for descriptor in &self.functions {
            let Some(template) = descriptor.path.as_deref() else {
                continue;
            };
            let Some(params) = match_path(template, path) else {
                continue;
            };
            if descriptor.method == method {
                return RouteMatch::Matched { descriptor, params };
            }
            if !allow.contains(&descriptor.method) {
                allow.push(descriptor.method);
            }
        }

        if allow.is_empty() {
            RouteMatch::NotFound
        } else {
            RouteMatch::MethodNotAllowed { allow }
        }
    }

    /// Methods served at `path`, in discovery order
    pub fn allowed_methods(&self, path: &str) -> Vec<HttpMethod> {
        let mut allow = Vec::new();
        for descriptor in &self.functions {
            let shape_matches = descriptor
                .path
                .as_deref()
                .and_then(|template| match_path(template, path))
                .is_some();
            if shape_matches && !allow.contains(&descriptor.method) {
                allow.push(descriptor.method);
            }
        }
        allow
    }
}

/// Bind `{param}` segments of `template` against `path`
pub fn match_path(template: &str, path: &str) -> Option<BTreeMap<String, String>> {
    let template_parts: Vec<&str> = template.split('/').collect();
    let path_parts: Vec<&str> = path.split('/').collect();

    if template_parts.len() != path_parts.len() {
        return None;
    }

    let mut params = BTreeMap::new();
    for (expected, actual) in template_parts.iter().zip(path_parts.iter()) {
        match expected
            .strip_prefix('{')
            .and_then(|rest| rest.strip_suffix('}'))
        {
            Some(name) => {
                params.insert(name.to_string(), actual.to_string());
            }
            None if expected == actual => {}
            None => return None,
        }
    }
    Some(params)
}
