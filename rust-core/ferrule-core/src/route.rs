//! # Route Resolution
//!
//! Turns a request path into a controller, an action and raw arguments.
//!
//! Segments are consumed left to right in three phases:
//!
//! 1. each segment is tried as a controller group, then as a controller
//!    name inside the groups matched so far; the first segment that is
//!    neither ends the phase
//! 2. that segment names the action; without one the controller's default
//!    action applies
//! 3. every remaining segment is a raw argument
//!
//! A path that names no controller falls back to the default controller of
//! the innermost matched group.

use crate::error::{Error, Result};

/// Registry lookups needed to resolve a path
pub trait RouteTable {
    /// Check if a controller group is registered (`admin`, `admin/reports`)
    fn has_group(&self, group: &str) -> bool;

    /// Check if a qualified controller name is registered (`Customer`, `admin/Reports`)
    fn has_controller(&self, name: &str) -> bool;

    /// Default action of a registered controller
    fn default_action(&self, name: &str) -> Option<&str>;
}

/// Outcome of path resolution
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resolution {
    /// Qualified controller name
    pub controller: String,
    /// PascalCase action name
    pub action: Option<String>,
    /// Raw argument segments, pending coercion
    pub args: Vec<String>,
}

/// Lower-case and validate a request path, returning its segments
///
/// One trailing `/` is ignored and `/` alone yields no segments.
///
/// # Errors
///
/// Returns `Error::RouteNotFound` if the lower-cased path contains a
/// character outside `[a-z0-9/-]`.
pub fn split_path(path: &str) -> Result<Vec<String>> {
    let lowered = path.to_lowercase();
    if !lowered
        .chars()
        .all(|c| matches!(c, 'a'..='z' | '0'..='9' | '/' | '-'))
    {
        return Err(Error::RouteNotFound {
            path: path.to_string(),
        });
    }

    let trimmed = lowered.strip_prefix('/').unwrap_or(&lowered);
    let trimmed = trimmed.strip_suffix('/').unwrap_or(trimmed);
    if trimmed.is_empty() {
        return Ok(Vec::new());
    }

    Ok(trimmed.split('/').map(str::to_string).collect())
}

/// Normalize a kebab-case segment to PascalCase (`order-items` -> `OrderItems`)
#[must_use]
pub fn pascal_case(segment: &str) -> String {
    segment
        .split('-')
        .filter(|word| !word.is_empty())
        .map(|word| {
            let mut chars = word.chars();
            chars.next().map_or_else(String::new, |first| {
                first.to_uppercase().chain(chars).collect::<String>()
            })
        })
        .collect()
}

fn join(prefix: &str, name: &str) -> String {
    if prefix.is_empty() {
        name.to_string()
    } else {
        format!("{prefix}/{name}")
    }
}

/// Resolve path segments against the registry
///
/// # Errors
///
/// Returns `Error::DefaultControllerMissing` if the path names no controller
/// and the default controller is not registered in the matched group.
pub fn resolve(
    table: &impl RouteTable,
    segments: Vec<String>,
    default_controller: &str,
) -> Result<Resolution> {
    let mut segments = segments.into_iter().peekable();
    let mut group = String::new();
    let mut controller = None;

    while let Some(segment) = segments.peek() {
        if segment.is_empty() {
            segments.next();
            continue;
        }

        let nested = join(&group, segment);
        if table.has_group(&nested) {
            group = nested;
            segments.next();
            continue;
        }

        let name = join(&group, &pascal_case(segment));
        if table.has_controller(&name) {
            controller = Some(name);
            segments.next();
        }
        break;
    }

    let controller = match controller {
        Some(name) => name,
        None => {
            let name = join(&group, default_controller);
            if !table.has_controller(&name) {
                return Err(Error::DefaultControllerMissing { name });
            }
            name
        }
    };

    let mut action = None;
    for segment in segments.by_ref() {
        let normalized = pascal_case(&segment);
        if !normalized.is_empty() {
            action = Some(normalized);
            break;
        }
    }
    let action = action.or_else(|| table.default_action(&controller).map(str::to_string));

    Ok(Resolution {
        controller,
        action,
        args: segments.collect(),
    })
}
