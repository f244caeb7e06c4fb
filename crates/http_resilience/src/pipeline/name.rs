// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

/// Derives a destination name from a consumer type.
///
/// The name is the type name without module paths. Generic arguments are rendered the
/// same way, separated by commas without spaces.
///
/// # Examples
///
/// ```
/// use http_resilience::destination_name;
///
/// struct CatalogClient;
///
/// assert_eq!(destination_name::<CatalogClient>(), "CatalogClient");
/// assert_eq!(destination_name::<Vec<String>>(), "Vec<String>");
/// assert_eq!(
///     destination_name::<std::collections::HashMap<u32, Vec<u8>>>(),
///     "HashMap<u32,Vec<u8>>"
/// );
/// ```
#[must_use]
pub fn destination_name<T: ?Sized>() -> String {
    short_type_name(std::any::type_name::<T>())
}

fn short_type_name(full: &str) -> String {
    let mut name = String::with_capacity(full.len());
    // Start of the path segment currently being written.
    let mut segment_start = 0;
    let mut chars = full.chars().peekable();

    while let Some(c) = chars.next() {
        match c {
            ':' if chars.peek() == Some(&':') => {
                chars.next();
                name.truncate(segment_start);
            }
            ' ' if name.ends_with([',', ';']) => {}
            '<' | '>' | ',' | ';' | '(' | ')' | '[' | ']' | '&' | '*' | ' ' => {
                name.push(c);
                segment_start = name.len();
            }
            _ => name.push(c),
        }
    }

    name
}
