//! Cache tags derived from a request path.
//!
//! A write to `/shipments/42` touches the resource (`42`) and its collection
//! (`shipments`). Reads register under the same tags by default, so the
//! write can invalidate them without the caller listing tags.

/// Trailing path segment, then its parent when present.
pub fn related_tags(url: &str) -> Vec<String> {
    let path = path_of(url);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let mut tags = Vec::with_capacity(2);
    if let Some(last) = segments.last() {
        tags.push((*last).to_string());
    }
    if segments.len() >= 2 {
        tags.push(segments[segments.len() - 2].to_string());
    }
    tags
}

fn path_of(url: &str) -> &str {
    let url = url.trim();
    let url = url.split(['?', '#']).next().unwrap_or(url);

    match url.split_once("://") {
        Some((_, rest)) => rest.find('/').map_or("", |idx| &rest[idx..]),
        None => url,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_item_path() {
        assert_eq!(related_tags("/shipments/42"), vec!["42", "shipments"]);
    }

    #[test]
    fn test_collection_path() {
        assert_eq!(related_tags("/shipments"), vec!["shipments"]);
        assert_eq!(related_tags("shipments/"), vec!["shipments"]);
    }

    #[test]
    fn test_nested_path_uses_last_two() {
        assert_eq!(related_tags("/clients/7/invoices"), vec!["invoices", "7"]);
    }

    #[test]
    fn test_query_and_fragment_ignored() {
        assert_eq!(related_tags("/invoices/9?expand=lines#top"), vec!["9", "invoices"]);
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(related_tags("https://api.example.com/v1/cargo/5"), vec!["5", "cargo"]);
        assert!(related_tags("https://api.example.com").is_empty());
    }

    #[test]
    fn test_root() {
        assert!(related_tags("/").is_empty());
        assert!(related_tags("").is_empty());
    }
}
