//! URL quantization
//!
//! Raw URLs are high-cardinality: every user id or session token in a query
//! string would otherwise become its own `http.url` value. Quantization
//! collapses query values to `?` while keeping the keys, so `/users?id=5`
//! reads `/users?id=?`. The function is pure and total: input it cannot
//! make sense of comes back unchanged.

use crate::config::QuantizeOptions;

/// Placeholder substituted for a collapsed query value.
const PLACEHOLDER: &str = "?";

/// Quantize a URL according to `options`.
///
/// Query values collapse to `?` unless their key is in `options.show`;
/// keys in `options.exclude` are dropped entirely; the fragment is stripped
/// unless `options.fragment` is set. The path is left untouched.
pub fn quantize_url(url: &str, options: &QuantizeOptions) -> String {
    if url.is_empty() {
        return url.to_string();
    }

    let (base, fragment) = match url.split_once('#') {
        Some((base, fragment)) => (base, Some(fragment)),
        None => (url, None),
    };

    let quantized = match base.split_once('?') {
        Some((path, query)) => {
            let query = quantize_query(query, options);
            if query.is_empty() {
                path.to_string()
            } else {
                format!("{path}?{query}")
            }
        }
        None => base.to_string(),
    };

    match fragment {
        Some(fragment) if options.fragment => format!("{quantized}#{fragment}"),
        _ => quantized,
    }
}

fn quantize_query(query: &str, options: &QuantizeOptions) -> String {
    let pairs: Vec<String> = query
        .split('&')
        .filter(|pair| !pair.is_empty())
        .filter_map(|pair| {
            let (key, value) = match pair.split_once('=') {
                Some((key, value)) => (key, Some(value)),
                None => (pair, None),
            };
            if options.exclude.iter().any(|k| k == key) {
                return None;
            }
            let keep_value = options.show.iter().any(|k| k == key);
            Some(match value {
                Some(value) if keep_value => format!("{key}={value}"),
                Some(_) => format!("{key}={PLACEHOLDER}"),
                None => key.to_string(),
            })
        })
        .collect();
    pairs.join("&")
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn defaults() -> QuantizeOptions {
        QuantizeOptions::new()
    }

    #[test]
    fn test_collapses_query_values() {
        assert_eq!(quantize_url("/users?id=5", &defaults()), "/users?id=?");
        assert_eq!(
            quantize_url("/search?q=rust&page=3", &defaults()),
            "/search?q=?&page=?"
        );
    }

    #[test]
    fn test_path_only_url_unchanged() {
        assert_eq!(quantize_url("/users", &defaults()), "/users");
        assert_eq!(quantize_url("", &defaults()), "");
    }

    #[test]
    fn test_valueless_key_kept_as_is() {
        assert_eq!(quantize_url("/feed?refresh", &defaults()), "/feed?refresh");
    }

    #[test]
    fn test_show_list_keeps_values() {
        let options = defaults().with_show(["page"]);
        assert_eq!(
            quantize_url("/search?q=rust&page=3", &options),
            "/search?q=?&page=3"
        );
    }

    #[test]
    fn test_exclude_list_drops_pairs() {
        let options = defaults().with_exclude(["token"]);
        assert_eq!(quantize_url("/cb?token=abc&state=5", &options), "/cb?state=?");
        // query vanishing entirely drops the separator too
        assert_eq!(quantize_url("/cb?token=abc", &options), "/cb");
    }

    #[test]
    fn test_fragment_stripped_by_default() {
        assert_eq!(quantize_url("/doc?v=2#section-3", &defaults()), "/doc?v=?");
        let options = defaults().with_fragment(true);
        assert_eq!(quantize_url("/doc?v=2#section-3", &options), "/doc?v=?#section-3");
    }

    #[test]
    fn test_absolute_url() {
        assert_eq!(
            quantize_url("http://example.com/users?id=5", &defaults()),
            "http://example.com/users?id=?"
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(200))]

        // Quantization never exposes a query value that is not on the show
        // list, and the path part always survives verbatim.
        #[test]
        fn prop_values_never_leak(
            path in "/[a-z]{1,8}(/[a-z]{1,8})?",
            key in "[a-z]{1,6}",
            value in "[A-Za-z0-9]{1,12}",
        ) {
            let url = format!("{path}?{key}={value}");
            let out = quantize_url(&url, &defaults());
            prop_assert_eq!(out, format!("{}?{}=?", path, key));
        }

        // Quantization is idempotent: a second pass changes nothing.
        #[test]
        fn prop_idempotent(
            path in "/[a-z]{1,8}",
            key_a in "[a-z]{1,6}",
            key_b in "[a-z]{1,6}",
            value in "[A-Za-z0-9]{0,12}",
        ) {
            let url = format!("{path}?{key_a}={value}&{key_b}");
            let once = quantize_url(&url, &defaults());
            let twice = quantize_url(&once, &defaults());
            prop_assert_eq!(once, twice);
        }
    }
}
