use url::Url;

use crate::data::ApiConfig;

/// Strip leading slashes so a path is stored in one canonical form.
pub fn normalize_path(path: &str) -> &str {
    path.trim_start_matches('/')
}

/// Join the endpoint's base path, the major version segment and `path`.
///
/// The result is the same whether or not `path` starts with a slash, and a
/// trailing slash on the endpoint never produces a doubled separator.
///
/// # Examples
///
/// ```
/// use bai_client::ApiConfig;
/// use bai_client::core::build_url;
///
/// let config = ApiConfig::new("https://api.backend.ai/gateway/").unwrap();
/// let a = build_url(&config, "/folders", &[]);
/// let b = build_url(&config, "folders", &[]);
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "https://api.backend.ai/gateway/v4/folders");
/// ```
pub fn build_url(config: &ApiConfig, path: &str, params: &[(String, String)]) -> Url {
    let endpoint = config.endpoint();
    let base = endpoint.path().trim_end_matches('/');
    let path = normalize_path(path);

    let mut full = format!("{}/{}", base, config.major_version());
    if !path.is_empty() {
        full.push('/');
        full.push_str(path);
    }

    let mut url = endpoint.clone();
    url.set_fragment(None);
    url.set_query(None);
    url.set_path(&full);
    if !params.is_empty() {
        url.query_pairs_mut().extend_pairs(params.iter().map(|(k, v)| (k.as_str(), v.as_str())));
    }
    url
}

/// Host-relative form of `url` (path plus query) that goes into the signature.
pub fn rel_url(url: &Url) -> String {
    match url.query() {
        Some(query) => format!("{}?{}", url.path(), query),
        None => url.path().to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(endpoint: &str) -> ApiConfig {
        ApiConfig::new(endpoint).unwrap()
    }

    #[test]
    fn test_leading_slash_is_irrelevant() {
        let config = config("https://api.backend.ai");
        for path in ["session", "/session", "//session"] {
            assert_eq!(build_url(&config, path, &[]).as_str(), "https://api.backend.ai/v4/session");
        }
    }

    #[test]
    fn test_endpoint_base_path_kept() {
        let config = config("http://127.0.0.1:8081/proxy/");
        let url = build_url(&config, "folders/data/upload", &[]);
        assert_eq!(url.as_str(), "http://127.0.0.1:8081/proxy/v4/folders/data/upload");
    }

    #[test]
    fn test_empty_path() {
        let config = config("https://api.backend.ai");
        assert_eq!(build_url(&config, "", &[]).path(), "/v4");
        assert_eq!(build_url(&config, "/", &[]).path(), "/v4");
    }

    #[test]
    fn test_major_version_follows_config() {
        let config = config("https://api.backend.ai").version("v5.20191215");
        assert_eq!(build_url(&config, "/", &[]).path(), "/v5");
    }

    #[test]
    fn test_query_params_and_rel_url() {
        let config = config("https://api.backend.ai");
        let params = vec![
            ("path".to_string(), "a b".to_string()),
            ("owner".to_string(), "me".to_string()),
        ];
        let url = build_url(&config, "/folders/data/files", &params);
        assert_eq!(url.query(), Some("path=a+b&owner=me"));
        assert_eq!(rel_url(&url), "/v4/folders/data/files?path=a+b&owner=me");
    }

    #[test]
    fn test_rel_url_without_query() {
        let url = Url::parse("https://api.backend.ai/v4/session").unwrap();
        assert_eq!(rel_url(&url), "/v4/session");
    }
}
