use std::time::Duration;

/// Where and how to reach Elasticsearch.
#[derive(Clone)]
pub struct ElasticsearchConfig {
    pub host: String,
    pub port: u16,
    pub user: Option<String>,
    pub password: Option<String>,
    pub use_ssl: bool,
    /// Per-request timeout
    pub timeout: Duration,
}

impl Default for ElasticsearchConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 9200,
            user: None,
            password: None,
            use_ssl: false,
            timeout: Duration::from_secs(30),
        }
    }
}

impl std::fmt::Debug for ElasticsearchConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ElasticsearchConfig")
            .field("host", &self.host)
            .field("port", &self.port)
            .field("user", &self.user)
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("use_ssl", &self.use_ssl)
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl ElasticsearchConfig {
    pub fn base_url(&self) -> String {
        let scheme = if self.use_ssl { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.host, self.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_url() {
        let mut config = ElasticsearchConfig::default();
        assert_eq!(config.base_url(), "http://localhost:9200");
        config.use_ssl = true;
        config.host = "search.internal".to_string();
        assert_eq!(config.base_url(), "https://search.internal:9200");
    }

    #[test]
    fn test_debug_hides_password() {
        let config = ElasticsearchConfig {
            user: Some("elastic".to_string()),
            password: Some("s3cret".to_string()),
            ..Default::default()
        };
        let printed = format!("{config:?}");
        assert!(printed.contains("elastic"));
        assert!(!printed.contains("s3cret"));
    }
}
