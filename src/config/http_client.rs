//! Outbound HTTP transport settings (`matrix_http_config`).
//!
//! The settings are parsed strictly like the rest of the file and turned into
//! a ready-to-use [`HttpTransport`] once per load, so a bad CA bundle or a
//! missing credentials file fails the reload instead of the next alert.

use crate::config::secret::Secret;
use reqwest::header::{HeaderValue, AUTHORIZATION};
use reqwest::{redirect, Certificate, Client, Identity, Method, Proxy, RequestBuilder};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use url::Url;

/// HTTP client configuration for requests to the homeserver.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct HttpClientConfig {
    /// HTTP basic authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub basic_auth: Option<BasicAuth>,
    /// `Authorization` header with a configurable scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization: Option<Authorization>,
    /// Shorthand for `authorization` with the `Bearer` scheme.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token: Option<Secret>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bearer_token_file: Option<PathBuf>,
    /// Proxy used for every outbound request.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_url: Option<Url>,
    pub follow_redirects: bool,
    pub tls_config: TlsConfig,
}

impl Default for HttpClientConfig {
    fn default() -> Self {
        Self {
            basic_auth: None,
            authorization: None,
            bearer_token: None,
            bearer_token_file: None,
            proxy_url: None,
            follow_redirects: true,
            tls_config: TlsConfig::default(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct BasicAuth {
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub password_file: Option<PathBuf>,
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Authorization {
    #[serde(default = "default_auth_scheme", rename = "type")]
    pub scheme: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials: Option<Secret>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub credentials_file: Option<PathBuf>,
}

fn default_auth_scheme() -> String {
    "Bearer".to_string()
}

/// TLS settings. Client keys must be PEM-encoded PKCS#8.
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(default, deny_unknown_fields)]
pub struct TlsConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cert_file: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub key_file: Option<PathBuf>,
    pub insecure_skip_verify: bool,
}

/// Credentials attached to every outbound request.
#[derive(Clone)]
enum Credentials {
    Basic { username: String, password: Secret },
    Header(HeaderValue),
}

/// A built HTTP client plus the credentials it sends.
#[derive(Clone)]
pub struct HttpTransport {
    client: Client,
    credentials: Option<Credentials>,
}

impl std::fmt::Debug for HttpTransport {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let auth = match &self.credentials {
            None => "none",
            Some(Credentials::Basic { .. }) => "basic",
            Some(Credentials::Header(_)) => "authorization",
        };
        f.debug_struct("HttpTransport").field("auth", &auth).finish_non_exhaustive()
    }
}

impl HttpTransport {
    /// Starts a request with the configured credentials already applied.
    pub fn request(&self, method: Method, url: Url) -> RequestBuilder {
        let builder = self.client.request(method, url);
        match &self.credentials {
            None => builder,
            Some(Credentials::Basic { username, password }) => {
                builder.basic_auth(username, Some(password.expose()))
            }
            Some(Credentials::Header(value)) => builder.header(AUTHORIZATION, value.clone()),
        }
    }
}

impl HttpClientConfig {
    /// Checks the combinations serde cannot express on its own.
    pub fn validate(&self) -> Result<(), String> {
        let auth_methods = [
            self.basic_auth.is_some(),
            self.authorization.is_some(),
            self.bearer_token.is_some() || self.bearer_token_file.is_some(),
        ];
        if auth_methods.iter().filter(|set| **set).count() > 1 {
            return Err(
                "at most one of basic_auth, authorization and bearer_token may be configured"
                    .to_string(),
            );
        }
        if self.bearer_token.is_some() && self.bearer_token_file.is_some() {
            return Err("bearer_token and bearer_token_file are mutually exclusive".to_string());
        }
        if let Some(basic) = &self.basic_auth {
            if basic.password.is_some() && basic.password_file.is_some() {
                return Err("basic_auth: password and password_file are mutually exclusive".to_string());
            }
        }
        if let Some(auth) = &self.authorization {
            if auth.credentials.is_some() && auth.credentials_file.is_some() {
                return Err(
                    "authorization: credentials and credentials_file are mutually exclusive"
                        .to_string(),
                );
            }
            if auth.scheme.eq_ignore_ascii_case("basic") {
                return Err("authorization: use basic_auth instead of type Basic".to_string());
            }
        }
        if self.tls_config.cert_file.is_some() != self.tls_config.key_file.is_some() {
            return Err("tls_config: cert_file and key_file must be set together".to_string());
        }
        if let Some(proxy) = &self.proxy_url {
            if !matches!(proxy.scheme(), "http" | "https") {
                return Err(format!("proxy_url: unsupported scheme {:?}", proxy.scheme()));
            }
        }
        Ok(())
    }

    /// Builds the HTTP/1.1 client, reading any referenced files.
    pub fn build(&self) -> Result<HttpTransport, String> {
        let mut builder = Client::builder()
            .http1_only()
            .user_agent(concat!("alertmanager_matrix/", env!("CARGO_PKG_VERSION")));

        if !self.follow_redirects {
            builder = builder.redirect(redirect::Policy::none());
        }

        // Proxy environment variables are ignored; only proxy_url counts.
        builder = match &self.proxy_url {
            Some(proxy) => {
                let proxy = Proxy::all(proxy.as_str()).map_err(|e| format!("proxy_url: {e}"))?;
                builder.proxy(proxy)
            }
            None => builder.no_proxy(),
        };

        let tls = &self.tls_config;
        if let Some(ca_file) = &tls.ca_file {
            let pem = read_file(ca_file)?;
            let ca = Certificate::from_pem(&pem)
                .map_err(|e| format!("tls_config: invalid CA certificate {}: {e}", ca_file.display()))?;
            builder = builder.add_root_certificate(ca);
        }
        if let (Some(cert_file), Some(key_file)) = (&tls.cert_file, &tls.key_file) {
            let cert = read_file(cert_file)?;
            let key = read_file(key_file)?;
            let identity = Identity::from_pkcs8_pem(&cert, &key)
                .map_err(|e| format!("tls_config: invalid client certificate: {e}"))?;
            builder = builder.identity(identity);
        }
        if tls.insecure_skip_verify {
            builder = builder.danger_accept_invalid_certs(true);
        }

        let credentials = self.credentials()?;
        let client = builder.build().map_err(|e| e.to_string())?;
        Ok(HttpTransport {
            client,
            credentials,
        })
    }

    fn credentials(&self) -> Result<Option<Credentials>, String> {
        if let Some(basic) = &self.basic_auth {
            let password = match (&basic.password, &basic.password_file) {
                (Some(password), _) => password.clone(),
                (None, Some(path)) => read_secret(path)?,
                (None, None) => Secret::new(""),
            };
            return Ok(Some(Credentials::Basic {
                username: basic.username.clone(),
                password,
            }));
        }

        let (scheme, credentials) = if let Some(auth) = &self.authorization {
            let credentials = match (&auth.credentials, &auth.credentials_file) {
                (Some(credentials), _) => credentials.clone(),
                (None, Some(path)) => read_secret(path)?,
                (None, None) => return Ok(None),
            };
            (auth.scheme.as_str(), credentials)
        } else if let Some(token) = &self.bearer_token {
            ("Bearer", token.clone())
        } else if let Some(path) = &self.bearer_token_file {
            ("Bearer", read_secret(path)?)
        } else {
            return Ok(None);
        };

        let header = format!("{} {}", scheme, credentials.expose());
        let mut value = HeaderValue::from_str(&header)
            .map_err(|_| "authorization: credentials contain invalid header characters".to_string())?;
        value.set_sensitive(true);
        Ok(Some(Credentials::Header(value)))
    }
}

fn read_file(path: &Path) -> Result<Vec<u8>, String> {
    std::fs::read(path).map_err(|e| format!("unable to read {}: {e}", path.display()))
}

fn read_secret(path: &Path) -> Result<Secret, String> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| format!("unable to read {}: {e}", path.display()))?;
    Ok(Secret::new(content.trim()))
}
