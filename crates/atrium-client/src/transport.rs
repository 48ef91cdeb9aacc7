// ABOUTME: Hardened HTTP transport construction for atrium-client
// ABOUTME: Trust roots, alternate-hostname verification, proxy auth, fixed header chain

use std::fs::File;
use std::io::BufReader;
use std::path::PathBuf;
use std::process::Command;
use std::sync::Arc;
use std::time::{Duration, SystemTime};

use reqwest::header::{HeaderMap, HeaderName, HeaderValue, USER_AGENT};
use rustls::client::{ServerCertVerified, ServerCertVerifier, WebPkiVerifier};
use rustls::{Certificate, CertificateError, Error as TlsError, OwnedTrustAnchor, RootCertStore, ServerName};

use crate::error::ClientError;

/// Header carrying the session token on every request (header names are
/// case-insensitive on the wire).
pub const SESSION_TOKEN_HEADER: &str = "atrium-session-token";

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(10);
const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

/// TLS trust settings.
#[derive(Debug, Clone, Default)]
pub struct TlsConfig {
    /// PEM bundle overriding the default trust roots. None falls back to the
    /// bundled webpki roots.
    pub ca_path: Option<PathBuf>,
    /// Additional hostname accepted by certificate verification, on top of
    /// the URL's own host.
    pub alt_hostname: Option<String>,
}

/// Proxy settings. Credentials are only attached when `use_auth` is set and
/// both username and password are present.
#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub url: String,
    pub use_auth: bool,
    pub username: Option<String>,
    pub password: Option<String>,
}

impl ProxyConfig {
    /// Basic credentials to attach, or None when the authenticator declines.
    fn basic_credentials(&self) -> Option<(&str, &str)> {
        if !self.use_auth {
            return None;
        }
        match (self.username.as_deref(), self.password.as_deref()) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some((user, pass))
            }
            _ => None,
        }
    }
}

/// Externally supplied transport settings, immutable for the lifetime of one
/// client instance.
#[derive(Debug, Clone, Default)]
pub struct TransportConfig {
    pub tls: TlsConfig,
    pub proxy: Option<ProxyConfig>,
    /// Shell command whose stdout supplies extra headers, one `NAME=VALUE`
    /// per line.
    pub header_command: Option<String>,
    pub connect_timeout: Option<Duration>,
    pub request_timeout: Option<Duration>,
}

impl TransportConfig {
    pub fn with_ca_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.tls.ca_path = Some(path.into());
        self
    }

    pub fn with_alt_hostname(mut self, hostname: impl Into<String>) -> Self {
        self.tls.alt_hostname = Some(hostname.into());
        self
    }

    pub fn with_proxy(mut self, proxy: ProxyConfig) -> Self {
        self.proxy = Some(proxy);
        self
    }

    pub fn with_header_command(mut self, command: impl Into<String>) -> Self {
        self.header_command = Some(command.into());
        self
    }
}

/// Delegates to webpki verification and, on a name mismatch only, retries
/// against the configured alternate hostname.
struct AltHostnameVerifier {
    inner: WebPkiVerifier,
    alt_hostname: Option<ServerName>,
}

impl ServerCertVerifier for AltHostnameVerifier {
    fn verify_server_cert(
        &self,
        end_entity: &Certificate,
        intermediates: &[Certificate],
        server_name: &ServerName,
        scts: &mut dyn Iterator<Item = &[u8]>,
        ocsp_response: &[u8],
        now: SystemTime,
    ) -> Result<ServerCertVerified, TlsError> {
        let verdict = self.inner.verify_server_cert(
            end_entity,
            intermediates,
            server_name,
            scts,
            ocsp_response,
            now,
        );
        match (&verdict, &self.alt_hostname) {
            (Err(TlsError::InvalidCertificate(CertificateError::NotValidForName)), Some(alt)) => {
                self.inner.verify_server_cert(
                    end_entity,
                    intermediates,
                    alt,
                    &mut std::iter::empty(),
                    ocsp_response,
                    now,
                )
            }
            _ => verdict,
        }
    }
}

/// Assemble the reusable HTTP client. Construction order is fixed: trust
/// evaluation first, then proxy, then the default header chain. No network
/// I/O happens here, and any failure aborts construction entirely.
pub(crate) fn build_transport(
    token: &str,
    user_agent: &str,
    config: &TransportConfig,
) -> Result<reqwest::Client, ClientError> {
    let tls = tls_client_config(&config.tls)?;

    let mut builder = reqwest::Client::builder()
        .use_preconfigured_tls(tls)
        .connect_timeout(config.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT))
        .timeout(config.request_timeout.unwrap_or(DEFAULT_REQUEST_TIMEOUT));

    if let Some(proxy_config) = &config.proxy {
        let mut proxy = reqwest::Proxy::all(&proxy_config.url)
            .map_err(|e| ClientError::InvalidUrl(format!("proxy {}: {}", proxy_config.url, e)))?;
        if let Some((user, pass)) = proxy_config.basic_credentials() {
            proxy = proxy.basic_auth(user, pass);
        }
        builder = builder.proxy(proxy);
    }

    builder = builder.default_headers(default_headers(token, user_agent, config)?);

    let client = builder
        .build()
        .map_err(|e| ClientError::TlsSetup(e.to_string()))?;

    tracing::debug!(
        custom_ca = config.tls.ca_path.is_some(),
        alt_hostname = config.tls.alt_hostname.is_some(),
        proxy = config.proxy.is_some(),
        header_command = config.header_command.is_some(),
        "transport constructed"
    );

    Ok(client)
}

/// Headers attached to every request, in fixed order: session token,
/// user-agent, then pairs from the header command.
fn default_headers(
    token: &str,
    user_agent: &str,
    config: &TransportConfig,
) -> Result<HeaderMap, ClientError> {
    let mut headers = HeaderMap::new();

    let mut token_value = HeaderValue::from_str(token)
        .map_err(|e| ClientError::InvalidHeader(format!("session token: {}", e)))?;
    token_value.set_sensitive(true);
    headers.insert(HeaderName::from_static(SESSION_TOKEN_HEADER), token_value);

    headers.insert(
        USER_AGENT,
        HeaderValue::from_str(user_agent)
            .map_err(|e| ClientError::InvalidHeader(format!("user agent: {}", e)))?,
    );

    if let Some(command) = &config.header_command {
        for (name, value) in run_header_command(command)? {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", name, e)))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| ClientError::InvalidHeader(format!("{}: {}", name, e)))?;
            headers.insert(name, value);
        }
    }

    Ok(headers)
}

/// Run the external header-source command and parse its stdout.
fn run_header_command(command: &str) -> Result<Vec<(String, String)>, ClientError> {
    #[cfg(unix)]
    let output = Command::new("/bin/sh").arg("-c").arg(command).output();
    #[cfg(windows)]
    let output = Command::new("cmd").arg("/C").arg(command).output();

    let output =
        output.map_err(|e| ClientError::HeaderCommand(format!("{}: {}", command, e)))?;
    if !output.status.success() {
        return Err(ClientError::HeaderCommand(format!(
            "{}: exited with {}",
            command, output.status
        )));
    }

    parse_header_pairs(&String::from_utf8_lossy(&output.stdout))
}

/// Parse `NAME=VALUE` lines. Blank lines are skipped; anything else without
/// an `=` is malformed.
fn parse_header_pairs(stdout: &str) -> Result<Vec<(String, String)>, ClientError> {
    let mut pairs = Vec::new();
    for line in stdout.lines() {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        let (name, value) = line.split_once('=').ok_or_else(|| {
            ClientError::HeaderCommand(format!("malformed header line: {}", line))
        })?;
        pairs.push((name.trim().to_string(), value.trim().to_string()));
    }
    Ok(pairs)
}

/// rustls client config with the configured trust roots and the
/// alternate-hostname verifier layered over webpki verification.
fn tls_client_config(tls: &TlsConfig) -> Result<rustls::ClientConfig, ClientError> {
    let mut roots = RootCertStore::empty();
    match &tls.ca_path {
        Some(path) => {
            let file = File::open(path).map_err(|e| {
                ClientError::TlsSetup(format!("CA bundle {}: {}", path.display(), e))
            })?;
            let certs = rustls_pemfile::certs(&mut BufReader::new(file)).map_err(|e| {
                ClientError::TlsSetup(format!("CA bundle {}: {}", path.display(), e))
            })?;
            if certs.is_empty() {
                return Err(ClientError::TlsSetup(format!(
                    "CA bundle {}: no certificates found",
                    path.display()
                )));
            }
            for der in certs {
                roots.add(&Certificate(der)).map_err(|e| {
                    ClientError::TlsSetup(format!("CA bundle {}: {}", path.display(), e))
                })?;
            }
        }
        None => {
            roots.add_trust_anchors(webpki_roots::TLS_SERVER_ROOTS.iter().map(|ta| {
                OwnedTrustAnchor::from_subject_spki_name_constraints(
                    ta.subject,
                    ta.spki,
                    ta.name_constraints,
                )
            }));
        }
    }

    let alt_hostname = tls
        .alt_hostname
        .as_deref()
        .map(|name| {
            ServerName::try_from(name)
                .map_err(|e| ClientError::TlsSetup(format!("alt hostname {}: {}", name, e)))
        })
        .transpose()?;

    let verifier = AltHostnameVerifier {
        inner: WebPkiVerifier::new(roots, None),
        alt_hostname,
    };

    Ok(rustls::ClientConfig::builder()
        .with_safe_defaults()
        .with_custom_certificate_verifier(Arc::new(verifier))
        .with_no_client_auth())
}

/// Compose the user-agent from the caller identity plus host OS and
/// architecture, e.g. `Atrium Toolbox/1.4.0 (Ubuntu 24.04; x86_64)`.
pub(crate) fn user_agent(identity: &str) -> String {
    let os_name = sysinfo::System::name().unwrap_or_else(|| "unknown".to_string());
    let os_version = sysinfo::System::os_version().unwrap_or_else(|| "unknown".to_string());
    compose_user_agent(identity, &os_name, &os_version, std::env::consts::ARCH)
}

fn compose_user_agent(identity: &str, os_name: &str, os_version: &str, arch: &str) -> String {
    format!("{} ({} {}; {})", identity, os_name, os_version, arch)
}
