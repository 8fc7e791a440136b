//! Azure Blob Storage connector.
//!
//! Talks to the Blob service REST API directly with blocking `reqwest`.
//! Requests are authorized with one of:
//!
//! - **Shared Key**: HMAC-SHA256 over the canonical request, keyed with the
//!   base64-decoded account key (`hmac` + `sha2` + `base64`),
//! - **SAS**: the token's query parameters are appended to every URL,
//! - **Bearer**: an OAuth access token in the `Authorization` header.
//!
//! Container listings are XML, parsed with `quick-xml`, and paginated via
//! `NextMarker`.
//!
//! # Locations
//!
//! ```text
//! https://<account>.blob.core.windows.net/<container>[/<base_path>][?<sas>]
//! az://<account>/<container>[/<base_path>]
//! http://127.0.0.1:10000/<account>/<container>[/<base_path>]   (Azurite)
//! ```

use std::collections::BTreeMap;

use anyhow::{bail, Context, Result};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use quick_xml::events::Event;
use reqwest::blocking::{Client, Response};
use reqwest::{Method, Url};
use sha2::Sha256;
use tracing::{debug, info};

use csv_shuttle_core::scope::{
    is_delimited_text, normalize_base_path, relative_to, SubfolderSelection,
};

use crate::config::AzureSettings;
use crate::error::ShuttleError;
use crate::models::{CandidateFile, Origin};
use crate::remote::credentials::{Credential, CredentialSource, ResolvedCredential};
use crate::remote::{ObjectStore, RemoteObject};

type HmacSha256 = Hmac<Sha256>;

/// REST API version sent with every request.
const API_VERSION: &str = "2021-08-06";

/// Whether `location` names a remote container rather than a local path.
pub fn is_remote(location: &str) -> bool {
    let lower = location.to_ascii_lowercase();
    lower.starts_with("az://") || lower.starts_with("https://") || lower.starts_with("http://")
}

/// A parsed container URL.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemoteLocation {
    pub account: String,
    pub container: String,
    /// Normalized base path: `""` or `"some/path/"`.
    pub base_path: String,
    /// SAS query string embedded in the URL, without `?`.
    pub sas: Option<String>,
    /// Blob service endpoint, e.g. `https://acct.blob.core.windows.net`.
    pub endpoint: String,
}

impl RemoteLocation {
    pub fn parse(location: &str) -> Result<Self> {
        let invalid = |reason: &str| ShuttleError::InvalidLocation {
            location: strip_query(location).to_string(),
            reason: reason.to_string(),
        };

        let url = Url::parse(location).map_err(|e| invalid(&e.to_string()))?;
        let host = url.host_str().ok_or_else(|| invalid("missing host"))?;
        let mut segments: Vec<String> = url
            .path_segments()
            .map(|s| s.filter(|p| !p.is_empty()).map(percent_decode).collect())
            .unwrap_or_default();

        let (account, endpoint) = match url.scheme() {
            "az" => (
                host.to_string(),
                format!("https://{}.blob.core.windows.net", host),
            ),
            "https" | "http" if is_path_style_host(host) => {
                if segments.is_empty() {
                    return Err(invalid("missing account name in path").into());
                }
                let account = segments.remove(0);
                let authority = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                let endpoint = format!("{}://{}/{}", url.scheme(), authority, account);
                (account, endpoint)
            }
            "https" | "http" => {
                let account = host.split('.').next().unwrap_or(host).to_string();
                let authority = match url.port() {
                    Some(port) => format!("{}:{}", host, port),
                    None => host.to_string(),
                };
                (account, format!("{}://{}", url.scheme(), authority))
            }
            other => return Err(invalid(&format!("unsupported scheme '{}'", other)).into()),
        };

        if segments.is_empty() {
            return Err(invalid("missing container name").into());
        }
        let container = segments.remove(0);
        let base_path = normalize_base_path(&segments.join("/"));
        let sas = url.query().filter(|q| !q.is_empty()).map(str::to_string);

        Ok(Self {
            account,
            container,
            base_path,
            sas,
            endpoint,
        })
    }

    /// `account/container/base_path` for messages; never includes the SAS.
    pub fn display(&self) -> String {
        format!("{}/{}/{}", self.account, self.container, self.base_path)
    }
}

fn is_path_style_host(host: &str) -> bool {
    host == "localhost" || host.parse::<std::net::IpAddr>().is_ok()
}

fn strip_query(location: &str) -> &str {
    location.split('?').next().unwrap_or(location)
}

/// [`ObjectStore`] over the Azure Blob REST API.
pub struct AzureBlobStore {
    client: Client,
    endpoint: String,
    container: String,
    credential: Credential,
}

impl AzureBlobStore {
    /// Build a store for `location`.
    ///
    /// Endpoint precedence: `endpoint_override`, then a blob endpoint from
    /// the connection string, then the one implied by the URL.
    pub fn new(
        location: &RemoteLocation,
        resolved: ResolvedCredential,
        endpoint_override: Option<&str>,
    ) -> Result<Self> {
        let endpoint = endpoint_override
            .map(str::to_string)
            .or(resolved.blob_endpoint)
            .unwrap_or_else(|| location.endpoint.clone())
            .trim_end_matches('/')
            .to_string();

        let client = Client::builder()
            .user_agent(concat!("csv-shuttle/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build HTTP client")?;

        debug!(
            endpoint = %endpoint,
            container = %location.container,
            auth = resolved.credential.kind(),
            "Connecting to blob storage"
        );

        Ok(Self {
            client,
            endpoint,
            container: location.container.clone(),
            credential: resolved.credential,
        })
    }

    /// Resolve credentials for `location` from `settings` and build the store.
    ///
    /// Fails with [`ShuttleError::AuthResolution`] before any request is made
    /// when no credential can be found.
    pub fn connect(location: &RemoteLocation, settings: &AzureSettings) -> Result<Self> {
        let resolved = CredentialSource::from_settings(settings)
            .resolve(&location.account, location.sas.as_deref())?;
        info!(
            "Connecting to container '{}' on account '{}' ({} auth)",
            location.container,
            location.account,
            resolved.credential.kind()
        );
        Self::new(location, resolved, settings.endpoint.as_deref())
    }

    fn container_url(&self, query: &[(&str, &str)]) -> Result<Url> {
        let mut url = Url::parse(&format!("{}/{}", self.endpoint, uri_encode(&self.container)))?;
        set_query(&mut url, query);
        Ok(url)
    }

    fn blob_url(&self, name: &str) -> Result<Url> {
        let encoded = name.split('/').map(uri_encode).collect::<Vec<_>>().join("/");
        Ok(Url::parse(&format!(
            "{}/{}/{}",
            self.endpoint,
            uri_encode(&self.container),
            encoded
        ))?)
    }

    fn send(
        &self,
        method: Method,
        mut url: Url,
        body: Option<&[u8]>,
        extra_headers: &[(&str, &str)],
    ) -> Result<Response> {
        let date = Utc::now().format("%a, %d %b %Y %H:%M:%S GMT").to_string();
        let mut ms_headers: Vec<(String, String)> = vec![
            ("x-ms-date".to_string(), date),
            ("x-ms-version".to_string(), API_VERSION.to_string()),
        ];
        for (name, value) in extra_headers {
            ms_headers.push((name.to_string(), value.to_string()));
        }
        let content_type = if body.is_some() { "text/csv" } else { "" };
        let content_length = body.map(|b| b.len()).unwrap_or(0);

        let authorization = match &self.credential {
            Credential::SharedKey { account, key } => {
                let to_sign = string_to_sign(
                    method.as_str(),
                    content_length,
                    content_type,
                    &ms_headers,
                    &canonical_resource(account, &url),
                );
                Some(format!("SharedKey {}:{}", account, sign(key, &to_sign)?))
            }
            Credential::Sas(sas) => {
                let query = match url.query() {
                    Some(q) if !q.is_empty() => format!("{}&{}", q, sas),
                    _ => sas.clone(),
                };
                url.set_query(Some(&query));
                None
            }
            Credential::Bearer(token) => Some(format!("Bearer {}", token)),
        };

        let mut request = self.client.request(method.clone(), url);
        for (name, value) in &ms_headers {
            request = request.header(name.as_str(), value.as_str());
        }
        if let Some(auth) = authorization {
            request = request.header("Authorization", auth);
        }
        if let Some(body) = body {
            request = request
                .header("Content-Type", content_type)
                .body(body.to_vec());
        }

        let response = request
            .send()
            .map_err(|e| ShuttleError::Remote(format!("{} request failed: {}", method, e)))?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().unwrap_or_default();
            return Err(ShuttleError::Remote(format!(
                "{} failed (HTTP {}): {}",
                method,
                status,
                text.chars().take(500).collect::<String>()
            ))
            .into());
        }
        Ok(response)
    }
}

impl ObjectStore for AzureBlobStore {
    fn container(&self) -> &str {
        &self.container
    }

    fn list(&self, prefix: &str) -> Result<Vec<RemoteObject>> {
        let mut objects = Vec::new();
        let mut marker: Option<String> = None;
        loop {
            let mut query = vec![("restype", "container"), ("comp", "list")];
            if !prefix.is_empty() {
                query.push(("prefix", prefix));
            }
            if let Some(ref m) = marker {
                query.push(("marker", m.as_str()));
            }
            let url = self.container_url(&query)?;
            let body = self
                .send(Method::GET, url, None, &[])
                .with_context(|| format!("Failed to list container '{}'", self.container))?
                .text()?;

            let page = parse_list_response(&body)?;
            debug!(count = page.objects.len(), "Listed page");
            objects.extend(page.objects);
            match page.next_marker {
                Some(next) if !next.is_empty() => marker = Some(next),
                _ => break,
            }
        }
        Ok(objects)
    }

    fn download(&self, name: &str) -> Result<Vec<u8>> {
        let url = self.blob_url(name)?;
        let response = self.send(Method::GET, url, None, &[])?;
        Ok(response.bytes()?.to_vec())
    }

    fn upload(&self, name: &str, data: &[u8]) -> Result<()> {
        let url = self.blob_url(name)?;
        self.send(
            Method::PUT,
            url,
            Some(data),
            &[("x-ms-blob-type", "BlockBlob")],
        )?;
        Ok(())
    }
}

// ============ Shared Key signing ============

/// Shared Key string-to-sign for Blob service version 2015-02-21 and later.
fn string_to_sign(
    verb: &str,
    content_length: usize,
    content_type: &str,
    ms_headers: &[(String, String)],
    canonical_resource: &str,
) -> String {
    // Content-Length is empty, not "0", for bodiless requests.
    let length = if content_length == 0 {
        String::new()
    } else {
        content_length.to_string()
    };
    format!(
        "{}\n\n\n{}\n\n{}\n\n\n\n\n\n\n{}{}",
        verb,
        length,
        content_type,
        canonical_headers(ms_headers),
        canonical_resource
    )
}

fn canonical_headers(ms_headers: &[(String, String)]) -> String {
    let mut headers: Vec<(String, &str)> = ms_headers
        .iter()
        .map(|(k, v)| (k.to_ascii_lowercase(), v.trim()))
        .filter(|(k, _)| k.starts_with("x-ms-"))
        .collect();
    headers.sort_by(|a, b| a.0.cmp(&b.0));
    headers
        .iter()
        .map(|(k, v)| format!("{}:{}\n", k, v))
        .collect()
}

/// `/{account}{encoded path}` followed by one `\n{name}:{values}` line per
/// query parameter, names lowercased and sorted.
fn canonical_resource(account: &str, url: &Url) -> String {
    let mut resource = format!("/{}{}", account, url.path());
    let mut params: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for (name, value) in url.query_pairs() {
        params
            .entry(name.to_ascii_lowercase())
            .or_default()
            .push(value.to_string());
    }
    for (name, mut values) in params {
        values.sort();
        resource.push_str(&format!("\n{}:{}", name, values.join(",")));
    }
    resource
}

fn sign(key: &[u8], string_to_sign: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(key)
        .map_err(|e| ShuttleError::AuthResolution(format!("unusable account key: {}", e)))?;
    mac.update(string_to_sign.as_bytes());
    Ok(BASE64.encode(mac.finalize().into_bytes()))
}

fn set_query(url: &mut Url, query: &[(&str, &str)]) {
    if query.is_empty() {
        return;
    }
    let encoded = query
        .iter()
        .map(|(k, v)| format!("{}={}", uri_encode(k), uri_encode(v)))
        .collect::<Vec<_>>()
        .join("&");
    url.set_query(Some(&encoded));
}

/// Percent-encode everything except RFC 3986 unreserved characters.
fn uri_encode(s: &str) -> String {
    let mut result = String::new();
    for byte in s.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                result.push(byte as char);
            }
            _ => result.push_str(&format!("%{:02X}", byte)),
        }
    }
    result
}

fn percent_decode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        if bytes[i] == b'%' && i + 2 < bytes.len() {
            let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
            if let Some(value) = hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                out.push(value);
                i += 3;
                continue;
            }
        }
        out.push(bytes[i]);
        i += 1;
    }
    String::from_utf8_lossy(&out).to_string()
}

// ============ Listing XML ============

struct ListPage {
    objects: Vec<RemoteObject>,
    next_marker: Option<String>,
}

/// Parse one `List Blobs` response page.
fn parse_list_response(xml: &str) -> Result<ListPage> {
    let mut reader = quick_xml::Reader::from_reader(xml.as_bytes());
    let mut buf = Vec::new();
    let mut path: Vec<String> = Vec::new();
    let mut text = String::new();

    let mut objects = Vec::new();
    let mut next_marker = None;
    let mut current: Option<RemoteObject> = None;

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => {
                let name = String::from_utf8_lossy(e.local_name().as_ref()).to_string();
                if name == "Blob" {
                    current = Some(RemoteObject {
                        name: String::new(),
                        size: 0,
                        last_modified: None,
                        etag: None,
                    });
                }
                path.push(name);
                text.clear();
            }
            Ok(Event::Text(t)) => {
                let value = t
                    .unescape()
                    .map_err(|e| ShuttleError::Remote(format!("bad listing XML: {}", e)))?;
                text.push_str(&value);
            }
            Ok(Event::CData(t)) => {
                text.push_str(&String::from_utf8_lossy(&t.into_inner()));
            }
            Ok(Event::End(_)) => {
                let leaf = path.last().map(String::as_str).unwrap_or_default();
                let parent = path
                    .len()
                    .checked_sub(2)
                    .and_then(|i| path.get(i))
                    .map(String::as_str)
                    .unwrap_or_default();
                match (parent, leaf) {
                    ("Blob", "Name") => {
                        if let Some(obj) = current.as_mut() {
                            obj.name = text.clone();
                        }
                    }
                    ("Properties", "Content-Length") => {
                        if let Some(obj) = current.as_mut() {
                            obj.size = text.trim().parse().unwrap_or(0);
                        }
                    }
                    ("Properties", "Last-Modified") => {
                        if let Some(obj) = current.as_mut() {
                            obj.last_modified = DateTime::parse_from_rfc2822(text.trim())
                                .ok()
                                .map(|dt| dt.with_timezone(&Utc));
                        }
                    }
                    ("Properties", "Etag") => {
                        if let Some(obj) = current.as_mut() {
                            obj.etag = Some(text.trim().trim_matches('"').to_string());
                        }
                    }
                    ("EnumerationResults", "NextMarker") => {
                        next_marker = Some(text.trim().to_string());
                    }
                    (_, "Blob") => {
                        if let Some(obj) = current.take() {
                            if !obj.name.is_empty() {
                                objects.push(obj);
                            }
                        }
                    }
                    _ => {}
                }
                path.pop();
                text.clear();
            }
            Ok(Event::Eof) => break,
            Err(e) => bail!(ShuttleError::Remote(format!("bad listing XML: {}", e))),
            _ => {}
        }
        buf.clear();
    }

    Ok(ListPage {
        objects,
        next_marker: next_marker.filter(|m| !m.is_empty()),
    })
}

// ============ Enumeration ============

/// Enumerate delimited-text objects under `base_path` in `store`.
///
/// Without an allow-list results are sorted by name. With one, root-level
/// objects (if included) come first, then each subfolder in allow-list
/// order, names sorted within each.
pub fn scan_remote(
    store: &dyn ObjectStore,
    base_path: &str,
    selection: &SubfolderSelection,
) -> Result<Vec<CandidateFile>> {
    let base = normalize_base_path(base_path);
    let listed = store
        .list(&base)
        .with_context(|| format!("Failed to list '{}' in container '{}'", base, store.container()))?;
    let subfolders = selection.normalized_subfolders();

    let mut keyed: Vec<(usize, CandidateFile)> = Vec::new();
    for object in listed {
        if !is_delimited_text(&object.name) {
            continue;
        }
        let Some(relative) = relative_to(&base, &object.name) else {
            continue;
        };
        if !selection.keeps(relative) {
            continue;
        }
        let group = group_index(relative, subfolders.as_deref());
        let relative = relative.to_string();
        let file_name = relative.rsplit('/').next().unwrap_or(&relative).to_string();
        keyed.push((
            group,
            CandidateFile {
                origin: Origin::Remote {
                    container: store.container().to_string(),
                    name: object.name,
                },
                relative_path: relative,
                file_name,
                size: object.size,
                last_modified: object.last_modified,
            },
        ));
    }

    keyed.sort_by(|a, b| {
        a.0.cmp(&b.0)
            .then_with(|| a.1.relative_path.cmp(&b.1.relative_path))
    });

    if let Some(subfolders) = &subfolders {
        for (i, subfolder) in subfolders.iter().enumerate() {
            let count = keyed.iter().filter(|(g, _)| *g == i + 1).count();
            if count == 0 {
                info!("No CSV files found in '{}' folder", subfolder);
            } else {
                info!("Found {} CSV files in '{}' folder", count, subfolder);
            }
        }
    }
    info!(
        "Total CSV files found: {} (container '{}', base path '{}')",
        keyed.len(),
        store.container(),
        base
    );
    Ok(keyed.into_iter().map(|(_, f)| f).collect())
}

/// 0 for root-level objects, `i + 1` for the first allow-listed subfolder
/// `i` that contains the object.
fn group_index(relative: &str, subfolders: Option<&[String]>) -> usize {
    let Some(subfolders) = subfolders else {
        return 0;
    };
    subfolders
        .iter()
        .position(|sub| relative.starts_with(&format!("{}/", sub)))
        .map(|i| i + 1)
        .unwrap_or(0)
}
