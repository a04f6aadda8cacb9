//! WebDAV client for Nextcloud and ownCloud servers.
//!
//! Nextcloud serves user files below `remote.php/dav/files/<user>/`, ownCloud
//! below `remote.php/webdav/`. The configured remote path is appended to that
//! root and every entity file lives directly inside it.

use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use quick_xml::events::Event as XmlEvent;
use quick_xml::Reader;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use url::Url;

use crate::storage::{ServerConfig, ServerFlavor};
use crate::sync::remote::RemoteStore;
use crate::sync::types::{ConnectInfo, SyncError};

const PROPFIND_BODY: &str = r#"<?xml version="1.0" encoding="utf-8"?>
<d:propfind xmlns:d="DAV:"><d:prop><d:resourcetype/></d:prop></d:propfind>"#;

pub struct WebDavClient {
    http: Client,
    flavor: ServerFlavor,
}

impl WebDavClient {
    pub fn new(flavor: ServerFlavor, timeout: Duration) -> Result<Self, SyncError> {
        let http = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("cloudrun/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { http, flavor })
    }

    pub fn from_config(server: &ServerConfig) -> Result<Self, SyncError> {
        Self::new(server.flavor, Duration::from_secs(server.timeout_secs.max(1)))
    }

    /// URL of the remote folder, always ending in `/`.
    pub fn folder_url(&self, info: &ConnectInfo) -> Result<Url, SyncError> {
        let invalid = |message: String| SyncError::InvalidAddress {
            address: info.address.clone(),
            message,
        };
        let mut url = Url::parse(&info.address).map_err(|e| invalid(e.to_string()))?;
        {
            let mut segments = url
                .path_segments_mut()
                .map_err(|_| invalid("address cannot be a base URL".into()))?;
            segments.pop_if_empty();
            match self.flavor {
                ServerFlavor::Nextcloud => {
                    segments.extend(["remote.php", "dav", "files", info.username.as_str()]);
                }
                ServerFlavor::Owncloud => {
                    segments.extend(["remote.php", "webdav"]);
                }
            }
            segments.extend(info.remote_path.split('/').filter(|s| !s.is_empty()));
            segments.push("");
        }
        Ok(url)
    }

    fn file_url(&self, info: &ConnectInfo, name: &str) -> Result<Url, SyncError> {
        let folder = self.folder_url(info)?;
        folder
            .join(&urlencoding::encode(name))
            .map_err(|e| SyncError::InvalidAddress {
                address: info.address.clone(),
                message: e.to_string(),
            })
    }

    fn request(&self, info: &ConnectInfo, method: Method, url: Url) -> RequestBuilder {
        self.http
            .request(method, url)
            .basic_auth(&info.username, Some(&info.password))
    }
}

fn check(response: Response) -> Result<Response, SyncError> {
    let status = response.status();
    if status == StatusCode::UNAUTHORIZED {
        return Err(SyncError::AuthenticationRequired);
    }
    if !status.is_success() {
        return Err(SyncError::Status {
            status: status.as_u16(),
            url: response.url().to_string(),
        });
    }
    Ok(response)
}

static PROPFIND: LazyLock<Method> =
    LazyLock::new(|| Method::from_bytes(b"PROPFIND").expect("PROPFIND is a method token"));
static MKCOL: LazyLock<Method> =
    LazyLock::new(|| Method::from_bytes(b"MKCOL").expect("MKCOL is a method token"));

#[async_trait]
impl RemoteStore for WebDavClient {
    async fn list(&self, info: &ConnectInfo) -> Result<Vec<String>, SyncError> {
        let url = self.folder_url(info)?;
        tracing::debug!(%url, "listing remote folder");
        let response = self
            .request(info, PROPFIND.clone(), url.clone())
            .header("Depth", "1")
            .header("Content-Type", "application/xml; charset=utf-8")
            .body(PROPFIND_BODY)
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(Vec::new());
        }
        let body = check(response)?.text().await?;
        parse_multistatus(&body, url.path())
    }

    async fn fetch(&self, info: &ConnectInfo, name: &str) -> Result<Vec<u8>, SyncError> {
        let url = self.file_url(info, name)?;
        let response = self.request(info, Method::GET, url).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(name.to_string()));
        }
        Ok(check(response)?.bytes().await?.to_vec())
    }

    async fn put(&self, info: &ConnectInfo, name: &str, body: Vec<u8>) -> Result<(), SyncError> {
        let url = self.file_url(info, name)?;
        let response = self
            .request(info, Method::PUT, url)
            .header("Content-Type", "application/json")
            .body(body)
            .send()
            .await?;
        check(response)?;
        tracing::debug!(file = %name, "uploaded");
        Ok(())
    }

    /// Create the remote folder level by level. 405 means it already exists.
    async fn prepare(&self, info: &ConnectInfo) -> Result<(), SyncError> {
        let mut partial = info.clone();
        let mut path = String::new();
        for segment in info.remote_path.split('/').filter(|s| !s.is_empty()) {
            if !path.is_empty() {
                path.push('/');
            }
            path.push_str(segment);
            partial.remote_path = path.clone();

            let url = self.folder_url(&partial)?;
            let response = self.request(info, MKCOL.clone(), url).send().await?;
            if response.status() != StatusCode::METHOD_NOT_ALLOWED {
                check(response)?;
            }
        }
        Ok(())
    }
}

/// File names listed in a PROPFIND multistatus body, collections excluded.
pub fn parse_multistatus(xml: &str, folder_path: &str) -> Result<Vec<String>, SyncError> {
    let mut reader = Reader::from_str(xml);
    let folder = folder_path.trim_end_matches('/');

    let mut names = Vec::new();
    let mut href = String::new();
    let mut in_href = false;
    let mut is_collection = false;

    loop {
        match reader.read_event() {
            Ok(XmlEvent::Start(e)) => match e.local_name().as_ref() {
                b"response" => {
                    href.clear();
                    is_collection = false;
                }
                b"href" => in_href = true,
                b"collection" => is_collection = true,
                _ => {}
            },
            Ok(XmlEvent::Empty(e)) => {
                if e.local_name().as_ref() == b"collection" {
                    is_collection = true;
                }
            }
            Ok(XmlEvent::Text(t)) => {
                if in_href {
                    href.push_str(&String::from_utf8_lossy(&t));
                }
            }
            Ok(XmlEvent::End(e)) => match e.local_name().as_ref() {
                b"href" => in_href = false,
                b"response" => {
                    let path = href.trim().trim_end_matches('/');
                    let path = Url::parse(path)
                        .map(|u| u.path().trim_end_matches('/').to_string())
                        .unwrap_or_else(|_| path.to_string());
                    if !is_collection && path != folder {
                        if let Some(last) = path.rsplit('/').next() {
                            let name = urlencoding::decode(last)
                                .map_err(|e| SyncError::Xml(e.to_string()))?;
                            if !name.is_empty() {
                                names.push(name.into_owned());
                            }
                        }
                    }
                }
                _ => {}
            },
            Ok(XmlEvent::Eof) => break,
            Err(e) => return Err(SyncError::Xml(e.to_string())),
            _ => {}
        }
    }

    Ok(names)
}
