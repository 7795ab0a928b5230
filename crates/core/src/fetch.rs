// RegBridge - Register Map Generation Bridge
// Copyright (C) 2026 Andrii Shylenko
//
// This software is released under the MIT License.
// See the LICENSE file in the project root for full license information.

use std::io::Read;
use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum FetchError {
    #[error("HTTP {status} {status_text}")]
    Status { status: u16, status_text: String },
    #[error("transport error: {0}")]
    Transport(String),
    #[error("cannot read {path:?}: {source}")]
    File {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

/// Retrieves the bytes behind a location.
pub trait Fetch {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError>;
}

/// Fetches `http(s)://` locations over the network and anything else from disk.
///
/// Relative file paths resolve against `base_dir`.
#[derive(Debug, Clone, Default)]
pub struct HttpFetcher {
    pub base_dir: Option<PathBuf>,
}

impl HttpFetcher {
    pub fn new(base_dir: Option<PathBuf>) -> Self {
        Self { base_dir }
    }

    fn fetch_url(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        match ureq::get(url).call() {
            Ok(resp) => {
                let mut data = Vec::new();
                resp.into_reader()
                    .read_to_end(&mut data)
                    .map_err(|e| FetchError::Transport(e.to_string()))?;
                Ok(data)
            }
            Err(ureq::Error::Status(status, resp)) => Err(FetchError::Status {
                status,
                status_text: resp.status_text().to_string(),
            }),
            Err(ureq::Error::Transport(t)) => Err(FetchError::Transport(t.to_string())),
        }
    }

    fn fetch_file(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        let location = location.strip_prefix("file://").unwrap_or(location);
        let mut path = PathBuf::from(location);
        if path.is_relative() {
            if let Some(base) = &self.base_dir {
                path = base.join(path);
            }
        }
        std::fs::read(&path).map_err(|source| FetchError::File { path, source })
    }
}

impl Fetch for HttpFetcher {
    fn fetch(&self, location: &str) -> Result<Vec<u8>, FetchError> {
        tracing::debug!("Fetching {}", location);
        if location.starts_with("http://") || location.starts_with("https://") {
            self.fetch_url(location)
        } else {
            self.fetch_file(location)
        }
    }
}
