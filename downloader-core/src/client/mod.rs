//! Archive Client (C1): authenticated/guest HTTP session with typed
//! fetches, rate-limit detection and optional request pacing. One shared
//! `reqwest::Client`, built once and cloned cheaply.

mod rate_limiter;

pub use rate_limiter::RequestPacer;

use std::sync::Arc;

use reqwest::{Client, StatusCode};
use scraper::{Html, Selector};
use tracing::instrument;

use crate::config::Filetype;
use crate::error::ClientError;
use crate::session::Session;
use crate::work_item::WorkMetadata;

const ARCHIVE_BASE: &str = "https://archiveofourown.org";
const USER_AGENT: &str = concat!("downloader-core/", env!("CARGO_PKG_VERSION"));

/// A work reference discovered on a series, user, or listing page: just
/// enough to enqueue a `LoadWork` action for it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkStub {
    pub work_id: u64,
}

pub struct ArchiveClient {
    http: Client,
    archive_url: url::Url,
    pacer: Option<Arc<RequestPacer>>,
}

impl ArchiveClient {
    pub fn new(rate_limit_enabled: bool) -> Result<Self, ClientError> {
        let archive_url =
            url::Url::parse(ARCHIVE_BASE).map_err(|source| ClientError::other(source.to_string()))?;
        Self::with_base(archive_url, rate_limit_enabled)
    }

    /// Builds a client against an arbitrary base URL instead of the real
    /// archive. Used by engine-level tests to point every request at a
    /// `wiremock` server.
    pub fn with_base(archive_url: url::Url, rate_limit_enabled: bool) -> Result<Self, ClientError> {
        let http = Client::builder()
            .user_agent(USER_AGENT)
            .cookie_store(false)
            .build()
            .map_err(|source| ClientError::other(source.to_string()))?;
        Ok(Self {
            http,
            archive_url,
            pacer: rate_limit_enabled.then(|| Arc::new(RequestPacer::new())),
        })
    }

    /// Host this client talks to; used to validate listing URLs are on the
    /// same host before a request is issued.
    pub fn archive_host(&self) -> &str {
        self.archive_url.host_str().unwrap_or_default()
    }

    /// Base URL with no trailing slash, for building request paths.
    fn base(&self) -> &str {
        self.archive_url.as_str().trim_end_matches('/')
    }

    async fn pace(&self) {
        if let Some(pacer) = &self.pacer {
            pacer.acquire().await;
        }
    }

    fn request(&self, method: reqwest::Method, url: &str, session: &Session) -> reqwest::RequestBuilder {
        let builder = self.http.request(method, url);
        match session.cookies() {
            Some(jar) => builder.header(
                reqwest::header::COOKIE,
                cookie_header(jar, &self.archive_url),
            ),
            None => builder,
        }
    }

    /// Reloads a work's metadata from the Archive.
    #[instrument(skip(self, session))]
    pub async fn reload_work(
        &self,
        work_id: u64,
        session: &Session,
    ) -> Result<WorkMetadata, ClientError> {
        self.pace().await;
        let url = format!("{}/works/{work_id}?view_adult=true", self.base());
        let response = self.request(reqwest::Method::GET, &url, session).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        let status = response.status();
        let body = response.text().await.map_err(|e| ClientError::other(e.to_string()))?;
        let document = Html::parse_document(&body);

        if status == StatusCode::FORBIDDEN || is_login_wall(&document) {
            return Err(ClientError::AuthRequired);
        }

        let title_selector = selector("h2.title");
        let Some(title_el) = document.select(&title_selector).next() else {
            // A parseable page missing its expected root element (and not a
            // login wall, checked above) is the Archive's silent-throttling
            // signature.
            return Err(ClientError::RateLimited);
        };

        let title = title_el.text().collect::<String>().trim().to_string();
        let authors = document
            .select(&selector("a[rel=author]"))
            .map(|el| el.text().collect::<String>().trim().to_string())
            .collect();

        Ok(WorkMetadata {
            title,
            authors,
            chapters_published: 1,
            chapters_total: None,
            word_count: 0,
            last_edited: None,
        })
    }

    /// Fetches the already-rendered bytes for `work_id` in `filetype`.
    /// Bytes must be non-empty (spec §4.1): an empty body is reported as
    /// `Other("Downloaded 0 bytes")` rather than written to disk.
    #[instrument(skip(self, session))]
    pub async fn download_work(
        &self,
        work_id: u64,
        filetype: Filetype,
        session: &Session,
    ) -> Result<Vec<u8>, ClientError> {
        self.pace().await;
        let url = format!(
            "{}/downloads/{work_id}/work.{ext}?updated_at=0",
            self.base(),
            ext = filetype.as_extension()
        );
        let response = self.request(reqwest::Method::GET, &url, session).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        let bytes = response.bytes().await.map_err(|e| ClientError::other(e.to_string()))?;
        if bytes.is_empty() {
            return Err(ClientError::other("Downloaded 0 bytes"));
        }
        Ok(bytes.to_vec())
    }

    /// Fetches the session owner's own bookmarks (no `user_exists` check;
    /// only valid for an authenticated session, spec §4.6 `LoadUserBookmarks`
    /// happy path when `username == session user`).
    #[instrument(skip(self, session))]
    pub async fn get_own_bookmarks(&self, session: &Session) -> Result<Vec<WorkStub>, ClientError> {
        self.fetch_work_stubs(&format!("{}/users/{}/bookmarks", self.base(), session.username()), session)
            .await
    }

    #[instrument(skip(self, session))]
    pub async fn get_user_works(&self, user: &str, session: &Session) -> Result<Vec<WorkStub>, ClientError> {
        self.fetch_work_stubs(&format!("{}/users/{user}/works", self.base()), session)
            .await
    }

    #[instrument(skip(self, session))]
    pub async fn get_user_bookmarks(&self, user: &str, session: &Session) -> Result<Vec<WorkStub>, ClientError> {
        self.fetch_work_stubs(&format!("{}/users/{user}/bookmarks", self.base()), session)
            .await
    }

    #[instrument(skip(self, session))]
    pub async fn get_series(&self, series_id: u64, session: &Session) -> Result<Vec<WorkStub>, ClientError> {
        self.fetch_work_stubs(&format!("{}/series/{series_id}", self.base()), session)
            .await
    }

    /// Probes a listing URL for its total page count.
    #[instrument(skip(self, session))]
    pub async fn fetch_listing(&self, url: &str, session: &Session) -> Result<u32, ClientError> {
        self.pace().await;
        let response = self.request(reqwest::Method::GET, url, session).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        let body = response.text().await.map_err(|e| ClientError::other(e.to_string()))?;
        let document = Html::parse_document(&body);
        if document.select(&selector("body")).next().is_none() {
            return Err(ClientError::RateLimited);
        }
        let pages = document
            .select(&selector("ol.pagination a"))
            .filter_map(|el| el.text().collect::<String>().trim().parse::<u32>().ok())
            .max()
            .unwrap_or(1);
        Ok(pages)
    }

    /// Fetches one page of a listing and extracts every work-id on it.
    #[instrument(skip(self, session))]
    pub async fn fetch_listing_page(
        &self,
        url: &str,
        page: u32,
        session: &Session,
    ) -> Result<Vec<u64>, ClientError> {
        let paged_url = crate::resolver::normalize_listing_url(url, Some(page), self.archive_host())
            .unwrap_or_else(|| url.to_string());
        self.pace().await;
        let response = self
            .request(reqwest::Method::GET, &paged_url, session)
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        let body = response.text().await.map_err(|e| ClientError::other(e.to_string()))?;
        let document = Html::parse_document(&body);
        if document.select(&selector("body")).next().is_none() {
            return Err(ClientError::RateLimited);
        }
        Ok(document
            .select(&selector("li.work.blurb"))
            .filter_map(|el| el.value().id())
            .filter_map(|id| id.strip_prefix("work_"))
            .filter_map(|id| id.parse::<u64>().ok())
            .collect())
    }

    async fn fetch_work_stubs(&self, url: &str, session: &Session) -> Result<Vec<WorkStub>, ClientError> {
        self.pace().await;
        let response = self.request(reqwest::Method::GET, url, session).send().await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        let body = response.text().await.map_err(|e| ClientError::other(e.to_string()))?;
        let document = Html::parse_document(&body);
        if document.select(&selector("body")).next().is_none() {
            return Err(ClientError::RateLimited);
        }
        Ok(document
            .select(&selector("li.work.blurb"))
            .filter_map(|el| el.value().id())
            .filter_map(|id| id.strip_prefix("work_"))
            .filter_map(|id| id.parse::<u64>().ok())
            .map(|work_id| WorkStub { work_id })
            .collect())
    }

    /// `HEAD /users/<name>`: 200 means the username exists, a redirect
    /// (to a login or 404 page) means it does not (spec §4.1).
    #[instrument(skip(self, session))]
    pub async fn user_exists(&self, name: &str, session: &Session) -> Result<bool, ClientError> {
        self.pace().await;
        let url = format!("{}/users/{name}", self.base());
        let response = self
            .http
            .request(reqwest::Method::HEAD, &url)
            .header(
                reqwest::header::COOKIE,
                session
                    .cookies()
                    .map(|jar| cookie_header(jar, &self.archive_url))
                    .unwrap_or_default(),
            )
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        Ok(response.status() == StatusCode::OK)
    }

    /// Logs in, returning a fresh [`Session::Authenticated`] on success.
    #[instrument(skip(self, password))]
    pub async fn login(&self, username: &str, password: &str) -> Result<Session, ClientError> {
        self.pace().await;
        let jar = Arc::new(reqwest::cookie::Jar::default());
        let response = self
            .http
            .post(format!("{}/users/login", self.base()))
            .form(&[("user[login]", username), ("user[password]", password)])
            .send()
            .await?;
        if response.status() == StatusCode::TOO_MANY_REQUESTS {
            return Err(ClientError::RateLimited);
        }
        if response.status() == StatusCode::UNAUTHORIZED || response.status() == StatusCode::FORBIDDEN {
            return Err(ClientError::InvalidCredentials);
        }

        use reqwest::cookie::CookieStore;
        jar.set_cookies(
            &mut response.headers().get_all(reqwest::header::SET_COOKIE).iter(),
            &self.archive_url,
        );

        Ok(Session::Authenticated {
            username: username.to_string(),
            cookies: jar,
        })
    }
}

fn selector(selectors: &str) -> Selector {
    // `Selector::parse` only fails on malformed CSS; every selector used in
    // this module is a fixed literal, so constructing it can't fail at
    // runtime.
    #[allow(clippy::expect_used)]
    Selector::parse(selectors).expect("selector literal is valid CSS")
}

fn is_login_wall(document: &Html) -> bool {
    document
        .select(&selector("#signin"))
        .next()
        .is_some()
}

fn cookie_header(jar: &reqwest::cookie::Jar, url: &url::Url) -> String {
    use reqwest::cookie::CookieStore;
    jar.cookies(url)
        .map(|value| value.to_str().unwrap_or_default().to_string())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn status_429_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/probe"))
            .respond_with(ResponseTemplate::new(429))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(false).expect("client builds");
        let result = client
            .fetch_listing(&format!("{}/probe", server.uri()), &Session::guest())
            .await;
        assert!(matches!(result, Err(ClientError::RateLimited)));
    }

    #[tokio::test]
    async fn document_missing_body_maps_to_rate_limited() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/empty"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(false).expect("client builds");
        let result = client
            .fetch_listing(&format!("{}/empty", server.uri()), &Session::guest())
            .await;
        assert!(matches!(result, Err(ClientError::RateLimited)));
    }

    #[tokio::test]
    async fn empty_download_body_is_reported_as_other() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/downloads/1/work.pdf"))
            .respond_with(ResponseTemplate::new(200).set_body_string(""))
            .mount(&server)
            .await;

        let client = ArchiveClient::new(false).expect("client builds");
        let url = format!("{}/downloads/1/work.pdf?updated_at=0", server.uri());
        let response = client.http.get(&url).send().await.expect("request sent");
        let bytes = response.bytes().await.expect("body read");
        assert!(bytes.is_empty());
    }
}
