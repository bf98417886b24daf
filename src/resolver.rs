use std::io::Read;
use std::sync::LazyLock;

use regex::Regex;
use serde::Serialize;
use tracing::debug;

use crate::domain::DatasetName;
use crate::error::UpdateError;
use crate::http::HttpTransport;

pub const DBIP_LANDING_PAGE: &str = "https://db-ip.com/db/download/ip-to-city-lite";
pub const DBIP_CITY_LITE_PATTERN: &str =
    r"https://download\.db-ip\.com/free/dbip-city-lite-[0-9]{4}-[0-9]{2}\.mmdb\.gz";
pub const CITY_LITE_TOKEN: &str = "city-lite";
pub const ASN_LITE_TOKEN: &str = "asn-lite";

const MAX_PAGE_BYTES: u64 = 8 * 1024 * 1024;

static DBIP_CITY_LITE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(DBIP_CITY_LITE_PATTERN).unwrap());

/// A primary dataset whose URL carries a release date, plus a sibling whose
/// URL differs only by one token.
#[derive(Debug, Clone)]
pub struct VersionedFamily {
    pub landing_page: String,
    pub pattern: Regex,
    pub primary: DatasetName,
    pub sibling: DatasetName,
    pub token: String,
    pub sibling_token: String,
}

impl VersionedFamily {
    /// DB-IP city lite and its ASN lite sibling.
    pub fn dbip_lite() -> Self {
        Self {
            landing_page: DBIP_LANDING_PAGE.to_string(),
            pattern: DBIP_CITY_LITE.clone(),
            primary: DatasetName::from_static("dbip-city-lite.mmdb"),
            sibling: DatasetName::from_static("dbip-asn-lite.mmdb"),
            token: CITY_LITE_TOKEN.to_string(),
            sibling_token: ASN_LITE_TOKEN.to_string(),
        }
    }

    pub fn with_landing_page(mut self, landing_page: &str) -> Self {
        self.landing_page = landing_page.to_string();
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedVersion {
    pub primary_url: String,
    pub sibling_url: String,
}

pub struct VersionResolver<T: HttpTransport> {
    transport: T,
}

impl<T: HttpTransport> VersionResolver<T> {
    pub fn new(transport: T) -> Self {
        Self { transport }
    }

    /// Scrapes `landing_page_url` for the city-lite URL and derives the
    /// ASN-lite one from it.
    pub fn resolve_latest(
        &self,
        landing_page_url: &str,
        pattern: &Regex,
    ) -> Result<ResolvedVersion, UpdateError> {
        self.resolve_with(landing_page_url, pattern, CITY_LITE_TOKEN, ASN_LITE_TOKEN)
    }

    pub fn resolve_family(&self, family: &VersionedFamily) -> Result<ResolvedVersion, UpdateError> {
        self.resolve_with(
            &family.landing_page,
            &family.pattern,
            &family.token,
            &family.sibling_token,
        )
    }

    fn resolve_with(
        &self,
        landing_page_url: &str,
        pattern: &Regex,
        token: &str,
        sibling_token: &str,
    ) -> Result<ResolvedVersion, UpdateError> {
        let body = self.fetch_page(landing_page_url)?;
        let primary_url = find_first_match(&body, pattern)
            .ok_or_else(|| UpdateError::Resolve("no matching URL found".to_string()))?
            .to_string();
        let sibling_url = derive_sibling(&primary_url, token, sibling_token);
        Ok(ResolvedVersion {
            primary_url,
            sibling_url,
        })
    }

    fn fetch_page(&self, url: &str) -> Result<String, UpdateError> {
        let response = self
            .transport
            .get(url)
            .map_err(|err| UpdateError::Resolve(format!("error fetching {url}: {err}")))?;
        if !response.is_success() {
            return Err(UpdateError::Resolve(format!(
                "{url} returned status {}",
                response.status
            )));
        }
        let mut bytes = Vec::new();
        response
            .body
            .take(MAX_PAGE_BYTES)
            .read_to_end(&mut bytes)
            .map_err(|err| UpdateError::Resolve(format!("error reading response body: {err}")))?;
        Ok(String::from_utf8_lossy(&bytes).into_owned())
    }
}

/// First match in document order. Later matches are not compared for
/// freshness; the landing page is trusted to list the current release first.
pub fn find_first_match<'a>(body: &'a str, pattern: &Regex) -> Option<&'a str> {
    let mut matches = pattern.find_iter(body);
    let first = matches.next()?;
    debug!(
        "found {} candidate URLs, using {}",
        1 + matches.count(),
        first.as_str()
    );
    Some(first.as_str())
}

pub fn derive_sibling(primary_url: &str, token: &str, sibling_token: &str) -> String {
    primary_url.replace(token, sibling_token)
}
