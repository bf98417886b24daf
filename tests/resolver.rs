mod common;

use std::sync::Arc;

use assert_matches::assert_matches;
use regex::Regex;

use ipdb_updater::error::UpdateError;
use ipdb_updater::resolver::{DBIP_CITY_LITE_PATTERN, VersionResolver, VersionedFamily};

use common::StubTransport;

const LANDING: &str = "https://db-ip.com/db/download/ip-to-city-lite";

fn pattern() -> Regex {
    Regex::new(DBIP_CITY_LITE_PATTERN).unwrap()
}

#[test]
fn single_match_resolves_primary_and_sibling() {
    let page = br#"<html><body>
<p>IP to City Lite, updated monthly</p>
<a href="https://download.db-ip.com/free/dbip-city-lite-2024-03.mmdb.gz">mmdb</a>
<a href="https://download.db-ip.com/free/dbip-city-lite-2024-03.csv.gz">csv</a>
</body></html>"#;
    let transport = Arc::new(StubTransport::new().route(LANDING, 200, page));
    let resolver = VersionResolver::new(Arc::clone(&transport));

    let resolved = resolver.resolve_latest(LANDING, &pattern()).unwrap();

    assert_eq!(
        resolved.primary_url,
        "https://download.db-ip.com/free/dbip-city-lite-2024-03.mmdb.gz"
    );
    assert_eq!(
        resolved.sibling_url,
        "https://download.db-ip.com/free/dbip-asn-lite-2024-03.mmdb.gz"
    );
    assert_eq!(
        resolved.sibling_url.replace("asn-lite", "city-lite"),
        resolved.primary_url
    );
    assert_eq!(transport.calls(), vec![LANDING]);
}

#[test]
fn first_match_in_document_order_wins() {
    let page = b"https://download.db-ip.com/free/dbip-city-lite-2024-01.mmdb.gz \
https://download.db-ip.com/free/dbip-city-lite-2024-05.mmdb.gz";
    let transport = Arc::new(StubTransport::new().route(LANDING, 200, page));
    let resolver = VersionResolver::new(transport);

    let resolved = resolver.resolve_latest(LANDING, &pattern()).unwrap();
    assert!(resolved.primary_url.ends_with("2024-01.mmdb.gz"));
}

#[test]
fn zero_matches_is_resolve_error() {
    let page = b"<html>maintenance, downloads unavailable</html>";
    let transport = Arc::new(StubTransport::new().route(LANDING, 200, page));
    let resolver = VersionResolver::new(transport);

    assert_matches!(
        resolver.resolve_latest(LANDING, &pattern()),
        Err(UpdateError::Resolve(message)) if message.contains("no matching URL")
    );
}

#[test]
fn non_success_status_is_resolve_error() {
    let page = b"https://download.db-ip.com/free/dbip-city-lite-2024-03.mmdb.gz";
    let transport = Arc::new(StubTransport::new().route(LANDING, 503, page));
    let resolver = VersionResolver::new(transport);

    assert_matches!(
        resolver.resolve_latest(LANDING, &pattern()),
        Err(UpdateError::Resolve(_))
    );
}

#[test]
fn transport_failure_is_resolve_error() {
    let resolver = VersionResolver::new(Arc::new(StubTransport::new()));

    assert_matches!(
        resolver.resolve_latest(LANDING, &pattern()),
        Err(UpdateError::Resolve(message)) if message.contains("error fetching")
    );
}

#[test]
fn family_uses_its_own_landing_page() {
    let mirror = "http://mirror.local/dbip";
    let page = b"https://download.db-ip.com/free/dbip-city-lite-2025-11.mmdb.gz";
    let transport = Arc::new(StubTransport::new().route(mirror, 200, page));
    let resolver = VersionResolver::new(Arc::clone(&transport));
    let family = VersionedFamily::dbip_lite().with_landing_page(mirror);

    let resolved = resolver.resolve_family(&family).unwrap();

    assert_eq!(
        resolved.sibling_url,
        "https://download.db-ip.com/free/dbip-asn-lite-2025-11.mmdb.gz"
    );
    assert_eq!(transport.calls(), vec![mirror]);
}
