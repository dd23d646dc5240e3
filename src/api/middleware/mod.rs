pub mod identity;
pub mod verify_internal;

use http::request::Parts as ReqParts;
use http::header::{AUTHORIZATION, CONTENT_TYPE};
use http::{HeaderName, HeaderValue, Method};
use tower_http::cors::{AllowOrigin, CorsLayer};

use crate::api::middleware::identity::USER_ID_HEADER;

/// `allowed` is either `*` or a host such as `ranktify.app`, which admits that host and its
/// subdomains on any scheme or port.
pub fn cors(allowed: &str) -> CorsLayer {
    let allow_origin = if allowed == "*" {
        AllowOrigin::any()
    } else {
        let host = allowed.to_ascii_lowercase();
        AllowOrigin::predicate(move |org: &HeaderValue, _: &ReqParts| {
            org.to_str().is_ok_and(|org| origin_matches(org, &host))
        })
    };

    CorsLayer::new()
        .allow_methods([Method::GET, Method::POST])
        .allow_headers([
            AUTHORIZATION,
            CONTENT_TYPE,
            HeaderName::from_static(USER_ID_HEADER),
        ])
        .allow_origin(allow_origin)
}

fn origin_matches(origin: &str, allowed_host: &str) -> bool {
    let authority = origin.split_once("://").map_or(origin, |(_, rest)| rest);
    let host = authority
        .split_once(':')
        .map_or(authority, |(host, _port)| host)
        .to_ascii_lowercase();

    match host.strip_suffix(allowed_host) {
        Some("") => true,
        Some(subdomain) => subdomain.ends_with('.'),
        None => false,
    }
}
