//! Outgoing request header synthesis.
//!
//! Each request draws a weighted-random user-agent string from a small table
//! of browser templates and randomizes a handful of client-hint headers.
//! This is cosmetic and stateless — there is no contract beyond producing
//! valid-looking headers carrying the session's id and fingerprint.

use crate::RandomSource;
use crate::config::IdentityConfig;
use crate::identity::Session;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue};

/// A browser family the user-agent table can produce.
struct BrowserTemplate {
    weight: f64,
    versions: &'static [&'static str],
    platforms: &'static [&'static str],
    /// `{platform}` / `{version}` / `{chrome_ver}` placeholders.
    template: &'static str,
}

const BROWSERS: &[BrowserTemplate] = &[
    BrowserTemplate {
        weight: 70.0,
        versions: &["108.0.0.0", "109.0.0.0", "110.0.0.0", "111.0.0.0"],
        platforms: &[
            "Windows NT 10.0; Win64; x64",
            "Macintosh; Intel Mac OS X 10_15_7",
            "X11; Linux x86_64",
        ],
        template: "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
                   Chrome/{version} Safari/537.36",
    },
    BrowserTemplate {
        weight: 30.0,
        versions: &["108.0.1462.76", "109.0.1518.78", "110.0.1587.57"],
        platforms: &[
            "Windows NT 10.0; Win64; x64",
            "Macintosh; Intel Mac OS X 10_15_7",
        ],
        template: "Mozilla/5.0 ({platform}) AppleWebKit/537.36 (KHTML, like Gecko) \
                   Chrome/{chrome_ver} Safari/537.36 Edg/{version}",
    },
];

const ACCEPT_LANGUAGES: &[&str] = &[
    "en-US,en;q=0.9",
    "en-GB,en;q=0.8,es;q=0.6",
    "en-CA,en;q=0.7,fr;q=0.3",
];

const HINT_PLATFORMS: &[&str] = &["\"Windows\"", "\"macOS\""];

/// Draw a weighted-random user-agent string from the browser table.
pub fn random_user_agent(rng: &mut dyn RandomSource) -> String {
    let total: f64 = BROWSERS.iter().map(|b| b.weight).sum();
    let mut roll = rng.next_f64() * total;
    let mut chosen = &BROWSERS[0];
    for browser in BROWSERS {
        if roll < browser.weight {
            chosen = browser;
            break;
        }
        roll -= browser.weight;
    }

    let version = chosen.versions[rng.next_index(chosen.versions.len())];
    let platform = chosen.platforms[rng.next_index(chosen.platforms.len())];
    let mut agent = chosen
        .template
        .replace("{platform}", platform)
        .replace("{version}", version);
    if agent.contains("{chrome_ver}") {
        let chrome = BROWSERS[0].versions[rng.next_index(BROWSERS[0].versions.len())];
        agent = agent.replace("{chrome_ver}", chrome);
    }
    agent
}

/// Build the full header set for one outgoing request.
pub fn request_headers(
    session: &Session,
    identity: &IdentityConfig,
    rng: &mut dyn RandomSource,
) -> HeaderMap {
    let mut headers = HeaderMap::new();

    insert(&mut headers, "accept", "text/event-stream");
    insert(
        &mut headers,
        "accept-language",
        ACCEPT_LANGUAGES[rng.next_index(ACCEPT_LANGUAGES.len())],
    );
    insert(&mut headers, "connection", "keep-alive");
    insert(&mut headers, "cache-control", "no-cache");
    insert(&mut headers, "user-agent", &random_user_agent(rng));

    if let Some(origin) = &identity.origin {
        insert(&mut headers, "origin", origin);
    }
    if let Some(referer) = &identity.referer {
        insert(&mut headers, "referer", referer);
    }

    insert(&mut headers, "x-session-id", &session.session_id.to_string());
    insert(&mut headers, "x-device-fingerprint", &session.fingerprint);

    let hint_version = 90 + rng.next_index(31);
    insert(
        &mut headers,
        "sec-ch-ua",
        &format!("\"Not A(Brand\";v=\"99\", \"Google Chrome\";v=\"{hint_version}\""),
    );
    insert(&mut headers, "sec-ch-ua-mobile", "?0");
    insert(
        &mut headers,
        "sec-ch-ua-platform",
        HINT_PLATFORMS[rng.next_index(HINT_PLATFORMS.len())],
    );
    insert(&mut headers, "sec-fetch-dest", "empty");
    insert(&mut headers, "sec-fetch-mode", "cors");
    insert(&mut headers, "sec-fetch-site", "same-origin");

    headers
}

fn insert(headers: &mut HeaderMap, name: &'static str, value: &str) {
    if let Ok(value) = HeaderValue::from_str(value) {
        headers.insert(HeaderName::from_static(name), value);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::ScriptedRandom;
    use chrono::Utc;

    #[test]
    fn low_roll_picks_the_heavier_browser() {
        let mut rng = ScriptedRandom::new(&[0, 0], &[0.1]);
        let agent = random_user_agent(&mut rng);
        assert!(agent.contains("Chrome/108.0.0.0"));
        assert!(!agent.contains("Edg/"));
    }

    #[test]
    fn high_roll_picks_the_lighter_browser() {
        let mut rng = ScriptedRandom::new(&[1, 0, 2], &[0.9]);
        let agent = random_user_agent(&mut rng);
        assert!(agent.contains("Edg/109.0.1518.78"));
        assert!(agent.contains("Chrome/110.0.0.0"));
    }

    #[test]
    fn headers_carry_session_identity() {
        let session = Session::generate("0xabc", Utc::now());
        let identity = IdentityConfig {
            origin: Some("https://agents.example.net".into()),
            referer: None,
        };
        let mut rng = ScriptedRandom::new(&[0, 0, 0, 5, 0], &[0.2]);
        let headers = request_headers(&session, &identity, &mut rng);

        assert_eq!(
            headers.get("x-device-fingerprint").unwrap(),
            session.fingerprint.as_str()
        );
        assert_eq!(
            headers.get("x-session-id").unwrap(),
            session.session_id.to_string().as_str()
        );
        assert_eq!(
            headers.get("origin").unwrap(),
            "https://agents.example.net"
        );
        assert!(headers.get("referer").is_none());
        assert_eq!(headers.get("accept").unwrap(), "text/event-stream");
        assert!(headers.get("user-agent").is_some());
        assert!(headers.get("sec-ch-ua").is_some());
    }
}
