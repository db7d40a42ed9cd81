//! Tune-time URL normalization (PlayerCore tune step 2): strip a FOG
//! caching-proxy wrapper, optionally downgrade the scheme to plain
//! HTTP, and drop EC-3/Atmos content-negotiation hints the host has
//! asked to suppress. None of this touches the manifest body — it only
//! rewrites the URL the first GET is issued against.

use aamp_config::RewriteConfig;

const EC3_HINT_PARAM: &str = "ec3";
const ATMOS_HINT_PARAM: &str = "atmos";

/// FOG wraps the real manifest URL as the `url` query parameter on its
/// own caching-proxy host. When FOG is disabled for this tune, unwrap
/// it back to the origin URL so the request goes straight there.
fn strip_fog_wrapper(input: &str) -> String {
    let Ok(parsed) = url::Url::parse(input) else {
        return input.to_string();
    };
    match parsed.query_pairs().find(|(key, _)| key == "url") {
        Some((_, inner)) => inner.into_owned(),
        None => input.to_string(),
    }
}

fn downgrade_to_http(input: &str) -> String {
    input.replacen("https://", "http://", 1)
}

/// Removes a query parameter by name, leaving the rest of the URL (and
/// any other query parameters) untouched. Falls back to the original
/// string unparsed rather than erroring, since a malformed URL here is
/// reported by the subsequent manifest GET anyway.
fn strip_query_param(input: &str, name: &str) -> String {
    let Ok(mut parsed) = url::Url::parse(input) else {
        return input.to_string();
    };
    let remaining: Vec<(String, String)> = parsed
        .query_pairs()
        .filter(|(key, _)| key != name)
        .map(|(key, value)| (key.into_owned(), value.into_owned()))
        .collect();
    if remaining.is_empty() {
        parsed.set_query(None);
    } else {
        let mut serializer = url::form_urlencoded::Serializer::new(String::new());
        for (key, value) in &remaining {
            serializer.append_pair(key, value);
        }
        parsed.set_query(Some(&serializer.finish()));
    }
    parsed.into()
}

/// Applies the tune-time rewrite chain in the order PlayerCore applies
/// it: unwrap FOG, then scheme downgrade, then EC-3/Atmos hint removal.
#[must_use]
pub fn normalize_manifest_url(input: &str, rewrite: &RewriteConfig, force_http: bool) -> String {
    let mut url = input.to_string();
    if !rewrite.fog {
        url = strip_fog_wrapper(&url);
    }
    if force_http {
        url = downgrade_to_http(&url);
    }
    if rewrite.disable_ec3 {
        url = strip_query_param(&url, EC3_HINT_PARAM);
    }
    if rewrite.disable_atmos {
        url = strip_query_param(&url, ATMOS_HINT_PARAM);
    }
    url
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rewrite(fog: bool, disable_ec3: bool, disable_atmos: bool) -> RewriteConfig {
        RewriteConfig {
            fog,
            disable_ec3,
            disable_atmos,
            ..RewriteConfig::default()
        }
    }

    #[test]
    fn unwraps_fog_when_disabled() {
        let wrapped = "http://fog.example/tsb?clientId=1&url=http%3A%2F%2Forigin.example%2Fa.m3u8";
        let out = normalize_manifest_url(wrapped, &rewrite(false, false, false), false);
        assert_eq!(out, "http://origin.example/a.m3u8");
    }

    #[test]
    fn leaves_fog_wrapper_when_enabled() {
        let wrapped = "http://fog.example/tsb?clientId=1&url=http%3A%2F%2Forigin.example%2Fa.m3u8";
        let out = normalize_manifest_url(wrapped, &rewrite(true, false, false), false);
        assert_eq!(out, wrapped);
    }

    #[test]
    fn downgrades_scheme_when_forced() {
        let out = normalize_manifest_url("https://origin.example/a.m3u8", &rewrite(true, false, false), true);
        assert_eq!(out, "http://origin.example/a.m3u8");
    }

    #[test]
    fn strips_ec3_and_atmos_hints() {
        let out = normalize_manifest_url(
            "http://origin.example/a.m3u8?ec3=true&atmos=true&lang=en",
            &rewrite(true, true, true),
            false,
        );
        assert_eq!(out, "http://origin.example/a.m3u8?lang=en");
    }
}
