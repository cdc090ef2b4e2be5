//! Shared User-Agent string for search and asset requests.

/// Product token used in the User-Agent header.
const PRODUCT: &str = "recipup";

/// Default User-Agent for every request the transport sends.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("{PRODUCT}/{version} (recipe-search)")
}

#[cfg(test)]
#[allow(clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_contains_crate_version() {
        let ua = default_user_agent();
        assert_eq!(
            env!("CARGO_PKG_VERSION"),
            ua.strip_prefix("recipup/")
                .and_then(|s| s.split(' ').next())
                .expect("UA has version"),
            "UA must contain crate version"
        );
    }

    #[test]
    fn test_user_agent_identifies_purpose() {
        let ua = default_user_agent();
        assert!(
            ua.contains("recipe-search"),
            "UA must identify as recipe-search: {ua}"
        );
    }
}
