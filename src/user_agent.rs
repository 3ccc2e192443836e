//! User-Agent string sent with every page and document request.

/// Project URL so site operators can find out who is fetching their files.
const PROJECT_UA_URL: &str = "https://github.com/fierce/harvester";

/// Default User-Agent: `harvester/<version> (document-mirror; +<url>)`.
#[must_use]
pub(crate) fn default_user_agent() -> String {
    let version = env!("CARGO_PKG_VERSION");
    format!("harvester/{version} (document-mirror; +{PROJECT_UA_URL})")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_user_agent_carries_version_and_url() {
        let ua = default_user_agent();
        assert!(ua.contains(PROJECT_UA_URL), "missing project URL: {ua}");
        assert_eq!(
            ua.strip_prefix("harvester/")
                .and_then(|rest| rest.split(' ').next()),
            Some(env!("CARGO_PKG_VERSION"))
        );
    }
}
