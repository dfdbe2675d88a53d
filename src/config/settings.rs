use serde::{Deserialize, Serialize};

/// Environment variable holding the WebSocket endpoint.
pub const SOCKET_URL_ENV: &str = "DCE_SOCKET_URL";

/// Environment variable enabling lifecycle diagnostics.
pub const DEBUG_ENV: &str = "DCE_DEBUG";

/// One layer of client settings.
///
/// Every field is optional so layers can be merged: a `Some` in a later
/// layer overrides whatever the earlier layers said.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientSettings {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub socket_url: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub debug: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub open_poll_interval_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub ready_poll_interval_ms: Option<u64>,
}

impl ClientSettings {
    /// Overlay `other` on top of `self`.
    pub fn merge(self, other: ClientSettings) -> ClientSettings {
        ClientSettings {
            socket_url: other.socket_url.or(self.socket_url),
            debug: other.debug.or(self.debug),
            open_poll_interval_ms: other.open_poll_interval_ms.or(self.open_poll_interval_ms),
            ready_poll_interval_ms: other.ready_poll_interval_ms.or(self.ready_poll_interval_ms),
        }
    }
}

/// Merge layers in order, lowest precedence first. `None` layers are skipped.
pub fn merge_all(layers: &[Option<ClientSettings>]) -> ClientSettings {
    layers
        .iter()
        .flatten()
        .cloned()
        .fold(ClientSettings::default(), ClientSettings::merge)
}

/// Parse a boolean environment flag.
///
/// Returns `None` for values that are neither truthy nor falsy.
pub fn parse_flag(value: &str) -> Option<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "" | "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn toml_keys_are_camel_case() {
        let settings: ClientSettings = toml::from_str(
            r#"
            socketUrl = "ws://localhost:9000/dce"
            debug = true
            openPollIntervalMs = 250
            readyPollIntervalMs = 100
            "#,
        )
        .unwrap();

        assert_eq!(
            settings,
            ClientSettings {
                socket_url: Some("ws://localhost:9000/dce".to_string()),
                debug: Some(true),
                open_poll_interval_ms: Some(250),
                ready_poll_interval_ms: Some(100),
            }
        );
    }

    #[test]
    fn later_layer_overrides_only_what_it_sets() {
        let user = ClientSettings {
            socket_url: Some("ws://user".to_string()),
            debug: Some(true),
            ..Default::default()
        };
        let env = ClientSettings {
            socket_url: Some("ws://env".to_string()),
            ..Default::default()
        };

        let merged = merge_all(&[Some(user), None, Some(env)]);
        assert_eq!(merged.socket_url.as_deref(), Some("ws://env"));
        assert_eq!(merged.debug, Some(true));
        assert_eq!(merged.open_poll_interval_ms, None);
    }

    #[rstest]
    #[case::one("1", Some(true))]
    #[case::true_upper("TRUE", Some(true))]
    #[case::on(" on ", Some(true))]
    #[case::zero("0", Some(false))]
    #[case::empty("", Some(false))]
    #[case::off("off", Some(false))]
    #[case::garbage("maybe", None)]
    fn parse_flag_cases(#[case] raw: &str, #[case] expected: Option<bool>) {
        assert_eq!(parse_flag(raw), expected);
    }
}
