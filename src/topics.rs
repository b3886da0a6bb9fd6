//! MQTT topic scheme used on the device-facing side of the bridge.
//!
//! Every topic string is built here so the wire format lives in exactly one
//! place. Topics follow `/<apiKey>/<deviceId>/<class>[/<subclass>]` with a
//! single leading slash; subscriptions use `+` wildcards for the apiKey and
//! deviceId positions. ApiKey and deviceId are opaque path segments and must
//! not contain `/`.

/// Suffix for northbound measure topics.
pub const MEASURES_SUFFIX: &str = "attrs";

/// Suffix for configuration request/response topics.
pub const CONFIGURATION_SUFFIX: &str = "configuration";

/// Subclass for configuration command requests.
pub const CONFIGURATION_COMMAND_SUFFIX: &str = "commands";

/// Subclass for configuration values pushed back to a device.
pub const CONFIGURATION_VALUES_SUFFIX: &str = "values";

/// Fixed path devices publish command-execution updates to. Not scoped to
/// an apiKey or device.
pub const CONFIGURATION_COMMAND_UPDATE: &str = "configuration/commands/update";

/// Suffix for southbound command topics.
pub const COMMAND_SUFFIX: &str = "cmd";

/// The four wildcard subscriptions every bridge session listens on.
///
/// All device traffic flows through these, so adding or removing devices
/// never touches the subscription set. The order is fixed.
pub fn global_topics() -> [String; 4] {
    [
        format!("/+/+/{}/+", MEASURES_SUFFIX),
        format!("/+/+/{}", MEASURES_SUFFIX),
        format!("/+/+/{}/{}", CONFIGURATION_SUFFIX, CONFIGURATION_COMMAND_SUFFIX),
        format!("/{}", CONFIGURATION_COMMAND_UPDATE),
    ]
}

/// Topic carrying requested configuration values back to a device.
pub fn config_response_topic(api_key: &str, device_id: &str) -> String {
    format!(
        "/{}/{}/{}/{}",
        api_key, device_id, CONFIGURATION_SUFFIX, CONFIGURATION_VALUES_SUFFIX
    )
}

/// Topic a device receives commands on. Expects a device id with the
/// logical suffix already stripped.
pub fn command_topic(api_key: &str, device_id: &str) -> String {
    format!("/{}/{}/{}", api_key, device_id, COMMAND_SUFFIX)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn global_topics_are_fixed_and_idempotent() {
        let topics = global_topics();
        assert_eq!(
            topics,
            [
                "/+/+/attrs/+".to_string(),
                "/+/+/attrs".to_string(),
                "/+/+/configuration/commands".to_string(),
                "/configuration/commands/update".to_string(),
            ]
        );
        assert_eq!(global_topics(), topics);
    }

    #[test]
    fn config_response_topic_round_trips() {
        let topic = config_response_topic("4jggokgpepnvsb2uv4s40d59ov", "light003");
        let segments: Vec<&str> = topic.split('/').collect();
        assert_eq!(segments[0], "");
        assert_eq!(segments[1], "4jggokgpepnvsb2uv4s40d59ov");
        assert_eq!(segments[2], "light003");
        assert_eq!(segments[3], CONFIGURATION_SUFFIX);
        assert_eq!(segments[4], CONFIGURATION_VALUES_SUFFIX);
    }

    #[test]
    fn command_topic_round_trips() {
        let topic = command_topic("ABC123", "therm7");
        let segments: Vec<&str> = topic.split('/').collect();
        assert_eq!(segments, ["", "ABC123", "therm7", "cmd"]);
    }
}
