use common::domain::{DomainError, DomainResult};

const TELEMETRY_MARKER: &str = "telemetry";
const ATTRIBUTES_MARKER: &str = "attributes";

/// Position of the device identifier in `<prefix>/<group>/<deviceID>/...`
const DEVICE_SEGMENT: usize = 2;

/// Processing path a message takes, decided from its topic
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageRoute {
    Telemetry,
    Attributes,
}

/// Telemetry wins when a topic mentions both; unrelated topics yield `None`
pub fn route_topic(topic: &str) -> Option<MessageRoute> {
    if topic.contains(TELEMETRY_MARKER) {
        Some(MessageRoute::Telemetry)
    } else if topic.contains(ATTRIBUTES_MARKER) {
        Some(MessageRoute::Attributes)
    } else {
        None
    }
}

/// Extract the device identifier (third segment) from a topic
pub fn parse_device_topic(topic: &str) -> DomainResult<&str> {
    topic
        .split('/')
        .nth(DEVICE_SEGMENT)
        .ok_or_else(|| DomainError::InvalidTopic(topic.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_device_topic() {
        assert_eq!(parse_device_topic("v1/devices/ABC123/telemetry").unwrap(), "ABC123");
        assert_eq!(parse_device_topic("a/b/T24000").unwrap(), "T24000");
    }

    #[test]
    fn test_short_topic_is_invalid() {
        assert!(matches!(
            parse_device_topic("x/y"),
            Err(DomainError::InvalidTopic(topic)) if topic == "x/y"
        ));
        assert!(parse_device_topic("telemetry").is_err());
    }

    #[test]
    fn test_route_topic() {
        assert_eq!(
            route_topic("v1/devices/ABC123/telemetry"),
            Some(MessageRoute::Telemetry)
        );
        assert_eq!(
            route_topic("v1/devices/ABC123/attributes"),
            Some(MessageRoute::Attributes)
        );
        assert_eq!(route_topic("v1/devices/ABC123/rpc"), None);
    }
}
