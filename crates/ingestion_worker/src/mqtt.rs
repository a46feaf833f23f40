mod subscriber;

pub use subscriber::{build_mqtt_options, parse_transport, run_mqtt_subscriber, MqttSubscriberConfig};
