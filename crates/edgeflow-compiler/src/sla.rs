//! SLA to resource-parameter transforms.

use edgeflow_core::{QosConfig, Sla};
use serde_json::{Map, Value, json};

/// SLA block for the provisioning request.
pub fn sla_requirements(sla: &Sla) -> Value {
    let mut out = Map::new();
    if let Some(availability) = sla.availability {
        out.insert("availability".into(), json!(format!("{availability}%")));
    }
    if let Some(connections) = sla.connections {
        out.insert("maxConnections".into(), json!(connections.to_string()));
    }
    if let Some(latency) = sla.latency {
        out.insert("maxLatency".into(), json!(format!("{latency}ms")));
    }
    if let Some(throughput) = sla.throughput {
        out.insert("minThroughput".into(), json!(guaranteed_bit_rate(throughput)));
    }
    Value::Object(out)
}

/// QoS parameters for the network slice: a 5QI class chosen from the
/// latency breakpoints and an optional guaranteed bit rate.
pub fn qos_parameters(sla: &Sla, qos: &QosConfig) -> Value {
    let five_qi = sla
        .latency
        .map(|latency| qos.classify(latency))
        .unwrap_or(qos.default_five_qi);

    let mut out = Map::new();
    out.insert("5qi".into(), json!(five_qi));
    if let Some(throughput) = sla.throughput {
        out.insert("gfbr".into(), json!(guaranteed_bit_rate(throughput)));
    }
    Value::Object(out)
}

fn guaranteed_bit_rate(throughput_mbps: f64) -> String {
    format!("{throughput_mbps}Mbps")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn requirements_formatting() {
        let sla = Sla {
            availability: Some(99.99),
            latency: Some(5.0),
            throughput: Some(200.0),
            connections: Some(10000),
        };
        assert_eq!(
            sla_requirements(&sla),
            json!({
                "availability": "99.99%",
                "maxConnections": "10000",
                "maxLatency": "5ms",
                "minThroughput": "200Mbps",
            })
        );
    }

    #[test]
    fn empty_sla_yields_empty_requirements() {
        assert_eq!(sla_requirements(&Sla::default()), json!({}));
    }

    #[test]
    fn qos_class_follows_breakpoints() {
        let qos = QosConfig::default();
        let with_latency = |latency| Sla {
            latency: Some(latency),
            ..Default::default()
        };
        assert_eq!(qos_parameters(&with_latency(0.8), &qos)["5qi"], 1);
        assert_eq!(qos_parameters(&with_latency(5.0), &qos)["5qi"], 5);
        assert_eq!(qos_parameters(&with_latency(30.0), &qos)["5qi"], 7);
        assert_eq!(qos_parameters(&with_latency(80.0), &qos)["5qi"], 9);
    }

    #[test]
    fn qos_without_latency_uses_default_class() {
        let sla = Sla {
            throughput: Some(1.5),
            ..Default::default()
        };
        assert_eq!(
            qos_parameters(&sla, &QosConfig::default()),
            json!({ "5qi": 9, "gfbr": "1.5Mbps" })
        );
    }
}
