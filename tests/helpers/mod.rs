pub mod app;

use serde_json::{json, Value};

/// A bridge configuration pointing at `homeserver_url` with `text` as the
/// template, written as a YAML block scalar so no quoting is needed.
pub fn config_yaml(homeserver_url: &str, text: &str) -> String {
    let indented: Vec<String> = text.lines().map(|line| format!("  {line}")).collect();
    format!(
        "homeserver_url: {homeserver_url}\nmatrix_http_config:\n  bearer_token: syt_test_token\ntext: |-\n{}\n",
        indented.join("\n")
    )
}

/// One firing alert named `Disk`.
pub fn firing_disk() -> Value {
    json!({
        "version": "4",
        "groupKey": "{}:{alertname=\"Disk\"}",
        "truncatedAlerts": 0,
        "status": "firing",
        "receiver": "matrix",
        "groupLabels": {"alertname": "Disk"},
        "commonLabels": {"alertname": "Disk"},
        "commonAnnotations": {},
        "externalURL": "http://alertmanager:9093",
        "alerts": [{
            "status": "firing",
            "labels": {"alertname": "Disk", "instance": "db-1"},
            "annotations": {"summary": "disk full"},
            "startsAt": "2024-03-01T10:00:00Z",
            "endsAt": "0001-01-01T00:00:00Z",
            "generatorURL": "http://prometheus:9090/graph"
        }]
    })
}
