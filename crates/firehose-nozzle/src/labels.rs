// Copyright 2023-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Label construction for logs and metrics.
//!
//! Every key lives under [`LABEL_PREFIX`]. A key is present only when its source field
//! is present and non-empty, so two envelopes with the same metadata always produce
//! equal label maps.

use std::collections::HashMap;

use crate::app_cache::AppInfoCache;
use crate::constants::LABEL_PREFIX;
use crate::envelope::{Envelope, Event};

pub type Labels = HashMap<String, String>;

/// Application id referenced by the envelope, if its event type carries one.
#[must_use]
pub fn application_id(envelope: &Envelope) -> Option<String> {
    let app_id = match &envelope.event {
        Event::HttpStartStop(http) => http.application_id.map(|id| id.to_canonical_string()),
        Event::LogMessage(log) => Some(log.app_id.clone()),
        Event::ContainerMetric(container) => Some(container.application_id.clone()),
        _ => None,
    };
    app_id.filter(|id| !id.is_empty())
}

/// Builds the label set for `envelope`, enriched from `cache` when an application id
/// is present. A cache miss adds nothing.
#[must_use]
pub fn build_labels(envelope: &Envelope, cache: Option<&dyn AppInfoCache>) -> Labels {
    let mut labels = Labels::new();

    insert_if_present(&mut labels, "origin", envelope.origin.as_deref());
    insert(&mut labels, "eventType", &envelope.event_type().to_string());
    insert_if_present(&mut labels, "deployment", envelope.deployment.as_deref());
    insert_if_present(&mut labels, "job", envelope.job.as_deref());
    insert_if_present(&mut labels, "index", envelope.index.as_deref());
    insert_if_present(&mut labels, "ip", envelope.ip.as_deref());

    if let Some(app_id) = application_id(envelope) {
        insert(&mut labels, "applicationId", &app_id);
        if let Some(cache) = cache {
            let app = cache.get_app_info(&app_id);
            for (key, value) in [
                ("appName", &app.name),
                ("spaceName", &app.space_name),
                ("spaceGuid", &app.space_guid),
                ("orgName", &app.org_name),
                ("orgGuid", &app.org_guid),
            ] {
                if !value.is_empty() {
                    insert(&mut labels, key, value);
                }
            }
        }
    }

    labels
}

fn insert(labels: &mut Labels, key: &str, value: &str) {
    labels.insert(format!("{LABEL_PREFIX}{key}"), value.to_string());
}

fn insert_if_present(labels: &mut Labels, key: &str, value: Option<&str>) {
    if let Some(value) = value.filter(|v| !v.is_empty()) {
        insert(labels, key, value);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::app_cache::{AppMetadata, StaticAppCache};
    use crate::envelope::{ContainerMetric, CounterEvent, HttpStartStop, LogMessage, Uuid};

    const APP_ID: &str = "ee2aa52e-3c8a-4851-b505-0cb9fe24806e";

    fn key(name: &str) -> String {
        format!("{LABEL_PREFIX}{name}")
    }

    fn container_envelope(app_id: &str) -> Envelope {
        Envelope::new(Event::ContainerMetric(ContainerMetric {
            application_id: app_id.to_string(),
            ..ContainerMetric::default()
        }))
    }

    #[test]
    fn test_only_event_type_when_no_metadata() {
        let envelope = Envelope::new(Event::CounterEvent(CounterEvent::default()));
        let labels = build_labels(&envelope, None);

        assert_eq!(
            labels,
            Labels::from([(key("eventType"), "CounterEvent".to_string())])
        );
    }

    #[test]
    fn test_all_envelope_fields() {
        let mut envelope = Envelope::new(Event::CounterEvent(CounterEvent::default()));
        envelope.origin = Some("gorouter".to_string());
        envelope.deployment = Some("cf".to_string());
        envelope.job = Some("router".to_string());
        envelope.index = Some("3".to_string());
        envelope.ip = Some("10.0.0.1".to_string());

        let labels = build_labels(&envelope, None);

        assert_eq!(labels.len(), 6);
        assert_eq!(labels[&key("origin")], "gorouter");
        assert_eq!(labels[&key("deployment")], "cf");
        assert_eq!(labels[&key("job")], "router");
        assert_eq!(labels[&key("index")], "3");
        assert_eq!(labels[&key("ip")], "10.0.0.1");
    }

    #[test]
    fn test_empty_envelope_fields_are_skipped() {
        let envelope: Envelope = serde_json::from_str(
            r#"{"eventType":"CounterEvent","origin":"","deployment":"","job":"","index":"","ip":""}"#,
        )
        .unwrap();

        let labels = build_labels(&envelope, None);

        assert_eq!(
            labels,
            Labels::from([(key("eventType"), "CounterEvent".to_string())])
        );
    }

    #[test]
    fn test_application_id_per_event_type() {
        let http = Envelope::new(Event::HttpStartStop(HttpStartStop {
            application_id: Some(Uuid {
                low: 0x5148_8a3c_2ea5_2aee,
                high: 0x6e80_24fe_b90c_05b5,
            }),
            ..HttpStartStop::default()
        }));
        assert_eq!(application_id(&http).as_deref(), Some(APP_ID));

        let log = Envelope::new(Event::LogMessage(LogMessage {
            app_id: APP_ID.to_string(),
            ..LogMessage::default()
        }));
        assert_eq!(application_id(&log).as_deref(), Some(APP_ID));

        assert_eq!(
            application_id(&container_envelope(APP_ID)).as_deref(),
            Some(APP_ID)
        );
    }

    #[test]
    fn test_application_id_absent() {
        let http = Envelope::new(Event::HttpStartStop(HttpStartStop::default()));
        assert_eq!(application_id(&http), None);

        assert_eq!(application_id(&container_envelope("")), None);

        let counter = Envelope::new(Event::CounterEvent(CounterEvent::default()));
        assert_eq!(application_id(&counter), None);
    }

    #[test]
    fn test_app_metadata_enrichment() {
        let cache = StaticAppCache::new();
        cache.insert(
            APP_ID,
            AppMetadata {
                name: "billing".to_string(),
                space_name: "prod".to_string(),
                space_guid: "space-guid".to_string(),
                org_name: "acme".to_string(),
                org_guid: String::new(),
            },
        );

        let labels = build_labels(&container_envelope(APP_ID), Some(&cache));

        assert_eq!(labels[&key("applicationId")], APP_ID);
        assert_eq!(labels[&key("appName")], "billing");
        assert_eq!(labels[&key("spaceName")], "prod");
        assert_eq!(labels[&key("spaceGuid")], "space-guid");
        assert_eq!(labels[&key("orgName")], "acme");
        assert!(!labels.contains_key(&key("orgGuid")));
    }

    #[test]
    fn test_cache_miss_adds_nothing() {
        let cache = StaticAppCache::new();
        let with_cache = build_labels(&container_envelope(APP_ID), Some(&cache));
        let without_cache = build_labels(&container_envelope(APP_ID), None);

        assert_eq!(with_cache, without_cache);
        assert_eq!(with_cache.len(), 2);
    }
}
