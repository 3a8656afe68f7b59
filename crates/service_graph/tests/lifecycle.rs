// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

#![allow(missing_docs, clippy::unwrap_used, reason = "This is a test module")]

//! Integration tests for starting and destroying a service layer.

use pretty_assertions::assert_eq;
use service_graph::{
    CreatedService, Error, ExternalReference, InterfaceSpec, LayerState, LookupOptions, ReferenceSpec, ServiceDescriptor,
    ServiceDescriptorBuilder, ServiceLayer, ServiceLayerOptions, ServiceState,
};
use testing_aids::{CallJournal, LogCapture};

/// Finishes a descriptor whose factory and teardown are recorded in `journal`. The instance is
/// the service id as a `String`.
fn journaled(builder: ServiceDescriptorBuilder, journal: &CallJournal) -> ServiceDescriptor {
    let journal = journal.clone();
    builder.build(move |context| {
        let id = context.service_id().to_string();
        journal.record(format!("create {id}"));

        let journal = journal.clone();
        let teardown_id = id.clone();
        Ok(CreatedService::new(id).with_teardown(move || {
            journal.record(format!("destroy {teardown_id}"));
            Ok(())
        }))
    })
}

fn ui(interface_name: &str) -> ExternalReference {
    ExternalReference::new("ui", ReferenceSpec::single(interface_name))
}

/// `repo -> db -> config`, plus an `orphan` nobody needs.
fn chain(journal: &CallJournal) -> Vec<ServiceDescriptor> {
    vec![
        journaled(ServiceDescriptor::builder("orphan", "misc").provides("misc.Orphan"), journal),
        journaled(
            ServiceDescriptor::builder("repo", "data")
                .provides("data.Repository")
                .reference("db", "data.Database"),
            journal,
        ),
        journaled(
            ServiceDescriptor::builder("db", "data")
                .provides("data.Database")
                .reference("config", "app.Config"),
            journal,
        ),
        journaled(ServiceDescriptor::builder("config", "app").provides("app.Config"), journal),
    ]
}

#[test]
fn start_constructs_dependencies_first_and_skips_unreachable_services() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();

    assert_eq!(layer.state(), LayerState::NotStarted);
    assert!(journal.entries().is_empty());

    layer.start().unwrap();

    assert_eq!(layer.state(), LayerState::Started);
    assert_eq!(journal.entries(), ["create config", "create db", "create repo"]);
    assert_eq!(layer.service_state("repo"), Some(ServiceState::Constructed));
    assert_eq!(layer.service_state("orphan"), Some(ServiceState::NotConstructed));
    assert_eq!(layer.service_state("unknown"), None);
}

#[test]
fn destroy_tears_down_dependents_before_their_dependencies() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();
    layer.start().unwrap();
    journal.clear();

    layer.destroy().unwrap();

    assert_eq!(layer.state(), LayerState::Destroyed);
    assert_eq!(journal.entries(), ["destroy repo", "destroy db", "destroy config"]);
    assert_eq!(layer.service_state("config"), Some(ServiceState::Destroyed));
    assert_eq!(layer.service_state("orphan"), Some(ServiceState::NotConstructed));
}

#[test]
fn shared_dependency_is_constructed_once_and_torn_down_last() {
    let journal = CallJournal::new();
    let services = vec![
        journaled(
            ServiceDescriptor::builder("left", "pkg").provides("Left").reference("shared", "Shared"),
            &journal,
        ),
        journaled(
            ServiceDescriptor::builder("right", "pkg").provides("Right").reference("shared", "Shared"),
            &journal,
        ),
        journaled(ServiceDescriptor::builder("shared", "pkg").provides("Shared"), &journal),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("Left"), ui("Right")]).unwrap();

    layer.start().unwrap();
    assert_eq!(journal.count("create shared"), 1);
    assert_eq!(layer.ref_count("shared"), Some(2));
    assert_eq!(layer.ref_count("left"), Some(1));

    layer.destroy().unwrap();
    assert_eq!(journal.count("destroy shared"), 1);
    journal.assert_before("destroy left", "destroy shared");
    journal.assert_before("destroy right", "destroy shared");
    assert_eq!(layer.ref_count("shared"), Some(0));
}

#[test]
fn forced_and_ui_references_to_the_same_service_count_once() {
    let journal = CallJournal::new();
    let services = vec![journaled(ServiceDescriptor::builder("clock", "time").provides("time.Clock"), &journal)];
    let mut layer = ServiceLayer::new(
        services,
        [ExternalReference::new("runtime", ReferenceSpec::single("time.Clock"))],
        [ui("time.Clock")],
    )
    .unwrap();

    layer.start().unwrap();
    assert_eq!(layer.ref_count("clock"), Some(1));

    layer.destroy().unwrap();
    assert_eq!(journal.entries(), ["create clock", "destroy clock"]);
}

#[test]
fn all_reference_receives_every_provider_with_metadata() {
    let journal = CallJournal::new();
    let recorder = journal.clone();

    let host = ServiceDescriptor::builder("host", "app")
        .provides("app.Host")
        .all_references("plugins", "app.Plugin")
        .build(move |context| {
            for plugin in context.services::<String>("plugins")? {
                recorder.record(format!("plugin {plugin}"));
            }
            if let Some(metas) = context.reference_meta("plugins").and_then(|meta| meta.as_all()) {
                for meta in metas {
                    recorder.record(format!("meta {} {:?}", meta.service_id(), meta.qualifier()));
                }
            }
            Ok(CreatedService::new(()))
        });

    let services = vec![
        host,
        journaled(ServiceDescriptor::builder("p1", "plugins").provides("app.Plugin"), &journal),
        journaled(
            ServiceDescriptor::builder("p2", "plugins").provides_qualified("app.Plugin", "beta"),
            &journal,
        ),
        journaled(ServiceDescriptor::builder("p3", "plugins").provides("app.Plugin"), &journal),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("app.Host")]).unwrap();
    layer.start().unwrap();

    assert_eq!(
        journal.entries(),
        [
            "create p1",
            "create p2",
            "create p3",
            "plugin p1",
            "plugin p2",
            "plugin p3",
            "meta p1 None",
            "meta p2 Some(\"beta\")",
            "meta p3 None",
        ]
    );
}

#[test]
fn qualified_reference_injects_the_matching_provider() {
    let journal = CallJournal::new();
    let recorder = journal.clone();

    let consumer = ServiceDescriptor::builder("consumer", "app")
        .provides("app.Consumer")
        .qualified_reference("logger", "log.Logger", "console")
        .build(move |context| {
            let logger = context.service::<String>("logger")?;
            let meta = context.reference_meta("logger").and_then(|meta| meta.as_one()).cloned();
            recorder.record(format!("logger {logger}"));
            if let Some(meta) = meta {
                recorder.record(format!("via {} {:?}", meta.interface_name(), meta.qualifier()));
            }
            Ok(CreatedService::new(()))
        });

    let services = vec![
        consumer,
        journaled(
            ServiceDescriptor::builder("file", "log").provides_qualified("log.Logger", "file"),
            &journal,
        ),
        journaled(
            ServiceDescriptor::builder("console", "log").provides_qualified("log.Logger", "console"),
            &journal,
        ),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("app.Consumer")]).unwrap();
    layer.start().unwrap();

    assert_eq!(
        journal.entries(),
        ["create console", "logger console", "via log.Logger Some(\"console\")"]
    );
    assert_eq!(layer.service_state("file"), Some(ServiceState::NotConstructed));
}

#[test]
fn failing_factory_aborts_start_and_releases_constructed_services() {
    let journal = CallJournal::new();
    let services = vec![
        ServiceDescriptor::builder("db", "data")
            .provides("data.Database")
            .reference("config", "app.Config")
            .build(|_| Err("connection refused".into())),
        journaled(ServiceDescriptor::builder("config", "app").provides("app.Config"), &journal),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("data.Database")]).unwrap();

    let error = layer.start().unwrap_err();

    match &error {
        Error::ServiceCreation { service, source } => {
            assert_eq!(service.as_str(), "db");
            assert_eq!(source.to_string(), "connection refused");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(layer.state(), LayerState::Destroyed);
    assert_eq!(journal.entries(), ["create config", "destroy config"]);
    assert_eq!(layer.service_state("db"), Some(ServiceState::NotConstructed));
}

#[test]
fn failed_start_releases_earlier_required_services() {
    let journal = CallJournal::new();
    let services = vec![
        journaled(ServiceDescriptor::builder("first", "pkg").provides("First"), &journal),
        ServiceDescriptor::builder("second", "pkg")
            .provides("Second")
            .build(|_| Err("boom".into())),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("First"), ui("Second")]).unwrap();

    layer.start().unwrap_err();

    assert_eq!(journal.entries(), ["create first", "destroy first"]);
    layer.destroy().unwrap();
    assert_eq!(journal.count("destroy first"), 1);
}

#[test]
fn lifecycle_misuse_is_rejected() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();

    let before_start = layer
        .get_service("ui", &InterfaceSpec::new("data.Repository"), LookupOptions::default())
        .unwrap_err();
    insta::assert_snapshot!(before_start.to_string(), @"cannot look up a service while the service layer is not started");

    layer.start().unwrap();
    let second_start = layer.start().unwrap_err();
    insta::assert_snapshot!(second_start.to_string(), @"cannot start while the service layer is started");

    layer.destroy().unwrap();
    layer.destroy().unwrap();
    assert!(matches!(
        layer.get_services("ui", "data.Repository"),
        Err(Error::InvalidState {
            state: LayerState::Destroyed,
            ..
        })
    ));
    assert!(matches!(layer.start(), Err(Error::InvalidState { .. })));
    assert_eq!(journal.count("destroy repo"), 1);
}

#[test]
fn destroy_before_start_constructs_nothing() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();

    layer.destroy().unwrap();

    assert_eq!(layer.state(), LayerState::Destroyed);
    assert!(journal.entries().is_empty());
}

#[test]
fn lazily_constructed_services_are_released_on_destroy() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();
    layer.start().unwrap();

    let orphan = layer
        .get_service(
            "framework",
            &InterfaceSpec::new("misc.Orphan"),
            LookupOptions::new().ignore_declaration_check(true),
        )
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(orphan.downcast_ref::<String>().map(String::as_str), Some("orphan"));
    assert_eq!(layer.ref_count("orphan"), Some(1));

    let repo = layer
        .get_service("ui", &InterfaceSpec::new("data.Repository"), LookupOptions::default())
        .unwrap()
        .found()
        .unwrap();
    assert_eq!(repo.downcast_ref::<String>().map(String::as_str), Some("repo"));
    assert_eq!(layer.ref_count("repo"), Some(2));

    layer.destroy().unwrap();

    assert_eq!(journal.count("destroy orphan"), 1);
    assert_eq!(journal.count("destroy repo"), 1);
    journal.assert_before("destroy orphan", "destroy repo");
}

#[test]
fn teardown_failure_is_logged_and_the_rest_of_the_graph_is_destroyed() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let journal = CallJournal::new();
    let services = vec![
        ServiceDescriptor::builder("cache", "storage")
            .provides("storage.Cache")
            .reference("disk", "storage.Disk")
            .build(|_| Ok(CreatedService::new(()).with_teardown(|| Err("disk full".into())))),
        journaled(ServiceDescriptor::builder("disk", "storage").provides("storage.Disk"), &journal),
    ];
    let mut layer = ServiceLayer::new(services, [], [ui("storage.Cache")]).unwrap();
    layer.start().unwrap();

    layer.destroy().unwrap();

    assert_eq!(journal.entries(), ["create disk", "destroy disk"]);
    assert_eq!(layer.service_state("cache"), Some(ServiceState::Destroyed));
    let failures = capture.lines_containing("service teardown failed");
    assert_eq!(failures.len(), 1, "{}", capture.output());
    assert!(failures[0].contains("ERROR"));
    assert!(failures[0].contains("service.id=cache"));
    assert!(failures[0].contains("disk full"));
}

#[test]
fn unused_services_are_reported_when_enabled() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let journal = CallJournal::new();
    let mut layer = ServiceLayer::builder()
        .services(chain(&journal))
        .ui_reference(ui("data.Repository"))
        .options(ServiceLayerOptions::new().report_unused_services(true))
        .build()
        .unwrap();
    layer.start().unwrap();

    let warnings = capture.lines_containing("never required");
    assert_eq!(warnings.len(), 1, "{}", capture.output());
    assert!(warnings[0].contains("WARN"));
    assert!(warnings[0].contains("service.id=orphan"));
    capture.assert_contains("service layer started");
}

#[test]
fn unused_services_are_not_reported_when_disabled() {
    let capture = LogCapture::new();
    let _guard = tracing::subscriber::set_default(capture.subscriber());

    let journal = CallJournal::new();
    let mut layer = ServiceLayer::builder()
        .services(chain(&journal))
        .ui_reference(ui("data.Repository"))
        .options(ServiceLayerOptions::new().report_unused_services(false))
        .build()
        .unwrap();
    layer.start().unwrap();

    capture.assert_not_contains("never required");
}

#[test]
fn dropping_a_started_layer_tears_services_down() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();
    layer.start().unwrap();
    journal.clear();

    drop(layer);

    assert_eq!(journal.entries(), ["destroy repo", "destroy db", "destroy config"]);
}

#[test]
fn dropping_a_destroyed_layer_does_not_tear_down_again() {
    let journal = CallJournal::new();
    let mut layer = ServiceLayer::new(chain(&journal), [], [ui("data.Repository")]).unwrap();
    layer.start().unwrap();
    layer.destroy().unwrap();

    drop(layer);

    assert_eq!(journal.count("destroy repo"), 1);
    assert_eq!(journal.count("destroy config"), 1);
}
