// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

//! Bootstrapping a small application from packaged services.

use std::sync::Arc;

use service_graph::{
    CreatedService, ExternalReference, InterfaceSpec, LookupOptions, ReferenceSpec, ServiceDescriptor, ServiceLayer, ServiceLayerOptions,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

struct Config {
    base_url: String,
}

struct HttpClient {
    config: Arc<Config>,
}

struct Layer {
    name: &'static str,
    client: Arc<HttpClient>,
}

struct Tool(&'static str);

fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry().with(tracing_subscriber::fmt::layer()).init();

    let config = ServiceDescriptor::builder("app.Config", "app")
        .provides("app.Config")
        .build(|_| {
            Ok(CreatedService::new(Config {
                base_url: "https://tiles.example.com".to_string(),
            }))
        });

    let client = ServiceDescriptor::builder("http.Client", "http")
        .provides("http.Client")
        .reference("config", "app.Config")
        .build(|context| {
            let config = context.service::<Config>("config")?;
            Ok(CreatedService::new(HttpClient { config }).with_teardown(|| {
                println!("closing HTTP connections");
                Ok(())
            }))
        });

    // The same interface under two qualifiers; lookups pick one by qualifier.
    let layers = ["streets", "satellite"].map(|name| {
        ServiceDescriptor::builder(format!("map.{name}"), "map")
            .provides_qualified("map.Layer", name)
            .reference("client", "http.Client")
            .build(move |context| {
                let client = context.service::<HttpClient>("client")?;
                Ok(CreatedService::new(Layer { name, client }))
            })
    });

    let tools = ["zoom", "measure"].map(|name| {
        ServiceDescriptor::builder(format!("tools.{name}"), "tools")
            .provides("map.Tool")
            .build(move |_| Ok(CreatedService::new(Tool(name))))
    });

    let unused = ServiceDescriptor::builder("print.Printer", "print")
        .provides("print.Printer")
        .build(|_| Ok(CreatedService::new(())));

    let mut layer = ServiceLayer::builder()
        .services([config, client, unused])
        .services(layers)
        .services(tools)
        .ui_references([
            ExternalReference::new("viewer", ReferenceSpec::qualified("map.Layer", "streets")),
            ExternalReference::new("viewer", ReferenceSpec::all("map.Tool")),
        ])
        .options(ServiceLayerOptions::new().report_unused_services(true))
        .build()?;

    layer.start()?;

    if let Some(instance) = layer
        .get_service("viewer", &InterfaceSpec::qualified("map.Layer", "streets"), LookupOptions::default())?
        .found()
        && let Some(map_layer) = instance.downcast::<Layer>()
    {
        println!("showing layer '{}' from {}", map_layer.name, map_layer.client.config.base_url);
    }

    if let Some(tools) = layer.get_services("viewer", "map.Tool")?.found() {
        let names: Vec<&str> = tools
            .iter()
            .filter_map(|tool| tool.downcast_ref::<Tool>())
            .map(|tool| tool.0)
            .collect();
        println!("toolbar: {}", names.join(", "));
    }

    // Satellite imagery was never declared by the viewer.
    let satellite = layer.get_service("viewer", &InterfaceSpec::qualified("map.Layer", "satellite"), LookupOptions::default())?;
    println!("satellite lookup: {satellite:?}");

    layer.destroy()?;
    Ok(())
}
