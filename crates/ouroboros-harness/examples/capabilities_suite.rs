//! Two-tester suite against an in-process fake map service.
//!
//! Run with: cargo run -p ouroboros-harness --example capabilities_suite

use std::sync::Arc;

use async_trait::async_trait;
use ouroboros_harness::assertions::{assert_is_array_length_minimal, assert_is_defined, assert_json_object};
use ouroboros_harness::{Suite, SuitePlan, SuiteReport, Tester};
use serde_json::{json, Value};

#[derive(Debug, thiserror::Error)]
enum ServiceError {
    #[error("unknown layer: {0}")]
    UnknownLayer(String),
}

struct FakeMapService {
    layers: Vec<&'static str>,
}

impl FakeMapService {
    async fn capabilities(&self) -> Value {
        json!({
            "service": {"name": "WMS", "version": "1.3.0"},
            "layers": self.layers.iter().map(|name| json!({"name": name, "queryable": true})).collect::<Vec<_>>(),
        })
    }

    async fn render(&self, layer: &str) -> Result<Vec<u8>, ServiceError> {
        if self.layers.iter().any(|known| *known == layer) {
            Ok(vec![0x89, b'P', b'N', b'G'])
        } else {
            Err(ServiceError::UnknownLayer(layer.to_string()))
        }
    }
}

struct MapServices {
    service: Arc<FakeMapService>,
    capabilities: Tester,
    rendering: Tester,
}

#[async_trait]
impl SuitePlan for MapServices {
    async fn launch(&self, _suite: &Suite) -> anyhow::Result<()> {
        let service = Arc::clone(&self.service);
        let capabilities = self.capabilities.test(
            "GetCapabilities lists roads",
            move |test| async move {
                test.add_step("Requesting capabilities");
                Ok(service.capabilities().await)
            },
            |test, doc| async move {
                test.add_step("Checking service block");
                assert_json_object(&*doc, &json!({"service": {"name": "WMS"}}))?;
                test.add_step("Checking layer list");
                assert_json_object(&*doc, &json!({"layers": [{"name": "roads"}]}))?;
                let layers = assert_is_defined(doc["layers"].as_array(), "layers")?;
                assert_is_array_length_minimal(Some(&layers[..]), 2)?;
                Ok(())
            },
        );

        let service = Arc::clone(&self.service);
        let render = self.rendering.test(
            "GetMap renders roads",
            move |test| async move {
                test.add_step("Rendering layer roads");
                Ok(service.render("roads").await?)
            },
            |_test, image| async move {
                assert_is_array_length_minimal(Some(&image[..]), 1)?;
                Ok(())
            },
        );

        let service = Arc::clone(&self.service);
        let unknown = self.rendering.test_error::<ServiceError, _, _>("GetMap rejects unknown layer", move |_test| async move {
            service.render("volcanoes").await?;
            Ok(())
        });

        futures::join!(capabilities.run(), render.run(), unknown.run());
        Ok(())
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt().with_max_level(tracing::Level::DEBUG).init();

    let capabilities = Tester::new("capabilities");
    let rendering = Tester::new("rendering");
    let suite = Suite::new(
        "map-services",
        "Capabilities and rendering checks for the map service",
        MapServices {
            service: Arc::new(FakeMapService {
                layers: vec!["roads", "rivers"],
            }),
            capabilities: capabilities.clone(),
            rendering: rendering.clone(),
        },
    )
    .with_tester(capabilities)
    .with_tester(rendering);

    suite.subscribe(|event| {
        println!("[{}] {} :: {}", event.tester.name(), event.test.title(), event.kind.event_type());
    });

    suite.launch_test_suite().await?;

    let report = SuiteReport::capture(&suite);
    println!("{}", report.to_markdown());

    if !report.all_passed() {
        anyhow::bail!("{} of {} tests failed", report.totals.done_failed, report.totals.total);
    }
    Ok(())
}
