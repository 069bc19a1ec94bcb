//! Instrumentation coverage for the dataset search entry point.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex};

use tracing::Subscriber;
use tracing::field::{Field, Visit};
use tracing_subscriber::Layer;
use tracing_subscriber::layer::{Context, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;

use parsnip_core::{Dataset, Search, SearchConfig};

/// Captures closed spans so the test can assert on instrumentation
/// without holding the layer's internal lock.
#[derive(Clone, Default)]
struct RecordingLayer {
    spans: Arc<Mutex<Vec<SpanRecord>>>,
}

impl RecordingLayer {
    fn spans(&self) -> Vec<SpanRecord> {
        self.spans.lock().expect("lock poisoned").clone()
    }
}

#[derive(Debug, Clone)]
struct SpanRecord {
    name: String,
    fields: HashMap<String, String>,
}

#[derive(Default)]
struct SpanData {
    name: String,
    fields: HashMap<String, String>,
}

impl<S> Layer<S> for RecordingLayer
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    fn on_new_span(
        &self,
        attrs: &tracing::span::Attributes<'_>,
        id: &tracing::span::Id,
        ctx: Context<'_, S>,
    ) {
        if let Some(span) = ctx.span(id) {
            let mut data = SpanData {
                name: attrs.metadata().name().to_owned(),
                fields: HashMap::new(),
            };
            attrs.record(&mut FieldRecorder {
                fields: &mut data.fields,
            });
            span.extensions_mut().insert(data);
        }
    }

    fn on_close(&self, id: tracing::span::Id, ctx: Context<'_, S>) {
        let Some(span) = ctx.span(&id) else {
            return;
        };
        let Some(data) = span.extensions_mut().remove::<SpanData>() else {
            return;
        };
        self.spans.lock().expect("lock poisoned").push(SpanRecord {
            name: data.name,
            fields: data.fields,
        });
    }
}

struct FieldRecorder<'a> {
    fields: &'a mut HashMap<String, String>,
}

impl Visit for FieldRecorder<'_> {
    fn record_debug(&mut self, field: &Field, value: &dyn fmt::Debug) {
        self.fields
            .insert(field.name().to_owned(), format!("{value:?}"));
    }

    fn record_str(&mut self, field: &Field, value: &str) {
        self.fields
            .insert(field.name().to_owned(), value.to_owned());
    }
}

#[test]
fn run_dataset_records_its_span() {
    let config = SearchConfig::builder()
        .with_seed(3)
        .with_masking_sites(1, 1)
        .with_sampling_iterations(1)
        .build()
        .expect("valid test config");
    let dataset = Dataset {
        name: "trace-me".to_owned(),
        taxa: vec![
            ("a".to_owned(), b"ACGTACGT".to_vec()),
            ("b".to_owned(), b"ACCTACGT".to_vec()),
            ("c".to_owned(), b"ACCTACGA".to_vec()),
        ],
    };
    let layer = RecordingLayer::default();
    let subscriber = tracing_subscriber::registry().with(layer.clone());

    let outcome =
        tracing::subscriber::with_default(subscriber, || Search::new(config).run_dataset(&dataset))
            .expect("search succeeds");
    assert_eq!(outcome.dataset, "trace-me");

    let spans = layer.spans();
    let run_span = spans
        .iter()
        .find(|span| span.name == "run_dataset")
        .expect("run_dataset span must exist");
    assert_eq!(run_span.fields.get("dataset"), Some(&"trace-me".to_owned()));
}
