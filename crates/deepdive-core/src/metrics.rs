use once_cell::sync::OnceCell;
use opentelemetry::metrics::{Counter, Histogram, Meter};
use opentelemetry::{KeyValue, global};

struct UnitMetrics {
    calls: Counter<u64>,
    retries: Counter<u64>,
    duration_ms: Histogram<f64>,
}

static METRICS: OnceCell<UnitMetrics> = OnceCell::new();

fn handles() -> &'static UnitMetrics {
    METRICS.get_or_init(|| {
        let meter: Meter = global::meter("deepdive.units");
        UnitMetrics {
            calls: meter
                .u64_counter("unit_calls_total")
                .with_description("Model calls issued by task units, by outcome")
                .init(),
            retries: meter
                .u64_counter("unit_retries_total")
                .with_description("Model calls retried after a transient status")
                .init(),
            duration_ms: meter
                .f64_histogram("unit_duration_ms")
                .with_description("Wall time of a unit including retries")
                .init(),
        }
    })
}

/// Record a finished unit (no-op if no meter provider is installed).
pub fn record_unit(unit: &str, outcome: &str, attempts: u32, duration_ms: u64) {
    let metrics = handles();
    let attrs = [
        KeyValue::new("unit", unit.to_string()),
        KeyValue::new("outcome", outcome.to_string()),
    ];
    metrics.calls.add(u64::from(attempts), &attrs);
    metrics.duration_ms.record(duration_ms as f64, &attrs);
}

pub fn record_retry(unit: &str, status: Option<u16>) {
    let attrs = [
        KeyValue::new("unit", unit.to_string()),
        KeyValue::new("status", status.map(i64::from).unwrap_or(0)),
    ];
    handles().retries.add(1, &attrs);
}
