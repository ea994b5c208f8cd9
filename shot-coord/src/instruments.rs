use std::fmt;

use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;
use opentelemetry::metrics::Histogram;
use opentelemetry::metrics::Meter;
use quanta::Clock;
use tracing::debug;
use tracing::warn;

use crate::Decision;
use crate::Outcome;
use crate::error::StoreError;
use crate::script::AtomicScript;
use crate::script::Reply;
use crate::store::CoordinationStore;

/// Per-primitive counters and latency histogram.
#[derive(Clone)]
pub(crate) struct Instruments {
    name: &'static str,
    decisions: Counter<u64>,
    duration: Histogram<f64>,
    clock: Clock,
}

impl fmt::Debug for Instruments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Instruments")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl Instruments {
    pub(crate) fn new(name: &'static str) -> Self {
        Self::with_meter(name, &global::meter(name))
    }

    pub(crate) fn with_meter(name: &'static str, meter: &Meter) -> Self {
        Self {
            name,
            decisions: meter
                .u64_counter(format!("{name}_decisions_total"))
                .with_description("Decisions taken, by outcome")
                .build(),
            duration: meter
                .f64_histogram(format!("{name}_duration_seconds"))
                .with_description("Time spent in the coordination store round-trip")
                .with_unit("s")
                .build(),
            clock: Clock::new(),
        }
    }

    /// Runs `script` once and turns the reply into a decision, recording
    /// the outcome and the round-trip latency on the way out.
    pub(crate) async fn run<T>(
        &self,
        store: &dyn CoordinationStore,
        script: AtomicScript,
        interpret: impl FnOnce(Reply) -> Result<Decision<T>, StoreError>,
    ) -> Decision<T> {
        let start = self.clock.now();
        let decision = match store.eval(&script).await {
            Ok(reply) => interpret(reply).unwrap_or_else(Decision::Error),
            Err(err) => Decision::Error(err),
        };
        let elapsed = self.clock.now().duration_since(start);

        let outcome = decision.outcome();
        self.decisions
            .add(1, &[KeyValue::new("outcome", outcome.as_str())]);
        self.duration.record(elapsed.as_secs_f64(), &[]);

        let key = script.keys().first().map(|k| k.as_str()).unwrap_or_default();
        match &decision {
            Decision::Error(err) => warn!(
                primitive = self.name,
                key,
                error = %err,
                "coordination store error"
            ),
            _ => debug!(
                primitive = self.name,
                key,
                %outcome,
                elapsed_us = elapsed.as_micros() as u64,
                "decision"
            ),
        }

        decision
    }

    /// Counts a decision taken without consulting the store.
    pub(crate) fn skipped(&self, outcome: Outcome, reason: &'static str) {
        self.decisions.add(
            1,
            &[
                KeyValue::new("outcome", outcome.as_str()),
                KeyValue::new("reason", reason),
            ],
        );
        debug!(primitive = self.name, %outcome, reason, "decision without store");
    }
}

/// Interprets a `0/1` flag, mapping `0` to `refused`.
pub(crate) fn flag_decision(
    script: &'static str,
    reply: Reply,
    refused: Decision,
) -> Result<Decision, StoreError> {
    match reply.flag() {
        Some(true) => Ok(Decision::Allow(())),
        Some(false) => Ok(refused),
        None => Err(StoreError::UnexpectedReply {
            script,
            reply: reply.to_string(),
        }),
    }
}
