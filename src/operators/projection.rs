//! Column projection.
//!
//! Appends computed columns (evaluation-ordering step: inner expressions
//! first, under stable identities), then selects the requested identity set
//! in order. Renaming to user-facing names is the Exit operator's job.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::expression::{evaluator, Expression};
use crate::morsel::Morsel;
use crate::operators::{one_producer, MorselStream, Operator};

pub struct ProjectionOperator {
    pub columns: Vec<Expression>,
    pub identities: Vec<String>,
}

impl Operator for ProjectionOperator {
    fn name(&self) -> &'static str {
        "Projection"
    }

    fn config(&self) -> String {
        self.columns
            .iter()
            .map(|c| c.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        let producer = one_producer(producers, self.name())?;
        let operator = self.clone();
        let stream = producer.map(move |batch| -> Result<Morsel> {
            let batch = batch?;
            let start = std::time::Instant::now();
            let expressions: Vec<&Expression> = operator.columns.iter().collect();
            let appended = evaluator::evaluate_and_append(&expressions, batch)?;
            ctx.statistics
                .record_elapsed(&ctx.statistics.time_evaluating_ns, start);
            appended.select(&operator.identities)
        });
        Ok(Box::new(stream))
    }
}
