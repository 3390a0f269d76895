//! Blob scan.
//!
//! Reads a dataset through a [`Connector`], renames source columns onto
//! plan identities, and records rows/columns-read statistics. Partitioning
//! and the read-through cache live behind the connector contract.

use std::sync::Arc;

use crate::connectors::{self, Connector};
use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::Morsel;
use crate::operators::{align_to_schema, no_producers, MorselStream, Operator};
use crate::catalogue::RelationSchema;
use crate::sql_rewriter::TemporalRange;

pub struct ScannerOperator {
    pub relation: String,
    pub temporal: Option<TemporalRange>,
    pub schema: RelationSchema,
}

impl Operator for ScannerOperator {
    fn name(&self) -> &'static str {
        "Scanner"
    }

    fn config(&self) -> String {
        self.relation.clone()
    }

    fn producer_arity(&self) -> usize {
        0
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        no_producers(producers, self.name())?;

        let range = self.temporal.unwrap_or_else(TemporalRange::today);
        let connector = connectors::DiskConnector::new(
            &self.relation,
            range,
            ctx.cache.clone(),
            ctx.statistics.clone(),
        );
        let source = connector.read_dataset()?;

        let operator = self.clone();
        let stream = source.map(move |batch| -> Result<Morsel> {
            let start = std::time::Instant::now();
            let batch = batch?;
            ctx.statistics
                .add(&ctx.statistics.rows_read, batch.num_rows() as u64);
            ctx.statistics
                .add(&ctx.statistics.columns_read, batch.num_columns() as u64);
            let aligned = align_to_schema(&batch, &operator.schema)?;
            ctx.statistics
                .record_elapsed(&ctx.statistics.time_reading_ns, start);
            Ok(aligned)
        });
        Ok(Box::new(stream))
    }
}
