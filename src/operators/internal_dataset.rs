//! Built-in sample relations (`$planets`, `$no_table`).

use std::sync::Arc;

use crate::catalogue::RelationSchema;
use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::operators::{align_to_schema, no_producers, single_batch, MorselStream, Operator};
use crate::samples;

pub struct InternalDatasetOperator {
    pub relation: String,
    pub schema: RelationSchema,
}

impl Operator for InternalDatasetOperator {
    fn name(&self) -> &'static str {
        "InternalDataset"
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
        let morsel = samples::read(&self.relation)
            .ok_or_else(|| EngineError::DatasetNotFound(self.relation.clone()))??;
        ctx.statistics
            .add(&ctx.statistics.rows_read, morsel.num_rows() as u64);
        ctx.statistics
            .add(&ctx.statistics.columns_read, morsel.num_columns() as u64);
        Ok(single_batch(align_to_schema(&morsel, &self.schema)?))
    }
}
