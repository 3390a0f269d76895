//! SHOW CREATE TABLE.
//!
//! Renders a DDL sketch for the relation; datasets are schema-on-read, so
//! this reflects the schema the binder inferred, not a stored definition.

use std::sync::Arc;

use crate::catalogue::RelationSchema;
use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ShowCreateOperator {
    pub target: RelationSchema,
    pub identities: Vec<String>,
}

impl Operator for ShowCreateOperator {
    fn name(&self) -> &'static str {
        "ShowCreate"
    }

    fn config(&self) -> String {
        self.target.name.clone()
    }

    fn producer_arity(&self) -> usize {
        0
    }

    fn execute(
        self: Arc<Self>,
        producers: Vec<MorselStream>,
        _ctx: Arc<QueryContext>,
    ) -> Result<MorselStream> {
        no_producers(producers, self.name())?;
        let body = self
            .target
            .columns
            .iter()
            .map(|c| format!("  {} {}", c.query_column, c.data_type))
            .collect::<Vec<_>>()
            .join(",\n");
        let ddl = format!("CREATE TABLE {} (\n{}\n)", self.target.name, body);
        let morsel = Morsel::new(vec![
            Column::new(
                self.identities[0].clone(),
                Array::Varchar(vec![Some(self.target.name.clone())]),
            ),
            Column::new(self.identities[1].clone(), Array::Varchar(vec![Some(ddl)])),
        ])?;
        Ok(single_batch(morsel))
    }
}
