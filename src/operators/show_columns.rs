//! SHOW COLUMNS.

use std::sync::Arc;

use crate::catalogue::RelationSchema;
use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ShowColumnsOperator {
    pub target: RelationSchema,
    pub full: bool,
    pub identities: Vec<String>,
}

impl Operator for ShowColumnsOperator {
    fn name(&self) -> &'static str {
        "ShowColumns"
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
        let names = Array::Varchar(
            self.target
                .columns
                .iter()
                .map(|c| Some(c.query_column.clone()))
                .collect(),
        );
        let types = Array::Varchar(
            self.target
                .columns
                .iter()
                .map(|c| Some(c.data_type.to_string()))
                .collect(),
        );
        let mut columns = vec![
            Column::new(self.identities[0].clone(), names),
            Column::new(self.identities[1].clone(), types),
        ];
        if self.full {
            let relations = Array::Varchar(
                self.target
                    .columns
                    .iter()
                    .map(|c| c.relation.clone().or_else(|| Some(self.target.name.clone())))
                    .collect(),
            );
            columns.push(Column::new(self.identities[2].clone(), relations));
        }
        Ok(single_batch(Morsel::new(columns)?))
    }
}
