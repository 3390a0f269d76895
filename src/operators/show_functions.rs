//! SHOW FUNCTIONS.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::expression::{aggregations, functions};
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ShowFunctionsOperator {
    pub identities: Vec<String>,
}

impl Operator for ShowFunctionsOperator {
    fn name(&self) -> &'static str {
        "ShowFunctions"
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
        let mut rows: Vec<(String, String)> = functions::function_names()
            .into_iter()
            .map(|name| (name.to_string(), "scalar".to_string()))
            .collect();
        rows.extend(
            aggregations::aggregator_names()
                .into_iter()
                .map(|name| (name.to_string(), "aggregator".to_string())),
        );
        rows.sort();
        let morsel = Morsel::new(vec![
            Column::new(
                self.identities[0].clone(),
                Array::Varchar(rows.iter().map(|(n, _)| Some(n.clone())).collect()),
            ),
            Column::new(
                self.identities[1].clone(),
                Array::Varchar(rows.iter().map(|(_, k)| Some(k.clone())).collect()),
            ),
        ])?;
        Ok(single_batch(morsel))
    }
}
