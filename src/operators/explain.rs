//! EXPLAIN.
//!
//! Does not execute the inner plan; emits its rendered operator tree, one
//! row per operator, pre-rendered by the physical planner.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ExplainOperator {
    /// (operator, config) per plan node, depth encoded by indentation
    pub rows: Vec<(String, String)>,
    pub identities: Vec<String>,
}

impl Operator for ExplainOperator {
    fn name(&self) -> &'static str {
        "Explain"
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
        let operators = Array::Varchar(
            self.rows
                .iter()
                .map(|(operator, _)| Some(operator.clone()))
                .collect(),
        );
        let configs = Array::Varchar(
            self.rows
                .iter()
                .map(|(_, config)| Some(config.clone()))
                .collect(),
        );
        let morsel = Morsel::new(vec![
            Column::new(self.identities[0].clone(), operators),
            Column::new(self.identities[1].clone(), configs),
        ])?;
        Ok(single_batch(morsel))
    }
}
