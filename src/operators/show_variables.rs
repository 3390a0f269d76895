//! SHOW VARIABLES.

use std::sync::Arc;

use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ShowVariablesOperator {
    pub identities: Vec<String>,
}

impl Operator for ShowVariablesOperator {
    fn name(&self) -> &'static str {
        "ShowVariables"
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
        let mut entries: Vec<(String, String)> = ctx
            .variables
            .iter()
            .map(|(name, value)| (name.clone(), value.to_string()))
            .collect();
        entries.sort();
        let morsel = Morsel::new(vec![
            Column::new(
                self.identities[0].clone(),
                Array::Varchar(entries.iter().map(|(n, _)| Some(n.clone())).collect()),
            ),
            Column::new(
                self.identities[1].clone(),
                Array::Varchar(entries.iter().map(|(_, v)| Some(v.clone())).collect()),
            ),
        ])?;
        Ok(single_batch(morsel))
    }
}
