//! SHOW DATABASES.

use std::sync::Arc;

use crate::catalogue::Catalogue;
use crate::context::QueryContext;
use crate::errors::Result;
use crate::morsel::{Array, Column, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct ShowDatabasesOperator {
    pub identities: Vec<String>,
}

impl Operator for ShowDatabasesOperator {
    fn name(&self) -> &'static str {
        "ShowDatabases"
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
        let sources = Catalogue::global().sources();
        let morsel = Morsel::new(vec![Column::new(
            self.identities[0].clone(),
            Array::Varchar(sources.into_iter().map(Some).collect()),
        )])?;
        Ok(single_batch(morsel))
    }
}
