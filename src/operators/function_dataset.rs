//! Dataset constructors: VALUES, UNNEST, GENERATE_SERIES and FAKE
//! materialised into a single batch.

use std::sync::Arc;

use rand::Rng;

use crate::catalogue::RelationSchema;
use crate::context::QueryContext;
use crate::errors::{EngineError, Result};
use crate::expression::{evaluator, Expression};
use crate::logical_planner::DatasetFunction;
use crate::morsel::{Array, Column, Datum, Morsel};
use crate::operators::{no_producers, single_batch, MorselStream, Operator};

pub struct FunctionDatasetOperator {
    pub function: DatasetFunction,
    pub args: Vec<Expression>,
    pub rows: Vec<Vec<Expression>>,
    pub schema: RelationSchema,
}

impl FunctionDatasetOperator {
    /// Evaluate a bound argument in a one-row scalar context.
    fn scalar(expression: &Expression) -> Result<Datum> {
        let probe = Morsel::with_row_count(1);
        Ok(evaluator::evaluate(expression, &probe)?.get(0))
    }

    fn integer_arg(expression: &Expression, clause: &str) -> Result<i64> {
        match Self::scalar(expression)? {
            Datum::Integer(value) => Ok(value),
            other => Err(EngineError::Sql(format!(
                "{clause} expects an integer argument, got {}",
                other.data_type()
            ))),
        }
    }

    fn generate_series(&self) -> Result<Vec<Vec<Datum>>> {
        let start = Self::integer_arg(&self.args[0], "GENERATE_SERIES")?;
        let stop = Self::integer_arg(&self.args[1], "GENERATE_SERIES")?;
        let step = match self.args.get(2) {
            Some(expression) => Self::integer_arg(expression, "GENERATE_SERIES")?,
            None => {
                if stop >= start {
                    1
                } else {
                    -1
                }
            }
        };
        if step == 0 {
            return Err(EngineError::Sql(
                "GENERATE_SERIES step cannot be zero".to_string(),
            ));
        }
        let mut rows = Vec::new();
        let mut value = start;
        while (step > 0 && value <= stop) || (step < 0 && value >= stop) {
            rows.push(vec![Datum::Integer(value)]);
            value += step;
        }
        Ok(rows)
    }

    fn unnest(&self) -> Result<Vec<Vec<Datum>>> {
        match Self::scalar(&self.args[0])? {
            Datum::List(items) => Ok(items.into_iter().map(|item| vec![item]).collect()),
            Datum::Null => Ok(Vec::new()),
            other => Err(EngineError::Sql(format!(
                "UNNEST expects a list, got {}",
                other.data_type()
            ))),
        }
    }

    fn fake(&self) -> Result<Vec<Vec<Datum>>> {
        let rows = Self::integer_arg(&self.args[0], "FAKE")?.max(0) as usize;
        let columns = Self::integer_arg(&self.args[1], "FAKE")?.max(0) as usize;
        let mut rng = rand::thread_rng();
        Ok((0..rows)
            .map(|_| {
                (0..columns)
                    .map(|_| Datum::Integer(rng.gen::<u16>() as i64))
                    .collect()
            })
            .collect())
    }

    fn values(&self) -> Result<Vec<Vec<Datum>>> {
        let mut rows = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let mut datums = Vec::with_capacity(row.len());
            for expression in row {
                datums.push(Self::scalar(expression)?);
            }
            rows.push(datums);
        }
        Ok(rows)
    }
}

impl Operator for FunctionDatasetOperator {
    fn name(&self) -> &'static str {
        "FunctionDataset"
    }

    fn config(&self) -> String {
        self.function.to_string()
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
        let start = std::time::Instant::now();

        let rows = match self.function {
            DatasetFunction::GenerateSeries => self.generate_series()?,
            DatasetFunction::Unnest => self.unnest()?,
            DatasetFunction::Fake => self.fake()?,
            DatasetFunction::Values => self.values()?,
        };

        let mut columns = Vec::with_capacity(self.schema.columns.len());
        for (index, schema_column) in self.schema.columns.iter().enumerate() {
            let values: Vec<Datum> = rows
                .iter()
                .map(|row| row.get(index).cloned().unwrap_or(Datum::Null))
                .collect();
            columns.push(Column::new(
                schema_column.identity.clone(),
                Array::infer_from_datums(values)?,
            ));
        }
        let morsel = Morsel::new(columns)?;

        ctx.statistics
            .add(&ctx.statistics.rows_read, morsel.num_rows() as u64);
        ctx.statistics
            .add(&ctx.statistics.columns_read, morsel.num_columns() as u64);
        ctx.statistics
            .record_elapsed(&ctx.statistics.time_reading_ns, start);
        Ok(single_batch(morsel))
    }
}
