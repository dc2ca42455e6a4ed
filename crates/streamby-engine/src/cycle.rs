//! Update-cycle coordinator
//!
//! `StreamAggregation` owns the grouping state, one operator per sorted
//! aggregation and the result table. Each cycle runs every operator through
//! `reset_for_step`, chunked ingestion and `propagate_updates`, then commits
//! the staged result writes in one step. Any error moves the table into a
//! sticky failed state before anything is committed.

use crate::config::EngineConfig;
use crate::error::{EngineError, Result};
use crate::grouping::{gather, ChunkPlan, GroupingEngine};
use crate::result::{BatchMaterializer, ResultTable, StagedWrites};
use crate::table::{Schema, StreamBatch};
use parking_lot::RwLock;
use std::sync::Arc;
use streamby_aggregation::{
    AggregationDefinition, AggregationError, AggregationOperator, ChunkValue, SortMode,
    StreamSortedFirstLastOperator,
};
use streamby_core::{
    ColumnType, FromFieldValue, ParallelConfig, RowSet, RowSetBuilder, Update,
};
use tracing::{debug, error, info};

/// Lifecycle of an aggregation table
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TableStatus {
    /// Created, initial snapshot not yet taken
    Pending,
    /// Processing updates
    Live,
    /// A cycle failed; every later call is rejected
    Failed(String),
}

/// Receives the outcome of every cycle
pub trait TableListener: Send + Sync {
    fn on_update(&self, update: &Update, result: &ResultTable);

    fn on_failure(&self, reason: &str);
}

/// Operator monomorphized for the sort column's type
#[derive(Debug)]
enum TypedOperator {
    Float(StreamSortedFirstLastOperator<f64>),
    Integer(StreamSortedFirstLastOperator<i64>),
    UnsignedInteger(StreamSortedFirstLastOperator<u64>),
    String(StreamSortedFirstLastOperator<Option<String>>),
}

macro_rules! with_operator {
    ($typed:expr, $op:ident => $body:expr) => {
        match $typed {
            TypedOperator::Float($op) => $body,
            TypedOperator::Integer($op) => $body,
            TypedOperator::UnsignedInteger($op) => $body,
            TypedOperator::String($op) => $body,
        }
    };
}

impl TypedOperator {
    fn new(
        column_type: ColumnType,
        mode: SortMode,
        is_combo: bool,
        parallel: &ParallelConfig,
    ) -> Option<Self> {
        let operator = match column_type {
            ColumnType::Float => TypedOperator::Float(
                StreamSortedFirstLastOperator::new(mode, is_combo)
                    .with_parallelism(parallel.clone()),
            ),
            ColumnType::Integer => TypedOperator::Integer(
                StreamSortedFirstLastOperator::new(mode, is_combo)
                    .with_parallelism(parallel.clone()),
            ),
            ColumnType::UnsignedInteger => TypedOperator::UnsignedInteger(
                StreamSortedFirstLastOperator::new(mode, is_combo)
                    .with_parallelism(parallel.clone()),
            ),
            ColumnType::String => TypedOperator::String(
                StreamSortedFirstLastOperator::new(mode, is_combo)
                    .with_parallelism(parallel.clone()),
            ),
            ColumnType::Boolean => return None,
        };
        Some(operator)
    }
}

/// Feed one chunk to an operator, returning one modified flag per run
fn add_chunk<T: ChunkValue + FromFieldValue>(
    operator: &mut StreamSortedFirstLastOperator<T>,
    batch: &StreamBatch,
    plan: &ChunkPlan,
    sort_column: usize,
) -> Result<Vec<bool>> {
    let values = gather(batch, plan, sort_column, T::from_field)?;
    match plan.singleton() {
        Some(destination) => {
            let changed = operator.add_chunk_singleton(&values, &plan.row_keys, destination)?;
            Ok(vec![changed])
        }
        None => {
            let mut modified = vec![false; plan.runs.len()];
            operator.add_chunk_bucketed(
                &values,
                &plan.row_keys,
                &plan.destinations,
                &plan.runs,
                &mut modified,
            )?;
            Ok(modified)
        }
    }
}

/// An operator bound to its source and result columns
#[derive(Debug)]
struct BoundOperator {
    name: String,
    sort_column: usize,
    source_columns: Vec<usize>,
    first_column: usize,
    operator: TypedOperator,
}

impl BoundOperator {
    fn ensure_capacity(&mut self, size: usize) {
        with_operator!(&mut self.operator, op => op.ensure_capacity(size))
    }

    fn reset_for_step(&mut self, update: &Update) -> Result<()> {
        with_operator!(&mut self.operator, op => op.reset_for_step(update))?;
        Ok(())
    }

    fn add_chunk(&mut self, batch: &StreamBatch, plan: &ChunkPlan) -> Result<Vec<bool>> {
        let column = self.sort_column;
        with_operator!(&mut self.operator, op => add_chunk(op, batch, plan, column))
    }

    fn propagate_initial_state(
        &mut self,
        rows: &RowSet,
        batch: &StreamBatch,
        staged: &mut StagedWrites,
    ) -> Result<()> {
        let mut materializer = BatchMaterializer {
            batch,
            source_columns: &self.source_columns,
            first_column: self.first_column,
            staged,
        };
        with_operator!(&mut self.operator, op => op.propagate_initial_state(rows, &mut materializer))?;
        Ok(())
    }

    fn propagate_updates(
        &mut self,
        downstream: &Update,
        new_destinations: &RowSet,
        batch: &StreamBatch,
        staged: &mut StagedWrites,
    ) -> Result<()> {
        let mut materializer = BatchMaterializer {
            batch,
            source_columns: &self.source_columns,
            first_column: self.first_column,
            staged,
        };
        with_operator!(
            &mut self.operator,
            op => op.propagate_updates(downstream, new_destinations, &mut materializer)
        )?;
        Ok(())
    }
}

/// A grouped first-by / last-by aggregation over a stream table
pub struct StreamAggregation {
    definition: AggregationDefinition,
    config: EngineConfig,
    grouping: GroupingEngine,
    operators: Vec<BoundOperator>,
    result: Arc<ResultTable>,
    status: TableStatus,
    listeners: RwLock<Vec<Arc<dyn TableListener>>>,
    cycles: u64,
}

impl StreamAggregation {
    /// Bind a definition to a source schema. One aggregation runs standalone;
    /// several share the destination space as a combo.
    pub fn new(definition: AggregationDefinition, schema: &Schema, config: EngineConfig) -> Result<Self> {
        definition.validate()?;
        config.validate()?;

        let key_columns = definition
            .group_by
            .iter()
            .map(|c| schema.index_of(c))
            .collect::<Result<Vec<_>>>()?;

        let is_combo = definition.is_combo();
        let mut first_column = key_columns.len();
        let mut operators = Vec::with_capacity(definition.aggregations.len());
        for aggregation in &definition.aggregations {
            let sort_column = schema.index_of(&aggregation.sort_column)?;
            let column_type = schema
                .column_type(sort_column)
                .ok_or_else(|| EngineError::ColumnNotFound(aggregation.sort_column.clone()))?;
            let operator = TypedOperator::new(column_type, aggregation.mode, is_combo, &config.parallel)
                .ok_or_else(|| {
                    AggregationError::InvalidDefinition(format!(
                        "sort column '{}' has unsupported type {}",
                        aggregation.sort_column,
                        column_type.type_name()
                    ))
                })?;
            let source_columns = aggregation
                .output_columns
                .iter()
                .map(|c| schema.index_of(c))
                .collect::<Result<Vec<_>>>()?;

            operators.push(BoundOperator {
                name: aggregation.name.clone(),
                sort_column,
                first_column,
                operator,
                source_columns,
            });
            first_column += aggregation.output_columns.len();
        }

        info!(
            name = %definition.name,
            aggregations = operators.len(),
            combo = is_combo,
            "Created stream aggregation"
        );

        Ok(Self {
            result: Arc::new(ResultTable::new(definition.result_columns())),
            grouping: GroupingEngine::new(key_columns),
            definition,
            config,
            operators,
            status: TableStatus::Pending,
            listeners: RwLock::new(Vec::new()),
            cycles: 0,
        })
    }

    pub fn name(&self) -> &str {
        &self.definition.name
    }

    pub fn definition(&self) -> &AggregationDefinition {
        &self.definition
    }

    pub fn status(&self) -> &TableStatus {
        &self.status
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.status, TableStatus::Failed(_))
    }

    /// Shared handle to the result table
    pub fn result(&self) -> Arc<ResultTable> {
        Arc::clone(&self.result)
    }

    /// Number of groups seen so far
    pub fn group_count(&self) -> usize {
        self.grouping.size()
    }

    /// Completed update cycles, not counting the initial snapshot
    pub fn cycles(&self) -> u64 {
        self.cycles
    }

    /// Register a listener for cycle outcomes
    pub fn subscribe(&self, listener: Arc<dyn TableListener>) {
        self.listeners.write().push(listener);
    }

    /// Take the initial snapshot from the source's first batch
    pub fn initialize(&mut self, batch: &StreamBatch) -> Result<Update> {
        match &self.status {
            TableStatus::Pending => {}
            TableStatus::Live => return Err(EngineError::AlreadyInitialized),
            TableStatus::Failed(reason) => return Err(EngineError::TableFailed(reason.clone())),
        }
        let outcome = self.run_initial(batch);
        self.finish(outcome)
    }

    /// Run one update cycle. Returns the downstream update: new groups as
    /// `added`, existing groups whose result changed as `modified`.
    pub fn process(&mut self, update: &Update, batch: &StreamBatch) -> Result<Update> {
        match &self.status {
            TableStatus::Live => {}
            TableStatus::Pending => return Err(EngineError::NotInitialized),
            TableStatus::Failed(reason) => return Err(EngineError::TableFailed(reason.clone())),
        }
        let outcome = self.run_cycle(update, batch);
        self.finish(outcome)
    }

    fn run_initial(&mut self, batch: &StreamBatch) -> Result<Update> {
        let assignment = self.grouping.assign(batch)?;
        let size = self.grouping.size();
        for operator in &mut self.operators {
            operator.ensure_capacity(size);
        }
        for plan in self.grouping.partition(batch, &assignment, self.config.chunk_size) {
            for operator in &mut self.operators {
                operator.add_chunk(batch, &plan)?;
            }
        }

        let rows = assignment.new_destinations;
        let mut staged = self.stage_groups(&rows, size);
        for operator in &mut self.operators {
            operator.propagate_initial_state(&rows, batch, &mut staged)?;
        }

        self.result.commit(staged);
        self.status = TableStatus::Live;
        info!(name = %self.definition.name, groups = size, rows = batch.len(), "Initial snapshot");
        Ok(Update::from_added(rows))
    }

    fn run_cycle(&mut self, update: &Update, batch: &StreamBatch) -> Result<Update> {
        for operator in &mut self.operators {
            operator.reset_for_step(update)?;
        }
        if update.added.size() != batch.len() as u64 {
            return Err(AggregationError::ChunkMismatch(format!(
                "update adds {} rows but batch holds {}",
                update.added.size(),
                batch.len()
            ))
            .into());
        }

        let assignment = self.grouping.assign(batch)?;
        let size = self.grouping.size();
        for operator in &mut self.operators {
            operator.ensure_capacity(size);
        }

        let plans = self.grouping.partition(batch, &assignment, self.config.chunk_size);
        debug!(name = %self.definition.name, rows = batch.len(), chunks = plans.len(), "Cycle start");
        let mut changed = RowSetBuilder::new();
        for plan in &plans {
            for operator in &mut self.operators {
                let flags = operator.add_chunk(batch, plan)?;
                for (i, flag) in flags.into_iter().enumerate() {
                    if flag {
                        changed.add_key(plan.run_destination(i).into());
                    }
                }
            }
        }

        let added = assignment.new_destinations;
        let modified: RowSet = changed
            .build()
            .iter()
            .filter(|&d| !added.contains(d))
            .collect();
        let downstream = Update {
            added,
            modified,
            ..Default::default()
        };

        let mut staged = self.stage_groups(&downstream.added, size);
        for operator in &mut self.operators {
            operator.propagate_updates(&downstream, &downstream.added, batch, &mut staged)?;
        }

        self.result.commit(staged);
        self.cycles += 1;
        debug!(
            name = %self.definition.name,
            added = downstream.added.size(),
            modified = downstream.modified.size(),
            "Cycle finished"
        );
        Ok(downstream)
    }

    /// Stage the group key cells of new destinations
    fn stage_groups(&self, new_destinations: &RowSet, size: usize) -> StagedWrites {
        let mut staged = self.result.stage();
        staged.grow(size);
        for destination in new_destinations.destinations() {
            if let Some(values) = self.grouping.group_values(destination) {
                staged.set_row(destination, 0, values);
            }
        }
        staged
    }

    fn finish(&mut self, outcome: Result<Update>) -> Result<Update> {
        match outcome {
            Ok(update) => {
                for listener in self.listeners.read().iter() {
                    listener.on_update(&update, &self.result);
                }
                Ok(update)
            }
            Err(e) => {
                let reason = e.to_string();
                error!(name = %self.definition.name, %reason, "Stream aggregation failed");
                self.status = TableStatus::Failed(reason.clone());
                for listener in self.listeners.read().iter() {
                    listener.on_failure(&reason);
                }
                Err(e)
            }
        }
    }
}

impl std::fmt::Debug for StreamAggregation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StreamAggregation")
            .field("name", &self.definition.name)
            .field("status", &self.status)
            .field("operators", &self.operators.iter().map(|o| &o.name).collect::<Vec<_>>())
            .field("groups", &self.grouping.size())
            .field("cycles", &self.cycles)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::StreamTable;
    use streamby_core::FieldValue;

    fn schema() -> Schema {
        Schema::new()
            .column("sym", ColumnType::String)
            .column("ts", ColumnType::Integer)
            .column("price", ColumnType::Float)
            .column("halted", ColumnType::Boolean)
    }

    fn row(sym: &str, ts: i64, price: f64) -> Vec<FieldValue> {
        vec![sym.into(), ts.into(), price.into(), false.into()]
    }

    #[test]
    fn test_boolean_sort_column_rejected() {
        let def = AggregationDefinition::new("t").first_by("a", "halted", &["price"]);
        let err = StreamAggregation::new(def, &schema(), EngineConfig::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Aggregation(AggregationError::InvalidDefinition(_))
        ));
    }

    #[test]
    fn test_unknown_column_rejected() {
        let def = AggregationDefinition::new("t").first_by("a", "ts", &["volume"]);
        let err = StreamAggregation::new(def, &schema(), EngineConfig::default()).unwrap_err();
        assert!(matches!(err, EngineError::ColumnNotFound(c) if c == "volume"));
    }

    #[test]
    fn test_lifecycle_order() {
        let def = AggregationDefinition::new("t")
            .group_by(&["sym"])
            .first_by("open", "ts", &["price"]);
        let mut agg = StreamAggregation::new(def, &schema(), EngineConfig::default()).unwrap();
        let mut source = StreamTable::new(schema());
        let (update, batch) = source.append(vec![row("A", 1, 10.0)]).unwrap();

        assert!(matches!(
            agg.process(&update, &batch),
            Err(EngineError::NotInitialized)
        ));
        assert_eq!(agg.status(), &TableStatus::Pending);

        agg.initialize(&batch).unwrap();
        assert_eq!(agg.status(), &TableStatus::Live);
        assert!(matches!(
            agg.initialize(&batch),
            Err(EngineError::AlreadyInitialized)
        ));
    }

    #[test]
    fn test_result_layout() {
        let def = AggregationDefinition::new("bars")
            .group_by(&["sym"])
            .first_by("open", "ts", &["price", "ts"])
            .last_by("close", "ts", &["price"]);
        let mut agg = StreamAggregation::new(def, &schema(), EngineConfig::default()).unwrap();
        let mut source = StreamTable::new(schema());
        let (_, batch) = source
            .append(vec![row("A", 1, 10.0), row("A", 2, 11.0)])
            .unwrap();
        agg.initialize(&batch).unwrap();

        let result = agg.result();
        assert_eq!(result.columns(), &["sym", "open_price", "open_ts", "close_price"]);
        assert_eq!(
            result.row(0),
            Some(vec![
                FieldValue::from("A"),
                FieldValue::Float(10.0),
                FieldValue::Integer(1),
                FieldValue::Float(11.0),
            ])
        );
    }

    #[test]
    fn test_mismatched_batch_fails_table() {
        let def = AggregationDefinition::new("t").last_by("close", "ts", &["price"]);
        let mut agg = StreamAggregation::new(def, &schema(), EngineConfig::default()).unwrap();
        let mut source = StreamTable::new(schema());
        let (_, first) = source.append(vec![row("A", 1, 10.0)]).unwrap();
        agg.initialize(&first).unwrap();

        let (update, _) = source.append(vec![row("A", 2, 11.0)]).unwrap();
        let err = agg.process(&update, &StreamBatch::default()).unwrap_err();
        assert!(matches!(
            err,
            EngineError::Aggregation(AggregationError::ChunkMismatch(_))
        ));
        assert!(agg.is_failed());
    }
}
