//! Linear chain assembly and lifecycle.

use crate::element::{Node, Role};
use crate::error::{Error, Result};
use crate::link::Edge;
use crate::memory::RecordPool;
use crate::observability::{record_edge_depth, record_pool_hit_ratio, trace_state_change};
use std::future::Future;
use std::sync::Arc;

/// Lifecycle state of one stage, tracked by the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum StageState {
    /// Built by its factory.
    #[default]
    Constructed,
    /// `init()` succeeded.
    Initialized,
    /// `start()` succeeded; the stage's tasks are live.
    Running,
    /// `stop()` has returned.
    Stopped,
}

impl StageState {
    /// Lower-case name of the state.
    pub const fn as_str(self) -> &'static str {
        match self {
            StageState::Constructed => "constructed",
            StageState::Initialized => "initialized",
            StageState::Running => "running",
            StageState::Stopped => "stopped",
        }
    }
}

impl std::fmt::Display for StageState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

struct Stage {
    node: Node,
    state: StageState,
}

impl Stage {
    fn set_state(&mut self, state: StageState) {
        trace_state_change(self.node.name(), self.state.as_str(), state.as_str());
        self.state = state;
    }

    fn invalid(&self, operation: &'static str) -> Error {
        Error::InvalidState {
            stage: self.node.name().to_string(),
            operation,
            state: self.state.as_str(),
        }
    }
}

/// A source, a transform and a sink joined by two edges.
///
/// The first edge is named after the source and carries records to the
/// transform; the second is named after the transform and carries records
/// to the sink. The pipeline owns both edges for its whole lifetime.
///
/// Lifecycle operations walk the chain head to tail:
///
/// - [`init`](Self::init) stops at the first failure and rolls nothing back
/// - [`start`](Self::start) stops at the first failure; upstream stages that
///   already started keep running until [`stop`](Self::stop)
/// - [`stop`](Self::stop) stops every running stage and reports the first
///   error after trying all of them
///
/// # Example
///
/// ```rust,ignore
/// use forwarder::pipeline::Pipeline;
///
/// let mut pipeline = Pipeline::assemble("forwarder", vec![sink, source, parser], 10, pool)?;
/// pipeline.init().await?;
/// pipeline.start().await?;
/// // ...
/// pipeline.stop().await?;
/// ```
pub struct Pipeline {
    name: String,
    stages: Vec<Stage>,
    edges: Vec<Edge>,
    pool: Arc<RecordPool>,
}

impl Pipeline {
    /// Arrange `nodes` into a source → transform → sink chain.
    ///
    /// The nodes may arrive in any order, but there must be exactly one of
    /// each role; anything else is a topology error.
    pub fn assemble(
        name: impl Into<String>,
        nodes: Vec<Node>,
        edge_capacity: usize,
        pool: Arc<RecordPool>,
    ) -> Result<Self> {
        if edge_capacity == 0 {
            return Err(Error::Configuration("edge capacity must be at least 1".into()));
        }

        let counts = Role::ALL.map(|role| nodes.iter().filter(|n| n.role() == role).count());
        if counts != [1, 1, 1] {
            return Err(Error::Topology(format!(
                "pipeline needs exactly one source, transform and sink, got {} source(s), \
                 {} transform(s), {} sink(s)",
                counts[0], counts[1], counts[2]
            )));
        }

        let mut nodes = nodes;
        nodes.sort_by_key(|n| Role::ALL.iter().position(|r| *r == n.role()));

        let edges = vec![
            Edge::bounded(nodes[0].name(), edge_capacity),
            Edge::bounded(nodes[1].name(), edge_capacity),
        ];
        let stages = nodes
            .into_iter()
            .map(|node| Stage {
                node,
                state: StageState::Constructed,
            })
            .collect();

        let pipeline = Self {
            name: name.into(),
            stages,
            edges,
            pool,
        };
        tracing::debug!(pipeline = %pipeline.name, chain = ?pipeline.stage_names(), "assembled pipeline");
        Ok(pipeline)
    }

    /// Initialize every stage, head to tail.
    pub async fn init(&mut self) -> Result<()> {
        for stage in &mut self.stages {
            if stage.state != StageState::Constructed {
                return Err(stage.invalid("init"));
            }
            stage.node.init().await.inspect_err(|e| {
                tracing::error!(pipeline = %self.name, stage = stage.node.name(), error = %e, "init failed");
            })?;
            stage.set_state(StageState::Initialized);
        }
        Ok(())
    }

    /// Start every stage, head to tail.
    ///
    /// Each stage's `start()` returns once its tasks are spawned.
    pub async fn start(&mut self) -> Result<()> {
        let last = self.stages.len() - 1;
        for (idx, stage) in self.stages.iter_mut().enumerate() {
            if stage.state != StageState::Initialized {
                return Err(stage.invalid("start"));
            }
            let input = (idx > 0).then(|| self.edges[idx - 1].receiver());
            let output = (idx < last).then(|| self.edges[idx].sender());

            stage.node.start(input, output).await.inspect_err(|e| {
                tracing::error!(pipeline = %self.name, stage = stage.node.name(), error = %e, "start failed");
            })?;
            stage.set_state(StageState::Running);
        }
        tracing::info!(pipeline = %self.name, "pipeline running");
        Ok(())
    }

    /// Stop every running stage, head to tail.
    ///
    /// Stages that never started are left alone, so this is safe to call
    /// after a partial start and harmless to call twice.
    pub async fn stop(&mut self) -> Result<()> {
        let mut first_error = None;
        for stage in &mut self.stages {
            if stage.state != StageState::Running {
                continue;
            }
            if let Err(e) = stage.node.stop().await {
                tracing::warn!(pipeline = %self.name, stage = stage.node.name(), error = %e, "stop failed");
                first_error.get_or_insert(e);
            }
            stage.set_state(StageState::Stopped);
        }
        tracing::info!(pipeline = %self.name, "pipeline stopped");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    /// Initialize, start, wait for `shutdown`, then stop.
    ///
    /// If starting fails, the stages that did start are stopped before the
    /// start error is returned.
    pub async fn run_until<F>(&mut self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        self.init().await?;
        if let Err(e) = self.start().await {
            if let Err(stop_err) = self.stop().await {
                tracing::warn!(pipeline = %self.name, error = %stop_err, "stop after failed start");
            }
            return Err(e);
        }
        shutdown.await;
        self.stop().await
    }

    /// Get the pipeline name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The shared record pool.
    pub fn pool(&self) -> &Arc<RecordPool> {
        &self.pool
    }

    /// The two edges, upstream first.
    pub fn edges(&self) -> &[Edge] {
        &self.edges
    }

    /// Stage names in chain order.
    pub fn stage_names(&self) -> Vec<&str> {
        self.stages.iter().map(|s| s.node.name()).collect()
    }

    /// Current state of the stage in `role`.
    pub fn state(&self, role: Role) -> StageState {
        self.stages
            .iter()
            .find(|s| s.node.role() == role)
            .map(|s| s.state)
            .unwrap_or_default()
    }

    /// Number of records waiting in each edge, upstream first.
    pub fn edge_depths(&self) -> Vec<(&str, usize)> {
        self.edges.iter().map(|e| (e.name(), e.len())).collect()
    }

    /// Publish edge depths and the pool hit ratio as gauges.
    pub fn report_metrics(&self) {
        for edge in &self.edges {
            record_edge_depth(edge.name(), edge.len());
        }
        record_pool_hit_ratio(self.pool.hit_ratio());
    }
}

impl std::fmt::Debug for Pipeline {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Pipeline")
            .field("name", &self.name)
            .field(
                "stages",
                &self
                    .stages
                    .iter()
                    .map(|s| (s.node.name(), s.state))
                    .collect::<Vec<_>>(),
            )
            .field("edges", &self.edges)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::{Sink, Source, Transform};
    use crate::link::{EdgeReceiver, EdgeSender};
    use async_trait::async_trait;
    use std::sync::Mutex;

    type Log = Arc<Mutex<Vec<String>>>;

    /// Stage that records lifecycle calls and can be told to fail.
    struct Probe {
        name: &'static str,
        log: Log,
        fail_init: bool,
        fail_start: bool,
        fail_stop: bool,
    }

    impl Probe {
        fn new(name: &'static str, log: &Log) -> Self {
            Self {
                name,
                log: log.clone(),
                fail_init: false,
                fail_start: false,
                fail_stop: false,
            }
        }

        fn note(&self, op: &str) {
            self.log.lock().unwrap().push(format!("{op}:{}", self.name));
        }

        fn outcome(&self, op: &str, fail: bool) -> Result<()> {
            self.note(op);
            if fail {
                Err(Error::Resource(format!("{} {op} failed", self.name)))
            } else {
                Ok(())
            }
        }
    }

    #[async_trait]
    impl Source for Probe {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&mut self) -> Result<()> {
            self.outcome("init", self.fail_init)
        }
        async fn start(&mut self, _output: EdgeSender) -> Result<()> {
            self.outcome("start", self.fail_start)
        }
        async fn stop(&mut self) -> Result<()> {
            self.outcome("stop", self.fail_stop)
        }
    }

    #[async_trait]
    impl Transform for Probe {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&mut self) -> Result<()> {
            self.outcome("init", self.fail_init)
        }
        async fn start(&mut self, _input: EdgeReceiver, _output: EdgeSender) -> Result<()> {
            self.outcome("start", self.fail_start)
        }
        async fn stop(&mut self) -> Result<()> {
            self.outcome("stop", self.fail_stop)
        }
    }

    #[async_trait]
    impl Sink for Probe {
        fn name(&self) -> &str {
            self.name
        }
        async fn init(&mut self) -> Result<()> {
            self.outcome("init", self.fail_init)
        }
        async fn start(&mut self, _input: EdgeReceiver) -> Result<()> {
            self.outcome("start", self.fail_start)
        }
        async fn stop(&mut self) -> Result<()> {
            self.outcome("stop", self.fail_stop)
        }
    }

    fn source(p: Probe) -> Node {
        Node::Source(Box::new(p))
    }
    fn transform(p: Probe) -> Node {
        Node::Transform(Box::new(p))
    }
    fn sink(p: Probe) -> Node {
        Node::Sink(Box::new(p))
    }

    fn chain(log: &Log) -> Vec<Node> {
        vec![
            sink(Probe::new("out", log)),
            source(Probe::new("in", log)),
            transform(Probe::new("parse", log)),
        ]
    }

    fn pool() -> Arc<RecordPool> {
        Arc::new(RecordPool::new())
    }

    fn calls(log: &Log) -> Vec<String> {
        log.lock().unwrap().clone()
    }

    #[test]
    fn test_assemble_orders_chain_and_names_edges() {
        let log = Log::default();
        let pipeline = Pipeline::assemble("p", chain(&log), 10, pool()).unwrap();

        assert_eq!(pipeline.stage_names(), vec!["in", "parse", "out"]);
        let edges: Vec<_> = pipeline.edges().iter().map(|e| (e.name(), e.capacity())).collect();
        assert_eq!(edges, vec![("in", 10), ("parse", 10)]);
        assert_eq!(pipeline.state(Role::Sink), StageState::Constructed);
    }

    #[test]
    fn test_topology_error_on_extra_source() {
        let log = Log::default();
        let mut nodes = chain(&log);
        nodes.push(source(Probe::new("in2", &log)));

        let err = Pipeline::assemble("p", nodes, 10, pool()).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }

    #[test]
    fn test_topology_error_on_missing_transform() {
        let log = Log::default();
        let nodes = vec![source(Probe::new("in", &log)), sink(Probe::new("out", &log))];

        let err = Pipeline::assemble("p", nodes, 10, pool()).unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
        assert!(calls(&log).is_empty());
    }

    #[tokio::test]
    async fn test_lifecycle_order() {
        let log = Log::default();
        let mut pipeline = Pipeline::assemble("p", chain(&log), 10, pool()).unwrap();

        pipeline.init().await.unwrap();
        pipeline.start().await.unwrap();
        pipeline.stop().await.unwrap();

        assert_eq!(
            calls(&log),
            vec![
                "init:in", "init:parse", "init:out", "start:in", "start:parse", "start:out",
                "stop:in", "stop:parse", "stop:out",
            ]
        );
        assert_eq!(pipeline.state(Role::Transform), StageState::Stopped);
    }

    #[tokio::test]
    async fn test_init_stops_at_first_failure() {
        let log = Log::default();
        let mut failing = Probe::new("parse", &log);
        failing.fail_init = true;
        let nodes = vec![
            source(Probe::new("in", &log)),
            transform(failing),
            sink(Probe::new("out", &log)),
        ];
        let mut pipeline = Pipeline::assemble("p", nodes, 10, pool()).unwrap();

        assert!(pipeline.init().await.is_err());
        assert_eq!(calls(&log), vec!["init:in", "init:parse"]);
        assert_eq!(pipeline.state(Role::Source), StageState::Initialized);
        assert_eq!(pipeline.state(Role::Sink), StageState::Constructed);
    }

    #[tokio::test]
    async fn test_start_failure_leaves_upstream_running() {
        let log = Log::default();
        let mut failing = Probe::new("out", &log);
        failing.fail_start = true;
        let nodes = vec![
            source(Probe::new("in", &log)),
            transform(Probe::new("parse", &log)),
            sink(failing),
        ];
        let mut pipeline = Pipeline::assemble("p", nodes, 10, pool()).unwrap();

        pipeline.init().await.unwrap();
        assert!(pipeline.start().await.is_err());
        assert_eq!(pipeline.state(Role::Source), StageState::Running);
        assert_eq!(pipeline.state(Role::Transform), StageState::Running);
        assert_eq!(pipeline.state(Role::Sink), StageState::Initialized);

        log.lock().unwrap().clear();
        pipeline.stop().await.unwrap();
        assert_eq!(calls(&log), vec!["stop:in", "stop:parse"]);
    }

    #[tokio::test]
    async fn test_stop_reports_first_error_after_all_stages() {
        let log = Log::default();
        let mut bad_source = Probe::new("in", &log);
        bad_source.fail_stop = true;
        let mut bad_sink = Probe::new("out", &log);
        bad_sink.fail_stop = true;
        let nodes = vec![
            source(bad_source),
            transform(Probe::new("parse", &log)),
            sink(bad_sink),
        ];
        let mut pipeline = Pipeline::assemble("p", nodes, 10, pool()).unwrap();
        pipeline.init().await.unwrap();
        pipeline.start().await.unwrap();
        log.lock().unwrap().clear();

        let err = pipeline.stop().await.unwrap_err();
        assert!(err.to_string().contains("in stop failed"));
        assert_eq!(calls(&log), vec!["stop:in", "stop:parse", "stop:out"]);

        // Nothing is running any more.
        pipeline.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_wrong_state_is_rejected() {
        let log = Log::default();
        let mut pipeline = Pipeline::assemble("p", chain(&log), 10, pool()).unwrap();

        let err = pipeline.start().await.unwrap_err();
        assert!(matches!(
            err,
            Error::InvalidState { operation: "start", state: "constructed", .. }
        ));

        pipeline.init().await.unwrap();
        let err = pipeline.init().await.unwrap_err();
        assert!(matches!(err, Error::InvalidState { operation: "init", .. }));
    }

    #[tokio::test]
    async fn test_run_until() {
        let log = Log::default();
        let mut pipeline = Pipeline::assemble("p", chain(&log), 10, pool()).unwrap();

        pipeline.run_until(async {}).await.unwrap();
        assert_eq!(calls(&log).len(), 9);
        assert_eq!(pipeline.state(Role::Source), StageState::Stopped);
    }

    #[test]
    fn test_edge_depths() {
        let log = Log::default();
        let pipeline = Pipeline::assemble("p", chain(&log), 4, pool()).unwrap();

        assert_eq!(pipeline.edge_depths(), vec![("in", 0), ("parse", 0)]);
        pipeline.report_metrics();
    }
}
