//! Stage traits for the three pipeline roles.
//!
//! A stage is built by a factory, prepared by `init()`, launched by
//! `start()` and terminated by `stop()`. `start()` spawns the stage's own
//! tasks and returns; the run loop never executes on the caller's task.
//!
//! - [`Source`]: produces records into one output edge
//! - [`Transform`]: moves records from an input edge to an output edge
//! - [`Sink`]: consumes records from one input edge
//!
//! [`Node`] is the closed sum of the three roles that the pipeline
//! assembler stores and drives.

use crate::error::{Error, Result};
use crate::link::{EdgeReceiver, EdgeSender};
use async_trait::async_trait;

/// Role of a stage within the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Role {
    /// Produces records; has only an output edge.
    Source,
    /// Consumes and produces records; has both edges.
    Transform,
    /// Consumes records; has only an input edge.
    Sink,
}

impl Role {
    /// All roles, in chain order.
    pub const ALL: [Role; 3] = [Role::Source, Role::Transform, Role::Sink];

    /// Lower-case name of the role.
    pub const fn as_str(self) -> &'static str {
        match self {
            Role::Source => "source",
            Role::Transform => "transform",
            Role::Sink => "sink",
        }
    }

    /// Whether a stage in this role reads from an input edge.
    pub const fn has_input(self) -> bool {
        matches!(self, Role::Transform | Role::Sink)
    }

    /// Whether a stage in this role writes to an output edge.
    pub const fn has_output(self) -> bool {
        matches!(self, Role::Source | Role::Transform)
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A stage that produces records.
///
/// # Example
///
/// ```rust,ignore
/// use forwarder::element::{Source, TaskGroup};
/// use forwarder::link::EdgeSender;
///
/// struct Ticker { tasks: TaskGroup }
///
/// #[async_trait::async_trait]
/// impl Source for Ticker {
///     fn name(&self) -> &str { "ticker" }
///
///     async fn start(&mut self, output: EdgeSender) -> Result<()> {
///         let cancel = self.tasks.token();
///         self.tasks.spawn(async move {
///             // produce until cancelled
///         })
///     }
///
///     async fn stop(&mut self) -> Result<()> {
///         self.tasks.shutdown().await
///     }
/// }
/// ```
#[async_trait]
pub trait Source: Send {
    /// Plugin name of this stage.
    fn name(&self) -> &str;

    /// Validate settings and prepare resources.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Launch the produce loop and return.
    async fn start(&mut self, output: EdgeSender) -> Result<()>;

    /// Request termination and wait for every spawned task to exit.
    async fn stop(&mut self) -> Result<()>;
}

/// A stage that moves records from its input to its output.
///
/// Implementations must keep each record's acknowledge capability: a
/// record passed on carries it, a record dropped must be acknowledged or
/// released on purpose.
#[async_trait]
pub trait Transform: Send {
    /// Plugin name of this stage.
    fn name(&self) -> &str;

    /// Validate settings and prepare resources.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Launch the transform loop and return.
    async fn start(&mut self, input: EdgeReceiver, output: EdgeSender) -> Result<()>;

    /// Request termination and wait for every spawned task to exit.
    async fn stop(&mut self) -> Result<()>;
}

/// A stage that consumes records.
#[async_trait]
pub trait Sink: Send {
    /// Plugin name of this stage.
    fn name(&self) -> &str;

    /// Validate settings and prepare resources.
    async fn init(&mut self) -> Result<()> {
        Ok(())
    }

    /// Launch the consume loop and return.
    async fn start(&mut self, input: EdgeReceiver) -> Result<()>;

    /// Request termination and wait for every spawned task to exit.
    async fn stop(&mut self) -> Result<()>;
}

/// A stage of any role.
pub enum Node {
    /// A source stage.
    Source(Box<dyn Source>),
    /// A transform stage.
    Transform(Box<dyn Transform>),
    /// A sink stage.
    Sink(Box<dyn Sink>),
}

impl Node {
    /// Role of the wrapped stage.
    pub fn role(&self) -> Role {
        match self {
            Node::Source(_) => Role::Source,
            Node::Transform(_) => Role::Transform,
            Node::Sink(_) => Role::Sink,
        }
    }

    /// Plugin name of the wrapped stage.
    pub fn name(&self) -> &str {
        match self {
            Node::Source(s) => s.name(),
            Node::Transform(t) => t.name(),
            Node::Sink(s) => s.name(),
        }
    }

    /// Initialize the wrapped stage.
    pub async fn init(&mut self) -> Result<()> {
        match self {
            Node::Source(s) => s.init().await,
            Node::Transform(t) => t.init().await,
            Node::Sink(s) => s.init().await,
        }
    }

    /// Start the wrapped stage with the edges its role requires.
    ///
    /// Supplying an edge the role does not use, or omitting one it needs,
    /// is a topology error.
    pub async fn start(
        &mut self,
        input: Option<EdgeReceiver>,
        output: Option<EdgeSender>,
    ) -> Result<()> {
        let role = self.role();
        let name = self.name().to_string();
        match (self, input, output) {
            (Node::Source(s), None, Some(out)) => s.start(out).await,
            (Node::Transform(t), Some(inp), Some(out)) => t.start(inp, out).await,
            (Node::Sink(s), Some(inp), None) => s.start(inp).await,
            (_, input, output) => Err(Error::Topology(format!(
                "{role} '{name}' started with input={} output={}",
                input.is_some(),
                output.is_some()
            ))),
        }
    }

    /// Stop the wrapped stage.
    pub async fn stop(&mut self) -> Result<()> {
        match self {
            Node::Source(s) => s.stop().await,
            Node::Transform(t) => t.stop().await,
            Node::Sink(s) => s.stop().await,
        }
    }
}

impl From<Box<dyn Source>> for Node {
    fn from(stage: Box<dyn Source>) -> Self {
        Node::Source(stage)
    }
}

impl From<Box<dyn Transform>> for Node {
    fn from(stage: Box<dyn Transform>) -> Self {
        Node::Transform(stage)
    }
}

impl From<Box<dyn Sink>> for Node {
    fn from(stage: Box<dyn Sink>) -> Self {
        Node::Sink(stage)
    }
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("role", &self.role())
            .field("name", &self.name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::Edge;

    struct Idle(&'static str);

    #[async_trait]
    impl Source for Idle {
        fn name(&self) -> &str {
            self.0
        }
        async fn start(&mut self, _output: EdgeSender) -> Result<()> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[async_trait]
    impl Sink for Idle {
        fn name(&self) -> &str {
            self.0
        }
        async fn start(&mut self, _input: EdgeReceiver) -> Result<()> {
            Ok(())
        }
        async fn stop(&mut self) -> Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_role_edges() {
        assert!(!Role::Source.has_input());
        assert!(Role::Source.has_output());
        assert!(Role::Transform.has_input() && Role::Transform.has_output());
        assert!(Role::Sink.has_input());
        assert!(!Role::Sink.has_output());
        assert_eq!(Role::Transform.to_string(), "transform");
    }

    #[tokio::test]
    async fn test_node_dispatch() {
        let mut node = Node::from(Box::new(Idle("src")) as Box<dyn Source>);
        assert_eq!(node.role(), Role::Source);
        assert_eq!(node.name(), "src");

        node.init().await.unwrap();
        let edge = Edge::bounded("src", 1);
        node.start(None, Some(edge.sender())).await.unwrap();
        node.stop().await.unwrap();
    }

    #[tokio::test]
    async fn test_node_start_with_wrong_edges() {
        let edge = Edge::bounded("x", 1);
        let mut node = Node::from(Box::new(Idle("out")) as Box<dyn Sink>);

        let err = node
            .start(Some(edge.receiver()), Some(edge.sender()))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Topology(_)));
    }
}
