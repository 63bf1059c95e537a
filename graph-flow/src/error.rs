use thiserror::Error;

/// Boxed error raised by a task, kept intact so callers can downcast it.
pub type TaskError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum GraphError {
    #[error("Task execution failed: {0}")]
    TaskExecutionFailed(String),

    #[error("Task '{task_id}' failed: {source}")]
    TaskFailed {
        task_id: String,
        #[source]
        source: TaskError,
    },

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("No route out of task '{0}'")]
    NoRoute(String),

    #[error("Step limit of {0} exceeded, the graph probably contains a cycle")]
    StepLimitExceeded(usize),

    #[error("Context error: {0}")]
    ContextError(String),
}

impl GraphError {
    /// Wrap a typed task error, keeping it reachable through `downcast_source`.
    pub fn task_failed(
        task_id: impl Into<String>,
        source: impl std::error::Error + Send + Sync + 'static,
    ) -> Self {
        GraphError::TaskFailed {
            task_id: task_id.into(),
            source: Box::new(source),
        }
    }

    /// Returns the typed error raised by a task, if it is of type `E`.
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            GraphError::TaskFailed { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, GraphError>;
