use std::fmt;
use std::future::Future;
use std::sync::Arc;

use futures::future::{BoxFuture, FutureExt};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::debug;

type MutationFn<I, O, E> = Arc<dyn Fn(I) -> BoxFuture<'static, Result<O, E>> + Send + Sync>;
type SuccessCallback<O> = Arc<dyn Fn(&O) + Send + Sync>;

/// Mutation lifecycle state.
pub enum MutationState<O, E> {
    Idle,
    Pending,
    Success(O),
    Error(Arc<E>),
}

impl<O, E> MutationState<O, E> {
    pub fn is_idle(&self) -> bool {
        matches!(self, MutationState::Idle)
    }

    pub fn is_pending(&self) -> bool {
        matches!(self, MutationState::Pending)
    }

    pub fn is_success(&self) -> bool {
        matches!(self, MutationState::Success(_))
    }

    pub fn is_error(&self) -> bool {
        matches!(self, MutationState::Error(_))
    }

    pub fn data(&self) -> Option<&O> {
        match self {
            MutationState::Success(data) => Some(data),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&Arc<E>> {
        match self {
            MutationState::Error(error) => Some(error),
            _ => None,
        }
    }
}

impl<O: Clone, E> Clone for MutationState<O, E> {
    fn clone(&self) -> Self {
        match self {
            MutationState::Idle => MutationState::Idle,
            MutationState::Pending => MutationState::Pending,
            MutationState::Success(data) => MutationState::Success(data.clone()),
            MutationState::Error(error) => MutationState::Error(Arc::clone(error)),
        }
    }
}

impl<O: fmt::Debug, E: fmt::Debug> fmt::Debug for MutationState<O, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MutationState::Idle => write!(f, "Idle"),
            MutationState::Pending => write!(f, "Pending"),
            MutationState::Success(data) => f.debug_tuple("Success").field(data).finish(),
            MutationState::Error(error) => f.debug_tuple("Error").field(error).finish(),
        }
    }
}

/// A remote write with observable state and an optional success hook.
///
/// The hook runs only after the write succeeds, before the state flips to
/// `Success`. A failed write leaves every cache entry untouched.
pub struct Mutation<I, O, E> {
    mutation_fn: MutationFn<I, O, E>,
    on_success: Option<SuccessCallback<O>>,
    state: Arc<watch::Sender<MutationState<O, E>>>,
}

impl<I, O, E> Clone for Mutation<I, O, E> {
    fn clone(&self) -> Self {
        Self {
            mutation_fn: Arc::clone(&self.mutation_fn),
            on_success: self.on_success.clone(),
            state: Arc::clone(&self.state),
        }
    }
}

impl<I, O, E> Mutation<I, O, E>
where
    I: Send + 'static,
    O: Clone + Send + Sync + 'static,
    E: Send + Sync + 'static,
{
    pub fn new<F, Fut>(mutation_fn: F) -> Self
    where
        F: Fn(I) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O, E>> + Send + 'static,
    {
        let (state, _) = watch::channel(MutationState::Idle);
        Self {
            mutation_fn: Arc::new(move |input| mutation_fn(input).boxed()),
            on_success: None,
            state: Arc::new(state),
        }
    }

    #[must_use]
    pub fn on_success(mut self, callback: impl Fn(&O) + Send + Sync + 'static) -> Self {
        self.on_success = Some(Arc::new(callback));
        self
    }

    pub fn state(&self) -> MutationState<O, E> {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<MutationState<O, E>> {
        self.state.subscribe()
    }

    pub fn reset(&self) {
        self.state.send_replace(MutationState::Idle);
    }

    /// Run the mutation and wait for its outcome.
    pub async fn mutate_async(&self, input: I) -> Result<O, Arc<E>> {
        self.state.send_replace(MutationState::Pending);
        self.run(input).await
    }

    /// Fire-and-forget; observe the outcome through `state` or `subscribe`.
    ///
    /// The state is `Pending` by the time this returns.
    pub fn mutate(&self, input: I) -> JoinHandle<()> {
        self.state.send_replace(MutationState::Pending);
        let mutation = self.clone();
        tokio::spawn(async move {
            let _ = mutation.run(input).await;
        })
    }

    async fn run(&self, input: I) -> Result<O, Arc<E>> {
        match (self.mutation_fn)(input).await {
            Ok(output) => {
                if let Some(callback) = &self.on_success {
                    callback(&output);
                }
                self.state.send_replace(MutationState::Success(output.clone()));
                debug!("Mutation succeeded");
                Ok(output)
            }
            Err(error) => {
                let error = Arc::new(error);
                self.state.send_replace(MutationState::Error(Arc::clone(&error)));
                debug!("Mutation failed");
                Err(error)
            }
        }
    }
}
