use crate::llm::error::DispatchError;
use tokio::sync::Mutex;

pub const DEFAULT_POOL_SIZE: usize = 3;

type Factory<C> = Box<dyn Fn() -> anyhow::Result<C> + Send + Sync>;

/// Fixed-size pool of model handles.
///
/// Starts empty and is filled to capacity on the first acquisition. After
/// that the pool never grows again: callers must hand every acquired handle
/// back through [`ModelPool::release`], on success and failure alike.
pub struct ModelPool<C> {
    capacity: usize,
    factory: Factory<C>,
    state: Mutex<PoolState<C>>,
}

struct PoolState<C> {
    handles: Vec<C>,
    populated: bool,
}

impl<C: Send> ModelPool<C> {
    pub fn new<F>(capacity: usize, factory: F) -> Self
    where
        F: Fn() -> anyhow::Result<C> + Send + Sync + 'static,
    {
        Self {
            capacity: capacity.max(1),
            factory: Box::new(factory),
            state: Mutex::new(PoolState {
                handles: Vec::with_capacity(capacity.max(1)),
                populated: false,
            }),
        }
    }

    /// Pool capacity from `MODEL_POOL_SIZE`, defaulting to 3.
    pub fn capacity_from_env() -> usize {
        std::env::var("MODEL_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .filter(|n| *n >= 1)
            .unwrap_or(DEFAULT_POOL_SIZE)
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub async fn acquire(&self) -> Result<C, DispatchError> {
        let mut state = self.state.lock().await;
        if !state.populated {
            tracing::info!(capacity = self.capacity, "creating model handles");
            let mut fresh = Vec::with_capacity(self.capacity);
            for _ in 0..self.capacity {
                fresh.push((self.factory)().map_err(DispatchError::PoolInit)?);
            }
            state.handles.extend(fresh);
            state.populated = true;
        }

        state.handles.pop().ok_or(DispatchError::PoolExhausted)
    }

    pub async fn release(&self, handle: C) {
        let mut state = self.state.lock().await;
        state.handles.push(handle);
    }

    pub async fn available(&self) -> usize {
        self.state.lock().await.handles.len()
    }
}
