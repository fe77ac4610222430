//! Shared application state and the global allocator.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

use std::sync::Arc;

use axum::extract::State;

use bmcgpu_core::TargetRegistry;

/// Registry owned by the composition root and handed to every handler.
pub(crate) type SharedRegistry<C> = Arc<TargetRegistry<C>>;

pub(crate) type AppState<C> = State<SharedRegistry<C>>;

/// Basic auth credentials (user, password) when enabled.
pub(crate) type Credentials = Arc<(String, String)>;
