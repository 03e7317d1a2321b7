//! Virtual-user local state
//!
//! Every virtual user runs as its own task with its own slot map, so values stored here are never
//! visible to another VU. Typical use is caching something expensive that should only happen
//! once per VU, such as logging in.
//!
//! ```no_run
//! use surge::prelude::*;
//!
//! #[derive(Clone)]
//! struct Session(String);
//!
//! #[scenario]
//! async fn my_scenario() {
//!     let session = match vu::get::<Session>() {
//!         Some(session) => session,
//!         None => {
//!             let session = Session("fresh".to_string());
//!             vu::set(session.clone());
//!             session
//!         }
//!     };
//! }
//! ```
use std::any::{Any, TypeId};
use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::future::Future;
use tracing::debug;

tokio::task_local! {
    pub(crate) static VU: VirtualUser;
}

pub(crate) struct VirtualUser {
    id: u32,
    iteration: Cell<u64>,
    locals: RefCell<HashMap<TypeId, Box<dyn Any + Send>>>,
}

impl VirtualUser {
    pub(crate) fn new(id: u32) -> Self {
        Self {
            id,
            iteration: Cell::new(0),
            locals: RefCell::new(HashMap::new()),
        }
    }

    pub(crate) fn advance(&self) {
        self.iteration.set(self.iteration.get() + 1);
    }
}

/// Run `fut` as virtual user `id` outside of a Scenario. Mostly useful for testing scenario code.
pub async fn scope<F: Future>(id: u32, fut: F) -> F::Output {
    VU.scope(VirtualUser::new(id), fut).await
}

/// 1-based id of the current VU.
pub fn id() -> Option<u32> {
    VU.try_with(|vu| vu.id).ok()
}

/// 0-based index of the iteration the current VU is executing.
pub fn iteration() -> Option<u64> {
    VU.try_with(|vu| vu.iteration.get()).ok()
}

/// Clone of the value of type `S` stored for the current VU, if any.
pub fn get<S: Clone + Send + 'static>() -> Option<S> {
    VU.try_with(|vu| {
        vu.locals
            .borrow()
            .get(&TypeId::of::<S>())
            .and_then(|value| value.downcast_ref::<S>())
            .cloned()
    })
    .ok()
    .flatten()
}

/// Store `value` for the current VU, replacing any earlier value of the same type. Returns
/// `false` (dropping the value) when called outside a VU.
pub fn set<S: Send + 'static>(value: S) -> bool {
    let stored = VU
        .try_with(|vu| {
            vu.locals
                .borrow_mut()
                .insert(TypeId::of::<S>(), Box::new(value));
        })
        .is_ok();

    if !stored {
        debug!("Not running inside a VU; value dropped.");
    }
    stored
}

pub(crate) fn advance() {
    let _ = VU.try_with(VirtualUser::advance);
}
