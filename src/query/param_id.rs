use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_PARAM: AtomicU64 = AtomicU64::new(1);

/// Identity of one lambda parameter.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ParamId(u64);

impl ParamId {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        ParamId(NEXT_PARAM.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Debug for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}

impl fmt::Display for ParamId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "x{}", self.0)
    }
}
