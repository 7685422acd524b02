use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ALIAS: AtomicU64 = AtomicU64::new(1);

/// Identity token naming one row source (table or select) in the IR.
///
/// Two aliases are equal only if they came from the same call to
/// [`TableAlias::new`]; the number carries no meaning beyond identity and is
/// never printed in SQL (the formatter assigns `t0, t1, ...` on first use).
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TableAlias(u64);

impl TableAlias {
    #[allow(clippy::new_without_default)]
    pub fn new() -> Self {
        TableAlias(NEXT_ALIAS.fetch_add(1, Ordering::Relaxed))
    }

    pub fn id(&self) -> u64 {
        self.0
    }
}

impl fmt::Debug for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}

impl fmt::Display for TableAlias {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "A{}", self.0)
    }
}
