//! Per-function cache of the loaded sandbox base

use crate::ir::{Function, GlobalId, InstId, InstKind, Type, Value};
use crate::{Error, Result};

/// Lazily materialized `load i64, i64* @__sfi_memory_base` for one function.
///
/// The load is placed at the very front of the entry block, so it dominates
/// every instruction of the function.
#[derive(Debug, Clone)]
pub struct BaseCache {
    memory_base: GlobalId,
    loaded: Option<InstId>,
}

impl BaseCache {
    /// Empty cache for a function about to be rewritten
    pub fn new(memory_base: GlobalId) -> Self {
        Self {
            memory_base,
            loaded: None,
        }
    }

    /// Base value, if already materialized
    pub fn get(&self) -> Option<InstId> {
        self.loaded
    }

    /// Returns the cached base load, inserting it on first use
    pub fn get_or_create(&mut self, func: &mut Function) -> Result<InstId> {
        if let Some(id) = self.loaded {
            return Ok(id);
        }
        let entry = func
            .entry_block()
            .ok_or_else(|| Error::Ir(format!("@{} has no body to sandbox", func.name)))?;
        let id = func.insert_at_head(
            entry,
            InstKind::Load {
                ptr: Value::Global(self.memory_base),
            },
            Type::i64(),
        )?;
        tracing::trace!(function = %func.name, inst = id.0, "materialized sandbox base");
        self.loaded = Some(id);
        Ok(id)
    }
}
