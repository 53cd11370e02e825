//! Functions, basic blocks and the instruction arena

use super::instruction::{DebugLoc, InstData, InstKind};
use super::module::SymbolTable;
use super::types::Type;
use super::value::{BlockId, InstId, Value};
use crate::{Error, Result};

/// Basic block: an ordered list of instructions
#[derive(Debug, Clone, PartialEq)]
pub struct Block {
    /// Label used when printing
    pub name: String,
    insts: Vec<InstId>,
}

impl Block {
    /// Instructions in program order
    pub fn insts(&self) -> &[InstId] {
        &self.insts
    }
}

/// Function definition or declaration.
///
/// Instructions live in an arena indexed by [`InstId`]; blocks hold the
/// program order. Erased instructions leave a hole so ids stay stable.
/// Every mutation goes through this type, which keeps a per-instruction
/// count of live operand slots reading each result.
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    /// Symbol name
    pub name: String,
    /// Parameter types
    pub params: Vec<Type>,
    /// Return type
    pub ret: Type,
    blocks: Vec<Block>,
    insts: Vec<Option<InstData>>,
    uses: Vec<u32>,
}

impl Function {
    /// Creates a function without a body (a declaration)
    pub fn new(name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self {
            name: name.to_string(),
            params,
            ret,
            blocks: Vec::new(),
            insts: Vec::new(),
            uses: Vec::new(),
        }
    }

    /// Signature as a function type
    pub fn signature(&self) -> Type {
        Type::Func {
            ret: Box::new(self.ret.clone()),
            params: self.params.clone(),
        }
    }

    /// Returns true when the function has no body
    pub fn is_declaration(&self) -> bool {
        self.blocks.is_empty()
    }

    /// Appends a new, empty block. The first block added is the entry block.
    pub fn add_block(&mut self, name: &str) -> BlockId {
        self.blocks.push(Block {
            name: name.to_string(),
            insts: Vec::new(),
        });
        BlockId(self.blocks.len() as u32 - 1)
    }

    /// Entry block, if the function has a body
    pub fn entry_block(&self) -> Option<BlockId> {
        if self.blocks.is_empty() {
            None
        } else {
            Some(BlockId(0))
        }
    }

    /// All block ids in layout order
    pub fn block_ids(&self) -> impl Iterator<Item = BlockId> + '_ {
        (0..self.blocks.len() as u32).map(BlockId)
    }

    /// Block by id
    pub fn block(&self, id: BlockId) -> Option<&Block> {
        self.blocks.get(id.0 as usize)
    }

    /// Live instruction by id
    pub fn inst(&self, id: InstId) -> Option<&InstData> {
        self.insts.get(id.0 as usize).and_then(|slot| slot.as_ref())
    }

    /// Every live instruction in program order (blocks in layout order)
    pub fn program_order(&self) -> Vec<InstId> {
        self.blocks
            .iter()
            .flat_map(|block| block.insts.iter().copied())
            .collect()
    }

    /// Number of live instructions
    pub fn inst_count(&self) -> usize {
        self.blocks.iter().map(|block| block.insts.len()).sum()
    }

    /// Appends an instruction at the end of `block`
    pub fn append(&mut self, block: BlockId, kind: InstKind, ty: Type) -> Result<InstId> {
        let id = self.alloc(block, kind, ty)?;
        self.block_mut(block)?.insts.push(id);
        Ok(id)
    }

    /// Inserts an instruction before every other instruction of `block`
    pub fn insert_at_head(&mut self, block: BlockId, kind: InstKind, ty: Type) -> Result<InstId> {
        let id = self.alloc(block, kind, ty)?;
        self.block_mut(block)?.insts.insert(0, id);
        Ok(id)
    }

    /// Inserts an instruction immediately before `anchor`, in the same block
    pub fn insert_before(&mut self, anchor: InstId, kind: InstKind, ty: Type) -> Result<InstId> {
        let (block, pos) = self.position(anchor)?;
        let id = self.alloc(block, kind, ty)?;
        self.block_mut(block)?.insts.insert(pos, id);
        Ok(id)
    }

    /// Rewires operand slot `index` of `inst` to `value`
    pub fn replace_operand(&mut self, inst: InstId, index: usize, value: Value) -> Result<()> {
        let old = {
            let data = self.inst_mut(inst)?;
            let mut operands = data.kind.operands_mut();
            let slot = operands.get_mut(index).ok_or_else(|| {
                Error::Ir(format!("instruction %{} has no operand {}", inst.0, index))
            })?;
            std::mem::replace(&mut **slot, value.clone())
        };
        self.release(&old);
        self.retain(&value);
        Ok(())
    }

    /// Attaches (or clears) the source position of `inst`
    pub fn set_debug_loc(&mut self, inst: InstId, loc: Option<DebugLoc>) -> Result<()> {
        self.inst_mut(inst)?.debug_loc = loc;
        Ok(())
    }

    /// Returns true if any live instruction reads the result of `inst`
    pub fn has_uses(&self, inst: InstId) -> bool {
        self.use_count(inst) > 0
    }

    /// Number of live operand slots reading the result of `inst`
    pub fn use_count(&self, inst: InstId) -> u32 {
        self.uses.get(inst.0 as usize).copied().unwrap_or(0)
    }

    /// Removes an instruction whose result is no longer read
    pub fn erase(&mut self, inst: InstId) -> Result<()> {
        if self.has_uses(inst) {
            return Err(Error::Ir(format!(
                "cannot erase %{} in @{}: result still in use",
                inst.0, self.name
            )));
        }
        let (block, pos) = self.position(inst)?;
        self.block_mut(block)?.insts.remove(pos);
        if let Some(data) = self.insts[inst.0 as usize].take() {
            for operand in data.kind.operands() {
                self.release(operand);
            }
        }
        Ok(())
    }

    /// Type of `value` as seen from inside this function
    pub fn value_type(&self, value: &Value, symbols: &SymbolTable) -> Result<Type> {
        match value {
            Value::Inst(id) => self
                .inst(*id)
                .map(|data| data.ty.clone())
                .ok_or_else(|| Error::Ir(format!("stale instruction %{} in @{}", id.0, self.name))),
            Value::Arg(index) => self.params.get(*index as usize).cloned().ok_or_else(|| {
                Error::Ir(format!("@{} has no parameter {}", self.name, index))
            }),
            Value::Const(constant) => Ok(constant.ty()),
            Value::Global(id) => symbols.global(*id),
            Value::Function(id) => symbols.function(*id),
        }
    }

    fn alloc(&mut self, block: BlockId, kind: InstKind, ty: Type) -> Result<InstId> {
        if self.block(block).is_none() {
            return Err(Error::Ir(format!("@{} has no block {}", self.name, block.0)));
        }
        for operand in kind.operands() {
            self.retain(operand);
        }
        self.insts.push(Some(InstData {
            kind,
            ty,
            block,
            debug_loc: None,
        }));
        self.uses.push(0);
        Ok(InstId(self.insts.len() as u32 - 1))
    }

    fn retain(&mut self, value: &Value) {
        if let Some(count) = value.as_inst().and_then(|id| self.uses.get_mut(id.0 as usize)) {
            *count += 1;
        }
    }

    fn release(&mut self, value: &Value) {
        if let Some(count) = value.as_inst().and_then(|id| self.uses.get_mut(id.0 as usize)) {
            *count = count.saturating_sub(1);
        }
    }

    fn inst_mut(&mut self, id: InstId) -> Result<&mut InstData> {
        let name = &self.name;
        self.insts
            .get_mut(id.0 as usize)
            .and_then(|slot| slot.as_mut())
            .ok_or_else(|| Error::Ir(format!("stale instruction %{} in @{}", id.0, name)))
    }

    fn block_mut(&mut self, id: BlockId) -> Result<&mut Block> {
        let name = &self.name;
        self.blocks
            .get_mut(id.0 as usize)
            .ok_or_else(|| Error::Ir(format!("@{} has no block {}", name, id.0)))
    }

    fn position(&self, inst: InstId) -> Result<(BlockId, usize)> {
        let data = self
            .inst(inst)
            .ok_or_else(|| Error::Ir(format!("stale instruction %{} in @{}", inst.0, self.name)))?;
        let pos = self
            .block(data.block)
            .and_then(|block| block.insts.iter().position(|&id| id == inst))
            .ok_or_else(|| {
                Error::Ir(format!("instruction %{} missing from its block", inst.0))
            })?;
        Ok((data.block, pos))
    }
}
